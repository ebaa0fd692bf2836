// Main entry point - Dependency injection and server setup
use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use farm_telemetry::application::analytics_facade::{AnalyticsFacade, Collaborators};
use farm_telemetry::application::clock::{Clock, SystemClock};
use farm_telemetry::application::disease_classifier::{DiseaseClassifier, KnowledgeBase};
use farm_telemetry::application::growth_forecaster::GrowthForecaster;
use farm_telemetry::application::ingestor::ReadingIngestor;
use farm_telemetry::application::repositories::UsageLedger;
use farm_telemetry::application::window_store::RollingWindowStore;
use farm_telemetry::infrastructure::config::{load_analytics_config, load_growth_models};
use farm_telemetry::infrastructure::influx_usage_ledger::InfluxUsageLedger;
use farm_telemetry::infrastructure::memory::{InMemoryDetections, InMemoryUsageLedger};
use farm_telemetry::infrastructure::simulated_source::SimulatedSource;
use farm_telemetry::presentation::app_state::AppState;
use farm_telemetry::presentation::handlers::{
    classify, crop_outlook, evaluate_irrigation, farm_snapshot, health_check, list_farms,
    stream_snapshots,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_analytics_config().context("Failed to load configuration")?;
    let growth_models = load_growth_models(&config.growth)?;
    let classifier = DiseaseClassifier::new(config.classifier, KnowledgeBase::builtin())?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Create adapters (infrastructure layer)
    let source = Arc::new(SimulatedSource::new(config.source.to_settings(), clock.clone()));
    let ledger: Arc<dyn UsageLedger> = match config.ledger.clone() {
        Some(influx) => {
            tracing::info!("Reading irrigation usage from InfluxDB at {}", influx.host);
            Arc::new(InfluxUsageLedger::new(influx))
        }
        None => {
            tracing::info!("No usage ledger configured, using in-memory ledger");
            Arc::new(InMemoryUsageLedger::new())
        }
    };
    let scorer = Arc::new(InMemoryDetections::new(config.detections.clone()));

    // Create services (application layer)
    let facade = AnalyticsFacade::new(
        Arc::new(RollingWindowStore::new(config.window.capacity)),
        ReadingIngestor::new(source, clock.clone(), config.ingest.to_settings()),
        GrowthForecaster::new(growth_models),
        classifier,
        Collaborators {
            scorer,
            ledger,
            clock,
        },
        config.farms.clone(),
    );

    // Configured farms ingest from startup so snapshots always have data
    let watched = Arc::new(facade.watch_configured());
    tracing::info!("Watching {} configured farm(s)", watched.len());

    // Create application state
    let state = Arc::new(AppState {
        facade,
        default_stream_every: Duration::from_secs(config.server.snapshot_every_secs.max(1)),
        watched,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/farms", get(list_farms))
        .route("/farms/:id/snapshot", get(farm_snapshot))
        .route("/farms/:id/snapshots", get(stream_snapshots))
        .route("/crops/:crop/outlook", get(crop_outlook))
        .route("/classify/:confidence", get(classify))
        .route("/irrigation/evaluate", get(evaluate_irrigation))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    tracing::info!("Starting farm-telemetry service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}

use crate::application::disease_classifier::SeverityThresholds;
use crate::application::growth_forecaster::GrowthModelTable;
use crate::application::ingestor::{IngestSettings, ReconnectPolicy};
use crate::domain::disease::DiseaseDetection;
use crate::domain::farm::FarmProfile;
use crate::domain::growth::CropType;
use crate::infrastructure::simulated_source::SimulationSettings;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub classifier: SeverityThresholds,
    #[serde(default)]
    pub growth: GrowthSettings,
    #[serde(default)]
    pub source: SourceSettings,
    #[serde(default)]
    pub ledger: Option<InfluxSettings>,
    #[serde(default)]
    pub farms: Vec<FarmProfile>,
    /// Seed detections per farm id, served until a real model is wired in.
    #[serde(default)]
    pub detections: HashMap<String, Vec<DiseaseDetection>>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Default interval for streamed snapshots.
    pub snapshot_every_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            snapshot_every_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowSettings {
    pub capacity: usize,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self { capacity: 24 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub idle_timeout_ms: u64,
    pub max_reconnect_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 300_000,
            max_reconnect_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl IngestConfig {
    pub fn to_settings(&self) -> IngestSettings {
        IngestSettings {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms.max(1)),
            reconnect: ReconnectPolicy {
                max_attempts: self.max_reconnect_attempts,
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(
                    self.max_backoff_ms.max(self.initial_backoff_ms),
                ),
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GrowthSettings {
    /// TOML file with growth model parameters; the built-in table when absent.
    #[serde(default)]
    pub models_path: Option<String>,
    /// Crops that must have their own model entry, checked at startup.
    #[serde(default)]
    pub required_crops: Vec<CropType>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceSettings {
    pub seed: u64,
    pub interval_ms: u64,
    pub dropout_after: Option<u64>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            interval_ms: 5_000,
            dropout_after: None,
        }
    }
}

impl SourceSettings {
    pub fn to_settings(&self) -> SimulationSettings {
        SimulationSettings {
            seed: self.seed,
            interval: Duration::from_millis(self.interval_ms.max(1)),
            dropout_after: self.dropout_after,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
    #[serde(default = "default_usage_query")]
    pub usage_query: String,
}

fn default_usage_query() -> String {
    concat!(
        "SELECT \"gallons\" FROM \"irrigation_usage\" ",
        "WHERE \"farm\"='${farm}' AND time >= '${since}' GROUP BY \"zone\"",
    )
    .to_string()
}

pub fn load_analytics_config() -> anyhow::Result<AnalyticsConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/analytics").required(false))
        .add_source(
            config::Environment::with_prefix("FARM")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Build the growth model table and check that every required crop has its
/// own entry. A missing required crop is a startup error.
pub fn load_growth_models(settings: &GrowthSettings) -> anyhow::Result<GrowthModelTable> {
    let table = match &settings.models_path {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read growth models from {}", path))?;
            GrowthModelTable::from_toml_str(&source)
                .with_context(|| format!("Invalid growth models in {}", path))?
        }
        None => GrowthModelTable::builtin()?,
    };

    table.require(&settings.required_crops)?;
    Ok(table)
}

/// Replace template variables in a query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

// Analytics facade - Per-farm snapshots for presentation collaborators
use crate::application::clock::Clock;
use crate::application::disease_classifier::DiseaseClassifier;
use crate::application::growth_forecaster::GrowthForecaster;
use crate::application::ingestor::{ReadingHandler, ReadingIngestor, SubscriptionHandle};
use crate::application::irrigation_evaluator::{evaluate, evaluate_zone, usage_summary};
use crate::application::repositories::{DiseaseScorer, UsageLedger};
use crate::application::window_store::{summarize, RollingWindowStore};
use crate::domain::disease::{Classification, DiseaseAlert};
use crate::domain::farm::FarmProfile;
use crate::domain::growth::{CropOutlook, CropType, GrowthCurve};
use crate::domain::irrigation::{MoistureBand, UsageSummary, ZoneEvaluation};
use crate::domain::reading::SensorReading;
use crate::domain::snapshot::{FarmSnapshot, StreamHealth};
use crate::error::{AnalyticsError, StreamError, StreamStale};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// Days of ledger history needed for the week-over-week comparison.
const USAGE_LOOKBACK_DAYS: i64 = 14;

/// External collaborators the facade queries when composing snapshots.
#[derive(Clone)]
pub struct Collaborators {
    pub scorer: Arc<dyn DiseaseScorer>,
    pub ledger: Arc<dyn UsageLedger>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AnalyticsFacade {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<RollingWindowStore>,
    ingestor: ReadingIngestor,
    forecaster: GrowthForecaster,
    classifier: DiseaseClassifier,
    collaborators: Collaborators,
    farms: RwLock<HashMap<String, FarmProfile>>,
    interest: Mutex<HashMap<String, Interest>>,
}

struct Interest {
    holders: usize,
    subscription: SubscriptionHandle,
}

/// Keeps a farm's reading stream subscribed while alive.
pub struct FarmInterest {
    farm_id: String,
    inner: Arc<Inner>,
}

impl FarmInterest {
    pub fn farm_id(&self) -> &str {
        &self.farm_id
    }
}

impl Drop for FarmInterest {
    fn drop(&mut self) {
        self.inner.release(&self.farm_id);
    }
}

/// Feeds delivered readings into the window store.
struct WindowAppender {
    store: Arc<RollingWindowStore>,
}

impl ReadingHandler for WindowAppender {
    fn on_reading(&self, reading: SensorReading) {
        let farm_id = reading.farm_id.clone();
        if let Err(e) = self.store.append(&farm_id, reading) {
            tracing::warn!("Window rejected reading for farm {}: {}", farm_id, e);
        }
    }

    fn on_stream_error(&self, error: StreamError) {
        tracing::debug!("Farm {} stream interrupted: {}", error.farm_id(), error);
    }

    fn on_stale(&self, stale: StreamStale) {
        tracing::debug!("{}", stale);
    }
}

impl Inner {
    fn acquire(self: &Arc<Self>, farm_id: &str) -> FarmInterest {
        let mut interest = self.interest.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = interest.get_mut(farm_id) {
            existing.holders += 1;
        } else {
            let subscription = self.ingestor.subscribe(
                farm_id,
                WindowAppender {
                    store: self.store.clone(),
                },
            );
            interest.insert(
                farm_id.to_string(),
                Interest {
                    holders: 1,
                    subscription,
                },
            );
        }

        FarmInterest {
            farm_id: farm_id.to_string(),
            inner: self.clone(),
        }
    }

    fn release(&self, farm_id: &str) {
        let released = {
            let mut interest = self.interest.lock().unwrap_or_else(|e| e.into_inner());
            let remaining = match interest.get_mut(farm_id) {
                Some(existing) => {
                    existing.holders -= 1;
                    existing.holders
                }
                None => return,
            };
            if remaining == 0 {
                interest.remove(farm_id)
            } else {
                None
            }
        };

        if let Some(last) = released {
            tracing::info!("No remaining interest in farm {}", farm_id);
            last.subscription.unsubscribe();
        }
    }
}

impl AnalyticsFacade {
    pub fn new(
        store: Arc<RollingWindowStore>,
        ingestor: ReadingIngestor,
        forecaster: GrowthForecaster,
        classifier: DiseaseClassifier,
        collaborators: Collaborators,
        farms: Vec<FarmProfile>,
    ) -> Self {
        let farms = farms.into_iter().map(|f| (f.id.clone(), f)).collect();
        Self {
            inner: Arc::new(Inner {
                store,
                ingestor,
                forecaster,
                classifier,
                collaborators,
                farms: RwLock::new(farms),
                interest: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &RollingWindowStore {
        &self.inner.store
    }

    /// Register interest in a farm; the first holder starts ingestion and
    /// dropping the last one stops it. Requires a tokio runtime.
    pub fn watch(&self, farm_id: &str) -> FarmInterest {
        self.inner.acquire(farm_id)
    }

    /// Register interest in every configured farm, e.g. for a long-running
    /// service that serves snapshots on demand.
    pub fn watch_configured(&self) -> Vec<FarmInterest> {
        self.farms().iter().map(|farm| self.watch(&farm.id)).collect()
    }

    pub fn interest_count(&self, farm_id: &str) -> usize {
        let interest = self.inner.interest.lock().unwrap_or_else(|e| e.into_inner());
        interest.get(farm_id).map(|i| i.holders).unwrap_or(0)
    }

    pub fn stream_health(&self, farm_id: &str) -> StreamHealth {
        let interest = self.inner.interest.lock().unwrap_or_else(|e| e.into_inner());
        interest
            .get(farm_id)
            .map(|i| i.subscription.status())
            .unwrap_or(StreamHealth::Idle)
    }

    pub fn farms(&self) -> Vec<FarmProfile> {
        let farms = self.inner.farms.read().unwrap_or_else(|e| e.into_inner());
        let mut profiles: Vec<FarmProfile> = farms.values().cloned().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    pub fn profile(&self, farm_id: &str) -> Option<FarmProfile> {
        let farms = self.inner.farms.read().unwrap_or_else(|e| e.into_inner());
        farms.get(farm_id).cloned()
    }

    /// Replace a farm's profile, e.g. after a crop change or new growth survey.
    pub fn upsert_profile(&self, profile: FarmProfile) {
        let mut farms = self.inner.farms.write().unwrap_or_else(|e| e.into_inner());
        farms.insert(profile.id.clone(), profile);
    }

    pub async fn get_farm_snapshot(&self, farm_id: &str) -> FarmSnapshot {
        let now = self.inner.collaborators.clock.now();

        // 1. One copy of the window; everything below derives from it
        let recent_readings = self.inner.store.snapshot(farm_id);
        let latest_reading = recent_readings.last().cloned();
        let window_summary = summarize(&recent_readings);

        // 2. Profile-driven views
        let profile = self.profile(farm_id).unwrap_or_else(|| FarmProfile::new(farm_id));
        let growth = profile
            .crop
            .as_ref()
            .map(|crop| self.inner.forecaster.outlook(crop, &profile.observed_growth, now));

        // Each zone uses its own latest tagged reading, else the farm's latest
        let irrigation_zones = match &latest_reading {
            Some(farm_latest) => profile
                .zones
                .iter()
                .map(|zone| {
                    let reading = recent_readings
                        .iter()
                        .rev()
                        .find(|r| r.is_from_zone(&zone.name))
                        .unwrap_or(farm_latest);
                    evaluate_zone(zone, reading.soil_moisture, now)
                })
                .collect(),
            None => Vec::new(),
        };

        // 3. External collaborators, degrading to empty/absent on failure
        let (disease_alerts, usage) =
            tokio::join!(self.disease_alerts(farm_id), self.usage(farm_id, now));

        FarmSnapshot {
            farm_id: farm_id.to_string(),
            generated_at: now,
            stream: self.stream_health(farm_id),
            latest_reading,
            recent_readings,
            window_summary,
            growth,
            disease_alerts,
            irrigation_zones,
            usage,
        }
    }

    /// Periodic snapshots of a farm. Ingestion stays subscribed until the
    /// receiver is dropped.
    pub fn stream_snapshots(
        &self,
        farm_id: &str,
        every: Duration,
    ) -> mpsc::Receiver<FarmSnapshot> {
        let (tx, rx) = mpsc::channel(8);
        let facade = self.clone();
        let interest = self.watch(farm_id);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {
                        let snapshot = facade.get_farm_snapshot(interest.farm_id()).await;
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Snapshot stream for farm {} closed", interest.farm_id());
        });

        rx
    }

    pub fn forecast(&self, crop: &CropType, observed: &[f64]) -> GrowthCurve {
        self.inner.forecaster.forecast(crop, observed)
    }

    pub fn outlook(&self, crop: &CropType, observed: &[f64]) -> CropOutlook {
        let now = self.inner.collaborators.clock.now();
        self.inner.forecaster.outlook(crop, observed, now)
    }

    pub fn classify(&self, confidence: f64) -> Result<Classification, AnalyticsError> {
        self.inner.classifier.classify(confidence)
    }

    pub fn evaluate(&self, current_moisture: f64, band: &MoistureBand) -> ZoneEvaluation {
        evaluate(current_moisture, band)
    }

    async fn disease_alerts(&self, farm_id: &str) -> Vec<DiseaseAlert> {
        match self.inner.collaborators.scorer.detections(farm_id).await {
            Ok(detections) => self.inner.classifier.assess_all(detections),
            Err(e) => {
                tracing::warn!("Disease detections unavailable for farm {}: {:#}", farm_id, e);
                Vec::new()
            }
        }
    }

    async fn usage(&self, farm_id: &str, now: DateTime<Utc>) -> Option<UsageSummary> {
        let since = now - ChronoDuration::days(USAGE_LOOKBACK_DAYS);
        match self.inner.collaborators.ledger.usage_since(farm_id, since).await {
            Ok(records) => Some(usage_summary(&records, now)),
            Err(e) => {
                tracing::warn!("Usage ledger unavailable for farm {}: {:#}", farm_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::FixedClock;
    use crate::application::disease_classifier::{KnowledgeBase, SeverityThresholds};
    use crate::application::growth_forecaster::GrowthModelTable;
    use crate::application::ingestor::IngestSettings;
    use crate::domain::disease::{DiseaseDetection, SeverityTier};
    use crate::domain::irrigation::{IrrigationStatus, UsageRecord, ZoneProfile};
    use crate::infrastructure::channel_source::ChannelSource;
    use crate::infrastructure::memory::{InMemoryDetections, InMemoryUsageLedger};
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct Unavailable;

    #[async_trait]
    impl UsageLedger for Unavailable {
        async fn usage_since(&self, _: &str, _: DateTime<Utc>) -> anyhow::Result<Vec<UsageRecord>> {
            anyhow::bail!("ledger offline")
        }
    }

    #[async_trait]
    impl DiseaseScorer for Unavailable {
        async fn detections(&self, _: &str) -> anyhow::Result<Vec<DiseaseDetection>> {
            anyhow::bail!("model offline")
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 16, 9, 0, 0).unwrap()
    }

    fn tomato_farm() -> FarmProfile {
        FarmProfile {
            id: "farm1".to_string(),
            name: Some("Main Farm".to_string()),
            crop: Some(CropType::new("tomato")),
            observed_growth: vec![6.0, 14.0, 24.0, 37.0, 52.0, 70.0],
            zones: vec![
                ZoneProfile {
                    name: "North Field Tomatoes".to_string(),
                    band: MoistureBand::new(40.0, 60.0).unwrap(),
                    last_irrigation: None,
                    interval_hours: 72,
                },
                ZoneProfile {
                    name: "South Field".to_string(),
                    band: MoistureBand::new(20.0, 25.0).unwrap(),
                    last_irrigation: None,
                    interval_hours: 72,
                },
            ],
        }
    }

    fn build(
        source: Arc<ChannelSource>,
        scorer: Arc<dyn DiseaseScorer>,
        ledger: Arc<dyn UsageLedger>,
    ) -> AnalyticsFacade {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now()));
        AnalyticsFacade::new(
            Arc::new(RollingWindowStore::new(24)),
            ReadingIngestor::new(source, clock.clone(), IngestSettings::default()),
            GrowthForecaster::new(GrowthModelTable::builtin().unwrap()),
            DiseaseClassifier::new(SeverityThresholds::default(), KnowledgeBase::builtin())
                .unwrap(),
            Collaborators {
                scorer,
                ledger,
                clock,
            },
            vec![tomato_farm()],
        )
    }

    fn default_facade(source: Arc<ChannelSource>) -> AnalyticsFacade {
        let detections = InMemoryDetections::default();
        detections.report(
            "farm1",
            DiseaseDetection {
                crop: CropType::new("Tomato"),
                disease: "Late Blight".to_string(),
                confidence: 94.0,
                location: "North Field".to_string(),
                detected_at: now() - ChronoDuration::days(1),
            },
        );
        let ledger = InMemoryUsageLedger::new();
        ledger.record(
            "farm1",
            UsageRecord {
                at: now() - ChronoDuration::hours(1),
                zone: None,
                gallons: 124.0,
            },
        );
        build(source, Arc::new(detections), Arc::new(ledger))
    }

    fn zone_payload(minute: u32, soil_moisture: f64, zone: &str) -> String {
        format!(
            r#"{{"timestamp":"2023-06-16T08:{:02}:00Z","temperature":24.0,
                "soilMoisture":{},"humidity":65.0,"zone":"{}"}}"#,
            minute, soil_moisture, zone
        )
    }

    fn payload(minute: u32, soil_moisture: f64) -> String {
        format!(
            r#"{{"timestamp":"2023-06-16T08:{:02}:00Z","temperature":26.5,
                "soilMoisture":{},"humidity":71.8,"leafWetness":0.4}}"#,
            minute, soil_moisture
        )
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        while !condition() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_snapshot_without_readings_has_explicit_empties() {
        let facade = default_facade(Arc::new(ChannelSource::new()));
        let snapshot = facade.get_farm_snapshot("farm1").await;

        assert!(snapshot.is_empty());
        assert!(snapshot.recent_readings.is_empty());
        assert!(snapshot.irrigation_zones.is_empty());
        assert_eq!(snapshot.stream, StreamHealth::Idle);
        // Derived views that do not need readings are still present
        assert!(snapshot.growth.is_some());
        assert_eq!(snapshot.disease_alerts.len(), 1);
        assert_eq!(snapshot.usage.unwrap().today_gallons, 124.0);
    }

    #[tokio::test]
    async fn test_unknown_farm_snapshot_is_empty_not_error() {
        let facade = default_facade(Arc::new(ChannelSource::new()));
        let snapshot = facade.get_farm_snapshot("farm9").await;

        assert_eq!(snapshot.farm_id, "farm9");
        assert!(snapshot.latest_reading.is_none());
        assert!(snapshot.growth.is_none());
        assert!(snapshot.disease_alerts.is_empty());
        assert!(snapshot.irrigation_zones.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_composes_all_views() {
        let source = Arc::new(ChannelSource::new());
        let facade = default_facade(source.clone());

        let _interest = facade.watch("farm1");
        wait_until(|| source.open_count("farm1") == 1).await;
        source.push("farm1", payload(0, 30.0));
        source.push("farm1", payload(1, 28.0));
        wait_until(|| facade.store().len("farm1") == 2).await;

        let snapshot = facade.get_farm_snapshot("farm1").await;
        assert_eq!(snapshot.latest_reading.as_ref().unwrap().soil_moisture, 28.0);
        assert_eq!(snapshot.recent_readings.len(), 2);
        assert_eq!(snapshot.stream, StreamHealth::Live);

        let zones = &snapshot.irrigation_zones;
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].status, IrrigationStatus::UnderIrrigated);
        assert_eq!(zones[0].next_irrigation, Some(now()));
        assert_eq!(zones[1].status, IrrigationStatus::OverIrrigated);
        assert_eq!(zones[1].next_irrigation, None);

        let growth = snapshot.growth.unwrap();
        assert_eq!(growth.harvest.days_remaining, 42);
        assert_eq!(growth.progress.unwrap().period, 6);

        assert_eq!(snapshot.disease_alerts[0].severity, SeverityTier::High);
        assert_eq!(snapshot.disease_alerts[0].recommendations.len(), 4);
    }

    #[tokio::test]
    async fn test_zones_use_their_own_readings() {
        let source = Arc::new(ChannelSource::new());
        let facade = default_facade(source.clone());
        let mut profile = tomato_farm();
        profile.zones.push(ZoneProfile {
            name: "East Orchard".to_string(),
            band: MoistureBand::new(30.0, 50.0).unwrap(),
            last_irrigation: None,
            interval_hours: 72,
        });
        facade.upsert_profile(profile);

        let _interest = facade.watch("farm1");
        wait_until(|| source.open_count("farm1") == 1).await;
        source.push("farm1", zone_payload(0, 45.0, "North Field Tomatoes"));
        source.push("farm1", zone_payload(1, 22.0, "South Field"));
        source.push("farm1", zone_payload(2, 68.0, "Greenhouse"));
        wait_until(|| facade.store().len("farm1") == 3).await;

        let zones = facade.get_farm_snapshot("farm1").await.irrigation_zones;
        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0].current_moisture, 45.0);
        assert_eq!(zones[0].status, IrrigationStatus::Optimal);
        assert_eq!(zones[1].current_moisture, 22.0);
        assert_eq!(zones[1].status, IrrigationStatus::Optimal);
        // No reading tagged for this zone, so the farm's latest stands in
        assert_eq!(zones[2].current_moisture, 68.0);
        assert_eq!(zones[2].status, IrrigationStatus::OverIrrigated);
    }

    #[tokio::test]
    async fn test_watch_configured_starts_every_farm() {
        let source = Arc::new(ChannelSource::new());
        let facade = default_facade(source.clone());
        facade.upsert_profile(FarmProfile::new("farm2"));

        let watched = facade.watch_configured();
        assert_eq!(watched.len(), 2);
        wait_until(|| source.open_count("farm1") == 1 && source.open_count("farm2") == 1).await;

        source.push("farm2", payload(0, 50.0));
        wait_until(|| facade.store().len("farm2") == 1).await;
        let snapshot = facade.get_farm_snapshot("farm2").await;
        assert_eq!(snapshot.latest_reading.unwrap().soil_moisture, 50.0);

        drop(watched);
        assert_eq!(facade.interest_count("farm1"), 0);
        assert_eq!(facade.interest_count("farm2"), 0);
    }

    #[tokio::test]
    async fn test_snapshot_is_idempotent_without_ingestion() {
        let source = Arc::new(ChannelSource::new());
        let facade = default_facade(source.clone());

        let _interest = facade.watch("farm1");
        wait_until(|| source.open_count("farm1") == 1).await;
        source.push("farm1", payload(0, 45.0));
        wait_until(|| facade.store().len("farm1") == 1).await;

        let first = facade.get_farm_snapshot("farm1").await;
        let second = facade.get_farm_snapshot("farm1").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failing_collaborators_degrade_gracefully() {
        let source = Arc::new(ChannelSource::new());
        let facade = build(source, Arc::new(Unavailable), Arc::new(Unavailable));

        let snapshot = facade.get_farm_snapshot("farm1").await;
        assert!(snapshot.disease_alerts.is_empty());
        assert!(snapshot.usage.is_none());
        assert!(snapshot.growth.is_some());
    }

    #[tokio::test]
    async fn test_subscription_follows_interest() {
        let source = Arc::new(ChannelSource::new());
        let facade = default_facade(source.clone());

        let first = facade.watch("farm1");
        let second = facade.watch("farm1");
        assert_eq!(facade.interest_count("farm1"), 2);
        wait_until(|| source.open_count("farm1") == 1).await;

        drop(first);
        assert_eq!(facade.interest_count("farm1"), 1);
        source.push("farm1", payload(0, 45.0));
        wait_until(|| facade.store().len("farm1") == 1).await;

        drop(second);
        assert_eq!(facade.interest_count("farm1"), 0);
        assert_eq!(facade.stream_health("farm1"), StreamHealth::Idle);

        source.push("farm1", payload(1, 46.0));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(facade.store().len("farm1"), 1);
        // Only one connection was ever opened for both holders
        assert_eq!(source.open_count("farm1"), 1);
    }

    #[tokio::test]
    async fn test_snapshot_stream_releases_interest_when_dropped() {
        let source = Arc::new(ChannelSource::new());
        let facade = default_facade(source.clone());

        let mut snapshots = facade.stream_snapshots("farm1", Duration::from_millis(5));
        assert_eq!(facade.interest_count("farm1"), 1);

        let snapshot = snapshots.recv().await.unwrap();
        assert_eq!(snapshot.farm_id, "farm1");

        drop(snapshots);
        wait_until(|| facade.interest_count("farm1") == 0).await;
    }

    #[tokio::test]
    async fn test_passthroughs() {
        let facade = default_facade(Arc::new(ChannelSource::new()));
        assert_eq!(facade.classify(87.0).unwrap().tier, SeverityTier::Medium);
        assert!(facade.classify(101.0).is_err());

        let band = MoistureBand::new(35.0, 55.0).unwrap();
        assert_eq!(facade.evaluate(45.0, &band).status, IrrigationStatus::Optimal);

        let curve = facade.forecast(&CropType::new("corn"), &[4.0]);
        assert_eq!(curve.actual[0], Some(4.0));
        assert_eq!(facade.outlook(&CropType::new("corn"), &[]).harvest.days_remaining, 56);
    }

    #[tokio::test]
    async fn test_profile_updates_change_derived_views() {
        let facade = default_facade(Arc::new(ChannelSource::new()));
        let mut profile = facade.profile("farm1").unwrap();
        profile.crop = Some(CropType::new("wheat"));
        facade.upsert_profile(profile);

        let snapshot = facade.get_farm_snapshot("farm1").await;
        assert_eq!(snapshot.growth.unwrap().harvest.days_remaining, 35);
        assert_eq!(facade.farms().len(), 1);
    }
}

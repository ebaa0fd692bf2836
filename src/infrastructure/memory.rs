// In-memory collaborators for demos, embedding without a database, and tests
use crate::application::repositories::{DiseaseScorer, UsageLedger};
use crate::domain::disease::DiseaseDetection;
use crate::domain::irrigation::UsageRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryUsageLedger {
    records: RwLock<HashMap<String, Vec<UsageRecord>>>,
}

impl InMemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, farm_id: &str, record: UsageRecord) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.entry(farm_id.to_string()).or_default().push(record);
    }
}

#[async_trait]
impl UsageLedger for InMemoryUsageLedger {
    async fn usage_since(
        &self,
        farm_id: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<UsageRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .get(farm_id)
            .map(|r| r.iter().filter(|u| u.at >= since).cloned().collect())
            .unwrap_or_default())
    }
}

/// Detections reported ahead of time, e.g. from configuration.
#[derive(Debug, Default)]
pub struct InMemoryDetections {
    by_farm: RwLock<HashMap<String, Vec<DiseaseDetection>>>,
}

impl InMemoryDetections {
    pub fn new(by_farm: HashMap<String, Vec<DiseaseDetection>>) -> Self {
        Self {
            by_farm: RwLock::new(by_farm),
        }
    }

    pub fn report(&self, farm_id: &str, detection: DiseaseDetection) {
        let mut by_farm = self.by_farm.write().unwrap_or_else(|e| e.into_inner());
        by_farm.entry(farm_id.to_string()).or_default().push(detection);
    }
}

#[async_trait]
impl DiseaseScorer for InMemoryDetections {
    async fn detections(&self, farm_id: &str) -> anyhow::Result<Vec<DiseaseDetection>> {
        let by_farm = self.by_farm.read().unwrap_or_else(|e| e.into_inner());
        Ok(by_farm.get(farm_id).cloned().unwrap_or_default())
    }
}

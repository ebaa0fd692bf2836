// Repository traits for external collaborators queried by the facade
use crate::domain::disease::DiseaseDetection;
use crate::domain::irrigation::UsageRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Water usage records for the farm at or after `since`
    async fn usage_since(
        &self,
        farm_id: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<UsageRecord>>;
}

/// Already-trained disease classification model, as seen by the core.
#[async_trait]
pub trait DiseaseScorer: Send + Sync {
    /// Current detections for the farm's fields
    async fn detections(&self, farm_id: &str) -> anyhow::Result<Vec<DiseaseDetection>>;
}

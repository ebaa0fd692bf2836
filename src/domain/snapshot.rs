// Per-farm snapshot composed by the analytics facade
use super::disease::DiseaseAlert;
use super::growth::CropOutlook;
use super::irrigation::{IrrigationZone, UsageSummary};
use super::reading::{Metric, SensorReading};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Connection state of a farm's reading stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum StreamHealth {
    /// Nobody is subscribed to this farm.
    Idle,
    Connecting,
    Live,
    Stale { idle_for_ms: u64 },
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted; a new subscription is required.
    Disconnected { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub metric: Metric,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmSnapshot {
    pub farm_id: String,
    pub generated_at: DateTime<Utc>,
    pub stream: StreamHealth,
    pub latest_reading: Option<SensorReading>,
    pub recent_readings: Vec<SensorReading>,
    pub window_summary: Vec<MetricSummary>,
    pub growth: Option<CropOutlook>,
    pub disease_alerts: Vec<DiseaseAlert>,
    pub irrigation_zones: Vec<IrrigationZone>,
    pub usage: Option<UsageSummary>,
}

impl FarmSnapshot {
    /// True when no reading has been stored for the farm yet.
    pub fn is_empty(&self) -> bool {
        self.latest_reading.is_none()
    }
}

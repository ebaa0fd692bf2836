// Irrigation domain models
use crate::error::AnalyticsError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Optimal soil-moisture band for a zone, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBand")]
pub struct MoistureBand {
    pub min: f64,
    pub max: f64,
}

#[derive(Deserialize)]
struct RawBand {
    min: f64,
    max: f64,
}

impl TryFrom<RawBand> for MoistureBand {
    type Error = AnalyticsError;

    fn try_from(raw: RawBand) -> Result<Self, Self::Error> {
        MoistureBand::new(raw.min, raw.max)
    }
}

impl MoistureBand {
    pub fn new(min: f64, max: f64) -> Result<Self, AnalyticsError> {
        let valid = min.is_finite() && max.is_finite() && 0.0 <= min && min <= max && max <= 100.0;
        if !valid {
            return Err(AnalyticsError::InvalidBand { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, moisture: f64) -> bool {
        self.min <= moisture && moisture <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IrrigationStatus {
    UnderIrrigated,
    Optimal,
    OverIrrigated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneEvaluation {
    pub status: IrrigationStatus,
    pub alert_text: &'static str,
}

/// Static description of a zone, as configured for a farm.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZoneProfile {
    pub name: String,
    pub band: MoistureBand,
    #[serde(default)]
    pub last_irrigation: Option<DateTime<Utc>>,
    #[serde(default = "default_interval_hours")]
    pub interval_hours: i64,
}

fn default_interval_hours() -> i64 {
    72
}

impl ZoneProfile {
    pub fn interval(&self) -> Duration {
        Duration::hours(self.interval_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IrrigationZone {
    pub name: String,
    pub current_moisture: f64,
    pub band: MoistureBand,
    pub status: IrrigationStatus,
    pub alert_text: &'static str,
    pub last_irrigation: Option<DateTime<Utc>>,
    /// Absent when the zone should not be irrigated (over-irrigated).
    pub next_irrigation: Option<DateTime<Utc>>,
}

/// One entry of the water usage ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub zone: Option<String>,
    pub gallons: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub today_gallons: f64,
    pub weekly_gallons: f64,
    /// Reduction against the previous week; negative when usage grew.
    pub savings_percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_validation() {
        assert!(MoistureBand::new(40.0, 60.0).is_ok());
        assert!(MoistureBand::new(50.0, 50.0).is_ok());
        assert!(MoistureBand::new(60.0, 40.0).is_err());
        assert!(MoistureBand::new(-1.0, 40.0).is_err());
        assert!(MoistureBand::new(10.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_band_deserialize_validates() {
        let band: MoistureBand = serde_json::from_str(r#"{"min":35,"max":55}"#).unwrap();
        assert_eq!(band.min, 35.0);
        assert!(serde_json::from_str::<MoistureBand>(r#"{"min":55,"max":35}"#).is_err());
    }

    #[test]
    fn test_band_contains_edges() {
        let band = MoistureBand::new(40.0, 60.0).unwrap();
        assert!(band.contains(40.0));
        assert!(band.contains(60.0));
        assert!(!band.contains(39.9));
        assert!(!band.contains(f64::NAN));
    }
}

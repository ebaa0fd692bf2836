// Sensor reading domain model
use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub const TEMP_MIN_C: f64 = -40.0;
pub const TEMP_MAX_C: f64 = 85.0;
pub const SOIL_MOISTURE_MIN_PCT: f64 = 0.0;
pub const SOIL_MOISTURE_MAX_PCT: f64 = 100.0;
pub const HUMIDITY_MIN_PCT: f64 = 0.0;
pub const HUMIDITY_MAX_PCT: f64 = 100.0;
pub const LEAF_WETNESS_MIN: f64 = 0.0;
pub const LEAF_WETNESS_MAX: f64 = 1.0;

/// Payload as delivered by an ingestion source, before validation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub soil_moisture: f64,
    pub humidity: f64,
    #[serde(default)]
    pub leaf_wetness: Option<f64>,
    /// Irrigation zone the sensor sits in; farm-wide when absent.
    #[serde(default)]
    pub zone: Option<String>,
}

impl RawReading {
    pub fn parse(payload: &[u8]) -> Result<Self, ValidationError> {
        serde_json::from_slice(payload).map_err(|e| ValidationError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub farm_id: String,
    /// Wall-clock time reported by the sensor (or stamped on arrival).
    pub timestamp: DateTime<Utc>,
    /// Monotonic arrival time, local to this process.
    #[serde(skip_serializing)]
    pub received_at: Instant,
    pub temperature: f64,
    pub soil_moisture: f64,
    pub humidity: f64,
    pub leaf_wetness: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl SensorReading {
    /// Validate a raw payload and normalize it into a reading.
    ///
    /// `arrived` supplies the wall-clock stamp when the payload carries none.
    pub fn from_raw(
        farm_id: &str,
        raw: RawReading,
        arrived: DateTime<Utc>,
        received_at: Instant,
    ) -> Result<Self, ValidationError> {
        let temperature = check_range("temperature", raw.temperature, TEMP_MIN_C, TEMP_MAX_C)?;
        let soil_moisture = check_range(
            "soilMoisture",
            raw.soil_moisture,
            SOIL_MOISTURE_MIN_PCT,
            SOIL_MOISTURE_MAX_PCT,
        )?;
        let humidity = check_range("humidity", raw.humidity, HUMIDITY_MIN_PCT, HUMIDITY_MAX_PCT)?;
        let leaf_wetness = check_range(
            "leafWetness",
            raw.leaf_wetness.unwrap_or(0.0),
            LEAF_WETNESS_MIN,
            LEAF_WETNESS_MAX,
        )?;

        Ok(Self {
            farm_id: farm_id.to_string(),
            timestamp: raw.timestamp.unwrap_or(arrived),
            received_at,
            temperature,
            soil_moisture,
            humidity,
            leaf_wetness,
            zone: raw.zone.filter(|zone| !zone.trim().is_empty()),
        })
    }

    /// Whether this reading was taken inside the named zone.
    pub fn is_from_zone(&self, zone: &str) -> bool {
        self.zone.as_deref() == Some(zone)
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::SoilMoisture => self.soil_moisture,
            Metric::Humidity => self.humidity,
            Metric::LeafWetness => self.leaf_wetness,
        }
    }
}

fn check_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite { field });
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Temperature,
    SoilMoisture,
    Humidity,
    LeafWetness,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Temperature,
        Metric::SoilMoisture,
        Metric::Humidity,
        Metric::LeafWetness,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(temperature: f64, soil_moisture: f64, humidity: f64) -> RawReading {
        RawReading {
            timestamp: None,
            temperature,
            soil_moisture,
            humidity,
            leaf_wetness: Some(0.4),
            zone: None,
        }
    }

    fn accept(raw: RawReading) -> Result<SensorReading, ValidationError> {
        SensorReading::from_raw("farm1", raw, Utc::now(), Instant::now())
    }

    #[test]
    fn test_parse_camel_case_payload() {
        let payload = br#"{"timestamp":"2023-06-15T10:00:00Z","temperature":26.5,
            "soilMoisture":62.3,"humidity":71.8,"leafWetness":0.4}"#;
        let parsed = RawReading::parse(payload).unwrap();
        assert_eq!(parsed.soil_moisture, 62.3);
        assert_eq!(parsed.leaf_wetness, Some(0.4));
        assert!(parsed.timestamp.is_some());
        assert!(parsed.zone.is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = RawReading::parse(b"not json").unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_missing_leaf_wetness_and_timestamp_default() {
        let payload = br#"{"temperature":22.0,"soilMoisture":55.0,"humidity":60.0}"#;
        let arrived = Utc::now();
        let raw = RawReading::parse(payload).unwrap();
        let reading = SensorReading::from_raw("farm1", raw, arrived, Instant::now()).unwrap();
        assert_eq!(reading.leaf_wetness, 0.0);
        assert_eq!(reading.timestamp, arrived);
    }

    #[test]
    fn test_zone_tag_is_kept() {
        let payload =
            br#"{"temperature":22.0,"soilMoisture":55.0,"humidity":60.0,"zone":"South Field"}"#;
        let reading = accept(RawReading::parse(payload).unwrap()).unwrap();
        assert!(reading.is_from_zone("South Field"));
        assert!(!reading.is_from_zone("North Field Tomatoes"));

        let blank = accept(RawReading {
            zone: Some("  ".to_string()),
            ..raw(22.0, 55.0, 60.0)
        })
        .unwrap();
        assert_eq!(blank.zone, None);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = accept(raw(25.0, 50.0, 101.0)).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { field: "humidity", .. }));

        let err = accept(raw(90.0, 50.0, 50.0)).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { field: "temperature", .. }));
    }

    #[test]
    fn test_non_finite_rejected() {
        let err = accept(raw(25.0, f64::NAN, 50.0)).unwrap_err();
        assert_eq!(err, ValidationError::NonFinite { field: "soilMoisture" });
    }

    #[test]
    fn test_boundaries_accepted() {
        let reading = accept(raw(-40.0, 0.0, 100.0)).unwrap();
        assert_eq!(reading.value(Metric::Temperature), -40.0);
        assert_eq!(reading.value(Metric::Humidity), 100.0);
    }
}

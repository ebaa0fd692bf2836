// Crop growth domain models
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Crop identifier, normalized to lowercase ("Tomato " -> "tomato").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CropType(String);

impl CropType {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CropType {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for CropType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<CropType> for String {
    fn from(value: CropType) -> Self {
        value.0
    }
}

impl fmt::Display for CropType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthCurve {
    pub crop: CropType,
    /// 1-based period indices (weeks).
    pub periods: Vec<u32>,
    pub predicted: Vec<f64>,
    /// `None` marks a period that has not been observed yet.
    pub actual: Vec<Option<f64>>,
    pub ideal: Vec<f64>,
    /// Set when the crop had no model entry and generic parameters were used.
    pub generic_model: bool,
}

impl GrowthCurve {
    /// Compare the most recent observation against the model.
    pub fn progress(&self) -> Option<GrowthProgress> {
        let (idx, actual) = self
            .actual
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, v)| v.map(|v| (i, v)))?;

        let predicted = self.predicted[idx];
        let ideal = self.ideal[idx];
        Some(GrowthProgress {
            period: self.periods[idx],
            actual,
            predicted,
            ideal,
            ahead_of_prediction: round1(actual - predicted),
            gap_to_ideal: round1(ideal - actual),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthProgress {
    pub period: u32,
    pub actual: f64,
    pub predicted: f64,
    pub ideal: f64,
    /// Positive when the crop is growing faster than predicted.
    pub ahead_of_prediction: f64,
    pub gap_to_ideal: f64,
}

/// Yield in tons per hectare.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldEstimate {
    pub predicted: f64,
    #[serde(alias = "last_year")]
    pub last_year: f64,
    pub potential: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestEstimate {
    pub days_remaining: i64,
    pub expected_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CropOutlook {
    pub curve: GrowthCurve,
    pub progress: Option<GrowthProgress>,
    pub yield_estimate: YieldEstimate,
    pub harvest: HarvestEstimate,
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

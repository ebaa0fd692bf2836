// Growth forecaster - Per-crop saturating growth model
use crate::domain::growth::{
    round1, CropOutlook, CropType, GrowthCurve, HarvestEstimate, YieldEstimate,
};
use crate::error::AnalyticsError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

const BUILTIN_MODELS: &str = include_str!("../../config/growth_models.toml");
const MAX_PERIODS: u32 = 104;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CurveParams {
    pub midpoint: f64,
    pub rate: f64,
}

impl CurveParams {
    fn logistic(&self, t: f64) -> f64 {
        1.0 / (1.0 + (-self.rate * (t - self.midpoint)).exp())
    }

    /// Percent of final growth at periods 1..=periods, ending at exactly 100.
    fn evaluate(&self, periods: u32) -> Vec<f64> {
        let end = self.logistic(periods as f64);
        (1..=periods)
            .map(|t| round1(100.0 * self.logistic(t as f64) / end))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HarvestDay {
    pub month: u32,
    pub day: u32,
}

impl HarvestDay {
    /// First occurrence of this month/day on or after `today`.
    fn next_on_or_after(&self, today: NaiveDate) -> Option<NaiveDate> {
        (today.year()..=today.year() + 4)
            .filter_map(|year| NaiveDate::from_ymd_opt(year, self.month, self.day))
            .find(|date| *date >= today)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GrowthModel {
    pub predicted: CurveParams,
    pub ideal: CurveParams,
    #[serde(rename = "yield")]
    pub yield_estimate: YieldEstimate,
    pub harvest: HarvestDay,
}

impl GrowthModel {
    fn validate(&self, name: &str) -> Result<(), AnalyticsError> {
        for (label, params) in [("predicted", &self.predicted), ("ideal", &self.ideal)] {
            if !(params.rate.is_finite() && params.rate > 0.0 && params.midpoint.is_finite()) {
                return Err(AnalyticsError::Config(format!(
                    "growth model '{}': {} curve needs a positive rate and finite midpoint",
                    name, label
                )));
            }
        }

        let y = &self.yield_estimate;
        if ![y.predicted, y.last_year, y.potential]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
        {
            return Err(AnalyticsError::Config(format!(
                "growth model '{}': yields must be positive",
                name
            )));
        }

        // 2024 is a leap year, so Feb 29 is accepted
        if NaiveDate::from_ymd_opt(2024, self.harvest.month, self.harvest.day).is_none() {
            return Err(AnalyticsError::Config(format!(
                "growth model '{}': invalid harvest day {}/{}",
                name, self.harvest.month, self.harvest.day
            )));
        }
        Ok(())
    }
}

/// Model parameters keyed by crop, with a generic fallback entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GrowthModelTable {
    pub periods: u32,
    pub generic: GrowthModel,
    #[serde(default)]
    pub crops: BTreeMap<String, GrowthModel>,
}

impl GrowthModelTable {
    pub fn builtin() -> Result<Self, AnalyticsError> {
        Self::from_toml_str(BUILTIN_MODELS)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, AnalyticsError> {
        let mut table: GrowthModelTable = toml::from_str(source)
            .map_err(|e| AnalyticsError::Config(format!("growth models: {}", e)))?;

        table.crops = std::mem::take(&mut table.crops)
            .into_iter()
            .map(|(name, model)| (CropType::new(&name).as_str().to_string(), model))
            .collect();
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), AnalyticsError> {
        if self.periods == 0 || self.periods > MAX_PERIODS {
            return Err(AnalyticsError::Config(format!(
                "growth models: periods must be within 1..={}",
                MAX_PERIODS
            )));
        }
        self.generic.validate("generic")?;
        for (name, model) in &self.crops {
            model.validate(name)?;
        }
        Ok(())
    }

    /// Fail unless every listed crop has its own entry.
    pub fn require(&self, crops: &[CropType]) -> Result<(), AnalyticsError> {
        let missing: Vec<&str> = crops
            .iter()
            .filter(|c| !self.crops.contains_key(c.as_str()))
            .map(|c| c.as_str())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AnalyticsError::Config(format!(
                "missing growth model parameters for: {}",
                missing.join(", ")
            )))
        }
    }

    /// Model for the crop and whether the generic fallback was used.
    pub fn lookup(&self, crop: &CropType) -> (&GrowthModel, bool) {
        match self.crops.get(crop.as_str()) {
            Some(model) => (model, false),
            None => (&self.generic, true),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GrowthForecaster {
    table: GrowthModelTable,
}

impl GrowthForecaster {
    pub fn new(table: GrowthModelTable) -> Self {
        Self { table }
    }

    pub fn periods(&self) -> u32 {
        self.table.periods
    }

    pub fn known_crops(&self) -> Vec<CropType> {
        self.table.crops.keys().map(|k| CropType::new(k)).collect()
    }

    /// Predicted and ideal trajectories for the crop, with `observed` laid
    /// over the first periods as the actual series.
    pub fn forecast(&self, crop: &CropType, observed: &[f64]) -> GrowthCurve {
        let (model, generic_model) = self.model(crop);
        let periods = self.table.periods;

        let predicted = model.predicted.evaluate(periods);
        let ideal = model
            .ideal
            .evaluate(periods)
            .into_iter()
            .zip(&predicted)
            .map(|(ideal, predicted)| ideal.max(*predicted))
            .collect();

        if observed.len() > periods as usize {
            tracing::warn!(
                "Ignoring {} observation(s) past week {} for {}",
                observed.len() - periods as usize,
                periods,
                crop
            );
        }

        let mut actual: Vec<Option<f64>> = observed
            .iter()
            .take(periods as usize)
            .map(|v| (v.is_finite() && (0.0..=100.0).contains(v)).then_some(*v))
            .collect();
        actual.resize(periods as usize, None);

        GrowthCurve {
            crop: crop.clone(),
            periods: (1..=periods).collect(),
            predicted,
            actual,
            ideal,
            generic_model,
        }
    }

    pub fn yield_estimate(&self, crop: &CropType) -> YieldEstimate {
        self.model(crop).0.yield_estimate
    }

    pub fn harvest_estimate(&self, crop: &CropType, now: DateTime<Utc>) -> HarvestEstimate {
        let today = now.date_naive();
        let expected_date = self
            .model(crop)
            .0
            .harvest
            .next_on_or_after(today)
            .unwrap_or(today);

        HarvestEstimate {
            days_remaining: (expected_date - today).num_days(),
            expected_date,
        }
    }

    pub fn outlook(&self, crop: &CropType, observed: &[f64], now: DateTime<Utc>) -> CropOutlook {
        let curve = self.forecast(crop, observed);
        CropOutlook {
            progress: curve.progress(),
            curve,
            yield_estimate: self.yield_estimate(crop),
            harvest: self.harvest_estimate(crop, now),
        }
    }

    fn model(&self, crop: &CropType) -> (&GrowthModel, bool) {
        let (model, generic) = self.table.lookup(crop);
        if generic {
            tracing::debug!("No growth model for crop '{}', using generic parameters", crop);
        }
        (model, generic)
    }
}

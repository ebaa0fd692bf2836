// Farm profile - What the facade knows about a farm besides its readings
use super::growth::CropType;
use super::irrigation::ZoneProfile;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FarmProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub crop: Option<CropType>,
    /// Growth observations (percent of maturity), one per elapsed week.
    #[serde(default)]
    pub observed_growth: Vec<f64>,
    #[serde(default)]
    pub zones: Vec<ZoneProfile>,
}

impl FarmProfile {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            crop: None,
            observed_growth: Vec::new(),
            zones: Vec::new(),
        }
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.id.trim_end_matches('_').replace('_', " "))
    }
}

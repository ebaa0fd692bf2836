// Disease detection domain models
use super::growth::CropType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a detected disease, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SeverityTier {
    None,
    Low,
    Medium,
    High,
}

impl SeverityTier {
    pub fn badge(self) -> Tone {
        match self {
            SeverityTier::High => Tone::Danger,
            SeverityTier::Medium => Tone::Warning,
            SeverityTier::Low => Tone::Success,
            SeverityTier::None => Tone::Secondary,
        }
    }
}

/// Colour family a presentation layer should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Danger,
    Warning,
    Success,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub tier: SeverityTier,
    pub badge_color: Tone,
}

/// Output of an image classification model for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiseaseDetection {
    pub crop: CropType,
    pub disease: String,
    pub confidence: f64,
    pub location: String,
    #[serde(alias = "detected_at")]
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiseaseAlert {
    pub crop: CropType,
    pub disease: String,
    pub confidence: f64,
    pub severity: SeverityTier,
    pub badge_color: Tone,
    /// Confidence-bar colour; independent of `severity`.
    pub confidence_tone: Tone,
    pub location: String,
    pub detected_at: DateTime<Utc>,
    pub description: String,
    pub recommendations: Vec<String>,
    /// Set when the (crop, disease) pair had no knowledge base entry.
    pub generic_guidance: bool,
}

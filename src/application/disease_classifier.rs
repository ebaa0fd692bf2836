// Disease risk classifier - Severity tiers and agronomic guidance
use crate::domain::disease::{
    Classification, DiseaseAlert, DiseaseDetection, SeverityTier, Tone,
};
use crate::domain::growth::CropType;
use crate::error::AnalyticsError;
use serde::Deserialize;
use std::cmp::Reverse;
use std::collections::HashMap;

/// Confidence thresholds (percent) for the severity tiers.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SeverityThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            high: 90.0,
            medium: 80.0,
        }
    }
}

impl SeverityThresholds {
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if 0.0 < self.medium && self.medium <= self.high && self.high <= 100.0 {
            Ok(())
        } else {
            Err(AnalyticsError::Config(format!(
                "severity thresholds must satisfy 0 < medium <= high <= 100 (medium={}, high={})",
                self.medium, self.high
            )))
        }
    }
}

/// Confidence-bar colour, independent of the severity tier.
pub fn confidence_tone(confidence: f64) -> Tone {
    if confidence >= 90.0 {
        Tone::Danger
    } else if confidence >= 70.0 {
        Tone::Warning
    } else {
        Tone::Success
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Guidance {
    pub description: String,
    pub recommendations: Vec<String>,
}

/// Fixed (crop, disease) -> guidance lookup.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: HashMap<(String, String), Guidance>,
    fallback: Guidance,
}

impl KnowledgeBase {
    pub fn builtin() -> Self {
        let mut kb = Self {
            entries: HashMap::new(),
            fallback: Guidance {
                description: "No reference entry exists for this crop and disease. Treat the \
                              detection as unconfirmed until inspected in the field."
                    .to_string(),
                recommendations: vec![
                    "Monitor affected plants for spreading symptoms".to_string(),
                    "Consult an agronomist to confirm the diagnosis".to_string(),
                ],
            },
        };

        kb.insert(
            "tomato",
            "late blight",
            "Late blight is a destructive disease of tomato and potato that can kill plants \
             within days. It is caused by the oomycete pathogen Phytophthora infestans.",
            &[
                "Apply fungicide immediately to prevent spread",
                "Isolate affected plants if possible",
                "Increase plant spacing for better air circulation",
                "Avoid overhead irrigation",
            ],
        );
        kb.insert(
            "wheat",
            "powdery mildew",
            "Powdery mildew is a fungal disease that appears as a white powdery substance on \
             the leaf surface. It affects plant growth and yield.",
            &[
                "Apply sulfur-based fungicide",
                "Maintain proper plant spacing",
                "Monitor environmental conditions",
                "Rotate crops in the next season",
            ],
        );
        kb.insert(
            "corn",
            "northern leaf blight",
            "Northern corn leaf blight is a fungal disease that starts as small tan spots and \
             develops into long, narrow lesions on corn leaves.",
            &[
                "Monitor disease progression",
                "Apply fungicide if disease spreads",
                "Plant resistant varieties next season",
                "Implement crop rotation practices",
            ],
        );
        kb
    }

    fn insert(&mut self, crop: &str, disease: &str, description: &str, recommendations: &[&str]) {
        self.entries.insert(
            key(&CropType::new(crop), disease),
            Guidance {
                description: description.to_string(),
                recommendations: recommendations.iter().map(|r| r.to_string()).collect(),
            },
        );
    }

    /// Guidance for the pair, and whether the generic entry was used.
    pub fn lookup(&self, crop: &CropType, disease: &str) -> (&Guidance, bool) {
        match self.entries.get(&key(crop, disease)) {
            Some(guidance) => (guidance, false),
            None => (&self.fallback, true),
        }
    }
}

fn key(crop: &CropType, disease: &str) -> (String, String) {
    let disease = disease.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    (crop.as_str().to_string(), disease)
}

#[derive(Debug, Clone)]
pub struct DiseaseClassifier {
    thresholds: SeverityThresholds,
    knowledge: KnowledgeBase,
}

impl DiseaseClassifier {
    pub fn new(
        thresholds: SeverityThresholds,
        knowledge: KnowledgeBase,
    ) -> Result<Self, AnalyticsError> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            knowledge,
        })
    }

    pub fn thresholds(&self) -> SeverityThresholds {
        self.thresholds
    }

    pub fn classify(&self, confidence: f64) -> Result<Classification, AnalyticsError> {
        if !(confidence.is_finite() && (0.0..=100.0).contains(&confidence)) {
            return Err(AnalyticsError::InvalidConfidence(confidence));
        }

        let tier = if confidence >= self.thresholds.high {
            SeverityTier::High
        } else if confidence >= self.thresholds.medium {
            SeverityTier::Medium
        } else if confidence > 0.0 {
            SeverityTier::Low
        } else {
            SeverityTier::None
        };

        Ok(Classification {
            tier,
            badge_color: tier.badge(),
        })
    }

    pub fn assess(&self, detection: DiseaseDetection) -> Result<DiseaseAlert, AnalyticsError> {
        let classification = self.classify(detection.confidence)?;
        let (guidance, generic_guidance) =
            self.knowledge.lookup(&detection.crop, &detection.disease);
        if generic_guidance {
            tracing::debug!(
                "No guidance for {} / {}, using generic entry",
                detection.crop,
                detection.disease
            );
        }

        let recommendations = if classification.tier == SeverityTier::None {
            Vec::new()
        } else {
            guidance.recommendations.clone()
        };

        Ok(DiseaseAlert {
            confidence_tone: confidence_tone(detection.confidence),
            crop: detection.crop,
            disease: detection.disease,
            confidence: detection.confidence,
            severity: classification.tier,
            badge_color: classification.badge_color,
            location: detection.location,
            detected_at: detection.detected_at,
            description: guidance.description.clone(),
            recommendations,
            generic_guidance,
        })
    }

    /// Assess every detection, skipping invalid ones, most severe and most
    /// recent first.
    pub fn assess_all(&self, detections: Vec<DiseaseDetection>) -> Vec<DiseaseAlert> {
        let mut alerts: Vec<DiseaseAlert> = detections
            .into_iter()
            .filter_map(|detection| match self.assess(detection) {
                Ok(alert) => Some(alert),
                Err(e) => {
                    tracing::warn!("Skipping disease detection: {}", e);
                    None
                }
            })
            .collect();

        alerts.sort_by_key(|a| (Reverse(a.severity), Reverse(a.detected_at)));
        alerts
    }
}

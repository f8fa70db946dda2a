//! Serving-path predictions.
//!
//! Analytics is advisory: every internal failure is logged and replaced with
//! the documented fallback values, never surfaced to the caller.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::RiskLevel;
use crate::error::Result;
use crate::features::FeatureVector;
use crate::records::StudentClasswork;
use crate::store::{LoadedModels, ModelStore};

/// Eight-bucket letter scale used across the host gradebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LetterGrade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "C+")]
    CPlus,
    C,
    D,
    F,
}

impl LetterGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            LetterGrade::APlus
        } else if score >= 80.0 {
            LetterGrade::A
        } else if score >= 70.0 {
            LetterGrade::BPlus
        } else if score >= 60.0 {
            LetterGrade::B
        } else if score >= 50.0 {
            LetterGrade::CPlus
        } else if score >= 40.0 {
            LetterGrade::C
        } else if score >= 30.0 {
            LetterGrade::D
        } else {
            LetterGrade::F
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::APlus => "A+",
            LetterGrade::A => "A",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskResult {
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub recommendations: Vec<String>,
    pub features: FeatureVector,
}

impl RiskResult {
    fn fallback(features: FeatureVector) -> Self {
        RiskResult {
            risk_level: RiskLevel::Medium,
            risk_score: 0.5,
            recommendations: vec!["models not available".to_string()],
            features,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeResult {
    pub predicted_grade: LetterGrade,
    pub predicted_score: f64,
    pub confidence: f64,
    pub features: FeatureVector,
}

impl GradeResult {
    fn fallback(features: FeatureVector) -> Self {
        GradeResult {
            predicted_grade: LetterGrade::B,
            predicted_score: 75.0,
            confidence: 0.5,
            features,
        }
    }
}

/// Rule-based advice derived from the features alone, independent of any
/// model. Order is fixed.
pub fn recommendations_for(features: &FeatureVector) -> Vec<String> {
    let mut recommendations = Vec::new();
    if features.avg_score < 60.0 {
        recommendations.push("Focus on improving assignment quality".to_string());
    }
    if features.submission_rate < 70.0 {
        recommendations.push("Submit assignments more consistently".to_string());
    }
    if features.on_time_rate < 70.0 {
        recommendations.push("Improve time management for deadlines".to_string());
    }
    if features.days_since_last > 7.0 {
        recommendations.push("Stay more engaged with recent assignments".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("Keep up the good work!".to_string());
    }
    recommendations
}

/// Applies the loaded models to live feature vectors. Every result carries
/// the extracted features so downstream trend rules work even in degraded
/// mode.
pub struct Predictor {
    store: Arc<ModelStore>,
}

impl Predictor {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Predictor { store }
    }

    pub fn predict_risk(&self, work: &StudentClasswork) -> RiskResult {
        let features = work.features();
        let Some(models) = self.store.load() else {
            return RiskResult::fallback(features);
        };
        match risk_with_models(&models, &features) {
            Ok(result) => result,
            Err(error) => {
                warn!(%error, "risk prediction failed, serving fallback");
                RiskResult::fallback(features)
            }
        }
    }

    pub fn predict_grade(&self, work: &StudentClasswork) -> GradeResult {
        let features = work.features();
        let Some(models) = self.store.load() else {
            return GradeResult::fallback(features);
        };
        match grade_with_models(&models, &features) {
            Ok(result) => result,
            Err(error) => {
                warn!(%error, "grade prediction failed, serving fallback");
                GradeResult::fallback(features)
            }
        }
    }
}

fn risk_with_models(models: &LoadedModels, features: &FeatureVector) -> Result<RiskResult> {
    let (class, proba) = models.risk.predict(features)?;
    let risk_level = RiskLevel::from_index(class);
    let risk_score = proba
        .get(class.min(proba.len().saturating_sub(1)))
        .copied()
        .unwrap_or(0.0);

    Ok(RiskResult {
        risk_level,
        risk_score,
        recommendations: recommendations_for(features),
        features: *features,
    })
}

fn grade_with_models(models: &LoadedModels, features: &FeatureVector) -> Result<GradeResult> {
    let raw = models.grade.predict(features)?;
    let predicted_score = (raw.clamp(0.0, 100.0) * 10.0).round() / 10.0;
    let confidence = 0.7 + 0.3 * (features.submission_rate / 100.0);

    Ok(GradeResult {
        predicted_grade: LetterGrade::from_score(predicted_score),
        predicted_score,
        confidence,
        features: *features,
    })
}

//! The host-facing analytics summary: risk, predicted grade, and trend in
//! one composite result.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::data::RiskLevel;
use crate::features::FeatureVector;
use crate::predict::{LetterGrade, Predictor};
use crate::records::StudentClasswork;
use crate::store::ModelStore;

/// Qualitative performance label derived from feature thresholds alone,
/// independent of model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PerformanceTrend {
    Excellent,
    Good,
    Average,
    #[serde(rename = "Needs Improvement")]
    NeedsImprovement,
}

impl PerformanceTrend {
    /// First matching rule wins, evaluated top to bottom.
    pub fn from_features(features: &FeatureVector) -> Self {
        if features.avg_score >= 75.0 && features.submission_rate >= 80.0 {
            PerformanceTrend::Excellent
        } else if features.avg_score >= 60.0 && features.submission_rate >= 70.0 {
            PerformanceTrend::Good
        } else if features.avg_score >= 50.0 {
            PerformanceTrend::Average
        } else {
            PerformanceTrend::NeedsImprovement
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceTrend::Excellent => "Excellent",
            PerformanceTrend::Good => "Good",
            PerformanceTrend::Average => "Average",
            PerformanceTrend::NeedsImprovement => "Needs Improvement",
        }
    }
}

impl fmt::Display for PerformanceTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete per-student, per-classroom analytics summary. Built fresh on
/// every call; never cached or persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsResult {
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub recommendations: Vec<String>,
    pub predicted_grade: LetterGrade,
    pub predicted_score: f64,
    pub confidence: f64,
    pub performance_trend: PerformanceTrend,
    pub summary: String,
}

/// The one entry point the host application calls.
pub struct StudentAnalytics {
    predictor: Predictor,
}

impl StudentAnalytics {
    pub fn new(store: Arc<ModelStore>) -> Self {
        StudentAnalytics {
            predictor: Predictor::new(store),
        }
    }

    /// Stateless and infallible: degraded modes surface as fallback values,
    /// never as errors.
    pub fn get_analytics(&self, work: &StudentClasswork) -> AnalyticsResult {
        let risk = self.predictor.predict_risk(work);
        let grade = self.predictor.predict_grade(work);

        let performance_trend = PerformanceTrend::from_features(&risk.features);
        let summary = format!(
            "Risk: {}, Predicted: {}, Trend: {}",
            risk.risk_level, grade.predicted_grade, performance_trend
        );

        AnalyticsResult {
            risk_level: risk.risk_level,
            risk_score: risk.risk_score,
            recommendations: risk.recommendations,
            predicted_grade: grade.predicted_grade,
            predicted_score: grade.predicted_score,
            confidence: grade.confidence,
            performance_trend,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(avg_score: f64, submission_rate: f64) -> FeatureVector {
        FeatureVector {
            avg_score,
            submission_rate,
            on_time_rate: 0.0,
            participation: 0.0,
            assignment_count: 0,
            days_since_last: 30.0,
        }
    }

    #[test]
    fn trend_thresholds() {
        assert_eq!(
            PerformanceTrend::from_features(&features(80.0, 85.0)),
            PerformanceTrend::Excellent
        );
        assert_eq!(
            PerformanceTrend::from_features(&features(65.0, 75.0)),
            PerformanceTrend::Good
        );
        assert_eq!(
            PerformanceTrend::from_features(&features(55.0, 10.0)),
            PerformanceTrend::Average
        );
        assert_eq!(
            PerformanceTrend::from_features(&features(30.0, 10.0)),
            PerformanceTrend::NeedsImprovement
        );
    }

    #[test]
    fn high_submission_rate_alone_is_not_excellent() {
        assert_eq!(
            PerformanceTrend::from_features(&features(74.9, 100.0)),
            PerformanceTrend::Good
        );
    }

    #[test]
    fn analytics_without_models_is_complete() {
        let dir = tempfile::tempdir().expect("temp dir");
        let engine = StudentAnalytics::new(Arc::new(ModelStore::open(dir.path())));

        let result = engine.get_analytics(&StudentClasswork::default());

        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.predicted_grade, LetterGrade::B);
        // Empty history: zero scores land on the lowest trend bucket.
        assert_eq!(result.performance_trend, PerformanceTrend::NeedsImprovement);
        assert_eq!(result.summary, "Risk: Medium, Predicted: B, Trend: Needs Improvement");
    }
}

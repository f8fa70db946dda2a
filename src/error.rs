use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Failures surfaced by the analytics engine.
///
/// Training-path errors propagate to the operator; serving-path errors are
/// absorbed by the predictor and replaced with fallback values.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corpus write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("feature matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("scaler expects {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("model fit failed: {0}")]
    Fit(String),

    #[error("training corpus is empty")]
    EmptyCorpus,

    #[error("another training run holds the lock at {}", .0.display())]
    TrainingLocked(PathBuf),
}

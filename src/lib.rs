//! Student analytics engine: derives engagement features from classroom
//! records and applies two trained models - an ordinal risk classifier and a
//! grade-score regressor - to produce a per-student analytics summary.
//!
//! The host application supplies grade, submission, and assignment records
//! and calls [`StudentAnalytics::get_analytics`]. Training runs out of band
//! through [`train`] on an operator-provided synthetic corpus; when no
//! trained models exist the engine serves documented fallback values instead
//! of failing.

pub mod analytics;
pub mod data;
pub mod error;
pub mod features;
pub mod model;
pub mod predict;
pub mod records;
pub mod store;
pub mod train;

pub use analytics::{AnalyticsResult, PerformanceTrend, StudentAnalytics};
pub use data::{generate, RiskLevel, TrainingCorpus, TrainingSample, DEFAULT_SEED};
pub use error::{AnalyticsError, Result};
pub use features::{FeatureVector, FEATURE_NAMES};
pub use predict::{GradeResult, LetterGrade, Predictor, RiskResult};
pub use records::{AssignmentRecord, GradeRecord, StudentClasswork, SubmissionRecord};
pub use store::{ArtifactPaths, LoadedModels, ModelStore};
pub use train::{train, TrainingConfig, TrainingMetadata};

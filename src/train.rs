//! Out-of-band training: corpus generation, fitting, held-out evaluation,
//! and atomic artifact publication.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::{self, RiskLevel, DEFAULT_SEED};
use crate::error::{AnalyticsError, Result};
use crate::features::FEATURE_NAMES;
use crate::model::{GradeModel, GradientBoostedTrees, RandomForest, RiskModel, StandardScaler};
use crate::store::{ArtifactPaths, ModelStore};

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub sample_count: usize,
    pub seed: u64,
    pub test_ratio: f64,
    pub risk_trees: usize,
    pub grade_estimators: usize,
    pub learning_rate: f64,
    pub grade_tree_depth: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            sample_count: 2000,
            seed: DEFAULT_SEED,
            test_ratio: 0.2,
            risk_trees: 100,
            grade_estimators: 100,
            learning_rate: 0.1,
            grade_tree_depth: 3,
        }
    }
}

impl TrainingConfig {
    pub fn with_samples(sample_count: usize) -> Self {
        TrainingConfig {
            sample_count,
            ..TrainingConfig::default()
        }
    }
}

/// Written alongside the models once per run; read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub training_date: DateTime<Utc>,
    pub samples: usize,
    pub risk_accuracy: f64,
    pub grade_r2: f64,
    pub grade_mse: f64,
    pub features: Vec<String>,
}

/// Run a full training pass and publish the artifact set.
///
/// Any failure aborts the run with nothing published; the previous artifact
/// set (if any) stays live. Guarded by an exclusive lock file so two
/// operator-triggered runs cannot overlap.
pub fn train(store: &ModelStore, config: &TrainingConfig) -> Result<TrainingMetadata> {
    let _lock = TrainLock::acquire(store.paths())?;

    if config.sample_count == 0 {
        return Err(AnalyticsError::EmptyCorpus);
    }

    info!(samples = config.sample_count, "generating synthetic training corpus");
    let corpus = data::generate(config.sample_count, config.seed);

    fs::create_dir_all(store.paths().data_dir())?;
    data::write_corpus_csv(&corpus, &store.paths().training_data())?;

    let x = data::feature_matrix(&corpus)?;
    let risk_y = data::risk_targets(&corpus);
    let grade_y = data::grade_targets(&corpus);

    let (train_idx, test_idx) = split_indices(corpus.len(), config.test_ratio, config.seed);
    if train_idx.is_empty() || test_idx.is_empty() {
        return Err(AnalyticsError::Fit(format!(
            "{} samples is too few for an {}/{} split",
            corpus.len(),
            ((1.0 - config.test_ratio) * 100.0).round(),
            (config.test_ratio * 100.0).round(),
        )));
    }
    let x_train = x.select(Axis(0), &train_idx);
    let x_test = x.select(Axis(0), &test_idx);

    // Risk classifier. The scaler is fit on the training split only and
    // travels with the model from here on.
    let risk_scaler = StandardScaler::fit(&x_train);
    let forest = RandomForest::fit(
        &risk_scaler.transform(&x_train)?,
        &risk_y.select(Axis(0), &train_idx),
        config.risk_trees,
        RiskLevel::LEVELS.len(),
        config.seed,
    )?;
    let risk_pred = forest.predict_batch(&risk_scaler.transform(&x_test)?)?;
    let risk_accuracy = accuracy(&risk_pred, &risk_y.select(Axis(0), &test_idx));
    info!(accuracy = risk_accuracy, trees = forest.n_trees(), "risk model fit");

    // Grade regressor, with its own scaler from the same split.
    let grade_scaler = StandardScaler::fit(&x_train);
    let booster = GradientBoostedTrees::fit(
        &grade_scaler.transform(&x_train)?,
        &grade_y.select(Axis(0), &train_idx),
        config.grade_estimators,
        config.learning_rate,
        config.grade_tree_depth,
    )?;
    let grade_pred = booster.predict_batch(&grade_scaler.transform(&x_test)?)?;
    let grade_truth = grade_y.select(Axis(0), &test_idx);
    let grade_mse = mean_squared_error(&grade_pred, &grade_truth);
    let grade_r2 = r2_score(&grade_pred, &grade_truth);
    info!(r2 = grade_r2, mse = grade_mse, "grade model fit");

    let metadata = TrainingMetadata {
        training_date: Utc::now(),
        samples: corpus.len(),
        risk_accuracy,
        grade_r2,
        grade_mse,
        features: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
    };

    store.publish(
        RiskModel::new(forest, risk_scaler),
        GradeModel::new(booster, grade_scaler),
        &metadata,
    )?;

    Ok(metadata)
}

/// Seeded shuffle split; the same seed reproduces the same partition.
fn split_indices(n: usize, test_ratio: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_len = ((n as f64) * test_ratio).round() as usize;
    let (test, train) = indices.split_at(test_len.min(n));
    (train.to_vec(), test.to_vec())
}

fn accuracy(predictions: &Array1<usize>, targets: &Array1<usize>) -> f64 {
    predictions
        .iter()
        .zip(targets.iter())
        .filter(|(predicted, target)| predicted == target)
        .count() as f64
        / targets.len() as f64
}

fn mean_squared_error(predictions: &Array1<f64>, targets: &Array1<f64>) -> f64 {
    predictions
        .iter()
        .zip(targets.iter())
        .map(|(predicted, target)| (predicted - target).powi(2))
        .sum::<f64>()
        / targets.len() as f64
}

fn r2_score(predictions: &Array1<f64>, targets: &Array1<f64>) -> f64 {
    let mean = targets.mean().unwrap_or(0.0);
    let ss_tot: f64 = targets.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_res: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(predicted, target)| (target - predicted).powi(2))
        .sum();
    if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        0.0
    }
}

/// Exclusive training lock: a create-new lock file, removed on drop.
struct TrainLock {
    path: PathBuf,
}

impl TrainLock {
    fn acquire(paths: &ArtifactPaths) -> Result<Self> {
        fs::create_dir_all(paths.models_dir())?;
        let path = paths.lock_file();
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(TrainLock { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(AnalyticsError::TrainingLocked(path))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TrainLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

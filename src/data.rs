//! Synthetic training corpus generation.
//!
//! Labels are derived from the generated features rather than drawn
//! independently, so the models learn the same structure a real engagement
//! signal would exhibit; additive noise prevents a trivial deterministic fit.

use std::fmt;
use std::path::Path;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::{FeatureVector, FEATURE_NAMES};

/// Seed used for corpus generation and the train/test split unless the
/// operator overrides it.
pub const DEFAULT_SEED: u64 = 42;

/// Ordinal classification of how likely a student is to fall behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const LEVELS: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Map a raw class index to a level, clamping out-of-range indices to
    /// the highest level rather than panicking.
    pub fn from_index(index: usize) -> Self {
        Self::LEVELS[index.min(Self::LEVELS.len() - 1)]
    }

    pub fn as_index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labeled sample: a feature vector plus the rule-derived risk level and
/// final grade.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub risk_level: RiskLevel,
    pub final_grade: f64,
}

pub type TrainingCorpus = Vec<TrainingSample>;

/// Generate a labeled corpus, deterministic for a given seed.
pub fn generate(sample_count: usize, seed: u64) -> TrainingCorpus {
    let mut rng = StdRng::seed_from_u64(seed);

    let ability_dist = Normal::<f64>::new(0.7, 0.2).expect("valid distribution parameters");
    let motivation_dist = Normal::<f64>::new(0.75, 0.15).expect("valid distribution parameters");
    let noise5 = Normal::<f64>::new(0.0, 5.0).expect("valid distribution parameters");
    let noise8 = Normal::<f64>::new(0.0, 8.0).expect("valid distribution parameters");
    let noise10 = Normal::<f64>::new(0.0, 10.0).expect("valid distribution parameters");
    let days_dist = Exp::<f64>::new(1.0 / 5.0).expect("valid distribution parameters");

    let mut samples = Vec::with_capacity(sample_count);
    for _ in 0..sample_count {
        // Two latent traits drive every observable metric.
        let ability: f64 = ability_dist.sample(&mut rng).clamp(0.1, 1.0);
        let motivation: f64 = motivation_dist.sample(&mut rng).clamp(0.2, 1.0);

        let avg_score = (ability * 90.0 + noise5.sample(&mut rng)).clamp(0.0, 100.0);
        let submission_rate = (motivation * 95.0 + noise8.sample(&mut rng)).clamp(0.0, 100.0);
        let on_time_rate =
            ((ability + motivation) / 2.0 * 90.0 + noise10.sample(&mut rng)).clamp(0.0, 100.0);
        let participation = (motivation * 80.0 + noise10.sample(&mut rng)).clamp(0.0, 100.0);

        let risk_level = risk_label(avg_score, submission_rate, on_time_rate);
        let final_grade = (avg_score * 0.4
            + submission_rate * 0.2
            + on_time_rate * 0.2
            + participation * 0.2
            + noise5.sample(&mut rng))
        .clamp(0.0, 100.0);

        let features = FeatureVector {
            avg_score,
            submission_rate,
            on_time_rate,
            participation,
            assignment_count: rng.gen_range(5u32..20),
            days_since_last: days_dist.sample(&mut rng).min(30.0),
        };

        samples.push(TrainingSample {
            features,
            risk_level,
            final_grade,
        });
    }

    samples
}

/// Additive rule score over the three strongest signals, bucketed into the
/// four ordinal levels.
pub fn risk_label(avg_score: f64, submission_rate: f64, on_time_rate: f64) -> RiskLevel {
    let mut score = 0u8;

    if avg_score < 40.0 {
        score += 3;
    } else if avg_score < 60.0 {
        score += 2;
    } else if avg_score < 70.0 {
        score += 1;
    }

    if submission_rate < 50.0 {
        score += 2;
    } else if submission_rate < 70.0 {
        score += 1;
    }

    if on_time_rate < 50.0 {
        score += 2;
    } else if on_time_rate < 70.0 {
        score += 1;
    }

    match score {
        0 => RiskLevel::Low,
        1..=2 => RiskLevel::Medium,
        3..=4 => RiskLevel::High,
        _ => RiskLevel::Critical,
    }
}

/// Corpus features as a row-per-sample matrix in `FEATURE_NAMES` order.
pub fn feature_matrix(corpus: &[TrainingSample]) -> Result<Array2<f64>> {
    let flat: Vec<f64> = corpus.iter().flat_map(|s| s.features.as_array()).collect();
    Ok(Array2::from_shape_vec(
        (corpus.len(), FEATURE_NAMES.len()),
        flat,
    )?)
}

pub fn risk_targets(corpus: &[TrainingSample]) -> Array1<usize> {
    Array1::from_iter(corpus.iter().map(|s| s.risk_level.as_index()))
}

pub fn grade_targets(corpus: &[TrainingSample]) -> Array1<f64> {
    Array1::from_iter(corpus.iter().map(|s| s.final_grade))
}

/// Write the audit copy of the corpus. Regenerated wholesale on every
/// training run.
pub fn write_corpus_csv(corpus: &[TrainingSample], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
    header.push("risk_level".to_string());
    header.push("final_grade".to_string());
    writer.write_record(&header)?;

    for sample in corpus {
        let f = &sample.features;
        writer.write_record(&[
            f.avg_score.to_string(),
            f.submission_rate.to_string(),
            f.on_time_rate.to_string(),
            f.participation.to_string(),
            f.assignment_count.to_string(),
            f.days_since_last.to_string(),
            sample.risk_level.as_index().to_string(),
            sample.final_grade.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

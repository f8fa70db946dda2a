//! Persisted model artifacts and the in-memory snapshot handed to the
//! serving path.
//!
//! "No models on disk" is an expected degraded mode, not an error: the
//! loader answers `None` and the predictor serves fixed fallback values.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::model::{GradeModel, GradientBoostedTrees, RandomForest, RiskModel, StandardScaler};
use crate::train::TrainingMetadata;

const RISK_MODEL_FILE: &str = "risk_model.json";
const RISK_SCALER_FILE: &str = "risk_scaler.json";
const GRADE_MODEL_FILE: &str = "grade_model.json";
const GRADE_SCALER_FILE: &str = "grade_scaler.json";
const METADATA_FILE: &str = "metadata.json";
const TRAINING_DATA_FILE: &str = "training_data.csv";
const LOCK_FILE: &str = ".train.lock";

/// Well-known layout of the artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    base: PathBuf,
}

impl ArtifactPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        ArtifactPaths { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn models_dir(&self) -> PathBuf {
        self.base.join("models")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base.join("data")
    }

    pub fn risk_model(&self) -> PathBuf {
        self.models_dir().join(RISK_MODEL_FILE)
    }

    pub fn risk_scaler(&self) -> PathBuf {
        self.models_dir().join(RISK_SCALER_FILE)
    }

    pub fn grade_model(&self) -> PathBuf {
        self.models_dir().join(GRADE_MODEL_FILE)
    }

    pub fn grade_scaler(&self) -> PathBuf {
        self.models_dir().join(GRADE_SCALER_FILE)
    }

    pub fn metadata(&self) -> PathBuf {
        self.models_dir().join(METADATA_FILE)
    }

    pub fn training_data(&self) -> PathBuf {
        self.data_dir().join(TRAINING_DATA_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.models_dir().join(LOCK_FILE)
    }
}

/// An immutable, fully paired set of fitted models. Shared read-only across
/// concurrent prediction calls; replaced wholesale on retraining.
pub struct LoadedModels {
    pub risk: RiskModel,
    pub grade: GradeModel,
    pub metadata: Option<TrainingMetadata>,
}

/// Owns the artifact directory and the current in-memory snapshot.
pub struct ModelStore {
    paths: ArtifactPaths,
    current: RwLock<Option<Arc<LoadedModels>>>,
}

impl ModelStore {
    /// Bind a store to a directory. No I/O happens until `load`.
    pub fn open(base: impl Into<PathBuf>) -> Self {
        ModelStore {
            paths: ArtifactPaths::new(base),
            current: RwLock::new(None),
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Current snapshot, reading the artifacts from disk on first use.
    /// `None` means degraded mode: artifacts missing or unreadable.
    pub fn load(&self) -> Option<Arc<LoadedModels>> {
        if let Ok(slot) = self.current.read() {
            if let Some(models) = slot.as_ref() {
                return Some(Arc::clone(models));
            }
        }
        self.reload()
    }

    /// Drop the cached snapshot and re-read the artifacts from disk.
    pub fn reload(&self) -> Option<Arc<LoadedModels>> {
        let loaded = self.read_from_disk();
        if let Ok(mut slot) = self.current.write() {
            *slot = loaded.clone();
        }
        loaded
    }

    /// Read the metadata record alone, without loading models.
    pub fn read_metadata(&self) -> Option<TrainingMetadata> {
        read_artifact(&self.paths.metadata())
    }

    fn read_from_disk(&self) -> Option<Arc<LoadedModels>> {
        let forest: RandomForest = read_artifact(&self.paths.risk_model())?;
        let risk_scaler: StandardScaler = read_artifact(&self.paths.risk_scaler())?;
        let booster: GradientBoostedTrees = read_artifact(&self.paths.grade_model())?;
        let grade_scaler: StandardScaler = read_artifact(&self.paths.grade_scaler())?;
        let metadata: Option<TrainingMetadata> = read_artifact(&self.paths.metadata());

        Some(Arc::new(LoadedModels {
            risk: RiskModel::new(forest, risk_scaler),
            grade: GradeModel::new(booster, grade_scaler),
            metadata,
        }))
    }

    /// Replace the persisted artifact set and the in-memory snapshot.
    ///
    /// Every artifact is written to a staging directory on the same
    /// filesystem and moved into place with `rename`, so a concurrent
    /// `load` never observes a partially written file. The staging
    /// directory is cleaned up automatically if anything fails.
    pub fn publish(
        &self,
        risk: RiskModel,
        grade: GradeModel,
        metadata: &TrainingMetadata,
    ) -> Result<()> {
        let models_dir = self.paths.models_dir();
        fs::create_dir_all(&models_dir)?;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&models_dir)?;

        // Metadata goes last so a complete model set is always in place
        // before the record describing it.
        let artifacts = [
            (
                write_artifact(staging.path(), RISK_MODEL_FILE, &risk.forest)?,
                self.paths.risk_model(),
            ),
            (
                write_artifact(staging.path(), RISK_SCALER_FILE, &risk.scaler)?,
                self.paths.risk_scaler(),
            ),
            (
                write_artifact(staging.path(), GRADE_MODEL_FILE, &grade.booster)?,
                self.paths.grade_model(),
            ),
            (
                write_artifact(staging.path(), GRADE_SCALER_FILE, &grade.scaler)?,
                self.paths.grade_scaler(),
            ),
            (
                write_artifact(staging.path(), METADATA_FILE, metadata)?,
                self.paths.metadata(),
            ),
        ];
        for (staged, live) in artifacts {
            fs::rename(staged, live)?;
        }

        let snapshot = Arc::new(LoadedModels {
            risk,
            grade,
            metadata: Some(metadata.clone()),
        });
        if let Ok(mut slot) = self.current.write() {
            *slot = Some(snapshot);
        }

        info!(dir = %models_dir.display(), "model artifacts published");
        Ok(())
    }
}

fn write_artifact<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec(value)?)?;
    Ok(path)
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(path = %path.display(), %error, "model artifact unavailable");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(path = %path.display(), %error, "model artifact corrupt");
            None
        }
    }
}

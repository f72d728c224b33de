//! The persisted model file shared by the trainer and the dashboard.
//!
//! The trainer writes it once; the dashboard loads it once at startup and keeps
//! the resulting [`SolarModel`] as a read-only handle for the whole session.

use crate::forest::{ForestError, RandomForestRegressor};
use chrono::{DateTime, Utc};
use log::{info, warn};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ARTIFACT_VERSION: u32 = 1;

/// Column order of the model input, matching the CSV headers it was trained on.
pub const FEATURE_NAMES: [&str; 3] = ["IRRADIATION", "AMBIENT_TEMPERATURE", "MODULE_TEMPERATURE"];

/// Model input: irradiation in kW/m², temperatures in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub irradiation: f64,
    pub ambient_temperature: f64,
    pub module_temperature: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order.
    pub fn values(self) -> [f64; 3] {
        [self.irradiation, self.ambient_temperature, self.module_temperature]
    }

    pub fn to_array(self) -> Array1<f64> {
        Array1::from_iter(self.values())
    }

    pub fn is_finite(&self) -> bool {
        self.irradiation.is_finite() && self.ambient_temperature.is_finite() && self.module_temperature.is_finite()
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("model file {} not found", path.display())]
    NotFound { path: PathBuf },
    #[error("model file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model file {} could not be encoded: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("model file {} could not be decoded: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("model file has format version {found}, this build reads version {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("model was trained on features {found:?}, expected {expected:?}")]
    FeatureMismatch { found: Vec<String>, expected: Vec<String> },
}

#[derive(Debug, Error, PartialEq)]
pub enum PredictError {
    #[error("input contains a non-finite value: {0:?}")]
    NonFiniteInput(FeatureVector),
    #[error("model produced a non-finite value {0}")]
    NonFiniteOutput(f64),
    #[error(transparent)]
    Forest(#[from] ForestError),
}

/// Anything that maps a [`FeatureVector`] to predicted DC power.
pub trait PowerModel {
    fn predict(&self, features: FeatureVector) -> Result<f64, PredictError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub training_rows: usize,
    pub test_rows: usize,
    pub forest: RandomForestRegressor,
}

impl ModelArtifact {
    pub fn new(forest: RandomForestRegressor, training_rows: usize, test_rows: usize) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            created_at: Utc::now(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            training_rows,
            test_rows,
            forest,
        }
    }
}

pub fn save(path: &Path, artifact: &ModelArtifact) -> Result<(), ArtifactError> {
    write_atomically(path, |writer| {
        bincode::serialize_into(writer, artifact).map_err(|source| ArtifactError::Encode {
            path: path.to_path_buf(),
            source,
        })
    })?;
    info!("Model written to {}", path.display());
    Ok(())
}

/// Write next to the final location first, then rename over it. A failed
/// write removes the partial file and leaves any existing model untouched.
fn write_atomically<F>(path: &Path, write: F) -> Result<(), ArtifactError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), ArtifactError>,
{
    let tmp = path.with_extension("tmp");
    let io_err = |source| ArtifactError::Io {
        path: tmp.clone(),
        source,
    };

    let file = File::create(&tmp).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    let written = write(&mut writer).and_then(|()| writer.flush().map_err(io_err));
    drop(writer);
    if let Err(e) = written {
        if let Err(rm) = fs::remove_file(&tmp) {
            warn!("Could not remove partial model file {}: {}", tmp.display(), rm);
        }
        return Err(e);
    }

    fs::rename(&tmp, path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load(path: &Path) -> Result<SolarModel, ArtifactError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArtifactError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ArtifactError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let artifact: ModelArtifact =
        bincode::deserialize_from(BufReader::new(file)).map_err(|source| ArtifactError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    SolarModel::from_artifact(artifact)
}

/// Loaded, immutable model handle.
#[derive(Debug, Clone)]
pub struct SolarModel {
    artifact: ModelArtifact,
}

impl SolarModel {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ArtifactError> {
        if artifact.version != ARTIFACT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: artifact.version,
                expected: ARTIFACT_VERSION,
            });
        }
        if artifact.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES) {
            return Err(ArtifactError::FeatureMismatch {
                found: artifact.feature_names,
                expected: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            });
        }
        Ok(Self { artifact })
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }
}

impl PowerModel for SolarModel {
    fn predict(&self, features: FeatureVector) -> Result<f64, PredictError> {
        if !features.is_finite() {
            return Err(PredictError::NonFiniteInput(features));
        }
        let value = self.artifact.forest.predict_one(features.to_array().view())?;
        if !value.is_finite() {
            return Err(PredictError::NonFiniteOutput(value));
        }
        Ok(value)
    }
}

/// Small forest over a synthetic irradiance ramp, shared by tests across modules.
#[cfg(test)]
pub(crate) fn tiny_artifact() -> ModelArtifact {
    use ndarray::Array2;

    let x = Array2::from_shape_fn((30, 3), |(i, j)| {
        let irr = i as f64 / 25.0;
        [irr, 25.0 + 5.0 * irr, 25.0 + 30.0 * irr][j]
    });
    let y: Array1<f64> = x.column(0).mapv(|irr| irr * 12_000.0);
    let mut forest = RandomForestRegressor::new(crate::forest::ForestParams {
        n_estimators: 5,
        ..crate::forest::ForestParams::default()
    });
    forest.fit(&x, &y).expect("fit");
    ModelArtifact::new(forest, 24, 6)
}

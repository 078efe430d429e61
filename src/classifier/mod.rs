//! Fire/no-fire classifiers and their on-disk artifacts.
//!
//! Each family trains from dense feature rows plus 0/1 labels and predicts a
//! fire probability. Artifacts are stored as one JSON file per fixed model
//! name, written through a temp file and a rename so a reader never observes
//! a partially written artifact.

pub mod forest;
pub mod knn;
pub mod logistic;
pub mod scaler;

use crate::error::ArtifactError;
use crate::features::{columns_match, FEATURE_COLUMNS, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use forest::{ForestModel, ForestParams};
pub use knn::{KnnModel, KnnParams};
pub use logistic::{LogisticModel, LogisticParams};
pub use scaler::StandardScaler;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Fixed artifact names, in the order the registry consults them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelName {
    Logreg,
    Rf,
    Knn,
}

impl ModelName {
    pub const PRIORITY: [ModelName; 3] = [ModelName::Logreg, ModelName::Rf, ModelName::Knn];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logreg => "logreg",
            Self::Rf => "rf",
            Self::Knn => "knn",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.as_str())
    }

    pub fn path_in(self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

impl std::fmt::Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything the registry can ask for a fire decision.
pub trait FireClassifier: Send + Sync {
    fn family(&self) -> &'static str;

    fn predict_probability(&self, features: &[f64]) -> Result<f64, ArtifactError>;

    fn predict(&self, features: &[f64]) -> Result<bool, ArtifactError> {
        Ok(self.predict_probability(features)? >= 0.5)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ClassifierArtifact {
    Logistic(LogisticModel),
    Knn(KnnModel),
    Forest(ForestModel),
}

impl ClassifierArtifact {
    pub fn probability(&self, features: &[f64]) -> Result<f64, ArtifactError> {
        let p = match self {
            Self::Logistic(model) => model.probability(features)?,
            Self::Knn(model) => model.probability(features)?,
            Self::Forest(model) => model.probability(features)?,
        };
        if p.is_finite() {
            Ok(p)
        } else {
            Err(ArtifactError::NonFinite)
        }
    }

    pub fn validate(&self, n_features: usize) -> Result<(), ArtifactError> {
        match self {
            Self::Logistic(model) => model.validate(n_features),
            Self::Knn(model) => model.validate(n_features),
            Self::Forest(model) => model.validate(n_features),
        }
    }
}

impl FireClassifier for ClassifierArtifact {
    fn family(&self) -> &'static str {
        match self {
            Self::Logistic(_) => "logistic",
            Self::Knn(_) => "knn",
            Self::Forest(_) => "forest",
        }
    }

    fn predict_probability(&self, features: &[f64]) -> Result<f64, ArtifactError> {
        self.probability(features)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub format_version: u32,
    pub name: ModelName,
    pub feature_columns: Vec<String>,
    pub trained_unix_s: u64,
    pub model: ClassifierArtifact,
}

/// Balanced class weights `n / (2 * n_c)`; a missing class gets weight 0.
pub fn balanced_class_weights(labels: &[u8]) -> [f64; 2] {
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = labels.len() - positives;
    let n = labels.len() as f64;
    let weight = |count: usize| {
        if count == 0 {
            0.0
        } else {
            n / (2.0 * count as f64)
        }
    };
    [weight(negatives), weight(positives)]
}

#[inline]
pub(crate) fn check_dimension(expected: usize, features: &[f64]) -> Result<(), ArtifactError> {
    if features.len() != expected {
        return Err(ArtifactError::DimensionMismatch {
            expected,
            actual: features.len(),
        });
    }
    Ok(())
}

pub fn save_artifact(
    dir: &Path,
    name: ModelName,
    model: &ClassifierArtifact,
    trained_unix_s: u64,
) -> Result<PathBuf, ArtifactError> {
    let path = name.path_in(dir);
    let io_err = |source| ArtifactError::Io {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let file = ArtifactFile {
        format_version: ARTIFACT_FORMAT_VERSION,
        name,
        feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        trained_unix_s,
        model: model.clone(),
    };
    let encoded = serde_json::to_vec(&file).map_err(|source| ArtifactError::Parse {
        path: path.clone(),
        source,
    })?;

    let tmp_path = dir.join(format!(".{}.tmp", name.file_name()));
    fs::write(&tmp_path, encoded).map_err(io_err)?;
    fs::rename(&tmp_path, &path).map_err(io_err)?;
    Ok(path)
}

/// Load and fully validate one artifact; any defect rejects the whole file.
pub fn load_artifact(dir: &Path, name: ModelName) -> Result<ClassifierArtifact, ArtifactError> {
    let path = name.path_in(dir);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArtifactError::Missing { path });
        }
        Err(source) => return Err(ArtifactError::Io { path, source }),
    };
    let file: ArtifactFile =
        serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Parse {
            path: path.clone(),
            source,
        })?;

    if file.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            found: file.format_version,
            expected: ARTIFACT_FORMAT_VERSION,
        });
    }
    if file.name != name {
        return Err(ArtifactError::NameMismatch {
            expected: name.to_string(),
            found: file.name.to_string(),
        });
    }
    if !columns_match(&file.feature_columns) {
        return Err(ArtifactError::SchemaMismatch);
    }
    file.model.validate(FEATURE_COUNT)?;
    Ok(file.model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tiny_logistic() -> ClassifierArtifact {
        let x: Vec<Vec<f64>> = (0..FEATURE_COUNT * 4)
            .map(|i| {
                let mut row = vec![0.0; FEATURE_COUNT];
                row[0] = i as f64;
                row
            })
            .collect();
        let y: Vec<u8> = (0..x.len()).map(|i| u8::from(i >= x.len() / 2)).collect();
        ClassifierArtifact::Logistic(LogisticModel::fit(&x, &y, &LogisticParams::default()).unwrap())
    }

    #[test]
    fn balanced_weights_equalize_class_mass() {
        let labels = [0, 0, 0, 0, 0, 0, 0, 0, 1, 1];
        let [w0, w1] = balanced_class_weights(&labels);
        assert!((w0 * 8.0 - w1 * 2.0).abs() < 1e-9);
        assert!((w0 - 10.0 / 16.0).abs() < 1e-9);
    }

    #[test]
    fn artifact_roundtrips_through_disk() {
        let dir = TempDir::new().unwrap();
        let model = tiny_logistic();
        let path = save_artifact(dir.path(), ModelName::Logreg, &model, 7).unwrap();
        assert!(path.ends_with("logreg.json"));

        let loaded = load_artifact(dir.path(), ModelName::Logreg).unwrap();
        let sample = vec![1.0; FEATURE_COUNT];
        assert_eq!(
            loaded.probability(&sample).unwrap(),
            model.probability(&sample).unwrap()
        );
    }

    #[test]
    fn missing_and_mislabelled_artifacts_are_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_artifact(dir.path(), ModelName::Knn),
            Err(ArtifactError::Missing { .. })
        ));

        save_artifact(dir.path(), ModelName::Logreg, &tiny_logistic(), 0).unwrap();
        fs::rename(
            ModelName::Logreg.path_in(dir.path()),
            ModelName::Rf.path_in(dir.path()),
        )
        .unwrap();
        assert!(matches!(
            load_artifact(dir.path(), ModelName::Rf),
            Err(ArtifactError::NameMismatch { .. })
        ));
    }

    #[test]
    fn truncated_artifact_fails_to_parse() {
        let dir = TempDir::new().unwrap();
        fs::write(ModelName::Knn.path_in(dir.path()), b"{\"format_version\":1,").unwrap();
        assert!(matches!(
            load_artifact(dir.path(), ModelName::Knn),
            Err(ArtifactError::Parse { .. })
        ));
    }

    #[test]
    fn predict_thresholds_the_trait_probability() {
        let model = tiny_logistic();
        let classifier: &dyn FireClassifier = &model;
        assert_eq!(classifier.family(), "logistic");
        for value in [0.0, (FEATURE_COUNT * 4) as f64] {
            let mut row = vec![0.0; FEATURE_COUNT];
            row[0] = value;
            let p = classifier.predict_probability(&row).unwrap();
            assert!((0.0..=1.0).contains(&p));
            assert_eq!(p, model.probability(&row).unwrap());
            assert_eq!(classifier.predict(&row).unwrap(), p >= 0.5);
        }
        let mut high = vec![0.0; FEATURE_COUNT];
        high[0] = (FEATURE_COUNT * 4) as f64;
        assert!(classifier.predict(&high).unwrap());
    }

    #[test]
    fn wrong_dimension_is_reported() {
        let model = tiny_logistic();
        assert!(matches!(
            model.predict(&[1.0, 2.0]),
            Err(ArtifactError::DimensionMismatch { expected, actual: 2 }) if expected == FEATURE_COUNT
        ));
    }
}

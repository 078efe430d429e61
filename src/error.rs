use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact file {path} not found")]
    Missing { path: PathBuf },
    #[error("failed reading artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed parsing artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("artifact format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("artifact '{found}' stored under name '{expected}'")]
    NameMismatch { expected: String, found: String },
    #[error("artifact feature columns do not match the current schema")]
    SchemaMismatch,
    #[error("model expects {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("model is empty or malformed: {0}")]
    Malformed(&'static str),
    #[error("model produced a non-finite output")]
    NonFinite,
    #[error("model panicked during prediction")]
    Panicked,
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("failed reading telemetry log {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("telemetry log {0} has no header row")]
    MissingHeader(PathBuf),
    #[error("telemetry log has no '{0}' column")]
    MissingLabelColumn(&'static str),
    #[error("no labelled rows to train on")]
    EmptyDataset,
    #[error("training needs both labels; found only {label} ({count} rows)")]
    SingleClass { label: u8, count: usize },
}

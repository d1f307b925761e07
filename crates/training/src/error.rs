//! Harness error taxonomy.

use burn::record::RecorderError;
use conv_lstm::CellError;
use std::path::PathBuf;
use thiserror::Error;

pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("harness is not configured; call configure() first")]
    NotConfigured,
    #[error("harness has no execution state; call reset() first")]
    NotReady,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Network(#[from] CellError),
    #[error("{what} shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("index {index} out of range for {len} samples")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("snapshot parameter {index} shape mismatch: network has {expected:?}, snapshot has {found:?}")]
    SnapshotShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("snapshot parameter count mismatch: network has {expected}, snapshot has {found}")]
    SnapshotParamCount { expected: usize, found: usize },
    #[error("snapshot record error at {path}: {message}")]
    Record { path: PathBuf, message: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("toml parse error at {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("image error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("tensor data error: {0}")]
    Data(String),
}

impl HarnessError {
    pub(crate) fn record(path: impl Into<PathBuf>, err: RecorderError) -> Self {
        Self::Record {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to callers of the evaluation library.
///
/// Failures of external scorers never show up here: those degrade to
/// zero-valued sub-scores inside the evaluator.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse TOML config: {0}")]
    Config(#[from] toml::de::Error),
}

impl EvalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;

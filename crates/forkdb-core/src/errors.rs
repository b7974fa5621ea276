//! Error types for the fork database core.

use std::path::{Path, PathBuf};

/// Top-level error enum for the fork database core.
#[derive(Debug, thiserror::Error)]
pub enum ForkDbError {
    #[error("store not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("malformed store {}: {reason}", path.display())]
    MalformedStore { path: PathBuf, reason: String },

    #[error("corrupt store {}: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("invalid record {full_name:?}: {reason}")]
    InvalidRecord { full_name: String, reason: String },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForkDbError {
    pub(crate) fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        Self::MalformedStore {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::CorruptStore {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(full_name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            full_name: full_name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type ForkDbResult<T> = Result<T, ForkDbError>;

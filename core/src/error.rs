use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The document source could not read or decode a file.
    #[error("unreadable document {}: {source}", path.display())]
    UnreadableDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failures raised by an index store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no rebuild in progress; call clear_all first")]
    NoRebuildInProgress,

    #[error("corrupt index data: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sled(#[from] sled::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::UnreadableDocument { path: path.into(), source }
    }
}

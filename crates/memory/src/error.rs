use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the memory store.
///
/// `NotFound` is an expected outcome of `load` on an unknown key; `Io` covers
/// every read/write/rename failure and is never retried internally.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("no memory entry with key '{key}'")]
    NotFound { key: String },

    #[error("invalid memory key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed memory document {}: {reason}", path.display())]
    Document { path: PathBuf, reason: String },

    #[error("unreadable memory index {}: {reason}", path.display())]
    Index { path: PathBuf, reason: String },
}

impl MemoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::schema::TaskId;

/// Failures surfaced by plan parsing and mutation.
///
/// `Parse` is reported per file, so callers scanning several plans can keep
/// the good ones.  `TaskNotFound` usually means the file changed since the
/// id was obtained; re-list and retry.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("cannot parse plan{}: {reason}", location(.path.as_deref()))]
    Parse {
        path: Option<PathBuf>,
        reason: String,
    },

    #[error("no task {id} in plan{}", location(.path.as_deref()))]
    TaskNotFound { id: TaskId, path: Option<PathBuf> },

    #[error("invalid task title: {reason}")]
    InvalidTitle { reason: &'static str },

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TaskError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the plan file path to errors raised by the pure text layer.
    pub(crate) fn at(self, file: &Path) -> Self {
        match self {
            Self::Parse { path: None, reason } => Self::Parse {
                path: Some(file.to_path_buf()),
                reason,
            },
            Self::TaskNotFound { id, path: None } => Self::TaskNotFound {
                id,
                path: Some(file.to_path_buf()),
            },
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TaskNotFound { .. })
    }
}

fn location(path: Option<&Path>) -> String {
    path.map(|p| format!(" {}", p.display())).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_path_when_known() {
        let err = TaskError::TaskNotFound {
            id: TaskId::new(1, 4),
            path: None,
        };
        assert_eq!(err.to_string(), "no task 1.4 in plan");

        let err = err.at(Path::new("PLAN.md"));
        assert_eq!(err.to_string(), "no task 1.4 in plan PLAN.md");
        assert!(err.is_not_found());
    }
}

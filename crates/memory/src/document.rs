//! Markdown body files with YAML front matter.
//!
//! Each entry is stored as:
//!
//! ```markdown
//! ---
//! key: project/alpha
//! tags:
//! - planning
//! source: user
//! created_at: 2026-01-01T09:00:00Z
//! updated_at: 2026-01-02T10:30:00Z
//! ---
//!
//! The value, verbatim.
//! ```
//!
//! The front matter carries everything the index holds, so the index can be
//! regenerated from a directory scan.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use assistant_core::fsio;

use crate::error::{MemoryError, Result};
use crate::schema::{MemoryEntry, MemorySource};

const DELIMITER: &str = "---\n";

#[derive(Debug, Serialize, Deserialize)]
struct FrontMatter {
    key: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    source: MemorySource,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub fn render(entry: &MemoryEntry) -> std::result::Result<String, serde_yaml::Error> {
    let front = FrontMatter {
        key: entry.key.clone(),
        tags: entry.tags.clone(),
        source: entry.source,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
    };
    let yaml = serde_yaml::to_string(&front)?;
    Ok(format!("{DELIMITER}{yaml}{DELIMITER}\n{}", entry.value))
}

/// Parse a rendered body back into an entry.  The value is everything after
/// the blank line that follows the closing delimiter, byte for byte.
pub fn parse(raw: &str) -> std::result::Result<MemoryEntry, String> {
    let rest = raw
        .strip_prefix(DELIMITER)
        .ok_or_else(|| "missing opening front matter delimiter".to_string())?;

    let (yaml, body) = if let Some(body) = rest.strip_prefix(DELIMITER) {
        ("", body)
    } else {
        let end = rest
            .find("\n---\n")
            .ok_or_else(|| "missing closing front matter delimiter".to_string())?;
        (&rest[..=end], &rest[end + 1 + DELIMITER.len()..])
    };

    let front: FrontMatter =
        serde_yaml::from_str(yaml).map_err(|err| format!("invalid front matter: {err}"))?;
    let value = body.strip_prefix('\n').unwrap_or(body);

    Ok(MemoryEntry {
        key: front.key,
        value: value.to_string(),
        tags: front.tags,
        source: front.source,
        created_at: front.created_at,
        updated_at: front.updated_at,
    })
}

/// A body file found during a directory scan.
#[derive(Debug, Clone)]
pub struct ScannedDocument {
    pub relative_path: PathBuf,
    pub entry: MemoryEntry,
}

/// Reads and writes entry bodies under a single root directory.  Holds no
/// business logic; paths are always relative to `root`.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn absolute(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    pub fn read(&self, relative: &Path) -> Result<MemoryEntry> {
        let path = self.absolute(relative);
        let bytes = std::fs::read(&path).map_err(|err| MemoryError::io(&path, err))?;
        let raw = String::from_utf8(bytes).map_err(|_| MemoryError::Document {
            path: path.clone(),
            reason: "not valid UTF-8".to_string(),
        })?;
        parse(&raw).map_err(|reason| MemoryError::Document { path, reason })
    }

    pub fn write(&self, relative: &Path, entry: &MemoryEntry) -> Result<()> {
        let path = self.absolute(relative);
        let rendered = render(entry).map_err(|err| MemoryError::Document {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        fsio::write_atomic(&path, rendered.as_bytes()).map_err(|err| MemoryError::io(&path, err))?;
        debug!(key = %entry.key, path = %path.display(), bytes = rendered.len(), "memory body written");
        Ok(())
    }

    pub fn remove(&self, relative: &Path) -> Result<bool> {
        let path = self.absolute(relative);
        let removed = fsio::remove_if_exists(&path).map_err(|err| MemoryError::io(&path, err))?;
        if removed {
            self.prune_empty_dirs(&path);
        }
        Ok(removed)
    }

    /// Every parsable `*.md` file under the root.  Unparsable files are
    /// logged and skipped; a missing root yields nothing.
    pub fn scan(&self) -> Result<Vec<ScannedDocument>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut documents = Vec::new();
        for item in WalkDir::new(&self.root).sort_by_file_name() {
            let item = item.map_err(|err| {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                MemoryError::io(path, source)
            })?;

            let path = item.path();
            let is_markdown = path.extension().map(|ext| ext == "md").unwrap_or(false);
            let hidden = item.file_name().to_string_lossy().starts_with('.');
            if !item.file_type().is_file() || !is_markdown || hidden {
                continue;
            }

            let relative = match path.strip_prefix(&self.root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            match self.read(&relative) {
                Ok(entry) => documents.push(ScannedDocument {
                    relative_path: relative,
                    entry,
                }),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable memory document");
                }
            }
        }
        Ok(documents)
    }

    /// Remove now-empty parent directories up to (not including) the root.
    fn prune_empty_dirs(&self, removed_file: &Path) {
        let mut dir = removed_file.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            if std::fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

//! Key → metadata index persisted as a single JSON file.
//!
//! The Markdown bodies remain the **canonical source of truth**.  The index is
//! a write-through cache that lets `list`, tag search, and the existence check
//! of `load` run without opening any body.  If the file is absent it starts
//! empty; if it is corrupt, or a mutation was interrupted, it is rebuilt from
//! a directory scan of the bodies.
//!
//! # Lifecycle
//!
//! [`MemoryIndex::load`] once at startup, mutate in memory with
//! [`MemoryIndex::upsert`] / [`MemoryIndex::remove`], then
//! [`MemoryIndex::flush`] after each mutating call.  A `.dirty` marker next to
//! the index brackets every mutation: it is created before the body is
//! touched and removed once the index is flushed, so a crash in between is
//! detected on the next load.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use assistant_core::fsio;

use crate::error::{MemoryError, Result};
use crate::schema::IndexRecord;

const INDEX_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: BTreeMap<String, IndexRecord>,
}

#[derive(Debug)]
pub struct MemoryIndex {
    path: PathBuf,
    records: BTreeMap<String, IndexRecord>,
}

impl MemoryIndex {
    /// An empty index that will be flushed to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
        }
    }

    /// Load the index at `path`.  A missing file is an empty index; an
    /// unreadable or unparsable one is an [`MemoryError::Index`] the caller
    /// answers by rebuilding.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let Some(bytes) = fsio::read_if_exists(&path).map_err(|err| MemoryError::io(&path, err))? else {
            debug!(path = %path.display(), "no memory index yet; starting empty");
            return Ok(Self::empty(path));
        };

        let file: IndexFile = serde_json::from_slice(&bytes).map_err(|err| MemoryError::Index {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        if file.version != INDEX_VERSION {
            return Err(MemoryError::Index {
                path,
                reason: format!("unsupported index version {}", file.version),
            });
        }

        debug!(path = %path.display(), entries = file.entries.len(), "memory index loaded");
        Ok(Self {
            path,
            records: file.entries,
        })
    }

    /// Atomically write the in-memory records to disk.
    pub fn flush(&self) -> Result<()> {
        let file = IndexFile {
            version: INDEX_VERSION,
            entries: self.records.clone(),
        };
        let rendered = serde_json::to_vec_pretty(&file).map_err(|err| MemoryError::Index {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        fsio::write_atomic(&self.path, &rendered).map_err(|err| MemoryError::io(&self.path, err))?;
        debug!(path = %self.path.display(), entries = self.records.len(), "memory index flushed");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&IndexRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn upsert(&mut self, record: IndexRecord) {
        self.records.insert(record.key.clone(), record);
    }

    pub fn remove(&mut self, key: &str) -> Option<IndexRecord> {
        self.records.remove(key)
    }

    /// All records in key order.
    pub fn records(&self) -> impl Iterator<Item = &IndexRecord> {
        self.records.values()
    }

    /// Whether any entry carries `tag` (already normalised).
    pub fn known_tag(&self, tag: &str) -> bool {
        self.records.values().any(|record| record.tags.contains(tag))
    }

    /// Swap in a freshly scanned record set.
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = IndexRecord>) {
        self.records = records
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();
        info!(entries = self.records.len(), path = %self.path.display(), "memory index replaced");
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Interrupted-mutation marker ────────────────────────────────────────

    pub fn dirty_marker_path(&self) -> PathBuf {
        let filename = self
            .path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "index.json".to_string());
        self.path.with_file_name(format!("{filename}.dirty"))
    }

    pub fn is_marked_dirty(&self) -> bool {
        self.dirty_marker_path().exists()
    }

    pub(crate) fn mark_dirty(&self) -> Result<()> {
        let marker = self.dirty_marker_path();
        fsio::write_atomic(&marker, b"mutation in progress\n").map_err(|err| MemoryError::io(&marker, err))
    }

    pub(crate) fn clear_dirty(&self) -> Result<()> {
        let marker = self.dirty_marker_path();
        fsio::remove_if_exists(&marker).map_err(|err| MemoryError::io(&marker, err))?;
        Ok(())
    }
}

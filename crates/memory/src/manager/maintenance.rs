//! Explicit deletion, index regeneration, and store statistics for
//! [`MemoryManager`].

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::schema::{IndexRecord, MemorySource};

use super::MemoryManager;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub total: usize,
    pub user: usize,
    pub agent: usize,
    pub import: usize,
    pub distinct_tags: usize,
}

impl MemoryManager {
    /// Delete the entry for `key`, body and index record together.
    /// Returns `false` when no such entry exists.
    #[instrument(skip(self))]
    pub fn forget(&mut self, key: &str) -> Result<bool> {
        let Some(record) = self.index.get(key).cloned() else {
            return Ok(false);
        };

        self.write_through(
            |documents| documents.remove(&record.file_path).map(|_| ()),
            |index| {
                index.remove(key);
            },
        )?;
        info!(key, "memory entry forgotten");
        Ok(true)
    }

    /// Regenerate the index from a full scan of the body files, persist it,
    /// and lift the dirty marker.  Callers must hold off concurrent writers.
    /// Returns the number of indexed entries.
    #[instrument(skip(self))]
    pub fn rebuild_index(&mut self) -> Result<usize> {
        let records = self.scan_records()?;
        let count = records.len();
        self.index.replace_all(records);
        self.index.flush()?;
        self.index.clear_dirty()?;
        info!(entries = count, path = %self.index.path().display(), "memory index rebuilt from documents");
        Ok(count)
    }

    /// Index records for every readable body on disk.  When two bodies claim
    /// the same key the most recently updated one wins.
    pub(super) fn scan_records(&self) -> Result<Vec<IndexRecord>> {
        let scanned = self.documents.scan()?;
        let mut by_key: BTreeMap<String, IndexRecord> = BTreeMap::new();

        for document in scanned {
            let record = IndexRecord::from_entry(&document.entry, document.relative_path);
            match by_key.get(&record.key) {
                Some(existing) if existing.updated_at >= record.updated_at => {
                    warn!(
                        key = %record.key,
                        kept = %existing.file_path.display(),
                        ignored = %record.file_path.display(),
                        "duplicate memory key on disk"
                    );
                }
                _ => {
                    by_key.insert(record.key.clone(), record);
                }
            }
        }
        Ok(by_key.into_values().collect())
    }

    pub fn stats(&self) -> MemoryStats {
        let mut stats = MemoryStats {
            total: self.index.len(),
            ..Default::default()
        };
        let mut tags = BTreeSet::new();
        for record in self.index.records() {
            match record.source {
                MemorySource::User => stats.user += 1,
                MemorySource::Agent => stats.agent += 1,
                MemorySource::Import => stats.import += 1,
            }
            tags.extend(record.tags.iter());
        }
        stats.distinct_tags = tags.len();
        stats
    }
}

mod maintenance;
mod retrieval;

pub use maintenance::MemoryStats;
pub use retrieval::{RecentFilter, SearchQuery};

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use assistant_core::{Clock, SystemClock};

use crate::document::DocumentStore;
use crate::error::{MemoryError, Result};
use crate::index::MemoryIndex;
use crate::layout::{KeyLayout, SlugLayout};
use crate::schema::{IndexRecord, MemoryEntry, SaveOptions, TagMode, content_hash, validate_key};

/// Keyed, tagged Markdown memory: bodies in a [`DocumentStore`], metadata in
/// an injected [`MemoryIndex`].
///
/// Every mutation writes the body and flushes the index as one unit; see
/// [`MemoryIndex`] for the interrupted-mutation marker.
pub struct MemoryManager {
    documents: DocumentStore,
    index: MemoryIndex,
    layout: Arc<dyn KeyLayout>,
    clock: Arc<dyn Clock>,
}

impl MemoryManager {
    pub fn new(documents: DocumentStore, index: MemoryIndex) -> Self {
        Self {
            documents,
            index,
            layout: Arc::new(SlugLayout),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_layout(mut self, layout: Arc<dyn KeyLayout>) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Load the index at `index_path` over the bodies in `entries_root`.
    ///
    /// Opening never writes.  When the index is unreadable, or a mutation
    /// left its dirty marker behind, the in-memory index is rebuilt from a
    /// scan of the bodies; the file on disk and the marker stay as they are
    /// until the next mutation or an explicit [`Self::rebuild_index`].  A
    /// writer may still be mid-mutation, and its marker is its own to lift.
    pub fn open(index_path: impl Into<PathBuf>, entries_root: impl Into<PathBuf>) -> Result<Self> {
        let index_path = index_path.into();
        let documents = DocumentStore::new(entries_root);

        let (index, needs_rebuild) = match MemoryIndex::load(&index_path) {
            Ok(index) => {
                let dirty = index.is_marked_dirty();
                if dirty {
                    warn!(path = %index_path.display(), "memory mutation in progress or interrupted; reading from documents");
                }
                (index, dirty)
            }
            Err(MemoryError::Index { path, reason }) => {
                warn!(path = %path.display(), %reason, "memory index unreadable; reading from documents");
                (MemoryIndex::empty(&index_path), true)
            }
            Err(err) => return Err(err),
        };

        let mut manager = Self::new(documents, index);
        if needs_rebuild {
            let records = manager.scan_records()?;
            manager.index.replace_all(records);
        }

        info!(
            entries = manager.index.len(),
            index = %index_path.display(),
            root = %manager.documents.root().display(),
            rebuilt = needs_rebuild,
            "memory opened"
        );
        Ok(manager)
    }

    pub fn index(&self) -> &MemoryIndex {
        &self.index
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Insert or update the entry for `key`.
    ///
    /// The value is replaced; tags are merged with or replace the stored ones
    /// according to `options.tag_mode`.  Saving exactly what is already
    /// stored performs no write and keeps the timestamps.
    #[instrument(skip(self, value, options), fields(source = %options.source))]
    pub fn save(&mut self, key: &str, value: &str, options: SaveOptions) -> Result<MemoryEntry> {
        validate_key(key)?;
        let existing = self.index.get(key).cloned();

        let tags: BTreeSet<String> = match (&existing, options.tag_mode) {
            (Some(record), TagMode::Merge) => record.tags.union(&options.tags).cloned().collect(),
            _ => options.tags.clone(),
        };

        if let Some(record) = &existing {
            let unchanged = record.content_hash == content_hash(value)
                && record.tags == tags
                && record.source == options.source
                && self.documents.absolute(&record.file_path).is_file();
            if unchanged {
                debug!(key, "memory entry unchanged; skipping write");
                return Ok(MemoryEntry {
                    key: key.to_string(),
                    value: value.to_string(),
                    tags,
                    source: record.source,
                    created_at: record.created_at,
                    updated_at: record.updated_at,
                });
            }
        }

        let now = self.clock.now();
        let (created_at, updated_at) = match &existing {
            // Never let a skewed clock move `updated_at` backwards.
            Some(record) => (record.created_at, now.max(record.updated_at)),
            None => (now, now),
        };

        let entry = MemoryEntry {
            key: key.to_string(),
            value: value.to_string(),
            tags,
            source: options.source,
            created_at,
            updated_at,
        };
        let relative = self.layout.relative_path(key);
        let record = IndexRecord::from_entry(&entry, relative.clone());
        let stale_path = existing
            .as_ref()
            .map(|r| r.file_path.clone())
            .filter(|old| *old != relative);

        self.write_through(
            |documents| {
                documents.write(&relative, &entry)?;
                if let Some(old) = &stale_path {
                    documents.remove(old)?;
                }
                Ok(())
            },
            |index| index.upsert(record),
        )?;

        info!(
            key,
            created = existing.is_none(),
            tags = entry.tags.len(),
            bytes = entry.value.len(),
            "memory entry saved"
        );
        Ok(entry)
    }

    /// The stored entry for `key`, read from its body file.
    pub fn load(&self, key: &str) -> Result<MemoryEntry> {
        let record = self.index.get(key).ok_or_else(|| MemoryError::NotFound {
            key: key.to_string(),
        })?;
        let entry = self.documents.read(&record.file_path)?;
        if entry.key != key {
            return Err(MemoryError::Document {
                path: self.documents.absolute(&record.file_path),
                reason: format!("body belongs to key '{}'", entry.key),
            });
        }
        Ok(entry)
    }

    /// Every index record, in key order.  Never opens a body.
    pub fn list(&self) -> Vec<IndexRecord> {
        self.index.records().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.index.len()
    }

    /// Run a body mutation and the matching index update as one unit.
    ///
    /// The dirty marker goes down first.  If the body step fails the file is
    /// untouched (atomic replace), so the marker is lifted again, unless an
    /// earlier interrupted mutation had already left it.  If the index flush
    /// fails the marker stays, and every later [`Self::open`] reads from the
    /// bodies.  The flush writes the whole in-memory index, so an index that
    /// `open` rebuilt is persisted here.
    fn write_through<B, U>(&mut self, body: B, update: U) -> Result<()>
    where
        B: FnOnce(&DocumentStore) -> Result<()>,
        U: FnOnce(&mut MemoryIndex),
    {
        let already_dirty = self.index.is_marked_dirty();
        self.index.mark_dirty()?;
        if let Err(err) = body(&self.documents) {
            if !already_dirty {
                let _ = self.index.clear_dirty();
            }
            return Err(err);
        }
        update(&mut self.index);
        self.index.flush()?;
        self.index.clear_dirty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::MemorySource;
    use assistant_core::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    pub(crate) struct Fixture {
        pub dir: TempDir,
        pub clock: Arc<ManualClock>,
        pub memory: MemoryManager,
    }

    impl Fixture {
        pub fn reopen(&self) -> MemoryManager {
            MemoryManager::open(self.index_path(), self.entries_root())
                .unwrap()
                .with_clock(self.clock.clone())
        }

        pub fn index_path(&self) -> PathBuf {
            self.dir.path().join("index.json")
        }

        pub fn entries_root(&self) -> PathBuf {
            self.dir.path().join("entries")
        }

        pub fn tick(&self) {
            self.clock.advance(Duration::minutes(1));
        }
    }

    pub(crate) fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap(),
        ));
        let memory = MemoryManager::open(dir.path().join("index.json"), dir.path().join("entries"))
            .unwrap()
            .with_clock(clock.clone());
        Fixture { dir, clock, memory }
    }

    #[test]
    fn save_then_load_returns_saved_value() {
        let mut fx = fixture();
        let saved = fx
            .memory
            .save("decisions/db", "Use SQLite for v1.\n", SaveOptions::new(MemorySource::Agent).tag("db"))
            .unwrap();
        let loaded = fx.memory.load("decisions/db").unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.value, "Use SQLite for v1.\n");
        assert_eq!(loaded.created_at, loaded.updated_at);
    }

    #[test]
    fn resave_refreshes_updated_at_and_keeps_created_at() {
        let mut fx = fixture();
        let first = fx.memory.save("k", "one", SaveOptions::default()).unwrap();
        fx.tick();
        let second = fx.memory.save("k", "two", SaveOptions::default()).unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(fx.memory.load("k").unwrap().value, "two");
        assert_eq!(fx.memory.count(), 1);
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let mut fx = fixture();
        let first = fx.memory.save("k", "one", SaveOptions::default()).unwrap();
        fx.clock.advance(Duration::hours(-2));
        let second = fx.memory.save("k", "two", SaveOptions::default()).unwrap();
        assert!(second.updated_at >= first.updated_at);
        assert!(second.updated_at >= second.created_at);
    }

    #[test]
    fn identical_save_is_a_no_op() {
        let mut fx = fixture();
        let first = fx.memory.save("k", "same", SaveOptions::default().tag("a")).unwrap();
        fx.tick();
        let again = fx.memory.save("k", "same", SaveOptions::default().tag("a")).unwrap();
        assert_eq!(again, first);
        assert_eq!(fx.memory.load("k").unwrap().updated_at, first.updated_at);
    }

    #[test]
    fn tags_merge_by_default_and_replace_on_request() {
        let mut fx = fixture();
        fx.memory.save("k", "v1", SaveOptions::default().tag("a")).unwrap();
        let merged = fx.memory.save("k", "v2", SaveOptions::default().tag("b")).unwrap();
        assert_eq!(merged.tags.iter().cloned().collect::<Vec<_>>(), vec!["a", "b"]);

        let replaced = fx
            .memory
            .save("k", "v3", SaveOptions::default().tag("c").replace_tags())
            .unwrap();
        assert_eq!(replaced.tags.iter().cloned().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(fx.memory.index().get("k").unwrap().tags, replaced.tags);
    }

    #[test]
    fn load_unknown_key_is_not_found() {
        let fx = fixture();
        let err = fx.memory.load("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn invalid_key_is_rejected_without_writing() {
        let mut fx = fixture();
        let err = fx.memory.save(" bad", "v", SaveOptions::default()).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidKey { .. }));
        assert_eq!(fx.memory.count(), 0);
        assert!(!fx.index_path().exists());
    }

    #[test]
    fn list_is_served_from_the_index_alone() {
        let mut fx = fixture();
        fx.memory.save("b", "bee", SaveOptions::default()).unwrap();
        fx.memory.save("a", "ay", SaveOptions::default()).unwrap();
        // Bodies gone: list must not care.
        std::fs::remove_dir_all(fx.entries_root()).unwrap();
        let keys = fx.memory.list().into_iter().map(|r| r.key).collect::<Vec<_>>();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn index_is_persisted_with_each_save() {
        let mut fx = fixture();
        fx.memory.save("persisted", "value", SaveOptions::default().tag("x")).unwrap();
        let reopened = fx.reopen();
        assert_eq!(reopened.load("persisted").unwrap().value, "value");
        assert!(reopened.index().known_tag("x"));
        assert!(!reopened.index().is_marked_dirty());
    }

    #[test]
    fn opening_never_lifts_a_writers_marker() {
        let mut fx = fixture();
        fx.memory.save("a", "alpha", SaveOptions::default()).unwrap();

        // A writer puts its marker down and is still busy.
        fx.memory.index.mark_dirty().unwrap();
        let marker = fx.memory.index().dirty_marker_path();

        let reader = fx.reopen();
        assert!(marker.exists());
        assert_eq!(reader.load("a").unwrap().value, "alpha");

        // The writer writes its body, then dies before flushing the index.
        let entry = MemoryEntry {
            key: "b".to_string(),
            value: "beta".to_string(),
            tags: BTreeSet::new(),
            source: MemorySource::User,
            created_at: fx.clock.now(),
            updated_at: fx.clock.now(),
        };
        fx.memory
            .documents()
            .write(&SlugLayout.relative_path("b"), &entry)
            .unwrap();

        let after_crash = fx.reopen();
        assert_eq!(after_crash.load("b").unwrap().value, "beta");
        let keys = after_crash.list().into_iter().map(|r| r.key).collect::<Vec<_>>();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn opening_a_corrupt_index_does_not_rewrite_it() {
        let mut fx = fixture();
        fx.memory.save("a", "alpha", SaveOptions::default()).unwrap();
        std::fs::write(fx.index_path(), "garbage").unwrap();

        let reader = fx.reopen();
        assert_eq!(reader.count(), 1);
        assert_eq!(std::fs::read_to_string(fx.index_path()).unwrap(), "garbage");
    }

    #[test]
    fn identical_save_restores_a_deleted_body() {
        let mut fx = fixture();
        fx.memory.save("k", "same", SaveOptions::default()).unwrap();
        let body = fx
            .entries_root()
            .join(&fx.memory.index().get("k").unwrap().file_path);
        std::fs::remove_file(&body).unwrap();

        fx.memory.save("k", "same", SaveOptions::default()).unwrap();
        assert!(body.is_file());
        assert_eq!(fx.reopen().load("k").unwrap().value, "same");
    }

    #[test]
    fn failed_write_keeps_an_earlier_interrupted_marker() {
        let mut fx = fixture();
        fx.memory.save("blocked/one", "v", SaveOptions::default()).unwrap();
        fx.memory.index.mark_dirty().unwrap();
        std::fs::write(fx.entries_root().join("other"), "not a directory").unwrap();

        assert!(fx.memory.save("other/two", "v", SaveOptions::default()).is_err());
        assert!(fx.memory.index().is_marked_dirty());
    }

    #[test]
    fn failed_body_write_leaves_store_untouched() {
        let mut fx = fixture();
        fx.memory.save("blocked/one", "v", SaveOptions::default()).unwrap();
        // Make the directory the next body would go into a regular file.
        let blocked_dir = fx.entries_root().join("other");
        std::fs::write(&blocked_dir, "not a directory").unwrap();

        let err = fx.memory.save("other/two", "v", SaveOptions::default()).unwrap_err();
        assert!(matches!(err, MemoryError::Io { .. }));
        assert_eq!(fx.memory.count(), 1);
        assert!(!fx.memory.index().is_marked_dirty());
        assert!(fx.reopen().load("other/two").unwrap_err().is_not_found());
    }
}

//! Search, filtered recency listing, and plain-text summaries.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::error::Result;
use crate::index::MemoryIndex;
use crate::schema::{IndexRecord, MemoryEntry, MemorySource, normalize_tag, truncate_str};

use super::MemoryManager;

const PREVIEW_CHARS: usize = 120;

/// How a raw search string is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Entries carrying this (normalised) tag.
    Tag(String),
    /// Case-insensitive substring of the entry value.
    Text(String),
}

impl SearchQuery {
    /// A query of the form `#tag` or `tag:tag` that names a tag present in the
    /// index is a tag query; anything else is matched as text.
    pub fn classify(raw: &str, index: &MemoryIndex) -> Self {
        let trimmed = raw.trim();
        let candidate = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("tag:"))
            .and_then(normalize_tag);

        match candidate {
            Some(tag) if index.known_tag(&tag) => Self::Tag(tag),
            _ => Self::Text(raw.to_string()),
        }
    }
}

/// Filter for [`MemoryManager::recent`].
#[derive(Debug, Clone)]
pub struct RecentFilter {
    /// Only entries carrying *all* of these tags.
    pub tags: BTreeSet<String>,
    pub source: Option<MemorySource>,
    pub limit: usize,
}

impl Default for RecentFilter {
    fn default() -> Self {
        Self {
            tags: BTreeSet::new(),
            source: None,
            limit: 50,
        }
    }
}

impl RecentFilter {
    fn accepts(&self, record: &IndexRecord) -> bool {
        self.tags.is_subset(&record.tags)
            && self.source.map(|s| s == record.source).unwrap_or(true)
    }
}

impl MemoryManager {
    /// Entries matching `query`, most recently updated first.
    ///
    /// An empty (or all-whitespace) query matches nothing.
    pub fn search(&self, query: &str) -> Result<Vec<MemoryEntry>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let classified = SearchQuery::classify(query, &self.index);
        let mut matches = match &classified {
            SearchQuery::Tag(tag) => self
                .index
                .records()
                .filter(|record| record.tags.contains(tag))
                .filter_map(|record| self.load_readable(record))
                .collect::<Vec<_>>(),
            SearchQuery::Text(text) => {
                let needle = text.to_lowercase();
                self.index
                    .records()
                    .filter_map(|record| self.load_readable(record))
                    .filter(|entry| entry.value.to_lowercase().contains(&needle))
                    .collect()
            }
        };

        sort_most_recent_first(&mut matches);
        debug!(query = ?classified, hits = matches.len(), "memory search");
        Ok(matches)
    }

    /// Up to `filter.limit` entries passing `filter`, most recent first.
    /// Filtering happens on the index; only the survivors are read.
    pub fn recent(&self, filter: &RecentFilter) -> Result<Vec<MemoryEntry>> {
        let mut records = self
            .index
            .records()
            .filter(|record| filter.accepts(record))
            .collect::<Vec<_>>();
        records.sort_by(|left, right| {
            right
                .updated_at
                .cmp(&left.updated_at)
                .then_with(|| left.key.cmp(&right.key))
        });

        Ok(records
            .into_iter()
            .filter_map(|record| self.load_readable(record))
            .take(filter.limit)
            .collect())
    }

    /// The body behind `record`, or `None` with a warning when it is missing
    /// or unreadable.
    fn load_readable(&self, record: &IndexRecord) -> Option<MemoryEntry> {
        match self.load(&record.key) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(
                    key = %record.key,
                    path = %record.file_path.display(),
                    error = %err,
                    "skipping unreadable memory entry"
                );
                None
            }
        }
    }

    /// Plain-text digest of the `last_n` most recently updated entries.
    pub fn summarize(&self, last_n: usize) -> Result<String> {
        let recent = self.recent(&RecentFilter {
            limit: last_n,
            ..Default::default()
        })?;
        if recent.is_empty() {
            return Ok("No entries in memory.".to_string());
        }

        let mut lines = vec![format!(
            "Memory summary ({} most recent entries):",
            recent.len()
        )];
        for entry in &recent {
            let flattened = entry.value.split_whitespace().collect::<Vec<_>>().join(" ");
            let preview = truncate_str(&flattened, PREVIEW_CHARS);
            let ellipsis = if preview.len() < flattened.len() { "…" } else { "" };
            let tags = if entry.tags.is_empty() {
                "—".to_string()
            } else {
                entry.tags.iter().cloned().collect::<Vec<_>>().join(", ")
            };
            lines.push(format!("  • {} [{tags}] {preview}{ellipsis}", entry.key));
        }
        Ok(lines.join("\n"))
    }
}

fn sort_most_recent_first(entries: &mut [MemoryEntry]) {
    entries.sort_by(|left, right| {
        right
            .updated_at
            .cmp(&left.updated_at)
            .then_with(|| left.key.cmp(&right.key))
    });
}

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

/// Who produced a memory entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    #[default]
    User,
    Agent,
    Import,
}

impl MemorySource {
    /// Lowercase label used in front matter, the index, and log lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::Import => "import",
        }
    }
}

impl fmt::Display for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MemorySource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            "import" => Ok(Self::Import),
            other => Err(format!("unknown memory source '{other}' (expected user, agent or import)")),
        }
    }
}

/// How `save` treats the tags of an existing entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagMode {
    /// Union of the stored tags and the supplied ones.
    #[default]
    Merge,
    /// The supplied tags become the entry's only tags.
    Replace,
}

/// Caller-supplied metadata for [`crate::MemoryManager::save`].
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub tags: BTreeSet<String>,
    pub source: MemorySource,
    pub tag_mode: TagMode,
}

impl SaveOptions {
    pub fn new(source: MemorySource) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }

    pub fn tag(mut self, tag: impl AsRef<str>) -> Self {
        if let Some(tag) = normalize_tag(tag.as_ref()) {
            self.tags.insert(tag);
        }
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags.extend(tags.into_iter().filter_map(|t| normalize_tag(t.as_ref())));
        self
    }

    pub fn replace_tags(mut self) -> Self {
        self.tag_mode = TagMode::Replace;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub source: MemorySource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Index-side view of one entry.  Never carries the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub key: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Body location relative to the entries directory.
    pub file_path: PathBuf,
    pub source: MemorySource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// SHA-256 hex of the value, so identical re-saves are detected without
    /// reading the body.
    pub content_hash: String,
}

impl IndexRecord {
    pub fn from_entry(entry: &MemoryEntry, file_path: PathBuf) -> Self {
        Self {
            key: entry.key.clone(),
            tags: entry.tags.clone(),
            file_path,
            source: entry.source,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            content_hash: content_hash(&entry.value),
        }
    }
}

pub fn content_hash(value: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut h = Sha256::new();
    h.update(value.as_bytes());
    format!("{:x}", h.finalize())
}

/// Canonical tag form: trimmed, leading `#` stripped, lowercased.  Returns
/// `None` for tags that are empty after normalisation.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let tag = raw.trim().trim_start_matches('#').trim().to_lowercase();
    if tag.is_empty() || tag.chars().any(char::is_whitespace) {
        None
    } else {
        Some(tag)
    }
}

pub fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.trim() != key {
        Some("key has leading or trailing whitespace")
    } else if key.chars().any(char::is_control) {
        Some("key contains control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(MemoryError::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Truncate `s` to at most `max_chars` Unicode scalar values, returning a
/// sub-slice.
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

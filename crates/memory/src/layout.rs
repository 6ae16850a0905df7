use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// Maps a memory key to the location of its body file, relative to the
/// entries directory.
///
/// Implementations must be deterministic: the same key always yields the same
/// path, and distinct keys never share one.
pub trait KeyLayout: Send + Sync {
    fn relative_path(&self, key: &str) -> PathBuf;
}

/// Default layout: `/`-separated key segments become sub-directories, each
/// slugged, and the file name carries a short SHA-256 of the full key.
///
/// `project/Alpha Notes` → `project/alpha-notes-<8 hex>.md`
#[derive(Debug, Clone, Copy, Default)]
pub struct SlugLayout;

impl KeyLayout for SlugLayout {
    fn relative_path(&self, key: &str) -> PathBuf {
        let mut segments = key
            .split('/')
            .map(slugify)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        let stem = segments.pop().unwrap_or_else(|| "entry".to_string());

        let mut path = PathBuf::new();
        for dir in segments {
            path.push(dir);
        }
        path.push(format!("{stem}-{}.md", key_digest(key)));
        path
    }
}

fn key_digest(key: &str) -> String {
    let mut h = Sha256::new();
    h.update(key.as_bytes());
    let hex = format!("{:x}", h.finalize());
    hex[..8].to_string()
}

/// Lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(raw: &str) -> String {
    let mut slug = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-');
    // Keep file names short; the digest keeps them unique.
    slug.chars().take(48).collect::<String>().trim_end_matches('-').to_string()
}

//! Heading text → section rank.
//!
//! Extraction order, first match wins:
//!
//! 1. the first run of ASCII digits anywhere in the heading (`Priority 2`,
//!    `P1 - launch`, `2) Later`);
//! 2. a severity word: `critical`/`urgent` → 1, `high` → 2,
//!    `medium`/`normal` → 3, `low` → 4;
//! 3. a colour marker: 🔴 → 1, 🟠 → 2, 🟡 → 3, 🟢 → 4.
//!
//! Headings with none of these get no rank of their own; the parser then
//! assigns the previous section's rank plus one.

use std::sync::OnceLock;

use regex::Regex;

const WORD_RANKS: &[(&str, u32)] = &[
    ("critical", 1),
    ("urgent", 1),
    ("high", 2),
    ("medium", 3),
    ("normal", 3),
    ("low", 4),
];

const MARKER_RANKS: &[(char, u32)] = &[('🔴', 1), ('🟠', 2), ('🟡', 3), ('🟢', 4)];

fn digits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("digit pattern compiles"))
}

/// Rank cue carried by `heading`, if any.
pub fn heading_rank(heading: &str) -> Option<u32> {
    if let Some(found) = digits().find(heading) {
        // A digit run too long for u32 is not a plausible rank.
        if let Ok(rank) = found.as_str().parse::<u32>() {
            return Some(rank);
        }
    }

    let lowered = heading.to_lowercase();
    let words = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>();
    for word in &words {
        if let Some((_, rank)) = WORD_RANKS.iter().find(|(name, _)| name == word) {
            return Some(*rank);
        }
    }

    heading
        .chars()
        .find_map(|c| MARKER_RANKS.iter().find(|(m, _)| *m == c).map(|(_, r)| *r))
}

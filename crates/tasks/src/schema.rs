use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Positional task identifier `S.N`: `S` is the section ordinal in document
/// order (0 for tasks above the first heading), `N` the 1-based position of
/// the task inside that section.
///
/// Ids are a function of the file's current layout only.  Re-parsing an
/// unmodified file yields the same ids; they are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    pub section: usize,
    pub seq: usize,
}

impl TaskId {
    pub fn new(section: usize, seq: usize) -> Self {
        Self { section, seq }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.seq)
    }
}

impl FromStr for TaskId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (section, seq) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| format!("task id '{s}' is not of the form SECTION.N"))?;
        let section = section
            .parse::<usize>()
            .map_err(|_| format!("task id '{s}' has a non-numeric section"))?;
        let seq = seq
            .parse::<usize>()
            .map_err(|_| format!("task id '{s}' has a non-numeric sequence"))?;
        if seq == 0 {
            return Err(format!("task id '{s}' has sequence 0; sequences start at 1"));
        }
        Ok(Self { section, seq })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    /// Reserved.  Checkbox syntax cannot express it, so the parser never
    /// produces it.
    InProgress,
}

impl TaskStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::InProgress => "in_progress",
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    /// Rank of the enclosing section; lower is more urgent.
    pub priority: u32,
    /// Heading text of the enclosing section, empty above the first heading.
    pub section: String,
    /// Source plan file, when parsed from disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// 0-based line of the checkbox in the source text.
    pub line_index: usize,
    /// 0-based last line belonging to this task: its own line plus any
    /// indented detail lines and nested tasks.
    pub end_line: usize,
    /// Leading whitespace width of the checkbox line.
    pub indent: usize,
    /// Nearest enclosing task, for checkbox sub-items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TaskId>,
    /// Non-checkbox sub-bullets and continuation lines, trimmed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }
}

/// A heading-delimited region of a plan file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub ordinal: usize,
    /// Heading text; `None` for the preamble above the first heading.
    pub heading: Option<String>,
    /// ATX level 1–6; 0 for the preamble.
    pub level: u8,
    /// 0-based line of the heading, `None` for the preamble.
    pub line_index: Option<usize>,
    pub rank: u32,
    /// Whether the rank came from a cue in the heading text rather than
    /// inheritance.
    pub explicit_rank: bool,
    /// 0-based line index one past the section's last line.
    pub end_line: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_display_and_parse() {
        let id = TaskId::new(2, 3);
        assert_eq!(id.to_string(), "2.3");
        assert_eq!("2.3".parse::<TaskId>().unwrap(), id);
        assert_eq!(" 0.1 ".parse::<TaskId>().unwrap(), TaskId::new(0, 1));
    }

    #[test]
    fn task_id_rejects_garbage() {
        assert!("3".parse::<TaskId>().is_err());
        assert!("a.1".parse::<TaskId>().is_err());
        assert!("1.b".parse::<TaskId>().is_err());
        assert!("1.0".parse::<TaskId>().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!(TaskStatus::Completed.label(), "completed");
    }
}

//! In-place text edits on plan files.
//!
//! Both edits are pure `&str -> String` transforms.  Every byte outside the
//! inserted line (or the flipped checkbox character) is carried over
//! unchanged, including line endings and a missing final newline.

use crate::error::{Result, TaskError};
use crate::parser::{Outline, checkbox, parse_outline, split_lines};
use crate::schema::{TaskId, TaskStatus};

/// How a section heading is written when `add_task_to` has to create one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionStyle {
    /// Heading text; `{rank}` is replaced by the requested priority.
    pub title_template: String,
    pub heading_level: u8,
}

impl Default for SectionStyle {
    fn default() -> Self {
        Self {
            title_template: "Priority {rank}".to_string(),
            heading_level: 2,
        }
    }
}

impl SectionStyle {
    pub fn new(title_template: impl Into<String>, heading_level: u8) -> Self {
        Self {
            title_template: title_template.into(),
            heading_level,
        }
    }

    pub fn heading_text(&self, rank: u32) -> String {
        if self.title_template.contains("{rank}") {
            self.title_template.replace("{rank}", &rank.to_string())
        } else {
            format!("{} {rank}", self.title_template.trim_end())
        }
    }

    fn heading_line(&self, rank: u32) -> String {
        let hashes = "#".repeat(usize::from(self.heading_level.clamp(1, 6)));
        format!("{hashes} {}", self.heading_text(rank))
    }
}

/// Result of [`add_task_to`]: the new text and the 0-based line of the
/// inserted checkbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inserted {
    pub text: String,
    pub line_index: usize,
}

fn validate_title(title: &str) -> Result<&str> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(TaskError::InvalidTitle {
            reason: "title is empty",
        });
    }
    if trimmed.contains(['\n', '\r']) {
        return Err(TaskError::InvalidTitle {
            reason: "title spans several lines",
        });
    }
    Ok(trimmed)
}

fn line_ending(text: &str) -> &'static str {
    if text.contains("\r\n") { "\r\n" } else { "\n" }
}

/// Ordinal and heading line of the section that receives rank `rank` tasks:
/// the first heading whose cue names that rank, else the first heading that
/// inherited it.
fn target_section(outline: &Outline, rank: u32) -> Option<(usize, usize)> {
    let candidates = || {
        outline
            .sections
            .iter()
            .filter(move |s| s.rank == rank)
            .filter_map(|s| s.line_index.map(|line| (s, line)))
    };
    candidates()
        .find(|(s, _)| s.explicit_rank)
        .or_else(|| candidates().next())
        .map(|(s, line)| (s.ordinal, line))
}

/// Insert a pending task titled `title` at the end of the task list of the
/// section for `rank`, appending a new section at the end of the text when
/// none matches.
pub fn add_task_to(text: &str, title: &str, rank: u32, style: &SectionStyle) -> Result<Inserted> {
    let title = validate_title(title)?;
    let eol = line_ending(text);
    let outline = parse_outline(text);
    let lines = split_lines(text);

    let Some((ordinal, heading_line)) = target_section(&outline, rank) else {
        return Ok(append_section(text, title, rank, style, eol));
    };

    let top_level = outline
        .tasks_in(ordinal)
        .filter(|task| task.is_top_level())
        .collect::<Vec<_>>();

    let (after, indent, bullet) = match top_level.first() {
        Some(first) => {
            let shape = checkbox(lines[first.line_index].body);
            let last = top_level
                .iter()
                .map(|task| task.end_line)
                .max()
                .unwrap_or(first.end_line);
            (
                last,
                shape.map(|s| s.indent).unwrap_or_default(),
                shape.map(|s| s.bullet).unwrap_or('-'),
            )
        }
        None => (heading_line, "", '-'),
    };

    let new_line = format!("{indent}{bullet} [ ] {title}");
    let anchor = lines[after];
    let mut out = String::with_capacity(text.len() + new_line.len() + eol.len());
    if anchor.terminated {
        out.push_str(&text[..anchor.end]);
        out.push_str(&new_line);
        out.push_str(eol);
        out.push_str(&text[anchor.end..]);
    } else {
        out.push_str(text);
        out.push_str(eol);
        out.push_str(&new_line);
    }

    Ok(Inserted {
        text: out,
        line_index: after + 1,
    })
}

fn append_section(text: &str, title: &str, rank: u32, style: &SectionStyle, eol: &str) -> Inserted {
    let mut out = text.to_string();
    if !out.is_empty() {
        if !out.ends_with('\n') {
            out.push_str(eol);
        }
        let ends_blank = split_lines(&out)
            .last()
            .map(|line| line.body.trim().is_empty())
            .unwrap_or(true);
        if !ends_blank {
            out.push_str(eol);
        }
    }

    let heading_index = split_lines(&out).len();
    out.push_str(&style.heading_line(rank));
    out.push_str(eol);
    out.push_str(&format!("- [ ] {title}"));
    out.push_str(eol);

    Inserted {
        text: out,
        line_index: heading_index + 1,
    }
}

/// Mark task `id` completed.
///
/// Returns `None` when the task is already completed, so callers can skip the
/// write.
pub fn complete_task_in(text: &str, id: TaskId) -> Result<Option<String>> {
    let outline = parse_outline(text);
    let task = outline
        .task(id)
        .ok_or(TaskError::TaskNotFound { id, path: None })?;
    if task.status == TaskStatus::Completed {
        return Ok(None);
    }

    let line = split_lines(text)[task.line_index];
    let parts = checkbox(line.body).ok_or_else(|| TaskError::Parse {
        path: None,
        reason: format!("line {} is no longer a checkbox", task.line_index + 1),
    })?;

    let at = line.start + parts.marker_offset;
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..at]);
    out.push('x');
    out.push_str(&text[at + 1..]);
    Ok(Some(out))
}

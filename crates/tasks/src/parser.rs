//! Checkbox-style Markdown plan → tasks and sections.
//!
//! Any ATX heading (`#` to `######`) opens a section.  A line of the form
//! `- [ ] title` / `- [x] title` (bullet `-`, `*` or `+`, optionally indented)
//! is a task.  Indented non-checkbox lines below a task are its details;
//! indented checkbox lines are tasks of their own, linked to the nearest
//! shallower task as parent.  Fenced code blocks are skipped.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, TaskError};
use crate::rank::heading_rank;
use crate::schema::{Section, Task, TaskId, TaskStatus};

const BOM: &str = "\u{feff}";

/// Parsed structure of a plan: every section (the preamble first, even when
/// empty) and every task in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outline {
    pub sections: Vec<Section>,
    pub tasks: Vec<Task>,
}

impl Outline {
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn tasks_in(&self, ordinal: usize) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |task| task.id.section == ordinal)
    }
}

/// One physical line of the source.  Offsets are byte positions into the
/// original text; `body` excludes the line terminator.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line<'a> {
    pub start: usize,
    pub end: usize,
    pub body: &'a str,
    pub terminated: bool,
}

pub(crate) fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut offset = 0;
    let mut lines = text
        .split_inclusive('\n')
        .map(|raw| {
            let start = offset;
            offset += raw.len();
            let terminated = raw.ends_with('\n');
            let body = raw.strip_suffix('\n').unwrap_or(raw);
            let body = body.strip_suffix('\r').unwrap_or(body);
            Line {
                start,
                end: offset,
                body,
                terminated,
            }
        })
        .collect::<Vec<_>>();

    if let Some(first) = lines.first_mut() {
        if let Some(stripped) = first.body.strip_prefix(BOM) {
            first.body = stripped;
            first.start += BOM.len();
        }
    }
    lines
}

/// Pieces of a checkbox line the mutator needs to edit it in place.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkbox<'a> {
    pub indent: &'a str,
    pub bullet: char,
    /// Byte offset of the state character between the brackets.
    pub marker_offset: usize,
    pub checked: bool,
    pub title: &'a str,
}

fn checkbox_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([ \t]*)([-*+]) \[([ xX])\][ \t]+(\S.*?)[ \t]*$")
            .expect("checkbox pattern compiles")
    })
}

fn heading_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?[ \t]*$").expect("heading pattern compiles")
    })
}

pub(crate) fn checkbox(body: &str) -> Option<Checkbox<'_>> {
    let caps = checkbox_pattern().captures(body)?;
    let indent = caps.get(1)?.as_str();
    let bullet = caps.get(2)?.as_str().chars().next()?;
    let marker = caps.get(3)?;
    let title = caps.get(4)?.as_str();
    Some(Checkbox {
        indent,
        bullet,
        marker_offset: marker.start(),
        checked: marker.as_str() != " ",
        title,
    })
}

fn heading(body: &str) -> Option<(u8, String)> {
    let caps = heading_pattern().captures(body)?;
    let level = caps.get(1)?.as_str().len() as u8;
    let raw = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    // Optional closing sequence: `## Title ##`.
    let unclosed = raw.trim_end_matches('#');
    let text = if unclosed.len() < raw.len() && (unclosed.is_empty() || unclosed.ends_with([' ', '\t'])) {
        unclosed.trim_end()
    } else {
        raw
    };
    Some((level, text.to_string()))
}

fn indent_width(body: &str) -> usize {
    body.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn fence_open(body: &str) -> Option<(char, usize)> {
    let trimmed = body.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.chars().take_while(|c| *c == marker).count();
    (run >= 3).then_some((marker, run))
}

fn strip_bullet(text: &str) -> &str {
    for bullet in ["- ", "* ", "+ "] {
        if let Some(rest) = text.strip_prefix(bullet) {
            return rest.trim_start();
        }
    }
    text
}

struct Fence {
    marker: char,
    run: usize,
    /// Whether the block sits inside the open task's indentation.
    owned: bool,
}

struct Builder {
    sections: Vec<Section>,
    tasks: Vec<Task>,
    /// Indices into `tasks` of the currently open ancestor chain.
    open: Vec<usize>,
    seq: usize,
    last_heading_rank: Option<u32>,
}

impl Builder {
    fn new() -> Self {
        Self {
            sections: vec![Section {
                ordinal: 0,
                heading: None,
                level: 0,
                line_index: None,
                rank: 1,
                explicit_rank: false,
                end_line: 0,
            }],
            tasks: Vec::new(),
            open: Vec::new(),
            seq: 0,
            last_heading_rank: None,
        }
    }

    fn current(&self) -> &Section {
        // The preamble is always present.
        &self.sections[self.sections.len() - 1]
    }

    fn close_to_indent(&mut self, indent: usize) {
        while let Some(&top) = self.open.last() {
            if self.tasks[top].indent >= indent {
                self.open.pop();
            } else {
                break;
            }
        }
    }

    fn extend_open(&mut self, line_index: usize) {
        for &idx in &self.open {
            self.tasks[idx].end_line = line_index;
        }
    }

    fn heading(&mut self, line_index: usize, level: u8, text: String) {
        let cue = heading_rank(&text);
        let rank = cue
            .or_else(|| self.last_heading_rank.map(|r| r.saturating_add(1)))
            .unwrap_or(1);
        self.last_heading_rank = Some(rank);

        if let Some(last) = self.sections.last_mut() {
            last.end_line = line_index;
        }
        let ordinal = self.sections.len();
        self.sections.push(Section {
            ordinal,
            heading: Some(text),
            level,
            line_index: Some(line_index),
            rank,
            explicit_rank: cue.is_some(),
            end_line: line_index + 1,
        });
        self.open.clear();
        self.seq = 0;
    }

    fn task(&mut self, line_index: usize, body: &str, parts: Checkbox<'_>) {
        let indent = indent_width(body);
        self.close_to_indent(indent);
        let parent = self.open.last().map(|&idx| self.tasks[idx].id);

        self.seq += 1;
        let section = self.current();
        let task = Task {
            id: TaskId::new(section.ordinal, self.seq),
            title: parts.title.to_string(),
            status: if parts.checked {
                TaskStatus::Completed
            } else {
                TaskStatus::Pending
            },
            priority: section.rank,
            section: section.heading.clone().unwrap_or_default(),
            file: None,
            line_index,
            end_line: line_index,
            indent,
            parent,
            details: Vec::new(),
        };

        self.extend_open(line_index);
        self.tasks.push(task);
        self.open.push(self.tasks.len() - 1);
    }

    fn detail(&mut self, line_index: usize, body: &str) {
        let indent = indent_width(body);
        if indent == 0 {
            // An unindented paragraph ends the list.
            self.open.clear();
            return;
        }
        self.close_to_indent(indent);
        if let Some(&owner) = self.open.last() {
            self.tasks[owner]
                .details
                .push(strip_bullet(body.trim()).to_string());
            self.extend_open(line_index);
        }
    }

    fn finish(mut self, line_count: usize) -> Outline {
        if let Some(last) = self.sections.last_mut() {
            last.end_line = line_count.max(last.line_index.map_or(0, |l| l + 1));
        }
        Outline {
            sections: self.sections,
            tasks: self.tasks,
        }
    }
}

/// Full structural parse of `text`.
pub fn parse_outline(text: &str) -> Outline {
    let lines = split_lines(text);
    let mut builder = Builder::new();
    let mut fence: Option<Fence> = None;

    for (idx, line) in lines.iter().enumerate() {
        let body = line.body;

        if let Some(open) = &fence {
            let closes = fence_open(body)
                .map(|(marker, run)| marker == open.marker && run >= open.run)
                .unwrap_or(false);
            if open.owned {
                builder.extend_open(idx);
            }
            if closes {
                fence = None;
            }
            continue;
        }

        if let Some((marker, run)) = fence_open(body) {
            let indent = indent_width(body);
            let mut owned = false;
            if indent > 0 && !builder.open.is_empty() {
                builder.close_to_indent(indent);
                owned = !builder.open.is_empty();
                if owned {
                    builder.extend_open(idx);
                }
            }
            fence = Some(Fence { marker, run, owned });
            continue;
        }

        if let Some((level, text)) = heading(body) {
            builder.heading(idx, level, text);
            continue;
        }

        if let Some(parts) = checkbox(body) {
            builder.task(idx, body, parts);
            continue;
        }

        if !body.trim().is_empty() {
            builder.detail(idx, body);
        }
    }

    builder.finish(lines.len())
}

/// Tasks of `text` in document order.
pub fn parse(text: &str) -> Vec<Task> {
    parse_outline(text).tasks
}

/// Validate `bytes` as UTF-8 plan text.
pub fn decode(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|err| TaskError::Parse {
        path: None,
        reason: format!("plan is not valid UTF-8: {err}"),
    })
}

/// [`parse`] for raw file contents.
pub fn parse_bytes(bytes: &[u8]) -> Result<Vec<Task>> {
    decode(bytes).map(parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "\
# Roadmap

Some intro text.

## Priority 1
- [ ] A
- [x] Shipped

## Priority 2
- [ ] B
- [ ] C
";

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn sections_set_priority_and_ids() {
        let tasks = parse(PLAN);
        assert_eq!(titles(&tasks), vec!["A", "Shipped", "B", "C"]);

        assert_eq!(tasks[0].id, TaskId::new(2, 1));
        assert_eq!(tasks[0].priority, 1);
        assert_eq!(tasks[0].section, "Priority 1");
        assert_eq!(tasks[0].line_index, 5);
        assert_eq!(tasks[1].status, TaskStatus::Completed);

        assert_eq!(tasks[2].id, TaskId::new(3, 1));
        assert_eq!(tasks[3].id, TaskId::new(3, 2));
        assert_eq!(tasks[3].priority, 2);
    }

    #[test]
    fn reparse_is_stable() {
        assert_eq!(parse(PLAN), parse(PLAN));
    }

    #[test]
    fn uncued_heading_inherits_previous_rank_plus_one() {
        let outline = parse_outline("## Priority 2\n- [ ] x\n## Backlog\n- [ ] y\n");
        let ranks = outline.sections.iter().map(|s| (s.rank, s.explicit_rank)).collect::<Vec<_>>();
        assert_eq!(ranks, vec![(1, false), (2, true), (3, false)]);
        assert_eq!(outline.tasks[1].priority, 3);
    }

    #[test]
    fn first_uncued_heading_is_rank_one() {
        let tasks = parse("# Todo\n- [ ] a\n");
        assert_eq!(tasks[0].priority, 1);
    }

    #[test]
    fn preamble_tasks_are_section_zero() {
        let tasks = parse("- [ ] loose\n\n## Priority 3\n- [ ] ranked\n");
        assert_eq!(tasks[0].id, TaskId::new(0, 1));
        assert_eq!(tasks[0].priority, 1);
        assert_eq!(tasks[0].section, "");
        assert_eq!(tasks[1].id, TaskId::new(1, 1));
    }

    #[test]
    fn nested_checkboxes_and_details() {
        let text = "\
## Priority 1
- [ ] Parent
  some context
  - a detail bullet
  - [ ] Child
    child note
- [X] Sibling
";
        let tasks = parse(text);
        assert_eq!(titles(&tasks), vec!["Parent", "Child", "Sibling"]);

        let parent = &tasks[0];
        assert_eq!(parent.details, vec!["some context", "a detail bullet"]);
        assert_eq!(parent.end_line, 5);
        assert!(parent.is_top_level());

        let child = &tasks[1];
        assert_eq!(child.parent, Some(parent.id));
        assert_eq!(child.id, TaskId::new(1, 2));
        assert_eq!(child.priority, 1);
        assert_eq!(child.details, vec!["child note"]);

        assert_eq!(tasks[2].parent, None);
        assert_eq!(tasks[2].status, TaskStatus::Completed);
    }

    #[test]
    fn alternative_bullets_and_crlf() {
        let tasks = parse("## P1\r\n* [ ] star\r\n+ [x] plus\r\n");
        assert_eq!(titles(&tasks), vec!["star", "plus"]);
        assert_eq!(tasks[0].priority, 1);
    }

    #[test]
    fn fenced_code_is_ignored() {
        let text = "\
## Priority 1
```markdown
## Priority 9
- [ ] not a task
```
- [ ] real
";
        let outline = parse_outline(text);
        assert_eq!(outline.sections.len(), 2);
        assert_eq!(titles(&outline.tasks), vec!["real"]);
    }

    #[test]
    fn malformed_checkboxes_are_plain_text() {
        let tasks = parse("- [] nope\n- [ ]\n-[ ] tight\n- [y] other\n- [ ] yes\n");
        assert_eq!(titles(&tasks), vec!["yes"]);
    }

    #[test]
    fn hash_tags_are_not_headings() {
        let outline = parse_outline("#release notes\n- [ ] a\n");
        assert_eq!(outline.sections.len(), 1);
    }

    #[test]
    fn closing_hashes_are_trimmed() {
        let outline = parse_outline("## Priority 2 ##\n");
        assert_eq!(outline.sections[1].heading.as_deref(), Some("Priority 2"));
    }

    #[test]
    fn section_extents() {
        let outline = parse_outline(PLAN);
        let extents = outline
            .sections
            .iter()
            .map(|s| (s.line_index, s.end_line))
            .collect::<Vec<_>>();
        assert_eq!(
            extents,
            vec![(None, 0), (Some(0), 4), (Some(4), 8), (Some(8), 11)]
        );
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let err = parse_bytes(&[0x2d, 0x20, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, TaskError::Parse { path: None, .. }));
    }

    #[test]
    fn byte_order_mark_is_skipped() {
        let tasks = parse("\u{feff}## Priority 2\n- [ ] a\n");
        assert_eq!(tasks[0].priority, 2);
    }
}

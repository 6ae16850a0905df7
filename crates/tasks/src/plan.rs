use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use assistant_core::fsio::{read_if_exists, write_atomic};

use crate::error::{Result, TaskError};
use crate::mutator::{SectionStyle, add_task_to, complete_task_in};
use crate::parser::{Outline, decode, parse_outline};
use crate::resolver::next_task;
use crate::schema::{Task, TaskId};

/// A plan file on disk.
///
/// Nothing is cached between calls: every operation re-reads the file, and
/// every mutation re-parses it, edits the text, then atomically replaces the
/// file.  Task ids returned by one call are only meaningful against the file
/// as it was at that moment.
#[derive(Debug, Clone)]
pub struct PlanFile {
    path: PathBuf,
    style: SectionStyle,
}

impl PlanFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            style: SectionStyle::default(),
        }
    }

    pub fn with_style(mut self, style: SectionStyle) -> Self {
        self.style = style;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_text(&self) -> Result<Option<String>> {
        let Some(bytes) = read_if_exists(&self.path).map_err(|e| TaskError::io(&self.path, e))? else {
            return Ok(None);
        };
        let text = decode(&bytes).map_err(|e| e.at(&self.path))?;
        Ok(Some(text.to_string()))
    }

    fn read_existing(&self) -> Result<String> {
        self.read_text()?.ok_or_else(|| {
            TaskError::io(
                &self.path,
                io::Error::new(io::ErrorKind::NotFound, "plan file does not exist"),
            )
        })
    }

    fn located(&self, outline: Outline) -> Vec<Task> {
        outline
            .tasks
            .into_iter()
            .map(|mut task| {
                task.file = Some(self.path.clone());
                task
            })
            .collect()
    }

    pub fn outline(&self) -> Result<Outline> {
        Ok(parse_outline(&self.read_existing()?))
    }

    /// Every task in the file, in document order.
    pub fn list(&self) -> Result<Vec<Task>> {
        let outline = self.outline()?;
        debug!(plan = %self.path.display(), tasks = outline.tasks.len(), "plan parsed");
        Ok(self.located(outline))
    }

    pub fn next(&self) -> Result<Option<Task>> {
        let tasks = self.list()?;
        Ok(next_task(&tasks).cloned())
    }

    /// Add a pending task with the given priority rank, creating the file
    /// when it does not exist yet.
    #[instrument(skip(self), fields(plan = %self.path.display()))]
    pub fn add(&self, title: &str, priority: u32) -> Result<Task> {
        let text = self.read_text()?.unwrap_or_default();
        let inserted = add_task_to(&text, title, priority, &self.style)?;
        write_atomic(&self.path, inserted.text.as_bytes()).map_err(|e| TaskError::io(&self.path, e))?;

        let task = self
            .located(parse_outline(&inserted.text))
            .into_iter()
            .find(|task| task.line_index == inserted.line_index)
            .ok_or_else(|| TaskError::Parse {
                path: Some(self.path.clone()),
                reason: format!("added task on line {} did not parse back", inserted.line_index + 1),
            })?;
        info!(id = %task.id, priority = task.priority, "task added");
        Ok(task)
    }

    /// Mark `id` completed and return it as it now reads.  Completing an
    /// already-completed task leaves the file untouched.
    #[instrument(skip(self), fields(plan = %self.path.display()))]
    pub fn complete(&self, id: TaskId) -> Result<Task> {
        let text = self.read_existing()?;
        let current = match complete_task_in(&text, id).map_err(|e| e.at(&self.path))? {
            Some(updated) => {
                write_atomic(&self.path, updated.as_bytes()).map_err(|e| TaskError::io(&self.path, e))?;
                info!(%id, "task completed");
                updated
            }
            None => {
                debug!(%id, "task already completed");
                text
            }
        };

        self.located(parse_outline(&current))
            .into_iter()
            .find(|task| task.id == id)
            .ok_or(TaskError::TaskNotFound {
                id,
                path: Some(self.path.clone()),
            })
    }
}

/// Outcome of reading one plan in [`scan_plans`].
#[derive(Debug)]
pub struct PlanScan {
    pub path: PathBuf,
    pub tasks: Result<Vec<Task>>,
}

/// Parse each plan independently; a failing file does not hide the others.
pub fn scan_plans<I, P>(paths: I) -> Vec<PlanScan>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths
        .into_iter()
        .map(|path| {
            let plan = PlanFile::new(path);
            let tasks = plan.list();
            if let Err(err) = &tasks {
                warn!(plan = %plan.path().display(), error = %err, "skipping unreadable plan");
            }
            PlanScan {
                path: plan.path,
                tasks,
            }
        })
        .collect()
}

/// Next task over several plans.  Plans are ranked in the order given, so on
/// equal priority the earlier plan wins.
pub fn next_across(scans: &[PlanScan]) -> Option<Task> {
    let all = scans
        .iter()
        .filter_map(|scan| scan.tasks.as_ref().ok())
        .flatten()
        .cloned()
        .collect::<Vec<_>>();
    next_task(&all).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TaskStatus;
    use tempfile::TempDir;

    const PLAN: &str = "## Priority 1\n- [ ] A\n\n## Priority 2\n- [ ] B\n- [ ] C\n";

    fn plan_in(dir: &TempDir, contents: &str) -> PlanFile {
        let path = dir.path().join("PLAN.md");
        std::fs::write(&path, contents).unwrap();
        PlanFile::new(path)
    }

    #[test]
    fn list_next_complete_cycle() {
        let dir = TempDir::new().unwrap();
        let plan = plan_in(&dir, PLAN);

        let tasks = plan.list().unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|t| t.file.as_deref() == Some(plan.path())));

        let a = plan.next().unwrap().unwrap();
        assert_eq!(a.title, "A");
        let done = plan.complete(a.id).unwrap();
        assert!(!done.is_pending());
        assert_eq!(plan.next().unwrap().unwrap().title, "B");

        let on_disk = std::fs::read_to_string(plan.path()).unwrap();
        assert_eq!(on_disk, PLAN.replacen("[ ] A", "[x] A", 1));
    }

    #[test]
    fn completed_task_is_listed_but_never_next() {
        const MIXED: &str = "## Priority 1\n- [ ] A\n\n## Priority 2\n- [ ] B\n- [x] C\n";
        let dir = TempDir::new().unwrap();
        let plan = plan_in(&dir, MIXED);

        let summary = plan
            .list()
            .unwrap()
            .into_iter()
            .map(|t| (t.title, t.status, t.priority))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("A".to_string(), TaskStatus::Pending, 1),
                ("B".to_string(), TaskStatus::Pending, 2),
                ("C".to_string(), TaskStatus::Completed, 2),
            ]
        );
        assert_eq!(plan.next().unwrap().unwrap().title, "A");

        let d = plan.add("D", 1).unwrap();
        assert_eq!(d.id, TaskId::new(1, 2));
        assert_eq!(
            std::fs::read_to_string(plan.path()).unwrap(),
            "## Priority 1\n- [ ] A\n- [ ] D\n\n## Priority 2\n- [ ] B\n- [x] C\n"
        );

        plan.complete(TaskId::new(1, 1)).unwrap();
        plan.complete(TaskId::new(1, 2)).unwrap();
        assert_eq!(plan.next().unwrap().unwrap().title, "B");
    }

    #[test]
    fn complete_twice_does_not_rewrite() {
        let dir = TempDir::new().unwrap();
        let plan = plan_in(&dir, PLAN);
        let id = TaskId::new(1, 1);
        plan.complete(id).unwrap();
        let first = std::fs::metadata(plan.path()).unwrap().modified().unwrap();

        let again = plan.complete(id).unwrap();
        assert_eq!(again.title, "A");
        let second = std::fs::metadata(plan.path()).unwrap().modified().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn complete_unknown_task_names_the_file() {
        let dir = TempDir::new().unwrap();
        let plan = plan_in(&dir, PLAN);
        let err = plan.complete(TaskId::new(7, 1)).unwrap_err();
        match err {
            TaskError::TaskNotFound { id, path } => {
                assert_eq!(id, TaskId::new(7, 1));
                assert_eq!(path.as_deref(), Some(plan.path()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(std::fs::read_to_string(plan.path()).unwrap(), PLAN);
    }

    #[test]
    fn add_creates_the_file() {
        let dir = TempDir::new().unwrap();
        let plan = PlanFile::new(dir.path().join("nested/PLAN.md"));
        let task = plan.add("Write docs", 2).unwrap();
        assert_eq!(task.title, "Write docs");
        assert_eq!(task.priority, 2);
        assert_eq!(
            std::fs::read_to_string(plan.path()).unwrap(),
            "## Priority 2\n- [ ] Write docs\n"
        );
    }

    #[test]
    fn add_returns_the_inserted_task() {
        let dir = TempDir::new().unwrap();
        let plan = plan_in(&dir, PLAN);
        let d = plan.add("D", 1).unwrap();
        assert_eq!(d.id, TaskId::new(1, 2));
        assert_eq!(d.section, "Priority 1");
        assert_eq!(plan.next().unwrap().unwrap().title, "A");
    }

    #[test]
    fn missing_plan_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let plan = PlanFile::new(dir.path().join("absent.md"));
        assert!(matches!(plan.list(), Err(TaskError::Io { .. })));
        assert!(matches!(plan.complete(TaskId::new(1, 1)), Err(TaskError::Io { .. })));
    }

    #[test]
    fn scan_keeps_good_plans_when_one_fails() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.md");
        let bad = dir.path().join("bad.md");
        let other = dir.path().join("other.md");
        std::fs::write(&good, "## Priority 2\n- [ ] from good\n").unwrap();
        std::fs::write(&bad, [0xffu8, 0xfe, 0x00]).unwrap();
        std::fs::write(&other, "## Priority 2\n- [ ] from other\n## Priority 1\n- [x] done\n").unwrap();

        let scans = scan_plans([&good, &bad, &other]);
        assert_eq!(scans.len(), 3);
        assert!(matches!(scans[1].tasks, Err(TaskError::Parse { .. })));

        let next = next_across(&scans).unwrap();
        assert_eq!(next.title, "from good");
        assert_eq!(next.file.as_deref(), Some(good.as_path()));
    }
}

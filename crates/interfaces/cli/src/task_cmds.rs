use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use assistant_config::AppConfig;
use assistant_memory::layout::slugify;
use assistant_memory::{MemoryManager, MemorySource, SaveOptions};
use assistant_tasks::{PlanFile, SectionStyle, Task, TaskId, TaskStatus, next_across, scan_plans};

use crate::memory_cmds::parse_source;
use crate::open_memory;

fn plan_for(config: &AppConfig, path: &Path) -> PlanFile {
    PlanFile::new(path).with_style(SectionStyle::new(
        config.tasks.section_title.clone(),
        config.heading_level(),
    ))
}

fn status_box(task: &Task) -> &'static str {
    match task.status {
        TaskStatus::Pending => "[ ]",
        TaskStatus::Completed => "[x]",
        TaskStatus::InProgress => "[~]",
    }
}

fn print_task(task: &Task) {
    let depth = task.indent / 2;
    println!(
        "  {:>5}  P{:<3} {}{} {}",
        task.id.to_string(),
        task.priority,
        "  ".repeat(depth),
        status_box(task),
        task.title
    );
}

pub(crate) fn run_task_list(paths: &[PathBuf], json: bool) -> Result<()> {
    let scans = scan_plans(paths);
    let mut failures = 0;

    if json {
        let mut all = Vec::new();
        for scan in &scans {
            match &scan.tasks {
                Ok(tasks) => all.extend(tasks.iter().cloned()),
                Err(err) => {
                    failures += 1;
                    eprintln!("{}: {err}", scan.path.display());
                }
            }
        }
        println!("{}", serde_json::to_string_pretty(&all)?);
    } else {
        for scan in &scans {
            println!("── {} ──", scan.path.display());
            match &scan.tasks {
                Ok(tasks) if tasks.is_empty() => println!("  (no tasks)"),
                Ok(tasks) => tasks.iter().for_each(print_task),
                Err(err) => {
                    failures += 1;
                    println!("  unreadable: {err}");
                }
            }
        }
    }

    if failures == scans.len() && !scans.is_empty() {
        return Err(anyhow!("no plan file could be read"));
    }
    Ok(())
}

pub(crate) fn run_task_next(paths: &[PathBuf], json: bool) -> Result<()> {
    let scans = scan_plans(paths);
    if scans.iter().all(|scan| scan.tasks.is_err()) {
        return Err(anyhow!("no plan file could be read"));
    }

    let next = next_across(&scans);
    if json {
        println!("{}", serde_json::to_string_pretty(&next)?);
        return Ok(());
    }

    match next {
        Some(task) => {
            let file = task
                .file
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!("{} {} (priority {}, {file})", task.id, task.title, task.priority);
            for detail in &task.details {
                println!("    {detail}");
            }
        }
        None => println!("nothing pending"),
    }
    Ok(())
}

pub(crate) fn run_task_add(config: &AppConfig, path: &Path, title: &str, priority: u32) -> Result<()> {
    let task = plan_for(config, path).add(title, priority)?;
    println!(
        "added {} \"{}\" under \"{}\" in {}",
        task.id,
        task.title,
        task.section,
        path.display()
    );
    Ok(())
}

pub(crate) fn run_task_done(config: &AppConfig, path: &Path, raw_id: &str, note: Option<&str>) -> Result<()> {
    let id = raw_id.parse::<TaskId>().map_err(|err| anyhow!(err))?;
    let plan = plan_for(config, path);

    if let Some(task) = plan.list()?.into_iter().find(|t| t.id == id) {
        if task.status == TaskStatus::Completed {
            println!("{} \"{}\" was already completed", task.id, task.title);
            return Ok(());
        }
    }

    let task = plan.complete(id)?;
    println!("completed {} \"{}\"", task.id, task.title);

    if config.tasks.log_completions {
        let source = parse_source(&config.tasks.completion_source)?;
        let key = record_completion(config, path, &task, source, note)?;
        println!("logged to memory as '{key}'");
    }
    Ok(())
}

/// Base memory key for a completed task: `tasks/<plan stem>/<title slug>`.
fn completion_key(plan: &Path, task: &Task) -> String {
    format!("tasks/{}/{}", plan_slug(plan), title_slug(&task.title))
}

/// First of `base`, `base-2`, `base-3`, ... not yet used in memory, so an
/// earlier completion with the same title is never overwritten.
fn unused_key(memory: &MemoryManager, base: &str) -> String {
    if !memory.index().contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|key| !memory.index().contains(key))
        .unwrap_or_else(|| base.to_string())
}

fn plan_slug(plan: &Path) -> String {
    let stem = plan
        .file_stem()
        .map(|s| slugify(&s.to_string_lossy()))
        .unwrap_or_default();
    if stem.is_empty() { "plan".to_string() } else { stem }
}

fn title_slug(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() { "task".to_string() } else { slug }
}

fn completion_value(plan: &Path, task: &Task, note: Option<&str>) -> String {
    let mut lines = vec![format!("Completed: {}", task.title)];
    lines.push(format!("Plan: {}", plan.display()));
    if !task.section.is_empty() {
        lines.push(format!("Section: {} (priority {})", task.section, task.priority));
    }
    lines.push(format!("Task id at completion: {}", task.id));
    if !task.details.is_empty() {
        lines.push(String::new());
        lines.extend(task.details.iter().map(|d| format!("- {d}")));
    }
    if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
        lines.push(String::new());
        lines.push(note.to_string());
    }
    lines.join("\n") + "\n"
}

fn record_completion(
    config: &AppConfig,
    plan: &Path,
    task: &Task,
    source: MemorySource,
    note: Option<&str>,
) -> Result<String> {
    let options = SaveOptions::new(source)
        .tag("task")
        .tag("completed")
        .tag(format!("plan:{}", plan_slug(plan)));

    // The plan edit already happened; a memory failure is reported, not
    // rolled back.
    let mut memory = open_memory(config)?;
    let key = unused_key(&memory, &completion_key(plan, task));
    match memory.save(&key, &completion_value(plan, task, note), options) {
        Ok(_) => {
            info!(%key, task = %task.id, "task completion recorded");
            Ok(key)
        }
        Err(err) => {
            warn!(%key, error = %err, "task completed but not recorded in memory");
            Err(err.into())
        }
    }
}

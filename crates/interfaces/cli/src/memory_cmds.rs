use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};

use assistant_config::AppConfig;
use assistant_memory::schema::normalize_tag;
use assistant_memory::{MemoryEntry, MemoryManager, MemorySource, RecentFilter, SaveOptions};

pub(crate) struct SaveArgs {
    pub key: String,
    pub value: Option<String>,
    pub file: Option<PathBuf>,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub replace_tags: bool,
}

pub(crate) fn parse_source(raw: &str) -> Result<MemorySource> {
    raw.parse::<MemorySource>().map_err(|err| anyhow!(err))
}

fn read_value(args: &SaveArgs) -> Result<String> {
    if let Some(value) = &args.value {
        return Ok(value.clone());
    }
    if let Some(path) = &args.file {
        return fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    if io::stdin().is_terminal() {
        bail!("no value given: pass it as an argument, with --file, or on stdin");
    }
    let mut value = String::new();
    io::stdin().read_to_string(&mut value)?;
    Ok(value)
}

pub(crate) fn run_memory_save(memory: &mut MemoryManager, config: &AppConfig, args: SaveArgs) -> Result<()> {
    let value = read_value(&args)?;
    let source = parse_source(args.source.as_deref().unwrap_or(&config.memory.default_source))?;

    let mut options = SaveOptions::new(source).tags(&args.tags);
    if args.replace_tags {
        options = options.replace_tags();
    }

    let entry = memory.save(&args.key, &value, options)?;
    println!("saved '{}' ({} bytes, updated {})", entry.key, entry.value.len(), entry.updated_at.to_rfc3339());
    Ok(())
}

pub(crate) fn run_memory_load(memory: &MemoryManager, key: &str, json: bool) -> Result<()> {
    let entry = memory.load(key)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        print!("{}", entry.value);
        if !entry.value.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn print_entries(entries: &[MemoryEntry]) {
    for entry in entries {
        let tags = entry.tags.iter().cloned().collect::<Vec<_>>().join(", ");
        let first_line = entry.value.lines().next().unwrap_or_default();
        println!(
            "{}  {}  [{tags}]  {first_line}",
            entry.updated_at.format("%Y-%m-%d %H:%M"),
            entry.key
        );
    }
}

pub(crate) fn run_memory_search(memory: &MemoryManager, query: &str) -> Result<()> {
    let hits = memory.search(query)?;
    if hits.is_empty() {
        println!("no matching memory entries");
    } else {
        print_entries(&hits);
    }
    Ok(())
}

pub(crate) fn run_memory_list(memory: &MemoryManager) {
    let records = memory.list();
    if records.is_empty() {
        println!("memory is empty");
        return;
    }
    for record in records {
        println!(
            "{:<40} {:<7} {}",
            record.key,
            record.source.label(),
            record.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
}

pub(crate) fn run_memory_recent(
    memory: &MemoryManager,
    limit: usize,
    tags: &[String],
    source: Option<&str>,
) -> Result<()> {
    let filter = RecentFilter {
        tags: tags
            .iter()
            .filter_map(|t| normalize_tag(t))
            .collect(),
        source: source.map(parse_source).transpose()?,
        limit,
    };
    print_entries(&memory.recent(&filter)?);
    Ok(())
}

pub(crate) fn run_memory_forget(memory: &mut MemoryManager, key: &str, yes: bool) -> Result<()> {
    let Some(record) = memory.index().get(key).cloned() else {
        println!("no memory entry '{key}'");
        return Ok(());
    };

    if !yes {
        if !io::stdin().is_terminal() {
            bail!("refusing to delete '{key}' in non-interactive mode without --yes");
        }

        print!(
            "This permanently deletes {}. Type the key to continue: ",
            memory.documents().absolute(&record.file_path).display()
        );
        io::stdout().flush()?;

        let mut confirmation = String::new();
        io::stdin().read_line(&mut confirmation)?;
        if confirmation.trim() != key {
            println!("forget cancelled");
            return Ok(());
        }
    }

    memory.forget(key)?;
    println!("forgot '{key}'");
    Ok(())
}

pub(crate) fn run_memory_stats(memory: &MemoryManager, config: &AppConfig) {
    let stats = memory.stats();
    println!("── memory stats ─────────────────────────────────────");
    println!("  total:         {}", stats.total);
    println!("  user:          {}", stats.user);
    println!("  agent:         {}", stats.agent);
    println!("  import:        {}", stats.import);
    println!("  distinct tags: {}", stats.distinct_tags);

    println!();
    println!("── storage ──────────────────────────────────────────");
    println!("  index:   {}", memory.index().path().display());
    println!("  entries: {}", config.entries_root().display());
    if memory.index().is_marked_dirty() {
        println!("  (interrupted write detected; run `assistant memory rebuild-index`)");
    }
}

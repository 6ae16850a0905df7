mod memory_cmds;
mod task_cmds;

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fs2::FileExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use assistant_config::{AppConfig, DEFAULT_CONFIG_PATH};
use assistant_memory::{MemoryError, MemoryManager};
use assistant_tasks::TaskError;

#[derive(Debug, Parser)]
#[command(
    name = "assistant",
    version,
    about = "Markdown-backed memory and plan-file tasks"
)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Keyed, tagged notes stored as Markdown files.
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },
    /// Checkbox tasks in Markdown plan files.
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

#[derive(Debug, Subcommand)]
enum MemoryCommands {
    /// Create or overwrite an entry.  The value comes from the argument,
    /// `--file`, or stdin.
    Save {
        key: String,
        value: Option<String>,
        #[arg(long, conflicts_with = "value")]
        file: Option<PathBuf>,
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        /// `user`, `agent` or `import`; defaults to `memory.default_source`.
        #[arg(long)]
        source: Option<String>,
        /// Replace the entry's tags instead of merging with them.
        #[arg(long)]
        replace_tags: bool,
    },
    Load {
        key: String,
        #[arg(long)]
        json: bool,
    },
    /// `#tag` / `tag:tag` for a known tag, otherwise case-insensitive text.
    Search {
        query: String,
    },
    List,
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        #[arg(long)]
        source: Option<String>,
    },
    Summary {
        #[arg(long, default_value_t = 10)]
        last: usize,
    },
    Forget {
        key: String,
        #[arg(long)]
        yes: bool,
    },
    RebuildIndex,
    Stats,
}

#[derive(Debug, Subcommand)]
enum TaskCommands {
    /// Every task, grouped by file.
    List {
        #[arg(long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// The single next pending task across the given plans.
    Next {
        #[arg(long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    Add {
        title: String,
        #[arg(long, short)]
        priority: u32,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Mark a task completed by its `SECTION.N` id.
    Done {
        id: String,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Extra text recorded with the completion in memory.
        #[arg(long)]
        note: Option<String>,
    },
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Held for the duration of a mutating command.
pub(crate) struct CommandLock {
    file: File,
}

impl Drop for CommandLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

pub(crate) fn acquire_lock(config: &AppConfig) -> Result<CommandLock> {
    let path = config.lock_path();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(&path)
        .with_context(|| format!("failed to open lock file {}", path.display()))?;
    if file.try_lock_exclusive().is_err() {
        info!(lock = %path.display(), "waiting for another assistant command to finish");
        file.lock_exclusive()
            .with_context(|| format!("failed to lock {}", path.display()))?;
    }
    debug!(lock = %path.display(), "lock acquired");
    Ok(CommandLock { file })
}

pub(crate) fn open_memory(config: &AppConfig) -> Result<MemoryManager> {
    MemoryManager::open(config.index_path(), config.entries_root()).with_context(|| {
        format!(
            "failed to open memory store at {}",
            config.memory_root().display()
        )
    })
}

fn run(cli: Cli, config: &AppConfig) -> Result<()> {
    match cli.command {
        Commands::Memory { command } => match command {
            MemoryCommands::Save {
                key,
                value,
                file,
                tags,
                source,
                replace_tags,
            } => {
                let _lock = acquire_lock(config)?;
                let mut memory = open_memory(config)?;
                let args = memory_cmds::SaveArgs {
                    key,
                    value,
                    file,
                    tags,
                    source,
                    replace_tags,
                };
                memory_cmds::run_memory_save(&mut memory, config, args)
            }
            MemoryCommands::Load { key, json } => {
                memory_cmds::run_memory_load(&open_memory(config)?, &key, json)
            }
            MemoryCommands::Search { query } => {
                memory_cmds::run_memory_search(&open_memory(config)?, &query)
            }
            MemoryCommands::List => {
                memory_cmds::run_memory_list(&open_memory(config)?);
                Ok(())
            }
            MemoryCommands::Recent {
                limit,
                tags,
                source,
            } => memory_cmds::run_memory_recent(&open_memory(config)?, limit, &tags, source.as_deref()),
            MemoryCommands::Summary { last } => {
                println!("{}", open_memory(config)?.summarize(last)?);
                Ok(())
            }
            MemoryCommands::Forget { key, yes } => {
                let _lock = acquire_lock(config)?;
                memory_cmds::run_memory_forget(&mut open_memory(config)?, &key, yes)
            }
            MemoryCommands::RebuildIndex => {
                let _lock = acquire_lock(config)?;
                let count = open_memory(config)?.rebuild_index()?;
                println!("memory index rebuilt: {count} entries");
                Ok(())
            }
            MemoryCommands::Stats => {
                memory_cmds::run_memory_stats(&open_memory(config)?, config);
                Ok(())
            }
        },
        Commands::Task { command } => match command {
            TaskCommands::List { files, json } => {
                task_cmds::run_task_list(&plan_paths(config, files), json)
            }
            TaskCommands::Next { files, json } => {
                task_cmds::run_task_next(&plan_paths(config, files), json)
            }
            TaskCommands::Add {
                title,
                priority,
                file,
            } => {
                let _lock = acquire_lock(config)?;
                let path = file.unwrap_or_else(|| PathBuf::from(&config.tasks.plan_file));
                task_cmds::run_task_add(config, &path, &title, priority)
            }
            TaskCommands::Done { id, file, note } => {
                let _lock = acquire_lock(config)?;
                let path = file.unwrap_or_else(|| PathBuf::from(&config.tasks.plan_file));
                task_cmds::run_task_done(config, &path, &id, note.as_deref())
            }
        },
    }
}

fn plan_paths(config: &AppConfig, files: Vec<PathBuf>) -> Vec<PathBuf> {
    if files.is_empty() {
        vec![PathBuf::from(&config.tasks.plan_file)]
    } else {
        files
    }
}

/// Short message for the expected, recoverable failures; `None` for
/// everything else.
fn friendly(err: &anyhow::Error) -> Option<String> {
    if let Some(MemoryError::NotFound { key }) = err.downcast_ref::<MemoryError>() {
        return Some(format!("no memory entry '{key}'"));
    }
    if let Some(TaskError::TaskNotFound { id, path }) = err.downcast_ref::<TaskError>() {
        let location = path
            .as_deref()
            .map(Path::display)
            .map(|p| format!(" in {p}"))
            .unwrap_or_default();
        return Some(format!("no task {id}{location}; run `assistant task list` for current ids"));
    }
    None
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match AppConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: failed to load {}: {err:#}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match friendly(&err) {
                Some(message) => eprintln!("{message}"),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

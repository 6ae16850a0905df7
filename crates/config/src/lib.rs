use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default location of the configuration file, relative to the working
/// directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ── Memory store ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Directory holding the index file and the entry bodies.
    pub root: String,
    /// Index file name, relative to `root`.
    pub index_file: String,
    /// Directory for entry bodies, relative to `root`.
    pub entries_dir: String,
    /// Source recorded for entries saved from the command line
    /// (`user`, `agent` or `import`).
    pub default_source: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            root: ".assistant/memory".to_string(),
            index_file: "index.json".to_string(),
            entries_dir: "entries".to_string(),
            default_source: "user".to_string(),
        }
    }
}

// ── Plan files ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Plan file used when a command is not given `--file`.
    pub plan_file: String,
    /// Heading text for sections created by `task add`.  `{rank}` is replaced
    /// by the requested priority.
    pub section_title: String,
    /// ATX heading level (1–6) for created sections.
    pub heading_level: u8,
    /// Record every completed task into the memory store.
    pub log_completions: bool,
    /// Source recorded on completion entries.
    pub completion_source: String,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            plan_file: "PLAN.md".to_string(),
            section_title: "Priority {rank}".to_string(),
            heading_level: 2,
            log_completions: true,
            completion_source: "agent".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub memory: MemoryConfig,
    pub tasks: TasksConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("ASSISTANT_MEMORY_ROOT") {
            if !value.is_empty() {
                config.memory.root = value;
            }
        }

        if let Ok(value) = env::var("ASSISTANT_PLAN_FILE") {
            if !value.is_empty() {
                config.tasks.plan_file = value;
            }
        }

        if let Ok(value) = env::var("ASSISTANT_LOG_LEVEL") {
            if !value.is_empty() {
                config.telemetry.log_level = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn memory_root(&self) -> PathBuf {
        PathBuf::from(&self.memory.root)
    }

    pub fn index_path(&self) -> PathBuf {
        self.memory_root().join(&self.memory.index_file)
    }

    pub fn entries_root(&self) -> PathBuf {
        self.memory_root().join(&self.memory.entries_dir)
    }

    /// Advisory lock file serialising mutating commands.  Lives next to the
    /// memory root so plan-file edits and memory writes share one lock.
    pub fn lock_path(&self) -> PathBuf {
        let root = self.memory_root();
        match root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join("assistant.lock"),
            _ => PathBuf::from("assistant.lock"),
        }
    }

    /// Heading level clamped to the valid ATX range.
    pub fn heading_level(&self) -> u8 {
        self.tasks.heading_level.clamp(1, 6)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.memory.root, ".assistant/memory");
        assert_eq!(cfg.memory.index_file, "index.json");
        assert_eq!(cfg.memory.entries_dir, "entries");
        assert_eq!(cfg.memory.default_source, "user");
        assert_eq!(cfg.tasks.plan_file, "PLAN.md");
        assert_eq!(cfg.tasks.section_title, "Priority {rank}");
        assert_eq!(cfg.tasks.heading_level, 2);
        assert!(cfg.tasks.log_completions);
        assert_eq!(cfg.telemetry.log_level, "info");
    }

    #[test]
    fn derived_paths() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.index_path(), PathBuf::from(".assistant/memory/index.json"));
        assert_eq!(cfg.entries_root(), PathBuf::from(".assistant/memory/entries"));
        assert_eq!(cfg.lock_path(), PathBuf::from(".assistant/assistant.lock"));
    }

    #[test]
    fn lock_path_for_bare_root() {
        let mut cfg = AppConfig::default();
        cfg.memory.root = "memory".to_string();
        assert_eq!(cfg.lock_path(), PathBuf::from("assistant.lock"));
    }

    #[test]
    fn heading_level_is_clamped() {
        let mut cfg = AppConfig::default();
        cfg.tasks.heading_level = 0;
        assert_eq!(cfg.heading_level(), 1);
        cfg.tasks.heading_level = 9;
        assert_eq!(cfg.heading_level(), 6);
    }

    // ── load_from ──────────────────────────────────────────────────────────

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(cfg.tasks.section_title, "Priority {rank}");
        assert_eq!(cfg.memory.index_file, "index.json");
    }

    #[test]
    fn load_from_valid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.toml");
        fs::write(
            &path,
            r#"
[memory]
index_file = "keys.json"
default_source = "import"

[tasks]
section_title = "P{rank}"
heading_level = 3
log_completions = false

[telemetry]
log_level = "debug"
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.memory.index_file, "keys.json");
        assert_eq!(cfg.memory.default_source, "import");
        assert_eq!(cfg.tasks.section_title, "P{rank}");
        assert_eq!(cfg.tasks.heading_level, 3);
        assert!(!cfg.tasks.log_completions);
        assert_eq!(cfg.telemetry.log_level, "debug");
        // Unspecified fields keep their defaults
        assert_eq!(cfg.memory.entries_dir, "entries");
        assert_eq!(cfg.tasks.completion_source, "agent");
    }

    #[test]
    fn load_from_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    // ── save_to + roundtrip ────────────────────────────────────────────────

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/config.toml");

        let mut cfg = AppConfig::default();
        cfg.memory.entries_dir = "notes".to_string();
        cfg.tasks.section_title = "Sprint {rank}".to_string();
        cfg.save_to(&path).unwrap();
        assert!(path.exists());

        // Fields with env overrides are left alone so the env test can run
        // in parallel.
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.memory.entries_dir, "notes");
        assert_eq!(loaded.tasks.section_title, "Sprint {rank}");
    }

    #[test]
    fn config_serializes_to_json_for_diagnostics() {
        let json = serde_json::to_value(AppConfig::default()).unwrap();
        assert_eq!(json["tasks"]["heading_level"], 2);
        assert_eq!(json["memory"]["root"], ".assistant/memory");
    }

    // ── Env var overrides ──────────────────────────────────────────────────

    #[test]
    fn env_overrides_take_precedence_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.toml");
        fs::write(
            &path,
            r#"
[memory]
root = "from-file"

[tasks]
plan_file = "FILE.md"
"#,
        )
        .unwrap();

        // SAFETY: these variables are only touched by this test.
        unsafe {
            env::set_var("ASSISTANT_MEMORY_ROOT", "from-env");
            env::set_var("ASSISTANT_PLAN_FILE", "ENV.md");
        }
        let cfg = AppConfig::load_from(&path).unwrap();
        unsafe {
            env::remove_var("ASSISTANT_MEMORY_ROOT");
            env::remove_var("ASSISTANT_PLAN_FILE");
        }
        assert_eq!(cfg.memory.root, "from-env");
        assert_eq!(cfg.tasks.plan_file, "ENV.md");
    }
}

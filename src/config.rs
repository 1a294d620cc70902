//! Layered configuration: CLI flags > environment > TOML file > defaults.
//!
//! A missing file at the default location (`<config dir>/yarukoto/config.toml`)
//! is not an error. An explicit `--config` path that cannot be read is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::store::DEFAULT_SLOT;

pub const MAX_VIEWS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    #[error("unknown storage backend {0:?} (expected \"sqlite\" or \"memory\")")]
    UnknownBackend(String),
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "yarukoto: a small task list that stays in sync", long_about = None)]
pub struct CliArgs {
    /// Path to config file (default: <config dir>/yarukoto/config.toml)
    #[arg(short, long, env = "YARUKOTO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Keep tasks in memory only (nothing is written to disk)
    #[arg(long, default_value_t = false)]
    pub memory: bool,

    /// Path to SQLite DB file (default: OS data dir)
    #[arg(long, env = "YARUKOTO_DB")]
    pub db_path: Option<PathBuf>,

    /// Number of side-by-side views over the same store
    #[arg(long)]
    pub views: Option<usize>,

    /// Tick interval of render loop in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, env = "YARUKOTO_LOG")]
    pub log_level: Option<String>,

    /// Log file path (default: <tmp>/yarukoto.log)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    storage: StorageFileConfig,
    ui: UiFileConfig,
    log: LogFileConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    backend: Option<String>,
    db_path: Option<PathBuf>,
    key: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    tick_ms: Option<u64>,
    views: Option<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LogFileConfig {
    level: Option<String>,
    file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Memory,
    /// `None` uses the OS data dir.
    Sqlite(Option<PathBuf>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: Backend,
    /// Slot holding the task collection.
    pub key: String,
    pub tick_rate: Duration,
    pub views: usize,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite(None),
            key: DEFAULT_SLOT.to_string(),
            tick_rate: Duration::from_millis(120),
            views: 1,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend = if cli.memory {
            Backend::Memory
        } else if let Some(path) = cli.db_path.clone() {
            Backend::Sqlite(Some(path))
        } else {
            match file.storage.backend.as_deref() {
                None | Some("sqlite") => Backend::Sqlite(file.storage.db_path.clone()),
                Some("memory") => Backend::Memory,
                Some(other) => return Err(ConfigError::UnknownBackend(other.to_string())),
            }
        };

        Ok(Self {
            backend,
            key: file.storage.key.clone().unwrap_or(defaults.key),
            tick_rate: cli
                .tick_ms
                .or(file.ui.tick_ms)
                .map_or(defaults.tick_rate, Duration::from_millis),
            views: cli
                .views
                .or(file.ui.views)
                .unwrap_or(defaults.views)
                .clamp(1, MAX_VIEWS),
            log_level: cli
                .log_level
                .clone()
                .or_else(|| file.log.level.clone())
                .unwrap_or(defaults.log_level),
            log_file: cli.log_file.clone().or_else(|| file.log.file.clone()),
        })
    }
}

fn load_config_file(explicit: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(ConfigFile::default()),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(raw) => Ok(toml::from_str(&raw)?),
        Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => {
            Ok(ConfigFile::default())
        }
        Err(source) => Err(ConfigError::ReadFile { path, source }),
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("yarukoto").join("config.toml"))
}

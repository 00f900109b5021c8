//! Service configuration: defaults, an optional JSON file, then environment.

mod error;

pub use error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATABASE: &str = "TRANSFER_QUEUE_DB";
pub const ENV_API_ADDR: &str = "TRANSFER_QUEUE_API_ADDR";
pub const ENV_INTERVAL_SECS: &str = "TRANSFER_QUEUE_INTERVAL_SECS";
pub const ENV_GRID_ROOT: &str = "TRANSFER_QUEUE_GRID_ROOT";
pub const ENV_START_PAUSED: &str = "TRANSFER_QUEUE_START_PAUSED";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// sqlx sqlite URL of the queue database
    pub database_url: String,
    /// Seconds between scheduler ticks
    pub scheduler_interval_secs: u64,
    pub api_addr: SocketAddr,
    pub metrics_enabled: bool,
    /// Root directory the local executor treats as the grid
    pub grid_root: PathBuf,
    pub start_paused: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            database_url: format!("sqlite://{}", data_dir.join("queue.db").display()),
            scheduler_interval_secs: 30,
            api_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            metrics_enabled: true,
            grid_root: data_dir.join("grid"),
            start_paused: false,
        }
    }
}

impl QueueConfig {
    /// Load from `path` (if given) and the process environment
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        tracing::info!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply overrides from `lookup`, keyed by the `ENV_*` names
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE) {
            self.database_url = url;
        }
        if let Some(addr) = lookup(ENV_API_ADDR) {
            self.api_addr = addr.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_API_ADDR,
                value: addr.clone(),
            })?;
        }
        if let Some(secs) = lookup(ENV_INTERVAL_SECS) {
            self.scheduler_interval_secs =
                secs.parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_INTERVAL_SECS,
                    value: secs.clone(),
                })?;
        }
        if let Some(root) = lookup(ENV_GRID_ROOT) {
            self.grid_root = PathBuf::from(root);
        }
        if let Some(flag) = lookup(ENV_START_PAUSED) {
            self.start_paused = parse_flag(&flag).ok_or(ConfigError::InvalidValue {
                key: ENV_START_PAUSED,
                value: flag.clone(),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheduler_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler_interval_secs",
                value: "0".to_string(),
            });
        }
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "database_url",
                value: String::new(),
            });
        }
        Ok(())
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }

    /// Create the grid root and the database's parent directory
    pub fn prepare_dirs(&self) -> ConfigResult<()> {
        fs::create_dir_all(&self.grid_root)?;
        if let Some(parent) = database_file(&self.database_url).and_then(|p| p.parent()) {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "transfer-queue", "transfer-queue")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn database_file(url: &str) -> Option<&Path> {
    let rest = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next()?;
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(Path::new(path))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

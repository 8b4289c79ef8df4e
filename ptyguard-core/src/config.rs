//! Configuration management (TOML)

use crate::classifier::Thresholds;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub thresholds: Thresholds,
    pub system: SystemConfig,
    pub paths: PathsConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Substring matched against the full command line.
    pub pattern: String,
    /// Resident command names that share the pattern but are never leak sources.
    pub exclude_names: Vec<String>,
    /// Suffix of an open-handle target that marks a PTY master.
    pub handle_marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub pty_max_path: PathBuf,
    pub pts_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_file: PathBuf,
    pub state_file: PathBuf,
    pub lock_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub desktop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messenger_command: Option<String>,
    pub messenger_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            pattern: "claude".to_string(),
            exclude_names: vec!["Claude".to_string()],
            handle_marker: "ptmx".to_string(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            pty_max_path: PathBuf::from("/proc/sys/kernel/pty/max"),
            pts_dir: PathBuf::from("/dev/pts"),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let dir = Config::data_dir();
        PathsConfig {
            log_file: dir.join("ptyguard.log"),
            state_file: dir.join("last_alert"),
            lock_file: dir.join("ptyguard.lock"),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig {
            desktop: true,
            messenger_command: Some("telegram-send".to_string()),
            messenger_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::Config)
    }

    /// Loads `path` if it exists, falling back to defaults when it is missing
    /// or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Config::default();
        }
        Config::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    }

    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "ptyguard")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "ptyguard")
            .map(|dirs| dirs.data_local_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("ptyguard"))
    }
}

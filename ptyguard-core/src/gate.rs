//! Alert deduplication: a cooldown guard over a single persisted timestamp.

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const COOLDOWN_SECS: i64 = 1800;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertState {
    pub last_alert: Option<i64>,
}

impl AlertState {
    pub fn at(epoch_secs: i64) -> Self {
        Self {
            last_alert: Some(epoch_secs),
        }
    }
}

pub trait Clock {
    /// Seconds since the Unix epoch.
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertGate {
    pub cooldown_secs: i64,
}

impl Default for AlertGate {
    fn default() -> Self {
        Self {
            cooldown_secs: COOLDOWN_SECS,
        }
    }
}

impl AlertGate {
    pub fn should_alert(&self, state: &AlertState, now: i64, force: bool) -> bool {
        if force {
            return true;
        }
        match state.last_alert {
            None => true,
            // A timestamp from the future means the clock went backwards
            Some(last) if last > now => true,
            Some(last) => now - last >= self.cooldown_secs,
        }
    }

    /// Seconds until the next alert may fire, zero if it may fire now.
    pub fn remaining(&self, state: &AlertState, now: i64) -> i64 {
        match state.last_alert {
            Some(last) if last <= now => (self.cooldown_secs - (now - last)).max(0),
            _ => 0,
        }
    }

    pub fn record(&self, now: i64) -> AlertState {
        AlertState::at(now)
    }
}

pub trait StateStore {
    fn load(&self) -> Result<AlertState>;
    fn save(&self, state: &AlertState) -> Result<()>;
}

/// Single integer (epoch seconds) in a well-known file.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<AlertState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AlertState::default()),
            Err(e) => return Err(Error::io(&self.path, e)),
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(AlertState::default());
        }
        trimmed
            .parse::<i64>()
            .map(AlertState::at)
            .map_err(|_| Error::StateParse {
                path: self.path.clone(),
                content: trimmed.to_string(),
            })
    }

    fn save(&self, state: &AlertState) -> Result<()> {
        let Some(last) = state.last_alert else {
            return Ok(());
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(&self.path, format!("{}\n", last)).map_err(|e| Error::io(&self.path, e))
    }
}

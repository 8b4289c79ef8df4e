use std::path::PathBuf;
use thiserror::Error;

/// Underlying OS errors are folded into the message rather than chained, so
/// `{:#}` chains print each reason once.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read PTY capacity from {path}: {reason}")]
    Capacity { path: PathBuf, reason: String },

    #[error("failed to enumerate processes: {0}")]
    Enumerate(String),

    #[error("invalid alert state in {path}: {content:?}")]
    StateParse { path: PathBuf, content: String },

    #[error("failed to signal PID {pid}: {errno}")]
    Signal { pid: u32, errno: nix::Error },

    #[error("notifier {notifier} failed: {reason}")]
    Notify { notifier: String, reason: String },

    #[error("invalid config: {0}")]
    Config(toml::de::Error),

    #[error("{path}: {error}")]
    Io { path: PathBuf, error: std::io::Error },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            error,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

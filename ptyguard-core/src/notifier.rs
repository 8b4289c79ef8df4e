//! Best-effort notification sinks

use crate::config::NotifyConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use notify_rust::Notification;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// The sink is not available on this host; not an error.
    Skipped(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    async fn notify(&self, title: &str, body: &str) -> Result<NotifyOutcome>;
}

/// Desktop notification through the session's notification daemon.
pub struct DesktopNotifier {
    timeout: Duration,
}

impl DesktopNotifier {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    fn name(&self) -> &str {
        "desktop"
    }

    async fn notify(&self, title: &str, body: &str) -> Result<NotifyOutcome> {
        let title = title.to_string();
        let body = body.to_string();
        let send = tokio::task::spawn_blocking(move || {
            Notification::new()
                .summary(&title)
                .body(&body)
                .appname("ptyguard")
                .show()
                .map(|_| ())
                .map_err(|e| e.to_string())
        });

        match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(Ok(()))) => Ok(NotifyOutcome::Delivered),
            Ok(Ok(Err(reason))) => Err(self.failure(reason)),
            Ok(Err(e)) => Err(self.failure(e.to_string())),
            Err(_) => Err(self.failure(format!("timed out after {:?}", self.timeout))),
        }
    }
}

impl DesktopNotifier {
    fn failure(&self, reason: String) -> Error {
        Error::Notify {
            notifier: self.name().to_string(),
            reason,
        }
    }
}

/// External messenger command, run with the composed message as its only
/// argument.
pub struct CommandNotifier {
    program: String,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn resolve(&self) -> Option<PathBuf> {
        which::which(&self.program).ok()
    }

    fn failure(&self, reason: String) -> Error {
        Error::Notify {
            notifier: self.program.clone(),
            reason,
        }
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    fn name(&self) -> &str {
        &self.program
    }

    async fn notify(&self, title: &str, body: &str) -> Result<NotifyOutcome> {
        let Some(program) = self.resolve() else {
            return Ok(NotifyOutcome::Skipped(format!("{} not found on PATH", self.program)));
        };

        let message = format!("{}\n{}", title, body);
        let output = Command::new(&program)
            .arg(message)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(self.failure(e.to_string())),
            Err(_) => return Err(self.failure(format!("timed out after {:?}", self.timeout))),
        };

        if !output.status.success() {
            return Err(self.failure(format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(NotifyOutcome::Delivered)
    }
}

/// Builds the configured sinks. An empty messenger command disables it.
pub fn from_config(config: &NotifyConfig) -> Vec<Box<dyn Notifier>> {
    let timeout = Duration::from_secs(config.messenger_timeout_secs.max(1));
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    if config.desktop {
        notifiers.push(Box::new(DesktopNotifier::new(timeout)));
    }
    if let Some(command) = config.messenger_command.as_deref() {
        if !command.trim().is_empty() {
            notifiers.push(Box::new(CommandNotifier::new(command.trim(), timeout)));
        }
    }
    notifiers
}

/// Sends through every notifier; one failing never stops the others.
pub async fn dispatch_all(
    notifiers: &[Box<dyn Notifier>],
    title: &str,
    body: &str,
) -> Vec<(String, Result<NotifyOutcome>)> {
    let mut outcomes = Vec::with_capacity(notifiers.len());
    for notifier in notifiers {
        let outcome = notifier.notify(title, body).await;
        match &outcome {
            Ok(NotifyOutcome::Delivered) => debug!("{}: delivered", notifier.name()),
            Ok(NotifyOutcome::Skipped(reason)) => debug!("{}: skipped ({})", notifier.name(), reason),
            Err(e) => warn!("{}", e),
        }
        outcomes.push((notifier.name().to_string(), outcome));
    }
    outcomes
}

use serde::{Deserialize, Serialize};

/// Terminal label used when a process has no controlling terminal.
pub const DETACHED_TTY: &str = "none";

/// Label used when a process's working directory cannot be resolved.
pub const UNKNOWN_PROJECT: &str = "?";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub pid: u32,
    pub tty: Option<String>,
    pub cpu_percent: f32,
    pub parent_pid: u32,
    pub handle_count: u32,
    pub project: String,
}

impl ProcessSample {
    pub fn new(pid: u32, parent_pid: u32) -> Self {
        Self {
            pid,
            tty: None,
            cpu_percent: 0.0,
            parent_pid,
            handle_count: 0,
            project: UNKNOWN_PROJECT.to_string(),
        }
    }

    pub fn with_tty(mut self, tty: impl Into<String>) -> Self {
        self.tty = Some(tty.into());
        self
    }

    pub fn with_handles(mut self, handle_count: u32) -> Self {
        self.handle_count = handle_count;
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn tty_label(&self) -> &str {
        self.tty.as_deref().unwrap_or(DETACHED_TTY)
    }

    pub fn is_detached(&self) -> bool {
        self.tty.is_none()
    }

    /// Reparented to init and without a controlling terminal.
    pub fn is_orphan(&self) -> bool {
        self.parent_pid == 1 && self.is_detached()
    }
}

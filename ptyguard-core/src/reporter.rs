use crate::capacity::ResourceCapacity;
use crate::classifier::{assess, is_leaking, AlertLevel, RestartRecommendation, Thresholds};
use crate::error::{Error, Result};
use crate::process::ProcessSample;
use crate::run::RunReport;
use chrono::{Local, TimeZone};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DRY_RUN_PREFIX: &str = "DRY-RUN";

/// Inspect-mode view: every sampled process in sampling order, with flags.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub capacity: ResourceCapacity,
    pub usage_percent: u64,
    pub free: u64,
    pub processes: Vec<StatusRow>,
    pub recommendation: Option<RestartRecommendation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusRow {
    #[serde(flatten)]
    pub sample: ProcessSample,
    pub flags: Vec<&'static str>,
}

impl StatusReport {
    pub fn new(capacity: ResourceCapacity, samples: &[ProcessSample], thresholds: &Thresholds) -> Self {
        let processes = samples
            .iter()
            .map(|sample| StatusRow {
                sample: sample.clone(),
                flags: flags(sample, thresholds),
            })
            .collect();

        // Only present at or above the usage threshold
        let recommendation = assess(capacity, samples, thresholds).recommendation;

        Self {
            capacity,
            usage_percent: capacity.usage_percent(),
            free: capacity.free(),
            processes,
            recommendation,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "PTY usage: {}/{} ({}%), {} free",
            self.capacity.used, self.capacity.max, self.usage_percent, self.free
        );

        if self.processes.is_empty() {
            let _ = writeln!(out, "No matching processes found.");
            return out;
        }

        let _ = writeln!(
            out,
            "{:<8} {:<10} {:>6} {:>8}  {}",
            "PID", "TTY", "CPU%", "PTY FDs", "Project"
        );
        for row in &self.processes {
            let sample = &row.sample;
            let mut line = format!(
                "{:<8} {:<10} {:>6.1} {:>8}  {}",
                sample.pid,
                sample.tty_label(),
                sample.cpu_percent,
                sample.handle_count,
                sample.project
            );
            for flag in &row.flags {
                line.push_str("  ");
                line.push_str(flag);
            }
            let _ = writeln!(out, "{}", line);
        }

        if let Some(recommendation) = &self.recommendation {
            let _ = writeln!(out, "\n{}", recommendation);
        }
        out
    }
}

fn flags(sample: &ProcessSample, thresholds: &Thresholds) -> Vec<&'static str> {
    let mut flags = Vec::new();
    if sample.is_orphan() {
        flags.push("ZOMBIE");
    }
    if is_leaking(sample, thresholds) {
        flags.push("LEAK!");
    }
    flags
}

pub fn render_status(capacity: ResourceCapacity, samples: &[ProcessSample], thresholds: &Thresholds) -> String {
    StatusReport::new(capacity, samples, thresholds).render()
}

/// One line per run for the audit log.
pub fn summary_line(report: &RunReport) -> String {
    let alert = if report.dispatched {
        format!("sent ({})", report.assessment.level)
    } else if report.suppressed {
        format!("suppressed ({}s cooldown left)", report.cooldown_remaining)
    } else if report.dry_run && report.assessment.level != AlertLevel::None {
        "would send".to_string()
    } else {
        AlertLevel::None.to_string()
    };

    let line = format!(
        "check: pty {} procs={} killed={} failed={} alert={}",
        report.assessment.capacity,
        report.sampled,
        report.killed.len(),
        report.kill_failures.len(),
        alert
    );
    if report.dry_run {
        format!("{} {}", DRY_RUN_PREFIX, line)
    } else {
        line
    }
}

/// Append-only, timestamp-prefixed log file. Writes are best-effort.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_append(&self, epoch_secs: i64, message: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))?;

        let mut entry = String::new();
        for line in message.lines() {
            let _ = writeln!(entry, "{} {}", timestamp(epoch_secs), line);
        }
        file.write_all(entry.as_bytes())
            .map_err(|e| Error::io(&self.path, e))
    }

    pub fn append(&self, epoch_secs: i64, message: &str) {
        if let Err(e) = self.try_append(epoch_secs, message) {
            warn!("audit log write failed: {}", e);
        }
    }
}

fn timestamp(epoch_secs: i64) -> String {
    Local
        .timestamp_opt(epoch_secs, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_secs.to_string())
}

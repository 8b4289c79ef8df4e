use crate::capacity::ResourceCapacity;
use crate::process::ProcessSample;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// A process holding more PTY handles than this is flagged as leaking.
    pub leak_handles: u32,
    /// System usage at or above this percentage raises an alert.
    pub usage_percent: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            leak_handles: 150,
            usage_percent: 80,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    None,
    Usage,
    Leak,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertLevel::None => "none",
            AlertLevel::Usage => "usage",
            AlertLevel::Leak => "leak",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartRecommendation {
    pub pid: u32,
    pub tty: String,
    pub project: String,
    /// Each leaked master handle pins one slot.
    pub slots_freed: u32,
}

impl RestartRecommendation {
    pub fn for_process(sample: &ProcessSample) -> Self {
        Self {
            pid: sample.pid,
            tty: sample.tty_label().to_string(),
            project: sample.project.clone(),
            slots_freed: sample.handle_count,
        }
    }
}

impl fmt::Display for RestartRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Restart PID {} ({}, {}) to free ~{} PTY slots",
            self.pid, self.tty, self.project, self.slots_freed
        )
    }
}

/// Alert-side evaluation of one sample (levels 2 and 3).
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub capacity: ResourceCapacity,
    pub level: AlertLevel,
    /// All processes, highest handle count first. Ties keep sampling order.
    pub ranked: Vec<ProcessSample>,
    /// Pids above the leak threshold, in ranked order.
    pub leaking: Vec<u32>,
    pub recommendation: Option<RestartRecommendation>,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub to_kill: Vec<ProcessSample>,
    pub alert_level: AlertLevel,
    pub alert_message: String,
}

pub fn is_leaking(sample: &ProcessSample, thresholds: &Thresholds) -> bool {
    sample.handle_count > thresholds.leak_handles
}

/// Level 1: orphaned, terminal-less processes.
pub fn orphans(samples: &[ProcessSample]) -> Vec<ProcessSample> {
    samples.iter().filter(|s| s.is_orphan()).cloned().collect()
}

pub fn rank_by_handles(samples: &[ProcessSample]) -> Vec<ProcessSample> {
    let mut ranked = samples.to_vec();
    ranked.sort_by(|a, b| b.handle_count.cmp(&a.handle_count));
    ranked
}

pub fn assess(
    capacity: ResourceCapacity,
    samples: &[ProcessSample],
    thresholds: &Thresholds,
) -> Assessment {
    let ranked = rank_by_handles(samples);
    let leaking: Vec<u32> = ranked
        .iter()
        .filter(|s| is_leaking(s, thresholds))
        .map(|s| s.pid)
        .collect();

    let level = if capacity.usage_percent() < thresholds.usage_percent {
        AlertLevel::None
    } else if leaking.is_empty() {
        AlertLevel::Usage
    } else {
        AlertLevel::Leak
    };

    let recommendation = if level == AlertLevel::None {
        None
    } else {
        ranked.first().map(RestartRecommendation::for_process)
    };

    let title = format!("PTY usage {}%", capacity.usage_percent());
    let message = alert_message(&capacity, &ranked, recommendation.as_ref(), thresholds);

    Assessment {
        capacity,
        level,
        ranked,
        leaking,
        recommendation,
        title,
        message,
    }
}

fn alert_message(
    capacity: &ResourceCapacity,
    ranked: &[ProcessSample],
    recommendation: Option<&RestartRecommendation>,
    thresholds: &Thresholds,
) -> String {
    let mut lines = vec![format!(
        "PTY slots {}/{} used ({}%), {} free",
        capacity.used,
        capacity.max,
        capacity.usage_percent(),
        capacity.free()
    )];

    for sample in ranked {
        let flag = if is_leaking(sample, thresholds) { " LEAK!" } else { "" };
        lines.push(format!(
            "PID {} {} {} handles [{}]{}",
            sample.pid,
            sample.tty_label(),
            sample.handle_count,
            sample.project,
            flag
        ));
    }

    if let Some(recommendation) = recommendation {
        lines.push(recommendation.to_string());
    }

    lines.join("\n")
}

impl Decision {
    /// Combines remediation targets with the alert evaluation. A suppressed
    /// alert leaves the decision at `AlertLevel::None`.
    pub fn new(to_kill: Vec<ProcessSample>, assessment: &Assessment, alert_allowed: bool) -> Self {
        let alert_level = if alert_allowed {
            assessment.level
        } else {
            AlertLevel::None
        };
        let alert_message = if alert_level == AlertLevel::None {
            String::new()
        } else {
            assessment.message.clone()
        };
        Self {
            to_kill,
            alert_level,
            alert_message,
        }
    }
}

use crate::capacity::ResourceCapacity;
use crate::config::{SystemConfig, TargetConfig};
use crate::error::{Error, Result};
use crate::process::{ProcessSample, UNKNOWN_PROJECT};
use parking_lot::RwLock;
use procfs::process::{FDTarget, Process as ProcProcess};
use procfs::ProcError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

/// Read-only view of PTY capacity and the processes that may be leaking it.
pub trait Sampler {
    fn capacity(&self) -> Result<ResourceCapacity>;
    fn processes(&self) -> Result<Vec<ProcessSample>>;
}

/// Samples the live system through sysinfo and `/proc`.
pub struct SystemSampler {
    system: RwLock<System>,
    target: TargetConfig,
    paths: SystemConfig,
}

struct Candidate {
    pid: u32,
    parent_pid: u32,
    cpu_percent: f32,
}

impl SystemSampler {
    pub fn new(target: TargetConfig, paths: SystemConfig) -> Self {
        Self {
            system: RwLock::new(System::new()),
            target,
            paths,
        }
    }

    pub fn refresh(&self) {
        let mut system = self.system.write();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
    }

    fn candidates(&self) -> Vec<Candidate> {
        // CPU usage is a delta between two refreshes
        self.refresh();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.refresh();

        // sysinfo also reports threads; only pids listed in /proc are processes
        let real_pids: HashSet<u32> = fs::read_dir("/proc")
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
                    .collect()
            })
            .unwrap_or_default();

        let system = self.system.read();
        let own_pid = std::process::id();
        let mut candidates: Vec<Candidate> = system
            .processes()
            .iter()
            .filter(|(pid, _)| real_pids.contains(&pid.as_u32()) && pid.as_u32() != own_pid)
            .filter(|(_, process)| {
                let name = process.name().to_string_lossy();
                let cmdline = process
                    .cmd()
                    .iter()
                    .map(|s| s.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                matches_target(&self.target, &name, &cmdline)
            })
            .map(|(pid, process)| Candidate {
                pid: pid.as_u32(),
                parent_pid: process.parent().map(Pid::as_u32).unwrap_or(0),
                cpu_percent: process.cpu_usage(),
            })
            .collect();

        candidates.sort_by_key(|c| c.pid);
        candidates
    }

    /// Fills in terminal, handle count and project for one candidate.
    /// Returns `None` if the process exited since it was listed.
    fn inspect(&self, candidate: &Candidate) -> Option<ProcessSample> {
        let process = match ProcProcess::new(candidate.pid as i32) {
            Ok(process) => process,
            Err(ProcError::NotFound(_)) => return None,
            Err(e) => {
                debug!("PID {}: cannot open /proc entry: {}", candidate.pid, e);
                return None;
            }
        };

        let mut sample = ProcessSample::new(candidate.pid, candidate.parent_pid);
        sample.cpu_percent = candidate.cpu_percent;

        match process.stat() {
            Ok(stat) => {
                let (major, minor) = stat.tty_nr();
                sample.tty = tty_name(major, minor);
            }
            Err(ProcError::NotFound(_)) => return None,
            Err(e) => debug!("PID {}: stat unavailable: {}", candidate.pid, e),
        }

        match process.fd() {
            Ok(fds) => {
                let marker = self.target.handle_marker.as_str();
                let count = fds
                    .flatten()
                    .filter(|fd| matches!(&fd.target, FDTarget::Path(path) if is_marked_handle(path, marker)))
                    .count();
                sample.handle_count = count as u32;
            }
            Err(ProcError::NotFound(_)) => return None,
            Err(e) => debug!("PID {}: fd table unavailable: {}", candidate.pid, e),
        }

        sample.project = process
            .cwd()
            .map(|cwd| project_label(&cwd))
            .unwrap_or_else(|_| UNKNOWN_PROJECT.to_string());

        Some(sample)
    }
}

impl Sampler for SystemSampler {
    fn capacity(&self) -> Result<ResourceCapacity> {
        let max = read_pty_max(&self.paths.pty_max_path)?;
        let used = count_pts_entries(&self.paths.pts_dir)?;
        Ok(ResourceCapacity::new(max, used))
    }

    fn processes(&self) -> Result<Vec<ProcessSample>> {
        if !Path::new("/proc").is_dir() {
            return Err(Error::Enumerate("/proc is not mounted".to_string()));
        }

        let candidates = self.candidates();
        let samples: Vec<ProcessSample> = candidates
            .iter()
            .filter_map(|candidate| self.inspect(candidate))
            .collect();

        debug!(
            "matched {} processes, {} still alive after inspection",
            candidates.len(),
            samples.len()
        );
        Ok(samples)
    }
}

pub fn matches_target(target: &TargetConfig, name: &str, cmdline: &str) -> bool {
    if target.exclude_names.iter().any(|excluded| excluded == name) {
        return false;
    }
    cmdline.contains(&target.pattern) || name.contains(&target.pattern)
}

pub fn is_marked_handle(path: &Path, marker: &str) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy() == marker)
        .unwrap_or(false)
}

/// Maps a `tty_nr` device number to a terminal name.
pub fn tty_name(major: i32, minor: i32) -> Option<String> {
    match (major, minor) {
        (0, 0) => None,
        // Unix98 pseudo-terminals span majors 136..=143
        (136..=143, _) => Some(format!("pts/{}", (major - 136) * 256 + minor)),
        (4, 0..=63) => Some(format!("tty{}", minor)),
        (4, _) => Some(format!("ttyS{}", minor - 64)),
        _ => Some(format!("{}:{}", major, minor)),
    }
}

pub fn project_label(cwd: &Path) -> String {
    cwd.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_PROJECT.to_string())
}

pub fn read_pty_max(path: &Path) -> Result<u64> {
    let content = fs::read_to_string(path).map_err(|e| Error::Capacity {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    content.trim().parse::<u64>().map_err(|e| Error::Capacity {
        path: path.to_path_buf(),
        reason: format!("{:?} is not a number: {}", content.trim(), e),
    })
}

/// Counts allocated slots: every numeric entry in the pts directory.
pub fn count_pts_entries(dir: &Path) -> Result<u64> {
    let entries = fs::read_dir(dir).map_err(|e| Error::Capacity {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let count = entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.parse::<u32>().is_ok())
                .unwrap_or(false)
        })
        .count();
    Ok(count as u64)
}

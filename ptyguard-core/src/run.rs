use crate::classifier::{assess, orphans, AlertLevel, Assessment, Decision, Thresholds};
use crate::error::Result;
use crate::gate::{AlertGate, AlertState, Clock, StateStore};
use crate::notifier::{dispatch_all, Notifier, NotifyOutcome};
use crate::process::ProcessSample;
use crate::reporter::{summary_line, AuditLog, StatusReport, DRY_RUN_PREFIX};
use crate::sampler::Sampler;
use crate::terminator::Terminator;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Log intended actions instead of performing them.
    pub dry_run: bool,
    /// Ignore the cooldown for this run.
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub dry_run: bool,
    /// Processes matched by the first sample.
    pub sampled: usize,
    pub decision: Decision,
    /// Post-remediation evaluation.
    pub assessment: Assessment,
    pub killed: Vec<u32>,
    pub kill_failures: Vec<(u32, String)>,
    pub dispatched: bool,
    pub suppressed: bool,
    pub cooldown_remaining: i64,
    pub state_updated: bool,
}

pub struct Monitor {
    sampler: Box<dyn Sampler>,
    terminator: Box<dyn Terminator>,
    store: Box<dyn StateStore>,
    notifiers: Vec<Box<dyn Notifier>>,
    clock: Box<dyn Clock>,
    audit: AuditLog,
    thresholds: Thresholds,
    gate: AlertGate,
}

impl Monitor {
    pub fn new(
        sampler: Box<dyn Sampler>,
        terminator: Box<dyn Terminator>,
        store: Box<dyn StateStore>,
        notifiers: Vec<Box<dyn Notifier>>,
        clock: Box<dyn Clock>,
        audit: AuditLog,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            sampler,
            terminator,
            store,
            notifiers,
            clock,
            audit,
            thresholds,
            gate: AlertGate::default(),
        }
    }

    pub fn with_gate(mut self, gate: AlertGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Read-only inspection. Touches neither processes nor state files.
    pub fn status(&self) -> Result<StatusReport> {
        let capacity = self.sampler.capacity()?;
        let samples = self.sampler.processes()?;
        Ok(StatusReport::new(capacity, &samples, &self.thresholds))
    }

    /// One full pass: remediate orphans, re-sample, then alert through the
    /// cooldown gate.
    pub async fn run_once(&self, options: RunOptions) -> Result<RunReport> {
        let now = self.clock.now();

        let capacity = self.sampler.capacity()?;
        let samples = self.sampler.processes()?;
        debug!("initial sample: pty {}, {} processes", capacity, samples.len());

        // Level 1
        let to_kill = orphans(&samples);
        let (killed, kill_failures) = self.remediate(&to_kill, options.dry_run, now);

        // Signaled processes are on their way out and are left out of the
        // alert breakdown, whether or not they have exited yet.
        let (capacity, remaining) = if to_kill.is_empty() {
            (capacity, samples.clone())
        } else {
            let capacity = self.sampler.capacity()?;
            let remaining: Vec<ProcessSample> = self
                .sampler
                .processes()?
                .into_iter()
                .filter(|s| !to_kill.iter().any(|k| k.pid == s.pid))
                .collect();
            (capacity, remaining)
        };

        // Levels 2 and 3
        let assessment = assess(capacity, &remaining, &self.thresholds);
        if !assessment.leaking.is_empty() {
            info!(
                "{} processes above {} PTY handles: {:?}",
                assessment.leaking.len(),
                self.thresholds.leak_handles,
                assessment.leaking
            );
        }

        let mut report = RunReport {
            dry_run: options.dry_run,
            sampled: samples.len(),
            decision: Decision::new(to_kill, &assessment, false),
            assessment,
            killed,
            kill_failures,
            dispatched: false,
            suppressed: false,
            cooldown_remaining: 0,
            state_updated: false,
        };

        if report.assessment.level != AlertLevel::None {
            self.alert(&mut report, options, now).await;
        }

        self.audit.append(now, &summary_line(&report));
        Ok(report)
    }

    fn remediate(
        &self,
        to_kill: &[ProcessSample],
        dry_run: bool,
        now: i64,
    ) -> (Vec<u32>, Vec<(u32, String)>) {
        let mut killed = Vec::new();
        let mut failures = Vec::new();

        for sample in to_kill {
            let what = format!(
                "orphan PID {} ({} PTY handles, {})",
                sample.pid, sample.handle_count, sample.project
            );
            if dry_run {
                info!("dry run: would kill {}", what);
                self.audit.append(now, &format!("{} would kill {}", DRY_RUN_PREFIX, what));
                continue;
            }

            match self.terminator.terminate(sample.pid) {
                Ok(()) => {
                    info!("sent SIGTERM to {}", what);
                    self.audit.append(now, &format!("killed {}", what));
                    killed.push(sample.pid);
                }
                Err(e) => {
                    warn!("could not terminate {}: {}", what, e);
                    self.audit.append(now, &format!("kill failed for {}: {}", what, e));
                    failures.push((sample.pid, e.to_string()));
                }
            }
        }

        (killed, failures)
    }

    async fn alert(&self, report: &mut RunReport, options: RunOptions, now: i64) {
        // Forced runs do not consult the stored timestamp
        let state = if options.force {
            AlertState::default()
        } else {
            self.store.load().unwrap_or_else(|e| {
                warn!("treating alert state as empty: {}", e);
                AlertState::default()
            })
        };

        if !self.gate.should_alert(&state, now, options.force) {
            report.suppressed = true;
            report.cooldown_remaining = self.gate.remaining(&state, now);
            debug!(
                "alert suppressed, {}s of cooldown left",
                report.cooldown_remaining
            );
            return;
        }

        let assessment = &report.assessment;
        report.decision = Decision::new(report.decision.to_kill.clone(), assessment, true);

        if options.dry_run {
            info!("dry run: would notify: {}", assessment.title);
            self.audit.append(
                now,
                &format!("{} would notify: {}\n{}", DRY_RUN_PREFIX, assessment.title, assessment.message),
            );
            return;
        }

        let outcomes = dispatch_all(&self.notifiers, &assessment.title, &assessment.message).await;
        let delivered: Vec<String> = outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, Ok(NotifyOutcome::Delivered)))
            .map(|(name, _)| name.clone())
            .collect();
        info!("alert dispatched ({}), delivered via {:?}", assessment.level, delivered);
        self.audit.append(
            now,
            &format!("alert {}: {}\n{}", assessment.level, assessment.title, assessment.message),
        );
        for (name, outcome) in &outcomes {
            if let Err(e) = outcome {
                self.audit.append(now, &format!("notify via {} failed: {}", name, e));
            }
        }
        report.dispatched = true;

        // Marked with the time the sinks returned, even when every sink failed
        match self.store.save(&self.gate.record(self.clock.now())) {
            Ok(()) => report.state_updated = true,
            Err(e) => {
                warn!("could not persist alert timestamp: {}", e);
                self.audit.append(now, &format!("state write failed: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::capacity::ResourceCapacity;
    use crate::classifier::AlertLevel;
    use crate::config::{SystemConfig, TargetConfig};
    use crate::error::{Error, Result};
    use crate::gate::{AlertState, Clock, FileStateStore, StateStore};
    use crate::notifier::{Notifier, NotifyOutcome};
    use crate::process::ProcessSample;
    use crate::reporter::AuditLog;
    use crate::run::{Monitor, RunOptions};
    use crate::sampler::{Sampler, SystemSampler};
    use crate::terminator::Terminator;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    const NOW: i64 = 1_760_000_000;

    /// Clock pinned to a settable instant.
    #[derive(Clone, Default)]
    struct ManualClock(Arc<Mutex<i64>>);

    impl ManualClock {
        fn new(now: i64) -> Self {
            Self(Arc::new(Mutex::new(now)))
        }

        fn advance(&self, secs: i64) {
            *self.0.lock() += secs;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> i64 {
            *self.0.lock()
        }
    }

    /// In-memory store; clones share the same state.
    #[derive(Clone, Default)]
    struct MemoryStateStore(Arc<Mutex<AlertState>>);

    impl MemoryStateStore {
        fn new(state: AlertState) -> Self {
            Self(Arc::new(Mutex::new(state)))
        }

        fn get(&self) -> AlertState {
            *self.0.lock()
        }
    }

    impl StateStore for MemoryStateStore {
        fn load(&self) -> Result<AlertState> {
            Ok(self.get())
        }

        fn save(&self, state: &AlertState) -> Result<()> {
            *self.0.lock() = *state;
            Ok(())
        }
    }

    /// Replays snapshots in order; the last one repeats.
    struct ScriptedSampler {
        snapshots: Mutex<Vec<(ResourceCapacity, Vec<ProcessSample>)>>,
    }

    impl ScriptedSampler {
        fn new(snapshots: Vec<(ResourceCapacity, Vec<ProcessSample>)>) -> Self {
            Self {
                snapshots: Mutex::new(snapshots),
            }
        }
    }

    impl Sampler for ScriptedSampler {
        fn capacity(&self) -> Result<ResourceCapacity> {
            Ok(self.snapshots.lock()[0].0)
        }

        fn processes(&self) -> Result<Vec<ProcessSample>> {
            let mut snapshots = self.snapshots.lock();
            if snapshots.len() > 1 {
                Ok(snapshots.remove(0).1)
            } else {
                Ok(snapshots[0].1.clone())
            }
        }
    }

    struct BrokenSampler;

    impl Sampler for BrokenSampler {
        fn capacity(&self) -> Result<ResourceCapacity> {
            Err(Error::Capacity {
                path: "/proc/sys/kernel/pty/max".into(),
                reason: "permission denied".to_string(),
            })
        }

        fn processes(&self) -> Result<Vec<ProcessSample>> {
            Ok(vec![])
        }
    }

    #[derive(Clone, Default)]
    struct RecordingTerminator {
        signaled: Arc<Mutex<Vec<u32>>>,
        refuse: Vec<u32>,
    }

    impl Terminator for RecordingTerminator {
        fn terminate(&self, pid: u32) -> Result<()> {
            self.signaled.lock().push(pid);
            if self.refuse.contains(&pid) {
                return Err(Error::Signal {
                    pid,
                    errno: nix::Error::EPERM,
                });
            }
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn notify(&self, title: &str, body: &str) -> Result<NotifyOutcome> {
            self.sent.lock().push((title.to_string(), body.to_string()));
            Ok(NotifyOutcome::Delivered)
        }
    }

    /// Takes a while to deliver.
    struct SlowNotifier {
        clock: ManualClock,
        delay_secs: i64,
    }

    #[async_trait]
    impl Notifier for SlowNotifier {
        fn name(&self) -> &str {
            "slow"
        }

        async fn notify(&self, _title: &str, _body: &str) -> Result<NotifyOutcome> {
            self.clock.advance(self.delay_secs);
            Ok(NotifyOutcome::Delivered)
        }
    }

    struct UnreadableStore;

    impl StateStore for UnreadableStore {
        fn load(&self) -> Result<AlertState> {
            Err(Error::StateParse {
                path: "last_alert".into(),
                content: "garbage".to_string(),
            })
        }

        fn save(&self, _state: &AlertState) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        monitor: Monitor,
        signaled: Arc<Mutex<Vec<u32>>>,
        sent: Arc<Mutex<Vec<(String, String)>>>,
        clock: ManualClock,
        log: std::path::PathBuf,
        _dir: tempfile::TempDir,
    }

    fn harness(
        sampler: impl Sampler + 'static,
        store: impl StateStore + 'static,
        terminator: RecordingTerminator,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ptyguard.log");
        let notifier = RecordingNotifier::default();
        let clock = ManualClock::new(NOW);

        let monitor = Monitor::new(
            Box::new(sampler),
            Box::new(terminator.clone()),
            Box::new(store),
            vec![Box::new(notifier.clone())],
            Box::new(clock.clone()),
            AuditLog::new(&log),
            Default::default(),
        );

        Harness {
            monitor,
            signaled: terminator.signaled,
            sent: notifier.sent,
            clock,
            log,
            _dir: dir,
        }
    }

    fn orphan(pid: u32, handles: u32) -> ProcessSample {
        ProcessSample::new(pid, 1).with_handles(handles).with_project("web")
    }

    fn attached(pid: u32, tty: &str, handles: u32) -> ProcessSample {
        ProcessSample::new(pid, 3100).with_tty(tty).with_handles(handles)
    }

    fn audit_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn orphan_is_killed_and_no_alert_below_threshold() {
        let sampler = ScriptedSampler::new(vec![
            (
                ResourceCapacity::new(999, 511),
                vec![orphan(4001, 464), attached(4002, "pts/3", 20)],
            ),
            (ResourceCapacity::new(999, 47), vec![attached(4002, "pts/3", 20)]),
        ]);
        let store = MemoryStateStore::default();
        let h = harness(sampler, store.clone(), RecordingTerminator::default());

        let report = h.monitor.run_once(RunOptions::default()).await.unwrap();

        let to_kill: Vec<u32> = report.decision.to_kill.iter().map(|s| s.pid).collect();
        assert_eq!(to_kill, vec![4001]);
        assert_eq!(*h.signaled.lock(), vec![4001]);
        assert_eq!(report.killed, vec![4001]);
        assert_eq!(report.decision.alert_level, AlertLevel::None);
        assert_eq!(report.assessment.capacity.usage_percent(), 4);
        assert!(h.sent.lock().is_empty());
        assert_eq!(store.get(), AlertState::default());

        let lines = audit_lines(&h.log);
        assert!(lines.iter().any(|l| l.contains("killed orphan PID 4001")));
        assert!(lines.last().unwrap().contains("check: pty 47/999 (4%) procs=2 killed=1 failed=0 alert=none"));
    }

    #[tokio::test]
    async fn high_usage_sends_one_ranked_alert() {
        let sampler = ScriptedSampler::new(vec![(
            ResourceCapacity::new(999, 948),
            vec![attached(5002, "pts/7", 389), attached(5001, "pts/3", 464)],
        )]);
        let store = MemoryStateStore::default();
        let h = harness(sampler, store.clone(), RecordingTerminator::default());

        let report = h.monitor.run_once(RunOptions::default()).await.unwrap();

        assert!(report.decision.to_kill.is_empty());
        assert!(h.signaled.lock().is_empty());
        assert_eq!(report.decision.alert_level, AlertLevel::Leak);

        let ranked: Vec<u32> = report.assessment.ranked.iter().map(|s| s.handle_count).collect();
        assert_eq!(ranked, vec![464, 389]);
        let recommendation = report.assessment.recommendation.clone().unwrap();
        assert_eq!(recommendation.pid, 5001);
        assert_eq!(recommendation.tty, "pts/3");

        let sent = h.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "PTY usage 94%");
        assert!(sent[0].1.contains("Restart PID 5001 (pts/3"));
        assert!(report.dispatched);
        assert_eq!(store.get(), AlertState::at(NOW));
    }

    #[tokio::test]
    async fn second_run_inside_cooldown_is_suppressed_but_logged() {
        let sampler = ScriptedSampler::new(vec![(
            ResourceCapacity::new(1000, 850),
            vec![attached(6001, "pts/1", 300)],
        )]);
        let store = MemoryStateStore::default();
        let h = harness(sampler, store.clone(), RecordingTerminator::default());

        let first = h.monitor.run_once(RunOptions::default()).await.unwrap();
        h.clock.advance(300);
        let second = h.monitor.run_once(RunOptions::default()).await.unwrap();

        assert!(first.dispatched);
        assert!(!second.dispatched);
        assert!(second.suppressed);
        assert_eq!(second.cooldown_remaining, 1500);
        assert_eq!(second.decision.alert_level, AlertLevel::None);
        assert_eq!(h.sent.lock().len(), 1);
        assert_eq!(store.get(), AlertState::at(NOW));

        let checks: Vec<String> = audit_lines(&h.log)
            .into_iter()
            .filter(|l| l.contains("check:"))
            .collect();
        assert_eq!(checks.len(), 2);
        assert!(checks[1].contains("alert=suppressed (1500s cooldown left)"));
    }

    #[tokio::test]
    async fn cooldown_leaves_timestamp_untouched() {
        let sampler = ScriptedSampler::new(vec![(ResourceCapacity::new(100, 90), vec![])]);
        let store = MemoryStateStore::new(AlertState::at(NOW - 100));
        let h = harness(sampler, store.clone(), RecordingTerminator::default());

        let report = h.monitor.run_once(RunOptions::default()).await.unwrap();

        assert_eq!(report.assessment.level, AlertLevel::Usage);
        assert!(!report.dispatched);
        assert!(h.sent.lock().is_empty());
        assert_eq!(store.get(), AlertState::at(NOW - 100));
    }

    #[tokio::test]
    async fn force_dispatches_and_restarts_cooldown() {
        let sampler = ScriptedSampler::new(vec![(ResourceCapacity::new(100, 90), vec![])]);
        let store = MemoryStateStore::new(AlertState::at(NOW - 100));
        let h = harness(sampler, store.clone(), RecordingTerminator::default());

        let report = h
            .monitor
            .run_once(RunOptions {
                force: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(report.dispatched);
        assert!(report.state_updated);
        assert_eq!(h.sent.lock().len(), 1);
        assert_eq!(store.get(), AlertState::at(NOW));
    }

    #[tokio::test]
    async fn stored_timestamp_is_the_dispatch_time() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let store = MemoryStateStore::default();
        let monitor = Monitor::new(
            Box::new(ScriptedSampler::new(vec![(ResourceCapacity::new(100, 90), vec![])])),
            Box::new(RecordingTerminator::default()),
            Box::new(store.clone()),
            vec![Box::new(SlowNotifier {
                clock: clock.clone(),
                delay_secs: 20,
            })],
            Box::new(clock.clone()),
            AuditLog::new(dir.path().join("ptyguard.log")),
            Default::default(),
        );

        let report = monitor.run_once(RunOptions::default()).await.unwrap();

        assert!(report.dispatched);
        assert_eq!(store.get(), AlertState::at(NOW + 20));
    }

    #[tokio::test]
    async fn dry_run_never_signals_notifies_or_writes_state() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("last_alert");
        fs::write(&state_path, "1000\n").unwrap();

        let sampler = ScriptedSampler::new(vec![(
            ResourceCapacity::new(999, 948),
            vec![orphan(7001, 464), attached(7002, "pts/2", 389)],
        )]);
        let h = harness(
            sampler,
            FileStateStore::new(&state_path),
            RecordingTerminator::default(),
        );

        let report = h
            .monitor
            .run_once(RunOptions {
                dry_run: true,
                force: true,
            })
            .await
            .unwrap();

        assert_eq!(report.decision.to_kill.len(), 1);
        assert!(report.killed.is_empty());
        assert!(h.signaled.lock().is_empty());
        assert!(h.sent.lock().is_empty());
        assert!(!report.dispatched);
        assert!(!report.state_updated);
        assert_eq!(fs::read_to_string(&state_path).unwrap(), "1000\n");

        let lines = audit_lines(&h.log);
        assert!(lines.iter().any(|l| l.contains("DRY-RUN would kill orphan PID 7001")));
        assert!(lines.iter().any(|l| l.contains("DRY-RUN would notify: PTY usage 94%")));
        assert!(lines.last().unwrap().contains("DRY-RUN check:"));
        assert!(lines.last().unwrap().contains("alert=would send"));
    }

    #[tokio::test]
    async fn status_has_no_side_effects() {
        let sampler = ScriptedSampler::new(vec![(
            ResourceCapacity::new(999, 948),
            vec![orphan(8001, 464)],
        )]);
        let store = MemoryStateStore::new(AlertState::at(5));
        let h = harness(sampler, store.clone(), RecordingTerminator::default());

        let status = h.monitor.status().unwrap();

        assert_eq!(status.processes.len(), 1);
        assert_eq!(status.processes[0].flags, vec!["ZOMBIE", "LEAK!"]);
        assert!(h.signaled.lock().is_empty());
        assert!(h.sent.lock().is_empty());
        assert_eq!(store.get(), AlertState::at(5));
        assert!(!h.log.exists());
    }

    #[tokio::test]
    async fn failed_kill_does_not_stop_the_others() {
        let sampler = ScriptedSampler::new(vec![(
            ResourceCapacity::new(999, 100),
            vec![orphan(9001, 10), orphan(9002, 10)],
        )]);
        let terminator = RecordingTerminator {
            refuse: vec![9001],
            ..Default::default()
        };
        let h = harness(sampler, MemoryStateStore::default(), terminator);

        let report = h.monitor.run_once(RunOptions::default()).await.unwrap();

        assert_eq!(*h.signaled.lock(), vec![9001, 9002]);
        assert_eq!(report.killed, vec![9002]);
        assert_eq!(report.kill_failures.len(), 1);
        assert_eq!(report.kill_failures[0].0, 9001);
        assert!(audit_lines(&h.log).iter().any(|l| l.contains("kill failed for orphan PID 9001")));
    }

    #[tokio::test]
    async fn unreadable_state_fails_open() {
        let sampler = ScriptedSampler::new(vec![(ResourceCapacity::new(100, 99), vec![])]);
        let h = harness(sampler, UnreadableStore, RecordingTerminator::default());

        let report = h.monitor.run_once(RunOptions::default()).await.unwrap();

        assert!(report.dispatched);
        assert_eq!(h.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn capacity_failure_aborts_the_run() {
        let h = harness(BrokenSampler, MemoryStateStore::default(), RecordingTerminator::default());
        assert!(matches!(
            h.monitor.run_once(RunOptions::default()).await,
            Err(Error::Capacity { .. })
        ));
        assert!(h.monitor.status().is_err());
    }

    #[test]
    fn live_sampler_finds_child_process() {
        if !Path::new("/proc/self/fd").exists() {
            return;
        }

        let mut child = std::process::Command::new("sleep")
            .arg("31.7")
            .spawn()
            .unwrap();

        let target = TargetConfig {
            pattern: "sleep 31.7".to_string(),
            exclude_names: vec![],
            handle_marker: "ptmx".to_string(),
        };
        let sampler = SystemSampler::new(target, SystemConfig::default());
        let samples = sampler.processes().unwrap();

        let _ = child.kill();
        let _ = child.wait();

        let sample = samples.iter().find(|s| s.pid == child.id());
        assert!(sample.is_some(), "child {} not sampled", child.id());
        let sample = sample.unwrap();
        assert_eq!(sample.parent_pid, std::process::id());
        assert_eq!(sample.handle_count, 0);
        assert!(!samples.iter().any(|s| s.pid == std::process::id()));
    }
}

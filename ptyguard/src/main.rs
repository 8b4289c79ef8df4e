use anyhow::{Context, Result};
use clap::Parser;
use ptyguard_core::{
    notifier, AuditLog, Config, FileStateStore, Monitor, RunLock, RunOptions, SignalTerminator,
    SystemClock, SystemSampler,
};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Watches for processes that leak pseudo-terminal slots, terminates orphaned
/// ones and alerts when system PTY usage runs high. Meant to be run
/// periodically by cron or a systemd timer.
#[derive(Parser, Debug)]
#[command(name = "ptyguard", version, about)]
struct Cli {
    /// Print the process table and exit without side effects
    #[arg(long)]
    status: bool,

    /// With --status, print JSON instead of a table
    #[arg(long, requires = "status")]
    json: bool,

    /// Log intended kills and notifications instead of performing them
    #[arg(long)]
    dry_run: bool,

    /// Alert even if the cooldown has not expired
    #[arg(long)]
    force: bool,

    /// Config file path (default: platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Audit log path (overrides config)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Last-alert timestamp file (overrides config)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> Config {
    let path = cli.config.clone().unwrap_or_else(Config::config_path);
    let mut config = Config::load_or_default(&path);
    if let Some(log_file) = &cli.log_file {
        config.paths.log_file = log_file.clone();
    }
    if let Some(state_file) = &cli.state_file {
        config.paths.state_file = state_file.clone();
    }
    config
}

fn build_monitor(config: &Config) -> Monitor {
    Monitor::new(
        Box::new(SystemSampler::new(config.target.clone(), config.system.clone())),
        Box::new(SignalTerminator),
        Box::new(FileStateStore::new(&config.paths.state_file)),
        notifier::from_config(&config.notify),
        Box::new(SystemClock),
        AuditLog::new(&config.paths.log_file),
        config.thresholds,
    )
}

fn status(monitor: &Monitor, json: bool) -> Result<()> {
    let report = monitor.status().context("sampling PTY usage")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

/// How long shutdown waits for blocking notification calls still in flight.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

async fn check(monitor: &Monitor, config: &Config, options: RunOptions) -> Result<()> {
    // The lock is best-effort: if it cannot be taken at all, run unguarded
    let _lock = match RunLock::acquire(&config.paths.lock_file) {
        Ok(Some(lock)) => Some(lock),
        Ok(None) => {
            info!("another run is in progress, skipping");
            return Ok(());
        }
        Err(e) => {
            warn!("running without the run lock: {}", e);
            monitor
                .audit()
                .append(monitor.now(), &format!("run lock unavailable, continuing: {}", e));
            None
        }
    };

    match monitor.run_once(options).await {
        Ok(report) => {
            info!(
                "pty {}, killed {}, alert {}",
                report.assessment.capacity,
                report.killed.len(),
                if report.dispatched { "sent" } else { "not sent" }
            );
            Ok(())
        }
        Err(e) => {
            monitor.audit().append(monitor.now(), &format!("ERROR {}", e));
            Err(e).context("check failed")
        }
    }
}

/// Drives `future` on a current-thread runtime. Blocking tasks that outlive
/// their timeout are abandoned after [`SHUTDOWN_GRACE`] instead of holding up
/// exit.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
    tracing::debug!(?cli, "parsed CLI arguments");

    let config = load_config(&cli);
    let monitor = build_monitor(&config);

    let result = if cli.status {
        status(&monitor, cli.json)
    } else {
        let options = RunOptions {
            dry_run: cli.dry_run,
            force: cli.force,
        };
        block_on(check(&monitor, &config, options)).and_then(|result| result)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

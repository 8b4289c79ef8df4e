pub mod capacity;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gate;
pub mod lock;
pub mod notifier;
pub mod process;
pub mod reporter;
pub mod run;
pub mod sampler;
pub mod terminator;

#[cfg(test)]
mod tests;

pub use capacity::ResourceCapacity;
pub use classifier::{AlertLevel, Assessment, Decision, RestartRecommendation, Thresholds};
pub use config::Config;
pub use error::{Error, Result};
pub use gate::{AlertGate, AlertState, Clock, FileStateStore, StateStore, SystemClock};
pub use lock::RunLock;
pub use notifier::{Notifier, NotifyOutcome};
pub use process::ProcessSample;
pub use reporter::{AuditLog, StatusReport};
pub use run::{Monitor, RunOptions, RunReport};
pub use sampler::{Sampler, SystemSampler};
pub use terminator::{SignalTerminator, Terminator};

//! Payment-failure escalation ("dunning")
//!
//! A subscriber whose charge failed moves through eight steps of increasing
//! severity, each due a fixed number of days after the failure. The runner
//! derives the due step from the failure timestamp on every invocation, so a
//! missed or crashed run is caught up by the next one. A successful payment
//! at any point hands the subscriber to recovery.

mod engine;
mod recovery;
mod retry;
mod runner;
mod scheduler;
mod steps;
mod thresholds;

pub use engine::{DunningCollaborators, DunningEngine, DunningSettings, HISTORY_MAX_LIMIT};
pub use runner::RunSummary;
pub use scheduler::DunningScheduler;
pub use thresholds::{days_elapsed, expected_step, threshold_days, STEP_THRESHOLDS};

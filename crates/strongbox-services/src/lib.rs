//! Strongbox Services Layer
//!
//! Business services that coordinate the stores and external adapters. The
//! payment-failure escalation engine lives in [`dunning`]; thin HTTP handling
//! stays in strongbox-api.

pub mod dunning;

pub use dunning::{
    expected_step, DunningCollaborators, DunningEngine, DunningScheduler, DunningSettings,
    RunSummary, HISTORY_MAX_LIMIT, STEP_THRESHOLDS,
};

use chrono::{DateTime, Utc};
use strongbox_core::models::TERMINAL_STEP;

/// `(step, days since the failed charge)` at which each step becomes due
pub const STEP_THRESHOLDS: [(u8, i64); 8] = [
    (1, 0),
    (2, 3),
    (3, 5),
    (4, 7),
    (5, 14),
    (6, 21),
    (7, 30),
    (TERMINAL_STEP, 45),
];

pub fn threshold_days(step: u8) -> Option<i64> {
    STEP_THRESHOLDS
        .iter()
        .find(|(s, _)| *s == step)
        .map(|(_, days)| *days)
}

/// Highest step whose threshold has been reached. 0 when nothing is due yet
/// (negative elapsed time from clock skew included). Never exceeds the terminal step.
pub fn expected_step(days_elapsed: i64) -> u8 {
    STEP_THRESHOLDS
        .iter()
        .filter(|(_, days)| *days <= days_elapsed)
        .map(|(step, _)| *step)
        .max()
        .unwrap_or(0)
}

/// Whole days between the failed charge and `now`
pub fn days_elapsed(failed_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - failed_at).num_days()
}

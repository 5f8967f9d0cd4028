use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// What a dunning audit entry records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "dunning_action", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DunningAction {
    DunningStarted,
    PaymentRetry,
    StepExecuted,
    NotificationSent,
    NotificationFailed,
    Recovered,
    StepFailed,
    TerminalReset,
}

impl DunningAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DunningAction::DunningStarted => "dunning_started",
            DunningAction::PaymentRetry => "payment_retry",
            DunningAction::StepExecuted => "step_executed",
            DunningAction::NotificationSent => "notification_sent",
            DunningAction::NotificationFailed => "notification_failed",
            DunningAction::Recovered => "recovered",
            DunningAction::StepFailed => "step_failed",
            DunningAction::TerminalReset => "terminal_reset",
        }
    }
}

impl fmt::Display for DunningAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one dunning action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DunningAuditEntry {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub step: i16,
    pub action: DunningAction,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl DunningAuditEntry {
    pub fn new(
        subscriber_id: Uuid,
        step: u8,
        action: DunningAction,
        details: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscriber_id,
            step: i16::from(step),
            action,
            details,
            created_at,
        }
    }
}

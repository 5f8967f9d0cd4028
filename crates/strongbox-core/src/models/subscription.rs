use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::plan::{Entitlements, FeatureFlags, SubscriptionPlan};
use crate::error::AppError;

/// Highest escalation step. Reaching it resets the account instead of persisting step 8.
pub const TERMINAL_STEP: u8 = 8;

/// Payment status as stored on the subscription row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Active,
    PastDue,
    Restricted,
    Downgraded,
}

/// Escalation state of a subscription.
///
/// Each variant carries exactly the timestamps that exist at that point of the
/// escalation, so a restricted account without `restricted_at` or an active
/// account with a `previous_plan` cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DunningState {
    Active,
    PastDue {
        failed_at: DateTime<Utc>,
        step: u8,
    },
    Restricted {
        failed_at: DateTime<Utc>,
        step: u8,
        restricted_at: DateTime<Utc>,
    },
    Downgraded {
        failed_at: DateTime<Utc>,
        step: u8,
        restricted_at: DateTime<Utc>,
        downgraded_at: DateTime<Utc>,
        previous_plan: SubscriptionPlan,
        deletion_at: DateTime<Utc>,
    },
}

impl DunningState {
    pub fn is_active(&self) -> bool {
        matches!(self, DunningState::Active)
    }

    pub fn step(&self) -> u8 {
        match *self {
            DunningState::Active => 0,
            DunningState::PastDue { step, .. }
            | DunningState::Restricted { step, .. }
            | DunningState::Downgraded { step, .. } => step,
        }
    }

    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            DunningState::Active => PaymentStatus::Active,
            DunningState::PastDue { .. } => PaymentStatus::PastDue,
            DunningState::Restricted { .. } => PaymentStatus::Restricted,
            DunningState::Downgraded { .. } => PaymentStatus::Downgraded,
        }
    }

    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        match *self {
            DunningState::Active => None,
            DunningState::PastDue { failed_at, .. }
            | DunningState::Restricted { failed_at, .. }
            | DunningState::Downgraded { failed_at, .. } => Some(failed_at),
        }
    }

    pub fn restricted_at(&self) -> Option<DateTime<Utc>> {
        match *self {
            DunningState::Restricted { restricted_at, .. }
            | DunningState::Downgraded { restricted_at, .. } => Some(restricted_at),
            _ => None,
        }
    }

    pub fn downgraded_at(&self) -> Option<DateTime<Utc>> {
        match *self {
            DunningState::Downgraded { downgraded_at, .. } => Some(downgraded_at),
            _ => None,
        }
    }

    pub fn deletion_scheduled_at(&self) -> Option<DateTime<Utc>> {
        match *self {
            DunningState::Downgraded { deletion_at, .. } => Some(deletion_at),
            _ => None,
        }
    }

    pub fn previous_plan(&self) -> Option<SubscriptionPlan> {
        match *self {
            DunningState::Downgraded { previous_plan, .. } => Some(previous_plan),
            _ => None,
        }
    }

    /// Same state with the step counter replaced. `Active` stays `Active`.
    pub fn with_step(self, new_step: u8) -> Self {
        match self {
            DunningState::Active => DunningState::Active,
            DunningState::PastDue { failed_at, .. } => DunningState::PastDue {
                failed_at,
                step: new_step,
            },
            DunningState::Restricted {
                failed_at,
                restricted_at,
                ..
            } => DunningState::Restricted {
                failed_at,
                step: new_step,
                restricted_at,
            },
            DunningState::Downgraded {
                failed_at,
                restricted_at,
                downgraded_at,
                previous_plan,
                deletion_at,
                ..
            } => DunningState::Downgraded {
                failed_at,
                step: new_step,
                restricted_at,
                downgraded_at,
                previous_plan,
                deletion_at,
            },
        }
    }

    /// Rebuild the state from its flattened columns, rejecting combinations the
    /// state machine never produces.
    pub fn from_columns(columns: &DunningColumns) -> Result<Self, AppError> {
        let step = u8::try_from(columns.dunning_step)
            .ok()
            .filter(|s| *s < TERMINAL_STEP)
            .ok_or_else(|| {
                AppError::InvalidDunningState(format!(
                    "dunning_step {} out of range",
                    columns.dunning_step
                ))
            })?;

        let invalid = |reason: &str| {
            Err(AppError::InvalidDunningState(format!(
                "{:?} at step {}: {}",
                columns.payment_status, step, reason
            )))
        };

        match columns.payment_status {
            PaymentStatus::Active => {
                if step != 0
                    || columns.payment_failed_at.is_some()
                    || columns.restricted_at.is_some()
                    || columns.downgraded_at.is_some()
                    || columns.deletion_scheduled_at.is_some()
                    || columns.previous_plan.is_some()
                {
                    return invalid("active subscription carries dunning fields");
                }
                Ok(DunningState::Active)
            }
            PaymentStatus::PastDue => {
                let Some(failed_at) = columns.payment_failed_at else {
                    return invalid("missing payment_failed_at");
                };
                if !(1..=3).contains(&step) {
                    return invalid("past_due is only valid for steps 1-3");
                }
                if columns.restricted_at.is_some()
                    || columns.downgraded_at.is_some()
                    || columns.previous_plan.is_some()
                {
                    return invalid("past_due carries restriction or downgrade fields");
                }
                Ok(DunningState::PastDue { failed_at, step })
            }
            PaymentStatus::Restricted => {
                let (Some(failed_at), Some(restricted_at)) =
                    (columns.payment_failed_at, columns.restricted_at)
                else {
                    return invalid("missing payment_failed_at or restricted_at");
                };
                if !(4..=5).contains(&step) {
                    return invalid("restricted is only valid for steps 4-5");
                }
                if columns.downgraded_at.is_some() || columns.previous_plan.is_some() {
                    return invalid("restricted carries downgrade fields");
                }
                Ok(DunningState::Restricted {
                    failed_at,
                    step,
                    restricted_at,
                })
            }
            PaymentStatus::Downgraded => {
                let (
                    Some(failed_at),
                    Some(restricted_at),
                    Some(downgraded_at),
                    Some(previous_plan),
                    Some(deletion_at),
                ) = (
                    columns.payment_failed_at,
                    columns.restricted_at,
                    columns.downgraded_at,
                    columns.previous_plan,
                    columns.deletion_scheduled_at,
                )
                else {
                    return invalid("missing downgrade fields");
                };
                if !(6..=7).contains(&step) {
                    return invalid("downgraded is only valid for steps 6-7");
                }
                Ok(DunningState::Downgraded {
                    failed_at,
                    step,
                    restricted_at,
                    downgraded_at,
                    previous_plan,
                    deletion_at,
                })
            }
        }
    }
}

/// Flattened, column-shaped view of `DunningState`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DunningColumns {
    pub payment_status: PaymentStatus,
    pub dunning_step: i16,
    pub payment_failed_at: Option<DateTime<Utc>>,
    pub restricted_at: Option<DateTime<Utc>>,
    pub downgraded_at: Option<DateTime<Utc>>,
    pub deletion_scheduled_at: Option<DateTime<Utc>>,
    pub previous_plan: Option<SubscriptionPlan>,
}

impl From<&DunningState> for DunningColumns {
    fn from(state: &DunningState) -> Self {
        Self {
            payment_status: state.payment_status(),
            dunning_step: i16::from(state.step()),
            payment_failed_at: state.failed_at(),
            restricted_at: state.restricted_at(),
            downgraded_at: state.downgraded_at(),
            deletion_scheduled_at: state.deletion_scheduled_at(),
            previous_plan: state.previous_plan(),
        }
    }
}

/// Subscription row as stored in Postgres
#[derive(Debug, Clone)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SubscriptionRow {
    pub subscriber_id: Uuid,
    pub plan: SubscriptionPlan,
    pub payment_status: PaymentStatus,
    pub dunning_step: i16,
    pub payment_failed_at: Option<DateTime<Utc>>,
    pub restricted_at: Option<DateTime<Utc>>,
    pub downgraded_at: Option<DateTime<Utc>>,
    pub deletion_scheduled_at: Option<DateTime<Utc>>,
    pub previous_plan: Option<SubscriptionPlan>,
    pub document_limit: i64,
    pub bank_connection_limit: i32,
    pub monthly_chat_quota: i32,
    pub feature_flags: serde_json::Value,
    pub chat_messages_used: i32,
    pub external_customer_id: Option<String>,
    pub external_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRow {
    pub fn dunning_columns(&self) -> DunningColumns {
        DunningColumns {
            payment_status: self.payment_status,
            dunning_step: self.dunning_step,
            payment_failed_at: self.payment_failed_at,
            restricted_at: self.restricted_at,
            downgraded_at: self.downgraded_at,
            deletion_scheduled_at: self.deletion_scheduled_at,
            previous_plan: self.previous_plan,
        }
    }
}

/// Subscription entity as seen by the billing domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub subscriber_id: Uuid,
    pub plan: SubscriptionPlan,
    pub dunning: DunningState,
    pub entitlements: Entitlements,
    pub chat_messages_used: i32,
    pub external_customer_id: Option<String>,
    pub external_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn dunning_step(&self) -> u8 {
        self.dunning.step()
    }

    pub fn in_dunning(&self) -> bool {
        !self.dunning.is_active()
    }
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = AppError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let dunning = DunningState::from_columns(&row.dunning_columns()).map_err(|e| {
            AppError::InvalidDunningState(format!("subscriber {}: {}", row.subscriber_id, e))
        })?;
        let features: FeatureFlags = serde_json::from_value(row.feature_flags).map_err(|e| {
            AppError::InvalidDunningState(format!(
                "subscriber {}: malformed feature_flags: {}",
                row.subscriber_id, e
            ))
        })?;

        Ok(Subscription {
            subscriber_id: row.subscriber_id,
            plan: row.plan,
            dunning,
            entitlements: Entitlements {
                document_limit: row.document_limit,
                bank_connection_limit: row.bank_connection_limit,
                monthly_chat_quota: row.monthly_chat_quota,
                features,
            },
            chat_messages_used: row.chat_messages_used,
            external_customer_id: row.external_customer_id,
            external_subscription_id: row.external_subscription_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Read-only projection of the dunning fields for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DunningStatus {
    pub in_dunning: bool,
    pub payment_status: PaymentStatus,
    pub dunning_step: u8,
    pub payment_failed_at: Option<DateTime<Utc>>,
    pub restricted_at: Option<DateTime<Utc>>,
    pub downgrade_date: Option<DateTime<Utc>>,
    pub deletion_date: Option<DateTime<Utc>>,
    pub previous_plan: Option<SubscriptionPlan>,
}

impl From<&Subscription> for DunningStatus {
    fn from(subscription: &Subscription) -> Self {
        let state = &subscription.dunning;
        Self {
            in_dunning: !state.is_active(),
            payment_status: state.payment_status(),
            dunning_step: state.step(),
            payment_failed_at: state.failed_at(),
            restricted_at: state.restricted_at(),
            downgrade_date: state.downgraded_at(),
            deletion_date: state.deletion_scheduled_at(),
            previous_plan: state.previous_plan(),
        }
    }
}

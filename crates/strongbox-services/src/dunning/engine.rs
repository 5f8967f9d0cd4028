use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use strongbox_core::models::{
    DunningAction, DunningAuditEntry, DunningState, DunningStatus, NotificationTemplate,
    PlanCatalog, Subscription,
};
use strongbox_core::{AppError, BankConnectionService, Clock, Config, Notifier, PaymentProcessor};
use strongbox_db::{DocumentStore, DunningAuditLog, SubscriptionStore};

/// Upper bound for audit history requests
pub const HISTORY_MAX_LIMIT: i64 = 200;

/// Everything the engine talks to
#[derive(Clone)]
pub struct DunningCollaborators {
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub audit_log: Arc<dyn DunningAuditLog>,
    pub documents: Arc<dyn DocumentStore>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub bank_connections: Arc<dyn BankConnectionService>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct DunningSettings {
    /// Days between the forced downgrade and document deletion
    pub deletion_grace_days: i64,
    /// Subscribers processed concurrently by one run
    pub max_concurrency: usize,
}

impl Default for DunningSettings {
    fn default() -> Self {
        Self {
            deletion_grace_days: 24,
            max_concurrency: 4,
        }
    }
}

impl DunningSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            deletion_grace_days: config.dunning_deletion_grace_days(),
            max_concurrency: config.dunning_max_concurrency().max(1),
        }
    }
}

/// Payment-failure escalation engine
pub struct DunningEngine {
    pub(super) deps: DunningCollaborators,
    pub(super) catalog: PlanCatalog,
    pub(super) settings: DunningSettings,
    /// Held for the duration of a run so in-process runs never overlap
    pub(super) run_lock: Mutex<()>,
}

impl DunningEngine {
    pub fn new(deps: DunningCollaborators, catalog: PlanCatalog, settings: DunningSettings) -> Self {
        Self {
            deps,
            catalog,
            settings,
            run_lock: Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &DunningSettings {
        &self.settings
    }

    pub(super) async fn load(&self, subscriber_id: Uuid) -> Result<Subscription, AppError> {
        self.deps
            .subscriptions
            .get(subscriber_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Subscription for subscriber {} not found", subscriber_id))
            })
    }

    /// Enter escalation after a failed charge.
    ///
    /// Returns `false` without side effects when the subscriber is already in
    /// escalation or on the free plan.
    #[tracing::instrument(skip(self, reason))]
    pub async fn start(&self, subscriber_id: Uuid, reason: Option<&str>) -> Result<bool, AppError> {
        let mut subscription = self.load(subscriber_id).await?;

        if subscription.in_dunning() {
            tracing::info!(
                step = subscription.dunning_step(),
                "Subscriber already in dunning, ignoring start"
            );
            return Ok(false);
        }
        if subscription.plan.is_free() {
            tracing::debug!("Free plan subscribers are never dunned");
            return Ok(false);
        }

        let now = self.deps.clock.now();
        subscription.dunning = DunningState::PastDue {
            failed_at: now,
            step: 1,
        };

        match self.deps.subscriptions.save_dunning(&subscription, 0).await {
            Ok(()) => {}
            Err(AppError::StaleDunningState { actual_step, .. }) => {
                tracing::info!(actual_step, "Dunning started concurrently, ignoring start");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        self.record(
            subscriber_id,
            1,
            DunningAction::DunningStarted,
            json!({ "plan": subscription.plan, "reason": reason }),
            now,
        )
        .await;
        self.notify(
            &subscription,
            1,
            NotificationTemplate::FriendlyReminder,
            json!({ "plan": subscription.plan }),
            now,
        )
        .await;

        tracing::info!(plan = %subscription.plan, "Dunning started");
        Ok(true)
    }

    /// Read-only projection of the dunning fields
    pub async fn status(&self, subscriber_id: Uuid) -> Result<DunningStatus, AppError> {
        let subscription = self.load(subscriber_id).await?;
        Ok(DunningStatus::from(&subscription))
    }

    /// Audit entries for one subscriber, newest first
    pub async fn history(
        &self,
        subscriber_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DunningAuditEntry>, AppError> {
        let limit = limit.clamp(1, HISTORY_MAX_LIMIT);
        self.deps
            .audit_log
            .list_for_subscriber(subscriber_id, limit)
            .await
    }

    /// Append an audit entry. The state change it describes is already
    /// persisted, so a failed write is logged rather than propagated.
    pub(super) async fn record(
        &self,
        subscriber_id: Uuid,
        step: u8,
        action: DunningAction,
        details: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        let entry = DunningAuditEntry::new(subscriber_id, step, action, details, now);
        if let Err(e) = self.deps.audit_log.append(entry).await {
            tracing::error!(
                error = %e,
                subscriber_id = %subscriber_id,
                step,
                action = %action,
                "Failed to write dunning audit entry"
            );
        }
    }

    /// Send a notification. Delivery failures are audited and never propagated.
    pub(super) async fn notify(
        &self,
        subscription: &Subscription,
        step: u8,
        template: NotificationTemplate,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        let subscriber_id = subscription.subscriber_id;
        match self
            .deps
            .notifier
            .send(subscriber_id, template, data)
            .await
        {
            Ok(()) => {
                self.record(
                    subscriber_id,
                    step,
                    DunningAction::NotificationSent,
                    json!({ "template": template.key() }),
                    now,
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    subscriber_id = %subscriber_id,
                    step,
                    template = %template,
                    "Dunning notification failed"
                );
                self.record(
                    subscriber_id,
                    step,
                    DunningAction::NotificationFailed,
                    json!({ "template": template.key(), "error": e.to_string() }),
                    now,
                )
                .await;
            }
        }
    }
}

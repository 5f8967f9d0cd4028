use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use strongbox_core::models::{
    DunningAction, DunningState, NotificationTemplate, Subscription, SubscriptionPlan,
    TERMINAL_STEP,
};
use strongbox_core::AppError;

use super::engine::DunningEngine;

/// What a step handler decided, before it is persisted
struct StepEffect {
    next: Subscription,
    details: serde_json::Value,
    notification: Option<serde_json::Value>,
    terminal: bool,
}

impl StepEffect {
    fn notify(next: Subscription, details: serde_json::Value, data: serde_json::Value) -> Self {
        Self {
            next,
            details,
            notification: Some(data),
            terminal: false,
        }
    }
}

/// Outcome of disconnecting every bank connection of a subscriber
struct Disconnected {
    found: usize,
    disconnected: usize,
}

impl DunningEngine {
    /// Apply the consequences of `step` and persist it.
    ///
    /// `subscription` must hold the last persisted state at `step - 1`; on
    /// success it is replaced by the newly persisted state. Handlers are
    /// "set to" operations so re-running a step after a crash does not
    /// double-apply anything.
    pub(super) async fn execute_step(
        &self,
        subscription: &mut Subscription,
        step: u8,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let from_step = subscription.dunning_step();
        if from_step == 0 || step != from_step + 1 {
            return Err(AppError::InvalidDunningState(format!(
                "cannot execute step {} from step {}",
                step, from_step
            )));
        }

        let effect = match step {
            2 | 3 | 5 => self.reminder(subscription, step),
            4 => self.restrict_access(subscription, now).await?,
            6 => self.force_downgrade(subscription, now).await?,
            7 => self.warn_deletion(subscription).await?,
            TERMINAL_STEP => self.terminal_cleanup(subscription).await?,
            _ => {
                return Err(AppError::InvalidDunningState(format!(
                    "no handler for step {}",
                    step
                )))
            }
        };

        self.deps
            .subscriptions
            .save_dunning(&effect.next, from_step)
            .await?;

        let subscriber_id = subscription.subscriber_id;
        self.record(
            subscriber_id,
            step,
            DunningAction::StepExecuted,
            effect.details.clone(),
            now,
        )
        .await;
        if effect.terminal {
            self.record(
                subscriber_id,
                step,
                DunningAction::TerminalReset,
                effect.details,
                now,
            )
            .await;
        }
        if let (Some(data), Some(template)) =
            (effect.notification, NotificationTemplate::for_step(step))
        {
            self.notify(&effect.next, step, template, data, now).await;
        }

        tracing::info!(
            subscriber_id = %subscriber_id,
            step,
            payment_status = ?effect.next.dunning.payment_status(),
            "Dunning step executed"
        );
        *subscription = effect.next;
        Ok(())
    }

    /// Steps 2, 3 and 5: notification only
    fn reminder(&self, subscription: &Subscription, step: u8) -> StepEffect {
        let mut next = subscription.clone();
        next.dunning = next.dunning.with_step(step);
        StepEffect::notify(
            next,
            json!({ "step": step }),
            json!({ "plan": subscription.plan }),
        )
    }

    /// Step 4: restrict access
    async fn restrict_access(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<StepEffect, AppError> {
        let failed_at = failed_at(subscription)?;
        let document_count = self
            .deps
            .documents
            .count(subscription.subscriber_id)
            .await?;
        let free_document_limit = self.catalog.free_document_limit();

        let mut next = subscription.clone();
        next.dunning = DunningState::Restricted {
            failed_at,
            step: 4,
            restricted_at: subscription.dunning.restricted_at().unwrap_or(now),
        };

        let data = json!({
            "document_count": document_count,
            "free_document_limit": free_document_limit,
        });
        Ok(StepEffect::notify(next, data.clone(), data))
    }

    /// Step 6: forced downgrade to the free plan
    async fn force_downgrade(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<StepEffect, AppError> {
        let subscriber_id = subscription.subscriber_id;
        let failed_at = failed_at(subscription)?;

        // Keep what an earlier, interrupted attempt of this step already decided.
        let previous_plan = subscription
            .dunning
            .previous_plan()
            .unwrap_or(subscription.plan);
        let downgraded_at = subscription.dunning.downgraded_at().unwrap_or(now);
        let deletion_at = subscription
            .dunning
            .deletion_scheduled_at()
            .unwrap_or(now + Duration::days(self.settings.deletion_grace_days));

        let banks = self.disconnect_all_banks(subscription).await;

        let subscription_cancelled = match subscription.external_subscription_id.as_deref() {
            Some(id) => match self.deps.payments.cancel_subscription(id).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        subscriber_id = %subscriber_id,
                        "Failed to cancel processor subscription during downgrade"
                    );
                    false
                }
            },
            None => false,
        };

        let mut next = subscription.clone();
        next.plan = SubscriptionPlan::Free;
        next.entitlements = self.catalog.free();
        next.dunning = DunningState::Downgraded {
            failed_at,
            step: 6,
            restricted_at: subscription.dunning.restricted_at().unwrap_or(now),
            downgraded_at,
            previous_plan,
            deletion_at,
        };

        Ok(StepEffect::notify(
            next,
            json!({
                "previous_plan": previous_plan,
                "bank_connections_found": banks.found,
                "bank_connections_disconnected": banks.disconnected,
                "subscription_cancelled": subscription_cancelled,
                "deletion_date": deletion_at,
            }),
            json!({
                "previous_plan": previous_plan,
                "bank_connections_disconnected": banks.disconnected,
                "deletion_date": deletion_at.format("%Y-%m-%d").to_string(),
            }),
        ))
    }

    /// Step 7: warn about the documents step 8 will delete
    async fn warn_deletion(&self, subscription: &Subscription) -> Result<StepEffect, AppError> {
        let (document_count, excess) = self.excess_documents(subscription).await?;
        let documents = if excess > 0 {
            self.deps
                .documents
                .list_oldest_first(subscription.subscriber_id, excess)
                .await?
        } else {
            Vec::new()
        };

        let mut next = subscription.clone();
        next.dunning = next.dunning.with_step(7);

        let listed: Vec<serde_json::Value> = documents
            .iter()
            .map(|d| json!({ "id": d.id, "name": d.name }))
            .collect();
        let details = json!({
            "document_count": document_count,
            "free_document_limit": self.catalog.free_document_limit(),
            "excess_count": excess,
            "documents": listed,
        });

        Ok(StepEffect {
            next,
            notification: (excess > 0).then(|| details.clone()),
            details,
            terminal: false,
        })
    }

    /// Step 8: delete excess documents, drop residual bank connections and
    /// reset the account to a clean free subscription
    async fn terminal_cleanup(&self, subscription: &Subscription) -> Result<StepEffect, AppError> {
        let subscriber_id = subscription.subscriber_id;
        let free_document_limit = self.catalog.free_document_limit();

        let (_, excess) = self.excess_documents(subscription).await?;
        let documents_deleted = if excess > 0 {
            let oldest = self
                .deps
                .documents
                .list_oldest_first(subscriber_id, excess)
                .await?;
            let ids: Vec<_> = oldest.iter().map(|d| d.id).collect();
            self.deps.documents.delete_many(subscriber_id, &ids).await?
        } else {
            0
        };

        let remaining = self.deps.documents.count(subscriber_id).await?;
        if remaining > free_document_limit {
            // Uploads raced the deletion; stay at step 7 and finish on the next run.
            return Err(AppError::Internal(format!(
                "{} documents remain above the free limit of {} after deletion",
                remaining, free_document_limit
            )));
        }

        let banks = self.disconnect_all_banks(subscription).await;

        let mut next = subscription.clone();
        next.plan = SubscriptionPlan::Free;
        next.entitlements = self.catalog.free();
        next.dunning = DunningState::Active;

        let details = json!({
            "documents_deleted": documents_deleted,
            "documents_remaining": remaining,
            "bank_connections_found": banks.found,
            "bank_connections_disconnected": banks.disconnected,
        });
        Ok(StepEffect {
            next,
            notification: Some(json!({
                "documents_deleted": documents_deleted,
                "bank_connections_disconnected": banks.disconnected,
            })),
            details,
            terminal: true,
        })
    }

    /// `(total, max(0, total - free limit))`, always computed fresh
    async fn excess_documents(&self, subscription: &Subscription) -> Result<(i64, i64), AppError> {
        let total = self
            .deps
            .documents
            .count(subscription.subscriber_id)
            .await?;
        let excess = (total - self.catalog.free_document_limit()).max(0);
        Ok((total, excess))
    }

    /// Best effort: every connection is attempted, failures are logged and counted out
    async fn disconnect_all_banks(&self, subscription: &Subscription) -> Disconnected {
        let subscriber_id = subscription.subscriber_id;
        let connections = match self
            .deps
            .bank_connections
            .list_connections(subscriber_id)
            .await
        {
            Ok(connections) => connections,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    subscriber_id = %subscriber_id,
                    "Failed to list bank connections"
                );
                Vec::new()
            }
        };

        let mut disconnected = 0;
        for connection_id in &connections {
            match self.deps.bank_connections.disconnect(connection_id).await {
                Ok(()) => disconnected += 1,
                Err(e) => tracing::warn!(
                    error = %e,
                    subscriber_id = %subscriber_id,
                    connection_id = %connection_id,
                    "Failed to disconnect bank connection"
                ),
            }
        }

        Disconnected {
            found: connections.len(),
            disconnected,
        }
    }
}

fn failed_at(subscription: &Subscription) -> Result<DateTime<Utc>, AppError> {
    subscription.dunning.failed_at().ok_or_else(|| {
        AppError::InvalidDunningState(format!(
            "subscriber {} has no payment failure time",
            subscription.subscriber_id
        ))
    })
}

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use strongbox_core::models::{
    DunningAction, DunningState, NotificationTemplate, Subscription,
};
use strongbox_core::AppError;

use super::engine::DunningEngine;

/// Reload-and-retry bound for a recovery write
const RECOVERY_SAVE_ATTEMPTS: usize = 10;

impl DunningEngine {
    /// Leave escalation after a successful payment.
    ///
    /// Returns `false` when the subscriber is not in escalation.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self, subscriber_id: Uuid) -> Result<bool, AppError> {
        let subscription = self.load(subscriber_id).await?;
        if !subscription.in_dunning() {
            tracing::debug!("Subscriber not in dunning, nothing to recover");
            return Ok(false);
        }

        let now = self.deps.clock.now();
        self.recover_subscription(subscription, now).await?;
        Ok(true)
    }

    /// Restore the plan held before a forced downgrade (or keep the current
    /// one), its catalog entitlements, and clear every dunning field.
    ///
    /// Callers reach this after a payment settled, so a concurrent step change
    /// never cancels the recovery: the subscription is reloaded and the write
    /// retried against the fresh step until it lands or another writer has
    /// already taken the subscriber out of escalation.
    pub(super) async fn recover_subscription(
        &self,
        mut subscription: Subscription,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let subscriber_id = subscription.subscriber_id;

        for attempt in 1..=RECOVERY_SAVE_ATTEMPTS {
            let from_step = subscription.dunning_step();
            let restored_plan = subscription
                .dunning
                .previous_plan()
                .unwrap_or(subscription.plan);

            let mut recovered = subscription.clone();
            recovered.plan = restored_plan;
            recovered.entitlements = self.catalog.entitlements(restored_plan);
            recovered.dunning = DunningState::Active;

            match self
                .deps
                .subscriptions
                .save_dunning(&recovered, from_step)
                .await
            {
                Ok(()) => {
                    self.finish_recovery(&recovered, from_step, now).await;
                    return Ok(());
                }
                Err(AppError::StaleDunningState { actual_step, .. }) => {
                    tracing::warn!(
                        subscriber_id = %subscriber_id,
                        expected_step = from_step,
                        actual_step,
                        attempt,
                        "Subscription changed during recovery, reloading"
                    );
                    subscription = self.load(subscriber_id).await?;
                    if !subscription.in_dunning() {
                        tracing::info!(
                            subscriber_id = %subscriber_id,
                            "Subscriber already left dunning"
                        );
                        return Ok(());
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Internal(format!(
            "recovery of subscriber {} not persisted after {} attempts",
            subscriber_id, RECOVERY_SAVE_ATTEMPTS
        )))
    }

    async fn finish_recovery(
        &self,
        subscription: &Subscription,
        from_step: u8,
        now: DateTime<Utc>,
    ) {
        let subscriber_id = subscription.subscriber_id;
        let plan = subscription.plan;

        self.record(
            subscriber_id,
            from_step,
            DunningAction::Recovered,
            json!({ "plan": plan, "from_step": from_step }),
            now,
        )
        .await;
        self.notify(
            subscription,
            from_step,
            NotificationTemplate::PaymentRecovered,
            json!({ "plan": plan }),
            now,
        )
        .await;

        tracing::info!(
            subscriber_id = %subscriber_id,
            from_step,
            plan = %plan,
            "Subscriber recovered from dunning"
        );
    }
}

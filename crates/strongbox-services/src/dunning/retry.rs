use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use strongbox_core::models::{DunningAction, Subscription};
use strongbox_core::AppError;

use super::engine::DunningEngine;

impl DunningEngine {
    /// Try to settle the outstanding invoice before `step` executes.
    ///
    /// Processor errors count as a failed attempt: the step still applies its
    /// consequences and the next run retries the payment.
    pub(super) async fn attempt_payment(
        &self,
        subscription: &Subscription,
        step: u8,
        now: DateTime<Utc>,
    ) -> bool {
        let subscriber_id = subscription.subscriber_id;
        let Some(customer_id) = subscription.external_customer_id.as_deref() else {
            tracing::warn!(
                subscriber_id = %subscriber_id,
                step,
                "No payment processor customer, skipping payment retry"
            );
            self.record(
                subscriber_id,
                step,
                DunningAction::PaymentRetry,
                json!({ "success": false, "reason": "no_customer" }),
                now,
            )
            .await;
            return false;
        };

        let (success, details) = match self.deps.payments.retry_invoice(customer_id).await {
            Ok(success) => (success, json!({ "success": success })),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    subscriber_id = %subscriber_id,
                    step,
                    "Payment retry failed"
                );
                (false, json!({ "success": false, "error": e.to_string() }))
            }
        };

        tracing::debug!(subscriber_id = %subscriber_id, step, success, "Payment retry attempted");
        self.record(subscriber_id, step, DunningAction::PaymentRetry, details, now)
            .await;
        success
    }

    /// Subscriber-initiated payment retry. Recovers the account when the
    /// charge goes through.
    #[tracing::instrument(skip(self))]
    pub async fn retry_payment(&self, subscriber_id: Uuid) -> Result<bool, AppError> {
        let subscription = self.load(subscriber_id).await?;
        if !subscription.in_dunning() {
            return Err(AppError::NotInDunning(subscriber_id));
        }

        let now = self.deps.clock.now();
        let step = subscription.dunning_step();
        if !self.attempt_payment(&subscription, step, now).await {
            return Ok(false);
        }

        self.recover_subscription(subscription, now).await?;
        Ok(true)
    }
}

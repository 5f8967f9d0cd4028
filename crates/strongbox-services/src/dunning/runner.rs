use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use strongbox_core::models::DunningAction;
use strongbox_core::AppError;

use super::engine::DunningEngine;
use super::thresholds::{days_elapsed, expected_step};

/// Counts reported by one runner invocation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct RunSummary {
    /// Subscribers that had work due and finished it (recovered ones included)
    pub processed: u32,
    /// Subscribers that left escalation through recovery
    pub recovered: u32,
    /// Subscribers whose processing failed; they are retried on the next run
    pub errors: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriberOutcome {
    Skipped,
    Advanced,
    Recovered,
    Failed,
}

impl DunningEngine {
    /// Advance every subscriber in escalation to the step their failure age
    /// calls for.
    ///
    /// Subscribers are independent and processed with bounded concurrency;
    /// the steps of one subscriber always run in ascending order. A failure
    /// is confined to its subscriber.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<RunSummary, AppError> {
        let _running = self.run_lock.lock().await;

        let now = self.deps.clock.now();
        let subscriber_ids = self.deps.subscriptions.list_in_dunning().await?;
        tracing::info!(
            subscribers = subscriber_ids.len(),
            concurrency = self.settings.max_concurrency,
            "Dunning run started"
        );

        let outcomes: Vec<SubscriberOutcome> = stream::iter(subscriber_ids)
            .map(|subscriber_id| self.process_subscriber(subscriber_id, now))
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        let mut summary = RunSummary::default();
        for outcome in outcomes {
            match outcome {
                SubscriberOutcome::Skipped => {}
                SubscriberOutcome::Advanced => summary.processed += 1,
                SubscriberOutcome::Recovered => {
                    summary.processed += 1;
                    summary.recovered += 1;
                }
                SubscriberOutcome::Failed => summary.errors += 1,
            }
        }

        tracing::info!(
            processed = summary.processed,
            recovered = summary.recovered,
            errors = summary.errors,
            "Dunning run completed"
        );
        Ok(summary)
    }

    async fn process_subscriber(&self, subscriber_id: Uuid, now: DateTime<Utc>) -> SubscriberOutcome {
        match self.advance_subscriber(subscriber_id, now).await {
            Ok(outcome) => outcome,
            Err(AppError::StaleDunningState {
                expected_step,
                actual_step,
                ..
            }) => {
                tracing::info!(
                    subscriber_id = %subscriber_id,
                    expected_step,
                    actual_step,
                    "Subscriber advanced concurrently, skipping"
                );
                SubscriberOutcome::Skipped
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    subscriber_id = %subscriber_id,
                    "Dunning processing failed for subscriber"
                );
                SubscriberOutcome::Failed
            }
        }
    }

    async fn advance_subscriber(
        &self,
        subscriber_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SubscriberOutcome, AppError> {
        let Some(mut subscription) = self.deps.subscriptions.get(subscriber_id).await? else {
            return Ok(SubscriberOutcome::Skipped);
        };
        let Some(failed_at) = subscription.dunning.failed_at() else {
            // Recovered between listing and loading
            return Ok(SubscriberOutcome::Skipped);
        };

        let current = subscription.dunning_step();
        let due = expected_step(days_elapsed(failed_at, now));
        if due <= current {
            tracing::debug!(subscriber_id = %subscriber_id, current, due, "Nothing due");
            return Ok(SubscriberOutcome::Skipped);
        }

        for step in (current + 1)..=due {
            if self.attempt_payment(&subscription, step, now).await {
                self.recover_subscription(subscription, now).await?;
                return Ok(SubscriberOutcome::Recovered);
            }

            if let Err(e) = self.execute_step(&mut subscription, step, now).await {
                if !matches!(e, AppError::StaleDunningState { .. }) {
                    self.record(
                        subscriber_id,
                        step,
                        DunningAction::StepFailed,
                        json!({ "error": e.to_string() }),
                        now,
                    )
                    .await;
                }
                return Err(e);
            }
        }

        Ok(SubscriberOutcome::Advanced)
    }
}

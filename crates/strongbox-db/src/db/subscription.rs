use strongbox_core::models::{DunningColumns, Subscription, SubscriptionRow};
use strongbox_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::db::store_traits::SubscriptionStore;

const SUBSCRIPTION_COLUMNS: &str = r#"
    subscriber_id, plan, payment_status, dunning_step, payment_failed_at,
    restricted_at, downgraded_at, deletion_scheduled_at, previous_plan,
    document_limit, bank_connection_limit, monthly_chat_quota, feature_flags,
    chat_messages_used, external_customer_id, external_subscription_id,
    created_at, updated_at
"#;

/// Compare-and-swap on `dunning_step`. Writes the plan, entitlements and
/// dunning columns only; usage counters are owned by the chat flow.
const SAVE_DUNNING_SQL: &str = r#"
    UPDATE subscriptions
    SET plan = $3,
        payment_status = $4,
        dunning_step = $5,
        payment_failed_at = $6,
        restricted_at = $7,
        downgraded_at = $8,
        deletion_scheduled_at = $9,
        previous_plan = $10,
        document_limit = $11,
        bank_connection_limit = $12,
        monthly_chat_quota = $13,
        feature_flags = $14,
        updated_at = NOW()
    WHERE subscriber_id = $1 AND dunning_step = $2
"#;

/// Repository for subscription rows
#[derive(Clone)]
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Raw row, without validating the dunning columns
    #[tracing::instrument(skip(self), fields(db.table = "subscriptions", db.operation = "select"))]
    pub async fn get_row(&self, subscriber_id: Uuid) -> Result<Option<SubscriptionRow>, AppError> {
        let query = format!(
            "SELECT {} FROM subscriptions WHERE subscriber_id = $1",
            SUBSCRIPTION_COLUMNS
        );
        let row = sqlx::query_as::<Postgres, SubscriptionRow>(&query)
            .bind(subscriber_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, subscriber_id = %subscriber_id, "Failed to load subscription");
                AppError::Database(e)
            })?;

        Ok(row)
    }

    async fn current_step(&self, subscriber_id: Uuid) -> Result<Option<i16>, AppError> {
        let step = sqlx::query_scalar::<Postgres, i16>(
            "SELECT dunning_step FROM subscriptions WHERE subscriber_id = $1",
        )
        .bind(subscriber_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(step)
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for SubscriptionRepository {
    async fn get(&self, subscriber_id: Uuid) -> Result<Option<Subscription>, AppError> {
        self.get_row(subscriber_id)
            .await?
            .map(Subscription::try_from)
            .transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "subscriptions", db.operation = "select"))]
    async fn list_in_dunning(&self) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<Postgres, Uuid>(
            r#"
            SELECT subscriber_id FROM subscriptions
            WHERE payment_status <> 'active'
            ORDER BY payment_failed_at ASC NULLS LAST, subscriber_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list subscriptions in dunning");
            AppError::Database(e)
        })?;

        Ok(ids)
    }

    #[tracing::instrument(
        skip(self, subscription),
        fields(
            db.table = "subscriptions",
            db.operation = "update",
            subscriber_id = %subscription.subscriber_id,
            step = subscription.dunning_step()
        )
    )]
    async fn save_dunning(
        &self,
        subscription: &Subscription,
        expected_step: u8,
    ) -> Result<(), AppError> {
        let columns = DunningColumns::from(&subscription.dunning);
        let entitlements = &subscription.entitlements;
        let feature_flags = serde_json::to_value(entitlements.features)?;

        let result = sqlx::query(SAVE_DUNNING_SQL)
        .bind(subscription.subscriber_id)
        .bind(i16::from(expected_step))
        .bind(subscription.plan)
        .bind(columns.payment_status)
        .bind(columns.dunning_step)
        .bind(columns.payment_failed_at)
        .bind(columns.restricted_at)
        .bind(columns.downgraded_at)
        .bind(columns.deletion_scheduled_at)
        .bind(columns.previous_plan)
        .bind(entitlements.document_limit)
        .bind(entitlements.bank_connection_limit)
        .bind(entitlements.monthly_chat_quota)
        .bind(feature_flags)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to persist dunning state");
            AppError::Database(e)
        })?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.current_step(subscription.subscriber_id).await? {
            Some(actual) => Err(AppError::StaleDunningState {
                subscriber_id: subscription.subscriber_id,
                expected_step,
                actual_step: u8::try_from(actual).unwrap_or(u8::MAX),
            }),
            None => Err(AppError::NotFound(format!(
                "Subscription for subscriber {} not found",
                subscription.subscriber_id
            ))),
        }
    }
}

use strongbox_core::models::DunningAuditEntry;
use strongbox_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::db::store_traits::DunningAuditLog;

/// Repository for the append-only dunning audit log
#[derive(Clone)]
pub struct DunningAuditRepository {
    pool: PgPool,
}

impl DunningAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DunningAuditLog for DunningAuditRepository {
    #[tracing::instrument(
        skip(self, entry),
        fields(db.table = "dunning_audit_log", db.operation = "insert", subscriber_id = %entry.subscriber_id, action = %entry.action)
    )]
    async fn append(&self, entry: DunningAuditEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO dunning_audit_log (id, subscriber_id, step, action, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.subscriber_id)
        .bind(entry.step)
        .bind(entry.action)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to append dunning audit entry");
            AppError::Database(e)
        })?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "dunning_audit_log", db.operation = "select"))]
    async fn list_for_subscriber(
        &self,
        subscriber_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DunningAuditEntry>, AppError> {
        let entries = sqlx::query_as::<Postgres, DunningAuditEntry>(
            r#"
            SELECT id, subscriber_id, step, action, details, created_at
            FROM dunning_audit_log
            WHERE subscriber_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(subscriber_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

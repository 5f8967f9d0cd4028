use strongbox_core::models::BankConnection;
use strongbox_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Repository for linked bank connections
#[derive(Clone)]
pub struct BankConnectionRepository {
    pool: PgPool,
}

impl BankConnectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "bank_connections", db.operation = "select"))]
    pub async fn list_active(&self, subscriber_id: Uuid) -> Result<Vec<BankConnection>, AppError> {
        let connections = sqlx::query_as::<Postgres, BankConnection>(
            r#"
            SELECT id, subscriber_id, item_id, access_token, institution_name, status,
                   created_at, disconnected_at
            FROM bank_connections
            WHERE subscriber_id = $1 AND status = 'active'
            ORDER BY created_at ASC
            "#,
        )
        .bind(subscriber_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(connections)
    }

    #[tracing::instrument(skip(self), fields(db.table = "bank_connections", db.operation = "select", db.record_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Option<BankConnection>, AppError> {
        let connection = sqlx::query_as::<Postgres, BankConnection>(
            r#"
            SELECT id, subscriber_id, item_id, access_token, institution_name, status,
                   created_at, disconnected_at
            FROM bank_connections
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }

    /// Mark a connection disconnected. Already-disconnected rows are left untouched.
    #[tracing::instrument(skip(self), fields(db.table = "bank_connections", db.operation = "update", db.record_id = %id))]
    pub async fn mark_disconnected(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE bank_connections
            SET status = 'disconnected', disconnected_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

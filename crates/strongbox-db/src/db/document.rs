use strongbox_core::models::DocumentSummary;
use strongbox_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::db::store_traits::DocumentStore;
use crate::db::transaction::TransactionGuard;

/// Repository for vault documents and the rows derived from them
#[derive(Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DocumentStore for DocumentRepository {
    #[tracing::instrument(skip(self), fields(db.table = "documents", db.operation = "count"))]
    async fn count(&self, subscriber_id: Uuid) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<Postgres, i64>(
            "SELECT COUNT(*) FROM documents WHERE owner_id = $1",
        )
        .bind(subscriber_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents", db.operation = "select"))]
    async fn list_oldest_first(
        &self,
        subscriber_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DocumentSummary>, AppError> {
        let documents = sqlx::query_as::<Postgres, DocumentSummary>(
            r#"
            SELECT id, name, created_at
            FROM documents
            WHERE owner_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(subscriber_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(documents)
    }

    #[tracing::instrument(skip(self, ids), fields(db.table = "documents", db.operation = "delete", count = ids.len()))]
    async fn delete_many(&self, subscriber_id: Uuid, ids: &[Uuid]) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = TransactionGuard::begin(&self.pool).await?;

        // Derived rows first; ownership is enforced through the documents join.
        sqlx::query(
            r#"
            DELETE FROM document_chunks
            WHERE document_id IN (SELECT id FROM documents WHERE owner_id = $1 AND id = ANY($2))
            "#,
        )
        .bind(subscriber_id)
        .bind(ids)
        .execute(tx.conn()?)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM chat_messages
            WHERE document_id IN (SELECT id FROM documents WHERE owner_id = $1 AND id = ANY($2))
            "#,
        )
        .bind(subscriber_id)
        .bind(ids)
        .execute(tx.conn()?)
        .await?;

        let deleted = sqlx::query("DELETE FROM documents WHERE owner_id = $1 AND id = ANY($2)")
            .bind(subscriber_id)
            .bind(ids)
            .execute(tx.conn()?)
            .await?
            .rows_affected();

        tx.commit().await?;

        tracing::info!(
            subscriber_id = %subscriber_id,
            requested = ids.len(),
            deleted,
            "Deleted documents with derived data"
        );

        Ok(deleted)
    }
}

//! Store traits consumed by the dunning engine
//!
//! The Postgres repositories implement these; engine tests implement them over
//! in-memory maps.

use strongbox_core::models::{DocumentSummary, DunningAuditEntry, Subscription};
use strongbox_core::AppError;
use uuid::Uuid;

/// Subscription persistence as needed by the dunning engine
#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, subscriber_id: Uuid) -> Result<Option<Subscription>, AppError>;

    /// Ids of every subscriber whose payment status is not `active`
    async fn list_in_dunning(&self) -> Result<Vec<Uuid>, AppError>;

    /// Persist plan, entitlements and dunning state. Usage counters are not written.
    ///
    /// Compare-and-swap on the stored dunning step: the write only lands if the
    /// row still holds `expected_step`, otherwise `AppError::StaleDunningState`.
    async fn save_dunning(
        &self,
        subscription: &Subscription,
        expected_step: u8,
    ) -> Result<(), AppError>;
}

/// Append-only dunning audit trail
#[async_trait::async_trait]
pub trait DunningAuditLog: Send + Sync {
    async fn append(&self, entry: DunningAuditEntry) -> Result<(), AppError>;

    /// Newest first
    async fn list_for_subscriber(
        &self,
        subscriber_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DunningAuditEntry>, AppError>;
}

/// Vault documents. The engine counts, lists and deletes; it never reads content.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn count(&self, subscriber_id: Uuid) -> Result<i64, AppError>;

    /// Oldest documents first (creation order), at most `limit`
    async fn list_oldest_first(
        &self,
        subscriber_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DocumentSummary>, AppError>;

    /// Delete documents with their chunks and chat history. Returns how many
    /// documents were removed.
    async fn delete_many(&self, subscriber_id: Uuid, ids: &[Uuid]) -> Result<u64, AppError>;
}

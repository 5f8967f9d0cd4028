//! Database repositories for data access layer
//!
//! Each repository owns one table family and is a thin wrapper around a
//! `PgPool`. The dunning engine only sees the traits in `store_traits`, so the
//! repositories can be swapped for in-memory fakes in tests.
//
// Billing repositories (subscriptions, dunning audit log)
pub mod audit;
pub mod subscription;
//
// Vault repositories (documents and their derived data, bank connections, users)
pub mod bank_connection;
pub mod document;
pub mod user;
//
// Store traits consumed by the dunning engine
pub mod store_traits;
//
// Transaction utilities
pub mod transaction;

pub use audit::DunningAuditRepository;
pub use bank_connection::BankConnectionRepository;
pub use document::DocumentRepository;
pub use store_traits::{DocumentStore, DunningAuditLog, SubscriptionStore};
pub use subscription::SubscriptionRepository;
pub use transaction::TransactionGuard;
pub use user::UserRepository;

//! Collaborator traits for the dunning engine
//!
//! The engine talks to the payment processor, the bank-connection provider and
//! the notification channel only through these traits. Production adapters live
//! in strongbox-infra; tests provide in-memory fakes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::NotificationTemplate;

/// Payment processor operations needed while a subscriber is in dunning
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Try to settle the customer's outstanding invoice.
    /// `Ok(false)` means the processor answered and the charge was declined.
    async fn retry_invoice(&self, customer_id: &str) -> Result<bool, AppError>;

    /// Cancel the recurring subscription. Cancelling an already-cancelled
    /// subscription succeeds.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), AppError>;
}

/// External bank connections (open-banking links) owned by a subscriber
#[async_trait]
pub trait BankConnectionService: Send + Sync {
    async fn list_connections(&self, user_id: Uuid) -> Result<Vec<String>, AppError>;

    async fn disconnect(&self, connection_id: &str) -> Result<(), AppError>;
}

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        user_id: Uuid,
        template: NotificationTemplate,
        data: serde_json::Value,
    ) -> Result<(), AppError>;
}

/// Notifier used when no delivery channel is configured
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(
        &self,
        user_id: Uuid,
        template: NotificationTemplate,
        data: serde_json::Value,
    ) -> Result<(), AppError> {
        tracing::info!(
            user_id = %user_id,
            template = %template,
            data = %data,
            "Notification delivery disabled, logging only"
        );
        Ok(())
    }
}

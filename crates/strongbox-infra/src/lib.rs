//! Strongbox Infrastructure Library
//!
//! Adapters between the dunning engine and the outside world:
//! - Stripe payment processor
//! - Plaid bank connections
//! - SMTP notifications
//! - Tracing initialization

pub mod email;
pub mod plaid;
pub mod stripe;
pub mod telemetry;

// Re-export commonly used types
pub use email::EmailNotifier;
pub use plaid::{PlaidBankConnectionService, PlaidClient};
pub use stripe::StripePaymentProcessor;
pub use telemetry::init_telemetry;

//! Strongbox Core Library
//!
//! This crate provides core domain models, error types, configuration and the
//! collaborator traits shared across all Strongbox components.

pub mod clock;
pub mod config;
pub mod error;
pub mod hooks;
pub mod models;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{BaseConfig, BillingConfig, Config};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use hooks::{BankConnectionService, LoggingNotifier, Notifier, PaymentProcessor};

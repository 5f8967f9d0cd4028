//! Data models for the application
//!
//! This module contains all data structures used throughout the application,
//! organized by domain. Each sub-module represents a specific feature area.

mod audit;
mod bank_connection;
mod document;
mod notification;
mod plan;
mod subscription;
mod user;

// Re-export all models for convenient imports
pub use audit::*;
pub use bank_connection::*;
pub use document::*;
pub use notification::*;
pub use plan::*;
pub use subscription::*;
pub use user::*;

//! Strongbox API Library
//!
//! HTTP handlers, bearer authentication and application setup for the
//! dunning service.

mod api_doc;
mod handlers;

pub mod auth;
pub mod error;
pub mod setup;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use state::{AppState, SecurityConfig};

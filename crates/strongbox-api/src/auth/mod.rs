//! Bearer authentication.
//!
//! Two callers exist: the external scheduler, which presents the shared
//! `DUNNING_CRON_SECRET`, and subscribers, who present an HS256 JWT whose
//! `sub` claim is their user id.

pub mod jwt;
pub mod middleware;
pub mod models;

//! Strongbox database layer
//!
//! Postgres repositories for subscriptions, the dunning audit log, vault
//! documents, bank connections and users, plus the store traits the dunning
//! engine is written against.

pub mod db;

pub use db::*;

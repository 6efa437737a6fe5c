//! Warden Database: SurrealDB connection management and repository
//! implementations.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Repository implementations for the `warden-core` traits
//! - The [`SurrealAccessStore`] bundle consumed by the access service

mod connection;
mod error;
pub mod repository;
mod retry;
mod schema;
mod store;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::{run_migrations, schema_v1};
pub use store::SurrealAccessStore;

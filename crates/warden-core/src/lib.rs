//! Warden Core: Domain models, error types and repository traits
//! for the physical access control engine.

pub mod error;
pub mod models;
pub mod repository;

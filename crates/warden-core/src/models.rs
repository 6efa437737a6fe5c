//! Domain models for Warden.
//!
//! These are the core types shared across all crates.

pub mod audit;
pub mod credential;
pub mod occupancy;
pub mod rule;
pub mod subject;
pub mod zone;

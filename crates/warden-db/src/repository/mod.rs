//! SurrealDB repository implementations.

mod audit;
mod credential;
mod occupancy;
mod rule;
mod subject;
mod zone;

use surrealdb_types::SurrealValue;

pub use audit::SurrealScanAuditRepository;
pub use credential::SurrealCredentialRepository;
pub use occupancy::SurrealOccupancyRepository;
pub use rule::SurrealAccessRuleRepository;
pub use subject::SurrealSubjectProfileRepository;
pub use zone::SurrealZoneRepository;

/// Result row of `SELECT count() AS total ... GROUP ALL`.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

//! [`AccessStore`] bundle backed by a single SurrealDB handle.

use surrealdb::{Connection, Surreal};
use warden_core::repository::AccessStore;

use crate::repository::{
    SurrealAccessRuleRepository, SurrealCredentialRepository, SurrealOccupancyRepository,
    SurrealScanAuditRepository, SurrealSubjectProfileRepository, SurrealZoneRepository,
};

/// All access-control repositories sharing one connection.
#[derive(Clone)]
pub struct SurrealAccessStore<C: Connection> {
    credentials: SurrealCredentialRepository<C>,
    zones: SurrealZoneRepository<C>,
    rules: SurrealAccessRuleRepository<C>,
    occupancy: SurrealOccupancyRepository<C>,
    subjects: SurrealSubjectProfileRepository<C>,
    audit: SurrealScanAuditRepository<C>,
}

impl<C: Connection> SurrealAccessStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            credentials: SurrealCredentialRepository::new(db.clone()),
            zones: SurrealZoneRepository::new(db.clone()),
            rules: SurrealAccessRuleRepository::new(db.clone()),
            occupancy: SurrealOccupancyRepository::new(db.clone()),
            subjects: SurrealSubjectProfileRepository::new(db.clone()),
            audit: SurrealScanAuditRepository::new(db),
        }
    }
}

impl<C: Connection> AccessStore for SurrealAccessStore<C> {
    type Credentials = SurrealCredentialRepository<C>;
    type Zones = SurrealZoneRepository<C>;
    type Rules = SurrealAccessRuleRepository<C>;
    type Occupancy = SurrealOccupancyRepository<C>;
    type Subjects = SurrealSubjectProfileRepository<C>;
    type Audit = SurrealScanAuditRepository<C>;

    fn credentials(&self) -> &Self::Credentials {
        &self.credentials
    }

    fn zones(&self) -> &Self::Zones {
        &self.zones
    }

    fn rules(&self) -> &Self::Rules {
        &self.rules
    }

    fn occupancy(&self) -> &Self::Occupancy {
        &self.occupancy
    }

    fn subjects(&self) -> &Self::Subjects {
        &self.subjects
    }

    fn audit(&self) -> &Self::Audit {
        &self.audit
    }
}

//! Access service facade and administration of zones, rules and
//! subject profiles.
//!
//! The scan path lives in `verifier`, issuance and revocation in
//! `issuer`, occupancy in `occupancy` and the audit trail in `audit`;
//! each adds its own `impl` block to [`AccessService`].

use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::rule::{AccessRule, CreateAccessRule, UpdateAccessRule};
use warden_core::models::subject::{SubjectProfile, SubjectRef, UpsertSubjectProfile};
use warden_core::models::zone::{CreateZone, UpdateZone, Zone};
use warden_core::repository::{
    AccessRuleRepository, AccessStore, PaginatedResult, Pagination, SubjectProfileRepository,
    ZoneRepository,
};

use crate::config::AccessConfig;
use crate::error::AccessError;

/// Access control service.
///
/// Generic over the store bundle so that the access layer has no
/// dependency on the database crate. Holds no mutable state of its
/// own; all calls may run concurrently.
pub struct AccessService<S: AccessStore> {
    pub(crate) store: S,
    pub(crate) config: AccessConfig,
}

fn validation(message: impl Into<String>) -> WardenError {
    WardenError::Validation {
        message: message.into(),
    }
}

impl<S: AccessStore> AccessService<S> {
    pub fn new(store: S, config: AccessConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one store call under `store_timeout`.
    pub(crate) async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = WardenResult<T>>,
    ) -> WardenResult<T> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AccessError::Timeout(operation.into()).into()),
        }
    }

    // -------------------------------------------------------------------
    // Zones
    // -------------------------------------------------------------------

    pub async fn create_zone(&self, input: CreateZone) -> WardenResult<Zone> {
        if input.name.trim().is_empty() {
            return Err(validation("zone name must not be empty"));
        }
        if input.max_capacity == Some(0) {
            return Err(validation("zone capacity must be positive"));
        }
        self.bounded("zone_create", self.store.zones().create(input))
            .await
    }

    pub async fn get_zone(&self, tenant_id: Uuid, zone_id: Uuid) -> WardenResult<Zone> {
        self.bounded("zone_get", self.store.zones().get_by_id(tenant_id, zone_id))
            .await
    }

    pub async fn update_zone(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        input: UpdateZone,
    ) -> WardenResult<Zone> {
        if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(validation("zone name must not be empty"));
        }
        if input.max_capacity == Some(Some(0)) {
            return Err(validation("zone capacity must be positive"));
        }
        self.bounded(
            "zone_update",
            self.store.zones().update(tenant_id, zone_id, input),
        )
        .await
    }

    pub async fn list_zones(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<Zone>> {
        self.bounded("zone_list", self.store.zones().list(tenant_id, pagination))
            .await
    }

    // -------------------------------------------------------------------
    // Rules
    // -------------------------------------------------------------------

    pub async fn create_rule(&self, input: CreateAccessRule) -> WardenResult<AccessRule> {
        if input.name.trim().is_empty() {
            return Err(validation("rule name must not be empty"));
        }
        if input.max_occupancy == Some(0) {
            return Err(validation("rule occupancy cap must be positive"));
        }
        if let (Some(from), Some(until)) = (input.valid_from, input.valid_until) {
            if from > until {
                return Err(validation("rule valid_from must not be after valid_until"));
            }
        }
        if let Some(zone_id) = input.zone_id {
            self.get_zone(input.tenant_id, zone_id).await?;
        }
        self.bounded("rule_create", self.store.rules().create(input))
            .await
    }

    pub async fn get_rule(&self, tenant_id: Uuid, rule_id: Uuid) -> WardenResult<AccessRule> {
        self.bounded("rule_get", self.store.rules().get_by_id(tenant_id, rule_id))
            .await
    }

    pub async fn update_rule(
        &self,
        tenant_id: Uuid,
        rule_id: Uuid,
        input: UpdateAccessRule,
    ) -> WardenResult<AccessRule> {
        if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(validation("rule name must not be empty"));
        }
        if input.max_occupancy == Some(Some(0)) {
            return Err(validation("rule occupancy cap must be positive"));
        }

        let current = self.get_rule(tenant_id, rule_id).await?;
        let valid_from = input.valid_from.unwrap_or(current.valid_from);
        let valid_until = input.valid_until.unwrap_or(current.valid_until);
        if let (Some(from), Some(until)) = (valid_from, valid_until) {
            if from > until {
                return Err(validation("rule valid_from must not be after valid_until"));
            }
        }
        if let Some(Some(zone_id)) = input.zone_id {
            self.get_zone(tenant_id, zone_id).await?;
        }

        self.bounded(
            "rule_update",
            self.store.rules().update(tenant_id, rule_id, input),
        )
        .await
    }

    pub async fn deactivate_rule(&self, tenant_id: Uuid, rule_id: Uuid) -> WardenResult<()> {
        self.bounded(
            "rule_deactivate",
            self.store.rules().deactivate(tenant_id, rule_id),
        )
        .await
    }

    pub async fn list_rules(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<AccessRule>> {
        self.bounded("rule_list", self.store.rules().list(tenant_id, pagination))
            .await
    }

    // -------------------------------------------------------------------
    // Subject profiles
    // -------------------------------------------------------------------

    pub async fn upsert_subject_profile(
        &self,
        tenant_id: Uuid,
        subject: SubjectRef,
        input: UpsertSubjectProfile,
    ) -> WardenResult<SubjectProfile> {
        self.bounded(
            "subject_upsert",
            self.store.subjects().upsert(tenant_id, subject, input),
        )
        .await
    }

    pub async fn get_subject_profile(
        &self,
        tenant_id: Uuid,
        subject: SubjectRef,
    ) -> WardenResult<Option<SubjectProfile>> {
        self.bounded("subject_get", self.store.subjects().get(tenant_id, subject))
            .await
    }
}

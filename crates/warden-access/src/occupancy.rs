//! Occupancy tracker.
//!
//! Counts are changed only through the store's atomic arithmetic. The
//! service never reads a count, adjusts it locally and writes it back.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::occupancy::OccupancySnapshot;
use warden_core::models::rule::AccessRule;
use warden_core::models::zone::Zone;
use warden_core::repository::{AccessRuleRepository, AccessStore, OccupancyRepository};

use crate::service::AccessService;

/// Capacity enforced for entries into `zone`.
///
/// The smallest occupancy cap among the applicable rules wins; without
/// one the zone's own capacity applies, and `default` when the zone has
/// none either.
pub fn effective_capacity(zone: &Zone, rules: &[AccessRule], default: u32) -> u32 {
    rules
        .iter()
        .filter_map(|r| r.max_occupancy)
        .min()
        .or(zone.max_capacity)
        .unwrap_or(default)
}

impl<S: AccessStore> AccessService<S> {
    async fn zone_capacity(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        now: DateTime<Utc>,
    ) -> WardenResult<u32> {
        let zone = self.get_zone(tenant_id, zone_id).await?;
        let rules = self
            .bounded(
                "get_active_rules",
                self.store
                    .rules()
                    .get_active_rules(tenant_id, Some(zone_id), now),
            )
            .await?;
        Ok(effective_capacity(
            &zone,
            &rules,
            self.config.default_zone_capacity,
        ))
    }

    /// Count one person into a zone without a capacity check.
    pub async fn record_entry(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
    ) -> WardenResult<OccupancySnapshot> {
        let now = Utc::now();
        let capacity = self.zone_capacity(tenant_id, zone_id, now).await?;
        let snapshot = self
            .bounded(
                "occupancy_apply_delta",
                self.store
                    .occupancy()
                    .apply_delta(tenant_id, zone_id, 1, capacity, now),
            )
            .await?;
        debug!(%tenant_id, %zone_id, count = snapshot.current_count, "Recorded entry");
        Ok(snapshot)
    }

    /// Count one person out of a zone. The count never drops below zero.
    pub async fn record_exit(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
    ) -> WardenResult<OccupancySnapshot> {
        let now = Utc::now();
        let capacity = self.zone_capacity(tenant_id, zone_id, now).await?;
        let snapshot = self
            .bounded(
                "occupancy_apply_delta",
                self.store
                    .occupancy()
                    .apply_delta(tenant_id, zone_id, -1, capacity, now),
            )
            .await?;
        debug!(%tenant_id, %zone_id, count = snapshot.current_count, "Recorded exit");
        Ok(snapshot)
    }

    /// Snapshots of one zone, or of every tracked zone of the tenant.
    pub async fn current_occupancy(
        &self,
        tenant_id: Uuid,
        zone_id: Option<Uuid>,
    ) -> WardenResult<Vec<OccupancySnapshot>> {
        if let Some(zone_id) = zone_id {
            self.get_zone(tenant_id, zone_id).await?;
        }
        self.bounded(
            "occupancy_list",
            self.store.occupancy().list(tenant_id, zone_id),
        )
        .await
    }

    /// Snapshot of a single zone, created at zero if nobody has entered
    /// it yet.
    pub async fn get_occupancy(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
    ) -> WardenResult<OccupancySnapshot> {
        let now = Utc::now();
        let capacity = self.zone_capacity(tenant_id, zone_id, now).await?;
        self.bounded(
            "occupancy_get_or_create",
            self.store
                .occupancy()
                .get_or_create(tenant_id, zone_id, capacity, now),
        )
        .await
    }

    /// Reserve a place in a zone if it is below `capacity`.
    ///
    /// Returns `None` when the zone is full.
    pub async fn try_enter(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        capacity: u32,
        now: DateTime<Utc>,
    ) -> WardenResult<Option<OccupancySnapshot>> {
        self.bounded(
            "occupancy_try_increment",
            self.store
                .occupancy()
                .try_increment(tenant_id, zone_id, capacity, now),
        )
        .await
    }

    /// Reset peak counts to the current counts, for one tenant or for
    /// every tenant with occupancy data. Returns the number of
    /// snapshots reset.
    pub async fn reset_daily_peaks(&self, tenant_id: Option<Uuid>) -> WardenResult<u64> {
        let now = Utc::now();
        let tenants = match tenant_id {
            Some(tenant_id) => vec![tenant_id],
            None => {
                self.bounded("occupancy_tenants", self.store.occupancy().tenants())
                    .await?
            }
        };

        let mut reset = 0;
        for tenant_id in tenants {
            reset += self
                .bounded(
                    "occupancy_reset_peaks",
                    self.store.occupancy().reset_peaks(tenant_id, now),
                )
                .await?;
        }
        info!(snapshots = reset, "Reset daily occupancy peaks");
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::models::zone::ZoneType;

    fn zone(max_capacity: Option<u32>) -> Zone {
        let now = Utc::now();
        Zone {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Lobby".into(),
            zone_type: ZoneType::General,
            max_capacity,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn capped(cap: Option<u32>) -> AccessRule {
        let now = Utc::now();
        AccessRule {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "cap".into(),
            zone_id: None,
            membership_types: vec![],
            plan_types: vec![],
            roles: vec![],
            time_window: None,
            allowed_days: vec![],
            max_occupancy: cap,
            requires_approval: false,
            priority: 0,
            valid_from: None,
            valid_until: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn smallest_rule_cap_wins() {
        let rules = [capped(Some(12)), capped(None), capped(Some(5))];
        assert_eq!(effective_capacity(&zone(Some(2)), &rules, 100), 5);
    }

    #[test]
    fn zone_capacity_then_default() {
        assert_eq!(effective_capacity(&zone(Some(2)), &[capped(None)], 100), 2);
        assert_eq!(effective_capacity(&zone(None), &[], 100), 100);
    }
}

//! SurrealDB implementation of [`OccupancyRepository`].
//!
//! One record per tenant and zone, keyed `{tenant}_{zone}`. Counts are
//! only ever changed by arithmetic inside an `UPDATE` statement so that
//! concurrent entries cannot lose updates.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::occupancy::OccupancySnapshot;
use warden_core::repository::OccupancyRepository;

use crate::error::{DbError, parse_uuid};
use crate::retry;

#[derive(Debug, SurrealValue)]
struct OccupancyRow {
    tenant_id: String,
    zone_id: String,
    current_count: u32,
    max_capacity: u32,
    last_entry_at: Option<DateTime<Utc>>,
    last_exit_at: Option<DateTime<Utc>>,
    peak_count: u32,
    peak_reset_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct TenantRow {
    tenant_id: String,
}

impl OccupancyRow {
    fn try_into_snapshot(self) -> Result<OccupancySnapshot, DbError> {
        Ok(OccupancySnapshot {
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            zone_id: parse_uuid("zone", &self.zone_id)?,
            current_count: self.current_count,
            max_capacity: self.max_capacity,
            last_entry_at: self.last_entry_at,
            last_exit_at: self.last_exit_at,
            peak_count: self.peak_count,
            peak_reset_at: self.peak_reset_at,
            updated_at: self.updated_at,
        })
    }
}

fn record_key(tenant_id: Uuid, zone_id: Uuid) -> String {
    format!("{tenant_id}_{zone_id}")
}

/// SurrealDB implementation of the Occupancy repository.
#[derive(Clone)]
pub struct SurrealOccupancyRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealOccupancyRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Run a single-record statement against the snapshot row and decode
    /// the optional result. Write conflicts are retried.
    async fn update_one(
        &self,
        query: &str,
        tenant_id: Uuid,
        zone_id: Uuid,
        delta: i32,
        capacity: u32,
        at: DateTime<Utc>,
    ) -> Result<Option<OccupancySnapshot>, DbError> {
        let key = record_key(tenant_id, zone_id);
        let tenant = tenant_id.to_string();

        let rows: Vec<OccupancyRow> = retry::on_conflict("occupancy_update", || {
            let statement = self
                .db
                .query(query)
                .bind(("id", key.clone()))
                .bind(("tenant_id", tenant.clone()))
                .bind(("delta", delta))
                .bind(("capacity", capacity))
                .bind(("at", at));
            async move {
                let mut result = statement
                    .await
                    .map_err(DbError::store)?
                    .check()
                    .map_err(DbError::query)?;
                let rows: Vec<OccupancyRow> = result.take(0)?;
                Ok::<_, DbError>(rows)
            }
        })
        .await?;

        rows.into_iter()
            .next()
            .map(OccupancyRow::try_into_snapshot)
            .transpose()
    }
}

impl<C: Connection> OccupancyRepository for SurrealOccupancyRepository<C> {
    async fn get_or_create(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        max_capacity: u32,
        now: DateTime<Utc>,
    ) -> WardenResult<OccupancySnapshot> {
        let key = record_key(tenant_id, zone_id);

        let tenant = tenant_id.to_string();
        let zone = zone_id.to_string();

        // Counters fall back to their field DEFAULTs on first insert and
        // are left untouched afterwards.
        let rows: Vec<OccupancyRow> = retry::on_conflict("occupancy_upsert", || {
            let statement = self
                .db
                .query(
                    "UPSERT type::record('occupancy', $id) SET \
                     tenant_id = $tenant_id, \
                     zone_id = $zone_id, \
                     max_capacity = $max_capacity, \
                     updated_at = $now",
                )
                .bind(("id", key.clone()))
                .bind(("tenant_id", tenant.clone()))
                .bind(("zone_id", zone.clone()))
                .bind(("max_capacity", max_capacity))
                .bind(("now", now));
            async move {
                let mut result = statement
                    .await
                    .map_err(DbError::store)?
                    .check()
                    .map_err(DbError::query)?;
                let rows: Vec<OccupancyRow> = result.take(0)?;
                Ok::<_, DbError>(rows)
            }
        })
        .await?;

        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "occupancy".into(),
            id: key,
        })?;

        Ok(row.try_into_snapshot()?)
    }

    async fn apply_delta(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        delta: i32,
        max_capacity: u32,
        at: DateTime<Utc>,
    ) -> WardenResult<OccupancySnapshot> {
        self.get_or_create(tenant_id, zone_id, max_capacity, at)
            .await?;

        let stamp = if delta >= 0 {
            "last_entry_at"
        } else {
            "last_exit_at"
        };
        let query = format!(
            "UPDATE type::record('occupancy', $id) SET \
             peak_count = math::max([peak_count, current_count + $delta]), \
             current_count = math::max([0, current_count + $delta]), \
             {stamp} = $at, \
             max_capacity = $capacity, \
             updated_at = $at \
             WHERE tenant_id = $tenant_id"
        );

        let snapshot = self
            .update_one(&query, tenant_id, zone_id, delta, max_capacity, at)
            .await?
            .ok_or_else(|| DbError::NotFound {
                entity: "occupancy".into(),
                id: record_key(tenant_id, zone_id),
            })?;

        Ok(snapshot)
    }

    async fn try_increment(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        capacity: u32,
        at: DateTime<Utc>,
    ) -> WardenResult<Option<OccupancySnapshot>> {
        self.get_or_create(tenant_id, zone_id, capacity, at).await?;

        let snapshot = self
            .update_one(
                "UPDATE type::record('occupancy', $id) SET \
                 peak_count = math::max([peak_count, current_count + 1]), \
                 current_count += 1, \
                 last_entry_at = $at, \
                 max_capacity = $capacity, \
                 updated_at = $at \
                 WHERE tenant_id = $tenant_id AND current_count < $capacity",
                tenant_id,
                zone_id,
                1,
                capacity,
                at,
            )
            .await?;

        Ok(snapshot)
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        zone_id: Option<Uuid>,
    ) -> WardenResult<Vec<OccupancySnapshot>> {
        let mut query = String::from("SELECT * FROM occupancy WHERE tenant_id = $tenant_id");
        if zone_id.is_some() {
            query.push_str(" AND zone_id = $zone_id");
        }
        query.push_str(" ORDER BY zone_id ASC");

        let mut builder = self
            .db
            .query(&query)
            .bind(("tenant_id", tenant_id.to_string()));
        if let Some(zone_id) = zone_id {
            builder = builder.bind(("zone_id", zone_id.to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<OccupancyRow> = result.take(0).map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(OccupancyRow::try_into_snapshot)
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn reset_peaks(&self, tenant_id: Uuid, at: DateTime<Utc>) -> WardenResult<u64> {
        let result = self
            .db
            .query(
                "UPDATE occupancy SET \
                 peak_count = current_count, \
                 peak_reset_at = $at, \
                 updated_at = $at \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("at", at))
            .await
            .map_err(DbError::store)?;

        let mut result = result.check().map_err(DbError::query)?;

        let rows: Vec<OccupancyRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }

    async fn tenants(&self) -> WardenResult<Vec<Uuid>> {
        let mut result = self
            .db
            .query("SELECT tenant_id FROM occupancy GROUP BY tenant_id")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .iter()
            .map(|r| parse_uuid("tenant", &r.tenant_id))
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}

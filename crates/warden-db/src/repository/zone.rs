//! SurrealDB implementation of [`ZoneRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::zone::{CreateZone, UpdateZone, Zone, ZoneType};
use warden_core::repository::{PaginatedResult, Pagination, ZoneRepository};

use super::CountRow;
use crate::error::{DbError, parse_uuid};

/// Stored zone fields; the id comes from the caller.
#[derive(Debug, SurrealValue)]
struct ZoneRow {
    tenant_id: String,
    name: String,
    zone_type: String,
    max_capacity: Option<u32>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Zone row from list queries, id read with `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct ZoneRowWithId {
    record_id: String,
    tenant_id: String,
    name: String,
    zone_type: String,
    max_capacity: Option<u32>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub(crate) fn parse_zone_type(s: &str) -> Result<ZoneType, DbError> {
    match s {
        "General" => Ok(ZoneType::General),
        "MeetingRoom" => Ok(ZoneType::MeetingRoom),
        "PrivateOffice" => Ok(ZoneType::PrivateOffice),
        "Restricted" => Ok(ZoneType::Restricted),
        "Amenity" => Ok(ZoneType::Amenity),
        other => Err(DbError::Decode(format!("unknown zone type: {other}"))),
    }
}

fn zone_type_to_string(t: &ZoneType) -> &'static str {
    match t {
        ZoneType::General => "General",
        ZoneType::MeetingRoom => "MeetingRoom",
        ZoneType::PrivateOffice => "PrivateOffice",
        ZoneType::Restricted => "Restricted",
        ZoneType::Amenity => "Amenity",
    }
}

impl ZoneRow {
    fn into_zone(self, id: Uuid) -> Result<Zone, DbError> {
        Ok(Zone {
            id,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            name: self.name,
            zone_type: parse_zone_type(&self.zone_type)?,
            max_capacity: self.max_capacity,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl ZoneRowWithId {
    fn try_into_zone(self) -> Result<Zone, DbError> {
        Ok(Zone {
            id: parse_uuid("zone", &self.record_id)?,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            name: self.name,
            zone_type: parse_zone_type(&self.zone_type)?,
            max_capacity: self.max_capacity,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Zone repository.
#[derive(Clone)]
pub struct SurrealZoneRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealZoneRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ZoneRepository for SurrealZoneRepository<C> {
    async fn create(&self, input: CreateZone) -> WardenResult<Zone> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('zone', $id) SET \
                 tenant_id = $tenant_id, \
                 name = $name, \
                 zone_type = $zone_type, \
                 max_capacity = $max_capacity, \
                 active = true",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("name", input.name))
            .bind(("zone_type", zone_type_to_string(&input.zone_type).to_string()))
            .bind(("max_capacity", input.max_capacity))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(DbError::query)?;

        let rows: Vec<ZoneRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "zone".into(),
            id: id_str,
        })?;

        Ok(row.into_zone(id)?)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> WardenResult<Zone> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('zone', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ZoneRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "zone".into(),
            id: id_str,
        })?;

        Ok(row.into_zone(id)?)
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, input: UpdateZone) -> WardenResult<Zone> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.zone_type.is_some() {
            sets.push("zone_type = $zone_type");
        }
        if input.max_capacity.is_some() {
            sets.push("max_capacity = $max_capacity");
        }
        if input.active.is_some() {
            sets.push("active = $active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('zone', $id) SET {} \
             WHERE tenant_id = $tenant_id",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(ref zone_type) = input.zone_type {
            builder = builder.bind(("zone_type", zone_type_to_string(zone_type).to_string()));
        }
        if let Some(max_capacity) = input.max_capacity {
            builder = builder.bind(("max_capacity", max_capacity));
        }
        if let Some(active) = input.active {
            builder = builder.bind(("active", active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(DbError::query)?;

        let rows: Vec<ZoneRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "zone".into(),
            id: id_str,
        })?;

        Ok(row.into_zone(id)?)
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<Zone>> {
        let tenant_id_str = tenant_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM zone \
                 WHERE tenant_id = $tenant_id GROUP ALL",
            )
            .bind(("tenant_id", tenant_id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM zone \
                 WHERE tenant_id = $tenant_id \
                 ORDER BY name ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("tenant_id", tenant_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ZoneRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(ZoneRowWithId::try_into_zone)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

//! Zone domain model.
//!
//! A zone is a physical area of a facility (lobby, meeting room,
//! server room) with its own capacity. Zones are owned by a tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ZoneType {
    General,
    MeetingRoom,
    PrivateOffice,
    Restricted,
    Amenity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub zone_type: ZoneType,
    /// Maximum simultaneous occupants. `None` falls back to rule
    /// overrides or the configured default capacity.
    pub max_capacity: Option<u32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateZone {
    pub tenant_id: Uuid,
    pub name: String,
    pub zone_type: ZoneType,
    pub max_capacity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateZone {
    pub name: Option<String>,
    pub zone_type: Option<ZoneType>,
    /// `Some(Some(n))` = set, `Some(None)` = clear, `None` = no change.
    pub max_capacity: Option<Option<u32>>,
    pub active: Option<bool>,
}

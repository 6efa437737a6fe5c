//! Live occupancy per zone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current head count of a zone.
///
/// Counts only change through atomic in-store arithmetic; the count is
/// never negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancySnapshot {
    pub tenant_id: Uuid,
    pub zone_id: Uuid,
    pub current_count: u32,
    pub max_capacity: u32,
    pub last_entry_at: Option<DateTime<Utc>>,
    pub last_exit_at: Option<DateTime<Utc>>,
    /// Highest count seen since `peak_reset_at`.
    pub peak_count: u32,
    pub peak_reset_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OccupancySnapshot {
    pub fn is_full(&self) -> bool {
        self.current_count >= self.max_capacity
    }

    pub fn available(&self) -> u32 {
        self.max_capacity.saturating_sub(self.current_count)
    }
}

//! Access rule domain model.
//!
//! Rules constrain who may enter a zone and when. A rule without a
//! zone applies to every zone of its tenant. When several rules apply
//! to a scan, each one must permit it independently.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Time-of-day window in facility local time, inclusive on both ends.
///
/// A window whose `start` is later than its `end` wraps past midnight
/// (e.g. 22:00–06:00).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// `None` means the rule applies to all zones.
    pub zone_id: Option<Uuid>,
    /// Eligible membership types; empty = no membership constraint.
    pub membership_types: Vec<String>,
    /// Eligible plan types; empty = no plan constraint.
    pub plan_types: Vec<String>,
    /// Eligible subject roles; empty = no role constraint.
    pub roles: Vec<String>,
    pub time_window: Option<TimeWindow>,
    /// Allowed weekdays; empty = every day.
    pub allowed_days: Vec<Weekday>,
    pub max_occupancy: Option<u32>,
    pub requires_approval: bool,
    /// Higher values are evaluated first. Not unique.
    pub priority: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessRule {
    /// Whether the rule is active and its validity window contains `now`.
    pub fn is_in_effect(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.valid_from.is_none_or(|from| from <= now)
            && self.valid_until.is_none_or(|until| now <= until)
    }

    /// Whether the rule targets `zone_id` (unscoped rules target all).
    pub fn targets(&self, zone_id: Option<Uuid>) -> bool {
        match self.zone_id {
            None => true,
            Some(rule_zone) => Some(rule_zone) == zone_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateAccessRule {
    pub tenant_id: Uuid,
    pub name: String,
    pub zone_id: Option<Uuid>,
    pub membership_types: Vec<String>,
    pub plan_types: Vec<String>,
    pub roles: Vec<String>,
    pub time_window: Option<TimeWindow>,
    pub allowed_days: Vec<Weekday>,
    pub max_occupancy: Option<u32>,
    pub requires_approval: bool,
    pub priority: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Fields that can be updated on an existing rule.
///
/// Nested options follow the `Some(None)` = clear convention.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateAccessRule {
    pub name: Option<String>,
    pub zone_id: Option<Option<Uuid>>,
    pub membership_types: Option<Vec<String>>,
    pub plan_types: Option<Vec<String>>,
    pub roles: Option<Vec<String>>,
    pub time_window: Option<Option<TimeWindow>>,
    pub allowed_days: Option<Vec<Weekday>>,
    pub max_occupancy: Option<Option<u32>>,
    pub requires_approval: Option<bool>,
    pub priority: Option<i32>,
    pub valid_from: Option<Option<DateTime<Utc>>>,
    pub valid_until: Option<Option<DateTime<Utc>>>,
    pub active: Option<bool>,
}

//! SurrealDB implementation of [`AccessRuleRepository`].
//!
//! Time windows are stored as minutes from midnight and weekdays as
//! their three-letter names (`Mon`..`Sun`).

use chrono::{DateTime, NaiveTime, Timelike, Utc, Weekday};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::rule::{AccessRule, CreateAccessRule, TimeWindow, UpdateAccessRule};
use warden_core::repository::{AccessRuleRepository, PaginatedResult, Pagination};

use super::CountRow;
use crate::error::{DbError, parse_opt_uuid, parse_uuid};

/// Stored rule fields. Time windows are kept as minutes since midnight.
#[derive(Debug, SurrealValue)]
struct RuleRow {
    tenant_id: String,
    name: String,
    zone_id: Option<String>,
    membership_types: Vec<String>,
    plan_types: Vec<String>,
    roles: Vec<String>,
    window_start_min: Option<u32>,
    window_end_min: Option<u32>,
    allowed_days: Vec<String>,
    max_occupancy: Option<u32>,
    requires_approval: bool,
    priority: i32,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Rule row carrying its record id, for list queries.
#[derive(Debug, SurrealValue)]
struct RuleRowWithId {
    record_id: String,
    tenant_id: String,
    name: String,
    zone_id: Option<String>,
    membership_types: Vec<String>,
    plan_types: Vec<String>,
    roles: Vec<String>,
    window_start_min: Option<u32>,
    window_end_min: Option<u32>,
    allowed_days: Vec<String>,
    max_occupancy: Option<u32>,
    requires_approval: bool,
    priority: i32,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn minutes_to_time(minutes: u32) -> Result<NaiveTime, DbError> {
    NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0)
        .ok_or_else(|| DbError::Decode(format!("time window minute out of range: {minutes}")))
}

fn time_to_minutes(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

fn parse_window(start: Option<u32>, end: Option<u32>) -> Result<Option<TimeWindow>, DbError> {
    match (start, end) {
        (Some(s), Some(e)) => Ok(Some(TimeWindow::new(
            minutes_to_time(s)?,
            minutes_to_time(e)?,
        ))),
        (None, None) => Ok(None),
        _ => Err(DbError::Decode("half-open time window".into())),
    }
}

fn parse_days(days: &[String]) -> Result<Vec<Weekday>, DbError> {
    days.iter()
        .map(|d| {
            d.parse::<Weekday>()
                .map_err(|_| DbError::Decode(format!("unknown weekday: {d}")))
        })
        .collect()
}

fn days_to_strings(days: &[Weekday]) -> Vec<String> {
    days.iter().map(ToString::to_string).collect()
}

fn zones_to_string(zone_id: Option<Uuid>) -> Option<String> {
    zone_id.map(|z| z.to_string())
}

impl RuleRow {
    fn into_rule(self, id: Uuid) -> Result<AccessRule, DbError> {
        Ok(AccessRule {
            id,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            name: self.name,
            zone_id: parse_opt_uuid("zone", self.zone_id.as_deref())?,
            membership_types: self.membership_types,
            plan_types: self.plan_types,
            roles: self.roles,
            time_window: parse_window(self.window_start_min, self.window_end_min)?,
            allowed_days: parse_days(&self.allowed_days)?,
            max_occupancy: self.max_occupancy,
            requires_approval: self.requires_approval,
            priority: self.priority,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl RuleRowWithId {
    fn try_into_rule(self) -> Result<AccessRule, DbError> {
        let id = parse_uuid("rule", &self.record_id)?;
        RuleRow {
            tenant_id: self.tenant_id,
            name: self.name,
            zone_id: self.zone_id,
            membership_types: self.membership_types,
            plan_types: self.plan_types,
            roles: self.roles,
            window_start_min: self.window_start_min,
            window_end_min: self.window_end_min,
            allowed_days: self.allowed_days,
            max_occupancy: self.max_occupancy,
            requires_approval: self.requires_approval,
            priority: self.priority,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_rule(id)
    }
}

/// SurrealDB implementation of the AccessRule repository.
#[derive(Clone)]
pub struct SurrealAccessRuleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAccessRuleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AccessRuleRepository for SurrealAccessRuleRepository<C> {
    async fn create(&self, input: CreateAccessRule) -> WardenResult<AccessRule> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('access_rule', $id) SET \
                 tenant_id = $tenant_id, \
                 name = $name, \
                 zone_id = $zone_id, \
                 membership_types = $membership_types, \
                 plan_types = $plan_types, \
                 roles = $roles, \
                 window_start_min = $window_start_min, \
                 window_end_min = $window_end_min, \
                 allowed_days = $allowed_days, \
                 max_occupancy = $max_occupancy, \
                 requires_approval = $requires_approval, \
                 priority = $priority, \
                 valid_from = $valid_from, \
                 valid_until = $valid_until, \
                 active = true",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("name", input.name))
            .bind(("zone_id", zones_to_string(input.zone_id)))
            .bind(("membership_types", input.membership_types))
            .bind(("plan_types", input.plan_types))
            .bind(("roles", input.roles))
            .bind((
                "window_start_min",
                input.time_window.map(|w| time_to_minutes(w.start)),
            ))
            .bind((
                "window_end_min",
                input.time_window.map(|w| time_to_minutes(w.end)),
            ))
            .bind(("allowed_days", days_to_strings(&input.allowed_days)))
            .bind(("max_occupancy", input.max_occupancy))
            .bind(("requires_approval", input.requires_approval))
            .bind(("priority", input.priority))
            .bind(("valid_from", input.valid_from))
            .bind(("valid_until", input.valid_until))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(DbError::query)?;

        let rows: Vec<RuleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "access_rule".into(),
            id: id_str,
        })?;

        Ok(row.into_rule(id)?)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> WardenResult<AccessRule> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('access_rule', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RuleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "access_rule".into(),
            id: id_str,
        })?;

        Ok(row.into_rule(id)?)
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateAccessRule,
    ) -> WardenResult<AccessRule> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.zone_id.is_some() {
            sets.push("zone_id = $zone_id");
        }
        if input.membership_types.is_some() {
            sets.push("membership_types = $membership_types");
        }
        if input.plan_types.is_some() {
            sets.push("plan_types = $plan_types");
        }
        if input.roles.is_some() {
            sets.push("roles = $roles");
        }
        if input.time_window.is_some() {
            sets.push("window_start_min = $window_start_min");
            sets.push("window_end_min = $window_end_min");
        }
        if input.allowed_days.is_some() {
            sets.push("allowed_days = $allowed_days");
        }
        if input.max_occupancy.is_some() {
            sets.push("max_occupancy = $max_occupancy");
        }
        if input.requires_approval.is_some() {
            sets.push("requires_approval = $requires_approval");
        }
        if input.priority.is_some() {
            sets.push("priority = $priority");
        }
        if input.valid_from.is_some() {
            sets.push("valid_from = $valid_from");
        }
        if input.valid_until.is_some() {
            sets.push("valid_until = $valid_until");
        }
        if input.active.is_some() {
            sets.push("active = $active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('access_rule', $id) SET {} \
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
        if let Some(zone_id) = input.zone_id {
            builder = builder.bind(("zone_id", zones_to_string(zone_id)));
        }
        if let Some(membership_types) = input.membership_types {
            builder = builder.bind(("membership_types", membership_types));
        }
        if let Some(plan_types) = input.plan_types {
            builder = builder.bind(("plan_types", plan_types));
        }
        if let Some(roles) = input.roles {
            builder = builder.bind(("roles", roles));
        }
        if let Some(window) = input.time_window {
            builder = builder
                .bind(("window_start_min", window.map(|w| time_to_minutes(w.start))))
                .bind(("window_end_min", window.map(|w| time_to_minutes(w.end))));
        }
        if let Some(ref days) = input.allowed_days {
            builder = builder.bind(("allowed_days", days_to_strings(days)));
        }
        if let Some(max_occupancy) = input.max_occupancy {
            builder = builder.bind(("max_occupancy", max_occupancy));
        }
        if let Some(requires_approval) = input.requires_approval {
            builder = builder.bind(("requires_approval", requires_approval));
        }
        if let Some(priority) = input.priority {
            builder = builder.bind(("priority", priority));
        }
        if let Some(valid_from) = input.valid_from {
            builder = builder.bind(("valid_from", valid_from));
        }
        if let Some(valid_until) = input.valid_until {
            builder = builder.bind(("valid_until", valid_until));
        }
        if let Some(active) = input.active {
            builder = builder.bind(("active", active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(DbError::query)?;

        let rows: Vec<RuleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "access_rule".into(),
            id: id_str,
        })?;

        Ok(row.into_rule(id)?)
    }

    async fn deactivate(&self, tenant_id: Uuid, id: Uuid) -> WardenResult<()> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "UPDATE type::record('access_rule', $id) SET \
                 active = false, updated_at = time::now() \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RuleRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "access_rule".into(),
                id: id_str,
            }
            .into());
        }

        Ok(())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<AccessRule>> {
        let tenant_id_str = tenant_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM access_rule \
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
                "SELECT meta::id(id) AS record_id, * FROM access_rule \
                 WHERE tenant_id = $tenant_id \
                 ORDER BY priority DESC, created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("tenant_id", tenant_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RuleRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(RuleRowWithId::try_into_rule)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn get_active_rules(
        &self,
        tenant_id: Uuid,
        zone_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> WardenResult<Vec<AccessRule>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM access_rule \
                 WHERE tenant_id = $tenant_id AND active = true \
                 ORDER BY priority DESC, created_at ASC",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RuleRowWithId> = result.take(0).map_err(DbError::from)?;
        let mut rules = rows
            .into_iter()
            .map(RuleRowWithId::try_into_rule)
            .collect::<Result<Vec<_>, DbError>>()?;

        // Zone targeting and validity windows are cheap to evaluate here
        // and keep NONE-comparison semantics out of the query.
        rules.retain(|rule| rule.targets(zone_id) && rule.is_in_effect(now));
        rules.sort_by_key(|rule| std::cmp::Reverse(rule.priority));

        Ok(rules)
    }
}

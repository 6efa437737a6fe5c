//! SurrealDB implementation of [`ScanAuditRepository`].
//!
//! Scan attempts are insert-only. Violations are insert-only except for
//! the resolution fields.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::audit::{
    CreateScanAttempt, CreateViolation, DeviceInfo, ScanAttempt, ScanOutcome, ScanReason,
    Severity, Violation, ViolationType,
};
use warden_core::models::subject::SubjectRef;
use warden_core::repository::{
    PaginatedResult, Pagination, ScanAttemptFilter, ScanAuditRepository, ViolationFilter,
};

use super::CountRow;
use crate::error::{DbError, parse_opt_uuid, parse_uuid};

// -----------------------------------------------------------------------
// Enum <-> column conversions
// -----------------------------------------------------------------------

fn outcome_to_string(outcome: ScanOutcome) -> &'static str {
    match outcome {
        ScanOutcome::Success => "Success",
        ScanOutcome::Expired => "Expired",
        ScanOutcome::Invalid => "Invalid",
        ScanOutcome::Denied => "Denied",
        ScanOutcome::Restricted => "Restricted",
        ScanOutcome::CapacityFull => "CapacityFull",
    }
}

fn parse_outcome(s: &str) -> Result<ScanOutcome, DbError> {
    match s {
        "Success" => Ok(ScanOutcome::Success),
        "Expired" => Ok(ScanOutcome::Expired),
        "Invalid" => Ok(ScanOutcome::Invalid),
        "Denied" => Ok(ScanOutcome::Denied),
        "Restricted" => Ok(ScanOutcome::Restricted),
        "CapacityFull" => Ok(ScanOutcome::CapacityFull),
        other => Err(DbError::Decode(format!("unknown scan outcome: {other}"))),
    }
}

fn violation_type_to_string(t: ViolationType) -> &'static str {
    match t {
        ViolationType::ExpiredCredential => "ExpiredCredential",
        ViolationType::InvalidCredential => "InvalidCredential",
        ViolationType::UnauthorizedZone => "UnauthorizedZone",
        ViolationType::CapacityExceeded => "CapacityExceeded",
        ViolationType::MultipleEntries => "MultipleEntries",
    }
}

fn parse_violation_type(s: &str) -> Result<ViolationType, DbError> {
    match s {
        "ExpiredCredential" => Ok(ViolationType::ExpiredCredential),
        "InvalidCredential" => Ok(ViolationType::InvalidCredential),
        "UnauthorizedZone" => Ok(ViolationType::UnauthorizedZone),
        "CapacityExceeded" => Ok(ViolationType::CapacityExceeded),
        "MultipleEntries" => Ok(ViolationType::MultipleEntries),
        other => Err(DbError::Decode(format!("unknown violation type: {other}"))),
    }
}

fn severity_to_string(s: Severity) -> &'static str {
    match s {
        Severity::Low => "Low",
        Severity::Medium => "Medium",
        Severity::High => "High",
        Severity::Critical => "Critical",
    }
}

/// Numeric rank stored next to the severity for `>=` filtering.
fn severity_rank(s: Severity) -> i64 {
    match s {
        Severity::Low => 0,
        Severity::Medium => 1,
        Severity::High => 2,
        Severity::Critical => 3,
    }
}

fn parse_severity(s: &str) -> Result<Severity, DbError> {
    match s {
        "Low" => Ok(Severity::Low),
        "Medium" => Ok(Severity::Medium),
        "High" => Ok(Severity::High),
        "Critical" => Ok(Severity::Critical),
        other => Err(DbError::Decode(format!("unknown severity: {other}"))),
    }
}

fn parse_subject(value: Option<String>) -> Result<Option<SubjectRef>, DbError> {
    value
        .map(|s| s.parse().map_err(|e: String| DbError::Decode(e)))
        .transpose()
}

// -----------------------------------------------------------------------
// Rows
// -----------------------------------------------------------------------

#[derive(Debug, SurrealValue)]
struct ScanAttemptRow {
    tenant_id: String,
    credential_id: Option<String>,
    subject: Option<String>,
    zone_id: Option<String>,
    device_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    outcome: String,
    reason: String,
    message: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct ScanAttemptRowWithId {
    record_id: String,
    tenant_id: String,
    credential_id: Option<String>,
    subject: Option<String>,
    zone_id: Option<String>,
    device_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    outcome: String,
    reason: String,
    message: String,
    timestamp: DateTime<Utc>,
}

impl ScanAttemptRow {
    fn into_scan_attempt(self, id: Uuid) -> Result<ScanAttempt, DbError> {
        Ok(ScanAttempt {
            id,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            credential_id: parse_opt_uuid("credential", self.credential_id.as_deref())?,
            subject: parse_subject(self.subject)?,
            zone_id: parse_opt_uuid("zone", self.zone_id.as_deref())?,
            device: DeviceInfo {
                device_id: self.device_id,
                ip_address: self.ip_address,
                user_agent: self.user_agent,
            },
            outcome: parse_outcome(&self.outcome)?,
            reason: ScanReason::parse(&self.reason)
                .ok_or_else(|| DbError::Decode(format!("unknown scan reason: {}", self.reason)))?,
            message: self.message,
            timestamp: self.timestamp,
        })
    }
}

impl ScanAttemptRowWithId {
    fn try_into_scan_attempt(self) -> Result<ScanAttempt, DbError> {
        let id = parse_uuid("scan_attempt", &self.record_id)?;
        ScanAttemptRow {
            tenant_id: self.tenant_id,
            credential_id: self.credential_id,
            subject: self.subject,
            zone_id: self.zone_id,
            device_id: self.device_id,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            outcome: self.outcome,
            reason: self.reason,
            message: self.message,
            timestamp: self.timestamp,
        }
        .into_scan_attempt(id)
    }
}

#[derive(Debug, SurrealValue)]
struct ViolationRow {
    tenant_id: String,
    credential_id: Option<String>,
    subject: Option<String>,
    violation_type: String,
    severity: String,
    description: String,
    zone_id: Option<String>,
    metadata: serde_json::Value,
    resolved: bool,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct ViolationRowWithId {
    record_id: String,
    tenant_id: String,
    credential_id: Option<String>,
    subject: Option<String>,
    violation_type: String,
    severity: String,
    description: String,
    zone_id: Option<String>,
    metadata: serde_json::Value,
    resolved: bool,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    timestamp: DateTime<Utc>,
}

impl ViolationRow {
    fn into_violation(self, id: Uuid) -> Result<Violation, DbError> {
        Ok(Violation {
            id,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            credential_id: parse_opt_uuid("credential", self.credential_id.as_deref())?,
            subject: parse_subject(self.subject)?,
            violation_type: parse_violation_type(&self.violation_type)?,
            severity: parse_severity(&self.severity)?,
            description: self.description,
            zone_id: parse_opt_uuid("zone", self.zone_id.as_deref())?,
            metadata: self.metadata,
            resolved: self.resolved,
            resolved_by: parse_opt_uuid("resolved_by", self.resolved_by.as_deref())?,
            resolved_at: self.resolved_at,
            timestamp: self.timestamp,
        })
    }
}

impl ViolationRowWithId {
    fn try_into_violation(self) -> Result<Violation, DbError> {
        let id = parse_uuid("violation", &self.record_id)?;
        ViolationRow {
            tenant_id: self.tenant_id,
            credential_id: self.credential_id,
            subject: self.subject,
            violation_type: self.violation_type,
            severity: self.severity,
            description: self.description,
            zone_id: self.zone_id,
            metadata: self.metadata,
            resolved: self.resolved,
            resolved_by: self.resolved_by,
            resolved_at: self.resolved_at,
            timestamp: self.timestamp,
        }
        .into_violation(id)
    }
}

/// SurrealDB implementation of the scan audit repository.
#[derive(Clone)]
pub struct SurrealScanAuditRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealScanAuditRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

/// Build the WHERE clause for a scan-attempt query. Every placeholder
/// it references is bound by the caller from the same filter.
fn scan_attempt_conditions(filter: &ScanAttemptFilter) -> String {
    let mut conditions = vec!["tenant_id = $tenant_id"];
    if filter.credential_id.is_some() {
        conditions.push("credential_id = $credential_id");
    }
    if filter.zone_id.is_some() {
        conditions.push("zone_id = $zone_id");
    }
    if filter.outcome.is_some() {
        conditions.push("outcome = $outcome");
    }
    if filter.from.is_some() {
        conditions.push("timestamp >= $from");
    }
    if filter.to.is_some() {
        conditions.push("timestamp < $to");
    }
    conditions.join(" AND ")
}

fn violation_conditions(filter: &ViolationFilter) -> String {
    let mut conditions = vec!["tenant_id = $tenant_id"];
    if filter.violation_type.is_some() {
        conditions.push("violation_type = $violation_type");
    }
    if filter.min_severity.is_some() {
        conditions.push("severity_rank >= $min_rank");
    }
    if filter.resolved.is_some() {
        conditions.push("resolved = $resolved");
    }
    if filter.from.is_some() {
        conditions.push("timestamp >= $from");
    }
    if filter.to.is_some() {
        conditions.push("timestamp < $to");
    }
    conditions.join(" AND ")
}

impl<C: Connection> ScanAuditRepository for SurrealScanAuditRepository<C> {
    async fn append_scan_attempt(&self, input: CreateScanAttempt) -> WardenResult<ScanAttempt> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('scan_attempt', $id) SET \
                 tenant_id = $tenant_id, \
                 credential_id = $credential_id, \
                 subject = $subject, \
                 zone_id = $zone_id, \
                 device_id = $device_id, \
                 ip_address = $ip_address, \
                 user_agent = $user_agent, \
                 outcome = $outcome, \
                 reason = $reason, \
                 message = $message, \
                 timestamp = $timestamp",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("credential_id", input.credential_id.map(|c| c.to_string())))
            .bind(("subject", input.subject.map(|s| s.to_string())))
            .bind(("zone_id", input.zone_id.map(|z| z.to_string())))
            .bind(("device_id", input.device.device_id))
            .bind(("ip_address", input.device.ip_address))
            .bind(("user_agent", input.device.user_agent))
            .bind((
                "outcome",
                outcome_to_string(input.reason.outcome()).to_string(),
            ))
            .bind(("reason", input.reason.as_str().to_string()))
            .bind(("message", input.message))
            .bind(("timestamp", input.timestamp))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(DbError::query)?;

        let rows: Vec<ScanAttemptRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "scan_attempt".into(),
            id: id_str,
        })?;

        Ok(row.into_scan_attempt(id)?)
    }

    async fn append_violation(&self, input: CreateViolation) -> WardenResult<Violation> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let metadata = input
            .metadata
            .unwrap_or(serde_json::Value::Object(Default::default()));

        let result = self
            .db
            .query(
                "CREATE type::record('violation', $id) SET \
                 tenant_id = $tenant_id, \
                 credential_id = $credential_id, \
                 subject = $subject, \
                 violation_type = $violation_type, \
                 severity = $severity, \
                 severity_rank = $severity_rank, \
                 description = $description, \
                 zone_id = $zone_id, \
                 metadata = $metadata, \
                 resolved = false, \
                 timestamp = $timestamp",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("credential_id", input.credential_id.map(|c| c.to_string())))
            .bind(("subject", input.subject.map(|s| s.to_string())))
            .bind((
                "violation_type",
                violation_type_to_string(input.violation_type).to_string(),
            ))
            .bind(("severity", severity_to_string(input.severity).to_string()))
            .bind(("severity_rank", severity_rank(input.severity)))
            .bind(("description", input.description))
            .bind(("zone_id", input.zone_id.map(|z| z.to_string())))
            .bind(("metadata", metadata))
            .bind(("timestamp", input.timestamp))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(DbError::query)?;

        let rows: Vec<ViolationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "violation".into(),
            id: id_str,
        })?;

        Ok(row.into_violation(id)?)
    }

    async fn list_scan_attempts(
        &self,
        tenant_id: Uuid,
        filter: ScanAttemptFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<ScanAttempt>> {
        let conditions = scan_attempt_conditions(&filter);
        let query = format!(
            "SELECT count() AS total FROM scan_attempt WHERE {conditions} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM scan_attempt \
             WHERE {conditions} \
             ORDER BY timestamp DESC \
             LIMIT $limit START $offset;"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));

        if let Some(credential_id) = filter.credential_id {
            builder = builder.bind(("credential_id", credential_id.to_string()));
        }
        if let Some(zone_id) = filter.zone_id {
            builder = builder.bind(("zone_id", zone_id.to_string()));
        }
        if let Some(outcome) = filter.outcome {
            builder = builder.bind(("outcome", outcome_to_string(outcome).to_string()));
        }
        if let Some(from) = filter.from {
            builder = builder.bind(("from", from));
        }
        if let Some(to) = filter.to {
            builder = builder.bind(("to", to));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let rows: Vec<ScanAttemptRowWithId> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(ScanAttemptRowWithId::try_into_scan_attempt)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_violations(
        &self,
        tenant_id: Uuid,
        filter: ViolationFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<Violation>> {
        let conditions = violation_conditions(&filter);
        let query = format!(
            "SELECT count() AS total FROM violation WHERE {conditions} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM violation \
             WHERE {conditions} \
             ORDER BY timestamp DESC \
             LIMIT $limit START $offset;"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));

        if let Some(violation_type) = filter.violation_type {
            builder = builder.bind((
                "violation_type",
                violation_type_to_string(violation_type).to_string(),
            ));
        }
        if let Some(min_severity) = filter.min_severity {
            builder = builder.bind(("min_rank", severity_rank(min_severity)));
        }
        if let Some(resolved) = filter.resolved {
            builder = builder.bind(("resolved", resolved));
        }
        if let Some(from) = filter.from {
            builder = builder.bind(("from", from));
        }
        if let Some(to) = filter.to {
            builder = builder.bind(("to", to));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let rows: Vec<ViolationRowWithId> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(ViolationRowWithId::try_into_violation)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn resolve_violation(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        resolved_by: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> WardenResult<Violation> {
        let id_str = id.to_string();

        // Only the first resolution is recorded; later calls read back
        // the existing row unchanged.
        let result = self
            .db
            .query(
                "UPDATE type::record('violation', $id) SET \
                 resolved = true, \
                 resolved_by = $resolved_by, \
                 resolved_at = $resolved_at \
                 WHERE tenant_id = $tenant_id AND resolved = false; \
                 SELECT * FROM type::record('violation', $id) \
                 WHERE tenant_id = $tenant_id;",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("resolved_by", resolved_by.to_string()))
            .bind(("resolved_at", resolved_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(DbError::query)?;

        let rows: Vec<ViolationRow> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "violation".into(),
            id: id_str,
        })?;

        Ok(row.into_violation(id)?)
    }
}

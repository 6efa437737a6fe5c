//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async and tenant-scoped: every call
//! takes a `tenant_id` and never returns another tenant's rows.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::WardenResult;
use crate::models::{
    audit::{
        CreateScanAttempt, CreateViolation, ScanAttempt, ScanOutcome, Severity, Violation,
        ViolationType,
    },
    credential::{CreateCredential, Credential, CredentialStatus},
    occupancy::OccupancySnapshot,
    rule::{AccessRule, CreateAccessRule, UpdateAccessRule},
    subject::{SubjectProfile, SubjectRef, UpsertSubjectProfile},
    zone::{CreateZone, UpdateZone, Zone},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Zones & rules (read-mostly)
// ---------------------------------------------------------------------------

pub trait ZoneRepository: Send + Sync {
    fn create(&self, input: CreateZone) -> impl Future<Output = WardenResult<Zone>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = WardenResult<Zone>> + Send;
    fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateZone,
    ) -> impl Future<Output = WardenResult<Zone>> + Send;
    fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<Zone>>> + Send;
}

pub trait AccessRuleRepository: Send + Sync {
    fn create(
        &self,
        input: CreateAccessRule,
    ) -> impl Future<Output = WardenResult<AccessRule>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = WardenResult<AccessRule>> + Send;
    fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateAccessRule,
    ) -> impl Future<Output = WardenResult<AccessRule>> + Send;
    /// Soft-delete: sets `active` to false.
    fn deactivate(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = WardenResult<()>> + Send;
    fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<AccessRule>>> + Send;

    /// Active rules targeting `zone_id` or all zones whose validity
    /// window contains `now`, ordered by priority descending.
    fn get_active_rules(
        &self,
        tenant_id: Uuid,
        zone_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<Vec<AccessRule>>> + Send;
}

// ---------------------------------------------------------------------------
// Credentials (mutable shared state)
// ---------------------------------------------------------------------------

pub trait CredentialRepository: Send + Sync {
    fn create(
        &self,
        input: CreateCredential,
    ) -> impl Future<Output = WardenResult<Credential>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = WardenResult<Credential>> + Send;

    /// Commit one successful scan as a single conditional update.
    ///
    /// Applies only if the stored status and scan count still equal
    /// the expected values; sets the count to `expected_scan_count + 1`,
    /// the status to `next_status` and `last_used_at` to `used_at`.
    /// Returns `None` on conflict.
    fn record_scan(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        expected_status: CredentialStatus,
        expected_scan_count: u32,
        next_status: CredentialStatus,
        used_at: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<Option<Credential>>> + Send;

    /// Move the credential from `from` to `to` if it is still in `from`.
    /// Returns `None` when the stored status differs.
    fn transition_status(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        from: CredentialStatus,
        to: CredentialStatus,
    ) -> impl Future<Output = WardenResult<Option<Credential>>> + Send;

    /// Revoke an `Active` credential. Returns `None` when the credential
    /// is no longer active.
    fn revoke(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        revoked_by: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<Option<Credential>>> + Send;

    fn list_by_subject(
        &self,
        tenant_id: Uuid,
        subject: SubjectRef,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<Credential>>> + Send;
}

// ---------------------------------------------------------------------------
// Occupancy (mutable shared state)
// ---------------------------------------------------------------------------

pub trait OccupancyRepository: Send + Sync {
    /// Fetch the snapshot for a zone, creating it with a zero count if
    /// absent. `max_capacity` is refreshed on every call.
    fn get_or_create(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        max_capacity: u32,
        now: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<OccupancySnapshot>> + Send;

    /// Atomically add `delta` to the count, flooring at zero. Positive
    /// deltas stamp `last_entry_at` and raise the peak; negative deltas
    /// stamp `last_exit_at`.
    fn apply_delta(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        delta: i32,
        max_capacity: u32,
        at: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<OccupancySnapshot>> + Send;

    /// Atomically increment the count only while it is below `capacity`.
    /// Returns `None` when the zone is full.
    fn try_increment(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        capacity: u32,
        at: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<Option<OccupancySnapshot>>> + Send;

    fn list(
        &self,
        tenant_id: Uuid,
        zone_id: Option<Uuid>,
    ) -> impl Future<Output = WardenResult<Vec<OccupancySnapshot>>> + Send;

    /// Set every peak of the tenant to its current count. Returns the
    /// number of snapshots touched.
    fn reset_peaks(
        &self,
        tenant_id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<u64>> + Send;

    /// Tenants that currently have occupancy rows.
    fn tenants(&self) -> impl Future<Output = WardenResult<Vec<Uuid>>> + Send;
}

// ---------------------------------------------------------------------------
// Subject profiles (owned by the membership system)
// ---------------------------------------------------------------------------

pub trait SubjectProfileRepository: Send + Sync {
    /// Returns `None` when no profile is stored for the subject.
    fn get(
        &self,
        tenant_id: Uuid,
        subject: SubjectRef,
    ) -> impl Future<Output = WardenResult<Option<SubjectProfile>>> + Send;
    fn upsert(
        &self,
        tenant_id: Uuid,
        subject: SubjectRef,
        input: UpsertSubjectProfile,
    ) -> impl Future<Output = WardenResult<SubjectProfile>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only, tenant-scoped)
// ---------------------------------------------------------------------------

/// Query filters for scan attempts.
#[derive(Debug, Clone, Default)]
pub struct ScanAttemptFilter {
    pub credential_id: Option<Uuid>,
    pub zone_id: Option<Uuid>,
    pub outcome: Option<ScanOutcome>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Query filters for violations.
#[derive(Debug, Clone, Default)]
pub struct ViolationFilter {
    pub violation_type: Option<ViolationType>,
    pub min_severity: Option<Severity>,
    pub resolved: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub trait ScanAuditRepository: Send + Sync {
    /// Append a scan attempt. No update or delete operations exist.
    fn append_scan_attempt(
        &self,
        input: CreateScanAttempt,
    ) -> impl Future<Output = WardenResult<ScanAttempt>> + Send;
    fn append_violation(
        &self,
        input: CreateViolation,
    ) -> impl Future<Output = WardenResult<Violation>> + Send;
    fn list_scan_attempts(
        &self,
        tenant_id: Uuid,
        filter: ScanAttemptFilter,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<ScanAttempt>>> + Send;
    fn list_violations(
        &self,
        tenant_id: Uuid,
        filter: ViolationFilter,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<Violation>>> + Send;
    /// The only mutation allowed on a violation.
    fn resolve_violation(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        resolved_by: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<Violation>> + Send;
}

// ---------------------------------------------------------------------------
// Store bundle
// ---------------------------------------------------------------------------

/// Everything the access engine reads and writes, bundled so that
/// services stay generic over a single type parameter.
pub trait AccessStore: Send + Sync {
    type Credentials: CredentialRepository;
    type Zones: ZoneRepository;
    type Rules: AccessRuleRepository;
    type Occupancy: OccupancyRepository;
    type Subjects: SubjectProfileRepository;
    type Audit: ScanAuditRepository;

    fn credentials(&self) -> &Self::Credentials;
    fn zones(&self) -> &Self::Zones;
    fn rules(&self) -> &Self::Rules;
    fn occupancy(&self) -> &Self::Occupancy;
    fn subjects(&self) -> &Self::Subjects;
    fn audit(&self) -> &Self::Audit;
}

//! Scan audit trail and violation recording.
//!
//! Recording is best-effort: a storage failure is logged and never
//! changes a decision that has already been made.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::audit::{
    CreateScanAttempt, CreateViolation, DeviceInfo, ScanAttempt, ScanReason, Severity, Violation,
    ViolationType,
};
use warden_core::models::subject::SubjectRef;
use warden_core::repository::{
    AccessStore, PaginatedResult, Pagination, ScanAttemptFilter, ScanAuditRepository,
    ViolationFilter,
};

use crate::service::AccessService;

/// Violation type and severity recorded for a denied scan.
///
/// `None` for grants and for system errors, which are not security
/// events.
pub fn classify(reason: ScanReason) -> Option<(ViolationType, Severity)> {
    let entry = match reason {
        ScanReason::Granted | ScanReason::SystemError => return None,
        ScanReason::Expired => (ViolationType::ExpiredCredential, Severity::Medium),
        ScanReason::NotYetValid => (ViolationType::ExpiredCredential, Severity::Low),
        ScanReason::Invalid | ScanReason::Revoked => {
            (ViolationType::InvalidCredential, Severity::High)
        }
        ScanReason::Declined | ScanReason::Cancelled => {
            (ViolationType::InvalidCredential, Severity::Medium)
        }
        ScanReason::UsedUp => (ViolationType::MultipleEntries, Severity::Medium),
        ScanReason::Restricted => (ViolationType::UnauthorizedZone, Severity::High),
        ScanReason::Denied => (ViolationType::UnauthorizedZone, Severity::Medium),
        ScanReason::CapacityFull => (ViolationType::CapacityExceeded, Severity::Low),
    };
    Some(entry)
}

/// One scan outcome, as handed to the recorder by the verifier.
#[derive(Debug, Clone)]
pub(crate) struct ScanRecord<'a> {
    pub tenant_id: Uuid,
    pub credential_id: Option<Uuid>,
    pub subject: Option<SubjectRef>,
    pub zone_id: Option<Uuid>,
    pub device: &'a DeviceInfo,
    pub reason: ScanReason,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl<S: AccessStore> AccessService<S> {
    /// Append a scan attempt. Returns `None` if it could not be stored.
    pub async fn record_attempt(&self, input: CreateScanAttempt) -> Option<ScanAttempt> {
        let tenant_id = input.tenant_id;
        let reason = input.reason;
        match self
            .bounded(
                "append_scan_attempt",
                self.store.audit().append_scan_attempt(input),
            )
            .await
        {
            Ok(attempt) => Some(attempt),
            Err(e) => {
                error!(%tenant_id, reason = reason.as_str(), error = %e, "Failed to record scan attempt");
                None
            }
        }
    }

    /// Append a violation. Returns `None` if it could not be stored.
    pub async fn record_violation(&self, input: CreateViolation) -> Option<Violation> {
        let tenant_id = input.tenant_id;
        let violation_type = input.violation_type;
        match self
            .bounded("append_violation", self.store.audit().append_violation(input))
            .await
        {
            Ok(violation) => Some(violation),
            Err(e) => {
                error!(%tenant_id, ?violation_type, error = %e, "Failed to record violation");
                None
            }
        }
    }

    /// Audit one scan outcome: always a scan attempt, plus a violation
    /// for classified denials.
    pub(crate) async fn audit_scan(&self, record: ScanRecord<'_>) {
        if record.reason == ScanReason::Invalid {
            warn!(
                tenant_id = %record.tenant_id,
                severity = "HIGH",
                device_id = record.device.device_id.as_deref(),
                ip_address = record.device.ip_address.as_deref(),
                detail = %record.message,
                "Security event: invalid credential presented"
            );
        }

        self.record_attempt(CreateScanAttempt {
            tenant_id: record.tenant_id,
            credential_id: record.credential_id,
            subject: record.subject,
            zone_id: record.zone_id,
            device: record.device.clone(),
            reason: record.reason,
            message: record.message.clone(),
            timestamp: record.at,
        })
        .await;

        let Some((violation_type, severity)) = classify(record.reason) else {
            return;
        };
        self.record_violation(CreateViolation {
            tenant_id: record.tenant_id,
            credential_id: record.credential_id,
            subject: record.subject,
            violation_type,
            severity,
            description: record.message,
            zone_id: record.zone_id,
            metadata: Some(json!({
                "reason": record.reason.as_str(),
                "device_id": record.device.device_id,
                "ip_address": record.device.ip_address,
            })),
            timestamp: record.at,
        })
        .await;
    }

    pub async fn list_scan_attempts(
        &self,
        tenant_id: Uuid,
        filter: ScanAttemptFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<ScanAttempt>> {
        self.bounded(
            "list_scan_attempts",
            self.store
                .audit()
                .list_scan_attempts(tenant_id, filter, pagination),
        )
        .await
    }

    pub async fn list_violations(
        &self,
        tenant_id: Uuid,
        filter: ViolationFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<Violation>> {
        self.bounded(
            "list_violations",
            self.store
                .audit()
                .list_violations(tenant_id, filter, pagination),
        )
        .await
    }

    /// Mark a violation as reviewed. Resolving twice keeps the first
    /// resolver.
    pub async fn resolve_violation(
        &self,
        tenant_id: Uuid,
        violation_id: Uuid,
        resolved_by: Uuid,
    ) -> WardenResult<Violation> {
        self.bounded(
            "resolve_violation",
            self.store
                .audit()
                .resolve_violation(tenant_id, violation_id, resolved_by, Utc::now()),
        )
        .await
    }
}

//! Scan audit and violation domain models.
//!
//! Both record types are append-only. Violations may only be marked
//! as resolved after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::subject::SubjectRef;

/// Why a scan was granted or denied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScanReason {
    Granted,
    Invalid,
    Expired,
    NotYetValid,
    UsedUp,
    Revoked,
    Declined,
    Cancelled,
    Restricted,
    Denied,
    CapacityFull,
    SystemError,
}

impl ScanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanReason::Granted => "granted",
            ScanReason::Invalid => "invalid",
            ScanReason::Expired => "expired",
            ScanReason::NotYetValid => "not_yet_valid",
            ScanReason::UsedUp => "used_up",
            ScanReason::Revoked => "revoked",
            ScanReason::Declined => "declined",
            ScanReason::Cancelled => "cancelled",
            ScanReason::Restricted => "restricted",
            ScanReason::Denied => "denied",
            ScanReason::CapacityFull => "capacity_full",
            ScanReason::SystemError => "system_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "granted" => Some(ScanReason::Granted),
            "invalid" => Some(ScanReason::Invalid),
            "expired" => Some(ScanReason::Expired),
            "not_yet_valid" => Some(ScanReason::NotYetValid),
            "used_up" => Some(ScanReason::UsedUp),
            "revoked" => Some(ScanReason::Revoked),
            "declined" => Some(ScanReason::Declined),
            "cancelled" => Some(ScanReason::Cancelled),
            "restricted" => Some(ScanReason::Restricted),
            "denied" => Some(ScanReason::Denied),
            "capacity_full" => Some(ScanReason::CapacityFull),
            "system_error" => Some(ScanReason::SystemError),
            _ => None,
        }
    }

    /// Coarse outcome stored on the scan attempt row.
    pub fn outcome(&self) -> ScanOutcome {
        match self {
            ScanReason::Granted => ScanOutcome::Success,
            ScanReason::Expired | ScanReason::NotYetValid => ScanOutcome::Expired,
            ScanReason::Invalid => ScanOutcome::Invalid,
            ScanReason::Restricted => ScanOutcome::Restricted,
            ScanReason::CapacityFull => ScanOutcome::CapacityFull,
            ScanReason::UsedUp
            | ScanReason::Revoked
            | ScanReason::Declined
            | ScanReason::Cancelled
            | ScanReason::Denied
            | ScanReason::SystemError => ScanOutcome::Denied,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScanOutcome {
    Success,
    Expired,
    Invalid,
    Denied,
    Restricted,
    CapacityFull,
}

/// Reader-supplied information about the scanning device.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanAttempt {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// `None` when the payload could not be resolved to a credential.
    pub credential_id: Option<Uuid>,
    pub subject: Option<SubjectRef>,
    pub zone_id: Option<Uuid>,
    pub device: DeviceInfo,
    pub outcome: ScanOutcome,
    pub reason: ScanReason,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScanAttempt {
    pub tenant_id: Uuid,
    pub credential_id: Option<Uuid>,
    pub subject: Option<SubjectRef>,
    pub zone_id: Option<Uuid>,
    pub device: DeviceInfo,
    pub reason: ScanReason,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ViolationType {
    ExpiredCredential,
    InvalidCredential,
    UnauthorizedZone,
    CapacityExceeded,
    /// Replay of a credential whose quota is already consumed.
    MultipleEntries,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub credential_id: Option<Uuid>,
    pub subject: Option<SubjectRef>,
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub description: String,
    pub zone_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub resolved: bool,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateViolation {
    pub tenant_id: Uuid,
    pub credential_id: Option<Uuid>,
    pub subject: Option<SubjectRef>,
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub description: String,
    pub zone_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

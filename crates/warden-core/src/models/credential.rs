//! Access credential domain model.
//!
//! A credential is a signed, time-bound and optionally quota-limited
//! grant of access, presented to readers as a QR payload. Credentials
//! are never deleted; they end in one of the terminal statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::subject::SubjectRef;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CredentialKind {
    Member,
    Visitor,
    Temporary,
    RoomAccess,
}

/// Lifecycle status of a credential.
///
/// `Active` is the only non-terminal status. Every transition starts
/// from `Active`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CredentialStatus {
    Active,
    Expired,
    UsedUp,
    Revoked,
    Declined,
    Cancelled,
}

impl CredentialStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CredentialStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "Active",
            CredentialStatus::Expired => "Expired",
            CredentialStatus::UsedUp => "UsedUp",
            CredentialStatus::Revoked => "Revoked",
            CredentialStatus::Declined => "Declined",
            CredentialStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(CredentialStatus::Active),
            "Expired" => Some(CredentialStatus::Expired),
            "UsedUp" => Some(CredentialStatus::UsedUp),
            "Revoked" => Some(CredentialStatus::Revoked),
            "Declined" => Some(CredentialStatus::Declined),
            "Cancelled" => Some(CredentialStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Also the `jti` claim of the signed payload.
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subject: SubjectRef,
    pub kind: CredentialKind,
    /// Capability strings granted to the holder.
    pub permissions: Vec<String>,
    /// Zones the credential opens; empty = any zone of the tenant.
    pub zones: Vec<Uuid>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// `None` = unlimited scans.
    pub max_scans: Option<u32>,
    pub scan_count: u32,
    pub status: CredentialStatus,
    /// SHA-256 (hex) of the signed payload handed to the holder.
    pub payload_digest: String,
    pub issued_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<Uuid>,
    pub metadata: serde_json::Value,
}

impl Credential {
    /// Whether the scan quota has been consumed.
    pub fn quota_exhausted(&self) -> bool {
        self.max_scans.is_some_and(|max| self.scan_count >= max)
    }

    /// Status the credential takes after one more successful scan.
    pub fn status_after_scan(&self) -> CredentialStatus {
        match self.max_scans {
            Some(max) if self.scan_count + 1 >= max => CredentialStatus::UsedUp,
            _ => CredentialStatus::Active,
        }
    }

    pub fn permits_zone(&self, zone_id: Uuid) -> bool {
        self.zones.is_empty() || self.zones.contains(&zone_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCredential {
    /// Chosen by the issuer so it can be signed into the payload.
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subject: SubjectRef,
    pub kind: CredentialKind,
    pub permissions: Vec<String>,
    pub zones: Vec<Uuid>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub max_scans: Option<u32>,
    pub payload_digest: String,
    pub issued_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

//! Scan verification.
//!
//! A scan runs through the checks below and stops at the first one
//! that fails:
//!
//! 1. signature, algorithm, issuer and claim structure
//! 2. tenant bound into the claims
//! 3. credential lookup and payload digest
//! 4. lifecycle: status, validity window, scan quota
//! 5. zone, then rules for the subject
//! 6. capacity reservation in the zone
//! 7. conditional scan commit on the credential
//!
//! Every outcome is audited. Business denials are `Ok` results; only
//! storage failures, timeouts and key problems are `Err`, and those
//! are audited as `system_error`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::audit::{DeviceInfo, ScanReason};
use warden_core::models::credential::{Credential, CredentialStatus};
use warden_core::models::subject::{SubjectContext, SubjectRef};
use warden_core::models::zone::Zone;
use warden_core::repository::{
    AccessStore, CredentialRepository, OccupancyRepository, SubjectProfileRepository,
};

use crate::audit::ScanRecord;
use crate::error::AccessError;
use crate::occupancy::effective_capacity;
use crate::service::AccessService;
use crate::token;

/// Decision for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub granted: bool,
    pub reason: ScanReason,
    pub message: String,
    /// The credential as stored after the scan, once it could be
    /// resolved.
    pub credential: Option<Credential>,
    /// Zones the credential opens, on grant.
    pub permitted_zones: Option<Vec<Uuid>>,
    /// Rule violations behind a denial.
    pub restrictions: Vec<String>,
}

impl VerificationResult {
    fn deny(reason: ScanReason, message: impl Into<String>) -> Self {
        Self {
            granted: false,
            reason,
            message: message.into(),
            credential: None,
            permitted_zones: None,
            restrictions: Vec::new(),
        }
    }

    fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Turn a denial into the matching typed error.
    pub fn into_result(self) -> WardenResult<Self> {
        if self.granted {
            return Ok(self);
        }
        Err(match self.reason {
            ScanReason::Expired | ScanReason::NotYetValid => WardenError::ExpiredCredential,
            ScanReason::UsedUp => WardenError::QuotaExceeded,
            ScanReason::Invalid
            | ScanReason::Revoked
            | ScanReason::Declined
            | ScanReason::Cancelled => WardenError::InvalidCredential {
                reason: self.message,
            },
            ScanReason::Restricted | ScanReason::Denied | ScanReason::CapacityFull => {
                WardenError::AuthorizationDenied {
                    reason: self.message,
                }
            }
            ScanReason::SystemError | ScanReason::Granted => WardenError::Internal(self.message),
        })
    }
}

/// What is known about the scanned credential so far, for the audit
/// row written when the scan fails with an error.
#[derive(Debug, Default)]
struct ScanTrace {
    credential_id: Option<Uuid>,
    subject: Option<SubjectRef>,
}

fn status_reason(status: CredentialStatus) -> ScanReason {
    match status {
        CredentialStatus::Active => ScanReason::Granted,
        CredentialStatus::Expired => ScanReason::Expired,
        CredentialStatus::UsedUp => ScanReason::UsedUp,
        CredentialStatus::Revoked => ScanReason::Revoked,
        CredentialStatus::Declined => ScanReason::Declined,
        CredentialStatus::Cancelled => ScanReason::Cancelled,
    }
}

impl<S: AccessStore> AccessService<S> {
    pub async fn verify_scan(
        &self,
        tenant_id: Uuid,
        payload: &str,
        zone_id: Option<Uuid>,
        device: DeviceInfo,
    ) -> WardenResult<VerificationResult> {
        self.verify_scan_at(tenant_id, payload, zone_id, device, Utc::now())
            .await
    }

    /// Verify a scanned payload at `now` and audit the outcome.
    pub async fn verify_scan_at(
        &self,
        tenant_id: Uuid,
        payload: &str,
        zone_id: Option<Uuid>,
        device: DeviceInfo,
        now: DateTime<Utc>,
    ) -> WardenResult<VerificationResult> {
        let mut trace = ScanTrace::default();
        let outcome = self
            .check_scan(tenant_id, payload, zone_id, now, &mut trace)
            .await;

        let (reason, message) = match &outcome {
            Ok(result) => {
                if result.granted {
                    info!(%tenant_id, credential_id = ?trace.credential_id, zone_id = ?zone_id, "Scan granted");
                } else {
                    info!(
                        %tenant_id,
                        credential_id = ?trace.credential_id,
                        zone_id = ?zone_id,
                        reason = result.reason.as_str(),
                        "Scan denied"
                    );
                }
                (result.reason, result.message.clone())
            }
            Err(e) => {
                error!(%tenant_id, credential_id = ?trace.credential_id, error = %e, "Scan failed");
                (ScanReason::SystemError, e.to_string())
            }
        };

        self.audit_scan(ScanRecord {
            tenant_id,
            credential_id: trace.credential_id,
            subject: trace.subject,
            zone_id,
            device: &device,
            reason,
            message,
            at: now,
        })
        .await;

        outcome
    }

    async fn check_scan(
        &self,
        tenant_id: Uuid,
        payload: &str,
        zone_id: Option<Uuid>,
        now: DateTime<Utc>,
        trace: &mut ScanTrace,
    ) -> WardenResult<VerificationResult> {
        let claims = match token::decode_credential(payload, &self.config) {
            Ok(claims) => claims,
            Err(AccessError::TokenInvalid(detail)) => {
                return Ok(VerificationResult::deny(
                    ScanReason::Invalid,
                    format!("credential payload rejected: {detail}"),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if claims.tenant_id != tenant_id.to_string() {
            return Ok(VerificationResult::deny(
                ScanReason::Invalid,
                "credential was issued for another tenant",
            ));
        }
        let Ok(credential_id) = Uuid::parse_str(&claims.jti) else {
            return Ok(VerificationResult::deny(
                ScanReason::Invalid,
                "credential id is malformed",
            ));
        };
        trace.credential_id = Some(credential_id);
        trace.subject = claims.sub.parse().ok();

        let credential = match self.get_credential(tenant_id, credential_id).await {
            Ok(credential) => credential,
            Err(WardenError::NotFound { .. }) => {
                return Ok(VerificationResult::deny(
                    ScanReason::Invalid,
                    "credential is not known",
                ));
            }
            Err(e) => return Err(e),
        };
        trace.subject = Some(credential.subject);
        if credential.payload_digest != token::payload_digest(payload) {
            return Ok(VerificationResult::deny(
                ScanReason::Invalid,
                "payload does not match the issued credential",
            ));
        }

        if let Some(denied) = self.check_lifecycle(&credential, now).await? {
            return Ok(denied);
        }

        let zone = match zone_id {
            Some(zone_id) => match self.check_zone(&credential, zone_id).await? {
                Ok(zone) => Some(zone),
                Err(denied) => return Ok(denied),
            },
            None => None,
        };

        let profile = self
            .bounded(
                "subject_get",
                self.store.subjects().get(tenant_id, credential.subject),
            )
            .await?;
        let mut ctx = profile.map(SubjectContext::from).unwrap_or_default();
        ctx.subject = Some(credential.subject);
        ctx.permissions = credential.permissions.clone();

        let (decision, rules) = self.evaluate(tenant_id, zone_id, &ctx, now).await?;
        if !decision.allowed {
            let restrictions = decision.messages();
            let message = if restrictions.is_empty() {
                "no rule permits access".to_string()
            } else {
                restrictions.join("; ")
            };
            let mut denied = VerificationResult::deny(
                decision.reason.unwrap_or(ScanReason::Denied),
                message,
            )
            .with_credential(credential);
            denied.restrictions = restrictions;
            return Ok(denied);
        }

        let reservation = match &zone {
            Some(zone) => {
                let capacity =
                    effective_capacity(zone, &rules, self.config.default_zone_capacity);
                if self
                    .try_enter(tenant_id, zone.id, capacity, now)
                    .await?
                    .is_none()
                {
                    return Ok(VerificationResult::deny(
                        ScanReason::CapacityFull,
                        format!("{} is at capacity ({capacity})", zone.name),
                    )
                    .with_credential(credential));
                }
                Some((zone.id, capacity))
            }
            None => None,
        };

        let committed = self.commit_scan(credential, now).await;
        if !matches!(committed, Ok(Ok(_))) {
            if let Some((zone_id, capacity)) = reservation {
                self.release_reservation(tenant_id, zone_id, capacity, now)
                    .await;
            }
        }
        match committed {
            Ok(Ok(credential)) => Ok(VerificationResult {
                granted: true,
                reason: ScanReason::Granted,
                message: "access granted".into(),
                permitted_zones: Some(credential.zones.clone()),
                credential: Some(credential),
                restrictions: Vec::new(),
            }),
            Ok(Err(denied)) => Ok(denied),
            Err(e) => Err(e),
        }
    }

    /// Deny scans of credentials that are not usable at `now`, moving
    /// lapsed ones to their terminal status.
    async fn check_lifecycle(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> WardenResult<Option<VerificationResult>> {
        if credential.status != CredentialStatus::Active {
            let reason = status_reason(credential.status);
            return Ok(Some(
                VerificationResult::deny(
                    reason,
                    format!("credential is {}", credential.status.as_str()),
                )
                .with_credential(credential.clone()),
            ));
        }

        let (reason, next, message) = if now > credential.valid_until {
            (
                ScanReason::Expired,
                Some(CredentialStatus::Expired),
                "credential has expired",
            )
        } else if now < credential.valid_from {
            (ScanReason::NotYetValid, None, "credential is not yet valid")
        } else if credential.quota_exhausted() {
            (
                ScanReason::UsedUp,
                Some(CredentialStatus::UsedUp),
                "credential scan quota is used up",
            )
        } else {
            return Ok(None);
        };

        let mut stored = credential.clone();
        if let Some(next) = next {
            let moved = self
                .bounded(
                    "credential_transition",
                    self.store.credentials().transition_status(
                        credential.tenant_id,
                        credential.id,
                        CredentialStatus::Active,
                        next,
                    ),
                )
                .await?;
            if let Some(moved) = moved {
                debug!(credential_id = %moved.id, status = moved.status.as_str(), "Credential status changed");
                stored = moved;
            }
        }
        Ok(Some(
            VerificationResult::deny(reason, message).with_credential(stored),
        ))
    }

    /// The zone must exist in the tenant, be active and be covered by
    /// the credential.
    async fn check_zone(
        &self,
        credential: &Credential,
        zone_id: Uuid,
    ) -> WardenResult<Result<Zone, VerificationResult>> {
        let zone = match self.get_zone(credential.tenant_id, zone_id).await {
            Ok(zone) => zone,
            Err(WardenError::NotFound { .. }) => {
                return Ok(Err(VerificationResult::deny(
                    ScanReason::Restricted,
                    "zone is not known",
                )
                .with_credential(credential.clone())));
            }
            Err(e) => return Err(e),
        };

        let denial = if !zone.active {
            Some(format!("{} is closed", zone.name))
        } else if !credential.permits_zone(zone.id) {
            Some(format!("credential does not open {}", zone.name))
        } else {
            None
        };
        Ok(match denial {
            Some(message) => Err(VerificationResult::deny(ScanReason::Restricted, message)
                .with_credential(credential.clone())),
            None => Ok(zone),
        })
    }

    /// Count the scan on the credential with a conditional update.
    ///
    /// A lost update re-reads the credential and re-checks its
    /// lifecycle before trying again, at most `max_scan_retries` times.
    async fn commit_scan(
        &self,
        mut current: Credential,
        now: DateTime<Utc>,
    ) -> WardenResult<Result<Credential, VerificationResult>> {
        let mut retries = 0;
        loop {
            let committed = self
                .bounded(
                    "credential_record_scan",
                    self.store.credentials().record_scan(
                        current.tenant_id,
                        current.id,
                        current.status,
                        current.scan_count,
                        current.status_after_scan(),
                        now,
                    ),
                )
                .await?;
            if let Some(updated) = committed {
                return Ok(Ok(updated));
            }

            if retries >= self.config.max_scan_retries {
                return Err(WardenError::Internal(format!(
                    "credential {} changed concurrently {} times",
                    current.id,
                    retries + 1
                )));
            }
            retries += 1;
            debug!(credential_id = %current.id, retries, "Scan commit conflicted, re-reading");

            current = self
                .get_credential(current.tenant_id, current.id)
                .await?;
            if let Some(denied) = self.check_lifecycle(&current, now).await? {
                return Ok(Err(denied));
            }
        }
    }

    async fn release_reservation(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        capacity: u32,
        now: DateTime<Utc>,
    ) {
        let released = self
            .bounded(
                "occupancy_apply_delta",
                self.store
                    .occupancy()
                    .apply_delta(tenant_id, zone_id, -1, capacity, now),
            )
            .await;
        if let Err(e) = released {
            error!(%tenant_id, %zone_id, error = %e, "Failed to release occupancy reservation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denials_map_to_typed_errors() {
        let expired = VerificationResult::deny(ScanReason::Expired, "x").into_result();
        assert!(matches!(expired, Err(WardenError::ExpiredCredential)));

        let used = VerificationResult::deny(ScanReason::UsedUp, "x").into_result();
        assert!(matches!(used, Err(WardenError::QuotaExceeded)));

        let invalid = VerificationResult::deny(ScanReason::Invalid, "bad").into_result();
        assert!(matches!(invalid, Err(WardenError::InvalidCredential { .. })));

        let full = VerificationResult::deny(ScanReason::CapacityFull, "full").into_result();
        match full {
            Err(WardenError::AuthorizationDenied { reason }) => assert_eq!(reason, "full"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn terminal_statuses_keep_their_reason() {
        assert_eq!(status_reason(CredentialStatus::Revoked), ScanReason::Revoked);
        assert_eq!(status_reason(CredentialStatus::UsedUp), ScanReason::UsedUp);
        assert_eq!(
            status_reason(CredentialStatus::Cancelled),
            ScanReason::Cancelled
        );
    }
}

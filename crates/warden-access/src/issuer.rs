//! Credential issuance and revocation.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::credential::{
    CreateCredential, Credential, CredentialKind, CredentialStatus,
};
use warden_core::models::subject::SubjectRef;
use warden_core::repository::{AccessStore, CredentialRepository, PaginatedResult, Pagination};

use crate::service::AccessService;
use crate::token::{self, CredentialClaims};

/// Input for issuing a credential.
#[derive(Debug, Clone)]
pub struct IssueCredential {
    pub tenant_id: Uuid,
    pub subject: SubjectRef,
    pub kind: CredentialKind,
    /// Validity starts at issue time and lasts this long.
    pub valid_for: Duration,
    /// Zones the credential opens; empty = any zone.
    pub zones: Vec<Uuid>,
    pub permissions: Vec<String>,
    /// `None` = unlimited scans.
    pub max_scans: Option<u32>,
    pub metadata: Option<serde_json::Value>,
}

/// A freshly issued credential.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub credential: Credential,
    /// Signed payload to encode into the QR code. Not stored anywhere.
    pub payload: String,
}

impl<S: AccessStore> AccessService<S> {
    pub async fn issue_credential(&self, input: IssueCredential) -> WardenResult<IssuedCredential> {
        self.issue_credential_at(input, Utc::now()).await
    }

    /// Issue a credential valid from `now`.
    pub async fn issue_credential_at(
        &self,
        input: IssueCredential,
        now: DateTime<Utc>,
    ) -> WardenResult<IssuedCredential> {
        if input.valid_for <= Duration::zero() {
            return Err(WardenError::Validation {
                message: "credential validity must be positive".into(),
            });
        }
        if input.max_scans == Some(0) {
            return Err(WardenError::Validation {
                message: "max_scans must be at least 1".into(),
            });
        }
        for zone_id in &input.zones {
            match self.get_zone(input.tenant_id, *zone_id).await {
                Ok(_) => {}
                Err(WardenError::NotFound { .. }) => {
                    return Err(WardenError::Validation {
                        message: format!("zone {zone_id} does not exist"),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let id = Uuid::new_v4();
        let valid_until = now + input.valid_for;
        let claims = CredentialClaims {
            sub: input.subject.to_string(),
            tenant_id: input.tenant_id.to_string(),
            kind: input.kind,
            zones: input.zones.clone(),
            permissions: input.permissions.clone(),
            iss: self.config.issuer.clone(),
            iat: now.timestamp(),
            exp: valid_until.timestamp(),
            jti: id.to_string(),
            nonce: token::generate_nonce(),
        };
        let payload = token::sign_credential(&claims, &self.config)?;

        let credential = self
            .bounded(
                "credential_create",
                self.store.credentials().create(CreateCredential {
                    id,
                    tenant_id: input.tenant_id,
                    subject: input.subject,
                    kind: input.kind,
                    permissions: input.permissions,
                    zones: input.zones,
                    valid_from: now,
                    valid_until,
                    max_scans: input.max_scans,
                    payload_digest: token::payload_digest(&payload),
                    issued_at: now,
                    metadata: input.metadata,
                }),
            )
            .await?;

        info!(
            tenant_id = %credential.tenant_id,
            credential_id = %credential.id,
            subject = %credential.subject,
            kind = ?credential.kind,
            valid_until = %credential.valid_until,
            "Issued credential"
        );
        Ok(IssuedCredential {
            credential,
            payload,
        })
    }

    /// Revoke a credential.
    ///
    /// Revoking an already revoked credential returns it unchanged; any
    /// other terminal status is a validation error.
    pub async fn revoke_credential(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
        revoked_by: Uuid,
    ) -> WardenResult<Credential> {
        let revoked = self
            .bounded(
                "credential_revoke",
                self.store
                    .credentials()
                    .revoke(tenant_id, credential_id, revoked_by, Utc::now()),
            )
            .await?;
        if let Some(credential) = revoked {
            info!(%tenant_id, %credential_id, %revoked_by, "Revoked credential");
            return Ok(credential);
        }

        // Not active: distinguish "unknown", "already revoked" and the
        // other terminal states.
        let current = self.get_credential(tenant_id, credential_id).await?;
        match current.status {
            CredentialStatus::Revoked => Ok(current),
            status => {
                warn!(%tenant_id, %credential_id, status = status.as_str(), "Cannot revoke credential");
                Err(WardenError::Validation {
                    message: format!("credential is {} and cannot be revoked", status.as_str()),
                })
            }
        }
    }

    pub async fn get_credential(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> WardenResult<Credential> {
        self.bounded(
            "credential_get",
            self.store.credentials().get_by_id(tenant_id, credential_id),
        )
        .await
    }

    pub async fn list_credentials_by_subject(
        &self,
        tenant_id: Uuid,
        subject: SubjectRef,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<Credential>> {
        self.bounded(
            "credential_list_by_subject",
            self.store
                .credentials()
                .list_by_subject(tenant_id, subject, pagination),
        )
        .await
    }
}

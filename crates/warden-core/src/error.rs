//! Error types for the Warden access control engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Malformed, unsigned or tenant-mismatched credential payload.
    #[error("Invalid credential: {reason}")]
    InvalidCredential { reason: String },

    #[error("Credential has expired")]
    ExpiredCredential,

    #[error("Credential scan quota exceeded")]
    QuotaExceeded,

    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Store operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Stable machine-readable code for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            WardenError::NotFound { .. } => "not_found",
            WardenError::AlreadyExists { .. } => "already_exists",
            WardenError::Validation { .. } => "validation",
            WardenError::InvalidCredential { .. } => "invalid_credential",
            WardenError::ExpiredCredential => "expired_credential",
            WardenError::QuotaExceeded => "quota_exceeded",
            WardenError::AuthorizationDenied { .. } => "authorization_denied",
            WardenError::Database(_) | WardenError::Timeout { .. } | WardenError::Internal(_) => {
                "system_error"
            }
            WardenError::Crypto(_) => "crypto_error",
        }
    }

    /// Message safe to hand to a reader or turnstile adapter.
    ///
    /// Storage, cryptography and internal details are replaced with a
    /// generic text; business errors keep their message.
    pub fn public_message(&self) -> String {
        match self {
            WardenError::Database(_) | WardenError::Timeout { .. } | WardenError::Internal(_) => {
                "access system unavailable".into()
            }
            WardenError::Crypto(_) => "credential could not be processed".into(),
            WardenError::InvalidCredential { .. } => "invalid credential".into(),
            other => other.to_string(),
        }
    }

    /// `true` for storage and timeout failures, as opposed to business
    /// or input errors.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            WardenError::Database(_) | WardenError::Timeout { .. } | WardenError::Internal(_)
        )
    }
}

pub type WardenResult<T> = Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_errors_hide_storage_detail() {
        let err = WardenError::Database("connection reset by 10.0.0.4:8000".into());
        assert!(err.is_system());
        assert_eq!(err.kind(), "system_error");
        assert!(!err.public_message().contains("10.0.0.4"));
    }

    #[test]
    fn business_errors_keep_message() {
        let err = WardenError::AuthorizationDenied {
            reason: "outside opening hours".into(),
        };
        assert!(!err.is_system());
        assert_eq!(err.kind(), "authorization_denied");
        assert!(err.public_message().contains("outside opening hours"));
    }
}

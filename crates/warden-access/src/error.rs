//! Access engine error types.

use thiserror::Error;
use warden_core::error::WardenError;

#[derive(Debug, Error)]
pub enum AccessError {
    /// Bad signature, wrong algorithm or issuer, malformed claims.
    #[error("invalid credential payload: {0}")]
    TokenInvalid(String),

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("store operation timed out: {0}")]
    Timeout(String),
}

impl From<AccessError> for WardenError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::TokenInvalid(reason) => WardenError::InvalidCredential { reason },
            AccessError::Crypto(msg) => WardenError::Crypto(msg),
            AccessError::Timeout(operation) => WardenError::Timeout { operation },
        }
    }
}

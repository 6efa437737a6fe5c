//! Signed credential payloads.
//!
//! A credential payload is an EdDSA (Ed25519) JWT. The algorithm is
//! pinned on decode, the tenant is bound into the claims, and `jti`
//! carries the credential id. Temporal validity is not judged here:
//! `exp` must be present but the stored record and the service clock
//! decide whether the credential is still usable.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use warden_core::models::credential::CredentialKind;

use crate::config::AccessConfig;
use crate::error::AccessError;

/// Claims embedded in every credential payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialClaims {
    /// `user:<uuid>` or `visitor:<uuid>`.
    pub sub: String,
    pub tenant_id: String,
    pub kind: CredentialKind,
    pub zones: Vec<Uuid>,
    pub permissions: Vec<String>,
    pub iss: String,
    pub iat: i64,
    /// Equal to the credential's `valid_until`.
    pub exp: i64,
    /// Credential id.
    pub jti: String,
    /// 32 random bytes, base64url. Makes every payload unique.
    pub nonce: String,
}

/// Sign credential claims into a compact JWT.
pub fn sign_credential(
    claims: &CredentialClaims,
    config: &AccessConfig,
) -> Result<String, AccessError> {
    let key = EncodingKey::from_ed_pem(config.signing_private_key_pem.as_bytes())
        .map_err(|e| AccessError::Crypto(format!("bad private key: {e}")))?;

    let header = Header::new(Algorithm::EdDSA);
    jsonwebtoken::encode(&header, claims, &key)
        .map_err(|e| AccessError::Crypto(format!("JWT encode: {e}")))
}

/// Load both signing keys and confirm they form one Ed25519 key pair.
pub fn check_signing_keys(config: &AccessConfig) -> Result<(), AccessError> {
    let private = EncodingKey::from_ed_pem(config.signing_private_key_pem.as_bytes())
        .map_err(|e| AccessError::Crypto(format!("bad private key: {e}")))?;
    let public = DecodingKey::from_ed_pem(config.signing_public_key_pem.as_bytes())
        .map_err(|e| AccessError::Crypto(format!("bad public key: {e}")))?;

    let message = config.issuer.as_bytes();
    let signature = jsonwebtoken::crypto::sign(message, &private, Algorithm::EdDSA)
        .map_err(|e| AccessError::Crypto(format!("signing with private key: {e}")))?;
    let matches = jsonwebtoken::crypto::verify(&signature, message, &public, Algorithm::EdDSA)
        .map_err(|e| AccessError::Crypto(format!("verifying with public key: {e}")))?;
    if !matches {
        return Err(AccessError::Crypto(
            "public key does not match private key".into(),
        ));
    }
    Ok(())
}

/// Verify the signature, algorithm, issuer and claim structure of a
/// scanned payload.
///
/// Key loading problems are `Crypto` errors; everything wrong with the
/// payload itself is `TokenInvalid`.
pub fn decode_credential(
    payload: &str,
    config: &AccessConfig,
) -> Result<CredentialClaims, AccessError> {
    let key = DecodingKey::from_ed_pem(config.signing_public_key_pem.as_bytes())
        .map_err(|e| AccessError::Crypto(format!("bad public key: {e}")))?;

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);
    validation.validate_exp = false;

    jsonwebtoken::decode::<CredentialClaims>(payload, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AccessError::TokenInvalid(e.to_string()))
}

/// 32 random bytes, base64url-encoded without padding.
pub fn generate_nonce() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 of the raw payload, hex-encoded.
///
/// Stored as `credential.payload_digest`; the payload itself is never
/// persisted.
pub fn payload_digest(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

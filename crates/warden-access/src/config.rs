//! Access engine configuration.

use std::time::Duration;

/// Configuration for the access service.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// PEM-encoded Ed25519 private key for credential signing.
    pub signing_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for credential verification.
    pub signing_public_key_pem: String,
    /// Credential issuer (`iss` claim).
    pub issuer: String,
    /// Capacity applied when neither a rule nor the zone sets one
    /// (default: 100).
    pub default_zone_capacity: u32,
    /// Upper bound for every individual store call (default: 2s).
    pub store_timeout: Duration,
    /// Facility local time as a fixed offset from UTC, in seconds.
    pub facility_utc_offset_secs: i32,
    /// Decision when no rule applies to a scan (default: allow).
    pub open_by_default: bool,
    /// Re-reads after a lost compare-and-swap on the credential
    /// before the scan is abandoned (default: 32). Every lost race means
    /// another scan committed first.
    pub max_scan_retries: u32,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            signing_private_key_pem: String::new(),
            signing_public_key_pem: String::new(),
            issuer: "warden".into(),
            default_zone_capacity: 100,
            store_timeout: Duration::from_secs(2),
            facility_utc_offset_secs: 0,
            open_by_default: true,
            max_scan_retries: 32,
        }
    }
}

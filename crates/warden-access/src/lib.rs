//! Warden Access: credential issuance and scan verification, rule
//! evaluation, occupancy tracking and the scan audit trail.

pub mod audit;
pub mod config;
pub mod error;
pub mod issuer;
pub mod occupancy;
pub mod rules;
pub mod service;
pub mod token;
pub mod verifier;

pub use config::AccessConfig;
pub use error::AccessError;
pub use issuer::{IssueCredential, IssuedCredential};
pub use rules::{RuleDecision, RuleViolation, RuleViolationKind, evaluate_rules};
pub use service::AccessService;
pub use token::CredentialClaims;
pub use verifier::VerificationResult;

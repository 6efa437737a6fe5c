//! Credential subjects and the context used for rule evaluation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The holder of a credential: a registered user or a visitor, never
/// both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum SubjectRef {
    User(Uuid),
    Visitor(Uuid),
}

impl SubjectRef {
    pub fn id(&self) -> Uuid {
        match self {
            SubjectRef::User(id) | SubjectRef::Visitor(id) => *id,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            SubjectRef::User(id) => Some(*id),
            SubjectRef::Visitor(_) => None,
        }
    }

    pub fn visitor_id(&self) -> Option<Uuid> {
        match self {
            SubjectRef::Visitor(id) => Some(*id),
            SubjectRef::User(_) => None,
        }
    }

    /// Rebuild a subject from the two nullable storage columns.
    ///
    /// Returns `None` unless exactly one of them is set.
    pub fn from_parts(user_id: Option<Uuid>, visitor_id: Option<Uuid>) -> Option<Self> {
        match (user_id, visitor_id) {
            (Some(u), None) => Some(SubjectRef::User(u)),
            (None, Some(v)) => Some(SubjectRef::Visitor(v)),
            _ => None,
        }
    }
}

/// `user:<uuid>` / `visitor:<uuid>`, the form embedded in signed
/// credential claims.
impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectRef::User(id) => write!(f, "user:{id}"),
            SubjectRef::Visitor(id) => write!(f, "visitor:{id}"),
        }
    }
}

impl FromStr for SubjectRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("malformed subject reference: {s}"))?;
        let id = Uuid::parse_str(id).map_err(|e| format!("invalid subject UUID: {e}"))?;
        match kind {
            "user" => Ok(SubjectRef::User(id)),
            "visitor" => Ok(SubjectRef::Visitor(id)),
            other => Err(format!("unknown subject kind: {other}")),
        }
    }
}

/// Membership data about a subject, maintained by the membership system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub tenant_id: Uuid,
    pub subject: SubjectRef,
    pub roles: Vec<String>,
    pub membership_types: Vec<String>,
    pub plan_types: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpsertSubjectProfile {
    pub roles: Vec<String>,
    pub membership_types: Vec<String>,
    pub plan_types: Vec<String>,
}

/// Everything the rule engine knows about the subject of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectContext {
    pub subject: Option<SubjectRef>,
    pub roles: Vec<String>,
    pub membership_types: Vec<String>,
    pub plan_types: Vec<String>,
    /// Capability strings carried by the presented credential.
    pub permissions: Vec<String>,
}

impl From<SubjectProfile> for SubjectContext {
    fn from(profile: SubjectProfile) -> Self {
        Self {
            subject: Some(profile.subject),
            roles: profile.roles,
            membership_types: profile.membership_types,
            plan_types: profile.plan_types,
            permissions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_form_parses_back() {
        let subject = SubjectRef::Visitor(Uuid::new_v4());
        let parsed: SubjectRef = subject.to_string().parse().unwrap();
        assert_eq!(parsed, subject);
    }

    #[test]
    fn from_parts_requires_exactly_one() {
        let id = Uuid::new_v4();
        assert_eq!(
            SubjectRef::from_parts(Some(id), None),
            Some(SubjectRef::User(id))
        );
        assert!(SubjectRef::from_parts(Some(id), Some(id)).is_none());
        assert!(SubjectRef::from_parts(None, None).is_none());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!("member:not-a-uuid".parse::<SubjectRef>().is_err());
        assert!(
            format!("robot:{}", Uuid::new_v4())
                .parse::<SubjectRef>()
                .is_err()
        );
    }
}

//! SurrealDB implementation of [`SubjectProfileRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::subject::{SubjectProfile, SubjectRef, UpsertSubjectProfile};
use warden_core::repository::SubjectProfileRepository;

use crate::error::{DbError, parse_uuid};

#[derive(Debug, SurrealValue)]
struct SubjectProfileRow {
    tenant_id: String,
    subject: String,
    roles: Vec<String>,
    membership_types: Vec<String>,
    plan_types: Vec<String>,
    updated_at: DateTime<Utc>,
}

impl SubjectProfileRow {
    fn try_into_profile(self) -> Result<SubjectProfile, DbError> {
        Ok(SubjectProfile {
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            subject: self
                .subject
                .parse()
                .map_err(|e: String| DbError::Decode(e))?,
            roles: self.roles,
            membership_types: self.membership_types,
            plan_types: self.plan_types,
            updated_at: self.updated_at,
        })
    }
}

fn record_key(tenant_id: Uuid, subject: SubjectRef) -> String {
    format!("{tenant_id}_{subject}")
}

/// SurrealDB implementation of the SubjectProfile repository.
#[derive(Clone)]
pub struct SurrealSubjectProfileRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSubjectProfileRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SubjectProfileRepository for SurrealSubjectProfileRepository<C> {
    async fn get(
        &self,
        tenant_id: Uuid,
        subject: SubjectRef,
    ) -> WardenResult<Option<SubjectProfile>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('subject_profile', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", record_key(tenant_id, subject)))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SubjectProfileRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(SubjectProfileRow::try_into_profile)
            .transpose()?)
    }

    async fn upsert(
        &self,
        tenant_id: Uuid,
        subject: SubjectRef,
        input: UpsertSubjectProfile,
    ) -> WardenResult<SubjectProfile> {
        let key = record_key(tenant_id, subject);

        let result = self
            .db
            .query(
                "UPSERT type::record('subject_profile', $id) SET \
                 tenant_id = $tenant_id, \
                 subject = $subject, \
                 roles = $roles, \
                 membership_types = $membership_types, \
                 plan_types = $plan_types, \
                 updated_at = time::now()",
            )
            .bind(("id", key.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("subject", subject.to_string()))
            .bind(("roles", input.roles))
            .bind(("membership_types", input.membership_types))
            .bind(("plan_types", input.plan_types))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(DbError::query)?;

        let rows: Vec<SubjectProfileRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "subject_profile".into(),
            id: key,
        })?;

        Ok(row.try_into_profile()?)
    }
}

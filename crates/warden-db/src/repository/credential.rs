//! SurrealDB implementation of [`CredentialRepository`].
//!
//! Every state change is a single `UPDATE ... WHERE` whose condition
//! carries the expected status (and scan count), so concurrent scanners
//! race on the record itself. An empty result means the guard failed.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, IndexedResults, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::credential::{
    CreateCredential, Credential, CredentialKind, CredentialStatus,
};
use warden_core::models::subject::SubjectRef;
use warden_core::repository::{CredentialRepository, PaginatedResult, Pagination};

use super::CountRow;
use crate::error::{DbError, parse_opt_uuid, parse_uuid};
use crate::retry;

#[derive(Debug, SurrealValue)]
struct CredentialRow {
    tenant_id: String,
    user_id: Option<String>,
    visitor_id: Option<String>,
    kind: String,
    permissions: Vec<String>,
    zones: Vec<String>,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    max_scans: Option<u32>,
    scan_count: u32,
    status: String,
    payload_digest: String,
    issued_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<String>,
    metadata: serde_json::Value,
}

#[derive(Debug, SurrealValue)]
struct CredentialRowWithId {
    record_id: String,
    tenant_id: String,
    user_id: Option<String>,
    visitor_id: Option<String>,
    kind: String,
    permissions: Vec<String>,
    zones: Vec<String>,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    max_scans: Option<u32>,
    scan_count: u32,
    status: String,
    payload_digest: String,
    issued_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<String>,
    metadata: serde_json::Value,
}

fn parse_kind(s: &str) -> Result<CredentialKind, DbError> {
    match s {
        "Member" => Ok(CredentialKind::Member),
        "Visitor" => Ok(CredentialKind::Visitor),
        "Temporary" => Ok(CredentialKind::Temporary),
        "RoomAccess" => Ok(CredentialKind::RoomAccess),
        other => Err(DbError::Decode(format!("unknown credential kind: {other}"))),
    }
}

fn kind_to_string(kind: &CredentialKind) -> &'static str {
    match kind {
        CredentialKind::Member => "Member",
        CredentialKind::Visitor => "Visitor",
        CredentialKind::Temporary => "Temporary",
        CredentialKind::RoomAccess => "RoomAccess",
    }
}

fn parse_status(s: &str) -> Result<CredentialStatus, DbError> {
    CredentialStatus::parse(s)
        .ok_or_else(|| DbError::Decode(format!("unknown credential status: {s}")))
}

impl CredentialRow {
    fn into_credential(self, id: Uuid) -> Result<Credential, DbError> {
        let user_id = parse_opt_uuid("user", self.user_id.as_deref())?;
        let visitor_id = parse_opt_uuid("visitor", self.visitor_id.as_deref())?;
        let subject = SubjectRef::from_parts(user_id, visitor_id).ok_or_else(|| {
            DbError::Decode(format!("credential {id} must have exactly one subject"))
        })?;
        let zones = self
            .zones
            .iter()
            .map(|z| parse_uuid("zone", z))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Credential {
            id,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            subject,
            kind: parse_kind(&self.kind)?,
            permissions: self.permissions,
            zones,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            max_scans: self.max_scans,
            scan_count: self.scan_count,
            status: parse_status(&self.status)?,
            payload_digest: self.payload_digest,
            issued_at: self.issued_at,
            last_used_at: self.last_used_at,
            revoked_at: self.revoked_at,
            revoked_by: parse_opt_uuid("revoked_by", self.revoked_by.as_deref())?,
            metadata: self.metadata,
        })
    }
}

impl CredentialRowWithId {
    fn try_into_credential(self) -> Result<Credential, DbError> {
        let id = parse_uuid("credential", &self.record_id)?;
        CredentialRow {
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            visitor_id: self.visitor_id,
            kind: self.kind,
            permissions: self.permissions,
            zones: self.zones,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            max_scans: self.max_scans,
            scan_count: self.scan_count,
            status: self.status,
            payload_digest: self.payload_digest,
            issued_at: self.issued_at,
            last_used_at: self.last_used_at,
            revoked_at: self.revoked_at,
            revoked_by: self.revoked_by,
            metadata: self.metadata,
        }
        .into_credential(id)
    }
}

/// Take the first row of a conditional update, `None` if the guard
/// rejected it.
fn first_credential(rows: Vec<CredentialRow>, id: Uuid) -> Result<Option<Credential>, DbError> {
    rows.into_iter()
        .next()
        .map(|row| row.into_credential(id))
        .transpose()
}

/// Send one guarded `UPDATE` and decode the row it touched, if any.
async fn guarded<Q>(statement: Q, id: Uuid) -> Result<Option<Credential>, DbError>
where
    Q: IntoFuture<Output = surrealdb::Result<IndexedResults>>,
{
    let mut result = statement
        .await
        .map_err(DbError::store)?
        .check()
        .map_err(DbError::query)?;
    let rows: Vec<CredentialRow> = result.take(0)?;
    first_credential(rows, id)
}

/// SurrealDB implementation of the Credential repository.
#[derive(Clone)]
pub struct SurrealCredentialRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCredentialRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CredentialRepository for SurrealCredentialRepository<C> {
    async fn create(&self, input: CreateCredential) -> WardenResult<Credential> {
        let id = input.id;
        let id_str = id.to_string();
        let metadata = input
            .metadata
            .unwrap_or(serde_json::Value::Object(Default::default()));
        let zones: Vec<String> = input.zones.iter().map(Uuid::to_string).collect();

        let result = self
            .db
            .query(
                "CREATE type::record('credential', $id) SET \
                 tenant_id = $tenant_id, \
                 user_id = $user_id, \
                 visitor_id = $visitor_id, \
                 kind = $kind, \
                 permissions = $permissions, \
                 zones = $zones, \
                 valid_from = $valid_from, \
                 valid_until = $valid_until, \
                 max_scans = $max_scans, \
                 scan_count = 0, \
                 status = 'Active', \
                 payload_digest = $payload_digest, \
                 issued_at = $issued_at, \
                 metadata = $metadata",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("user_id", input.subject.user_id().map(|u| u.to_string())))
            .bind((
                "visitor_id",
                input.subject.visitor_id().map(|v| v.to_string()),
            ))
            .bind(("kind", kind_to_string(&input.kind).to_string()))
            .bind(("permissions", input.permissions))
            .bind(("zones", zones))
            .bind(("valid_from", input.valid_from))
            .bind(("valid_until", input.valid_until))
            .bind(("max_scans", input.max_scans))
            .bind(("payload_digest", input.payload_digest))
            .bind(("issued_at", input.issued_at))
            .bind(("metadata", metadata))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(DbError::query)?;

        let rows: Vec<CredentialRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "credential".into(),
            id: id_str,
        })?;

        Ok(row.into_credential(id)?)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> WardenResult<Credential> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('credential', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CredentialRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "credential".into(),
            id: id_str,
        })?;

        Ok(row.into_credential(id)?)
    }

    async fn record_scan(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        expected_status: CredentialStatus,
        expected_scan_count: u32,
        next_status: CredentialStatus,
        used_at: DateTime<Utc>,
    ) -> WardenResult<Option<Credential>> {
        let key = id.to_string();
        let tenant = tenant_id.to_string();

        let committed = retry::on_conflict("credential_record_scan", || {
            let statement = self
                .db
                .query(
                    "UPDATE type::record('credential', $id) SET \
                     scan_count = $next_count, \
                     status = $next_status, \
                     last_used_at = $used_at \
                     WHERE tenant_id = $tenant_id \
                     AND status = $expected_status \
                     AND scan_count = $expected_count",
                )
                .bind(("id", key.clone()))
                .bind(("tenant_id", tenant.clone()))
                .bind(("expected_status", expected_status.as_str().to_string()))
                .bind(("expected_count", expected_scan_count))
                .bind(("next_count", expected_scan_count + 1))
                .bind(("next_status", next_status.as_str().to_string()))
                .bind(("used_at", used_at));
            guarded(statement, id)
        })
        .await;

        // A scan that kept losing to concurrent writers has not committed;
        // the caller re-reads and decides again.
        match committed {
            Err(err) if err.is_conflict() => Ok(None),
            other => Ok(other?),
        }
    }

    async fn transition_status(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        from: CredentialStatus,
        to: CredentialStatus,
    ) -> WardenResult<Option<Credential>> {
        let key = id.to_string();
        let tenant = tenant_id.to_string();

        let updated = retry::on_conflict("credential_transition", || {
            let statement = self
                .db
                .query(
                    "UPDATE type::record('credential', $id) SET status = $to \
                     WHERE tenant_id = $tenant_id AND status = $from",
                )
                .bind(("id", key.clone()))
                .bind(("tenant_id", tenant.clone()))
                .bind(("from", from.as_str().to_string()))
                .bind(("to", to.as_str().to_string()));
            guarded(statement, id)
        })
        .await?;

        Ok(updated)
    }

    async fn revoke(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        revoked_by: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> WardenResult<Option<Credential>> {
        let key = id.to_string();
        let tenant = tenant_id.to_string();
        let revoker = revoked_by.to_string();

        let revoked = retry::on_conflict("credential_revoke", || {
            let statement = self
                .db
                .query(
                    "UPDATE type::record('credential', $id) SET \
                     status = 'Revoked', \
                     revoked_by = $revoked_by, \
                     revoked_at = $revoked_at \
                     WHERE tenant_id = $tenant_id AND status = 'Active'",
                )
                .bind(("id", key.clone()))
                .bind(("tenant_id", tenant.clone()))
                .bind(("revoked_by", revoker.clone()))
                .bind(("revoked_at", revoked_at));
            guarded(statement, id)
        })
        .await?;

        Ok(revoked)
    }

    async fn list_by_subject(
        &self,
        tenant_id: Uuid,
        subject: SubjectRef,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<Credential>> {
        let column = match subject {
            SubjectRef::User(_) => "user_id",
            SubjectRef::Visitor(_) => "visitor_id",
        };
        let tenant_id_str = tenant_id.to_string();
        let subject_id = subject.id().to_string();

        let count_query = format!(
            "SELECT count() AS total FROM credential \
             WHERE tenant_id = $tenant_id AND {column} = $subject_id GROUP ALL"
        );
        let mut count_result = self
            .db
            .query(&count_query)
            .bind(("tenant_id", tenant_id_str.clone()))
            .bind(("subject_id", subject_id.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let list_query = format!(
            "SELECT meta::id(id) AS record_id, * FROM credential \
             WHERE tenant_id = $tenant_id AND {column} = $subject_id \
             ORDER BY issued_at DESC \
             LIMIT $limit START $offset"
        );
        let mut result = self
            .db
            .query(&list_query)
            .bind(("tenant_id", tenant_id_str))
            .bind(("subject_id", subject_id))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CredentialRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(CredentialRowWithId::try_into_credential)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

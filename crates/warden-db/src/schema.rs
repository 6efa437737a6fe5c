//! Schema definitions and migration runner for SurrealDB.
//!
//! All tables are SCHEMAFULL. UUIDs are stored as strings and enums as
//! strings with ASSERT constraints. Counters carry `>= 0` assertions so
//! that a buggy decrement fails loudly instead of going negative.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "access_control_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Zones (tenant scope)
-- =======================================================================
DEFINE TABLE zone SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE zone TYPE string;
DEFINE FIELD name ON TABLE zone TYPE string;
DEFINE FIELD zone_type ON TABLE zone TYPE string \
    ASSERT $value IN ['General', 'MeetingRoom', 'PrivateOffice', \
    'Restricted', 'Amenity'];
DEFINE FIELD max_capacity ON TABLE zone TYPE option<int>;
DEFINE FIELD active ON TABLE zone TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE zone TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE zone TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_zone_tenant_name ON TABLE zone \
    COLUMNS tenant_id, name UNIQUE;

-- =======================================================================
-- Access rules (tenant scope, optionally zone scoped)
-- =======================================================================
DEFINE TABLE access_rule SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE access_rule TYPE string;
DEFINE FIELD name ON TABLE access_rule TYPE string;
DEFINE FIELD zone_id ON TABLE access_rule TYPE option<string>;
DEFINE FIELD membership_types ON TABLE access_rule TYPE array<string> \
    DEFAULT [];
DEFINE FIELD plan_types ON TABLE access_rule TYPE array<string> DEFAULT [];
DEFINE FIELD roles ON TABLE access_rule TYPE array<string> DEFAULT [];
DEFINE FIELD window_start_min ON TABLE access_rule TYPE option<int>;
DEFINE FIELD window_end_min ON TABLE access_rule TYPE option<int>;
DEFINE FIELD allowed_days ON TABLE access_rule TYPE array<string> \
    DEFAULT [];
DEFINE FIELD max_occupancy ON TABLE access_rule TYPE option<int>;
DEFINE FIELD requires_approval ON TABLE access_rule TYPE bool \
    DEFAULT false;
DEFINE FIELD priority ON TABLE access_rule TYPE int DEFAULT 0;
DEFINE FIELD valid_from ON TABLE access_rule TYPE option<datetime>;
DEFINE FIELD valid_until ON TABLE access_rule TYPE option<datetime>;
DEFINE FIELD active ON TABLE access_rule TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE access_rule TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE access_rule TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_rule_tenant_active ON TABLE access_rule \
    COLUMNS tenant_id, active;

-- =======================================================================
-- Credentials (tenant scope, never deleted)
-- =======================================================================
DEFINE TABLE credential SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE credential TYPE string;
DEFINE FIELD user_id ON TABLE credential TYPE option<string>;
DEFINE FIELD visitor_id ON TABLE credential TYPE option<string>;
DEFINE FIELD kind ON TABLE credential TYPE string \
    ASSERT $value IN ['Member', 'Visitor', 'Temporary', 'RoomAccess'];
DEFINE FIELD permissions ON TABLE credential TYPE array<string> \
    DEFAULT [];
DEFINE FIELD zones ON TABLE credential TYPE array<string> DEFAULT [];
DEFINE FIELD valid_from ON TABLE credential TYPE datetime;
DEFINE FIELD valid_until ON TABLE credential TYPE datetime;
DEFINE FIELD max_scans ON TABLE credential TYPE option<int>;
DEFINE FIELD scan_count ON TABLE credential TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD status ON TABLE credential TYPE string \
    ASSERT $value IN ['Active', 'Expired', 'UsedUp', 'Revoked', \
    'Declined', 'Cancelled'];
DEFINE FIELD payload_digest ON TABLE credential TYPE string;
DEFINE FIELD issued_at ON TABLE credential TYPE datetime;
DEFINE FIELD last_used_at ON TABLE credential TYPE option<datetime>;
DEFINE FIELD revoked_at ON TABLE credential TYPE option<datetime>;
DEFINE FIELD revoked_by ON TABLE credential TYPE option<string>;
DEFINE FIELD metadata ON TABLE credential TYPE object FLEXIBLE DEFAULT {};
DEFINE INDEX idx_credential_tenant_user ON TABLE credential \
    COLUMNS tenant_id, user_id;
DEFINE INDEX idx_credential_tenant_visitor ON TABLE credential \
    COLUMNS tenant_id, visitor_id;

-- =======================================================================
-- Occupancy snapshots (one row per tenant + zone)
-- =======================================================================
DEFINE TABLE occupancy SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE occupancy TYPE string;
DEFINE FIELD zone_id ON TABLE occupancy TYPE string;
DEFINE FIELD current_count ON TABLE occupancy TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD max_capacity ON TABLE occupancy TYPE int DEFAULT 0;
DEFINE FIELD last_entry_at ON TABLE occupancy TYPE option<datetime>;
DEFINE FIELD last_exit_at ON TABLE occupancy TYPE option<datetime>;
DEFINE FIELD peak_count ON TABLE occupancy TYPE int DEFAULT 0;
DEFINE FIELD peak_reset_at ON TABLE occupancy TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE occupancy TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_occupancy_tenant_zone ON TABLE occupancy \
    COLUMNS tenant_id, zone_id UNIQUE;

-- =======================================================================
-- Subject profiles (fed by the membership system)
-- =======================================================================
DEFINE TABLE subject_profile SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE subject_profile TYPE string;
DEFINE FIELD subject ON TABLE subject_profile TYPE string;
DEFINE FIELD roles ON TABLE subject_profile TYPE array<string> DEFAULT [];
DEFINE FIELD membership_types ON TABLE subject_profile \
    TYPE array<string> DEFAULT [];
DEFINE FIELD plan_types ON TABLE subject_profile TYPE array<string> \
    DEFAULT [];
DEFINE FIELD updated_at ON TABLE subject_profile TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_subject_profile_tenant_subject ON TABLE subject_profile \
    COLUMNS tenant_id, subject UNIQUE;

-- =======================================================================
-- Scan attempts (append-only)
-- =======================================================================
DEFINE TABLE scan_attempt SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE scan_attempt TYPE string;
DEFINE FIELD credential_id ON TABLE scan_attempt TYPE option<string>;
DEFINE FIELD subject ON TABLE scan_attempt TYPE option<string>;
DEFINE FIELD zone_id ON TABLE scan_attempt TYPE option<string>;
DEFINE FIELD device_id ON TABLE scan_attempt TYPE option<string>;
DEFINE FIELD ip_address ON TABLE scan_attempt TYPE option<string>;
DEFINE FIELD user_agent ON TABLE scan_attempt TYPE option<string>;
DEFINE FIELD outcome ON TABLE scan_attempt TYPE string \
    ASSERT $value IN ['Success', 'Expired', 'Invalid', 'Denied', \
    'Restricted', 'CapacityFull'];
DEFINE FIELD reason ON TABLE scan_attempt TYPE string;
DEFINE FIELD message ON TABLE scan_attempt TYPE string;
DEFINE FIELD timestamp ON TABLE scan_attempt TYPE datetime;
DEFINE INDEX idx_scan_attempt_tenant_ts ON TABLE scan_attempt \
    COLUMNS tenant_id, timestamp;

-- =======================================================================
-- Violations (append-only except for resolution)
-- =======================================================================
DEFINE TABLE violation SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE violation TYPE string;
DEFINE FIELD credential_id ON TABLE violation TYPE option<string>;
DEFINE FIELD subject ON TABLE violation TYPE option<string>;
DEFINE FIELD violation_type ON TABLE violation TYPE string \
    ASSERT $value IN ['ExpiredCredential', 'InvalidCredential', \
    'UnauthorizedZone', 'CapacityExceeded', 'MultipleEntries'];
DEFINE FIELD severity ON TABLE violation TYPE string \
    ASSERT $value IN ['Low', 'Medium', 'High', 'Critical'];
DEFINE FIELD severity_rank ON TABLE violation TYPE int;
DEFINE FIELD description ON TABLE violation TYPE string;
DEFINE FIELD zone_id ON TABLE violation TYPE option<string>;
DEFINE FIELD metadata ON TABLE violation TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD resolved ON TABLE violation TYPE bool DEFAULT false;
DEFINE FIELD resolved_by ON TABLE violation TYPE option<string>;
DEFINE FIELD resolved_at ON TABLE violation TYPE option<datetime>;
DEFINE FIELD timestamp ON TABLE violation TYPE datetime;
DEFINE INDEX idx_violation_tenant_ts ON TABLE violation \
    COLUMNS tenant_id, timestamp;
";

/// Highest migration version already recorded in `_migration`.
async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map(|m| m.version).unwrap_or(0))
}

/// Bring the database schema up to the latest version.
///
/// Idempotent: migrations already recorded in `_migration` are skipped.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let current_version = applied_version(db).await?;
    debug!(current_version, "Checked schema version");

    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
    {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "could not record v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

//! Integration tests for the conditional-update paths of the credential
//! and occupancy repositories.

use std::sync::Arc;

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::credential::{CreateCredential, CredentialKind, CredentialStatus};
use warden_core::models::subject::SubjectRef;
use warden_core::repository::{CredentialRepository, OccupancyRepository, Pagination};
use warden_db::repository::{SurrealCredentialRepository, SurrealOccupancyRepository};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();
    db
}

fn new_credential(tenant_id: Uuid, subject: SubjectRef, max_scans: Option<u32>) -> CreateCredential {
    let now = Utc::now();
    CreateCredential {
        id: Uuid::new_v4(),
        tenant_id,
        subject,
        kind: CredentialKind::Visitor,
        permissions: vec!["zone:lobby".into()],
        zones: vec![Uuid::new_v4()],
        valid_from: now,
        valid_until: now + Duration::hours(2),
        max_scans,
        payload_digest: "ab".repeat(32),
        issued_at: now,
        metadata: Some(serde_json::json!({"host": "reception"})),
    }
}

// -----------------------------------------------------------------------
// Credentials
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_and_get_credential() {
    let db = setup().await;
    let repo = SurrealCredentialRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let subject = SubjectRef::Visitor(Uuid::new_v4());

    let input = new_credential(tenant_id, subject, Some(2));
    let id = input.id;
    let created = repo.create(input).await.unwrap();
    assert_eq!(created.id, id);
    assert_eq!(created.status, CredentialStatus::Active);
    assert_eq!(created.scan_count, 0);
    assert_eq!(created.subject, subject);

    let fetched = repo.get_by_id(tenant_id, id).await.unwrap();
    assert_eq!(fetched.max_scans, Some(2));
    assert_eq!(fetched.zones, created.zones);
    assert_eq!(fetched.metadata["host"], "reception");

    let err = repo.get_by_id(Uuid::new_v4(), id).await.unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
}

#[tokio::test]
async fn record_scan_applies_only_on_expected_state() {
    let db = setup().await;
    let repo = SurrealCredentialRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let cred = repo
        .create(new_credential(
            tenant_id,
            SubjectRef::User(Uuid::new_v4()),
            Some(2),
        ))
        .await
        .unwrap();
    let now = Utc::now();

    let first = repo
        .record_scan(
            tenant_id,
            cred.id,
            CredentialStatus::Active,
            0,
            CredentialStatus::Active,
            now,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.scan_count, 1);
    assert_eq!(first.last_used_at, Some(now));

    // Stale expected count loses the race.
    let stale = repo
        .record_scan(
            tenant_id,
            cred.id,
            CredentialStatus::Active,
            0,
            CredentialStatus::Active,
            now,
        )
        .await
        .unwrap();
    assert!(stale.is_none());

    let last = repo
        .record_scan(
            tenant_id,
            cred.id,
            CredentialStatus::Active,
            1,
            CredentialStatus::UsedUp,
            now,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.scan_count, 2);
    assert_eq!(last.status, CredentialStatus::UsedUp);

    let after = repo
        .record_scan(
            tenant_id,
            cred.id,
            CredentialStatus::Active,
            2,
            CredentialStatus::UsedUp,
            now,
        )
        .await
        .unwrap();
    assert!(after.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_record_scan_commits_exactly_once() {
    let db = setup().await;
    let repo = Arc::new(SurrealCredentialRepository::new(db));
    let tenant_id = Uuid::new_v4();
    let cred = repo
        .create(new_credential(
            tenant_id,
            SubjectRef::User(Uuid::new_v4()),
            Some(1),
        ))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            repo.record_scan(
                tenant_id,
                cred.id,
                CredentialStatus::Active,
                0,
                CredentialStatus::UsedUp,
                Utc::now(),
            )
            .await
        }));
    }

    let mut committed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            committed += 1;
        }
    }
    assert_eq!(committed, 1);

    let stored = repo.get_by_id(tenant_id, cred.id).await.unwrap();
    assert_eq!(stored.scan_count, 1);
    assert_eq!(stored.status, CredentialStatus::UsedUp);
}

#[tokio::test]
async fn transition_and_revoke_require_active() {
    let db = setup().await;
    let repo = SurrealCredentialRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let subject = SubjectRef::User(Uuid::new_v4());

    let a = repo
        .create(new_credential(tenant_id, subject, None))
        .await
        .unwrap();
    let expired = repo
        .transition_status(
            tenant_id,
            a.id,
            CredentialStatus::Active,
            CredentialStatus::Expired,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(expired.status, CredentialStatus::Expired);

    let admin = Uuid::new_v4();
    assert!(
        repo.revoke(tenant_id, a.id, admin, Utc::now())
            .await
            .unwrap()
            .is_none()
    );

    let b = repo
        .create(new_credential(tenant_id, subject, None))
        .await
        .unwrap();
    let revoked = repo
        .revoke(tenant_id, b.id, admin, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(revoked.status, CredentialStatus::Revoked);
    assert_eq!(revoked.revoked_by, Some(admin));
    assert!(revoked.revoked_at.is_some());

    let page = repo
        .list_by_subject(tenant_id, subject, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    let other = repo
        .list_by_subject(
            tenant_id,
            SubjectRef::Visitor(subject.id()),
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(other.total, 0);
}

// -----------------------------------------------------------------------
// Occupancy
// -----------------------------------------------------------------------

#[tokio::test]
async fn occupancy_starts_at_zero_and_floors_at_zero() {
    let db = setup().await;
    let repo = SurrealOccupancyRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let zone_id = Uuid::new_v4();
    let now = Utc::now();

    let snapshot = repo.get_or_create(tenant_id, zone_id, 10, now).await.unwrap();
    assert_eq!(snapshot.current_count, 0);
    assert_eq!(snapshot.max_capacity, 10);
    assert_eq!(snapshot.peak_count, 0);

    let up = repo.apply_delta(tenant_id, zone_id, 3, 10, now).await.unwrap();
    assert_eq!(up.current_count, 3);
    assert_eq!(up.peak_count, 3);
    assert_eq!(up.last_entry_at, Some(now));

    let down = repo.apply_delta(tenant_id, zone_id, -5, 10, now).await.unwrap();
    assert_eq!(down.current_count, 0);
    assert_eq!(down.peak_count, 3);
    assert_eq!(down.last_exit_at, Some(now));
}

#[tokio::test]
async fn try_increment_stops_at_capacity() {
    let db = setup().await;
    let repo = SurrealOccupancyRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let zone_id = Uuid::new_v4();
    let now = Utc::now();

    assert!(
        repo.try_increment(tenant_id, zone_id, 2, now)
            .await
            .unwrap()
            .is_some()
    );
    let second = repo
        .try_increment(tenant_id, zone_id, 2, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.current_count, 2);
    assert!(second.is_full());

    assert!(
        repo.try_increment(tenant_id, zone_id, 2, now)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_admit_exactly_capacity() {
    let db = setup().await;
    let repo = Arc::new(SurrealOccupancyRepository::new(db));
    let tenant_id = Uuid::new_v4();
    let zone_id = Uuid::new_v4();
    repo.get_or_create(tenant_id, zone_id, 3, Utc::now())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            repo.try_increment(tenant_id, zone_id, 3, Utc::now()).await
        }));
    }
    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 3);

    let snapshot = repo.list(tenant_id, Some(zone_id)).await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].current_count, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deltas_on_a_new_zone_are_all_applied() {
    let db = setup().await;
    let repo = Arc::new(SurrealOccupancyRepository::new(db));
    let tenant_id = Uuid::new_v4();
    let zone_id = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            repo.apply_delta(tenant_id, zone_id, 1, 50, Utc::now()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let snapshot = repo.list(tenant_id, Some(zone_id)).await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].current_count, 16);
    assert_eq!(snapshot[0].peak_count, 16);
}

#[tokio::test]
async fn reset_peaks_and_tenants() {
    let db = setup().await;
    let repo = SurrealOccupancyRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let zone_a = Uuid::new_v4();
    let zone_b = Uuid::new_v4();
    let now = Utc::now();

    repo.apply_delta(tenant_id, zone_a, 4, 10, now).await.unwrap();
    repo.apply_delta(tenant_id, zone_a, -3, 10, now).await.unwrap();
    repo.apply_delta(tenant_id, zone_b, 1, 10, now).await.unwrap();

    let touched = repo.reset_peaks(tenant_id, now).await.unwrap();
    assert_eq!(touched, 2);

    let all = repo.list(tenant_id, None).await.unwrap();
    let a = all.iter().find(|s| s.zone_id == zone_a).unwrap();
    assert_eq!(a.peak_count, 1);
    assert_eq!(a.peak_reset_at, now);

    let tenants = repo.tenants().await.unwrap();
    assert!(tenants.contains(&tenant_id));
}

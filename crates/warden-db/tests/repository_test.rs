//! Integration tests for zone, rule, subject profile and audit
//! repositories using in-memory SurrealDB.

use chrono::{Duration, NaiveTime, TimeZone, Utc, Weekday};
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::audit::{
    CreateScanAttempt, CreateViolation, DeviceInfo, ScanOutcome, ScanReason, Severity,
    ViolationType,
};
use warden_core::models::rule::{CreateAccessRule, TimeWindow, UpdateAccessRule};
use warden_core::models::subject::{SubjectRef, UpsertSubjectProfile};
use warden_core::models::zone::{CreateZone, UpdateZone, ZoneType};
use warden_core::repository::{
    AccessRuleRepository, Pagination, ScanAttemptFilter, ScanAuditRepository,
    SubjectProfileRepository, ViolationFilter, ZoneRepository,
};
use warden_db::repository::{
    SurrealAccessRuleRepository, SurrealScanAuditRepository, SurrealSubjectProfileRepository,
    SurrealZoneRepository,
};

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();
    db
}

// -----------------------------------------------------------------------
// Migrations
// -----------------------------------------------------------------------

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = setup().await;
    warden_db::run_migrations(&db).await.unwrap();
}

// -----------------------------------------------------------------------
// Zones
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_get_and_update_zone() {
    let db = setup().await;
    let repo = SurrealZoneRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let zone = repo
        .create(CreateZone {
            tenant_id,
            name: "Lobby".into(),
            zone_type: ZoneType::General,
            max_capacity: Some(40),
        })
        .await
        .unwrap();
    assert!(zone.active);
    assert_eq!(zone.max_capacity, Some(40));

    let fetched = repo.get_by_id(tenant_id, zone.id).await.unwrap();
    assert_eq!(fetched.name, "Lobby");
    assert_eq!(fetched.zone_type, ZoneType::General);

    let updated = repo
        .update(
            tenant_id,
            zone.id,
            UpdateZone {
                name: None,
                zone_type: Some(ZoneType::Amenity),
                max_capacity: Some(None),
                active: Some(false),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Lobby");
    assert_eq!(updated.zone_type, ZoneType::Amenity);
    assert_eq!(updated.max_capacity, None);
    assert!(!updated.active);
}

#[tokio::test]
async fn zone_is_invisible_to_other_tenants() {
    let db = setup().await;
    let repo = SurrealZoneRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let zone = repo
        .create(CreateZone {
            tenant_id,
            name: "Vault".into(),
            zone_type: ZoneType::Restricted,
            max_capacity: None,
        })
        .await
        .unwrap();

    let err = repo.get_by_id(Uuid::new_v4(), zone.id).await.unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));

    let page = repo
        .list(Uuid::new_v4(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn list_zones_paginates_by_name() {
    let db = setup().await;
    let repo = SurrealZoneRepository::new(db);
    let tenant_id = Uuid::new_v4();

    for name in ["C", "A", "B"] {
        repo.create(CreateZone {
            tenant_id,
            name: name.into(),
            zone_type: ZoneType::MeetingRoom,
            max_capacity: Some(8),
        })
        .await
        .unwrap();
    }

    let page = repo
        .list(
            tenant_id,
            Pagination {
                offset: 0,
                limit: 2,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    let names: Vec<_> = page.items.iter().map(|z| z.name.as_str()).collect();
    assert_eq!(names, ["A", "B"]);
}

#[tokio::test]
async fn duplicate_zone_name_rejected() {
    let db = setup().await;
    let repo = SurrealZoneRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let input = CreateZone {
        tenant_id,
        name: "Studio".into(),
        zone_type: ZoneType::PrivateOffice,
        max_capacity: None,
    };
    repo.create(input.clone()).await.unwrap();
    assert!(repo.create(input).await.is_err());
}

// -----------------------------------------------------------------------
// Access rules
// -----------------------------------------------------------------------

#[tokio::test]
async fn rule_round_trips_window_and_days() {
    let db = setup().await;
    let repo = SurrealAccessRuleRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let zone_id = Uuid::new_v4();

    let window = TimeWindow::new(
        NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
    );
    let rule = repo
        .create(CreateAccessRule {
            tenant_id,
            name: "Night shift".into(),
            zone_id: Some(zone_id),
            roles: vec!["security".into()],
            time_window: Some(window),
            allowed_days: vec![Weekday::Mon, Weekday::Fri],
            max_occupancy: Some(3),
            priority: 10,
            ..Default::default()
        })
        .await
        .unwrap();

    let fetched = repo.get_by_id(tenant_id, rule.id).await.unwrap();
    assert_eq!(fetched.time_window, Some(window));
    assert_eq!(fetched.allowed_days, vec![Weekday::Mon, Weekday::Fri]);
    assert_eq!(fetched.zone_id, Some(zone_id));
    assert_eq!(fetched.max_occupancy, Some(3));
    assert_eq!(fetched.priority, 10);
    assert!(fetched.active);
}

#[tokio::test]
async fn active_rules_filter_by_zone_window_and_flag() {
    let db = setup().await;
    let repo = SurrealAccessRuleRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let zone_a = Uuid::new_v4();
    let zone_b = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2024, 6, 4, 12, 0, 0).unwrap();

    let global = repo
        .create(CreateAccessRule {
            tenant_id,
            name: "global".into(),
            priority: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    let for_a = repo
        .create(CreateAccessRule {
            tenant_id,
            name: "zone a".into(),
            zone_id: Some(zone_a),
            priority: 5,
            ..Default::default()
        })
        .await
        .unwrap();
    repo.create(CreateAccessRule {
        tenant_id,
        name: "zone b".into(),
        zone_id: Some(zone_b),
        ..Default::default()
    })
    .await
    .unwrap();
    repo.create(CreateAccessRule {
        tenant_id,
        name: "expired".into(),
        valid_until: Some(now - Duration::days(1)),
        ..Default::default()
    })
    .await
    .unwrap();
    let disabled = repo
        .create(CreateAccessRule {
            tenant_id,
            name: "disabled".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    repo.deactivate(tenant_id, disabled.id).await.unwrap();

    let rules = repo
        .get_active_rules(tenant_id, Some(zone_a), now)
        .await
        .unwrap();
    let ids: Vec<_> = rules.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![for_a.id, global.id]);

    let unscoped = repo.get_active_rules(tenant_id, None, now).await.unwrap();
    let ids: Vec<_> = unscoped.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![global.id]);
}

#[tokio::test]
async fn update_rule_clears_optional_fields() {
    let db = setup().await;
    let repo = SurrealAccessRuleRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let rule = repo
        .create(CreateAccessRule {
            tenant_id,
            name: "capped".into(),
            max_occupancy: Some(4),
            requires_approval: true,
            ..Default::default()
        })
        .await
        .unwrap();

    let updated = repo
        .update(
            tenant_id,
            rule.id,
            UpdateAccessRule {
                max_occupancy: Some(None),
                requires_approval: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.max_occupancy, None);
    assert!(!updated.requires_approval);
    assert_eq!(updated.name, "capped");
}

#[tokio::test]
async fn deactivate_unknown_rule_is_not_found() {
    let db = setup().await;
    let repo = SurrealAccessRuleRepository::new(db);

    let err = repo
        .deactivate(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
}

// -----------------------------------------------------------------------
// Subject profiles
// -----------------------------------------------------------------------

#[tokio::test]
async fn upsert_replaces_profile() {
    let db = setup().await;
    let repo = SurrealSubjectProfileRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let subject = SubjectRef::User(Uuid::new_v4());

    assert!(repo.get(tenant_id, subject).await.unwrap().is_none());

    repo.upsert(
        tenant_id,
        subject,
        UpsertSubjectProfile {
            roles: vec!["member".into()],
            membership_types: vec!["hot_desk".into()],
            plan_types: vec![],
        },
    )
    .await
    .unwrap();

    let profile = repo
        .upsert(
            tenant_id,
            subject,
            UpsertSubjectProfile {
                roles: vec!["member".into()],
                membership_types: vec!["dedicated_desk".into()],
                plan_types: vec!["monthly".into()],
            },
        )
        .await
        .unwrap();
    assert_eq!(profile.subject, subject);
    assert_eq!(profile.membership_types, vec!["dedicated_desk".to_string()]);

    let fetched = repo.get(tenant_id, subject).await.unwrap().unwrap();
    assert_eq!(fetched.plan_types, vec!["monthly".to_string()]);

    assert!(repo.get(Uuid::new_v4(), subject).await.unwrap().is_none());
}

// -----------------------------------------------------------------------
// Audit
// -----------------------------------------------------------------------

fn scan(tenant_id: Uuid, reason: ScanReason, zone_id: Option<Uuid>) -> CreateScanAttempt {
    CreateScanAttempt {
        tenant_id,
        credential_id: Some(Uuid::new_v4()),
        subject: Some(SubjectRef::Visitor(Uuid::new_v4())),
        zone_id,
        device: DeviceInfo {
            device_id: Some("reader-1".into()),
            ip_address: None,
            user_agent: None,
        },
        reason,
        message: reason.as_str().into(),
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn scan_attempts_are_filtered_by_outcome_and_zone() {
    let db = setup().await;
    let repo = SurrealScanAuditRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let zone_id = Uuid::new_v4();

    let granted = repo
        .append_scan_attempt(scan(tenant_id, ScanReason::Granted, Some(zone_id)))
        .await
        .unwrap();
    assert_eq!(granted.outcome, ScanOutcome::Success);
    assert_eq!(granted.device.device_id.as_deref(), Some("reader-1"));

    repo.append_scan_attempt(scan(tenant_id, ScanReason::CapacityFull, Some(zone_id)))
        .await
        .unwrap();
    repo.append_scan_attempt(scan(tenant_id, ScanReason::Invalid, None))
        .await
        .unwrap();
    repo.append_scan_attempt(scan(Uuid::new_v4(), ScanReason::Granted, Some(zone_id)))
        .await
        .unwrap();

    let all = repo
        .list_scan_attempts(tenant_id, ScanAttemptFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.total, 3);

    let in_zone = repo
        .list_scan_attempts(
            tenant_id,
            ScanAttemptFilter {
                zone_id: Some(zone_id),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(in_zone.total, 2);

    let full = repo
        .list_scan_attempts(
            tenant_id,
            ScanAttemptFilter {
                outcome: Some(ScanOutcome::CapacityFull),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(full.items.len(), 1);
    assert_eq!(full.items[0].reason, ScanReason::CapacityFull);
}

#[tokio::test]
async fn violations_filter_by_severity_and_resolve_once() {
    let db = setup().await;
    let repo = SurrealScanAuditRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let make = |violation_type, severity| CreateViolation {
        tenant_id,
        credential_id: None,
        subject: None,
        violation_type,
        severity,
        description: "test".into(),
        zone_id: None,
        metadata: None,
        timestamp: Utc::now(),
    };

    let high = repo
        .append_violation(make(ViolationType::InvalidCredential, Severity::High))
        .await
        .unwrap();
    repo.append_violation(make(ViolationType::CapacityExceeded, Severity::Low))
        .await
        .unwrap();
    repo.append_violation(make(ViolationType::ExpiredCredential, Severity::Medium))
        .await
        .unwrap();

    let serious = repo
        .list_violations(
            tenant_id,
            ViolationFilter {
                min_severity: Some(Severity::Medium),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(serious.total, 2);
    assert!(serious.items.iter().all(|v| v.severity >= Severity::Medium));

    let admin = Uuid::new_v4();
    let resolved = repo
        .resolve_violation(tenant_id, high.id, admin, Utc::now())
        .await
        .unwrap();
    assert!(resolved.resolved);
    assert_eq!(resolved.resolved_by, Some(admin));

    let again = repo
        .resolve_violation(tenant_id, high.id, Uuid::new_v4(), Utc::now())
        .await
        .unwrap();
    assert_eq!(again.resolved_by, Some(admin));

    let open = repo
        .list_violations(
            tenant_id,
            ViolationFilter {
                resolved: Some(false),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(open.total, 2);

    let err = repo
        .resolve_violation(Uuid::new_v4(), high.id, admin, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
}

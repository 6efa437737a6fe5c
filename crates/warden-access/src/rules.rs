//! Rule evaluation engine.
//!
//! [`evaluate_rules`] is the pure core: it takes the rules that apply
//! to a scan, what is known about the subject, the facility-local time
//! and the zone's current head count, and returns a decision. Every
//! applicable rule must permit the scan on its own (deny-overrides).
//! [`AccessService::evaluate`] wires it to the store.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::audit::ScanReason;
use warden_core::models::rule::AccessRule;
use warden_core::models::subject::SubjectContext;
use warden_core::repository::{AccessRuleRepository, AccessStore, OccupancyRepository};

use crate::service::AccessService;

/// Permission a subject must carry to pass a `requires_approval` rule.
pub const APPROVAL_PERMISSION: &str = "zone:approved";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RuleViolationKind {
    OutsideTimeWindow,
    DayNotAllowed,
    NotEligible,
    ApprovalRequired,
    OccupancyCapReached,
}

impl RuleViolationKind {
    /// Scan reason reported when this violation denies a scan.
    pub fn reason(&self) -> ScanReason {
        match self {
            RuleViolationKind::OutsideTimeWindow | RuleViolationKind::DayNotAllowed => {
                ScanReason::Restricted
            }
            RuleViolationKind::NotEligible | RuleViolationKind::ApprovalRequired => {
                ScanReason::Denied
            }
            RuleViolationKind::OccupancyCapReached => ScanReason::CapacityFull,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleViolation {
    pub rule_id: Uuid,
    pub kind: RuleViolationKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleDecision {
    pub allowed: bool,
    /// Reason of the first violation, or `Denied` when the scan is
    /// refused because no rule applies.
    pub reason: Option<ScanReason>,
    /// Every violation found, ordered by rule priority.
    pub violations: Vec<RuleViolation>,
}

impl RuleDecision {
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.message.clone()).collect()
    }
}

fn intersects(required: &[String], held: &[String]) -> bool {
    required.is_empty() || required.iter().any(|r| held.contains(r))
}

fn check_rule(
    rule: &AccessRule,
    ctx: &SubjectContext,
    local_now: NaiveDateTime,
    occupancy: Option<u32>,
) -> Vec<RuleViolation> {
    let mut found = Vec::new();
    let mut deny = |kind, message: String| {
        found.push(RuleViolation {
            rule_id: rule.id,
            kind,
            message,
        })
    };

    if let Some(window) = rule.time_window {
        if !window.contains(local_now.time()) {
            deny(
                RuleViolationKind::OutsideTimeWindow,
                format!(
                    "{}: access only between {} and {}",
                    rule.name,
                    window.start.format("%H:%M"),
                    window.end.format("%H:%M")
                ),
            );
        }
    }

    if !rule.allowed_days.is_empty() && !rule.allowed_days.contains(&local_now.weekday()) {
        deny(
            RuleViolationKind::DayNotAllowed,
            format!("{}: no access on {}", rule.name, local_now.weekday()),
        );
    }

    let eligible = intersects(&rule.membership_types, &ctx.membership_types)
        && intersects(&rule.plan_types, &ctx.plan_types)
        && intersects(&rule.roles, &ctx.roles);
    if !eligible {
        deny(
            RuleViolationKind::NotEligible,
            format!("{}: subject is not eligible", rule.name),
        );
    }

    if rule.requires_approval && !ctx.permissions.iter().any(|p| p == APPROVAL_PERMISSION) {
        deny(
            RuleViolationKind::ApprovalRequired,
            format!("{}: approval required", rule.name),
        );
    }

    if let (Some(cap), Some(count)) = (rule.max_occupancy, occupancy) {
        if count >= cap {
            deny(
                RuleViolationKind::OccupancyCapReached,
                format!("{}: occupancy cap of {cap} reached", rule.name),
            );
        }
    }

    found
}

/// Evaluate `rules` against one scan.
///
/// `local_now` is facility-local time. `occupancy` is the zone's
/// current count, `None` when the scan is not zone-scoped (occupancy
/// caps are then skipped). With no rules the decision is
/// `open_by_default`.
pub fn evaluate_rules(
    rules: &[AccessRule],
    ctx: &SubjectContext,
    local_now: NaiveDateTime,
    occupancy: Option<u32>,
    open_by_default: bool,
) -> RuleDecision {
    if rules.is_empty() {
        return RuleDecision {
            allowed: open_by_default,
            reason: (!open_by_default).then_some(ScanReason::Denied),
            violations: Vec::new(),
        };
    }

    let mut ordered: Vec<&AccessRule> = rules.iter().collect();
    ordered.sort_by_key(|r| std::cmp::Reverse(r.priority));

    let violations: Vec<RuleViolation> = ordered
        .into_iter()
        .flat_map(|rule| check_rule(rule, ctx, local_now, occupancy))
        .collect();

    RuleDecision {
        allowed: violations.is_empty(),
        reason: violations.first().map(|v| v.kind.reason()),
        violations,
    }
}

impl<S: AccessStore> AccessService<S> {
    /// Facility-local wall-clock time for `now`.
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        let offset = FixedOffset::east_opt(self.config.facility_utc_offset_secs)
            .unwrap_or_else(|| Utc.fix());
        now.with_timezone(&offset).naive_local()
    }

    /// Evaluate the active rules of a tenant for one subject.
    ///
    /// With a zone, zone-scoped and unscoped rules apply and the zone's
    /// current occupancy is read when any rule caps it. Without a zone
    /// only unscoped rules apply.
    pub async fn evaluate(
        &self,
        tenant_id: Uuid,
        zone_id: Option<Uuid>,
        ctx: &SubjectContext,
        now: DateTime<Utc>,
    ) -> WardenResult<(RuleDecision, Vec<AccessRule>)> {
        let rules = self
            .bounded(
                "get_active_rules",
                self.store.rules().get_active_rules(tenant_id, zone_id, now),
            )
            .await?;

        let occupancy = match zone_id {
            Some(zone_id) if rules.iter().any(|r| r.max_occupancy.is_some()) => {
                let capacity = rules
                    .iter()
                    .filter_map(|r| r.max_occupancy)
                    .min()
                    .unwrap_or(self.config.default_zone_capacity);
                let snapshot = self
                    .bounded(
                        "occupancy_get_or_create",
                        self.store
                            .occupancy()
                            .get_or_create(tenant_id, zone_id, capacity, now),
                    )
                    .await?;
                Some(snapshot.current_count)
            }
            _ => None,
        };

        let decision = evaluate_rules(
            &rules,
            ctx,
            self.local_time(now),
            occupancy,
            self.config.open_by_default,
        );
        Ok((decision, rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Weekday};
    use warden_core::models::rule::TimeWindow;
    use warden_core::models::subject::SubjectRef;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn rule(name: &str) -> AccessRule {
        let now = Utc::now();
        AccessRule {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: name.into(),
            zone_id: None,
            membership_types: vec![],
            plan_types: vec![],
            roles: vec![],
            time_window: None,
            allowed_days: vec![],
            max_occupancy: None,
            requires_approval: false,
            priority: 0,
            valid_from: None,
            valid_until: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn office_hours() -> AccessRule {
        AccessRule {
            time_window: Some(TimeWindow::new(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            )),
            allowed_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            ..rule("Meeting Room A hours")
        }
    }

    fn member(membership: &str) -> SubjectContext {
        SubjectContext {
            subject: Some(SubjectRef::User(Uuid::new_v4())),
            membership_types: vec![membership.into()],
            ..Default::default()
        }
    }

    #[test]
    fn weekday_window_denies_saturday_and_allows_tuesday() {
        let rules = vec![office_hours()];
        let ctx = member("hot_desk");

        // 2024-06-01 is a Saturday, 2024-06-04 a Tuesday.
        let saturday = evaluate_rules(&rules, &ctx, at(2024, 6, 1, 10, 0), None, true);
        assert!(!saturday.allowed);
        assert_eq!(saturday.reason, Some(ScanReason::Restricted));
        assert_eq!(saturday.violations[0].kind, RuleViolationKind::DayNotAllowed);

        let tuesday = evaluate_rules(&rules, &ctx, at(2024, 6, 4, 10, 0), None, true);
        assert!(tuesday.allowed);
        assert!(tuesday.reason.is_none());
    }

    #[test]
    fn outside_hours_is_restricted() {
        let rules = vec![office_hours()];
        let decision = evaluate_rules(&rules, &member("x"), at(2024, 6, 4, 18, 30), None, true);
        assert_eq!(decision.reason, Some(ScanReason::Restricted));
        assert_eq!(
            decision.violations[0].kind,
            RuleViolationKind::OutsideTimeWindow
        );
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let night = AccessRule {
            time_window: Some(TimeWindow::new(
                NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            )),
            ..rule("night shift")
        };
        let rules = vec![night];
        let ctx = SubjectContext::default();

        assert!(evaluate_rules(&rules, &ctx, at(2024, 6, 4, 23, 30), None, true).allowed);
        assert!(evaluate_rules(&rules, &ctx, at(2024, 6, 5, 5, 59), None, true).allowed);
        assert!(!evaluate_rules(&rules, &ctx, at(2024, 6, 5, 12, 0), None, true).allowed);
    }

    #[test]
    fn deny_overrides_allow() {
        let permissive = AccessRule {
            priority: 10,
            ..rule("everyone")
        };
        let members_only = AccessRule {
            membership_types: vec!["dedicated_desk".into()],
            priority: 1,
            ..rule("dedicated only")
        };
        let rules = vec![permissive, members_only.clone()];

        let decision = evaluate_rules(&rules, &member("hot_desk"), at(2024, 6, 4, 10, 0), None, true);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(ScanReason::Denied));
        assert_eq!(decision.violations.len(), 1);
        assert_eq!(decision.violations[0].rule_id, members_only.id);

        let ok = evaluate_rules(
            &rules,
            &member("dedicated_desk"),
            at(2024, 6, 4, 10, 0),
            None,
            true,
        );
        assert!(ok.allowed);
    }

    #[test]
    fn violations_are_ordered_by_priority() {
        let low = AccessRule {
            roles: vec!["staff".into()],
            priority: -5,
            ..rule("staff only")
        };
        let high = AccessRule {
            allowed_days: vec![Weekday::Mon],
            priority: 50,
            ..rule("mondays")
        };
        let decision = evaluate_rules(
            &[low.clone(), high.clone()],
            &SubjectContext::default(),
            at(2024, 6, 4, 10, 0),
            None,
            true,
        );
        let ids: Vec<_> = decision.violations.iter().map(|v| v.rule_id).collect();
        assert_eq!(ids, vec![high.id, low.id]);
        assert_eq!(decision.reason, Some(ScanReason::Restricted));
    }

    #[test]
    fn approval_requires_permission() {
        let rules = vec![AccessRule {
            requires_approval: true,
            ..rule("vault")
        }];
        let mut ctx = member("any");
        let denied = evaluate_rules(&rules, &ctx, at(2024, 6, 4, 10, 0), None, true);
        assert_eq!(
            denied.violations[0].kind,
            RuleViolationKind::ApprovalRequired
        );

        ctx.permissions.push(APPROVAL_PERMISSION.into());
        assert!(evaluate_rules(&rules, &ctx, at(2024, 6, 4, 10, 0), None, true).allowed);
    }

    #[test]
    fn occupancy_cap_only_applies_with_a_count() {
        let rules = vec![AccessRule {
            max_occupancy: Some(2),
            ..rule("small room")
        }];
        let ctx = SubjectContext::default();
        let now = at(2024, 6, 4, 10, 0);

        assert!(evaluate_rules(&rules, &ctx, now, Some(1), true).allowed);
        let full = evaluate_rules(&rules, &ctx, now, Some(2), true);
        assert_eq!(full.reason, Some(ScanReason::CapacityFull));
        assert!(evaluate_rules(&rules, &ctx, now, None, true).allowed);
    }

    #[test]
    fn no_rules_follows_default_posture() {
        let ctx = SubjectContext::default();
        let now = at(2024, 6, 4, 10, 0);

        let open = evaluate_rules(&[], &ctx, now, None, true);
        assert!(open.allowed);
        assert!(open.reason.is_none());

        let closed = evaluate_rules(&[], &ctx, now, None, false);
        assert!(!closed.allowed);
        assert_eq!(closed.reason, Some(ScanReason::Denied));
    }
}

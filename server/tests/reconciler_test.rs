//! Reconciliation Integration Tests
//!
//! End-to-end runs of the per-event pipeline against the in-memory platform.
//! Time is paused so audit backoff sleeps complete instantly.
//!
//! Run with: `cargo test --test reconciler_test`

mod helpers;

use std::sync::atomic::Ordering;

use helpers::{
    roles, FakePlatform, Harness, Mutation, AREA_LEADER, ENGINE, LEADER, LOG_CHANNEL, LOG_EXEMPT,
    MIGRATOR, OWNER, REGULAR, SHOP_BOT, TARGET,
};
use rw_common::{MemberId, RoleId};
use rw_server::authz::{ReasonCode, RoleDelta, Verdict};
use rw_server::engine::{resolve_engine_user, Disposition};
use rw_server::enforce::EnforcementAction;
use rw_server::platform::MutationOutcome;
use rw_server::policy::ClassLabel;

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_junior_rank_granted_by_leadership_is_kept() {
    let h = Harness::new();
    let event = h.change(Some(LEADER), &[], &[101]);

    let report = h.reconciler.process(&event).await;

    assert_eq!(report.roles.len(), 1);
    let decision = report.roles[0].decision().unwrap();
    assert_eq!(decision.verdict, Verdict::Allow);
    assert_eq!(decision.reason, ReasonCode::JuniorHierarchyLeadership);
    assert!(h.platform.mutations().is_empty());
    assert!(h.platform.logs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_senior_rank_granted_by_plain_leadership_is_reverted() {
    let h = Harness::new();
    let event = h.change(Some(LEADER), &[101], &[101, 102]);

    let report = h.reconciler.process(&event).await;

    assert_eq!(
        h.platform.mutations(),
        vec![Mutation::Remove(TARGET, RoleId::new(102))]
    );
    assert!(!h.platform.member_roles(TARGET).contains(&RoleId::new(102)));

    let logs = h.platform.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].reason, ReasonCode::SeniorHierarchyRequiresAreaLeader);
    assert_eq!(logs[0].executor_id, Some(LEADER));
    assert_eq!(logs[0].action, EnforcementAction::Reverted);
    assert_eq!(logs[0].event_id, event.event_id);
    assert_eq!(h.platform.log_channels(), vec![LOG_CHANNEL]);

    assert_eq!(report.policy_version, 7);
}

#[tokio::test(start_paused = true)]
async fn test_purchasable_role_from_regular_member_is_reverted_with_alert() {
    let h = Harness::new();
    let event = h.change(Some(REGULAR), &[], &[500]);

    h.reconciler.process(&event).await;

    assert_eq!(
        h.platform.mutations(),
        vec![Mutation::Remove(TARGET, RoleId::new(500))]
    );
    let logs = h.platform.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].class, ClassLabel::Purchasable);
    assert_eq!(logs[0].mentions.roles, roles(&[910]));
}

#[tokio::test(start_paused = true)]
async fn test_monitored_role_is_only_reported() {
    let h = Harness::new();
    let event = h.change(Some(REGULAR), &[], &[530]);

    h.reconciler.process(&event).await;

    assert!(h.platform.mutations().is_empty());
    let logs = h.platform.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].verdict, Verdict::Allow);
    assert_eq!(logs[0].reason, ReasonCode::MonitoredRole);
    assert_eq!(logs[0].action, EnforcementAction::None);
}

#[tokio::test(start_paused = true)]
async fn test_unresolved_executor_is_fail_open() {
    let h = Harness::new();
    let event = h.change(None, &[], &[102]);
    let start = tokio::time::Instant::now();

    let report = h.reconciler.process(&event).await;

    assert!(h.platform.mutations().is_empty());
    let logs = h.platform.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].verdict, Verdict::Suppressed);
    assert_eq!(logs[0].executor_id, None);
    assert_eq!(logs[0].executor_label(), "unknown");

    assert_eq!(report.roles[0].attempts, 4);
    assert_eq!(h.platform.audit_calls.load(Ordering::SeqCst), 4);
    assert!(start.elapsed() <= std::time::Duration::from_millis(4200));
}

#[tokio::test(start_paused = true)]
async fn test_protected_role_removed_by_regular_member_is_restored() {
    let h = Harness::new();
    let event = h.change(Some(REGULAR), &[101, 400], &[101]);

    let report = h.reconciler.process(&event).await;

    assert_eq!(
        h.platform.mutations(),
        vec![Mutation::Add(TARGET, RoleId::new(400))]
    );
    assert!(h.platform.member_roles(TARGET).contains(&RoleId::new(400)));
    assert_eq!(report.roles[0].delta, RoleDelta::Removed);

    let logs = h.platform.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, EnforcementAction::Restored);
    assert_eq!(logs[0].class, ClassLabel::Protected);
}

// ============================================================================
// Further behavior
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_protected_role_removed_by_leadership_is_accepted() {
    let h = Harness::new();
    let event = h.change(Some(LEADER), &[400], &[]);

    h.reconciler.process(&event).await;

    assert!(h.platform.mutations().is_empty());
    assert!(h.platform.logs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_owner_grants_are_never_enforced() {
    let h = Harness::new();
    let event = h.change(Some(OWNER), &[], &[104, 500, 200]);

    let report = h.reconciler.process(&event).await;

    assert_eq!(report.roles.len(), 3);
    assert!(report
        .roles
        .iter()
        .all(|r| r.decision().is_some_and(|d| d.reason == ReasonCode::Owner)));
    assert!(h.platform.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_area_leader_may_grant_senior_rank() {
    let h = Harness::new();
    let event = h.change(Some(AREA_LEADER), &[101], &[101, 102]);

    h.reconciler.process(&event).await;

    assert!(h.platform.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shop_bot_may_grant_purchasable_role() {
    let h = Harness::new();
    let event = h.change(Some(SHOP_BOT), &[], &[500]);

    h.reconciler.process(&event).await;

    assert!(h.platform.mutations().is_empty());
    assert!(h.platform.logs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_migration_grants_fallback_rank() {
    let h = Harness::new();
    let event = h.change(Some(MIGRATOR), &[], &[101]);

    h.reconciler.process(&event).await;

    assert_eq!(
        h.platform.mutations(),
        vec![Mutation::Add(TARGET, RoleId::new(100))]
    );
    let logs = h.platform.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, EnforcementAction::FallbackGranted);
    assert_eq!(logs[0].fallback_role_id, Some(RoleId::new(100)));
}

#[tokio::test(start_paused = true)]
async fn test_engine_changes_are_not_reevaluated() {
    let h = Harness::new();
    let event = h.change(Some(ENGINE), &[101], &[100, 101]);

    let report = h.reconciler.process(&event).await;

    assert_eq!(report.roles[0].disposition, Disposition::EngineAction);
    assert!(h.platform.mutations().is_empty());
    assert!(h.platform.logs().is_empty());
    // Engine roles are never looked up
    assert_eq!(h.platform.member_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unclassified_roles_are_ignored() {
    let h = Harness::new();
    let event = h.change(Some(REGULAR), &[], &[424242]);

    let report = h.reconciler.process(&event).await;

    assert!(report.roles.is_empty());
    assert_eq!(h.platform.audit_calls.load(Ordering::SeqCst), 0);
    assert!(h.platform.logs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_lagging_audit_trail_still_resolves() {
    let platform = FakePlatform::new();
    platform.set_audit_lag(2);
    let h = Harness::with_platform(platform);
    let event = h.change(Some(LEADER), &[101], &[101, 102]);

    let report = h.reconciler.process(&event).await;

    assert_eq!(report.roles[0].attempts, 3);
    assert_eq!(report.roles[0].executor_id, Some(LEADER));
    assert_eq!(h.platform.mutations().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_mutation_does_not_stop_sibling_roles() {
    let platform = FakePlatform::new();
    platform.fail_mutations_for(500);
    let h = Harness::with_platform(platform);
    let event = h.change(Some(REGULAR), &[], &[500, 102]);

    let report = h.reconciler.process(&event).await;

    assert_eq!(
        h.platform.mutations(),
        vec![
            Mutation::Remove(TARGET, RoleId::new(500)),
            Mutation::Remove(TARGET, RoleId::new(102)),
        ]
    );
    let logs = h.platform.logs();
    assert_eq!(logs.len(), 2);
    assert!(logs[0].action_failed);
    assert!(!logs[1].action_failed);
    assert!(report.roles[0].outcome().unwrap().mutation.unwrap().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_executor_roles_are_fetched_once_per_event() {
    let h = Harness::new();
    let event = h.change(Some(LEADER), &[], &[100, 101]);

    h.reconciler.process(&event).await;

    assert_eq!(h.platform.member_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_removing_absent_role_is_a_no_op() {
    let h = Harness::new();
    let event = h.change(Some(REGULAR), &[], &[500]);
    // Someone else already took the role away again
    h.platform.with_member(TARGET, &[]);

    let report = h.reconciler.process(&event).await;

    let outcome = report.roles[0].outcome().unwrap();
    assert_eq!(outcome.mutation, Some(Ok(MutationOutcome::AlreadyInState)));
    assert_eq!(h.platform.logs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_log_exempt_executor_is_enforced_silently() {
    let h = Harness::new();
    let event = h.change(Some(LOG_EXEMPT), &[], &[500]);

    h.reconciler.process(&event).await;

    assert_eq!(h.platform.mutations().len(), 1);
    assert!(h.platform.logs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_events_for_same_role_are_harmless() {
    let h = Harness::new();
    let first = h.change(Some(REGULAR), &[], &[500]);
    let second = first.clone();

    let (a, b) = tokio::join!(
        h.reconciler.process(&first),
        h.reconciler.process(&second)
    );

    assert_eq!(a.roles.len(), 1);
    assert_eq!(b.roles.len(), 1);
    assert!(!h.platform.member_roles(TARGET).contains(&RoleId::new(500)));
    let outcomes: Vec<_> = [a, b]
        .iter()
        .filter_map(|r| r.roles[0].outcome().and_then(|o| o.mutation))
        .collect();
    assert!(outcomes.contains(&Ok(MutationOutcome::Applied)));
    assert!(outcomes.contains(&Ok(MutationOutcome::AlreadyInState)));
}

#[tokio::test(start_paused = true)]
async fn test_discovered_engine_id_keeps_fallback_grant() {
    let h = Harness::with_discovered_engine().await;

    // Migration grant; the engine adds the fallback rank
    let migration = h.change(Some(MIGRATOR), &[], &[101]);
    h.reconciler.process(&migration).await;
    assert_eq!(
        h.platform.mutations(),
        vec![Mutation::Add(TARGET, RoleId::new(100))]
    );

    // The platform then reports the engine's own grant back
    let echo = h.change(Some(ENGINE), &[101], &[100, 101]);
    let report = h.reconciler.process(&echo).await;

    assert_eq!(report.roles[0].disposition, Disposition::EngineAction);
    assert_eq!(
        h.platform.mutations(),
        vec![Mutation::Add(TARGET, RoleId::new(100))]
    );
    assert!(h.platform.member_roles(TARGET).contains(&RoleId::new(100)));
    assert_eq!(h.platform.logs().len(), 1);
}

#[tokio::test]
async fn test_configured_engine_id_takes_precedence() {
    let platform = FakePlatform::new();

    let configured = resolve_engine_user(Some(MemberId::new(5)), &platform)
        .await
        .unwrap();
    let discovered = resolve_engine_user(None, &platform).await.unwrap();

    assert_eq!(configured, MemberId::new(5));
    assert_eq!(discovered, ENGINE);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_executor_roles_are_fail_open() {
    let h = Harness::new();
    // Resolves from the audit trail but is unknown to the member lookup
    let departed = MemberId::new(82);
    let event = h.change(Some(departed), &[101], &[101, 102]);
    let start = tokio::time::Instant::now();

    let report = h.reconciler.process(&event).await;

    assert!(h.platform.mutations().is_empty());
    assert_eq!(h.platform.member_fetches.load(Ordering::SeqCst), 4);
    assert!(start.elapsed() <= std::time::Duration::from_millis(4200));

    let decision = report.roles[0].decision().unwrap();
    assert_eq!(decision.verdict, Verdict::Suppressed);
    assert_eq!(decision.reason, ReasonCode::ExecutorRolesUnavailable);

    let logs = h.platform.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].executor_id, Some(departed));
    assert_eq!(logs[0].action, EnforcementAction::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_area_leader_log_names_their_area() {
    let h = Harness::new();
    let event = h.change(Some(AREA_LEADER), &[], &[530]);

    h.reconciler.process(&event).await;

    let logs = h.platform.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].executor_area.as_deref(), Some("Operations"));
}

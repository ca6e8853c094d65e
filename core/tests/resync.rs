//! Bulk resync, per-policy sync state and writer coordination.

mod common;

use chrono::Duration;
use common::*;
use commission_core::{
    clock::CalcClock,
    config::CommissionConfig,
    engine::CommissionEngine,
    error::CommissionError,
    event::CommissionEvent,
    money::Money,
    reconciliation::{CancelToken, SyncState},
    store::CommissionStore,
    types::SourceType,
};

/// Three agent policies; `p-03` is a life policy with no grid.
fn book_with_one_gap() -> CommissionEngine {
    let engine = seeded_engine();
    for (id, premium) in [("p-01", 10_000), ("p-02", 25_000)] {
        engine
            .store
            .upsert_policy(&policy(id, major(premium), SourceType::Agent, Some("ag-1")))
            .unwrap();
    }
    let mut life = policy("p-03", major(40_000), SourceType::Agent, Some("ag-1"));
    life.product_category = "life".into();
    engine.store.upsert_policy(&life).unwrap();
    engine
}

fn add_life_grid(engine: &CommissionEngine) {
    let mut g = grid("g-life", None, pct(6));
    g.product_category = "life".into();
    g.grid_table = "life_commission_grid".into();
    engine.store.upsert_grid(&g).unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Partial failure and retry
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn one_failing_policy_does_not_abort_the_run() {
    let engine = book_with_one_gap();

    let report = engine.resync_tenant_commissions(TENANT).unwrap();

    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].policy_id, "p-03");
    assert_eq!(report.failed[0].reason, "no_applicable_grid");
    assert!(!report.cancelled);
    assert!(report.not_attempted.is_empty());

    assert_eq!(engine.store.distribution_count(TENANT).unwrap(), 2);
    assert!(engine.distribution(TENANT, "p-03").unwrap().is_none());
}

#[test]
fn sync_state_records_each_outcome() {
    let engine = book_with_one_gap();
    engine.resync_tenant_commissions(TENANT).unwrap();

    let ok = engine.sync_status(TENANT, "p-01").unwrap().unwrap();
    assert_eq!(ok.state, SyncState::Calculated);

    let bad = engine.sync_status(TENANT, "p-03").unwrap().unwrap();
    assert_eq!(bad.state, SyncState::Failed { reason: "no_applicable_grid".into() });
    assert!(bad.message.is_some());

    let failed = engine.store.failed_policies(TENANT).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].policy_id, "p-03");
}

#[test]
fn failed_policy_is_retried_on_the_next_run() {
    let engine = book_with_one_gap();
    engine.resync_tenant_commissions(TENANT).unwrap();

    add_life_grid(&engine);
    let report = engine.resync_tenant_commissions(TENANT).unwrap();

    assert_eq!(report.succeeded.len(), 3);
    assert!(report.failed.is_empty());
    assert!(engine.store.failed_policies(TENANT).unwrap().is_empty());
    let life = engine.distribution(TENANT, "p-03").unwrap().unwrap();
    assert_eq!(life.grid_id, "g-life");
    assert_eq!(life.insurer_commission, major(2_400));
}

#[test]
fn malformed_policy_in_bulk_is_reported_without_a_claim() {
    let engine = book_with_one_gap();
    add_life_grid(&engine);
    engine
        .store
        .upsert_policy(&policy("p-00", Money(-1), SourceType::Direct, None))
        .unwrap();

    let report = engine.resync_tenant_commissions(TENANT).unwrap();

    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].policy_id, "p-00");
    assert_eq!(report.failed[0].reason, "validation");
    assert!(engine.sync_status(TENANT, "p-00").unwrap().is_none());
    assert!(engine.store.audit_for_policy(TENANT, "p-00").unwrap().is_empty());
}

#[test]
fn rejected_write_keeps_the_previous_distribution() {
    let engine = book_with_one_gap();
    let first = engine.calculate_policy_commission(TENANT, "p-01").unwrap();
    let audit_before = engine.store.audit_for_policy(TENANT, "p-01").unwrap().len();

    // A row that does not sum violates the table's balance constraint.
    let mut unbalanced = first.clone();
    unbalanced.broker_share = unbalanced.broker_share + Money(1);
    assert!(engine.store.claim_policy(TENANT, "p-01", "writer-x", now(), 300).unwrap());

    let err = engine.store.commit_distribution(&unbalanced, "writer-x", now()).unwrap_err();

    assert!(matches!(err, CommissionError::Persistence(_)), "got {err:?}");
    assert_eq!(err.reason_code(), "persistence");
    assert_eq!(engine.distribution(TENANT, "p-01").unwrap(), Some(first));
    assert_eq!(engine.store.audit_for_policy(TENANT, "p-01").unwrap().len(), audit_before);
    // The claim is still held; the rolled-back commit did not release it.
    let status = engine.sync_status(TENANT, "p-01").unwrap().unwrap();
    assert_eq!(status.state, SyncState::Calculating);
    assert_eq!(status.claimed_by, "writer-x");
}

#[test]
fn failed_recalculation_leaves_prior_row_in_place() {
    let engine = book_with_one_gap();
    add_life_grid(&engine);
    let before = engine.calculate_policy_commission(TENANT, "p-03").unwrap();

    // Narrow the only life grid so the policy no longer matches.
    let mut g = grid("g-life", None, pct(6));
    g.product_category = "life".into();
    g.grid_table = "life_commission_grid".into();
    g.max_premium = Some(major(1_000));
    engine.store.upsert_grid(&g).unwrap();

    let err = engine.calculate_policy_commission(TENANT, "p-03").unwrap_err();
    assert!(matches!(err, CommissionError::NoApplicableGrid { .. }));
    assert_eq!(engine.distribution(TENANT, "p-03").unwrap(), Some(before));
}

// ─────────────────────────────────────────────────────────────────────────────
// Idempotence and recalculation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn second_resync_leaves_rows_identical() {
    let mut engine = book_with_one_gap();
    add_life_grid(&engine);
    engine.resync_tenant_commissions(TENANT).unwrap();
    let first = engine.store.distributions_for_tenant(TENANT).unwrap();

    engine.clock = CalcClock::Fixed(now() + Duration::hours(6));
    let report = engine.resync_tenant_commissions(TENANT).unwrap();
    let second = engine.store.distributions_for_tenant(TENANT).unwrap();

    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.unchanged, 3);
    assert_eq!(first, second);
}

#[test]
fn single_and_bulk_paths_agree() {
    let engine = book_with_one_gap();
    let single = engine.calculate_policy_commission(TENANT, "p-02").unwrap();

    let report = engine.resync_tenant_commissions(TENANT).unwrap();

    // p-02 was already up to date, p-01 was new.
    assert_eq!(report.unchanged, 1);
    let bulk = report.succeeded.iter().find(|d| d.policy_id == "p-02").unwrap();
    assert_eq!(bulk, &single);
}

#[test]
fn grid_change_replaces_the_stored_row() {
    let engine = book_with_one_gap();
    engine.calculate_policy_commission(TENANT, "p-01").unwrap();

    engine.store.upsert_grid(&grid("g-motor", Some("acme_general"), pct(10))).unwrap();
    let previews = engine.preview_tenant(TENANT).unwrap();
    assert!(previews.iter().find(|p| p.policy_id == "p-01").unwrap().drifted());

    let updated = engine.calculate_policy_commission(TENANT, "p-01").unwrap();
    assert_eq!(updated.insurer_commission, major(1_000));
    assert_eq!(updated.agent_commission, major(700));
    assert_eq!(engine.store.distribution_count(TENANT).unwrap(), 1);

    let last = engine.store.audit_for_policy(TENANT, "p-01").unwrap().pop().unwrap();
    match last.event().unwrap() {
        CommissionEvent::DistributionCalculated { replaced_prior, .. } => assert!(replaced_prior),
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn preview_does_not_write() {
    let engine = book_with_one_gap();
    let fresh = engine.preview_policy_commission(TENANT, "p-01").unwrap();

    assert_eq!(fresh.insurer_commission, major(800));
    assert!(engine.distribution(TENANT, "p-01").unwrap().is_none());
    assert!(engine.sync_status(TENANT, "p-01").unwrap().is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit trail
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn audit_log_tracks_calculations_and_runs() {
    let engine = book_with_one_gap();
    engine.calculate_policy_commission(TENANT, "p-01").unwrap();
    engine.calculate_policy_commission(TENANT, "p-01").unwrap();

    let types: Vec<String> = engine
        .store
        .audit_for_policy(TENANT, "p-01")
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types, ["distribution_calculated", "distribution_unchanged"]);

    let report = engine.resync_tenant_commissions(TENANT).unwrap();
    let tenant_log = engine.store.audit_for_tenant(TENANT).unwrap();
    let run_events: Vec<&str> = tenant_log
        .iter()
        .filter(|e| e.actor == report.run_id && e.policy_id.is_none())
        .map(|e| e.event_type.as_str())
        .collect();
    assert_eq!(run_events, ["resync_started", "resync_completed"]);

    let failure = tenant_log
        .iter()
        .find(|e| e.event_type == "calculation_failed")
        .unwrap();
    assert_eq!(failure.policy_id.as_deref(), Some("p-03"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn cancelled_before_start_attempts_nothing() {
    let engine = book_with_one_gap();
    let token = CancelToken::new();
    token.cancel();

    let report = engine.resync_tenant_commissions_with_cancel(TENANT, &token).unwrap();

    assert!(report.cancelled);
    assert_eq!(report.processed(), 0);
    assert_eq!(report.not_attempted, ["p-01", "p-02", "p-03"]);
    assert_eq!(engine.store.distribution_count(TENANT).unwrap(), 0);

    let log = engine.store.audit_for_tenant(TENANT).unwrap();
    assert!(log.iter().any(|e| e.event_type == "resync_cancelled"));
}

#[test]
fn lock_is_released_after_a_cancelled_run() {
    let engine = book_with_one_gap();
    let token = CancelToken::new();
    token.cancel();
    engine.resync_tenant_commissions_with_cancel(TENANT, &token).unwrap();

    let report = engine.resync_tenant_commissions(TENANT).unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.processed(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenant lock and per-policy claims
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn concurrent_resync_for_same_tenant_is_rejected() {
    let engine = book_with_one_gap();
    let guard = engine
        .store
        .acquire_resync_lock(TENANT, "resync-other", now(), 3_600)
        .unwrap();

    match engine.resync_tenant_commissions(TENANT) {
        Err(CommissionError::ResyncInProgress { holder, .. }) => assert_eq!(holder, "resync-other"),
        other => panic!("expected ResyncInProgress, got {other:?}"),
    }
    assert_eq!(engine.store.distribution_count(TENANT).unwrap(), 0);

    drop(guard);
    assert!(engine.resync_tenant_commissions(TENANT).is_ok());
}

#[test]
fn stale_tenant_lock_is_taken_over() {
    let engine = book_with_one_gap();
    let _abandoned = engine
        .store
        .acquire_resync_lock(TENANT, "resync-crashed", now() - Duration::hours(2), 3_600)
        .unwrap();

    let report = engine.resync_tenant_commissions(TENANT).unwrap();
    assert_eq!(report.succeeded.len(), 2);
}

#[test]
fn refreshed_tenant_lock_does_not_go_stale() {
    let engine = book_with_one_gap();
    let start = now();
    let guard = engine.store.acquire_resync_lock(TENANT, "resync-long", start, 3_600).unwrap();

    assert!(guard.refresh(start + Duration::minutes(50)).unwrap());

    // Past the original deadline but inside the refreshed one.
    let second = engine
        .store
        .acquire_resync_lock(TENANT, "resync-late", start + Duration::minutes(70), 3_600);
    match second {
        Err(CommissionError::ResyncInProgress { holder, .. }) => assert_eq!(holder, "resync-long"),
        Err(other) => panic!("expected ResyncInProgress, got {other:?}"),
        Ok(_) => panic!("refreshed lock was taken over"),
    }
}

#[test]
fn refresh_reports_a_lock_taken_over() {
    let engine = book_with_one_gap();
    let start = now();
    let guard = engine.store.acquire_resync_lock(TENANT, "resync-slow", start, 3_600).unwrap();

    let _newer = engine
        .store
        .acquire_resync_lock(TENANT, "resync-newer", start + Duration::hours(2), 3_600)
        .unwrap();

    assert!(!guard.refresh(start + Duration::hours(2)).unwrap());
}

#[test]
fn claimed_policy_is_calculation_in_progress() {
    let engine = book_with_one_gap();
    assert!(engine.store.claim_policy(TENANT, "p-01", "other-writer", now(), 300).unwrap());

    let err = engine.calculate_policy_commission(TENANT, "p-01").unwrap_err();
    assert!(matches!(err, CommissionError::CalculationInProgress { .. }), "got {err:?}");

    let report = engine.resync_tenant_commissions(TENANT).unwrap();
    let skipped = report.failed.iter().find(|f| f.policy_id == "p-01").unwrap();
    assert_eq!(skipped.reason, "calculation_in_progress");

    // The other writer's claim is untouched.
    let status = engine.sync_status(TENANT, "p-01").unwrap().unwrap();
    assert_eq!(status.state, SyncState::Calculating);
    assert_eq!(status.claimed_by, "other-writer");
}

#[test]
fn stale_claim_is_taken_over() {
    let engine = book_with_one_gap();
    let long_ago = now() - Duration::minutes(30);
    assert!(engine.store.claim_policy(TENANT, "p-01", "crashed-writer", long_ago, 300).unwrap());

    let d = engine.calculate_policy_commission(TENANT, "p-01").unwrap();
    assert_eq!(d.insurer_commission, major(800));
    assert_eq!(engine.sync_status(TENANT, "p-01").unwrap().unwrap().state, SyncState::Calculated);
}

#[test]
fn commit_after_losing_the_claim_writes_nothing() {
    let engine = book_with_one_gap();
    let dist = engine.preview_policy_commission(TENANT, "p-01").unwrap();

    let earlier = now() - Duration::minutes(30);
    assert!(engine.store.claim_policy(TENANT, "p-01", "writer-a", earlier, 300).unwrap());
    assert!(engine.store.claim_policy(TENANT, "p-01", "writer-b", now(), 300).unwrap());

    let err = engine.store.commit_distribution(&dist, "writer-a", now()).unwrap_err();
    assert!(matches!(err, CommissionError::CalculationInProgress { .. }));
    assert!(engine.distribution(TENANT, "p-01").unwrap().is_none());
    assert!(engine.store.audit_for_policy(TENANT, "p-01").unwrap().is_empty());

    let status = engine.sync_status(TENANT, "p-01").unwrap().unwrap();
    assert_eq!(status.claimed_by, "writer-b");
}

#[test]
fn racing_writers_on_one_file_leave_one_balanced_row() {
    let path = std::env::temp_dir().join(format!("commission-race-{}.db", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().into_owned();

    let setup = CommissionEngine::new(CommissionStore::open(&path).unwrap(), CommissionConfig::default_test())
        .with_clock(CalcClock::Fixed(now()));
    setup.store.migrate().unwrap();
    setup.store.upsert_grid(&grid("g-motor", Some("acme_general"), pct(8))).unwrap();
    setup
        .store
        .upsert_policy(&policy("p-race", major(10_000), SourceType::Direct, None))
        .unwrap();

    let outcomes: Vec<Result<(), CommissionError>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                s.spawn(move || {
                    let engine = CommissionEngine::new(
                        CommissionStore::open(&path).unwrap(),
                        CommissionConfig::default_test(),
                    )
                    .with_clock(CalcClock::Fixed(now()));
                    engine.calculate_policy_commission(TENANT, "p-race").map(|_| ())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(outcomes.iter().any(Result::is_ok));
    for outcome in &outcomes {
        if let Err(e) = outcome {
            assert!(matches!(e, CommissionError::CalculationInProgress { .. }), "got {e:?}");
        }
    }
    let row = setup.distribution(TENANT, "p-race").unwrap().unwrap();
    assert!(row.is_balanced());
    assert_eq!(row.broker_share, major(800));
    assert_eq!(setup.store.distribution_count(TENANT).unwrap(), 1);

    drop(setup);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path}{suffix}"));
    }
}

//! Single-policy calculation scenarios.
//!
//! Each test seeds an in-memory store and calls the public
//! `calculate_policy_commission` operation end to end.

mod common;

use common::*;
use commission_core::{
    error::CommissionError,
    money::{Bps, Money},
    party_resolver::ShareMode,
    types::{PartyKind, SourceType},
};

// ─────────────────────────────────────────────────────────────────────────────
// Worked examples
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn direct_source_pays_everything_to_broker() {
    let engine = engine();
    engine.store.upsert_grid(&grid("g10", Some("acme_general"), pct(10))).unwrap();
    engine
        .store
        .upsert_policy(&policy("p-direct", major(100_000), SourceType::Direct, None))
        .unwrap();

    let d = engine.calculate_policy_commission(TENANT, "p-direct").unwrap();

    assert_eq!(d.insurer_commission, major(10_000));
    assert_eq!(d.agent_commission, Money::ZERO);
    assert_eq!(d.misp_commission, Money::ZERO);
    assert_eq!(d.employee_commission, Money::ZERO);
    assert_eq!(d.broker_share, major(10_000));
    assert_eq!(d.source_name, "Direct");
    assert_eq!(d.share_mode, None);
    assert!(!d.override_used);
}

#[test]
fn agent_with_tier() {
    let engine = seeded_engine();
    engine
        .store
        .upsert_policy(&policy("p-tier", major(50_000), SourceType::Agent, Some("ag-1")))
        .unwrap();

    let d = engine.calculate_policy_commission(TENANT, "p-tier").unwrap();

    assert_eq!(d.insurer_commission, major(4_000));
    assert_eq!(d.agent_commission, major(2_800));
    assert_eq!(d.broker_share, major(1_200));
    assert_eq!(d.tier_name.as_deref(), Some("Gold"));
    assert_eq!(d.share_mode, Some(ShareMode::Tier));
    assert!(!d.override_used);
    assert_eq!(d.grid_id, "g-motor");
    assert_eq!(d.grid_table, "motor_commission_grid");
}

#[test]
fn agent_with_override_ignores_tier() {
    let engine = seeded_engine();
    engine
        .store
        .upsert_party(&party(PartyKind::Agent, "ag-1", Some("tier-gold"), Some(pct(85))))
        .unwrap();
    engine
        .store
        .upsert_policy(&policy("p-over", major(50_000), SourceType::Agent, Some("ag-1")))
        .unwrap();

    let d = engine.calculate_policy_commission(TENANT, "p-over").unwrap();

    assert_eq!(d.agent_commission, major(3_400));
    assert_eq!(d.broker_share, major(600));
    assert!(d.override_used);
    assert_eq!(d.tier_name, None);
}

#[test]
fn changing_tier_does_not_move_an_overridden_party() {
    let engine = seeded_engine();
    engine
        .store
        .upsert_party(&party(PartyKind::Agent, "ag-1", Some("tier-gold"), Some(pct(85))))
        .unwrap();
    engine
        .store
        .upsert_policy(&policy("p-over", major(50_000), SourceType::Agent, Some("ag-1")))
        .unwrap();
    let before = engine.calculate_policy_commission(TENANT, "p-over").unwrap();

    engine.store.upsert_tier(&tier("tier-gold", "Gold", pct(40))).unwrap();
    let after = engine.calculate_policy_commission(TENANT, "p-over").unwrap();

    assert_eq!(before.agent_commission, after.agent_commission);
    assert!(before.same_calculation(&after));
}

#[test]
fn grid_reward_and_bonus_add_to_total_rate() {
    let engine = engine();
    let mut g = grid("g-layered", Some("acme_general"), Bps(750));
    g.reward_rate = Bps(150);
    g.bonus_rate = Bps(100);
    engine.store.upsert_grid(&g).unwrap();
    engine
        .store
        .upsert_policy(&policy("p1", major(20_000), SourceType::Direct, None))
        .unwrap();

    let d = engine.calculate_policy_commission(TENANT, "p1").unwrap();

    assert_eq!(d.base_rate, Bps(750));
    assert_eq!(d.reward_rate, Bps(150));
    assert_eq!(d.bonus_rate, Bps(100));
    assert_eq!(d.total_rate, pct(10));
    assert_eq!(d.insurer_commission, major(2_000));
}

// ─────────────────────────────────────────────────────────────────────────────
// Party kinds and fallbacks
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn misp_amount_lands_in_misp_column() {
    let engine = seeded_engine();
    engine
        .store
        .upsert_party(&party(PartyKind::Misp, "dealer-9", None, Some(pct(50))))
        .unwrap();
    engine
        .store
        .upsert_policy(&policy("p-misp", major(10_000), SourceType::Misp, Some("dealer-9")))
        .unwrap();

    let d = engine.calculate_policy_commission(TENANT, "p-misp").unwrap();

    assert_eq!(d.insurer_commission, major(800));
    assert_eq!(d.misp_commission, major(400));
    assert_eq!(d.agent_commission, Money::ZERO);
    assert_eq!(d.employee_commission, Money::ZERO);
    assert_eq!(d.broker_share, major(400));
}

#[test]
fn employee_without_tier_uses_tenant_default_share() {
    let mut engine = seeded_engine();
    engine.config.tenant_employee_share.insert(TENANT.into(), pct(25));
    engine
        .store
        .upsert_party(&party(PartyKind::Employee, "emp-1", None, None))
        .unwrap();
    engine
        .store
        .upsert_policy(&policy("p-emp", major(10_000), SourceType::Employee, Some("emp-1")))
        .unwrap();

    let d = engine.calculate_policy_commission(TENANT, "p-emp").unwrap();

    assert_eq!(d.share_mode, Some(ShareMode::EmployeeDefault));
    assert_eq!(d.employee_commission, major(200));
    assert_eq!(d.broker_share, major(600));
}

#[test]
fn unconfigured_agent_gets_zero_share_by_default() {
    let engine = seeded_engine();
    engine
        .store
        .upsert_party(&party(PartyKind::Agent, "ag-bare", None, None))
        .unwrap();
    engine
        .store
        .upsert_policy(&policy("p-bare", major(10_000), SourceType::Agent, Some("ag-bare")))
        .unwrap();

    let d = engine.calculate_policy_commission(TENANT, "p-bare").unwrap();

    assert_eq!(d.share_mode, Some(ShareMode::None));
    assert_eq!(d.agent_commission, Money::ZERO);
    assert_eq!(d.broker_share, d.insurer_commission);
}

#[test]
fn dangling_tier_reference_is_treated_as_untiered() {
    let engine = seeded_engine();
    engine
        .store
        .upsert_party(&party(PartyKind::Agent, "ag-2", Some("tier-gone"), None))
        .unwrap();
    engine
        .store
        .upsert_policy(&policy("p-2", major(10_000), SourceType::Agent, Some("ag-2")))
        .unwrap();

    let d = engine.calculate_policy_commission(TENANT, "p-2").unwrap();
    assert_eq!(d.share_mode, Some(ShareMode::None));
    assert_eq!(d.tier_name, None);
}

// ─────────────────────────────────────────────────────────────────────────────
// Edge cases and typed failures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn zero_premium_is_calculated_with_zero_amounts() {
    let engine = seeded_engine();
    engine
        .store
        .upsert_policy(&policy("p-zero", Money::ZERO, SourceType::Agent, Some("ag-1")))
        .unwrap();

    let d = engine.calculate_policy_commission(TENANT, "p-zero").unwrap();

    assert_eq!(d.insurer_commission, Money::ZERO);
    assert_eq!(d.agent_commission, Money::ZERO);
    assert_eq!(d.broker_share, Money::ZERO);
    assert_eq!(d.commission_status.as_str(), "calculated");
}

#[test]
fn negative_premium_is_a_validation_error_and_writes_nothing() {
    let engine = seeded_engine();
    engine
        .store
        .upsert_policy(&policy("p-neg", Money(-100), SourceType::Direct, None))
        .unwrap();

    let err = engine.calculate_policy_commission(TENANT, "p-neg").unwrap_err();

    assert!(matches!(err, CommissionError::Validation(_)), "got {err:?}");
    assert!(engine.distribution(TENANT, "p-neg").unwrap().is_none());
    assert!(engine.sync_status(TENANT, "p-neg").unwrap().is_none());
    assert!(engine.store.audit_for_policy(TENANT, "p-neg").unwrap().is_empty());
}

#[test]
fn commission_too_large_for_the_amount_type_is_a_validation_error() {
    let engine = engine();
    engine.store.upsert_grid(&grid("g-huge", Some("acme_general"), pct(300))).unwrap();
    engine
        .store
        .upsert_policy(&policy("p-huge", Money(i64::MAX / 2), SourceType::Direct, None))
        .unwrap();

    let err = engine.calculate_policy_commission(TENANT, "p-huge").unwrap_err();

    match err {
        CommissionError::Validation(msg) => assert!(msg.contains("out of range"), "message: {msg}"),
        other => panic!("expected Validation, got {other:?}"),
    }
    assert!(engine.distribution(TENANT, "p-huge").unwrap().is_none());
}

#[test]
fn premium_outside_every_band_signals_no_applicable_grid() {
    let engine = engine();
    let mut g = grid("g-band", Some("acme_general"), pct(8));
    g.min_premium = Some(major(1_000));
    g.max_premium = Some(major(50_000));
    engine.store.upsert_grid(&g).unwrap();
    engine
        .store
        .upsert_policy(&policy("p-big", major(75_000), SourceType::Direct, None))
        .unwrap();

    let err = engine.calculate_policy_commission(TENANT, "p-big").unwrap_err();

    assert!(matches!(err, CommissionError::NoApplicableGrid { .. }), "got {err:?}");
    assert_eq!(err.reason_code(), "no_applicable_grid");
    assert!(engine.distribution(TENANT, "p-big").unwrap().is_none());
}

#[test]
fn missing_party_is_party_not_found() {
    let engine = seeded_engine();
    engine
        .store
        .upsert_policy(&policy("p-ghost", major(10_000), SourceType::Agent, Some("ag-ghost")))
        .unwrap();

    let err = engine.calculate_policy_commission(TENANT, "p-ghost").unwrap_err();
    assert!(matches!(err, CommissionError::PartyNotFound { .. }), "got {err:?}");
}

#[test]
fn party_of_another_kind_does_not_resolve() {
    let engine = seeded_engine();
    // ag-1 exists as an agent, not as an employee.
    engine
        .store
        .upsert_policy(&policy("p-kind", major(10_000), SourceType::Employee, Some("ag-1")))
        .unwrap();

    let err = engine.calculate_policy_commission(TENANT, "p-kind").unwrap_err();
    assert!(matches!(err, CommissionError::PartyNotFound { .. }), "got {err:?}");
}

#[test]
fn unknown_policy_is_policy_not_found() {
    let engine = seeded_engine();
    let err = engine.calculate_policy_commission(TENANT, "nope").unwrap_err();
    assert!(matches!(err, CommissionError::PolicyNotFound { .. }), "got {err:?}");
}

#[test]
fn exact_provider_grid_wins_regardless_of_insertion_order() {
    for exact_first in [true, false] {
        let engine = engine();
        let exact = grid("g-exact", Some("acme_general"), pct(12));
        let wild = grid("g-wild", None, pct(9));
        if exact_first {
            engine.store.upsert_grid(&exact).unwrap();
            engine.store.upsert_grid(&wild).unwrap();
        } else {
            engine.store.upsert_grid(&wild).unwrap();
            engine.store.upsert_grid(&exact).unwrap();
        }
        engine
            .store
            .upsert_policy(&policy("p1", major(10_000), SourceType::Direct, None))
            .unwrap();

        let d = engine.calculate_policy_commission(TENANT, "p1").unwrap();
        assert_eq!(d.grid_id, "g-exact");
        assert_eq!(d.insurer_commission, major(1_200));
    }
}

#[test]
fn policy_without_bind_date_matches_on_today() {
    let engine = engine();
    let mut old = grid("g-old", Some("acme_general"), pct(5));
    old.effective_to = Some(date(2026, 6, 30));
    let mut current = grid("g-current", Some("acme_general"), pct(7));
    current.effective_from = date(2026, 7, 1);
    engine.store.upsert_grid(&old).unwrap();
    engine.store.upsert_grid(&current).unwrap();

    let mut p = policy("p-nodate", major(1_000), SourceType::Direct, None);
    p.bind_date = None;
    engine.store.upsert_policy(&p).unwrap();

    // The engine clock is pinned to 2026-10-17.
    let d = engine.calculate_policy_commission(TENANT, "p-nodate").unwrap();
    assert_eq!(d.grid_id, "g-current");
}

#[test]
fn reject_mode_turns_unconfigured_party_into_validation_error() {
    let mut engine = seeded_engine();
    engine
        .config
        .tenant_unconfigured
        .insert(TENANT.into(), commission_core::party_resolver::UnconfiguredParty::Reject);
    engine
        .store
        .upsert_party(&party(PartyKind::Agent, "ag-bare", None, None))
        .unwrap();
    engine
        .store
        .upsert_policy(&policy("p-bare", major(10_000), SourceType::Agent, Some("ag-bare")))
        .unwrap();

    let err = engine.calculate_policy_commission(TENANT, "p-bare").unwrap_err();
    assert!(matches!(err, CommissionError::Validation(_)), "got {err:?}");

    let status = engine.sync_status(TENANT, "p-bare").unwrap().unwrap();
    assert_eq!(status.state.as_str(), "failed");
}

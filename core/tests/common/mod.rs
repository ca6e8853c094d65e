//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use commission_core::{
    engine::CommissionEngine,
    money::{Bps, Money},
    party_resolver::{CommissionTier, Party},
    policy::{Policy, PolicyStatus},
    rate_resolution::CommissionGrid,
    types::{PartyKind, SourceType},
};

pub const TENANT: &str = "acme";

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Whole currency units to minor units.
pub fn major(amount: i64) -> Money {
    Money(amount * 100)
}

pub fn pct(p: i64) -> Bps {
    Bps(p * 100)
}

pub fn engine() -> CommissionEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    CommissionEngine::build_test(now()).expect("build_test failed")
}

/// An open-banded motor grid with the whole rate in `base_rate`.
pub fn grid(grid_id: &str, provider: Option<&str>, total: Bps) -> CommissionGrid {
    CommissionGrid {
        grid_id:          grid_id.into(),
        tenant_id:        TENANT.into(),
        grid_table:       "motor_commission_grid".into(),
        product_category: "motor".into(),
        provider:         provider.map(Into::into),
        min_premium:      None,
        max_premium:      None,
        base_rate:        total,
        reward_rate:      Bps::ZERO,
        bonus_rate:       Bps::ZERO,
        effective_from:   date(2026, 1, 1),
        effective_to:     None,
        version:          1,
    }
}

pub fn policy(policy_id: &str, premium: Money, source: SourceType, party: Option<&str>) -> Policy {
    Policy {
        policy_id:        policy_id.into(),
        tenant_id:        TENANT.into(),
        policy_number:    format!("MOT/{policy_id}"),
        customer_name:    format!("Customer {policy_id}"),
        product_category: "motor".into(),
        provider:         "acme_general".into(),
        premium,
        source_type:      source,
        source_party_id:  party.map(Into::into),
        bind_date:        Some(date(2026, 3, 1)),
        status:           PolicyStatus::Bound,
    }
}

pub fn tier(tier_id: &str, name: &str, base: Bps) -> CommissionTier {
    CommissionTier {
        tier_id:         tier_id.into(),
        tenant_id:       TENANT.into(),
        name:            name.into(),
        base_percentage: base,
    }
}

pub fn party(kind: PartyKind, party_id: &str, tier_id: Option<&str>, override_pct: Option<Bps>) -> Party {
    Party {
        party_id:            party_id.into(),
        tenant_id:           TENANT.into(),
        kind,
        name:                format!("Party {party_id}"),
        code:                party_id.to_uppercase(),
        commission_tier_id:  tier_id.map(Into::into),
        override_percentage: override_pct,
    }
}

/// Engine seeded with one 8% motor grid, a 70% Gold tier and agent `ag-1`
/// on that tier.
pub fn seeded_engine() -> CommissionEngine {
    let engine = engine();
    engine.store.upsert_grid(&grid("g-motor", Some("acme_general"), pct(8))).unwrap();
    engine.store.upsert_tier(&tier("tier-gold", "Gold", pct(70))).unwrap();
    engine
        .store
        .upsert_party(&party(PartyKind::Agent, "ag-1", Some("tier-gold"), None))
        .unwrap();
    engine
}

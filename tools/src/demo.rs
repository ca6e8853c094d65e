//! Deterministic synthetic book for demos and load checks.
//!
//! Same seed, same book: every tier, party, grid and policy is derived
//! from one Pcg64Mcg stream.

use anyhow::Result;
use chrono::NaiveDate;
use commission_core::{
    money::{Bps, Money},
    party_resolver::{CommissionTier, Party},
    policy::{Policy, PolicyStatus},
    rate_resolution::CommissionGrid,
    store::CommissionStore,
    types::{PartyKind, SourceType},
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

const PRODUCTS: [(&str, &str); 3] = [
    ("motor", "motor_commission_grid"),
    ("health", "health_commission_grid"),
    ("life", "life_commission_grid"),
];
const PROVIDERS: [&str; 4] = ["acme_general", "zenith_life", "harbor_mutual", "northstar"];
const FIRST: [&str; 8] = ["Asha", "Ravi", "Meera", "Karan", "Nisha", "Vikram", "Leela", "Arjun"];
const LAST: [&str; 6] = ["Rao", "Iyer", "Shah", "Menon", "Kapoor", "Das"];

pub struct DemoBook {
    pub tiers:    usize,
    pub parties:  usize,
    pub grids:    usize,
    pub policies: usize,
}

pub fn seed_demo_book(store: &CommissionStore, tenant_id: &str, seed: u64, policy_count: usize) -> Result<DemoBook> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let effective_from = NaiveDate::from_ymd_opt(2025, 1, 1)
        .ok_or_else(|| anyhow::anyhow!("invalid demo start date"))?;

    let tiers = [("Bronze", 5_000), ("Silver", 6_000), ("Gold", 7_000), ("Platinum", 8_000)];
    for (i, (name, bps)) in tiers.iter().enumerate() {
        store.upsert_tier(&CommissionTier {
            tier_id:         format!("tier-{i}"),
            tenant_id:       tenant_id.to_string(),
            name:            name.to_string(),
            base_percentage: Bps(*bps),
        })?;
    }

    let mut party_ids: Vec<(PartyKind, String)> = Vec::new();
    for (kind, count) in [(PartyKind::Agent, 12), (PartyKind::Employee, 6), (PartyKind::Misp, 4)] {
        for n in 0..count {
            let party_id = format!("{}-{n:03}", kind.as_str());
            let tier = rng.gen_bool(0.8).then(|| format!("tier-{}", rng.gen_range(0..tiers.len())));
            let override_pct = rng.gen_bool(0.15).then(|| Bps(rng.gen_range(50..=90) * 100));
            store.upsert_party(&Party {
                party_id:            party_id.clone(),
                tenant_id:           tenant_id.to_string(),
                kind,
                name:                format!("{} {}", FIRST[rng.gen_range(0..FIRST.len())], LAST[rng.gen_range(0..LAST.len())]),
                code:                format!("{}{n:03}", kind.as_str()[..2].to_uppercase()),
                commission_tier_id:  tier,
                override_percentage: override_pct,
            })?;
            party_ids.push((kind, party_id));
        }
    }

    let mut grids = 0;
    for (product, table) in PRODUCTS {
        // One wildcard fallback per product, plus banded provider grids.
        store.upsert_grid(&grid(tenant_id, &format!("{product}-any"), table, product, None, None, None, &mut rng, effective_from))?;
        grids += 1;
        for provider in PROVIDERS {
            for (band, (min, max)) in [(0, 2_500_000), (2_500_001, 10_000_000)].into_iter().enumerate() {
                let id = format!("{product}-{provider}-{band}");
                store.upsert_grid(&grid(
                    tenant_id, &id, table, product, Some(provider), Some(Money(min)), Some(Money(max)), &mut rng, effective_from,
                ))?;
                grids += 1;
            }
        }
    }

    for n in 0..policy_count {
        let (product, _) = PRODUCTS[rng.gen_range(0..PRODUCTS.len())];
        let source = match rng.gen_range(0..10) {
            0..=1 => SourceType::Direct,
            2..=6 => SourceType::Agent,
            7..=8 => SourceType::Employee,
            _ => SourceType::Misp,
        };
        let source_party_id = source.party_kind().map(|kind| {
            let pool: Vec<&String> = party_ids.iter().filter(|(k, _)| *k == kind).map(|(_, id)| id).collect();
            pool[rng.gen_range(0..pool.len())].clone()
        });
        store.upsert_policy(&Policy {
            policy_id:        format!("pol-{n:05}"),
            tenant_id:        tenant_id.to_string(),
            policy_number:    format!("{}/{:06}", product.to_uppercase(), n),
            customer_name:    format!("{} {}", FIRST[rng.gen_range(0..FIRST.len())], LAST[rng.gen_range(0..LAST.len())]),
            product_category: product.to_string(),
            provider:         PROVIDERS[rng.gen_range(0..PROVIDERS.len())].to_string(),
            premium:          Money(rng.gen_range(100_000..12_000_000)),
            source_type:      source,
            source_party_id,
            bind_date:        effective_from.checked_add_days(chrono::Days::new(rng.gen_range(0..600))),
            status:           if rng.gen_bool(0.95) { PolicyStatus::Bound } else { PolicyStatus::Draft },
        })?;
    }

    Ok(DemoBook {
        tiers:    tiers.len(),
        parties:  party_ids.len(),
        grids,
        policies: policy_count,
    })
}

#[allow(clippy::too_many_arguments)]
fn grid(
    tenant_id: &str,
    grid_id: &str,
    table: &str,
    product: &str,
    provider: Option<&str>,
    min: Option<Money>,
    max: Option<Money>,
    rng: &mut Pcg64Mcg,
    effective_from: NaiveDate,
) -> CommissionGrid {
    CommissionGrid {
        grid_id:          grid_id.to_string(),
        tenant_id:        tenant_id.to_string(),
        grid_table:       table.to_string(),
        product_category: product.to_string(),
        provider:         provider.map(str::to_string),
        min_premium:      min,
        max_premium:      max,
        base_rate:        Bps(rng.gen_range(5..=15) * 100),
        reward_rate:      Bps(rng.gen_range(0..=4) * 50),
        bonus_rate:       Bps(rng.gen_range(0..=2) * 50),
        effective_from,
        effective_to:     None,
        version:          1,
    }
}

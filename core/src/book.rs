//! In-memory snapshot of one tenant's grids, tiers and parties.
//!
//! Bulk resync loads the book once and lets every worker read it
//! concurrently; a SQLite connection cannot be shared across threads.

use crate::{
    error::CommissionResult,
    party_resolver::{CommissionTier, Party, PartyRepository},
    rate_resolution::{CommissionGrid, GridRepository},
    store::CommissionStore,
    types::{PartyKind, TenantId},
};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct TenantBook {
    tenant_id: TenantId,
    grids:     HashMap<String, Vec<CommissionGrid>>,
    parties:   HashMap<(PartyKind, String), Party>,
    tiers:     HashMap<String, CommissionTier>,
}

impl TenantBook {
    pub fn new(tenant_id: impl Into<TenantId>) -> Self {
        Self { tenant_id: tenant_id.into(), ..Self::default() }
    }

    pub fn load(store: &CommissionStore, tenant_id: &str) -> CommissionResult<Self> {
        let mut book = Self::new(tenant_id);
        for grid in store.grids_for_tenant(tenant_id)? {
            book.add_grid(grid);
        }
        for tier in store.tiers_for_tenant(tenant_id)? {
            book.add_tier(tier);
        }
        for party in store.parties_for_tenant(tenant_id)? {
            book.add_party(party);
        }
        log::debug!(
            "tenant book {tenant_id}: {} grids, {} tiers, {} parties",
            book.grids.values().map(Vec::len).sum::<usize>(),
            book.tiers.len(),
            book.parties.len()
        );
        Ok(book)
    }

    pub fn add_grid(&mut self, grid: CommissionGrid) {
        self.grids.entry(grid.product_category.clone()).or_default().push(grid);
    }

    pub fn add_tier(&mut self, tier: CommissionTier) {
        self.tiers.insert(tier.tier_id.clone(), tier);
    }

    pub fn add_party(&mut self, party: Party) {
        self.parties.insert((party.kind, party.party_id.clone()), party);
    }
}

impl GridRepository for TenantBook {
    fn grids_for(&self, tenant_id: &str, product_category: &str) -> CommissionResult<Vec<CommissionGrid>> {
        if tenant_id != self.tenant_id {
            return Ok(Vec::new());
        }
        Ok(self.grids.get(product_category).cloned().unwrap_or_default())
    }
}

impl PartyRepository for TenantBook {
    fn party(&self, tenant_id: &str, kind: PartyKind, party_id: &str) -> CommissionResult<Option<Party>> {
        if tenant_id != self.tenant_id {
            return Ok(None);
        }
        Ok(self.parties.get(&(kind, party_id.to_string())).cloned())
    }

    fn tier(&self, tenant_id: &str, tier_id: &str) -> CommissionResult<Option<CommissionTier>> {
        if tenant_id != self.tenant_id {
            return Ok(None);
        }
        Ok(self.tiers.get(tier_id).cloned())
    }
}

//! Rate resolution — picks the single commission grid that governs a policy.
//!
//! Matching is exact on tenant and product category, exact-or-wildcard on
//! provider, inclusive on the premium band and the effective date range.
//!
//! TIE-BREAK (in order):
//!   1. exact provider beats wildcard provider
//!   2. narrowest premium band (open bounds are infinitely wide)
//!   3. highest version, then latest effective_from
//!   4. lowest grid_id
//!
//! The last rule only exists so the outcome never depends on the order
//! the repository happens to return rows in.

use crate::{
    error::{CommissionError, CommissionResult},
    money::{Bps, Money},
    policy::Policy,
    types::{EntityId, TenantId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionGrid {
    pub grid_id:          EntityId,
    pub tenant_id:        TenantId,
    pub grid_table:       String,
    pub product_category: String,
    /// `None` matches every provider.
    pub provider:         Option<String>,
    pub min_premium:      Option<Money>,
    pub max_premium:      Option<Money>,
    pub base_rate:        Bps,
    pub reward_rate:      Bps,
    pub bonus_rate:       Bps,
    pub effective_from:   NaiveDate,
    pub effective_to:     Option<NaiveDate>,
    pub version:          i64,
}

impl CommissionGrid {
    pub fn matches(&self, q: &RateQuery<'_>) -> bool {
        if self.tenant_id != q.tenant_id || self.product_category != q.product_category {
            return false;
        }
        if let Some(p) = &self.provider {
            if p != q.provider {
                return false;
            }
        }
        if self.min_premium.is_some_and(|min| q.premium < min)
            || self.max_premium.is_some_and(|max| q.premium > max)
        {
            return false;
        }
        if q.reference_date < self.effective_from {
            return false;
        }
        !self.effective_to.is_some_and(|to| q.reference_date > to)
    }

    /// Width of the premium band; `None` means unbounded.
    pub fn band_width(&self) -> Option<i64> {
        match (self.min_premium, self.max_premium) {
            (Some(min), Some(max)) => Some(max.minor() - min.minor()),
            _ => None,
        }
    }

    pub fn total_rate(&self) -> Bps {
        self.base_rate + self.reward_rate + self.bonus_rate
    }

    /// Structural checks an administrator-entered grid must pass before it
    /// can drive a payout.
    pub fn validate(&self) -> CommissionResult<()> {
        if self.base_rate.is_negative() || self.reward_rate.is_negative() || self.bonus_rate.is_negative() {
            return Err(CommissionError::validation(format!(
                "grid {} has a negative rate",
                self.grid_id
            )));
        }
        if let (Some(min), Some(max)) = (self.min_premium, self.max_premium) {
            if min > max {
                return Err(CommissionError::validation(format!(
                    "grid {} has min premium {min} above max premium {max}",
                    self.grid_id
                )));
            }
        }
        if self.effective_to.is_some_and(|to| to < self.effective_from) {
            return Err(CommissionError::validation(format!(
                "grid {} ends before it starts",
                self.grid_id
            )));
        }
        Ok(())
    }
}

/// Everything about a policy that grid matching looks at.
#[derive(Debug, Clone, Copy)]
pub struct RateQuery<'a> {
    pub tenant_id:        &'a str,
    pub product_category: &'a str,
    pub provider:         &'a str,
    pub premium:          Money,
    pub reference_date:   NaiveDate,
}

impl<'a> RateQuery<'a> {
    pub fn for_policy(policy: &'a Policy, today: NaiveDate) -> Self {
        Self {
            tenant_id:        &policy.tenant_id,
            product_category: &policy.product_category,
            provider:         &policy.provider,
            premium:          policy.premium,
            reference_date:   policy.reference_date(today),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub grid_id:     EntityId,
    pub grid_table:  String,
    pub base_rate:   Bps,
    pub reward_rate: Bps,
    pub bonus_rate:  Bps,
}

impl ResolvedRate {
    pub fn total_rate(&self) -> Bps {
        self.base_rate + self.reward_rate + self.bonus_rate
    }
}

impl From<&CommissionGrid> for ResolvedRate {
    fn from(g: &CommissionGrid) -> Self {
        Self {
            grid_id:     g.grid_id.clone(),
            grid_table:  g.grid_table.clone(),
            base_rate:   g.base_rate,
            reward_rate: g.reward_rate,
            bonus_rate:  g.bonus_rate,
        }
    }
}

/// Outcome of rate resolution. `NoRule` is a normal answer, not a failure:
/// the policy simply is not commissionable under the current grids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateResolution {
    Matched(ResolvedRate),
    NoRule,
}

/// Read-only access to grid definitions.
pub trait GridRepository {
    /// All grids of a tenant for one product category, in any order.
    fn grids_for(&self, tenant_id: &str, product_category: &str) -> CommissionResult<Vec<CommissionGrid>>;
}

pub trait RateResolver {
    fn resolve(&self, query: &RateQuery<'_>) -> CommissionResult<RateResolution>;
}

/// The grid-matching `RateResolver` over any `GridRepository`.
pub struct GridMatcher<'a, R: ?Sized> {
    repo: &'a R,
}

impl<'a, R: GridRepository + ?Sized> GridMatcher<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }
}

impl<R: GridRepository + ?Sized> RateResolver for GridMatcher<'_, R> {
    fn resolve(&self, query: &RateQuery<'_>) -> CommissionResult<RateResolution> {
        let grids = self.repo.grids_for(query.tenant_id, query.product_category)?;
        match select_grid(&grids, query) {
            Some(grid) => {
                grid.validate()?;
                log::debug!(
                    "grid {} ({}) selected for {} / {} at {}",
                    grid.grid_id, grid.grid_table, query.product_category, query.provider, query.premium
                );
                Ok(RateResolution::Matched(ResolvedRate::from(grid)))
            }
            None => Ok(RateResolution::NoRule),
        }
    }
}

/// Pick the best-matching grid, or `None` when nothing applies.
pub fn select_grid<'g>(grids: &'g [CommissionGrid], query: &RateQuery<'_>) -> Option<&'g CommissionGrid> {
    grids
        .iter()
        .filter(|g| g.matches(query))
        .min_by(|a, b| precedence(a, b))
}

/// `Less` means `a` wins.
fn precedence(a: &CommissionGrid, b: &CommissionGrid) -> Ordering {
    // exact provider (Some) first
    b.provider.is_some().cmp(&a.provider.is_some())
        .then_with(|| cmp_width(a.band_width(), b.band_width()))
        .then_with(|| b.version.cmp(&a.version))
        .then_with(|| b.effective_from.cmp(&a.effective_from))
        .then_with(|| a.grid_id.cmp(&b.grid_id))
}

fn cmp_width(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None)    => Ordering::Less,
        (None, Some(_))    => Ordering::Greater,
        (None, None)       => Ordering::Equal,
    }
}

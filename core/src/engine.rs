//! The commission engine — the one place a distribution is calculated.
//!
//! PIPELINE (fixed):
//!   1. validate the policy
//!   2. resolve the governing grid        (rate_resolution)
//!   3. resolve the source party's share  (party_resolver)
//!   4. compute insurer commission and split it (distribution)
//!
//! RULES:
//!   - Single-policy calculation, bulk resync and previews all go through
//!     `calculate_breakdown`. There is no second implementation.
//!   - `calculate_breakdown` is pure: it reads through the resolver traits
//!     and never writes.

use crate::{
    book::TenantBook,
    clock::CalcClock,
    config::CommissionConfig,
    distribution::{self, CommissionDistribution},
    error::{CommissionError, CommissionResult},
    party_resolver::{PartyLookup, PartyResolver, ShareDefaults},
    policy::Policy,
    rate_resolution::{GridMatcher, RateQuery, RateResolution, RateResolver},
    reconciliation::{CancelToken, ResyncReport, SyncDriver},
    report::{self, CommissionSummary},
    store::{CommissionStore, PolicySyncStatus},
};
use chrono::{DateTime, NaiveDate, Utc};

/// Calculate one policy's distribution without persisting it.
///
/// - `today`:   fallback reference date for policies with no bind date
/// - `calc_at`: timestamp stamped on the result
pub fn calculate_breakdown<R, P>(
    policy: &Policy,
    rates: &R,
    parties: &P,
    defaults: &ShareDefaults,
    today: NaiveDate,
    calc_at: DateTime<Utc>,
) -> CommissionResult<CommissionDistribution>
where
    R: RateResolver + ?Sized,
    P: PartyResolver + ?Sized,
{
    policy.validate()?;

    let query = RateQuery::for_policy(policy, today);
    let rate = match rates.resolve(&query)? {
        RateResolution::Matched(rate) => rate,
        RateResolution::NoRule => {
            return Err(CommissionError::NoApplicableGrid {
                policy_id:        policy.policy_id.clone(),
                product_category: policy.product_category.clone(),
                provider:         policy.provider.clone(),
                premium:          policy.premium.to_string(),
                reference_date:   query.reference_date.to_string(),
            });
        }
    };

    let party = parties.resolve(
        &policy.tenant_id,
        policy.source_type,
        policy.source_party_id.as_deref(),
        defaults,
    )?;

    let insurer = distribution::insurer_commission(policy.premium, rate.total_rate())?;
    let split = distribution::split(insurer, party.as_ref().map(|p| (p.kind, p.share.percentage)))?;

    Ok(CommissionDistribution::assemble(policy, &rate, party.as_ref(), &split, calc_at))
}

/// A fresh calculation next to the persisted row for the same policy.
#[derive(Debug)]
pub struct PolicyPreview {
    pub policy_id: String,
    pub fresh:     CommissionResult<CommissionDistribution>,
    pub stored:    Option<CommissionDistribution>,
}

impl PolicyPreview {
    /// True when a resync would change (or fail to produce) the stored row.
    pub fn drifted(&self) -> bool {
        match (&self.fresh, &self.stored) {
            (Ok(fresh), Some(stored)) => !stored.same_calculation(fresh),
            (Ok(_), None) => true,
            (Err(_), _) => true,
        }
    }
}

pub struct CommissionEngine {
    pub store:  CommissionStore,
    pub config: CommissionConfig,
    pub clock:  CalcClock,
}

impl CommissionEngine {
    pub fn new(store: CommissionStore, config: CommissionConfig) -> Self {
        Self { store, config, clock: CalcClock::System }
    }

    /// Build an engine over a migrated in-memory store with test config
    /// and the clock pinned to `now`.
    pub fn build_test(now: DateTime<Utc>) -> CommissionResult<Self> {
        let store = CommissionStore::in_memory()?;
        store.migrate()?;
        Ok(Self {
            store,
            config: CommissionConfig::default_test(),
            clock:  CalcClock::Fixed(now),
        })
    }

    pub fn with_clock(mut self, clock: CalcClock) -> Self {
        self.clock = clock;
        self
    }

    fn driver(&self) -> SyncDriver<'_> {
        SyncDriver::new(&self.store, &self.config, self.clock)
    }

    /// Recalculate and persist one policy's distribution.
    pub fn calculate_policy_commission(
        &self,
        tenant_id: &str,
        policy_id: &str,
    ) -> CommissionResult<CommissionDistribution> {
        self.driver().calculate_policy(tenant_id, policy_id)
    }

    /// Recalculate every commissionable policy of a tenant.
    pub fn resync_tenant_commissions(&self, tenant_id: &str) -> CommissionResult<ResyncReport> {
        self.driver().resync_tenant(tenant_id, None)
    }

    pub fn resync_tenant_commissions_with_cancel(
        &self,
        tenant_id: &str,
        cancel: &CancelToken,
    ) -> CommissionResult<ResyncReport> {
        self.driver().resync_tenant(tenant_id, Some(cancel))
    }

    /// What a recalculation would produce right now, without writing.
    pub fn preview_policy_commission(
        &self,
        tenant_id: &str,
        policy_id: &str,
    ) -> CommissionResult<CommissionDistribution> {
        let policy = self.store.policy(tenant_id, policy_id)?.ok_or_else(|| {
            CommissionError::PolicyNotFound {
                tenant_id: tenant_id.to_string(),
                policy_id: policy_id.to_string(),
            }
        })?;
        calculate_breakdown(
            &policy,
            &GridMatcher::new(&self.store),
            &PartyLookup::new(&self.store),
            &self.config.share_defaults(tenant_id),
            self.clock.today(),
            self.clock.now(),
        )
    }

    /// Previews for every commissionable policy of a tenant, paired with
    /// the stored row so callers can spot drift before a resync.
    pub fn preview_tenant(&self, tenant_id: &str) -> CommissionResult<Vec<PolicyPreview>> {
        let book = TenantBook::load(&self.store, tenant_id)?;
        let rates = GridMatcher::new(&book);
        let parties = PartyLookup::new(&book);
        let defaults = self.config.share_defaults(tenant_id);
        let (today, now) = (self.clock.today(), self.clock.now());

        self.store
            .commissionable_policies(tenant_id)?
            .into_iter()
            .map(|policy| {
                let stored = self.store.distribution(tenant_id, &policy.policy_id)?;
                let fresh = calculate_breakdown(&policy, &rates, &parties, &defaults, today, now);
                Ok(PolicyPreview { policy_id: policy.policy_id, fresh, stored })
            })
            .collect()
    }

    pub fn distribution(&self, tenant_id: &str, policy_id: &str) -> CommissionResult<Option<CommissionDistribution>> {
        self.store.distribution(tenant_id, policy_id)
    }

    pub fn sync_status(&self, tenant_id: &str, policy_id: &str) -> CommissionResult<Option<PolicySyncStatus>> {
        self.store.sync_status(tenant_id, policy_id)
    }

    pub fn summary(&self, tenant_id: &str) -> CommissionResult<CommissionSummary> {
        let rows = self.store.distributions_for_tenant(tenant_id)?;
        Ok(report::summarize(tenant_id, &rows))
    }

    /// Write the tenant's distributions as CSV.
    pub fn export_csv<W: std::io::Write>(&self, tenant_id: &str, out: W) -> CommissionResult<usize> {
        let rows = self.store.distributions_for_tenant(tenant_id)?;
        report::write_csv(&rows, out).map_err(|e| anyhow::anyhow!("CSV export failed: {e}"))?;
        Ok(rows.len())
    }
}

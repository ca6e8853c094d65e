//! Reconciliation / sync driver — runs the canonical calculation for one
//! policy or a whole tenant and persists the outcome.
//!
//! PER-POLICY STATE MACHINE:
//!   Unsynced    → Calculating
//!   Calculating → Calculated | Failed(reason)
//!   Calculated  → Calculating   (recalculation)
//!   Failed      → Calculating   (retry on the next sync)
//!
//! RULES:
//!   - A malformed policy is rejected before its claim is written.
//!   - A policy is claimed (→ Calculating) in the store before it is
//!     calculated, so two writers never work on the same policy.
//!   - The distribution row, the sync state and the audit entry for one
//!     policy are committed in one transaction.
//!   - Bulk resync holds the tenant lock, refreshing it every batch, never
//!     aborts on a single policy, and checks for cancellation between policies.

use crate::{
    book::TenantBook,
    clock::CalcClock,
    config::CommissionConfig,
    distribution::CommissionDistribution,
    engine::calculate_breakdown,
    error::{CommissionError, CommissionResult},
    event::{AuditLogEntry, CommissionEvent},
    party_resolver::PartyLookup,
    policy::Policy,
    rate_resolution::GridMatcher,
    store::{CommissionStore, CommitOutcome},
    types::{EntityId, RunId, TenantId},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncState {
    Unsynced,
    Calculating,
    Calculated,
    Failed { reason: String },
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Unsynced      => "unsynced",
            SyncState::Calculating   => "calculating",
            SyncState::Calculated    => "calculated",
            SyncState::Failed { .. } => "failed",
        }
    }

    pub fn can_transition_to(&self, next: &SyncState) -> bool {
        matches!(
            (self, next),
            (SyncState::Unsynced, SyncState::Calculating)
                | (SyncState::Calculated, SyncState::Calculating)
                | (SyncState::Failed { .. }, SyncState::Calculating)
                | (SyncState::Calculating, SyncState::Calculated)
                | (SyncState::Calculating, SyncState::Failed { .. })
        )
    }

    pub fn transition(self, next: SyncState) -> CommissionResult<SyncState> {
        if !self.can_transition_to(&next) {
            return Err(CommissionError::validation(format!(
                "illegal sync transition {self} -> {next}"
            )));
        }
        Ok(next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Calculated | SyncState::Failed { .. })
    }

    /// Rebuild from the store's `status` / `reason` columns.
    pub fn from_columns(status: &str, reason: Option<String>) -> Result<Self, String> {
        match status {
            "unsynced"    => Ok(SyncState::Unsynced),
            "calculating" => Ok(SyncState::Calculating),
            "calculated"  => Ok(SyncState::Calculated),
            "failed"      => Ok(SyncState::Failed { reason: reason.unwrap_or_default() }),
            other         => Err(format!("unknown sync status '{other}'")),
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Failed { reason } => write!(f, "failed({reason})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Caller-held handle to stop a bulk resync between policies.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFailure {
    pub policy_id: EntityId,
    /// Stable reason code, see `error::reason`.
    pub reason:    String,
    pub message:   String,
}

impl PolicyFailure {
    fn new(policy_id: &str, err: &CommissionError) -> Self {
        Self {
            policy_id: policy_id.to_string(),
            reason:    err.reason_code().to_string(),
            message:   err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResyncReport {
    pub run_id:        RunId,
    pub tenant_id:     TenantId,
    pub succeeded:     Vec<CommissionDistribution>,
    /// How many of `succeeded` matched the stored row and were not rewritten.
    pub unchanged:     usize,
    pub failed:        Vec<PolicyFailure>,
    pub cancelled:     bool,
    pub not_attempted: Vec<EntityId>,
}

impl ResyncReport {
    fn new(run_id: RunId, tenant_id: &str) -> Self {
        Self {
            run_id,
            tenant_id:     tenant_id.to_string(),
            succeeded:     Vec::new(),
            unchanged:     0,
            failed:        Vec::new(),
            cancelled:     false,
            not_attempted: Vec::new(),
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

pub struct SyncDriver<'a> {
    store:  &'a CommissionStore,
    config: &'a CommissionConfig,
    clock:  CalcClock,
}

impl<'a> SyncDriver<'a> {
    pub fn new(store: &'a CommissionStore, config: &'a CommissionConfig, clock: CalcClock) -> Self {
        Self { store, config, clock }
    }

    /// Single-policy mode: claim, calculate against the live store, commit.
    pub fn calculate_policy(&self, tenant_id: &str, policy_id: &str) -> CommissionResult<CommissionDistribution> {
        let policy = self.store.policy(tenant_id, policy_id)?.ok_or_else(|| {
            CommissionError::PolicyNotFound {
                tenant_id: tenant_id.to_string(),
                policy_id: policy_id.to_string(),
            }
        })?;

        // Malformed input is rejected before the claim writes anything.
        policy.validate()?;

        let actor = format!("adhoc-{}", uuid::Uuid::new_v4());
        let calc_at = self.clock.now();
        let state = self.claim(&policy, &actor)?;

        let result = calculate_breakdown(
            &policy,
            &GridMatcher::new(self.store),
            &PartyLookup::new(self.store),
            &self.config.share_defaults(tenant_id),
            self.clock.today(),
            calc_at,
        );
        let outcome = self.settle(&policy, &actor, state, result)?;
        Ok(outcome.into_row())
    }

    /// Bulk mode: every commissionable policy of the tenant.
    ///
    /// Returns `Err` only when the run cannot start (tenant lock held,
    /// store unreadable). Per-policy problems land in `failed`.
    pub fn resync_tenant(&self, tenant_id: &str, cancel: Option<&CancelToken>) -> CommissionResult<ResyncReport> {
        let run_id = format!("resync-{}", uuid::Uuid::new_v4());
        let lock = self.store.acquire_resync_lock(
            tenant_id,
            &run_id,
            self.clock.now(),
            self.config.resync.lock_stale_after_secs,
        )?;

        let policies = self.store.commissionable_policies(tenant_id)?;
        let book = TenantBook::load(self.store, tenant_id)?;
        let rates = GridMatcher::new(&book);
        let parties = PartyLookup::new(&book);
        let defaults = self.config.share_defaults(tenant_id);
        let (today, calc_at) = (self.clock.today(), self.clock.now());

        let workers = self.config.resync.max_workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| anyhow::anyhow!("cannot start resync workers: {e}"))?;

        log::info!("resync {run_id}: tenant {tenant_id}, {} policies, {workers} workers", policies.len());
        self.audit(
            tenant_id,
            &run_id,
            &CommissionEvent::ResyncStarted { run_id: run_id.clone(), policy_count: policies.len() },
        );

        let mut report = ResyncReport::new(run_id.clone(), tenant_id);
        let mut next = 0;

        while next < policies.len() && !report.cancelled {
            if next > 0 && !lock.refresh(self.clock.now())? {
                log::warn!("resync {run_id}: tenant lock for {tenant_id} was taken over; stopping");
                report.cancelled = true;
                break;
            }

            // Claim up to one batch, checking for cancellation before each policy.
            let mut claimed: Vec<(&Policy, SyncState)> = Vec::with_capacity(workers);
            while claimed.len() < workers && next < policies.len() {
                if cancel.is_some_and(CancelToken::is_cancelled) {
                    report.cancelled = true;
                    break;
                }
                let policy = &policies[next];
                next += 1;
                if let Err(e) = policy.validate() {
                    log::warn!("resync {run_id}: policy {} rejected: {e}", policy.policy_id);
                    report.failed.push(PolicyFailure::new(&policy.policy_id, &e));
                    continue;
                }
                match self.claim(policy, &run_id) {
                    Ok(state) => claimed.push((policy, state)),
                    Err(e) => {
                        log::warn!("resync {run_id}: policy {} skipped: {e}", policy.policy_id);
                        report.failed.push(PolicyFailure::new(&policy.policy_id, &e));
                    }
                }
            }

            let results: Vec<CommissionResult<CommissionDistribution>> = pool.install(|| {
                claimed
                    .par_iter()
                    .map(|(policy, _)| calculate_breakdown(*policy, &rates, &parties, &defaults, today, calc_at))
                    .collect()
            });

            // Writes stay on this thread, one policy at a time.
            for ((policy, state), result) in claimed.into_iter().zip(results) {
                match self.settle(policy, &run_id, state, result) {
                    Ok(outcome) => {
                        if matches!(outcome, CommitOutcome::Unchanged(_)) {
                            report.unchanged += 1;
                        }
                        report.succeeded.push(outcome.into_row());
                    }
                    Err(e) => {
                        log::warn!("resync {run_id}: policy {} failed: {e}", policy.policy_id);
                        report.failed.push(PolicyFailure::new(&policy.policy_id, &e));
                    }
                }
            }
        }

        report.not_attempted = policies[next..].iter().map(|p| p.policy_id.clone()).collect();

        let closing = if report.cancelled {
            CommissionEvent::ResyncCancelled {
                run_id:        run_id.clone(),
                processed:     report.processed(),
                not_attempted: report.not_attempted.len(),
            }
        } else {
            CommissionEvent::ResyncCompleted {
                run_id:    run_id.clone(),
                succeeded: report.succeeded.len(),
                unchanged: report.unchanged,
                failed:    report.failed.len(),
            }
        };
        self.audit(tenant_id, &run_id, &closing);

        log::info!(
            "resync {run_id}: {} succeeded ({} unchanged), {} failed, {} not attempted{}",
            report.succeeded.len(),
            report.unchanged,
            report.failed.len(),
            report.not_attempted.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    /// Unsynced/Calculated/Failed → Calculating, persisted as a claim.
    fn claim(&self, policy: &Policy, actor: &str) -> CommissionResult<SyncState> {
        let prior = self
            .store
            .sync_status(&policy.tenant_id, &policy.policy_id)?
            .map_or(SyncState::Unsynced, |s| s.state);

        let claimed = self.store.claim_policy(
            &policy.tenant_id,
            &policy.policy_id,
            actor,
            self.clock.now(),
            self.config.resync.claim_stale_after_secs,
        )?;
        if !claimed {
            return Err(CommissionError::CalculationInProgress {
                policy_id: policy.policy_id.clone(),
            });
        }

        // A stale claim taken over is Calculating → Calculating; treat the
        // abandoned attempt as unsynced.
        let from = if prior == SyncState::Calculating { SyncState::Unsynced } else { prior };
        from.transition(SyncState::Calculating)
    }

    /// Calculating → Calculated (row committed) or Failed (row untouched).
    fn settle(
        &self,
        policy: &Policy,
        actor: &str,
        state: SyncState,
        result: CommissionResult<CommissionDistribution>,
    ) -> CommissionResult<CommitOutcome> {
        let now = self.clock.now();
        match result.and_then(|dist| self.store.commit_distribution(&dist, actor, now)) {
            Ok(outcome) => {
                state.transition(SyncState::Calculated)?;
                log::debug!(
                    "policy {} calculated via grid {}{}",
                    policy.policy_id,
                    outcome.row().grid_id,
                    if matches!(outcome, CommitOutcome::Unchanged(_)) { " (unchanged)" } else { "" }
                );
                Ok(outcome)
            }
            Err(e) => {
                state.transition(SyncState::Failed { reason: e.reason_code().to_string() })?;
                if let Err(rec) = self.store.record_failure(&policy.tenant_id, &policy.policy_id, actor, &e, now) {
                    log::warn!("could not record failure for policy {}: {rec}", policy.policy_id);
                }
                Err(e)
            }
        }
    }

    fn audit(&self, tenant_id: &str, actor: &str, event: &CommissionEvent) {
        let written = AuditLogEntry::new(tenant_id, actor, event, self.clock.now())
            .map_err(CommissionError::from)
            .and_then(|entry| self.store.append_audit(&entry));
        if let Err(e) = written {
            log::warn!("audit write failed for {}: {e}", event.event_type());
        }
    }
}

use super::{parse_ts, ts, CommissionStore};
use crate::{
    error::{CommissionError, CommissionResult},
    reconciliation::SyncState,
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

/// The persisted sync state of one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySyncStatus {
    pub policy_id:  String,
    pub state:      SyncState,
    pub message:    Option<String>,
    pub claimed_by: String,
    pub updated_at: DateTime<Utc>,
}

impl CommissionStore {
    // ── Per-policy claim ──────────────────────────────────────────

    /// Move a policy into `calculating` on behalf of `actor`.
    ///
    /// Returns false when another actor holds a live claim. A claim older
    /// than `stale_after_secs` is treated as abandoned and taken over.
    pub fn claim_policy(
        &self,
        tenant_id: &str,
        policy_id: &str,
        actor: &str,
        now: DateTime<Utc>,
        stale_after_secs: i64,
    ) -> CommissionResult<bool> {
        let cutoff = now - Duration::seconds(stale_after_secs);
        let changed = self.conn.execute(
            "INSERT INTO commission_sync_state (policy_id, tenant_id, status, claimed_by, updated_at)
             VALUES (?1, ?2, 'calculating', ?3, ?4)
             ON CONFLICT (tenant_id, policy_id) DO UPDATE SET
                 status = 'calculating', reason = NULL, message = NULL,
                 claimed_by = excluded.claimed_by, updated_at = excluded.updated_at
             WHERE commission_sync_state.status != 'calculating'
                OR commission_sync_state.updated_at < ?5",
            params![policy_id, tenant_id, actor, ts(&now), ts(&cutoff)],
        )?;
        Ok(changed == 1)
    }

    pub fn sync_status(&self, tenant_id: &str, policy_id: &str) -> CommissionResult<Option<PolicySyncStatus>> {
        let status = self
            .conn
            .query_row(
                "SELECT policy_id, status, reason, message, claimed_by, updated_at
                 FROM commission_sync_state WHERE tenant_id = ?1 AND policy_id = ?2",
                params![tenant_id, policy_id],
                sync_from_row,
            )
            .optional()?;
        Ok(status)
    }

    /// Policies whose last calculation failed, for retry screens.
    pub fn failed_policies(&self, tenant_id: &str) -> CommissionResult<Vec<PolicySyncStatus>> {
        let mut stmt = self.conn.prepare(
            "SELECT policy_id, status, reason, message, claimed_by, updated_at
             FROM commission_sync_state WHERE tenant_id = ?1 AND status = 'failed'
             ORDER BY policy_id ASC",
        )?;
        let rows = stmt
            .query_map(params![tenant_id], sync_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Tenant resync lock ────────────────────────────────────────

    /// Take the tenant's resync lock for `run_id`. The lock is released when
    /// the returned guard drops.
    pub fn acquire_resync_lock<'a>(
        &'a self,
        tenant_id: &str,
        run_id: &str,
        now: DateTime<Utc>,
        stale_after_secs: i64,
    ) -> CommissionResult<ResyncLockGuard<'a>> {
        let cutoff = now - Duration::seconds(stale_after_secs);
        let changed = self.conn.execute(
            "INSERT INTO resync_lock (tenant_id, run_id, acquired_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (tenant_id) DO UPDATE SET
                 run_id = excluded.run_id, acquired_at = excluded.acquired_at
             WHERE resync_lock.acquired_at < ?4",
            params![tenant_id, run_id, ts(&now), ts(&cutoff)],
        )?;
        if changed == 0 {
            let holder: String = self
                .conn
                .query_row(
                    "SELECT run_id FROM resync_lock WHERE tenant_id = ?1",
                    params![tenant_id],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or_default();
            return Err(CommissionError::ResyncInProgress {
                tenant_id: tenant_id.to_string(),
                holder,
            });
        }
        Ok(ResyncLockGuard {
            store:     self,
            tenant_id: tenant_id.to_string(),
            run_id:    run_id.to_string(),
        })
    }

    fn refresh_resync_lock(&self, tenant_id: &str, run_id: &str, now: DateTime<Utc>) -> CommissionResult<bool> {
        let changed = self.conn.execute(
            "UPDATE resync_lock SET acquired_at = ?1 WHERE tenant_id = ?2 AND run_id = ?3",
            params![ts(&now), tenant_id, run_id],
        )?;
        Ok(changed == 1)
    }

    fn release_resync_lock(&self, tenant_id: &str, run_id: &str) -> CommissionResult<()> {
        self.conn.execute(
            "DELETE FROM resync_lock WHERE tenant_id = ?1 AND run_id = ?2",
            params![tenant_id, run_id],
        )?;
        Ok(())
    }
}

/// Holds a tenant's resync lock until dropped.
pub struct ResyncLockGuard<'a> {
    store:     &'a CommissionStore,
    tenant_id: String,
    run_id:    String,
}

impl ResyncLockGuard<'_> {
    /// Push the lock's staleness deadline out from `now`.
    ///
    /// Returns false when the lock has already been taken over by another
    /// run; the caller no longer holds it.
    pub fn refresh(&self, now: DateTime<Utc>) -> CommissionResult<bool> {
        self.store.refresh_resync_lock(&self.tenant_id, &self.run_id, now)
    }
}

impl Drop for ResyncLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_resync_lock(&self.tenant_id, &self.run_id) {
            log::warn!(
                "failed to release resync lock for tenant {} (run {}): {e}",
                self.tenant_id, self.run_id
            );
        }
    }
}

fn sync_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PolicySyncStatus> {
    let status: String = row.get(1)?;
    let reason: Option<String> = row.get(2)?;
    let state = SyncState::from_columns(&status, reason).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(PolicySyncStatus {
        policy_id:  row.get(0)?,
        state,
        message:    row.get(3)?,
        claimed_by: row.get(4)?,
        updated_at: parse_ts(row, 5)?,
    })
}

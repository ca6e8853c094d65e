use super::{insert_audit, parse_col, parse_opt_col, parse_ts, ts, CommissionStore};
use crate::{
    distribution::CommissionDistribution,
    error::{CommissionError, CommissionResult},
    event::{AuditLogEntry, CommissionEvent},
    money::{Bps, Money},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const DISTRIBUTION_COLUMNS: &str = "policy_id, tenant_id, policy_number, customer_name, product_type,
     provider, premium_amount, source_type, source_party_id, source_name,
     base_rate, reward_rate, bonus_rate, total_rate,
     insurer_commission, agent_commission, misp_commission, employee_commission, broker_share,
     grid_id, grid_table, tier_name, share_mode, share_bps, override_used,
     commission_status, calc_date";

/// What a commit did to the persisted row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Written {
        replaced_prior: bool,
        row: CommissionDistribution,
    },
    /// The stored row already carried this calculation and was left as is.
    Unchanged(CommissionDistribution),
}

impl CommitOutcome {
    pub fn row(&self) -> &CommissionDistribution {
        match self {
            CommitOutcome::Written { row, .. } => row,
            CommitOutcome::Unchanged(row) => row,
        }
    }

    pub fn into_row(self) -> CommissionDistribution {
        match self {
            CommitOutcome::Written { row, .. } => row,
            CommitOutcome::Unchanged(row) => row,
        }
    }
}

impl CommissionStore {
    pub fn distribution(&self, tenant_id: &str, policy_id: &str) -> CommissionResult<Option<CommissionDistribution>> {
        Ok(load_distribution(&self.conn, tenant_id, policy_id)?)
    }

    pub fn distributions_for_tenant(&self, tenant_id: &str) -> CommissionResult<Vec<CommissionDistribution>> {
        let sql = format!(
            "SELECT {DISTRIBUTION_COLUMNS} FROM commission_distribution
             WHERE tenant_id = ?1 ORDER BY policy_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![tenant_id], distribution_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn distribution_count(&self, tenant_id: &str) -> CommissionResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM commission_distribution WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Persist a calculated distribution for a policy `actor` has claimed.
    ///
    /// One transaction covers the row upsert, the sync-state move to
    /// `calculated` and the audit entry. If any step fails nothing is
    /// written and the prior row stays as it was. A row whose calculation
    /// is unchanged is not rewritten.
    pub fn commit_distribution(
        &self,
        dist: &CommissionDistribution,
        actor: &str,
        now: DateTime<Utc>,
    ) -> CommissionResult<CommitOutcome> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let prior = load_distribution(&tx, &dist.tenant_id, &dist.policy_id)?;
        let outcome = match prior {
            Some(existing) if existing.same_calculation(dist) => CommitOutcome::Unchanged(existing),
            prior => {
                upsert_distribution(&tx, dist)?;
                CommitOutcome::Written {
                    replaced_prior: prior.is_some(),
                    row: dist.clone(),
                }
            }
        };

        let released = tx.execute(
            "UPDATE commission_sync_state
             SET status = 'calculated', reason = NULL, message = NULL, updated_at = ?1
             WHERE tenant_id = ?2 AND policy_id = ?3 AND claimed_by = ?4 AND status = 'calculating'",
            params![ts(&now), dist.tenant_id, dist.policy_id, actor],
        )?;
        if released == 0 {
            // Our claim expired and another writer took the policy over.
            return Err(CommissionError::CalculationInProgress {
                policy_id: dist.policy_id.clone(),
            });
        }

        let event = match &outcome {
            CommitOutcome::Written { replaced_prior, row } => CommissionEvent::DistributionCalculated {
                policy_id:          row.policy_id.clone(),
                grid_id:            row.grid_id.clone(),
                insurer_commission: row.insurer_commission,
                party_commission:   row.party_commission(),
                broker_share:       row.broker_share,
                replaced_prior:     *replaced_prior,
            },
            CommitOutcome::Unchanged(row) => CommissionEvent::DistributionUnchanged {
                policy_id: row.policy_id.clone(),
                grid_id:   row.grid_id.clone(),
            },
        };
        insert_audit(&tx, &AuditLogEntry::new(&dist.tenant_id, actor, &event, now)?)?;

        tx.commit()?;
        Ok(outcome)
    }

    /// Record a failed calculation. The distribution row, if any, is not
    /// touched.
    pub fn record_failure(
        &self,
        tenant_id: &str,
        policy_id: &str,
        actor: &str,
        err: &CommissionError,
        now: DateTime<Utc>,
    ) -> CommissionResult<()> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let message = err.to_string();
        tx.execute(
            "UPDATE commission_sync_state
             SET status = 'failed', reason = ?1, message = ?2, updated_at = ?3
             WHERE tenant_id = ?4 AND policy_id = ?5 AND claimed_by = ?6",
            params![err.reason_code(), message, ts(&now), tenant_id, policy_id, actor],
        )?;
        let event = CommissionEvent::CalculationFailed {
            policy_id: policy_id.to_string(),
            reason:    err.reason_code().to_string(),
            message,
        };
        insert_audit(&tx, &AuditLogEntry::new(tenant_id, actor, &event, now)?)?;
        tx.commit()?;
        Ok(())
    }
}

fn load_distribution(
    conn: &Connection,
    tenant_id: &str,
    policy_id: &str,
) -> rusqlite::Result<Option<CommissionDistribution>> {
    let sql = format!(
        "SELECT {DISTRIBUTION_COLUMNS} FROM commission_distribution
         WHERE tenant_id = ?1 AND policy_id = ?2"
    );
    conn.query_row(&sql, params![tenant_id, policy_id], distribution_from_row)
        .optional()
}

fn upsert_distribution(conn: &Connection, d: &CommissionDistribution) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO commission_distribution (
            policy_id, tenant_id, policy_number, customer_name, product_type,
            provider, premium_amount, source_type, source_party_id, source_name,
            base_rate, reward_rate, bonus_rate, total_rate,
            insurer_commission, agent_commission, misp_commission, employee_commission, broker_share,
            grid_id, grid_table, tier_name, share_mode, share_bps, override_used,
            commission_status, calc_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                  ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)
        ON CONFLICT (tenant_id, policy_id) DO UPDATE SET
            policy_number = excluded.policy_number,
            customer_name = excluded.customer_name,
            product_type = excluded.product_type,
            provider = excluded.provider,
            premium_amount = excluded.premium_amount,
            source_type = excluded.source_type,
            source_party_id = excluded.source_party_id,
            source_name = excluded.source_name,
            base_rate = excluded.base_rate,
            reward_rate = excluded.reward_rate,
            bonus_rate = excluded.bonus_rate,
            total_rate = excluded.total_rate,
            insurer_commission = excluded.insurer_commission,
            agent_commission = excluded.agent_commission,
            misp_commission = excluded.misp_commission,
            employee_commission = excluded.employee_commission,
            broker_share = excluded.broker_share,
            grid_id = excluded.grid_id,
            grid_table = excluded.grid_table,
            tier_name = excluded.tier_name,
            share_mode = excluded.share_mode,
            share_bps = excluded.share_bps,
            override_used = excluded.override_used,
            commission_status = excluded.commission_status,
            calc_date = excluded.calc_date",
        params![
            d.policy_id,
            d.tenant_id,
            d.policy_number,
            d.customer_name,
            d.product_type,
            d.provider,
            d.premium_amount.minor(),
            d.source_type.as_str(),
            d.source_party_id,
            d.source_name,
            d.base_rate.0,
            d.reward_rate.0,
            d.bonus_rate.0,
            d.total_rate.0,
            d.insurer_commission.minor(),
            d.agent_commission.minor(),
            d.misp_commission.minor(),
            d.employee_commission.minor(),
            d.broker_share.minor(),
            d.grid_id,
            d.grid_table,
            d.tier_name,
            d.share_mode.map(|m| m.as_str()),
            d.share_percentage.0,
            d.override_used,
            d.commission_status.as_str(),
            ts(&d.calc_date),
        ],
    )?;
    Ok(())
}

fn distribution_from_row(row: &Row<'_>) -> rusqlite::Result<CommissionDistribution> {
    Ok(CommissionDistribution {
        policy_id:           row.get(0)?,
        tenant_id:           row.get(1)?,
        policy_number:       row.get(2)?,
        customer_name:       row.get(3)?,
        product_type:        row.get(4)?,
        provider:            row.get(5)?,
        premium_amount:      Money(row.get(6)?),
        source_type:         parse_col(row, 7)?,
        source_party_id:     row.get(8)?,
        source_name:         row.get(9)?,
        base_rate:           Bps(row.get(10)?),
        reward_rate:         Bps(row.get(11)?),
        bonus_rate:          Bps(row.get(12)?),
        total_rate:          Bps(row.get(13)?),
        insurer_commission:  Money(row.get(14)?),
        agent_commission:    Money(row.get(15)?),
        misp_commission:     Money(row.get(16)?),
        employee_commission: Money(row.get(17)?),
        broker_share:        Money(row.get(18)?),
        grid_id:             row.get(19)?,
        grid_table:          row.get(20)?,
        tier_name:           row.get(21)?,
        share_mode:          parse_opt_col(row, 22)?,
        share_percentage:    Bps(row.get(23)?),
        override_used:       row.get(24)?,
        commission_status:   parse_col(row, 25)?,
        calc_date:           parse_ts(row, 26)?,
    })
}

use super::{date_str, parse_col, parse_opt_date, CommissionStore};
use crate::{error::CommissionResult, money::Money, policy::Policy};
use rusqlite::{params, OptionalExtension, Row};

const POLICY_COLUMNS: &str = "policy_id, tenant_id, policy_number, customer_name, product_category,
     provider, premium_minor, source_type, source_party_id, bind_date, status";

impl CommissionStore {
    /// Insert or replace a policy. Policies are owned by the back-office;
    /// the engine only writes them when seeding data.
    pub fn upsert_policy(&self, p: &Policy) -> CommissionResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO policy (
                policy_id, tenant_id, policy_number, customer_name, product_category,
                provider, premium_minor, source_type, source_party_id, bind_date, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                p.policy_id,
                p.tenant_id,
                p.policy_number,
                p.customer_name,
                p.product_category,
                p.provider,
                p.premium.minor(),
                p.source_type.as_str(),
                p.source_party_id,
                p.bind_date.as_ref().map(date_str),
                p.status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn policy(&self, tenant_id: &str, policy_id: &str) -> CommissionResult<Option<Policy>> {
        let sql = format!("SELECT {POLICY_COLUMNS} FROM policy WHERE tenant_id = ?1 AND policy_id = ?2");
        let policy = self
            .conn
            .query_row(&sql, params![tenant_id, policy_id], policy_from_row)
            .optional()?;
        Ok(policy)
    }

    /// Every bound policy of a tenant, ordered by policy id.
    pub fn commissionable_policies(&self, tenant_id: &str) -> CommissionResult<Vec<Policy>> {
        let sql = format!(
            "SELECT {POLICY_COLUMNS} FROM policy
             WHERE tenant_id = ?1 AND status = 'bound'
             ORDER BY policy_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let policies = stmt
            .query_map(params![tenant_id], policy_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(policies)
    }
}

fn policy_from_row(row: &Row<'_>) -> rusqlite::Result<Policy> {
    Ok(Policy {
        policy_id:        row.get(0)?,
        tenant_id:        row.get(1)?,
        policy_number:    row.get(2)?,
        customer_name:    row.get(3)?,
        product_category: row.get(4)?,
        provider:         row.get(5)?,
        premium:          Money(row.get(6)?),
        source_type:      parse_col(row, 7)?,
        source_party_id:  row.get(8)?,
        bind_date:        parse_opt_date(row, 9)?,
        status:           parse_col(row, 10)?,
    })
}

//! Report-ready views of persisted distributions: the CSV export consumed
//! by downstream reporting, and tenant-level totals.

use crate::{
    distribution::CommissionDistribution,
    money::Money,
    store::ts,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Export columns, in order. External reports key off these names.
pub const CSV_COLUMNS: [&str; 23] = [
    "policy_id",
    "policy_number",
    "customer_name",
    "product_type",
    "provider",
    "premium_amount",
    "source_type",
    "source_name",
    "base_rate",
    "reward_rate",
    "bonus_rate",
    "total_rate",
    "insurer_commission",
    "agent_commission",
    "misp_commission",
    "employee_commission",
    "broker_share",
    "grid_id",
    "grid_table",
    "tier_name",
    "override_used",
    "commission_status",
    "calc_date",
];

pub fn csv_record(d: &CommissionDistribution) -> [String; 23] {
    [
        d.policy_id.clone(),
        d.policy_number.clone(),
        d.customer_name.clone(),
        d.product_type.clone(),
        d.provider.clone(),
        d.premium_amount.to_string(),
        d.source_type.to_string(),
        d.source_name.clone(),
        d.base_rate.to_string(),
        d.reward_rate.to_string(),
        d.bonus_rate.to_string(),
        d.total_rate.to_string(),
        d.insurer_commission.to_string(),
        d.agent_commission.to_string(),
        d.misp_commission.to_string(),
        d.employee_commission.to_string(),
        d.broker_share.to_string(),
        d.grid_id.clone(),
        d.grid_table.clone(),
        d.tier_name.clone().unwrap_or_default(),
        d.override_used.to_string(),
        d.commission_status.as_str().to_string(),
        ts(&d.calc_date),
    ]
}

/// Header line plus one line per distribution (RFC 4180 quoting).
pub fn write_csv<W: Write>(rows: &[CommissionDistribution], mut out: W) -> io::Result<()> {
    write_line(&mut out, CSV_COLUMNS.iter().copied())?;
    for row in rows {
        let record = csv_record(row);
        write_line(&mut out, record.iter().map(String::as_str))?;
    }
    out.flush()
}

fn write_line<'a, W: Write>(out: &mut W, fields: impl Iterator<Item = &'a str>) -> io::Result<()> {
    let line = fields.map(escape).collect::<Vec<_>>().join(",");
    writeln!(out, "{line}")
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTotals {
    pub policies:           usize,
    pub premium:            Money,
    pub insurer_commission: Money,
    pub party_commission:   Money,
    pub broker_share:       Money,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSummary {
    pub tenant_id:           String,
    pub policies:            usize,
    pub premium:             Money,
    pub insurer_commission:  Money,
    pub agent_commission:    Money,
    pub misp_commission:     Money,
    pub employee_commission: Money,
    pub broker_share:        Money,
    pub overrides_used:      usize,
    /// Keyed by source type (`direct`, `agent`, ...).
    pub by_source:           BTreeMap<String, SourceTotals>,
}

impl CommissionSummary {
    /// Aggregate form of the per-row sum invariant.
    pub fn is_balanced(&self) -> bool {
        self.agent_commission + self.misp_commission + self.employee_commission + self.broker_share
            == self.insurer_commission
    }
}

pub fn summarize(tenant_id: &str, rows: &[CommissionDistribution]) -> CommissionSummary {
    let mut s = CommissionSummary { tenant_id: tenant_id.to_string(), ..Default::default() };
    for d in rows {
        s.policies += 1;
        s.premium = s.premium + d.premium_amount;
        s.insurer_commission = s.insurer_commission + d.insurer_commission;
        s.agent_commission = s.agent_commission + d.agent_commission;
        s.misp_commission = s.misp_commission + d.misp_commission;
        s.employee_commission = s.employee_commission + d.employee_commission;
        s.broker_share = s.broker_share + d.broker_share;
        if d.override_used {
            s.overrides_used += 1;
        }

        let t = s.by_source.entry(d.source_type.to_string()).or_default();
        t.policies += 1;
        t.premium = t.premium + d.premium_amount;
        t.insurer_commission = t.insurer_commission + d.insurer_commission;
        t.party_commission = t.party_commission + d.party_commission();
        t.broker_share = t.broker_share + d.broker_share;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_quotes_only_when_needed() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("Rao, Asha"), "\"Rao, Asha\"");
        assert_eq!(escape("the \"best\""), "\"the \"\"best\"\"\"");
    }
}

//! Distribution calculator and the persisted distribution row.
//!
//! RULE: the broker share is always the remainder
//! `insurer_commission - party_commission`; it is never rounded on its
//! own, so the split sums back to the insurer commission exactly.

use crate::{
    error::{CommissionError, CommissionResult},
    money::{Bps, Money},
    party_resolver::{ResolvedParty, ShareMode},
    policy::Policy,
    rate_resolution::ResolvedRate,
    types::{EntityId, PartyKind, SourceType, TenantId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `premium × total_rate / 100`, rounded half-up to the minor unit.
pub fn insurer_commission(premium: Money, total_rate: Bps) -> CommissionResult<Money> {
    if premium.is_negative() {
        return Err(CommissionError::validation(format!("negative premium {premium}")));
    }
    if total_rate.is_negative() {
        return Err(CommissionError::validation(format!("negative total rate {total_rate}%")));
    }
    premium.apply_rate(total_rate).ok_or_else(|| {
        CommissionError::validation(format!(
            "insurer commission for premium {premium} at {total_rate}% is out of range"
        ))
    })
}

/// The amounts of one calculation. At most one party column is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Split {
    pub insurer_commission:  Money,
    pub agent_commission:    Money,
    pub misp_commission:     Money,
    pub employee_commission: Money,
    pub broker_share:        Money,
}

impl Split {
    pub fn party_commission(&self) -> Money {
        self.agent_commission + self.misp_commission + self.employee_commission
    }
}

/// Apportion `insurer` between the source party (if any) and the broker.
pub fn split(insurer: Money, party: Option<(PartyKind, Bps)>) -> CommissionResult<Split> {
    if insurer.is_negative() {
        return Err(CommissionError::validation(format!("negative insurer commission {insurer}")));
    }
    let mut out = Split { insurer_commission: insurer, ..Split::default() };

    let Some((kind, pct)) = party else {
        out.broker_share = insurer;
        return Ok(out);
    };
    if pct.is_negative() || pct > Bps::WHOLE {
        return Err(CommissionError::validation(format!("party share {pct}% is outside 0-100")));
    }

    let party_commission = insurer.apply_rate(pct).ok_or_else(|| {
        CommissionError::validation(format!("party share of {insurer} at {pct}% is out of range"))
    })?;
    match kind {
        PartyKind::Agent    => out.agent_commission = party_commission,
        PartyKind::Misp     => out.misp_commission = party_commission,
        PartyKind::Employee => out.employee_commission = party_commission,
    }
    out.broker_share = insurer - party_commission;
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Calculated,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Calculated => "calculated",
        }
    }
}

impl std::str::FromStr for CommissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calculated" => Ok(CommissionStatus::Calculated),
            other        => Err(format!("unknown commission status '{other}'")),
        }
    }
}

/// One policy's distribution. Field names are consumed by downstream
/// reports and exports and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionDistribution {
    pub policy_id:           EntityId,
    pub tenant_id:           TenantId,
    pub policy_number:       String,
    pub customer_name:       String,
    pub product_type:        String,
    pub provider:            String,
    pub premium_amount:      Money,
    pub source_type:         SourceType,
    pub source_party_id:     Option<EntityId>,
    pub source_name:         String,
    pub base_rate:           Bps,
    pub reward_rate:         Bps,
    pub bonus_rate:          Bps,
    pub total_rate:          Bps,
    pub insurer_commission:  Money,
    pub agent_commission:    Money,
    pub misp_commission:     Money,
    pub employee_commission: Money,
    pub broker_share:        Money,
    pub grid_id:             EntityId,
    pub grid_table:          String,
    pub tier_name:           Option<String>,
    pub share_mode:          Option<ShareMode>,
    pub share_percentage:    Bps,
    pub override_used:       bool,
    pub commission_status:   CommissionStatus,
    pub calc_date:           DateTime<Utc>,
}

pub const DIRECT_SOURCE_NAME: &str = "Direct";

impl CommissionDistribution {
    pub fn assemble(
        policy: &Policy,
        rate: &ResolvedRate,
        party: Option<&ResolvedParty>,
        split: &Split,
        calc_date: DateTime<Utc>,
    ) -> Self {
        Self {
            policy_id:           policy.policy_id.clone(),
            tenant_id:           policy.tenant_id.clone(),
            policy_number:       policy.policy_number.clone(),
            customer_name:       policy.customer_name.clone(),
            product_type:        policy.product_category.clone(),
            provider:            policy.provider.clone(),
            premium_amount:      policy.premium,
            source_type:         policy.source_type,
            source_party_id:     party.map(|p| p.party_id.clone()),
            source_name:         party.map_or_else(|| DIRECT_SOURCE_NAME.to_string(), |p| p.name.clone()),
            base_rate:           rate.base_rate,
            reward_rate:         rate.reward_rate,
            bonus_rate:          rate.bonus_rate,
            total_rate:          rate.total_rate(),
            insurer_commission:  split.insurer_commission,
            agent_commission:    split.agent_commission,
            misp_commission:     split.misp_commission,
            employee_commission: split.employee_commission,
            broker_share:        split.broker_share,
            grid_id:             rate.grid_id.clone(),
            grid_table:          rate.grid_table.clone(),
            tier_name:           party.and_then(|p| p.share.tier_name.clone()),
            share_mode:          party.map(|p| p.share.mode),
            share_percentage:    party.map_or(Bps::ZERO, |p| p.share.percentage),
            override_used:       party.is_some_and(|p| p.share.mode == ShareMode::Override),
            commission_status:   CommissionStatus::Calculated,
            calc_date,
        }
    }

    pub fn party_commission(&self) -> Money {
        self.agent_commission + self.misp_commission + self.employee_commission
    }

    /// True when both rows carry the same calculation, ignoring when it ran.
    pub fn same_calculation(&self, other: &CommissionDistribution) -> bool {
        let mut aligned = other.clone();
        aligned.calc_date = self.calc_date;
        *self == aligned
    }

    /// `insurer = party + broker`, and at most one party column is set.
    pub fn is_balanced(&self) -> bool {
        let paid = [self.agent_commission, self.misp_commission, self.employee_commission]
            .iter()
            .filter(|m| m.minor() != 0)
            .count();
        paid <= 1 && self.party_commission() + self.broker_share == self.insurer_commission
    }
}

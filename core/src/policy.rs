//! Bound insurance policies as the engine reads them.

use crate::{
    error::{CommissionError, CommissionResult},
    money::Money,
    types::{EntityId, SourceType, TenantId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Draft,
    Bound,
    Cancelled,
    Lapsed,
}

impl PolicyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyStatus::Draft     => "draft",
            PolicyStatus::Bound     => "bound",
            PolicyStatus::Cancelled => "cancelled",
            PolicyStatus::Lapsed    => "lapsed",
        }
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft"     => Ok(PolicyStatus::Draft),
            "bound"     => Ok(PolicyStatus::Bound),
            "cancelled" => Ok(PolicyStatus::Cancelled),
            "lapsed"    => Ok(PolicyStatus::Lapsed),
            other       => Err(format!("unknown policy status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id:        EntityId,
    pub tenant_id:        TenantId,
    pub policy_number:    String,
    pub customer_name:    String,
    pub product_category: String,
    pub provider:         String,
    pub premium:          Money,
    pub source_type:      SourceType,
    pub source_party_id:  Option<EntityId>,
    pub bind_date:        Option<NaiveDate>,
    pub status:           PolicyStatus,
}

impl Policy {
    /// Only bound policies earn commission.
    pub fn is_commissionable(&self) -> bool {
        self.status == PolicyStatus::Bound
    }

    /// The date grids are matched against: bind date, or `today` when the
    /// policy has none recorded.
    pub fn reference_date(&self, today: NaiveDate) -> NaiveDate {
        self.bind_date.unwrap_or(today)
    }

    /// Reject malformed input before any computation or write.
    pub fn validate(&self) -> CommissionResult<()> {
        if self.policy_id.trim().is_empty() {
            return Err(CommissionError::validation("policy id is required"));
        }
        if self.tenant_id.trim().is_empty() {
            return Err(CommissionError::validation(format!(
                "policy {} has no tenant id",
                self.policy_id
            )));
        }
        if self.policy_number.trim().is_empty() {
            return Err(CommissionError::validation(format!(
                "policy {} has no policy number",
                self.policy_id
            )));
        }
        if self.product_category.trim().is_empty() {
            return Err(CommissionError::validation(format!(
                "policy {} has no product category",
                self.policy_id
            )));
        }
        if self.premium.is_negative() {
            return Err(CommissionError::validation(format!(
                "policy {} has negative premium {}",
                self.policy_id, self.premium
            )));
        }
        if !self.is_commissionable() {
            return Err(CommissionError::validation(format!(
                "policy {} is {} and not commissionable",
                self.policy_id, self.status
            )));
        }
        match (self.source_type, self.source_party_id.as_deref()) {
            (SourceType::Direct, _) => {}
            (kind, None) => {
                return Err(CommissionError::validation(format!(
                    "policy {} declares {kind} source without a party id",
                    self.policy_id
                )));
            }
            (kind, Some(id)) if id.trim().is_empty() => {
                return Err(CommissionError::validation(format!(
                    "policy {} declares {kind} source with a blank party id",
                    self.policy_id
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

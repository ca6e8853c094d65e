//! Party resolution — who earns the split on a policy and at what percentage.
//!
//! PRECEDENCE (first hit wins):
//!   1. the party's own override percentage
//!   2. the party's commission tier
//!   3. employees only: the tenant's default employee share
//!   4. nothing configured: zero share, or a validation failure when the
//!      tenant is configured to reject unconfigured parties
//!
//! The employee default is passed in through `ShareDefaults`; the resolver
//! never reads it from ambient state.

use crate::{
    error::{CommissionError, CommissionResult},
    money::Bps,
    types::{EntityId, PartyKind, SourceType, TenantId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionTier {
    pub tier_id:         EntityId,
    pub tenant_id:       TenantId,
    pub name:            String,
    pub base_percentage: Bps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub party_id:            EntityId,
    pub tenant_id:           TenantId,
    pub kind:                PartyKind,
    pub name:                String,
    pub code:                String,
    pub commission_tier_id:  Option<EntityId>,
    pub override_percentage: Option<Bps>,
}

/// What to do with a party that has no override, no tier and no default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnconfiguredParty {
    #[default]
    ZeroShare,
    Reject,
}

/// Tenant-level share configuration handed to every resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShareDefaults {
    pub employee_share: Option<Bps>,
    pub unconfigured:   UnconfiguredParty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareMode {
    Override,
    Tier,
    EmployeeDefault,
    None,
}

impl ShareMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareMode::Override        => "override",
            ShareMode::Tier            => "tier",
            ShareMode::EmployeeDefault => "employee_default",
            ShareMode::None            => "none",
        }
    }
}

impl fmt::Display for ShareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShareMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "override"         => Ok(ShareMode::Override),
            "tier"             => Ok(ShareMode::Tier),
            "employee_default" => Ok(ShareMode::EmployeeDefault),
            "none"             => Ok(ShareMode::None),
            other              => Err(format!("unknown share mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyShare {
    pub mode:       ShareMode,
    pub percentage: Bps,
    /// Tier name, only when the tier actually supplied the percentage.
    pub tier_name:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedParty {
    pub kind:     PartyKind,
    pub party_id: EntityId,
    pub name:     String,
    pub share:    PartyShare,
}

/// Read-only access to party and tier records.
pub trait PartyRepository {
    fn party(&self, tenant_id: &str, kind: PartyKind, party_id: &str) -> CommissionResult<Option<Party>>;
    fn tier(&self, tenant_id: &str, tier_id: &str) -> CommissionResult<Option<CommissionTier>>;
}

pub trait PartyResolver {
    /// `Ok(None)` for direct business. A declared party that does not
    /// exist is `PartyNotFound`, never a silent zero.
    fn resolve(
        &self,
        tenant_id: &str,
        source_type: SourceType,
        party_id: Option<&str>,
        defaults: &ShareDefaults,
    ) -> CommissionResult<Option<ResolvedParty>>;
}

/// The repository-backed `PartyResolver`.
pub struct PartyLookup<'a, R: ?Sized> {
    repo: &'a R,
}

impl<'a, R: PartyRepository + ?Sized> PartyLookup<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }
}

impl<R: PartyRepository + ?Sized> PartyResolver for PartyLookup<'_, R> {
    fn resolve(
        &self,
        tenant_id: &str,
        source_type: SourceType,
        party_id: Option<&str>,
        defaults: &ShareDefaults,
    ) -> CommissionResult<Option<ResolvedParty>> {
        let Some(kind) = source_type.party_kind() else {
            return Ok(None);
        };
        let party_id = party_id.ok_or_else(|| {
            CommissionError::validation(format!("{kind} source declared without a party id"))
        })?;

        let party = self
            .repo
            .party(tenant_id, kind, party_id)?
            .ok_or_else(|| CommissionError::PartyNotFound {
                tenant_id: tenant_id.to_string(),
                kind:      kind.to_string(),
                party_id:  party_id.to_string(),
            })?;

        // A tier lookup is only needed when no override is set.
        let tier = match (&party.override_percentage, &party.commission_tier_id) {
            (None, Some(tier_id)) => {
                let tier = self.repo.tier(tenant_id, tier_id)?;
                if tier.is_none() {
                    log::warn!(
                        "{kind} {} references unknown commission tier {tier_id}; treating as untiered",
                        party.party_id
                    );
                }
                tier
            }
            _ => None,
        };

        let share = resolve_share(&party, tier.as_ref(), defaults)?;
        Ok(Some(ResolvedParty {
            kind,
            party_id: party.party_id,
            name:     party.name,
            share,
        }))
    }
}

/// Apply the precedence rules to an already-fetched party.
pub fn resolve_share(
    party: &Party,
    tier: Option<&CommissionTier>,
    defaults: &ShareDefaults,
) -> CommissionResult<PartyShare> {
    let share = if let Some(pct) = party.override_percentage {
        PartyShare { mode: ShareMode::Override, percentage: pct, tier_name: None }
    } else if let Some(t) = tier {
        PartyShare {
            mode:       ShareMode::Tier,
            percentage: t.base_percentage,
            tier_name:  Some(t.name.clone()),
        }
    } else if let (PartyKind::Employee, Some(pct)) = (party.kind, defaults.employee_share) {
        PartyShare { mode: ShareMode::EmployeeDefault, percentage: pct, tier_name: None }
    } else {
        match defaults.unconfigured {
            UnconfiguredParty::Reject => {
                return Err(CommissionError::validation(format!(
                    "{} {} has no override, tier or default share",
                    party.kind, party.party_id
                )));
            }
            UnconfiguredParty::ZeroShare => {
                log::warn!(
                    "{} {} has no override, tier or default share; party split is zero",
                    party.kind, party.party_id
                );
                PartyShare { mode: ShareMode::None, percentage: Bps::ZERO, tier_name: None }
            }
        }
    };

    if share.percentage.is_negative() || share.percentage > Bps::WHOLE {
        return Err(CommissionError::validation(format!(
            "{} {} share {}% is outside 0-100",
            party.kind, party.party_id, share.percentage
        )));
    }
    Ok(share)
}

//! Shared primitive types used across the commission engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stable identifier for a tenant (brokerage organisation).
pub type TenantId = String;

/// A stable identifier for any stored entity (policy, grid, party, tier).
pub type EntityId = String;

/// Identifier of one bulk resync run.
pub type RunId = String;

/// Who originated a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Direct,
    Employee,
    Agent,
    Misp,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Direct   => "direct",
            SourceType::Employee => "employee",
            SourceType::Agent    => "agent",
            SourceType::Misp     => "misp",
        }
    }

    /// The party kind behind this source, `None` for direct business.
    pub fn party_kind(&self) -> Option<PartyKind> {
        match self {
            SourceType::Direct   => None,
            SourceType::Employee => Some(PartyKind::Employee),
            SourceType::Agent    => Some(PartyKind::Agent),
            SourceType::Misp     => Some(PartyKind::Misp),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct"   => Ok(SourceType::Direct),
            "employee" => Ok(SourceType::Employee),
            "agent"    => Ok(SourceType::Agent),
            "misp"     => Ok(SourceType::Misp),
            other      => Err(format!("unknown source type '{other}'")),
        }
    }
}

/// The kinds of business-source party that can earn a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    Employee,
    Agent,
    Misp,
}

impl PartyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyKind::Employee => "employee",
            PartyKind::Agent    => "agent",
            PartyKind::Misp     => "misp",
        }
    }
}

impl fmt::Display for PartyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employee" => Ok(PartyKind::Employee),
            "agent"    => Ok(PartyKind::Agent),
            "misp"     => Ok(PartyKind::Misp),
            other      => Err(format!("unknown party kind '{other}'")),
        }
    }
}

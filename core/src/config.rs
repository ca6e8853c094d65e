use crate::{
    money::Bps,
    party_resolver::{ShareDefaults, UnconfiguredParty},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const CONFIG_FILE: &str = "commission_config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResyncConfig {
    /// Upper bound on policies calculated in parallel.
    pub max_workers:             usize,
    /// A `calculating` claim older than this is considered abandoned.
    pub claim_stale_after_secs:  i64,
    /// A tenant resync lock older than this is considered abandoned.
    pub lock_stale_after_secs:   i64,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            max_workers:            4,
            claim_stale_after_secs: 300,
            lock_stale_after_secs:  3_600,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantShareConfig {
    #[serde(default)]
    pub employee_share_percentage: Option<f64>,
    #[serde(default)]
    pub unconfigured_party:        Option<UnconfiguredParty>,
}

#[derive(Debug, Clone, Deserialize)]
struct CommissionConfigFile {
    #[serde(default)]
    default_employee_share_percentage: Option<f64>,
    #[serde(default)]
    unconfigured_party:                UnconfiguredParty,
    #[serde(default)]
    tenants:                           HashMap<String, TenantShareConfig>,
    #[serde(default)]
    resync:                            ResyncConfig,
}

/// Engine configuration. Percentages are held as basis points once loaded.
#[derive(Debug, Clone)]
pub struct CommissionConfig {
    pub default_employee_share: Option<Bps>,
    pub unconfigured_party:     UnconfiguredParty,
    pub tenant_employee_share:  HashMap<String, Bps>,
    pub tenant_unconfigured:    HashMap<String, UnconfiguredParty>,
    pub resync:                 ResyncConfig,
}

impl CommissionConfig {
    /// Load from the data/ directory.
    /// In tests, use CommissionConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/{CONFIG_FILE}");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Self::from_json(&content).map_err(|e| anyhow::anyhow!("Invalid {path}: {e}"))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let file: CommissionConfigFile = serde_json::from_str(content)?;

        let default_employee_share = file
            .default_employee_share_percentage
            .map(|p| checked_percent("default_employee_share_percentage", p))
            .transpose()?;

        let mut tenant_employee_share = HashMap::new();
        let mut tenant_unconfigured = HashMap::new();
        for (tenant_id, t) in file.tenants {
            if let Some(p) = t.employee_share_percentage {
                let key = format!("tenants.{tenant_id}.employee_share_percentage");
                tenant_employee_share.insert(tenant_id.clone(), checked_percent(&key, p)?);
            }
            if let Some(u) = t.unconfigured_party {
                tenant_unconfigured.insert(tenant_id, u);
            }
        }

        if file.resync.max_workers == 0 {
            anyhow::bail!("resync.max_workers must be at least 1");
        }

        Ok(Self {
            default_employee_share,
            unconfigured_party: file.unconfigured_party,
            tenant_employee_share,
            tenant_unconfigured,
            resync: file.resync,
        })
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            default_employee_share: None,
            unconfigured_party:     UnconfiguredParty::ZeroShare,
            tenant_employee_share:  HashMap::new(),
            tenant_unconfigured:    HashMap::new(),
            resync: ResyncConfig {
                max_workers:            2,
                claim_stale_after_secs: 300,
                lock_stale_after_secs:  3_600,
            },
        }
    }

    /// The share defaults a tenant's calculations run with.
    /// A tenant entry overrides the global default.
    pub fn share_defaults(&self, tenant_id: &str) -> ShareDefaults {
        ShareDefaults {
            employee_share: self
                .tenant_employee_share
                .get(tenant_id)
                .copied()
                .or(self.default_employee_share),
            unconfigured: self
                .tenant_unconfigured
                .get(tenant_id)
                .copied()
                .unwrap_or(self.unconfigured_party),
        }
    }
}

fn checked_percent(key: &str, pct: f64) -> anyhow::Result<Bps> {
    if !(0.0..=100.0).contains(&pct) {
        anyhow::bail!("{key} must be between 0 and 100 (got {pct})");
    }
    Ok(Bps::from_percent(pct))
}

use thiserror::Error;

/// Stable, machine-readable failure categories.
/// Reports and the bulk failure list key off these codes.
pub mod reason {
    pub const NO_APPLICABLE_GRID: &str      = "no_applicable_grid";
    pub const PARTY_NOT_FOUND: &str         = "party_not_found";
    pub const POLICY_NOT_FOUND: &str        = "policy_not_found";
    pub const VALIDATION: &str              = "validation";
    pub const PERSISTENCE: &str             = "persistence";
    pub const CALCULATION_IN_PROGRESS: &str = "calculation_in_progress";
    pub const RESYNC_IN_PROGRESS: &str      = "resync_in_progress";
    pub const SERIALIZATION: &str           = "serialization";
    pub const INTERNAL: &str                = "internal";
}

#[derive(Error, Debug)]
pub enum CommissionError {
    #[error("No commission grid applies to policy {policy_id} (product '{product_category}', provider '{provider}', premium {premium}, on {reference_date})")]
    NoApplicableGrid {
        policy_id:        String,
        product_category: String,
        provider:         String,
        premium:          String,
        reference_date:   String,
    },

    #[error("{kind} '{party_id}' not found for tenant '{tenant_id}'")]
    PartyNotFound {
        tenant_id: String,
        kind:      String,
        party_id:  String,
    },

    #[error("Policy '{policy_id}' not found for tenant '{tenant_id}'")]
    PolicyNotFound { tenant_id: String, policy_id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Policy '{policy_id}' is already being calculated")]
    CalculationInProgress { policy_id: String },

    #[error("A resync is already running for tenant '{tenant_id}' (run {holder})")]
    ResyncInProgress { tenant_id: String, holder: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CommissionError {
    /// The stable reason code recorded for this failure.
    pub fn reason_code(&self) -> &'static str {
        match self {
            CommissionError::NoApplicableGrid { .. }      => reason::NO_APPLICABLE_GRID,
            CommissionError::PartyNotFound { .. }         => reason::PARTY_NOT_FOUND,
            CommissionError::PolicyNotFound { .. }        => reason::POLICY_NOT_FOUND,
            CommissionError::Validation(_)                => reason::VALIDATION,
            CommissionError::Persistence(_)               => reason::PERSISTENCE,
            CommissionError::Serialization(_)             => reason::SERIALIZATION,
            CommissionError::CalculationInProgress { .. } => reason::CALCULATION_IN_PROGRESS,
            CommissionError::ResyncInProgress { .. }      => reason::RESYNC_IN_PROGRESS,
            CommissionError::Other(_)                     => reason::INTERNAL,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CommissionError::Validation(msg.into())
    }
}

pub type CommissionResult<T> = Result<T, CommissionError>;

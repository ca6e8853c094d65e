//! Audit events — every calculation outcome leaves a trail.
//!
//! RULE: the audit log is append-only.
//! Variants are added over time, never removed or reordered.

use crate::{
    money::Money,
    types::{EntityId, RunId, TenantId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommissionEvent {
    // ── Per-policy outcomes ────────────────────────
    DistributionCalculated {
        policy_id:          EntityId,
        grid_id:            EntityId,
        insurer_commission: Money,
        party_commission:   Money,
        broker_share:       Money,
        replaced_prior:     bool,
    },
    DistributionUnchanged {
        policy_id: EntityId,
        grid_id:   EntityId,
    },
    CalculationFailed {
        policy_id: EntityId,
        reason:    String,
        message:   String,
    },

    // ── Bulk resync lifecycle ──────────────────────
    ResyncStarted {
        run_id:       RunId,
        policy_count: usize,
    },
    ResyncCompleted {
        run_id:    RunId,
        succeeded: usize,
        unchanged: usize,
        failed:    usize,
    },
    ResyncCancelled {
        run_id:        RunId,
        processed:     usize,
        not_attempted: usize,
    },
}

impl CommissionEvent {
    /// Stable name for the event_type column.
    pub fn event_type(&self) -> &'static str {
        match self {
            CommissionEvent::DistributionCalculated { .. } => "distribution_calculated",
            CommissionEvent::DistributionUnchanged { .. }  => "distribution_unchanged",
            CommissionEvent::CalculationFailed { .. }      => "calculation_failed",
            CommissionEvent::ResyncStarted { .. }          => "resync_started",
            CommissionEvent::ResyncCompleted { .. }        => "resync_completed",
            CommissionEvent::ResyncCancelled { .. }        => "resync_cancelled",
        }
    }

    pub fn policy_id(&self) -> Option<&str> {
        match self {
            CommissionEvent::DistributionCalculated { policy_id, .. }
            | CommissionEvent::DistributionUnchanged { policy_id, .. }
            | CommissionEvent::CalculationFailed { policy_id, .. } => Some(policy_id),
            _ => None,
        }
    }
}

/// The audit log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id:         Option<i64>,
    pub tenant_id:  TenantId,
    pub policy_id:  Option<EntityId>,
    /// Resync run id, or the ad hoc claimant for single-policy calculations.
    pub actor:      String,
    pub event_type: String,
    pub payload:    String, // JSON-serialized CommissionEvent
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        tenant_id: &str,
        actor: &str,
        event: &CommissionEvent,
        created_at: DateTime<Utc>,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            id:         None,
            tenant_id:  tenant_id.to_string(),
            policy_id:  event.policy_id().map(str::to_string),
            actor:      actor.to_string(),
            event_type: event.event_type().to_string(),
            payload:    serde_json::to_string(event)?,
            created_at,
        })
    }

    pub fn event(&self) -> serde_json::Result<CommissionEvent> {
        serde_json::from_str(&self.payload)
    }
}

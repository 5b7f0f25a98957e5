// Error taxonomy for pipeline intents.
//
// Three non-fatal failure classes:
//   Authorization — principal lacks the capability; never retried.
//   Validation   — malformed intent; never retried.
//   Transport    — durable-store I/O failed; recoverable, the caller may
//                  retry the original intent after the forced re-sync.
//
// Bulk operations report per-item outcomes instead of escalating a single
// item's failure into a full rollback.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("not authorized: {0}")]
    Authorization(String),
    #[error("invalid intent: {0}")]
    Validation(String),
    #[error("durable store transport failure: {0}")]
    Transport(String),
}

impl PipelineError {
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Transport failures are safe to retry once the snapshot has re-synced;
    /// authorization and validation rejections are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// A single failed item within a bulk operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkFailure {
    pub lead_id: Uuid,
    pub reason: String,
}

/// Item-by-item result of a bulk operation. Succeeded items stay applied
/// even when siblings fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkOutcome {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn record_success(&mut self, lead_id: Uuid) {
        self.succeeded.push(lead_id);
    }

    pub fn record_failure(&mut self, lead_id: Uuid, reason: impl Into<String>) {
        self.failed.push(BulkFailure { lead_id, reason: reason.into() });
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

// Change-notification protocol between the durable store and the engine.
//
// Notifications are triggers, not deltas: the store promises no payload
// beyond the event kind and (when cheap to include) the affected lead id.
// Consumers re-fetch the authoritative snapshot instead of applying diffs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A change notification pushed by the durable store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A lead was inserted.
    Insert {
        #[serde(skip_serializing_if = "Option::is_none")]
        lead_id: Option<Uuid>,
    },
    /// A lead was updated.
    Update {
        #[serde(skip_serializing_if = "Option::is_none")]
        lead_id: Option<Uuid>,
    },
}

impl ChangeEvent {
    pub fn lead_id(self) -> Option<Uuid> {
        match self {
            Self::Insert { lead_id } | Self::Update { lead_id } => lead_id,
        }
    }
}

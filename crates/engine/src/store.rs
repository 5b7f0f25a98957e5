// Local snapshot of the lead set mirrored from the durable store.
//
// The store is the single owner of the in-memory lead set. It changes in
// exactly two ways: wholesale replacement after an authoritative fetch, or
// a single-lead patch from an optimistic mutation. A monotonic version
// counter lets dependents detect staleness by comparison instead of deep
// equality.

use chrono::Utc;
use leadflow_common::types::{Lead, LeadPatch};
use uuid::Uuid;

/// In-memory snapshot of all leads, in the order supplied by the source
/// (newest first).
#[derive(Debug, Default)]
pub struct LeadStore {
    leads: Vec<Lead>,
    version: u64,
}

impl LeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the entire snapshot. Callers that hit a transport
    /// failure simply never call this, so the old snapshot is retained.
    pub fn replace_all(&mut self, leads: Vec<Lead>) {
        self.leads = leads;
        self.version += 1;
    }

    /// Patch one lead in place and bump its update timestamp.
    ///
    /// Returns false without touching the snapshot when the id is absent.
    /// An absent id is a benign race with reconciliation (the lead was
    /// removed under us), not an error.
    pub fn apply_local(&mut self, lead_id: Uuid, patch: LeadPatch) -> bool {
        let Some(lead) = self.leads.iter_mut().find(|lead| lead.id == lead_id) else {
            return false;
        };

        if let Some(stage) = patch.stage {
            lead.stage = stage;
        }
        if let Some(owner) = patch.owner {
            lead.owner = owner;
        }
        // Timestamps stay monotonic even if the wall clock regressed.
        lead.updated_at = Utc::now().max(lead.created_at);

        self.version += 1;
        true
    }

    pub fn get(&self, lead_id: Uuid) -> Option<&Lead> {
        self.leads.iter().find(|lead| lead.id == lead_id)
    }

    pub fn all(&self) -> &[Lead] {
        &self.leads
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    /// Monotonic snapshot version; bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }
}

// View-mode controller: grouped vs flat projection and intent routing.
//
// Holds only ephemeral UI-facing state (current mode, selected lead ids).
// All reads derive from the store snapshot through the access predicates;
// all mutations route to the optimistic mutator. Selection never outlives a
// projection switch and drains as delegations succeed.

use std::collections::HashSet;
use std::sync::Arc;

use leadflow_common::error::{BulkOutcome, PipelineError};
use leadflow_common::types::{Lead, OwnerRef, Principal, Stage};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::access;
use crate::mutator::{MoveOutcome, OptimisticMutator};
use crate::projector::{self, StageColumn};
use crate::store::LeadStore;

/// The two interchangeable projections of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Grouped by stage (kanban columns).
    Staged,
    /// Flat filtered list.
    Flat,
}

pub struct PipelineView {
    store: Arc<Mutex<LeadStore>>,
    mutator: Arc<OptimisticMutator>,
    mode: ViewMode,
    selection: HashSet<Uuid>,
}

impl PipelineView {
    pub fn new(store: Arc<Mutex<LeadStore>>, mutator: Arc<OptimisticMutator>) -> Self {
        Self { store, mutator, mode: ViewMode::Staged, selection: HashSet::new() }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// Switch projections. Changing mode clears the selection; re-selecting
    /// the current mode keeps it.
    pub fn set_mode(&mut self, mode: ViewMode) {
        if self.mode != mode {
            self.mode = mode;
            self.selection.clear();
        }
    }

    /// Grouped projection over the leads visible to `principal`.
    pub async fn staged(&self, principal: &Principal) -> Vec<StageColumn> {
        let visible = self.visible(principal).await;
        projector::project(&visible)
    }

    /// Flat projection: visible leads in snapshot order.
    pub async fn flat(&self, principal: &Principal) -> Vec<Lead> {
        self.visible(principal).await
    }

    async fn visible(&self, principal: &Principal) -> Vec<Lead> {
        let store = self.store.lock().await;
        store.all().iter().filter(|lead| access::can_view(principal, lead)).cloned().collect()
    }

    // ── Selection ───────────────────────────────────────────────────

    /// Add a lead to the delegation selection. Refused when the lead is
    /// unknown or not visible to the principal.
    pub async fn select(&mut self, principal: &Principal, lead_id: Uuid) -> Result<(), PipelineError> {
        let store = self.store.lock().await;
        let lead = store
            .get(lead_id)
            .ok_or_else(|| PipelineError::validation(format!("unknown lead {lead_id}")))?;
        if !access::can_view(principal, lead) {
            return Err(PipelineError::authorization("lead is not visible to this principal"));
        }
        drop(store);
        self.selection.insert(lead_id);
        Ok(())
    }

    pub fn deselect(&mut self, lead_id: Uuid) {
        self.selection.remove(&lead_id);
    }

    pub fn selection(&self) -> &HashSet<Uuid> {
        &self.selection
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ── Intents ─────────────────────────────────────────────────────

    /// Route a drag-to-stage intent to the mutator.
    pub async fn move_lead(
        &self,
        principal: &Principal,
        lead_id: Uuid,
        new_stage: Stage,
    ) -> Result<MoveOutcome, PipelineError> {
        self.mutator.move_to_stage(principal, lead_id, new_stage).await
    }

    /// Delegate every selected lead to `new_owner`. Succeeded ids leave the
    /// selection; failed ids stay selected so a retry targets exactly them.
    pub async fn delegate_selected(
        &mut self,
        principal: &Principal,
        new_owner: OwnerRef,
    ) -> Result<BulkOutcome, PipelineError> {
        let mut lead_ids: Vec<Uuid> = self.selection.iter().copied().collect();
        lead_ids.sort();

        let outcome = self.mutator.bulk_delegate(principal, &lead_ids, new_owner).await?;
        for id in &outcome.succeeded {
            self.selection.remove(id);
        }
        Ok(outcome)
    }
}

// Optimistic mutation protocol.
//
// Every intent-driven write flows through a pending-mutation state machine:
//   issued → committed    (durable write acknowledged)
//   issued → rolled_back  (write failed or timed out)
//
// The local snapshot is patched immediately so the projector reflects the
// intent without waiting on the network. Rollback does NOT simply restore
// the recorded prior value: the snapshot may have absorbed an independent
// reconciliation in the interim, so the prior value could itself be stale.
// A full authoritative re-fetch is the safety net; the recorded prior value
// is only the fallback when that re-fetch also fails.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use leadflow_common::error::{BulkOutcome, PipelineError};
use leadflow_common::types::{LeadPatch, OwnerRef, Principal, Stage};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::access::{self, Directory};
use crate::backend::LeadBackend;
use crate::store::LeadStore;

/// Lifecycle of one in-flight optimistic change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Issued,
    Committed,
    RolledBack,
}

/// An in-flight optimistic change, keyed by correlation token. Destroyed
/// when the durable write resolves either way.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub token: Uuid,
    pub lead_id: Uuid,
    /// Field values as they were at issue time, for fallback rollback.
    pub prior: LeadPatch,
    pub state: MutationState,
}

/// Result of a stage-move intent that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    /// Dropped onto its own column: accepted silently, no write issued.
    Noop,
}

pub struct OptimisticMutator {
    store: Arc<Mutex<LeadStore>>,
    backend: Arc<dyn LeadBackend>,
    directory: Arc<StdMutex<Directory>>,
    write_timeout: Duration,
    pending: StdMutex<HashMap<Uuid, PendingMutation>>,
}

impl OptimisticMutator {
    pub fn new(
        store: Arc<Mutex<LeadStore>>,
        backend: Arc<dyn LeadBackend>,
        directory: Arc<StdMutex<Directory>>,
        write_timeout: Duration,
    ) -> Self {
        Self { store, backend, directory, write_timeout, pending: StdMutex::new(HashMap::new()) }
    }

    /// Move a lead to another pipeline stage.
    ///
    /// Authorization is checked before the same-stage short circuit, so an
    /// unauthorized principal is always rejected even for a would-be no-op.
    pub async fn move_to_stage(
        &self,
        principal: &Principal,
        lead_id: Uuid,
        new_stage: Stage,
    ) -> Result<MoveOutcome, PipelineError> {
        if !access::can_mutate_stage(principal) {
            return Err(PipelineError::authorization(
                "only an owner-admin may move leads between stages",
            ));
        }

        let prior_stage = {
            let store = self.store.lock().await;
            match store.get(lead_id) {
                Some(lead) => lead.stage,
                None => {
                    return Err(PipelineError::validation(format!(
                        "unknown lead {lead_id} in stage-move intent"
                    )))
                }
            }
        };

        if prior_stage == new_stage {
            // Drag-and-drop cancellation: accepted silently, no write.
            return Ok(MoveOutcome::Noop);
        }

        let token =
            self.issue(lead_id, LeadPatch::stage(new_stage), LeadPatch::stage(prior_stage)).await;

        match self.write_through(lead_id, LeadPatch::stage(new_stage)).await {
            Ok(()) => {
                self.resolve(token, MutationState::Committed);
                Ok(MoveOutcome::Moved)
            }
            Err(error) => {
                self.rollback_and_resync(token).await;
                Err(error)
            }
        }
    }

    /// Reassign ownership of a set of leads to one delegate.
    ///
    /// Failures are independent per lead: succeeded items stay applied and
    /// the outcome reports both sides. Any failure triggers one forced
    /// authoritative re-fetch at the end.
    pub async fn bulk_delegate(
        &self,
        principal: &Principal,
        lead_ids: &[Uuid],
        new_owner: OwnerRef,
    ) -> Result<BulkOutcome, PipelineError> {
        if !access::can_bulk_delegate(principal) {
            return Err(PipelineError::authorization(
                "only an owner-admin may delegate lead ownership in bulk",
            ));
        }
        if lead_ids.is_empty() {
            return Err(PipelineError::validation("no leads selected for delegation"));
        }
        let OwnerRef::Assigned(owner_id) = new_owner else {
            return Err(PipelineError::validation("cannot delegate to the unassigned sentinel"));
        };
        {
            let directory = self.directory.lock().expect("directory lock poisoned");
            let eligible = directory.eligible_delegates(principal);
            if !eligible.iter().any(|p| p.id == owner_id) {
                return Err(PipelineError::validation(format!(
                    "principal {owner_id} is not an eligible delegate"
                )));
            }
        }

        let mut outcome = BulkOutcome::default();
        let mut any_failed = false;

        for &lead_id in lead_ids {
            let prior_owner = {
                let store = self.store.lock().await;
                match store.get(lead_id) {
                    Some(lead) => lead.owner,
                    None => {
                        outcome.record_failure(lead_id, "unknown lead");
                        any_failed = true;
                        continue;
                    }
                }
            };

            let token =
                self.issue(lead_id, LeadPatch::owner(new_owner), LeadPatch::owner(prior_owner)).await;

            match self.write_through(lead_id, LeadPatch::owner(new_owner)).await {
                Ok(()) => {
                    self.resolve(token, MutationState::Committed);
                    outcome.record_success(lead_id);
                }
                Err(error) => {
                    // Restore this lead locally; the shared re-fetch below
                    // re-syncs everything authoritatively.
                    if let Some(pending) = self.resolve(token, MutationState::RolledBack) {
                        self.store.lock().await.apply_local(pending.lead_id, pending.prior);
                    }
                    outcome.record_failure(lead_id, error.to_string());
                    any_failed = true;
                }
            }
        }

        if any_failed {
            self.resync().await;
        }

        Ok(outcome)
    }

    /// Number of unresolved pending mutations.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending lock poisoned").len()
    }

    /// Apply the patch locally and register the pending mutation.
    async fn issue(&self, lead_id: Uuid, patch: LeadPatch, prior: LeadPatch) -> Uuid {
        let token = Uuid::new_v4();
        self.store.lock().await.apply_local(lead_id, patch);
        self.pending.lock().expect("pending lock poisoned").insert(
            token,
            PendingMutation { token, lead_id, prior, state: MutationState::Issued },
        );
        debug!(%token, %lead_id, "optimistic mutation issued");
        token
    }

    /// Issue the durable write with a bounded wait; failure to acknowledge
    /// within the timeout counts as failure.
    async fn write_through(&self, lead_id: Uuid, patch: LeadPatch) -> Result<(), PipelineError> {
        match tokio::time::timeout(self.write_timeout, self.backend.update(lead_id, patch)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(error),
            Err(_elapsed) => {
                Err(PipelineError::transport("durable write was not acknowledged in time"))
            }
        }
    }

    /// Transition a pending mutation to its terminal state and destroy it.
    fn resolve(&self, token: Uuid, state: MutationState) -> Option<PendingMutation> {
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        let mut mutation = pending.remove(&token)?;
        mutation.state = state;
        debug!(%token, ?state, "pending mutation resolved");
        Some(mutation)
    }

    /// Roll back one mutation: authoritative re-fetch first, local restore
    /// of the recorded prior value only if the re-fetch fails.
    async fn rollback_and_resync(&self, token: Uuid) {
        let rolled_back = self.resolve(token, MutationState::RolledBack);
        match self.backend.fetch_all().await {
            Ok(leads) => self.store.lock().await.replace_all(leads),
            Err(error) => {
                warn!(%error, "post-rollback re-fetch failed, restoring prior value locally");
                if let Some(pending) = rolled_back {
                    self.store.lock().await.apply_local(pending.lead_id, pending.prior);
                }
            }
        }
    }

    /// Forced authoritative re-fetch; on failure the snapshot is retained
    /// (per-item local restores have already run).
    async fn resync(&self) {
        match self.backend.fetch_all().await {
            Ok(leads) => self.store.lock().await.replace_all(leads),
            Err(error) => warn!(%error, "forced re-fetch failed, snapshot retained"),
        }
    }
}

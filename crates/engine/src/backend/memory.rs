// In-memory durable store, used in standalone mode and tests.
//
// Behaves like the real collaborator at the trait boundary: writes are
// acknowledged, subscribers get change notifications without payloads, and
// failure injection lets tests exercise the transport-error paths (per-lead
// update failures, counted fetch failures, and updates that never resolve).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;

use crate::backend::LeadBackend;
use chrono::Utc;
use leadflow_common::error::PipelineError;
use leadflow_common::protocol::ChangeEvent;
use leadflow_common::types::{Lead, LeadPatch};
use tokio::sync::mpsc;
use uuid::Uuid;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 32;

#[derive(Default)]
struct FailureInjection {
    /// Lead ids whose `update` calls fail with a transport error.
    failing_updates: HashSet<Uuid>,
    /// Lead ids whose `update` calls never resolve (exercise timeouts).
    hanging_updates: HashSet<Uuid>,
}

#[derive(Default)]
pub struct InMemoryBackend {
    leads: StdMutex<HashMap<Uuid, Lead>>,
    subscribers: StdMutex<Vec<mpsc::Sender<ChangeEvent>>>,
    injection: StdMutex<FailureInjection>,
    /// Number of upcoming `fetch_all` calls that fail.
    failing_fetches: AtomicUsize,
    /// Number of upcoming `insert` calls that fail.
    failing_inserts: AtomicUsize,
    fetch_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store without emitting change notifications.
    pub fn seed(&self, leads: impl IntoIterator<Item = Lead>) {
        let mut guard = self.leads.lock().expect("backend lead lock poisoned");
        for lead in leads {
            guard.insert(lead.id, lead);
        }
    }

    /// Make every `update` for `lead_id` fail until cleared.
    pub fn fail_updates_for(&self, lead_id: Uuid) {
        self.injection.lock().expect("injection lock poisoned").failing_updates.insert(lead_id);
    }

    /// Make every `update` for `lead_id` hang forever.
    pub fn hang_updates_for(&self, lead_id: Uuid) {
        self.injection.lock().expect("injection lock poisoned").hanging_updates.insert(lead_id);
    }

    /// Make the next `count` calls to `fetch_all` fail.
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` calls to `insert` fail.
    pub fn fail_next_inserts(&self, count: usize) {
        self.failing_inserts.store(count, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Mutate the store out-of-band, as another user's session would, and
    /// notify subscribers.
    pub fn apply_external_update(&self, lead_id: Uuid, patch: LeadPatch) -> bool {
        let applied = {
            let mut guard = self.leads.lock().expect("backend lead lock poisoned");
            match guard.get_mut(&lead_id) {
                Some(lead) => {
                    apply_patch(lead, patch);
                    true
                }
                None => false,
            }
        };
        if applied {
            self.notify(ChangeEvent::Update { lead_id: Some(lead_id) });
        }
        applied
    }

    fn notify(&self, event: ChangeEvent) {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        // Drop subscribers whose receivers are gone; skip ones with full
        // buffers (they will re-fetch on the next event anyway).
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            let _ = tx.try_send(event);
        }
    }
}

fn apply_patch(lead: &mut Lead, patch: LeadPatch) {
    if let Some(stage) = patch.stage {
        lead.stage = stage;
    }
    if let Some(owner) = patch.owner {
        lead.owner = owner;
    }
    lead.updated_at = Utc::now().max(lead.created_at);
}

#[async_trait]
impl LeadBackend for InMemoryBackend {
    async fn fetch_all(&self) -> Result<Vec<Lead>, PipelineError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failing_fetches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_fetches.store(remaining - 1, Ordering::SeqCst);
            return Err(PipelineError::transport("injected fetch failure"));
        }

        let guard = self.leads.lock().expect("backend lead lock poisoned");
        let mut leads: Vec<Lead> = guard.values().cloned().collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(leads)
    }

    async fn update(&self, lead_id: Uuid, patch: LeadPatch) -> Result<(), PipelineError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        let hanging = {
            let injection = self.injection.lock().expect("injection lock poisoned");
            if injection.failing_updates.contains(&lead_id) {
                return Err(PipelineError::transport("injected update failure"));
            }
            injection.hanging_updates.contains(&lead_id)
        };
        if hanging {
            std::future::pending::<()>().await;
        }

        {
            let mut guard = self.leads.lock().expect("backend lead lock poisoned");
            let lead = guard.get_mut(&lead_id).ok_or_else(|| {
                PipelineError::transport(format!("lead {lead_id} not found in durable store"))
            })?;
            apply_patch(lead, patch);
        }

        self.notify(ChangeEvent::Update { lead_id: Some(lead_id) });
        Ok(())
    }

    async fn insert(&self, lead: Lead) -> Result<(), PipelineError> {
        let remaining = self.failing_inserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_inserts.store(remaining - 1, Ordering::SeqCst);
            return Err(PipelineError::transport("injected insert failure"));
        }

        let lead_id = lead.id;
        {
            let mut guard = self.leads.lock().expect("backend lead lock poisoned");
            if guard.contains_key(&lead_id) {
                return Err(PipelineError::transport(format!(
                    "lead {lead_id} already exists in durable store"
                )));
            }
            guard.insert(lead_id, lead);
        }

        self.notify(ChangeEvent::Insert { lead_id: Some(lead_id) });
        Ok(())
    }

    fn subscribe(&self) -> mpsc::Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers.lock().expect("subscriber lock poisoned").push(tx);
        rx
    }
}

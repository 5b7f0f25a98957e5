// Durable store collaborator boundary.
//
// The engine never talks to the backing store's query language directly;
// everything flows through this trait. Change notifications carry no delta
// payload — the engine re-fetches on notify.

use async_trait::async_trait;
use leadflow_common::error::PipelineError;
use leadflow_common::protocol::ChangeEvent;
use leadflow_common::types::{Lead, LeadPatch};
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod memory;

#[async_trait]
pub trait LeadBackend: Send + Sync {
    /// Authoritative snapshot, newest-first by creation time.
    async fn fetch_all(&self) -> Result<Vec<Lead>, PipelineError>;

    /// Durable write of a single-lead patch. The write is acknowledged or
    /// fails; there is no partial application within one patch.
    async fn update(&self, lead_id: Uuid, patch: LeadPatch) -> Result<(), PipelineError>;

    /// Durable insert of a new lead.
    async fn insert(&self, lead: Lead) -> Result<(), PipelineError>;

    /// Subscribe to change notifications. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> mpsc::Receiver<ChangeEvent>;
}

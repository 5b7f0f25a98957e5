// Engine runtime: wiring and lifecycle.
//
// Start fetches the initial authoritative snapshot, subscribes to change
// notifications, and spawns the reconciliation loop. The handle shuts the
// loop down via a broadcast channel, and does so implicitly on drop.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use crate::access::Directory;
use crate::backend::LeadBackend;
use crate::config::EngineConfig;
use crate::mutator::OptimisticMutator;
use crate::reconciler::run_reconciler;
use crate::store::LeadStore;
use crate::view::PipelineView;

pub struct EngineRuntime {
    store: Arc<Mutex<LeadStore>>,
    mutator: Arc<OptimisticMutator>,
    shutdown_tx: broadcast::Sender<()>,
    reconciler: Option<JoinHandle<()>>,
}

impl EngineRuntime {
    pub async fn start(
        backend: Arc<dyn LeadBackend>,
        directory: Arc<StdMutex<Directory>>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let snapshot = backend.fetch_all().await.context("initial snapshot fetch failed")?;
        let store = Arc::new(Mutex::new(LeadStore::new()));
        store.lock().await.replace_all(snapshot);

        // Subscribe before handing out the mutator so no notification gap
        // exists between the initial fetch and the reconciler loop.
        let events = backend.subscribe();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
        let reconciler = tokio::spawn(run_reconciler(
            events,
            store.clone(),
            backend.clone(),
            config.reconciler_config(),
            shutdown_rx,
        ));

        let mutator = Arc::new(OptimisticMutator::new(
            store.clone(),
            backend,
            directory,
            config.write_timeout(),
        ));

        info!(leads = store.lock().await.len(), "engine runtime started");
        Ok(Self { store, mutator, shutdown_tx, reconciler: Some(reconciler) })
    }

    pub fn store(&self) -> Arc<Mutex<LeadStore>> {
        self.store.clone()
    }

    pub fn mutator(&self) -> Arc<OptimisticMutator> {
        self.mutator.clone()
    }

    /// A fresh view controller over this runtime's snapshot.
    pub fn view(&self) -> PipelineView {
        PipelineView::new(self.store.clone(), self.mutator.clone())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub async fn wait(mut self) {
        self.shutdown();
        if let Some(task) = self.reconciler.take() {
            let _ = task.await;
        }
    }
}

impl Drop for EngineRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// leadflowd: standalone mode entry point.
//
// Runs the sync engine against an in-memory durable store and serves the
// lead ingestion endpoint until interrupted.

use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Context;
use tracing::info;

use leadflow_engine::access::Directory;
use leadflow_engine::backend::memory::InMemoryBackend;
use leadflow_engine::backend::LeadBackend;
use leadflow_engine::config::EngineConfig;
use leadflow_engine::ingest::{router, IngestState};
use leadflow_engine::runtime::EngineRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("starting standalone leadflow engine");
    let config = EngineConfig::load();
    let backend: Arc<dyn LeadBackend> = Arc::new(InMemoryBackend::new());
    let directory = Arc::new(StdMutex::new(Directory::new()));

    let runtime = EngineRuntime::start(backend.clone(), directory, &config)
        .await
        .context("engine runtime failed to start")?;

    let listener = tokio::net::TcpListener::bind(&config.ingest_addr)
        .await
        .with_context(|| format!("failed to bind ingest endpoint on {}", config.ingest_addr))?;
    info!(addr = %config.ingest_addr, "lead ingestion endpoint listening");

    let app = router(IngestState { backend });
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("ingest server terminated unexpectedly")?;

    runtime.wait().await;
    info!("leadflow engine stopped");
    Ok(())
}

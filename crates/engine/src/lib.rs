// leadflow-engine: pipeline synchronization engine and ingestion endpoint.

pub mod access;
pub mod backend;
pub mod config;
pub mod ingest;
pub mod mutator;
pub mod projector;
pub mod reconciler;
pub mod runtime;
pub mod store;
pub mod view;

// leadflow-common: shared types and protocol for the Leadflow workspace

pub mod error;
pub mod protocol;
pub mod types;

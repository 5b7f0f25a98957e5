// Inbound lead ingestion endpoint.
//
// Webhook-style producer into the durable store, not part of the sync core:
// external sources POST lead captures here, the store's change notification
// brings them into the engine snapshot like any other remote edit.
//
//   POST /leads   — create a lead (stage forced to `new`)
//   GET  /healthz — liveness probe

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use leadflow_common::error::PipelineError;
use leadflow_common::types::{Lead, OwnerRef, Stage};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::LeadBackend;

#[derive(Clone)]
pub struct IngestState {
    pub backend: Arc<dyn LeadBackend>,
}

pub fn router(state: IngestState) -> Router {
    Router::new()
        .route("/leads", post(create_lead))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Incoming lead capture. Everything is optional at the wire level so
/// missing required fields can be reported together in one response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadIntake {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub company: Option<String>,
    pub value: Option<Decimal>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub assigned_owner: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct IntakeAccepted {
    pub id: Uuid,
}

#[derive(Debug)]
pub enum IngestError {
    MissingFields(Vec<&'static str>),
    NegativeValue,
    Store(PipelineError),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::MissingFields(fields) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": {
                        "code": "VALIDATION_FAILED",
                        "message": "missing required fields",
                        "missing_fields": fields,
                    }
                }),
            ),
            Self::NegativeValue => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": {
                        "code": "VALIDATION_FAILED",
                        "message": "value must be non-negative",
                    }
                }),
            ),
            Self::Store(error) => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": {
                        "code": "STORE_UNAVAILABLE",
                        "message": error.to_string(),
                    }
                }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn create_lead(
    State(state): State<IngestState>,
    Json(intake): Json<LeadIntake>,
) -> Result<(StatusCode, Json<IntakeAccepted>), IngestError> {
    let mut missing = Vec::new();
    let name = required_field(&intake.name, "name", &mut missing);
    let source = required_field(&intake.source, "source", &mut missing);
    if !missing.is_empty() {
        return Err(IngestError::MissingFields(missing));
    }

    let value = intake.value.unwrap_or(Decimal::ZERO);
    if value < Decimal::ZERO {
        return Err(IngestError::NegativeValue);
    }

    let now = Utc::now();
    let lead = Lead {
        id: Uuid::new_v4(),
        name,
        email: intake.email.unwrap_or_default(),
        phone: intake.phone.unwrap_or_default(),
        company: intake.company.unwrap_or_default(),
        value,
        stage: Stage::New,
        tags: dedup_tags(intake.tags.unwrap_or_default()),
        source,
        owner: intake.assigned_owner.map_or(OwnerRef::Unassigned, OwnerRef::Assigned),
        notes: intake.notes.unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };

    let id = lead.id;
    if let Err(error) = state.backend.insert(lead).await {
        warn!(%error, "lead ingestion write failed");
        return Err(IngestError::Store(error));
    }

    info!(%id, "lead ingested");
    Ok((StatusCode::CREATED, Json(IntakeAccepted { id })))
}

/// Trimmed field value, recording the name in `missing` when absent/blank.
fn required_field(
    value: &Option<String>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> String {
    match value.as_deref().map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => {
            missing.push(name);
            String::new()
        }
    }
}

/// Drop duplicate tags, keeping first occurrence order.
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter().filter(|tag| seen.insert(tag.clone())).collect()
}

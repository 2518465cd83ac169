//! REST API endpoint handlers.
//!
//! Handlers parse the path and body, call one engine operation, and shape
//! the result as JSON. Every failure goes through [`ApiError`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness check |
//! | `POST` | `/api/entities` | Register an owning entity |
//! | `DELETE` | `/api/entities/{id}` | Remove an entity and its pet |
//! | `POST` | `/api/pets/{id}/hatch` | Hatch a pet |
//! | `GET` | `/api/pets/{id}` | Full pet record |
//! | `PATCH` | `/api/pets/{id}/customization` | Partial customization |
//! | `POST` | `/api/pets/{id}/happiness` | Rescore from relationship stats |
//! | `POST` | `/api/pets/{id}/tokens` | Signed token award |
//! | `GET` | `/api/pets/{id}/tokens/awards` | Award log with audit result |
//! | `POST` | `/api/pets/{id}/generation` | Start a media job |
//! | `GET` | `/api/pets/{id}/generation/status` | Job status and ETA |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use companion_core::poller::view;
use companion_types::{
    CustomizationPatch, EntityId, GenerationPreset, HatchOptions, RelationshipStats,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Request body for `POST /api/entities`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct RegisterRequest {
    /// Caller-chosen id; a fresh one is generated when absent.
    #[serde(default)]
    pub entity_id: Option<EntityId>,
}

/// Request body for `POST /api/pets/{id}/hatch`.
#[derive(Debug, serde::Deserialize)]
pub struct HatchRequest {
    /// Current relationship signals.
    pub stats: RelationshipStats,
    /// Initial look; every field optional.
    #[serde(default)]
    pub options: HatchOptions,
}

/// Request body for `POST /api/pets/{id}/tokens`.
#[derive(Debug, serde::Deserialize)]
pub struct AwardRequest {
    /// Signed token delta.
    pub delta: i64,
    /// Attribution; must not be blank.
    pub reason: String,
}

/// Request body for `POST /api/pets/{id}/generation`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct GenerationRequest {
    /// Which variants to produce (default: all).
    #[serde(default)]
    pub preset: GenerationPreset,
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness check.
#[allow(clippy::unused_async)]
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Register an entity with no pet.
pub async fn register_entity(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = body.entity_id.unwrap_or_default();
    let record = state.manager.register_entity(entity_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Remove an entity, its pet, and its award log.
pub async fn remove_entity(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id_str)?;
    state.manager.remove_entity(entity_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Pets
// ---------------------------------------------------------------------------

/// Hatch a pet.
pub async fn hatch(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(body): Json<HatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id_str)?;
    let pet = state
        .manager
        .hatch(entity_id, &body.options, &body.stats)
        .await?;
    Ok((StatusCode::CREATED, Json(pet)))
}

/// Return the full pet record.
pub async fn get_pet(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id_str)?;
    let pet = state.manager.get_pet(entity_id).await?;
    Ok(Json(pet))
}

/// Apply a partial customization.
pub async fn customize(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(patch): Json<CustomizationPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id_str)?;
    let pet = state.manager.customize(entity_id, &patch).await?;
    Ok(Json(pet))
}

/// Rescore happiness from fresh stats.
pub async fn update_happiness(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(stats): Json<RelationshipStats>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id_str)?;
    let report = state.manager.update_happiness(entity_id, &stats).await?;

    Ok(Json(serde_json::json!({
        "happiness": report.pet.happiness,
        "previous_happiness": report.previous_happiness,
        "level": report.pet.level,
        "leveled_up": report.level_change.leveled_up(),
        "tokens_awarded": report.level_change.bonus,
        "pet": report.pet,
    })))
}

/// Apply a signed token award.
pub async fn award_tokens(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(body): Json<AwardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id_str)?;
    let report = state
        .manager
        .award_tokens(entity_id, body.delta, &body.reason)
        .await?;
    let outcome = &report.outcome;

    Ok(Json(serde_json::json!({
        "requested_delta": outcome.requested_delta,
        "applied_delta": outcome.applied_delta,
        "new_tokens": outcome.new_tokens,
        "level": outcome.level_change.level,
        "leveled_up": outcome.level_change.leveled_up(),
        "bonus": outcome.level_change.bonus,
        "entries": report.entries,
    })))
}

/// Return the award log and whether it reconciles with the balance.
pub async fn list_awards(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id_str)?;
    let awards = state.manager.awards(entity_id).await?;
    let check = state.manager.audit(entity_id).await?;
    let drift = match &check {
        companion_ledger::BalanceCheck::Balanced => None,
        companion_ledger::BalanceCheck::Drift(d) => Some(d.message.clone()),
    };

    Ok(Json(serde_json::json!({
        "entity_id": entity_id,
        "count": awards.len(),
        "balanced": check.is_balanced(),
        "drift": drift,
        "awards": awards,
    })))
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Start a media generation job.
pub async fn start_generation(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(body): Json<GenerationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id_str)?;
    let generation = state
        .orchestrator
        .start_generation(entity_id, body.preset)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(view(&generation))))
}

/// Current generation status with an ETA bucket.
pub async fn generation_status(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id_str)?;
    let status = state.poller.get_status(entity_id).await?;
    Ok(Json(status))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an entity id from a path segment.
fn parse_entity(s: &str) -> Result<EntityId, ApiError> {
    s.parse::<Uuid>()
        .map(EntityId::from)
        .map_err(|e| ApiError::InvalidUuid(format!("{s}: {e}")))
}

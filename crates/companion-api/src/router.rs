//! Axum router construction for the HTTP API.
//!
//! Assembles every route into a single [`Router`] with CORS and request
//! tracing enabled.

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /health` -- liveness check
/// - `POST /api/entities`, `DELETE /api/entities/{id}` -- entity container
/// - `POST /api/pets/{id}/hatch`, `GET /api/pets/{id}` -- pet record
/// - `PATCH /api/pets/{id}/customization` -- look
/// - `POST /api/pets/{id}/happiness` -- rescore
/// - `POST /api/pets/{id}/tokens`, `GET /api/pets/{id}/tokens/awards` --
///   token economy
/// - `POST /api/pets/{id}/generation`,
///   `GET /api/pets/{id}/generation/status` -- media jobs
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // Entities
        .route("/api/entities", post(handlers::register_entity))
        .route("/api/entities/{id}", delete(handlers::remove_entity))
        // Pets
        .route("/api/pets/{id}", get(handlers::get_pet))
        .route("/api/pets/{id}/hatch", post(handlers::hatch))
        .route("/api/pets/{id}/customization", patch(handlers::customize))
        .route("/api/pets/{id}/happiness", post(handlers::update_happiness))
        // Tokens
        .route("/api/pets/{id}/tokens", post(handlers::award_tokens))
        .route("/api/pets/{id}/tokens/awards", get(handlers::list_awards))
        // Generation
        .route("/api/pets/{id}/generation", post(handlers::start_generation))
        .route(
            "/api/pets/{id}/generation/status",
            get(handlers::generation_status),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Integration tests for the HTTP API.
//!
//! Tests drive the Axum `Router` directly via `tower::ServiceExt` without
//! starting a TCP server, over an in-memory store and a vendor that
//! finishes every job on the first poll.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use companion_api::router::build_router;
use companion_api::state::AppState;
use companion_core::config::GenerationConfig;
use companion_core::vendor::{
    MediaRequest, MediaVendor, VendorError, VendorJobId, VendorJobState, VendorPoll,
};
use companion_core::{Orchestrator, PetManager, PromptEngine, StatusPoller};
use companion_db::MemoryStore;
use companion_pets::{EconomyConfig, ScoringConfig};
use companion_types::{EntityId, GenerationStatus};
use serde_json::{Value, json};
use tower::ServiceExt;

struct InstantVendor;

#[async_trait::async_trait]
impl MediaVendor for InstantVendor {
    fn name(&self) -> &str {
        "instant"
    }

    async fn submit(&self, request: &MediaRequest) -> Result<VendorJobId, VendorError> {
        Ok(VendorJobId(request.variant.key()))
    }

    async fn poll(&self, job: &VendorJobId) -> Result<VendorPoll, VendorError> {
        Ok(VendorPoll {
            state: VendorJobState::Succeeded,
            output_url: Some(format!("https://cdn.test/{job}")),
            error: None,
        })
    }
}

fn make_test_state() -> Arc<AppState> {
    let manager = Arc::new(PetManager::new(
        Arc::new(MemoryStore::new()),
        ScoringConfig::default(),
        EconomyConfig::default(),
        8,
    ));
    let timing = GenerationConfig {
        poll_interval_ms: 10,
        max_poll_interval_ms: 20,
        ..GenerationConfig::default()
    };
    let orchestrator = Orchestrator::new(
        Arc::clone(&manager),
        Arc::new(InstantVendor),
        Arc::new(PromptEngine::new().unwrap()),
        timing.clone(),
    );
    let poller = StatusPoller::new(Arc::clone(&manager), timing);
    Arc::new(AppState::new(manager, orchestrator, poller))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_router(Arc::clone(state)).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn register(state: &Arc<AppState>) -> EntityId {
    let id = EntityId::new();
    let (status, _) = send(
        state,
        json_request("POST", "/api/entities", &json!({ "entity_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    id
}

async fn hatch(state: &Arc<AppState>, id: EntityId) -> Value {
    let body = json!({
        "stats": { "connection": 80, "reliability": 70, "communication": 90, "energy": 60 },
        "options": { "pet_type": "fox", "pet_name": "Ember" }
    });
    let (status, pet) = send(state, json_request("POST", &format!("/api/pets/{id}/hatch"), &body)).await;
    assert_eq!(status, StatusCode::CREATED);
    pet
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health() {
    let state = make_test_state();
    let response = build_router(state)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_hatch_and_get() {
    let state = make_test_state();
    let id = register(&state).await;
    let pet = hatch(&state, id).await;

    assert_eq!(pet["happiness"], 75);
    assert_eq!(pet["level"], 1);
    assert_eq!(pet["pet_type"], "fox");
    assert_eq!(pet["evolution_tokens"], 0);

    let (status, fetched) = send(
        &state,
        Request::get(format!("/api/pets/{id}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["pet_name"], "Ember");
}

#[tokio::test]
async fn test_hatch_twice_conflicts() {
    let state = make_test_state();
    let id = register(&state).await;
    hatch(&state, id).await;

    let body = json!({ "stats": { "connection": 1, "reliability": 1, "communication": 1, "energy": 1 } });
    let (status, err) = send(&state, json_request("POST", &format!("/api/pets/{id}/hatch"), &body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["kind"], "invalid_state");
    assert_eq!(err["status"], 409);
}

#[tokio::test]
async fn test_unknown_entity_is_404() {
    let state = make_test_state();
    let (status, err) = send(
        &state,
        Request::get(format!("/api/pets/{}", EntityId::new()))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["kind"], "not_found");
}

#[tokio::test]
async fn test_invalid_uuid_is_422() {
    let state = make_test_state();
    let (status, err) = send(
        &state,
        Request::get("/api/pets/not-a-uuid").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["kind"], "invalid");
}

#[tokio::test]
async fn test_out_of_range_stats_rejected() {
    let state = make_test_state();
    let id = register(&state).await;
    let body = json!({ "stats": { "connection": 101, "reliability": 0, "communication": 0, "energy": 0 } });
    let (status, err) = send(&state, json_request("POST", &format!("/api/pets/{id}/hatch"), &body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["kind"], "invalid");
}

#[tokio::test]
async fn test_customize_and_locks() {
    let state = make_test_state();
    let id = register(&state).await;
    hatch(&state, id).await;
    let uri = format!("/api/pets/{id}/customization");

    let (status, pet) = send(&state, json_request("PATCH", &uri, &json!({ "color": "teal" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pet["color"], "teal");
    assert_eq!(pet["pet_name"], "Ember");

    let (status, err) = send(&state, json_request("PATCH", &uri, &json!({ "accessory": "scarf" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["kind"], "invalid_state");
}

#[tokio::test]
async fn test_token_awards_and_audit() {
    let state = make_test_state();
    let id = register(&state).await;
    hatch(&state, id).await;
    let uri = format!("/api/pets/{id}/tokens");

    let (status, award) = send(&state, json_request("POST", &uri, &json!({ "delta": 120, "reason": "streak" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(award["applied_delta"], 120);
    assert_eq!(award["leveled_up"], true);
    assert_eq!(award["level"], 2);
    assert_eq!(award["new_tokens"], 130);

    let (status, zero) = send(&state, json_request("POST", &uri, &json!({ "delta": 0, "reason": "noop" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(zero["new_tokens"], 130);

    let (status, blank) = send(&state, json_request("POST", &uri, &json!({ "delta": 5, "reason": " " }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(blank["kind"], "invalid");

    let (status, log) = send(
        &state,
        Request::get(format!("/api/pets/{id}/tokens/awards"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(log["count"], 3);
    assert_eq!(log["balanced"], true);
}

#[tokio::test]
async fn test_happiness_update() {
    let state = make_test_state();
    let id = register(&state).await;
    hatch(&state, id).await;

    let stats = json!({ "connection": 100, "reliability": 100, "communication": 100, "energy": 100 });
    let (status, body) = send(&state, json_request("POST", &format!("/api/pets/{id}/happiness"), &stats)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["happiness"], 100);
    assert_eq!(body["previous_happiness"], 75);
    assert_eq!(body["leveled_up"], false);
}

#[tokio::test]
async fn test_generation_round_trip() {
    let state = make_test_state();
    let id = register(&state).await;
    hatch(&state, id).await;

    let (status, started) = send(
        &state,
        json_request("POST", &format!("/api/pets/{id}/generation"), &json!({ "preset": "images" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(started["status"], "pending");
    assert_eq!(started["requested"].as_array().map(Vec::len), Some(4));

    let view = state
        .poller
        .wait_for_terminal(id, Duration::from_millis(10), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(view.status, GenerationStatus::Completed);

    let (status, body) = send(
        &state,
        Request::get(format!("/api/pets/{id}/generation/status"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert!(body["estimated_time_remaining"].is_null());

    let (_, pet) = send(
        &state,
        Request::get(format!("/api/pets/{id}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(pet["media"]["happy_image_url"], "https://cdn.test/happy_image");
}

#[tokio::test]
async fn test_remove_entity() {
    let state = make_test_state();
    let id = register(&state).await;

    let delete = Request::delete(format!("/api/entities/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&state, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let again = Request::delete(format!("/api/entities/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&state, again).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

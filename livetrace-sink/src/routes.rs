use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::SinkState;

const REQUIRED_FIELDS: [&str; 7] = [
    "kind",
    "id",
    "timestamp",
    "client",
    "location",
    "probeId",
    "payload",
];

pub fn router(state: Arc<SinkState>) -> Router {
    Router::new()
        .route("/api/events", post(accept_event))
        .route("/events", get(list_events).delete(clear_events))
        .route("/health", get(health))
        .with_state(state)
}

fn validate(event: &Value) -> Result<(), String> {
    let Some(obj) = event.as_object() else {
        return Err("event must be a JSON object".to_owned());
    };
    for field in REQUIRED_FIELDS {
        if !obj.contains_key(field) {
            return Err(format!("missing required field: {field}"));
        }
    }
    Ok(())
}

async fn accept_event(State(state): State<Arc<SinkState>>, Json(event): Json<Value>) -> Response {
    match validate(&event) {
        Ok(()) => {
            tracing::info!(
                kind = event["kind"].as_str().unwrap_or("?"),
                probe_id = event["probeId"].as_str().unwrap_or("?"),
                "event accepted"
            );
            state.push(event);
            Json(json!({ "ok": true })).into_response()
        }
        Err(reason) => {
            tracing::warn!(%reason, "event rejected");
            state.reject();
            (StatusCode::BAD_REQUEST, Json(json!({ "error": reason }))).into_response()
        }
    }
}

async fn list_events(State(state): State<Arc<SinkState>>) -> Json<Value> {
    let events = state.events();
    Json(json!({ "events": events, "total": events.len() }))
}

async fn clear_events(State(state): State<Arc<SinkState>>) -> StatusCode {
    state.clear();
    StatusCode::NO_CONTENT
}

async fn health(State(state): State<Arc<SinkState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "accepted": state.accepted(),
        "rejected": state.rejected(),
    }))
}

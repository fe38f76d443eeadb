use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::agent::Agent;
use crate::event::{AGENT_NAME, AGENT_VERSION};
use crate::probe::{Location, Probe, SampleConfig};
use crate::snapshot::SnapshotLimits;

use super::ApiError;

pub fn router(agent: Arc<Agent>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tracepoints", post(create_tracepoint))
        .route("/logpoints", post(create_logpoint))
        .route("/points", get(list_points))
        .route("/points/:id/enable", post(enable_point))
        .route("/points/:id/disable", post(disable_point))
        .route("/points/:id", delete(remove_point))
        .route("/tags/enable", post(enable_tags))
        .route("/tags/disable", post(disable_tags))
        .with_state(agent)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    agent: AgentDescriptor,
    features: Features,
    event_sink: SinkDescriptor,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentDescriptor {
    name: &'static str,
    version: &'static str,
    runtime_name: String,
    runtime_version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Features {
    tracepoints: bool,
    logpoints: bool,
    conditions: bool,
    rate_limit: bool,
}

#[derive(Serialize)]
struct SinkDescriptor {
    url: String,
}

async fn health(State(agent): State<Arc<Agent>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        agent: AgentDescriptor {
            name: AGENT_NAME,
            version: AGENT_VERSION,
            runtime_name: agent.client().runtime_name.clone(),
            runtime_version: agent.client().runtime_version.clone(),
        },
        features: Features {
            tracepoints: true,
            logpoints: true,
            conditions: true,
            rate_limit: true,
        },
        event_sink: SinkDescriptor {
            url: agent.sink_url().to_owned(),
        },
    })
}

/// Shared body of the two creation endpoints. Everything is optional at
/// the serde layer so missing fields come back as 400s, not extractor
/// rejections.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePointBody {
    file: Option<String>,
    line: Option<i64>,
    message: Option<String>,
    condition: Option<String>,
    tags: Option<Vec<String>>,
    unit_name: Option<String>,
    member_name: Option<String>,
    sample: Option<SampleConfig>,
    snapshot: Option<SnapshotLimits>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PointView {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    probe: Arc<Probe>,
}

impl PointView {
    fn new(probe: Arc<Probe>) -> Self {
        Self {
            kind: probe.kind_name(),
            probe,
        }
    }
}

fn validate_location(body: &CreatePointBody) -> Result<Location, ApiError> {
    let file = match &body.file {
        Some(f) if !f.trim().is_empty() => f.clone(),
        _ => return Err(ApiError::BadRequest("missing required field: file".to_owned())),
    };
    let line = match body.line {
        Some(l) if l >= 1 => l as u32,
        _ => {
            return Err(ApiError::BadRequest(
                "invalid line number: must be a positive integer".to_owned(),
            ))
        }
    };
    Ok(Location {
        file,
        line,
        unit_name: body.unit_name.clone(),
        member_name: body.member_name.clone(),
    })
}

fn build_probe(body: &CreatePointBody, message: Option<String>) -> Result<Probe, ApiError> {
    let location = validate_location(body)?;
    Ok(Probe {
        id: Uuid::new_v4().to_string(),
        location,
        condition: body.condition.clone().filter(|c| !c.trim().is_empty()),
        message,
        tags: body.tags.clone().unwrap_or_default(),
        enabled: true,
        sample: body.sample.unwrap_or_default(),
        snapshot: body.snapshot.clone().unwrap_or_default(),
    })
}

async fn create_tracepoint(
    State(agent): State<Arc<Agent>>,
    Json(body): Json<CreatePointBody>,
) -> Result<(StatusCode, Json<PointView>), ApiError> {
    let probe = build_probe(&body, None)?;
    tracing::info!(id = %probe.id, file = %probe.location.file, line = probe.location.line, "tracepoint created");
    let stored = agent.upsert_probe(probe);
    Ok((StatusCode::CREATED, Json(PointView::new(stored))))
}

async fn create_logpoint(
    State(agent): State<Arc<Agent>>,
    Json(body): Json<CreatePointBody>,
) -> Result<(StatusCode, Json<PointView>), ApiError> {
    let message = match &body.message {
        Some(m) if !m.is_empty() => m.clone(),
        _ => return Err(ApiError::BadRequest("missing required field: message".to_owned())),
    };
    let probe = build_probe(&body, Some(message))?;
    tracing::info!(id = %probe.id, file = %probe.location.file, line = probe.location.line, "logpoint created");
    let stored = agent.upsert_probe(probe);
    Ok((StatusCode::CREATED, Json(PointView::new(stored))))
}

#[derive(Deserialize, Default)]
struct PointsQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    enabled: Option<bool>,
    tag: Option<String>,
}

#[derive(Serialize)]
struct PointsResponse {
    points: Vec<PointView>,
    total: usize,
}

async fn list_points(
    State(agent): State<Arc<Agent>>,
    Query(query): Query<PointsQuery>,
) -> Json<PointsResponse> {
    let points: Vec<PointView> = agent
        .store()
        .all()
        .into_iter()
        .filter(|p| match &query.kind {
            Some(kind) => p.kind_name() == kind.as_str(),
            None => true,
        })
        .filter(|p| match query.enabled {
            Some(enabled) => p.enabled == enabled,
            None => true,
        })
        .filter(|p| match &query.tag {
            Some(tag) => p.tags.iter().any(|t| t == tag),
            None => true,
        })
        .map(PointView::new)
        .collect();

    let total = points.len();
    Json(PointsResponse { points, total })
}

async fn enable_point(
    State(agent): State<Arc<Agent>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    toggle_point(&agent, &id, true)
}

async fn disable_point(
    State(agent): State<Arc<Agent>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    toggle_point(&agent, &id, false)
}

fn toggle_point(
    agent: &Agent,
    id: &str,
    enabled: bool,
) -> Result<Json<serde_json::Value>, ApiError> {
    match agent.store().set_enabled(id, enabled) {
        Some(probe) => Ok(Json(json!({ "id": probe.id, "enabled": probe.enabled }))),
        None => Err(ApiError::NotFound(format!("no point with id {id}"))),
    }
}

// deleting an unknown id is still a 204, the endpoint is idempotent
async fn remove_point(State(agent): State<Arc<Agent>>, Path(id): Path<String>) -> StatusCode {
    agent.remove_probe(&id);
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct TagsBody {
    tags: Option<Vec<String>>,
}

async fn enable_tags(
    State(agent): State<Arc<Agent>>,
    Json(body): Json<TagsBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tags = body
        .tags
        .ok_or_else(|| ApiError::BadRequest("missing required field: tags".to_owned()))?;
    let changed = tags.iter().filter(|t| agent.add_tag(t)).count();
    Ok(Json(json!({ "enabled": changed })))
}

async fn disable_tags(
    State(agent): State<Arc<Agent>>,
    Json(body): Json<TagsBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tags = body
        .tags
        .ok_or_else(|| ApiError::BadRequest("missing required field: tags".to_owned()))?;
    let changed = tags.iter().filter(|t| agent.remove_tag(t)).count();
    Ok(Json(json!({ "disabled": changed })))
}

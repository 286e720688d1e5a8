//! Client-facing REST API: `/api/v1/kv/*` for reads/writes and
//! `/api/v1/cluster/*` for cluster introspection. Grounded in the original
//! node's HTTP handlers, rehomed onto axum/tower per this stack's idioms.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use strangedb_cluster::{Coordinator, Membership, Ring};
use strangedb_core::{Error, HlcClock, Record};
use strangedb_storage::RecordStore;

pub struct AppState<S: RecordStore> {
    pub coordinator: Arc<Coordinator<S>>,
    pub clock: Arc<HlcClock>,
    pub ring: Arc<Ring>,
    pub membership: Arc<Membership>,
    pub node_id: String,
    pub start_time: Instant,
}

pub fn router<S: RecordStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/api/v1/kv/:key", get(get_key::<S>).delete(delete_key::<S>))
        .route("/api/v1/kv", post(set_key::<S>))
        .route("/api/v1/cluster/status", get(cluster_status::<S>))
        .route("/api/v1/ring/status", get(ring_status::<S>))
        .route("/api/v1/keys", get(list_keys::<S>))
        .route("/health", get(health::<S>))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(ApiError { error: self.message })).into_response()
    }
}

struct ApiErrorResponse {
    status: StatusCode,
    message: String,
}

impl From<Error> for ApiErrorResponse {
    fn from(e: Error) -> Self {
        let status = match e {
            Error::KeyNotFound => StatusCode::NOT_FOUND,
            Error::QuorumNotReached => StatusCode::SERVICE_UNAVAILABLE,
            Error::NoNodesAvailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SetKeyRequest {
    key: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct SetKeyResponse {
    success: bool,
    key: String,
    wall_time: i64,
    logical: u32,
}

async fn set_key<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<SetKeyRequest>,
) -> Result<Json<SetKeyResponse>, ApiErrorResponse> {
    let timestamp = state.clock.now();
    let record = Record::live(req.key.as_bytes().to_vec(), req.value.into_bytes(), timestamp.clone());
    state.coordinator.set(record).await?;

    Ok(Json(SetKeyResponse {
        success: true,
        key: req.key,
        wall_time: timestamp.wall_time,
        logical: timestamp.logical,
    }))
}

#[derive(Debug, Serialize)]
struct GetKeyResponse {
    key: String,
    value: String,
    value_base64: String,
    wall_time: i64,
    logical: u32,
    node: String,
}

async fn get_key<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(key): Path<String>,
) -> Result<Json<GetKeyResponse>, ApiErrorResponse> {
    let record = state.coordinator.get(key.as_bytes()).await?;

    let value = String::from_utf8(record.value.clone()).unwrap_or_else(|_| "[binary data]".to_string());
    Ok(Json(GetKeyResponse {
        key,
        value,
        value_base64: BASE64_STANDARD.encode(&record.value),
        wall_time: record.timestamp.wall_time,
        logical: record.timestamp.logical,
        node: state.node_id.clone(),
    }))
}

#[derive(Debug, Serialize)]
struct DeleteKeyResponse {
    success: bool,
    key: String,
    tombstone_created: bool,
}

async fn delete_key<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(key): Path<String>,
) -> Result<Json<DeleteKeyResponse>, ApiErrorResponse> {
    state.coordinator.delete(key.as_bytes()).await?;
    Ok(Json(DeleteKeyResponse {
        success: true,
        key,
        tombstone_created: true,
    }))
}

#[derive(Debug, Serialize)]
struct ClusterStatusResponse {
    node_id: String,
    alive_members: Vec<String>,
    uptime_seconds: u64,
}

async fn cluster_status<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<ClusterStatusResponse> {
    Json(ClusterStatusResponse {
        node_id: state.node_id.clone(),
        alive_members: state.membership.alive_members(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[derive(Debug, Serialize)]
struct RingStatusResponse {
    vnodes_per_node: usize,
    nodes: Vec<String>,
}

async fn ring_status<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<RingStatusResponse> {
    Json(RingStatusResponse {
        vnodes_per_node: state.ring.vnodes(),
        nodes: state.ring.nodes(),
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    node: String,
    uptime_seconds: u64,
}

async fn health<S: RecordStore + 'static>(State(state): State<Arc<AppState<S>>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node: state.node_id.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[derive(Debug, Deserialize)]
struct ListKeysParams {
    prefix: Option<String>,
    limit: Option<usize>,
    sort: Option<String>,
}

async fn list_keys<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListKeysParams>,
) -> Result<Json<Vec<String>>, ApiErrorResponse> {
    // Local keys only; a cluster-wide listing would require fanning out to
    // every node and is left to the CLI to aggregate if ever needed.
    let prefix = params.prefix.unwrap_or_default();
    let limit = params.limit.unwrap_or(1000);

    let records = state.coordinator.list(prefix.as_bytes(), limit).await?;
    let mut keys: Vec<String> = records
        .into_iter()
        .filter(|r| !r.tombstone)
        .map(|r| String::from_utf8_lossy(&r.key).into_owned())
        .collect();

    match params.sort.as_deref() {
        Some("desc") => keys.sort_by(|a, b| b.cmp(a)),
        _ => keys.sort(),
    }

    Ok(Json(keys))
}

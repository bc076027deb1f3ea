//! REST API handlers for the grove server

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use grove_core::{ExploreError, NodeId, NodeKind, SearchQuery, SearchResult};
use grove_explorer::{Breadcrumb, ExpandOutcome, ToggleOutcome, ViewSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ServerState;

/// Error returned by API handlers, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Explore(ExploreError),
    BadRequest(String),
}

impl From<ExploreError> for ApiError {
    fn from(e: ExploreError) -> Self {
        ApiError::Explore(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Explore(ExploreError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                json!({ "detail": format!("Node not found: {}", id) }),
            ),
            ApiError::Explore(ExploreError::Remote(remote)) => {
                let remote_status = remote.status;
                let detail = ExploreError::Remote(remote).user_message();
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "detail": detail, "remote_status": remote_status }),
                )
            }
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "detail": message }))
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub source: String,
    pub in_flight: usize,
}

#[derive(Debug, Serialize)]
pub struct CollapseResponse {
    pub node_id: NodeId,
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub selected: Option<NodeId>,
    pub breadcrumbs: Vec<Breadcrumb>,
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    #[serde(default)]
    pub node_id: Option<NodeId>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
    pub type_filter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub roots: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let gateway = state.explorer.gateway();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        source: gateway.source_name().to_string(),
        in_flight: gateway.in_flight(),
    })
}

/// Current view: registry contents, expansion state and navigation.
pub async fn get_view(State(state): State<Arc<ServerState>>) -> Json<ViewSnapshot> {
    Json(state.explorer.snapshot().await)
}

pub async fn get_node(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ApiResult<grove_core::Node> {
    let node = state.explorer.node_details(&NodeId::from(id)).await?;
    Ok(Json(node))
}

pub async fn expand_node(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ApiResult<ExpandOutcome> {
    let outcome = state.explorer.expand(&NodeId::from(id)).await?;
    Ok(Json(outcome))
}

pub async fn collapse_node(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ApiResult<CollapseResponse> {
    let node_id = NodeId::from(id);
    let removed = state.explorer.collapse(&node_id).await?;
    Ok(Json(CollapseResponse { node_id, removed }))
}

pub async fn toggle_node(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ApiResult<ToggleOutcome> {
    let outcome = state.explorer.toggle(&NodeId::from(id)).await?;
    Ok(Json(outcome))
}

pub async fn focus_node(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ApiResult<SelectionResponse> {
    let node_id = NodeId::from(id);
    let breadcrumbs = state.explorer.focus_node(&node_id).await?;
    Ok(Json(SelectionResponse {
        selected: Some(node_id),
        breadcrumbs,
    }))
}

pub async fn select_node(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<SelectRequest>,
) -> ApiResult<SelectionResponse> {
    let breadcrumbs = state
        .explorer
        .select_node(request.node_id.as_ref())
        .await?;
    Ok(Json(SelectionResponse {
        selected: request.node_id,
        breadcrumbs,
    }))
}

pub async fn search(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<SearchResponse> {
    let text = params.q.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    let mut query = SearchQuery::new(text)
        .with_type_filter(params.type_filter.as_deref().map(NodeKind::parse));
    if let Some(limit) = params.limit {
        query = query.with_limit(limit);
    }

    let results = state.explorer.search(&query).await?;
    Ok(Json(SearchResponse {
        query: query.text,
        total: results.len(),
        results,
    }))
}

/// Reset everything and reload the roots.
pub async fn refresh(State(state): State<Arc<ServerState>>) -> ApiResult<RefreshResponse> {
    let roots = state.explorer.refresh().await?;
    Ok(Json(RefreshResponse { roots: roots.len() }))
}

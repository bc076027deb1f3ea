//! Axum router setup for the grove server

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::{
    ServerState,
    handlers::{
        collapse_node, expand_node, focus_node, get_node, get_view, health_check, refresh,
        search, select_node, toggle_node,
    },
    websocket::ws_handler,
};

/// Create the axum router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Explorer events
        .route("/ws", get(ws_handler))
        // Read-only views
        .route("/api/health", get(health_check))
        .route("/api/view", get(get_view))
        .route("/api/node/:id", get(get_node))
        .route("/api/search", get(search))
        // Actions
        .route("/api/node/:id/expand", post(expand_node))
        .route("/api/node/:id/collapse", post(collapse_node))
        .route("/api/node/:id/toggle", post(toggle_node))
        .route("/api/node/:id/focus", post(focus_node))
        .route("/api/select", post(select_node))
        .route("/api/refresh", post(refresh))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_cache::{CacheStore, DEFAULT_TTL, MemoryCache};
    use grove_client::GraphSource;
    use grove_client::testing::MockSource;
    use grove_explorer::{Explorer, ExplorerConfig};

    #[test]
    fn test_router_creation() {
        let explorer = Explorer::new(
            Arc::new(MockSource::new()) as Arc<dyn GraphSource>,
            Arc::new(MemoryCache::new(DEFAULT_TTL)) as Arc<dyn CacheStore>,
            ExplorerConfig::default(),
        );
        let state = Arc::new(ServerState::new(Arc::new(explorer)));
        let _router = create_router(state);
    }
}

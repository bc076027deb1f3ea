//! Deduplicating front for a [`GraphSource`]

use std::sync::Arc;

use grove_core::{Expansion, Node, NodeId, RemoteError, SearchQuery, SearchResult};
use tracing::debug;

use crate::inflight::Inflight;
use crate::source::GraphSource;

/// Remote data gateway.
///
/// Every fetch computes a request key from the operation and its arguments. While a call
/// with that key is outstanding, further callers await the same result instead of issuing
/// a second round trip.
pub struct Gateway {
    source: Arc<dyn GraphSource>,
    node_lists: Inflight<Vec<Node>>,
    expansions: Inflight<Expansion>,
    nodes: Inflight<Node>,
    searches: Inflight<Vec<SearchResult>>,
}

impl Gateway {
    pub fn new(source: Arc<dyn GraphSource>) -> Self {
        Gateway {
            source,
            node_lists: Inflight::new(),
            expansions: Inflight::new(),
            nodes: Inflight::new(),
            searches: Inflight::new(),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Number of distinct requests currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.node_lists.len() + self.expansions.len() + self.nodes.len() + self.searches.len()
    }

    pub async fn fetch_root(&self) -> Result<Vec<Node>, RemoteError> {
        let source = Arc::clone(&self.source);
        self.node_lists
            .run("root", move || async move { source.root().await })
            .await
    }

    /// Children of `id` plus its outgoing references.
    pub async fn fetch_children(&self, id: &NodeId) -> Result<Expansion, RemoteError> {
        let key = format!("children:{}", id);
        let source = Arc::clone(&self.source);
        let id = id.clone();
        self.expansions
            .run(&key, move || async move {
                debug!("Fetching expansion of {} from {}", id, source.name());
                source.expand(&id).await
            })
            .await
    }

    /// Plain child enumeration, at most `limit` entries.
    pub async fn fetch_child_list(&self, id: &NodeId, limit: u32) -> Result<Vec<Node>, RemoteError> {
        let key = format!("child_list:{}:{}", id, limit);
        let source = Arc::clone(&self.source);
        let id = id.clone();
        self.node_lists
            .run(&key, move || async move { source.children(&id, limit).await })
            .await
    }

    pub async fn fetch_node(&self, id: &NodeId) -> Result<Node, RemoteError> {
        let key = format!("node:{}", id);
        let source = Arc::clone(&self.source);
        let id = id.clone();
        self.nodes
            .run(&key, move || async move { source.node(&id).await })
            .await
    }

    /// Ancestors of `id`, root first.
    pub async fn fetch_ancestors(&self, id: &NodeId) -> Result<Vec<Node>, RemoteError> {
        let key = format!("ancestors:{}", id);
        let source = Arc::clone(&self.source);
        let id = id.clone();
        self.node_lists
            .run(&key, move || async move { source.ancestors(&id).await })
            .await
    }

    pub async fn fetch_search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, RemoteError> {
        let key = format!(
            "search:{}:{}:{}",
            query.text,
            query.limit,
            query.type_filter.map(|k| k.as_str()).unwrap_or("")
        );
        let source = Arc::clone(&self.source);
        let query = query.clone();
        self.searches
            .run(&key, move || async move { source.search(&query).await })
            .await
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("source", &self.source.name())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

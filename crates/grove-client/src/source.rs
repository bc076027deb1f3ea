//! The consumed remote contract

use async_trait::async_trait;
use grove_core::{Expansion, Node, NodeId, RemoteError, SearchQuery, SearchResult};

/// Provider of graph data: the remote service over HTTP in production, a scripted
/// source in tests.
#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Top-level nodes with their child counts.
    async fn root(&self) -> Result<Vec<Node>, RemoteError>;

    /// Children of a node together with its outgoing references.
    async fn expand(&self, id: &NodeId) -> Result<Expansion, RemoteError>;

    /// Children of a node, at most `limit` of them.
    async fn children(&self, id: &NodeId, limit: u32) -> Result<Vec<Node>, RemoteError>;

    /// Full details of a single node. A 404 status means the id is unknown.
    async fn node(&self, id: &NodeId) -> Result<Node, RemoteError>;

    /// Ancestors of a node ordered root -> immediate parent.
    async fn ancestors(&self, id: &NodeId) -> Result<Vec<Node>, RemoteError>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, RemoteError>;

    /// Get source name
    fn name(&self) -> &str;
}

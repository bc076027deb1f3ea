//! The cache contract shared by the durable and in-memory stores

use std::time::Duration;

use async_trait::async_trait;
use grove_core::{CacheError, Node, NodeId, OutgoingRef};

/// Records older than this are treated as absent.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Key-value store of node records, parent -> children lists and parent -> outgoing
/// references.
///
/// Writes are last-write-wins. Reads never return an entry older than [`CacheStore::ttl`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>, CacheError>;

    /// Ordered children of `parent`. `Some(vec![])` is a valid cached empty enumeration.
    async fn get_children(&self, parent: &NodeId) -> Result<Option<Vec<Node>>, CacheError>;

    async fn set_node(&self, node: &Node) -> Result<(), CacheError>;

    /// Store the child list of `parent`. Each child is also recorded under its own id.
    async fn set_children(&self, parent: &NodeId, children: &[Node]) -> Result<(), CacheError>;

    /// Outgoing references returned with the children of `parent`.
    async fn get_references(
        &self,
        parent: &NodeId,
    ) -> Result<Option<Vec<OutgoingRef>>, CacheError>;

    async fn set_references(
        &self,
        parent: &NodeId,
        references: &[OutgoingRef],
    ) -> Result<(), CacheError>;

    /// Drop every record. Idempotent.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Reclaim expired records. Returns how many were removed.
    async fn sweep_expired(&self) -> Result<usize, CacheError>;

    fn ttl(&self) -> Duration;
}

/// Whether a record written at `written_at_ms` is still servable at `now_ms`.
pub(crate) fn is_fresh(written_at_ms: i64, now_ms: i64, ttl: Duration) -> bool {
    now_ms.saturating_sub(written_at_ms) <= ttl.as_millis() as i64
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

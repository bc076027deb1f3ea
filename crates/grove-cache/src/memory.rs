//! In-process cache store with the same staleness rules as the durable one

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use grove_core::{CacheError, Node, NodeId, OutgoingRef};
use tokio::sync::RwLock;

use crate::store::CacheStore;

/// Cache entry with its write time
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    written_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        CacheEntry {
            value,
            written_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.written_at.elapsed() > ttl
    }
}

#[derive(Debug, Default)]
struct Tables {
    nodes: HashMap<NodeId, CacheEntry<Node>>,
    children: HashMap<NodeId, CacheEntry<Vec<Node>>>,
    references: HashMap<NodeId, CacheEntry<Vec<OutgoingRef>>>,
}

impl Tables {
    fn len(&self) -> usize {
        self.nodes.len() + self.children.len() + self.references.len()
    }
}

/// Volatile [`CacheStore`], used when no cache path is configured.
#[derive(Debug)]
pub struct MemoryCache {
    tables: RwLock<Tables>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        MemoryCache {
            tables: RwLock::new(Tables::default()),
            ttl,
        }
    }

    /// Number of stored records, expired ones included.
    pub async fn len(&self) -> usize {
        self.tables.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>, CacheError> {
        let tables = self.tables.read().await;
        Ok(tables
            .nodes
            .get(id)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| entry.value.clone()))
    }

    async fn get_children(&self, parent: &NodeId) -> Result<Option<Vec<Node>>, CacheError> {
        let tables = self.tables.read().await;
        Ok(tables
            .children
            .get(parent)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| entry.value.clone()))
    }

    async fn get_references(
        &self,
        parent: &NodeId,
    ) -> Result<Option<Vec<OutgoingRef>>, CacheError> {
        let tables = self.tables.read().await;
        Ok(tables
            .references
            .get(parent)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| entry.value.clone()))
    }

    async fn set_node(&self, node: &Node) -> Result<(), CacheError> {
        let mut tables = self.tables.write().await;
        tables
            .nodes
            .insert(node.id.clone(), CacheEntry::new(node.clone()));
        Ok(())
    }

    async fn set_children(&self, parent: &NodeId, children: &[Node]) -> Result<(), CacheError> {
        let mut tables = self.tables.write().await;
        for child in children {
            tables
                .nodes
                .insert(child.id.clone(), CacheEntry::new(child.clone()));
        }
        tables
            .children
            .insert(parent.clone(), CacheEntry::new(children.to_vec()));
        Ok(())
    }

    async fn set_references(
        &self,
        parent: &NodeId,
        references: &[OutgoingRef],
    ) -> Result<(), CacheError> {
        let mut tables = self.tables.write().await;
        tables
            .references
            .insert(parent.clone(), CacheEntry::new(references.to_vec()));
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut tables = self.tables.write().await;
        tables.nodes.clear();
        tables.children.clear();
        tables.references.clear();
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize, CacheError> {
        let mut tables = self.tables.write().await;
        let before = tables.len();
        let ttl = self.ttl;
        tables.nodes.retain(|_, entry| !entry.is_expired(ttl));
        tables.children.retain(|_, entry| !entry.is_expired(ttl));
        tables.references.retain(|_, entry| !entry.is_expired(ttl));
        Ok(before - tables.len())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::NodeKind;

    #[tokio::test]
    async fn test_set_children_records_each_child() {
        let cache = MemoryCache::new(Duration::from_secs(300));
        let children = vec![
            Node::new("a", "a", NodeKind::Class),
            Node::new("b", "b", NodeKind::Function),
        ];
        cache.set_children(&"pkg".into(), &children).await.unwrap();

        assert_eq!(cache.get_children(&"pkg".into()).await.unwrap(), Some(children));
        assert!(cache.get_node(&"b".into()).await.unwrap().is_some());
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn test_expired_entries_are_never_served() {
        let cache = MemoryCache::new(Duration::from_millis(1));
        cache
            .set_node(&Node::new("a", "a", NodeKind::Module))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cache.get_node(&"a".into()).await.unwrap().is_none());
        // still stored until a sweep reclaims it
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.sweep_expired().await.unwrap(), 1);
        assert!(cache.is_empty().await);
    }
}

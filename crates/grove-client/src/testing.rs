//! Scripted in-process graph source for tests
//!
//! Every call is recorded under an operation key (`root`, `expand:<id>`, `children:<id>`,
//! `node:<id>`, `ancestors:<id>`, `search`) before it waits on the gate or the artificial
//! latency, so call counts are observable while calls are still outstanding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use grove_core::{
    EdgeKind, Expansion, Node, NodeId, NodeKind, OutgoingRef, RemoteError, SearchQuery,
    SearchResult,
};
use tokio::sync::Semaphore;

use crate::source::GraphSource;

#[derive(Default)]
struct Script {
    roots: Vec<Node>,
    expansions: HashMap<NodeId, Expansion>,
    ancestors: HashMap<NodeId, Vec<Node>>,
    nodes: HashMap<NodeId, Node>,
    failures: HashMap<String, RemoteError>,
    calls: Vec<String>,
    latency: Duration,
    gate: Option<Arc<Semaphore>>,
}

impl Script {
    fn remember(&mut self, node: &Node) {
        self.nodes.insert(node.id.clone(), node.clone());
    }
}

/// [`GraphSource`] answering from an in-memory script.
#[derive(Default)]
pub struct MockSource {
    script: Mutex<Script>,
}

fn not_found() -> RemoteError {
    RemoteError::new(404, "Node not found")
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two roots, `pkg1` (3 children advertised) and `mod1` (5 advertised).
    ///
    /// `pkg1` expands to `cls1` and `fn1`, `cls1` to `fn9`, and `mod1` to `var1` plus
    /// import references to `pkg1` and to an unlisted `ext1`.
    pub fn scenario() -> Self {
        Self::new()
            .with_roots(vec![
                Node::new("pkg1", "pkg1", NodeKind::Package).with_child_count(3),
                Node::new("mod1", "mod1", NodeKind::Module).with_child_count(5),
            ])
            .with_children(
                "pkg1",
                vec![
                    Node::new("cls1", "cls1", NodeKind::Class).with_child_count(1),
                    Node::new("fn1", "fn1", NodeKind::Function),
                ],
            )
            .with_children("cls1", vec![Node::new("fn9", "fn9", NodeKind::Function)])
            .with_expansion(
                "mod1",
                Expansion {
                    children: vec![Node::new("var1", "var1", NodeKind::Variable)],
                    outgoing: vec![
                        OutgoingRef {
                            id: "pkg1".into(),
                            name: "pkg1".to_string(),
                            kind: NodeKind::Package,
                            edge_type: EdgeKind::Imports,
                            source: None,
                        },
                        OutgoingRef {
                            id: "ext1".into(),
                            name: "ext1".to_string(),
                            kind: NodeKind::Module,
                            edge_type: EdgeKind::Imports,
                            source: Some("var1".into()),
                        },
                    ],
                },
            )
            .with_ancestors(
                "fn9",
                vec![
                    Node::new("pkg1", "pkg1", NodeKind::Package).with_child_count(3),
                    Node::new("cls1", "cls1", NodeKind::Class).with_child_count(1),
                ],
            )
            .with_ancestors(
                "cls1",
                vec![Node::new("pkg1", "pkg1", NodeKind::Package).with_child_count(3)],
            )
    }

    pub fn with_roots(self, roots: Vec<Node>) -> Self {
        self.set_roots(roots);
        self
    }

    /// Script the children of `parent`. Each child gets `parent` as its parent link.
    pub fn with_children(self, parent: &str, children: Vec<Node>) -> Self {
        self.with_expansion(parent, Expansion::children_only(children))
    }

    pub fn with_expansion(self, parent: &str, expansion: Expansion) -> Self {
        self.set_expansion(parent, expansion);
        self
    }

    pub fn with_ancestors(self, id: &str, ancestors: Vec<Node>) -> Self {
        {
            let mut script = self.lock();
            for node in &ancestors {
                script
                    .nodes
                    .entry(node.id.clone())
                    .or_insert_with(|| node.clone());
            }
            script.ancestors.insert(id.into(), ancestors);
        }
        self
    }

    pub fn set_roots(&self, roots: Vec<Node>) {
        let mut script = self.lock();
        for node in &roots {
            script.remember(node);
        }
        script.roots = roots;
    }

    pub fn set_expansion(&self, parent: &str, mut expansion: Expansion) {
        let mut script = self.lock();
        for child in &mut expansion.children {
            child.parent_id = Some(parent.into());
            script.remember(child);
        }
        script.expansions.insert(parent.into(), expansion);
    }

    /// Make every call recorded under `key` fail with `error` until cleared.
    pub fn fail(&self, key: &str, error: RemoteError) {
        self.lock().failures.insert(key.to_string(), error);
    }

    pub fn clear_failure(&self, key: &str) {
        self.lock().failures.remove(key);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Keep every subsequent call outstanding until [`MockSource::release`].
    pub fn hold(&self) {
        self.lock().gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let every held call proceed.
    pub fn release(&self) {
        if let Some(gate) = self.lock().gate.take() {
            gate.close();
        }
    }

    /// How many calls were recorded under `key`.
    pub fn calls(&self, key: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.as_str() == key).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("mock script poisoned")
    }

    async fn enter(&self, key: String) -> Result<(), RemoteError> {
        let (gate, latency) = {
            let mut script = self.lock();
            script.calls.push(key.clone());
            (script.gate.clone(), script.latency)
        };
        if let Some(gate) = gate {
            // closed on release
            let _ = gate.acquire().await;
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.lock().failures.get(&key) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GraphSource for MockSource {
    async fn root(&self) -> Result<Vec<Node>, RemoteError> {
        self.enter("root".to_string()).await?;
        Ok(self.lock().roots.clone())
    }

    async fn expand(&self, id: &NodeId) -> Result<Expansion, RemoteError> {
        self.enter(format!("expand:{}", id)).await?;
        let script = self.lock();
        match script.expansions.get(id) {
            Some(expansion) => Ok(expansion.clone()),
            None if script.nodes.contains_key(id) => Ok(Expansion::default()),
            None => Err(not_found()),
        }
    }

    async fn children(&self, id: &NodeId, limit: u32) -> Result<Vec<Node>, RemoteError> {
        self.enter(format!("children:{}", id)).await?;
        let script = self.lock();
        match script.expansions.get(id) {
            Some(expansion) => Ok(expansion
                .children
                .iter()
                .take(limit as usize)
                .cloned()
                .collect()),
            None if script.nodes.contains_key(id) => Ok(Vec::new()),
            None => Err(not_found()),
        }
    }

    async fn node(&self, id: &NodeId) -> Result<Node, RemoteError> {
        self.enter(format!("node:{}", id)).await?;
        self.lock().nodes.get(id).cloned().ok_or_else(not_found)
    }

    async fn ancestors(&self, id: &NodeId) -> Result<Vec<Node>, RemoteError> {
        self.enter(format!("ancestors:{}", id)).await?;
        let script = self.lock();
        match script.ancestors.get(id) {
            Some(ancestors) => Ok(ancestors.clone()),
            None if script.nodes.contains_key(id) => Ok(Vec::new()),
            None => Err(not_found()),
        }
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, RemoteError> {
        self.enter("search".to_string()).await?;
        let needle = query.text.to_lowercase();
        let script = self.lock();
        let mut hits: Vec<SearchResult> = script
            .nodes
            .values()
            .filter(|n| n.name.to_lowercase().contains(&needle))
            .filter(|n| query.type_filter.is_none_or(|kind| n.kind == kind))
            .map(|n| SearchResult {
                id: n.id.clone(),
                name: n.name.clone(),
                kind: n.kind,
                qualified_name: n.qualified_name.clone(),
                line_number: n.line_number,
                docstring: n.docstring.clone(),
                score: 1.0,
            })
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        hits.truncate(query.limit as usize);
        Ok(hits)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

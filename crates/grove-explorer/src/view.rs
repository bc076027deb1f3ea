//! Mutable view state and its serialisable snapshot

use std::collections::BTreeSet;

use grove_core::{Edge, Node, NodeId, Registry};
use serde::Serialize;

use crate::expansion::ExpansionRecord;
use crate::navigation::Breadcrumb;

/// Everything the explorer owns behind its state lock.
#[derive(Debug, Default)]
pub(crate) struct ViewState {
    pub registry: Registry,
    pub expansion: ExpansionRecord,
    pub selected: Option<NodeId>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub stale: BTreeSet<NodeId>,
    pub last_error: Option<String>,
}

impl ViewState {
    /// Drop every piece of local state.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.expansion.clear();
        self.selected = None;
        self.breadcrumbs.clear();
        self.stale.clear();
        self.last_error = None;
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let mut nodes: Vec<Node> = self.registry.nodes().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut edges: Vec<Edge> = self.registry.edges().collect();
        edges.sort_by(|a, b| {
            (&a.source, &a.target, a.kind.as_str()).cmp(&(&b.source, &b.target, b.kind.as_str()))
        });

        ViewSnapshot {
            roots: self.registry.roots().to_vec(),
            nodes,
            edges,
            expanded: self.expansion.expanded(),
            expanding: self.expansion.expanding(),
            selected: self.selected.clone(),
            breadcrumbs: self.breadcrumbs.clone(),
            stale: self.stale.iter().cloned().collect(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Point-in-time copy of the view. Nodes, edges and id lists are sorted, so the snapshot
/// never depends on the order in which concurrent expansions completed.
#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    /// Top-level nodes in load order.
    pub roots: Vec<NodeId>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub expanded: Vec<NodeId>,
    pub expanding: Vec<NodeId>,
    pub selected: Option<NodeId>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub stale: Vec<NodeId>,
    pub last_error: Option<String>,
}

impl ViewSnapshot {
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes
            .binary_search_by(|n| n.id.cmp(id))
            .ok()
            .map(|idx| &self.nodes[idx])
    }
}

//! Node registry: the authoritative in-memory map of every node the client currently knows

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use tracing::debug;

use crate::model::*;

/// Arena of known nodes keyed by their stable [`NodeId`], with the edge set kept as a
/// secondary index. Parent links live on the nodes themselves.
pub struct Registry {
    inner: StableDiGraph<Node, EdgeKind>,
    index: HashMap<NodeId, NodeIndex>,
    roots: Vec<NodeId>,
    /// Stub id -> node whose expansion created it.
    stub_owners: HashMap<NodeId, NodeId>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .field("roots", &self.roots.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
            roots: Vec::new(),
            stub_owners: HashMap::new(),
        }
    }

    /// Register a top-level node. Returns true if the node was not known before.
    pub fn insert_root(&mut self, mut node: Node) -> bool {
        node.parent_id = None;
        let id = node.id.clone();
        let added = self.materialize(node);
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
        added
    }

    /// Register a node if it is not already present. A stub with the same id is upgraded
    /// in place to the full node. Returns true if the node is new to the registry.
    pub fn materialize(&mut self, node: Node) -> bool {
        match self.index.get(&node.id) {
            Some(&idx) => {
                let existing = &mut self.inner[idx];
                if existing.is_stub && !node.is_stub {
                    debug!("Upgrading stub {} to a full node", node.id);
                    let is_expanded = existing.is_expanded;
                    *existing = node;
                    existing.is_expanded = is_expanded;
                    let id = existing.id.clone();
                    self.stub_owners.remove(&id);
                }
                false
            }
            None => {
                let id = node.id.clone();
                let idx = self.inner.add_node(node);
                self.index.insert(id, idx);
                true
            }
        }
    }

    /// Register a stub anchoring a reference edge created while expanding `owner`.
    pub fn insert_stub(&mut self, node: Node, owner: &NodeId) -> bool {
        if self.index.contains_key(&node.id) {
            return false;
        }
        let id = node.id.clone();
        let stub = Node {
            is_stub: true,
            ..node
        };
        self.materialize(stub);
        self.stub_owners.insert(id, owner.clone());
        true
    }

    /// Get a node by ID.
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.index.get(id).and_then(|&idx| self.inner.node_weight(idx))
    }

    /// Get a mutable node by ID.
    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        let idx = *self.index.get(id)?;
        self.inner.node_weight_mut(idx)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Remove a node together with every edge touching it.
    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        let idx = self.index.remove(id)?;
        self.roots.retain(|r| r != id);
        self.stub_owners.remove(id);
        self.inner.remove_node(idx)
    }

    /// Add an edge between two registered nodes. Duplicate edges and edges with an
    /// unknown endpoint are rejected.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        let (Some(&source), Some(&target)) = (self.index.get(&edge.source), self.index.get(&edge.target))
        else {
            debug!(
                "Rejecting {} edge {} -> {}: endpoint not registered",
                edge.kind.as_str(),
                edge.source,
                edge.target
            );
            return false;
        };
        let duplicate = self
            .inner
            .edges_directed(source, Direction::Outgoing)
            .any(|e| e.target() == target && *e.weight() == edge.kind);
        if duplicate {
            return false;
        }
        self.inner.add_edge(source, target, edge.kind);
        true
    }

    /// Remove every edge leaving `id`. Returns how many were removed.
    pub fn remove_edges_from(&mut self, id: &NodeId) -> usize {
        let Some(&idx) = self.index.get(id) else {
            return 0;
        };
        let edge_ids: Vec<_> = self
            .inner
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        for edge_id in &edge_ids {
            self.inner.remove_edge(*edge_id);
        }
        edge_ids.len()
    }

    /// Direct children of a node (targets of its outgoing `contains` edges), in the order
    /// they were added.
    pub fn children(&self, id: &NodeId) -> Vec<NodeId> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut children: Vec<NodeId> = self
            .inner
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| e.weight().is_hierarchical())
            .map(|e| self.inner[e.target()].id.clone())
            .collect();
        // petgraph yields the most recently added edge first
        children.reverse();
        children
    }

    /// Every node reachable from `id` through `contains` edges, excluding `id` itself.
    pub fn descendants(&self, id: &NodeId) -> Vec<NodeId> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut out = Vec::new();

        while let Some(current) = queue.pop_front() {
            for edge in self.inner.edges_directed(current, Direction::Outgoing) {
                if !edge.weight().is_hierarchical() {
                    continue;
                }
                let target = edge.target();
                if seen.insert(target) {
                    out.push(self.inner[target].id.clone());
                    queue.push_back(target);
                }
            }
        }

        out
    }

    /// Stubs created by the expansion of any node in `owners`.
    pub fn stubs_owned_by(&self, owners: &HashSet<NodeId>) -> Vec<NodeId> {
        self.stub_owners
            .iter()
            .filter(|(_, owner)| owners.contains(*owner))
            .map(|(stub, _)| stub.clone())
            .collect()
    }

    /// Ancestor chain of a node by following parent links, ordered root -> node and
    /// including the node itself. Stops at the first parent that is not registered.
    pub fn ancestry(&self, id: &NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get(id);

        while let Some(node) = current {
            if !seen.insert(node.id.clone()) {
                break;
            }
            chain.push(node.id.clone());
            current = node.parent_id.as_ref().and_then(|p| self.get(p));
        }

        chain.reverse();
        chain
    }

    pub fn set_expanded(&mut self, id: &NodeId, expanded: bool) {
        if let Some(node) = self.get_mut(id) {
            node.is_expanded = expanded;
        }
    }

    /// Top-level nodes in load order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    /// Iterate over all edges.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.inner.edge_references().map(move |e| {
            Edge::new(
                self.inner[e.source()].id.clone(),
                self.inner[e.target()].id.clone(),
                *e.weight(),
            )
        })
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
        self.index.clear();
        self.roots.clear();
        self.stub_owners.clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

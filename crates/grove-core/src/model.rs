//! Core data structures for the explorable code graph

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier assigned by the graph service. Unique across the whole graph and
/// stable across sessions, so it doubles as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId(value)
    }
}

/// Discriminates what kind of code entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum NodeKind {
    Package,
    Module,
    Class,
    Function,
    Variable,
    #[default]
    Unknown,
}

impl NodeKind {
    /// Parse a type tag as sent by the graph service. Matching is case-insensitive and
    /// anything outside the closed set becomes `Unknown`.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "package" => NodeKind::Package,
            "module" => NodeKind::Module,
            "class" => NodeKind::Class,
            "function" | "method" => NodeKind::Function,
            "variable" => NodeKind::Variable,
            _ => NodeKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Package => "package",
            NodeKind::Module => "module",
            NodeKind::Class => "class",
            NodeKind::Function => "function",
            NodeKind::Variable => "variable",
            NodeKind::Unknown => "unknown",
        }
    }

    /// Whether nodes of this kind can hold other nodes at all.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Package | NodeKind::Module | NodeKind::Class | NodeKind::Unknown
        )
    }
}

impl From<String> for NodeKind {
    fn from(value: String) -> Self {
        NodeKind::parse(&value)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four relationship kinds the explorer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum EdgeKind {
    // ── Hierarchy ───────────────────────────────────────────
    Contains,

    // ── References ──────────────────────────────────────────
    Calls,
    Imports,
    Inherits,
}

impl EdgeKind {
    /// Collapse the data source's relationship vocabulary onto the visual kinds.
    pub fn from_relationship(rel: &str) -> Self {
        match rel.trim().to_ascii_lowercase().as_str() {
            "contains" | "defines" => EdgeKind::Contains,
            "imports" | "uses" => EdgeKind::Imports,
            "inherits" => EdgeKind::Inherits,
            // calls, instantiates, decorates and anything unrecognised
            _ => EdgeKind::Calls,
        }
    }

    pub fn is_hierarchical(&self) -> bool {
        matches!(self, EdgeKind::Contains)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "contains",
            EdgeKind::Calls => "calls",
            EdgeKind::Imports => "imports",
            EdgeKind::Inherits => "inherits",
        }
    }
}

impl From<String> for EdgeKind {
    fn from(value: String) -> Self {
        EdgeKind::from_relationship(&value)
    }
}

/// A single node of the code graph as known to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_async: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_method: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_abstract: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    /// Number of direct children, known before the children themselves are fetched.
    #[serde(default, alias = "childCount")]
    pub child_count: u32,
    #[serde(default, alias = "isExpanded")]
    pub is_expanded: bool,
    /// The node whose enumeration produced this one. Sole source of truth for ancestry.
    #[serde(default, alias = "parentId", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    /// Minimal placeholder anchoring a reference edge.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_stub: bool,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, kind: NodeKind) -> Self {
        Node {
            id: id.into(),
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    /// Minimal node created for the far end of a reference edge.
    pub fn stub(id: impl Into<NodeId>, name: impl Into<String>, kind: NodeKind) -> Self {
        Node {
            is_stub: true,
            ..Node::new(id, name, kind)
        }
    }

    pub fn with_child_count(mut self, child_count: u32) -> Self {
        self.child_count = child_count;
        self
    }

    pub fn with_qualified_name(mut self, qualified_name: impl Into<String>) -> Self {
        self.qualified_name = Some(qualified_name.into());
        self
    }

    /// A leaf can never enter the expanding state.
    pub fn is_leaf(&self) -> bool {
        self.child_count == 0
    }
}

/// A directed edge between two registered nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId, kind: EdgeKind) -> Self {
        Edge {
            source,
            target,
            kind,
        }
    }
}

/// A reference from an expanded node to another node, returned alongside its children.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutgoingRef {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(alias = "edgeType", alias = "rel_type", alias = "relationship_type")]
    pub edge_type: EdgeKind,
    /// Originating node when it is one of the returned children rather than the
    /// expanded node itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<NodeId>,
}

/// Everything one expansion call returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Expansion {
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub outgoing: Vec<OutgoingRef>,
}

impl Expansion {
    pub fn children_only(children: Vec<Node>) -> Self {
        Expansion {
            children,
            outgoing: Vec::new(),
        }
    }
}

/// A single search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default)]
    pub score: f32,
}

/// Parameters of a search request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub limit: u32,
    pub type_filter: Option<NodeKind>,
}

impl SearchQuery {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 200;

    pub fn new(text: impl Into<String>) -> Self {
        SearchQuery {
            text: text.into(),
            limit: Self::DEFAULT_LIMIT,
            type_filter: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, Self::MAX_LIMIT);
        self
    }

    pub fn with_type_filter(mut self, kind: Option<NodeKind>) -> Self {
        self.type_filter = kind;
        self
    }
}

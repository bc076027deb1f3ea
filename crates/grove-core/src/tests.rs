//! Unit tests for the grove-core data model

use crate::*;
use serde_json::json;

#[test]
fn test_node_from_service_payload() {
    let payload = json!({
        "id": "mod:app.models",
        "name": "models",
        "type": "module",
        "qualified_name": "app.models",
        "docstring": "Data models.",
        "child_count": 4
    });

    let node: Node = serde_json::from_value(payload).unwrap();
    assert_eq!(node.id, NodeId::from("mod:app.models"));
    assert_eq!(node.kind, NodeKind::Module);
    assert_eq!(node.child_count, 4);
    assert_eq!(node.qualified_name.as_deref(), Some("app.models"));
    assert!(!node.is_expanded);
    assert!(node.parent_id.is_none());
}

#[test]
fn test_node_accepts_camel_case_aliases() {
    let payload = json!({
        "id": "cls:User",
        "name": "User",
        "type": "Class",
        "childCount": 2,
        "isExpanded": true
    });

    let node: Node = serde_json::from_value(payload).unwrap();
    assert_eq!(node.kind, NodeKind::Class);
    assert_eq!(node.child_count, 2);
    assert!(node.is_expanded);
}

#[test]
fn test_unknown_node_type_maps_to_unknown() {
    let node: Node = serde_json::from_value(json!({
        "id": "x",
        "name": "x",
        "type": "decorator"
    }))
    .unwrap();
    assert_eq!(node.kind, NodeKind::Unknown);
    assert!(node.is_leaf());
}

#[test]
fn test_node_kind_serializes_lowercase() {
    let json = serde_json::to_value(NodeKind::Function).unwrap();
    assert_eq!(json, json!("function"));
    assert_eq!(NodeKind::parse("METHOD"), NodeKind::Function);
}

#[test]
fn test_relationship_kinds_collapse_to_visual_kinds() {
    let cases = [
        ("CONTAINS", EdgeKind::Contains),
        ("defines", EdgeKind::Contains),
        ("CALLS", EdgeKind::Calls),
        ("instantiates", EdgeKind::Calls),
        ("DECORATES", EdgeKind::Calls),
        ("imports", EdgeKind::Imports),
        ("USES", EdgeKind::Imports),
        ("inherits", EdgeKind::Inherits),
    ];

    for (rel, expected) in cases {
        assert_eq!(EdgeKind::from_relationship(rel), expected, "Failed for {}", rel);
    }
}

#[test]
fn test_expansion_payload_with_outgoing_refs() {
    let payload = json!({
        "children": [
            {"id": "fn:a", "name": "a", "type": "function", "child_count": 0}
        ],
        "outgoing": [
            {"id": "fn:b", "name": "b", "type": "function", "edgeType": "CALLS"}
        ]
    });

    let expansion: Expansion = serde_json::from_value(payload).unwrap();
    assert_eq!(expansion.children.len(), 1);
    assert_eq!(expansion.outgoing[0].edge_type, EdgeKind::Calls);
    assert!(expansion.outgoing[0].source.is_none());
}

#[test]
fn test_stub_flag_is_omitted_for_full_nodes() {
    let node = Node::new("fn:a", "a", NodeKind::Function);
    let json = serde_json::to_value(&node).unwrap();
    assert!(json.get("is_stub").is_none());

    let stub = Node::stub("fn:b", "b", NodeKind::Function);
    let json = serde_json::to_value(&stub).unwrap();
    assert_eq!(json["is_stub"], json!(true));
}

#[test]
fn test_search_query_clamps_limit() {
    let query = SearchQuery::new("user").with_limit(10_000);
    assert_eq!(query.limit, SearchQuery::MAX_LIMIT);

    let query = SearchQuery::new("user").with_limit(0);
    assert_eq!(query.limit, 1);
}

#[test]
fn test_user_message_for_transport_failures() {
    let err = ExploreError::from(RemoteError::transport("connection refused"));
    assert!(err.user_message().contains("Could not reach"));

    let err = ExploreError::NotFound("fn:gone".into());
    assert_eq!(err.user_message(), "Node fn:gone is not available");
}

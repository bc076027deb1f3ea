//! Integration tests for Grove
//!
//! The full stack against a stand-in graph service: HTTP source, gateway, explorer with the
//! SQLite cache, invalidation listener and the local server.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use grove_cache::{CacheStore, SqliteCache};
use grove_client::{GraphSource, HttpGraphSource, HttpSourceConfig};
use grove_core::{ExploreError, NodeId};
use grove_explorer::{ExpandOutcome, ExpandSource, Explorer, ExplorerConfig};
use grove_live::{Dispatch, InvalidationListener, InvalidationTarget};
use grove_server::{GroveServer, ServerConfig};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TTL: Duration = Duration::from_secs(300);

/// Graph service with two roots, a class under `pkg1` and a function under that class.
async fn graph_service() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/graph/root"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nodes": [
                {"id": "pkg1", "name": "pkg1", "type": "package", "child_count": 2},
                {"id": "mod1", "name": "mod1", "type": "module", "child_count": 1}
            ],
            "total": 2
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/graph/expand/cls1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "children": [{"id": "fn9", "name": "fn9", "type": "function", "is_method": true}],
            "outgoing": []
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/graph/expand/mod1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "children": [{"id": "var1", "name": "var1", "type": "variable"}],
            "outgoing": [
                {"id": "pkg1", "name": "pkg1", "type": "package", "edgeType": "USES"}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/graph/node/fn9/ancestors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "node_id": "fn9",
            "ancestors": [
                {"id": "pkg1", "name": "pkg1", "type": "package", "child_count": 2},
                {"id": "cls1", "name": "User", "type": "class", "child_count": 1}
            ]
        })))
        .mount(&server)
        .await;

    server
}

/// `expand/pkg1`, asserted to be called exactly `times` times.
async fn mount_pkg1_expansion(server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path("/api/graph/expand/pkg1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "children": [
                        {"id": "cls1", "name": "User", "type": "class", "child_count": 1},
                        {"id": "fn1", "name": "fn1", "type": "function"}
                    ],
                    "outgoing": []
                }))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(times)
        .mount(server)
        .await;
}

fn explorer_for(server: &MockServer, cache_dir: &TempDir) -> Arc<Explorer> {
    let source = HttpGraphSource::new(&HttpSourceConfig {
        base_url: format!("{}/api", server.uri()),
        timeout_secs: 5,
    })
    .unwrap();
    let cache = SqliteCache::open(cache_dir.path().join("cache.db"), TTL).unwrap();
    Arc::new(Explorer::new(
        Arc::new(source) as Arc<dyn GraphSource>,
        Arc::new(cache) as Arc<dyn CacheStore>,
        ExplorerConfig::default(),
    ))
}

/// Test that the CLI binary can be invoked
#[test]
fn test_cli_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_grove"))
        .arg("version")
        .output()
        .expect("Failed to execute grove");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Grove v"));
}

#[tokio::test]
async fn test_expand_collapse_over_http_with_sqlite_cache() {
    let server = graph_service().await;
    mount_pkg1_expansion(&server, 1).await;
    let cache_dir = TempDir::new().unwrap();
    let explorer = explorer_for(&server, &cache_dir);

    explorer.load_root().await.unwrap();
    let pkg1 = NodeId::from("pkg1");
    let (first, second) = tokio::join!(explorer.expand(&pkg1), explorer.expand(&pkg1));
    let outcomes = [first.unwrap(), second.unwrap()];
    assert!(outcomes.contains(&ExpandOutcome::InProgress));
    assert_eq!(explorer.node_count().await, 4);

    let removed = explorer.collapse(&pkg1).await.unwrap();
    assert_eq!(removed, 2);

    match explorer.expand(&pkg1).await.unwrap() {
        ExpandOutcome::Expanded { children, source } => {
            assert_eq!(source, ExpandSource::Cache);
            assert_eq!(children, vec![NodeId::from("cls1"), NodeId::from("fn1")]);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    // wiremock verifies the single expand call on drop
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let server = graph_service().await;
    mount_pkg1_expansion(&server, 1).await;
    let cache_dir = TempDir::new().unwrap();
    let pkg1 = NodeId::from("pkg1");

    let first = explorer_for(&server, &cache_dir);
    first.load_root().await.unwrap();
    first.expand(&pkg1).await.unwrap();
    drop(first);

    let second = explorer_for(&server, &cache_dir);
    second.load_root().await.unwrap();
    let outcome = second.expand(&pkg1).await.unwrap();
    assert!(matches!(
        outcome,
        ExpandOutcome::Expanded {
            source: ExpandSource::Cache,
            ..
        }
    ));
}

#[tokio::test]
async fn test_focus_builds_breadcrumbs_from_ancestors() {
    let server = graph_service().await;
    mount_pkg1_expansion(&server, 1).await;
    let cache_dir = TempDir::new().unwrap();
    let explorer = explorer_for(&server, &cache_dir);
    explorer.load_root().await.unwrap();

    let crumbs = explorer.focus_node(&"fn9".into()).await.unwrap();
    let names: Vec<&str> = crumbs.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["pkg1", "User", "fn9"]);
    assert_eq!(explorer.selected().await, Some(NodeId::from("fn9")));
}

#[tokio::test]
async fn test_remote_failure_is_reported() {
    let server = graph_service().await;
    Mock::given(method("GET"))
        .and(path("/api/graph/expand/pkg1"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({"detail": "graph database unavailable"})),
        )
        .mount(&server)
        .await;
    let cache_dir = TempDir::new().unwrap();
    let explorer = explorer_for(&server, &cache_dir);
    explorer.load_root().await.unwrap();

    let err = explorer.expand(&"pkg1".into()).await.unwrap_err();
    match &err {
        ExploreError::Remote(remote) => assert_eq!(remote.status, 503),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(
        explorer.last_error().await.as_deref(),
        Some("Graph service error 503: graph database unavailable")
    );
    assert!(!explorer.contains(&"cls1".into()).await);
}

#[tokio::test]
async fn test_graph_updated_resets_explorer() {
    let server = graph_service().await;
    mount_pkg1_expansion(&server, 2).await;
    let cache_dir = TempDir::new().unwrap();
    let explorer = explorer_for(&server, &cache_dir);
    explorer.load_root().await.unwrap();
    explorer.expand(&"pkg1".into()).await.unwrap();
    explorer.expand(&"mod1".into()).await.unwrap();

    let listener = InvalidationListener::new(Arc::clone(&explorer) as Arc<dyn InvalidationTarget>);
    let dispatch = listener
        .handle_text(r#"{"type":"node_updated","data":{"node_id":"cls1"}}"#)
        .await;
    assert_eq!(dispatch, Dispatch::Stale("cls1".into()));
    assert!(explorer.contains(&"cls1".into()).await);

    let dispatch = listener
        .handle_text(r#"{"type":"graph_updated","added_count":1,"modified_count":0,"removed_count":0,"affected_modules":["app"]}"#)
        .await;
    assert_eq!(dispatch, Dispatch::Reset);
    assert_eq!(explorer.node_count().await, 2);
    assert!(explorer.stale_nodes().await.is_empty());

    // the durable cache was cleared too, so this goes back to the service
    let outcome = explorer.expand(&"pkg1".into()).await.unwrap();
    assert!(matches!(
        outcome,
        ExpandOutcome::Expanded {
            source: ExpandSource::Remote,
            ..
        }
    ));
}

#[tokio::test]
async fn test_server_drives_explorer() {
    let server = graph_service().await;
    mount_pkg1_expansion(&server, 1).await;
    let cache_dir = TempDir::new().unwrap();
    let explorer = explorer_for(&server, &cache_dir);
    explorer.load_root().await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(GroveServer::new(Arc::clone(&explorer), ServerConfig::default()).serve(listener));
    let client = reqwest::Client::new();

    let expanded: serde_json::Value = client
        .post(format!("http://{}/api/node/pkg1/expand", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(expanded["outcome"], "expanded");
    assert_eq!(expanded["source"], "remote");

    let view: serde_json::Value = client
        .get(format!("http://{}/api/view", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["expanded"], json!(["pkg1"]));
    assert_eq!(view["nodes"].as_array().unwrap().len(), 4);
}

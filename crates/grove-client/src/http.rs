//! HTTP graph source talking to the remote graph service

use std::time::Duration;

use async_trait::async_trait;
use grove_core::{Expansion, Node, NodeId, RemoteError, SearchQuery, SearchResult};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::source::GraphSource;

/// Connection settings for the remote graph service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpSourceConfig {
    /// Base URL the `/graph` and `/search` routes hang off.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RootResponse {
    nodes: Vec<Node>,
}

#[derive(Debug, Deserialize)]
struct ChildrenResponse {
    children: Vec<Node>,
}

#[derive(Debug, Deserialize)]
struct AncestorsResponse {
    ancestors: Vec<Node>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

/// Error body produced by the graph service.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// [`GraphSource`] backed by the graph service's REST API.
#[derive(Debug, Clone)]
pub struct HttpGraphSource {
    client: Client,
    base_url: Url,
}

impl HttpGraphSource {
    pub fn new(config: &HttpSourceConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemoteError::transport(format!("cannot build HTTP client: {}", e)))?;
        Self::with_client(client, &config.base_url)
    }

    /// Use a preconfigured `reqwest::Client`.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::transport(format!("invalid base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::transport(format!(
                "base URL cannot carry paths: {}",
                base_url
            )));
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL. Segments are percent-encoded, so ids may contain `/` or `:`.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_detail(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            return Err(RemoteError::new(status.as_u16(), message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::transport(format!("invalid response body: {}", e)))
    }
}

/// Pull the human-readable message out of an error body, if there is one.
fn error_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl GraphSource for HttpGraphSource {
    async fn root(&self) -> Result<Vec<Node>, RemoteError> {
        let url = self.endpoint(&["graph", "root"]);
        let response: RootResponse = self.get_json(url, &[]).await?;
        Ok(response.nodes)
    }

    async fn expand(&self, id: &NodeId) -> Result<Expansion, RemoteError> {
        let url = self.endpoint(&["graph", "expand", id.as_str()]);
        self.get_json(url, &[]).await
    }

    async fn children(&self, id: &NodeId, limit: u32) -> Result<Vec<Node>, RemoteError> {
        let url = self.endpoint(&["graph", "node", id.as_str(), "children"]);
        let response: ChildrenResponse = self.get_json(url, &[("limit", limit.to_string())]).await?;
        Ok(response.children)
    }

    async fn node(&self, id: &NodeId) -> Result<Node, RemoteError> {
        let url = self.endpoint(&["graph", "node", id.as_str()]);
        self.get_json(url, &[]).await
    }

    async fn ancestors(&self, id: &NodeId) -> Result<Vec<Node>, RemoteError> {
        let url = self.endpoint(&["graph", "node", id.as_str(), "ancestors"]);
        let response: AncestorsResponse = self.get_json(url, &[]).await?;
        Ok(response.ancestors)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, RemoteError> {
        let url = self.endpoint(&["search"]);
        let mut params = vec![("q", query.text.clone()), ("limit", query.limit.to_string())];
        if let Some(kind) = query.type_filter {
            params.push(("type_filter", kind.as_str().to_string()));
        }
        let response: SearchResponse = self.get_json(url, &params).await?;
        Ok(response.results)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::{EdgeKind, NodeKind};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, HttpGraphSource) {
        let server = MockServer::start().await;
        let config = HttpSourceConfig {
            base_url: format!("{}/api", server.uri()),
            timeout_secs: 5,
        };
        let source = HttpGraphSource::new(&config).unwrap();
        (server, source)
    }

    #[tokio::test]
    async fn test_root_nodes() {
        let (server, source) = setup().await;

        Mock::given(method("GET"))
            .and(path("/api/graph/root"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nodes": [
                    {"id": "pkg1", "name": "pkg1", "type": "package", "child_count": 3},
                    {"id": "mod1", "name": "mod1", "type": "module", "child_count": 5}
                ],
                "total": 2
            })))
            .mount(&server)
            .await;

        let roots = source.root().await.unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].kind, NodeKind::Package);
        assert_eq!(roots[1].child_count, 5);
    }

    #[tokio::test]
    async fn test_expand_returns_children_and_outgoing() {
        let (server, source) = setup().await;

        Mock::given(method("GET"))
            .and(path("/api/graph/expand/pkg1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "children": [
                    {"id": "cls1", "name": "cls1", "type": "class", "child_count": 1}
                ],
                "outgoing": [
                    {"id": "mod1", "name": "mod1", "type": "module", "edgeType": "IMPORTS"}
                ]
            })))
            .mount(&server)
            .await;

        let expansion = source.expand(&"pkg1".into()).await.unwrap();
        assert_eq!(expansion.children[0].id, NodeId::from("cls1"));
        assert_eq!(expansion.outgoing[0].edge_type, EdgeKind::Imports);
    }

    #[tokio::test]
    async fn test_children_sends_limit() {
        let (server, source) = setup().await;

        Mock::given(method("GET"))
            .and(path("/api/graph/node/pkg1/children"))
            .and(query_param("limit", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "parent_id": "pkg1",
                "children": [{"id": "fn1", "name": "fn1", "type": "function"}],
                "total": 1
            })))
            .mount(&server)
            .await;

        let children = source.children(&"pkg1".into(), 25).await.unwrap();
        assert_eq!(children.len(), 1);
        assert!(children[0].is_leaf());
    }

    #[tokio::test]
    async fn test_ids_are_percent_encoded() {
        let (server, source) = setup().await;

        Mock::given(method("GET"))
            .and(path("/api/graph/node/app%2Fmodels.py::User/ancestors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "node_id": "app/models.py::User",
                "ancestors": [{"id": "app", "name": "app", "type": "package"}]
            })))
            .mount(&server)
            .await;

        let ancestors = source
            .ancestors(&"app/models.py::User".into())
            .await
            .unwrap();
        assert_eq!(ancestors.len(), 1);
    }

    #[tokio::test]
    async fn test_search_with_type_filter() {
        let (server, source) = setup().await;

        Mock::given(method("GET"))
            .and(path("/api/search"))
            .and(query_param("q", "user"))
            .and(query_param("limit", "10"))
            .and(query_param("type_filter", "class"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": "user",
                "results": [
                    {"id": "cls:User", "name": "User", "type": "class", "score": 3.5}
                ],
                "total": 1
            })))
            .mount(&server)
            .await;

        let query = SearchQuery::new("user")
            .with_limit(10)
            .with_type_filter(Some(NodeKind::Class));
        let results = source.search(&query).await.unwrap();
        assert_eq!(results[0].name, "User");
        assert_eq!(results[0].score, 3.5);
    }

    #[tokio::test]
    async fn test_error_status_and_detail_are_surfaced() {
        let (server, source) = setup().await;

        Mock::given(method("GET"))
            .and(path("/api/graph/node/ghost"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"detail": "Node not found"})),
            )
            .mount(&server)
            .await;

        let err = source.node(&"ghost".into()).await.unwrap_err();
        assert_eq!(err.status, 404);
        assert_eq!(err.message, "Node not found");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_a_transport_error() {
        let source = HttpGraphSource::new(&HttpSourceConfig {
            base_url: "http://127.0.0.1:9/api".to_string(),
            timeout_secs: 1,
        })
        .unwrap();

        let err = source.root().await.unwrap_err();
        assert_eq!(err.status, 0);
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let result = HttpGraphSource::new(&HttpSourceConfig {
            base_url: "not a url".to_string(),
            timeout_secs: 1,
        });
        assert!(result.is_err());
    }
}

//! CLI command implementations

use std::sync::Arc;

use anyhow::Context;
use grove_cache::{CacheStore, SqliteCache};
use grove_client::{GraphSource, HttpGraphSource};
use grove_core::{Node, NodeId, NodeKind, SearchQuery};
use grove_explorer::{Breadcrumb, Explorer};
use grove_live::{InvalidationListener, InvalidationTarget};
use grove_server::GroveServer;
use tokio::sync::watch;

use crate::config::GroveConfig;

fn open_cache(config: &GroveConfig) -> anyhow::Result<SqliteCache> {
    SqliteCache::open(&config.cache.path, config.cache.ttl())
        .with_context(|| format!("cannot open cache at {}", config.cache.path.display()))
}

/// Wire the HTTP source and the durable cache into an explorer.
pub fn build_explorer(config: &GroveConfig) -> anyhow::Result<Arc<Explorer>> {
    let source = HttpGraphSource::new(&config.remote.http())
        .with_context(|| format!("cannot use graph service at {}", config.remote.base_url))?;
    let cache = open_cache(config)?;

    Ok(Arc::new(Explorer::new(
        Arc::new(source) as Arc<dyn GraphSource>,
        Arc::new(cache) as Arc<dyn CacheStore>,
        config.explorer.clone(),
    )))
}

pub async fn serve(config: GroveConfig, open_browser: bool) -> anyhow::Result<()> {
    tracing::info!("Using graph service at {}", config.remote.base_url);
    let explorer = build_explorer(&config)?;

    // the server still comes up so the UI can show the failure and retry via refresh
    match explorer.load_root().await {
        Ok(roots) => tracing::info!("Loaded {} root nodes", roots.len()),
        Err(e) => tracing::warn!("Initial root load failed: {}", e.user_message()),
    }

    let _sweeper = explorer.spawn_cache_sweeper(config.cache.sweep_interval());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Some(url) = config.live.url.clone() {
        let listener =
            InvalidationListener::new(Arc::clone(&explorer) as Arc<dyn InvalidationTarget>);
        let ping_interval = config.live.ping_interval();
        let reconnect_delay = config.live.reconnect_delay();
        tokio::spawn(async move {
            listener
                .run(&url, ping_interval, reconnect_delay, shutdown_rx)
                .await;
        });
    } else {
        tracing::info!("No live channel configured, invalidation disabled");
    }

    if open_browser {
        let url = format!("http://{}", config.server.address());
        if let Err(e) = open::that(&url) {
            tracing::warn!("Cannot open browser at {}: {}", url, e);
        }
    }

    let server = GroveServer::new(explorer, config.server.clone());
    let result = server.start().await;
    let _ = shutdown_tx.send(true);
    result
}

pub async fn roots(config: GroveConfig) -> anyhow::Result<()> {
    let explorer = build_explorer(&config)?;
    let roots = explorer.load_root().await.map_err(user_error)?;
    for node in &roots {
        print_node(node);
    }
    tracing::info!("{} root nodes", roots.len());
    Ok(())
}

pub async fn expand(config: GroveConfig, id: String) -> anyhow::Result<()> {
    let explorer = build_explorer(&config)?;
    let id = NodeId::from(id);

    explorer.load_root().await.map_err(user_error)?;
    if !explorer.contains(&id).await {
        explorer.focus_node(&id).await.map_err(user_error)?;
    }
    let outcome = explorer.expand(&id).await.map_err(user_error)?;
    tracing::debug!("Expand {}: {:?}", id, outcome);

    for child in explorer.children_of(&id).await {
        print_node(&child);
    }
    Ok(())
}

pub async fn focus(config: GroveConfig, id: String) -> anyhow::Result<()> {
    let explorer = build_explorer(&config)?;
    explorer.load_root().await.map_err(user_error)?;
    let breadcrumbs = explorer
        .focus_node(&NodeId::from(id))
        .await
        .map_err(user_error)?;
    println!("{}", format_breadcrumbs(&breadcrumbs));
    Ok(())
}

pub async fn search(
    config: GroveConfig,
    text: String,
    limit: Option<u32>,
    kind: Option<String>,
) -> anyhow::Result<()> {
    let explorer = build_explorer(&config)?;
    let query = SearchQuery::new(text)
        .with_limit(limit.unwrap_or(config.remote.search_limit))
        .with_type_filter(kind.as_deref().map(NodeKind::parse));

    let results = explorer.search(&query).await.map_err(user_error)?;
    for hit in &results {
        println!(
            "{:<10} {:<40} {:.2}  {}",
            hit.kind,
            hit.name,
            hit.score,
            hit.qualified_name.as_deref().unwrap_or(hit.id.as_str())
        );
    }
    tracing::info!("{} results for {:?}", results.len(), query.text);
    Ok(())
}

pub async fn clear_cache(config: GroveConfig) -> anyhow::Result<()> {
    tracing::info!("Clearing cache at {}", config.cache.path.display());
    let cache = open_cache(&config)?;
    cache.clear().await.context("cannot clear cache")?;
    tracing::info!("Cache cleared");
    Ok(())
}

fn user_error(e: grove_core::ExploreError) -> anyhow::Error {
    anyhow::anyhow!(e.user_message())
}

fn print_node(node: &Node) {
    let marker = if node.child_count > 0 { "+" } else { " " };
    println!(
        "{} {:<10} {:<40} {}",
        marker, node.kind, node.name, node.id
    );
}

fn format_breadcrumbs(breadcrumbs: &[Breadcrumb]) -> String {
    breadcrumbs
        .iter()
        .map(|crumb| crumb.name.as_str())
        .collect::<Vec<_>>()
        .join(" > ")
}

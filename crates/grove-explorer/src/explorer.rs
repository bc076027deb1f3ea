//! The expansion state machine

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use grove_cache::CacheStore;
use grove_client::{Gateway, GraphSource};
use grove_core::{
    Edge, EdgeKind, ExploreError, Expansion, Node, NodeId, RemoteError, SearchQuery,
    SearchResult,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock, RwLockReadGuard, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::ExplorerEvent;
use crate::expansion::ExpansionState;
use crate::view::{ViewSnapshot, ViewState};

/// Which remote call resolves a cache miss during expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandMode {
    /// Children plus outgoing references.
    #[default]
    References,
    /// Plain child enumeration, capped at `children_limit`.
    Children,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub expand_mode: ExpandMode,
    pub children_limit: u32,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        ExplorerConfig {
            expand_mode: ExpandMode::References,
            children_limit: 100,
        }
    }
}

/// Where an expansion's children came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandSource {
    Cache,
    Remote,
}

/// Result of an [`Explorer::expand`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExpandOutcome {
    /// Children were materialised in enumeration order.
    Expanded {
        children: Vec<NodeId>,
        source: ExpandSource,
    },
    AlreadyExpanded,
    /// Another call is expanding this node; nothing was done.
    InProgress,
    /// The node has no children and never enters the expanding state.
    Leaf,
    /// The node was collapsed away or reset while its fetch was outstanding. The
    /// children were cached but not applied.
    Superseded,
}

/// Result of an [`Explorer::toggle`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToggleOutcome {
    Expanded { outcome: ExpandOutcome },
    Collapsed { removed: usize },
}

const EVENT_CAPACITY: usize = 256;

/// Single owner of the node registry, the expansion record and the navigation state.
///
/// Registry mutations happen only while the state lock is held and never across a
/// suspension point. Remote work (expansions, root loads, node lookups, ancestor fetches)
/// holds the read side of `gate` until its result is written back; a reset takes the
/// write side, so it waits for that work to settle and keeps new work out until the
/// roots are reloaded.
///
/// An expansion runs on its own task once it has a ticket. Dropping the caller's future
/// does not strand the node in the expanding state.
pub struct Explorer {
    pub(crate) gateway: Arc<Gateway>,
    pub(crate) cache: Arc<dyn CacheStore>,
    pub(crate) config: ExplorerConfig,
    pub(crate) state: Arc<RwLock<ViewState>>,
    pub(crate) gate: Arc<RwLock<()>>,
    /// Woken each time an expansion settles.
    pub(crate) settled: Arc<Notify>,
    pub(crate) events: broadcast::Sender<ExplorerEvent>,
}

impl std::fmt::Debug for Explorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Explorer")
            .field("gateway", &self.gateway)
            .field("config", &self.config)
            .finish()
    }
}

impl Explorer {
    pub fn new(
        source: Arc<dyn GraphSource>,
        cache: Arc<dyn CacheStore>,
        config: ExplorerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Explorer {
            gateway: Arc::new(Gateway::new(source)),
            cache,
            config,
            state: Arc::new(RwLock::new(ViewState::default())),
            gate: Arc::new(RwLock::new(())),
            settled: Arc::new(Notify::new()),
            events,
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExplorerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ExplorerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    // ── Root load & reset ──────────────────────────────────────

    /// Fetch the top-level nodes, register them and cache each one.
    pub async fn load_root(&self) -> Result<Vec<Node>, ExploreError> {
        let _gate = self.gate.read().await;
        self.reload_roots().await
    }

    /// Root load for a caller that already holds the gate.
    async fn reload_roots(&self) -> Result<Vec<Node>, ExploreError> {
        let roots = match self.gateway.fetch_root().await {
            Ok(roots) => roots,
            Err(e) => {
                warn!("Root load failed: {}", e);
                return Err(self.record_failure(ExploreError::Remote(e)).await);
            }
        };

        {
            let mut state = self.state.write().await;
            for root in &roots {
                state.registry.insert_root(root.clone());
            }
        }
        for root in &roots {
            if let Err(e) = self.cache.set_node(root).await {
                warn!("Failed to cache root {}: {}", root.id, e);
            }
        }

        info!("Loaded {} root nodes", roots.len());
        self.emit(ExplorerEvent::RootsLoaded { count: roots.len() });
        Ok(roots)
    }

    /// Full reset: wait for in-flight expansions, clear registry, expansion record,
    /// navigation state and the persistent cache, then reload the roots.
    pub async fn refresh(&self) -> Result<Vec<Node>, ExploreError> {
        let _gate = self.gate.write().await;
        info!("Resetting explorer state");

        self.state.write().await.reset();
        if let Err(e) = self.cache.clear().await {
            warn!("Failed to clear node cache during reset: {}", e);
        }
        self.emit(ExplorerEvent::Reset);

        self.reload_roots().await
    }

    // ── Expansion ──────────────────────────────────────────────

    /// Reveal the direct children of a node.
    ///
    /// Returns without side effects if the node is already expanded or expanding. On a
    /// fetch failure the node goes back to collapsed and the error is returned.
    pub async fn expand(&self, id: &NodeId) -> Result<ExpandOutcome, ExploreError> {
        let gate = Arc::clone(&self.gate).read_owned().await;

        let ticket = {
            let mut state = self.state.write().await;
            let Some(node) = state.registry.get(id) else {
                return Err(ExploreError::NotFound(id.clone()));
            };
            if node.is_leaf() {
                return Ok(ExpandOutcome::Leaf);
            }
            match state.expansion.begin(id) {
                Ok(ticket) => ticket,
                Err(ExpansionState::Expanded) => return Ok(ExpandOutcome::AlreadyExpanded),
                Err(_) => {
                    debug!("Expansion of {} already in progress", id);
                    return Ok(ExpandOutcome::InProgress);
                }
            }
        };

        debug!("Expanding {}", id);
        let task = self.expand_task();
        let owned = id.clone();
        let handle = tokio::spawn(async move {
            let outcome = task.run(&owned, ticket).await;
            drop(gate);
            outcome
        });

        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Expansion task for {} died: {}", id, e);
                self.state.write().await.expansion.revert(id, ticket);
                self.settled.notify_waiters();
                let error = ExploreError::Remote(RemoteError::transport(format!(
                    "expansion of {} did not finish",
                    id
                )));
                Err(self.record_failure(error).await)
            }
        }
    }

    fn expand_task(&self) -> ExpandTask {
        ExpandTask {
            gateway: Arc::clone(&self.gateway),
            cache: Arc::clone(&self.cache),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            settled: Arc::clone(&self.settled),
            events: self.events.clone(),
        }
    }

    /// Expand and, if another call already has the node in flight, wait for it to settle.
    pub(crate) async fn expand_settled(&self, id: &NodeId) -> Result<ExpandOutcome, ExploreError> {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.expand(id).await? {
                ExpandOutcome::InProgress => notified.await,
                outcome => return Ok(outcome),
            }
        }
    }

    /// Hide every descendant of an expanded node. Returns how many nodes were removed.
    /// A node that is not expanded is left alone.
    pub async fn collapse(&self, id: &NodeId) -> Result<usize, ExploreError> {
        let _gate = self.gate.read().await;

        let (removed, selection_cleared) = {
            let mut state = self.state.write().await;
            if !state.registry.contains(id) {
                return Err(ExploreError::NotFound(id.clone()));
            }
            if state.expansion.state(id) != ExpansionState::Expanded {
                return Ok(0);
            }

            let descendants = state.registry.descendants(id);
            let mut owners: HashSet<NodeId> = descendants.iter().cloned().collect();
            owners.insert(id.clone());
            let stubs = state.registry.stubs_owned_by(&owners);

            let mut removed = 0;
            for gone in descendants.iter().chain(stubs.iter()) {
                if state.registry.remove(gone).is_some() {
                    removed += 1;
                }
                state.expansion.forget(gone);
            }
            state.registry.remove_edges_from(id);
            state.expansion.collapse(id);
            state.registry.set_expanded(id, false);

            let selection_cleared = state
                .selected
                .as_ref()
                .is_some_and(|selected| !state.registry.contains(selected));
            if selection_cleared {
                state.selected = None;
                state.breadcrumbs.clear();
            }
            (removed, selection_cleared)
        };

        info!("Collapsed {} ({} nodes removed)", id, removed);
        self.emit(ExplorerEvent::Collapsed {
            node_id: id.clone(),
            removed,
        });
        if selection_cleared {
            self.emit(ExplorerEvent::SelectionChanged {
                node_id: None,
                breadcrumbs: Vec::new(),
            });
        }
        Ok(removed)
    }

    /// Collapse an expanded node, expand anything else.
    pub async fn toggle(&self, id: &NodeId) -> Result<ToggleOutcome, ExploreError> {
        if self.expansion_state(id).await == ExpansionState::Expanded {
            let removed = self.collapse(id).await?;
            Ok(ToggleOutcome::Collapsed { removed })
        } else {
            let outcome = self.expand(id).await?;
            Ok(ToggleOutcome::Expanded { outcome })
        }
    }

    // ── Lookups ────────────────────────────────────────────────

    /// Full record of a node: registry, then cache, then the remote service.
    pub async fn node_details(&self, id: &NodeId) -> Result<Node, ExploreError> {
        let _gate = self.gate.read().await;
        if let Some(node) = self.state.read().await.registry.get(id) {
            return Ok(node.clone());
        }
        match self.cache.get_node(id).await {
            Ok(Some(node)) => return Ok(node),
            Ok(None) => {}
            Err(e) => warn!("Cache read failed for node {}: {}", id, e),
        }

        let node = self.gateway.fetch_node(id).await.map_err(|e| {
            if e.is_not_found() {
                ExploreError::NotFound(id.clone())
            } else {
                ExploreError::Remote(e)
            }
        })?;
        if let Err(e) = self.cache.set_node(&node).await {
            warn!("Failed to cache node {}: {}", id, e);
        }
        Ok(node)
    }

    /// Search the remote graph. Results are not added to the registry.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, ExploreError> {
        self.gateway.fetch_search(query).await.map_err(|e| {
            warn!("Search for {:?} failed: {}", query.text, e);
            ExploreError::Remote(e)
        })
    }

    /// Record that a node's data may be out of date. Its cache entry is left alone.
    pub async fn note_stale(&self, id: &NodeId) {
        let inserted = self.state.write().await.stale.insert(id.clone());
        if inserted {
            debug!("Node {} marked stale", id);
            self.emit(ExplorerEvent::NodeStale { node_id: id.clone() });
        }
    }

    pub async fn stale_nodes(&self) -> Vec<NodeId> {
        self.state.read().await.stale.iter().cloned().collect()
    }

    pub async fn expansion_state(&self, id: &NodeId) -> ExpansionState {
        self.state.read().await.expansion.state(id)
    }

    pub async fn contains(&self, id: &NodeId) -> bool {
        self.state.read().await.registry.contains(id)
    }

    pub async fn node_count(&self) -> usize {
        self.state.read().await.registry.node_count()
    }

    pub async fn edge_count(&self) -> usize {
        self.state.read().await.registry.edge_count()
    }

    /// Direct children of a node currently in the registry.
    pub async fn children_of(&self, id: &NodeId) -> Vec<Node> {
        let state = self.state.read().await;
        state
            .registry
            .children(id)
            .iter()
            .filter_map(|child| state.registry.get(child).cloned())
            .collect()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        self.state.read().await.snapshot()
    }

    /// Read access for callers that need several consistent lookups.
    pub(crate) async fn read_state(&self) -> RwLockReadGuard<'_, ViewState> {
        self.state.read().await
    }

    pub(crate) async fn record_failure(&self, error: ExploreError) -> ExploreError {
        self.state.write().await.last_error = Some(error.user_message());
        error
    }

    /// Periodically reclaim expired cache records.
    pub fn spawn_cache_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.sweep_expired().await {
                    Ok(0) => {}
                    Ok(n) => debug!("Swept {} expired cache records", n),
                    Err(e) => warn!("Cache sweep failed: {}", e),
                }
            }
        })
    }
}

/// One expansion from ticket to settlement, detached from the caller that started it.
struct ExpandTask {
    gateway: Arc<Gateway>,
    cache: Arc<dyn CacheStore>,
    config: ExplorerConfig,
    state: Arc<RwLock<ViewState>>,
    settled: Arc<Notify>,
    events: broadcast::Sender<ExplorerEvent>,
}

impl ExpandTask {
    async fn run(&self, id: &NodeId, ticket: u64) -> Result<ExpandOutcome, ExploreError> {
        let resolved = self.resolve_children(id).await;

        let outcome = {
            let mut state = self.state.write().await;
            apply_expansion(&mut state, id, ticket, resolved)
        };
        self.settled.notify_waiters();

        match &outcome {
            Ok(ExpandOutcome::Expanded { children, source }) => {
                info!("Expanded {} ({} children from {:?})", id, children.len(), source);
                let _ = self.events.send(ExplorerEvent::Expanded {
                    node_id: id.clone(),
                    children: children.len(),
                    source: *source,
                });
            }
            Ok(ExpandOutcome::Superseded) => {
                debug!("Expansion of {} superseded before it settled", id);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Expansion of {} failed: {}", id, e);
                let _ = self.events.send(ExplorerEvent::ExpandFailed {
                    node_id: id.clone(),
                    message: e.user_message(),
                });
            }
        }
        outcome
    }

    /// Cache first, remote on a miss. A remote result is written back to the cache.
    async fn resolve_children(
        &self,
        id: &NodeId,
    ) -> Result<(Expansion, ExpandSource), RemoteError> {
        match self.cache.get_children(id).await {
            Ok(Some(children)) => {
                debug!("Cache hit for children of {} ({} entries)", id, children.len());
                let outgoing = match self.cache.get_references(id).await {
                    Ok(references) => references.unwrap_or_default(),
                    Err(e) => {
                        warn!("Cache read failed for references of {}: {}", id, e);
                        Vec::new()
                    }
                };
                return Ok((Expansion { children, outgoing }, ExpandSource::Cache));
            }
            Ok(None) => debug!("Cache miss for children of {}", id),
            Err(e) => warn!("Cache read failed for {}, falling back to remote: {}", id, e),
        }

        let mut expansion = match self.config.expand_mode {
            ExpandMode::References => self.gateway.fetch_children(id).await?,
            ExpandMode::Children => Expansion::children_only(
                self.gateway
                    .fetch_child_list(id, self.config.children_limit)
                    .await?,
            ),
        };
        for child in &mut expansion.children {
            child.parent_id = Some(id.clone());
        }
        if let Err(e) = self.cache.set_children(id, &expansion.children).await {
            warn!("Failed to cache children of {}: {}", id, e);
        }
        if let Err(e) = self.cache.set_references(id, &expansion.outgoing).await {
            warn!("Failed to cache references of {}: {}", id, e);
        }
        Ok((expansion, ExpandSource::Remote))
    }
}

/// Apply a settled fetch to the view. Runs under the state lock.
fn apply_expansion(
    state: &mut ViewState,
    id: &NodeId,
    ticket: u64,
    resolved: Result<(Expansion, ExpandSource), RemoteError>,
) -> Result<ExpandOutcome, ExploreError> {
    let (expansion, source) = match resolved {
        Ok(resolved) => resolved,
        Err(e) => {
            state.expansion.revert(id, ticket);
            let error = ExploreError::Remote(e);
            state.last_error = Some(error.user_message());
            return Err(error);
        }
    };

    if !state.registry.contains(id) || !state.expansion.is_current(id, ticket) {
        return Ok(ExpandOutcome::Superseded);
    }

    let mut children = Vec::with_capacity(expansion.children.len());
    for mut child in expansion.children {
        child.parent_id = Some(id.clone());
        let child_id = child.id.clone();
        state.registry.materialize(child);
        state
            .registry
            .add_edge(Edge::new(id.clone(), child_id.clone(), EdgeKind::Contains));
        children.push(child_id);
    }

    for reference in expansion.outgoing {
        if reference.edge_type.is_hierarchical() {
            debug!("Ignoring hierarchical reference {} from {}", reference.id, id);
            continue;
        }
        let source_id = reference.source.unwrap_or_else(|| id.clone());
        if !state.registry.contains(&source_id) {
            debug!("Skipping reference from unknown node {}", source_id);
            continue;
        }
        if !state.registry.contains(&reference.id) {
            let stub = Node::stub(reference.id.clone(), reference.name, reference.kind);
            state.registry.insert_stub(stub, id);
        }
        state
            .registry
            .add_edge(Edge::new(source_id, reference.id, reference.edge_type));
    }

    state.expansion.complete(id, ticket);
    state.registry.set_expanded(id, true);
    state.last_error = None;

    Ok(ExpandOutcome::Expanded { children, source })
}

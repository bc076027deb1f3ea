//! Selection, breadcrumbs and focus-on-node

use grove_core::{ExploreError, NodeId, NodeKind};
use serde::Serialize;
use tracing::{debug, info};

use crate::events::ExplorerEvent;
use crate::explorer::{ExpandOutcome, Explorer};
use crate::view::ViewState;

/// One step of the root -> node chain shown above the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
}

/// Breadcrumb chain of `id` from its parent links, root first and `id` last.
fn breadcrumbs_for(state: &ViewState, id: &NodeId) -> Vec<Breadcrumb> {
    state
        .registry
        .ancestry(id)
        .into_iter()
        .filter_map(|step| {
            state.registry.get(&step).map(|node| Breadcrumb {
                id: node.id.clone(),
                name: node.name.clone(),
                kind: node.kind,
            })
        })
        .collect()
}

impl Explorer {
    /// Record the selection and derive its breadcrumb chain. `None` clears both.
    ///
    /// Selecting an id that is not in the registry fails and keeps the previous selection.
    pub async fn select_node(&self, id: Option<&NodeId>) -> Result<Vec<Breadcrumb>, ExploreError> {
        let breadcrumbs = {
            let mut state = self.state.write().await;
            let breadcrumbs = match id {
                Some(id) if !state.registry.contains(id) => {
                    return Err(ExploreError::NotFound(id.clone()));
                }
                Some(id) => breadcrumbs_for(&state, id),
                None => Vec::new(),
            };
            state.selected = id.cloned();
            state.breadcrumbs = breadcrumbs.clone();
            breadcrumbs
        };

        debug!("Selected {:?} ({} breadcrumbs)", id, breadcrumbs.len());
        self.emit(ExplorerEvent::SelectionChanged {
            node_id: id.cloned(),
            breadcrumbs: breadcrumbs.clone(),
        });
        Ok(breadcrumbs)
    }

    pub async fn selected(&self) -> Option<NodeId> {
        self.read_state().await.selected.clone()
    }

    pub async fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.read_state().await.breadcrumbs.clone()
    }

    /// Reveal a node anywhere in the graph and select it.
    ///
    /// A node already in the registry is selected directly. Otherwise its ancestors are
    /// fetched and expanded root first, each one settling before the next.
    pub async fn focus_node(&self, id: &NodeId) -> Result<Vec<Breadcrumb>, ExploreError> {
        if self.contains(id).await {
            return self.select_node(Some(id)).await;
        }

        let ancestors = {
            // released before expanding, which takes the gate itself
            let _gate = self.gate.read().await;
            let ancestors = match self.gateway.fetch_ancestors(id).await {
                Ok(ancestors) => ancestors,
                Err(e) if e.is_not_found() => return Err(ExploreError::NotFound(id.clone())),
                Err(e) => return Err(self.record_failure(ExploreError::Remote(e)).await),
            };
            if let Some(first) = ancestors.first() {
                let mut state = self.state.write().await;
                if !state.registry.contains(&first.id) {
                    debug!("Registering ancestor {} as a root", first.id);
                    state.registry.insert_root(first.clone());
                }
            }
            ancestors
        };
        info!("Focusing {} through {} ancestors", id, ancestors.len());

        for ancestor in &ancestors {
            match self.expand_settled(&ancestor.id).await? {
                ExpandOutcome::Superseded => {
                    debug!("Ancestor {} was removed while focusing {}", ancestor.id, id)
                }
                outcome => debug!("Ancestor {}: {:?}", ancestor.id, outcome),
            }
        }

        if !self.contains(id).await {
            return Err(ExploreError::NotFound(id.clone()));
        }
        self.select_node(Some(id)).await
    }
}

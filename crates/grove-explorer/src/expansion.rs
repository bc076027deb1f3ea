//! Per-node expansion lifecycle

use std::collections::{HashMap, HashSet};

use grove_core::NodeId;
use serde::Serialize;

/// Where a node is in its expansion lifecycle. Ids that are not tracked are `Collapsed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionState {
    Collapsed,
    Expanding,
    Expanded,
}

/// Tracks which ids are expanding and which are expanded. An id is in at most one of the
/// two sets.
///
/// Every expansion gets a ticket when it begins. Only the holder of the current ticket may
/// complete or revert that expansion, so a fetch that outlived a collapse or reset cannot
/// touch a newer expansion of the same id.
#[derive(Debug, Default)]
pub struct ExpansionRecord {
    expanding: HashMap<NodeId, u64>,
    expanded: HashSet<NodeId>,
    next_ticket: u64,
}

impl ExpansionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: &NodeId) -> ExpansionState {
        if self.expanded.contains(id) {
            ExpansionState::Expanded
        } else if self.expanding.contains_key(id) {
            ExpansionState::Expanding
        } else {
            ExpansionState::Collapsed
        }
    }

    /// Move a collapsed id to expanding and hand out its ticket. Any other id is left
    /// as is and its state comes back as the error.
    pub fn begin(&mut self, id: &NodeId) -> Result<u64, ExpansionState> {
        match self.state(id) {
            ExpansionState::Collapsed => {
                self.next_ticket += 1;
                self.expanding.insert(id.clone(), self.next_ticket);
                Ok(self.next_ticket)
            }
            current => Err(current),
        }
    }

    /// Whether `ticket` still identifies the outstanding expansion of `id`.
    pub fn is_current(&self, id: &NodeId, ticket: u64) -> bool {
        self.expanding.get(id) == Some(&ticket)
    }

    /// Expanding -> Expanded.
    pub fn complete(&mut self, id: &NodeId, ticket: u64) -> bool {
        if !self.is_current(id, ticket) {
            return false;
        }
        self.expanding.remove(id);
        self.expanded.insert(id.clone());
        true
    }

    /// Expanding -> Collapsed after a failed fetch.
    pub fn revert(&mut self, id: &NodeId, ticket: u64) -> bool {
        if !self.is_current(id, ticket) {
            return false;
        }
        self.expanding.remove(id);
        true
    }

    /// Expanded -> Collapsed.
    pub fn collapse(&mut self, id: &NodeId) -> bool {
        self.expanded.remove(id)
    }

    /// Stop tracking an id in any state.
    pub fn forget(&mut self, id: &NodeId) {
        self.expanding.remove(id);
        self.expanded.remove(id);
    }

    pub fn expanding(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.expanding.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn expanded(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.expanded.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn clear(&mut self) {
        self.expanding.clear();
        self.expanded.clear();
    }
}

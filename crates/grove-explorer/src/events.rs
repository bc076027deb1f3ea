//! Notifications published by the explorer

use grove_core::NodeId;
use serde::Serialize;

use crate::explorer::ExpandSource;
use crate::navigation::Breadcrumb;

/// A change to the explorer's view, broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExplorerEvent {
    RootsLoaded {
        count: usize,
    },
    Expanded {
        node_id: NodeId,
        children: usize,
        source: ExpandSource,
    },
    ExpandFailed {
        node_id: NodeId,
        message: String,
    },
    Collapsed {
        node_id: NodeId,
        removed: usize,
    },
    SelectionChanged {
        node_id: Option<NodeId>,
        breadcrumbs: Vec<Breadcrumb>,
    },
    /// Registry, expansion record and cache were cleared.
    Reset,
    NodeStale {
        node_id: NodeId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = ExplorerEvent::Collapsed {
            node_id: "pkg1".into(),
            removed: 2,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "collapsed", "node_id": "pkg1", "removed": 2})
        );

        let reset = serde_json::to_value(ExplorerEvent::Reset).unwrap();
        assert_eq!(reset, json!({"type": "reset"}));
    }
}

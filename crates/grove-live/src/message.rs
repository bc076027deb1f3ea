//! Message contract of the live-update channel

use grove_core::NodeId;
use serde::{Deserialize, Serialize};

/// Payload of a granular `node_updated` signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node_id: NodeId,
}

/// One JSON message on the live channel, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Graph contents changed; the scope is not enumerated.
    GraphUpdated {
        #[serde(default)]
        added_count: u64,
        #[serde(default)]
        modified_count: u64,
        #[serde(default)]
        removed_count: u64,
        #[serde(default)]
        affected_modules: Vec<String>,
    },
    /// A single node's data may be stale.
    NodeUpdated { data: NodeUpdate },

    // ── Informational ───────────────────────────────────────
    Connected {
        #[serde(default)]
        message: Option<String>,
    },
    Heartbeat {
        #[serde(default)]
        timestamp: Option<f64>,
    },
    FileChanged {
        #[serde(default)]
        path: String,
        #[serde(default)]
        change_type: Option<String>,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    Pong,

    /// Outbound liveness ping.
    Ping,

    #[serde(other)]
    Unknown,
}

impl LiveMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

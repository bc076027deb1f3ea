//! Error taxonomy shared by every layer of the explorer

use thiserror::Error;

use crate::model::NodeId;

/// Failure talking to the remote graph service.
///
/// `Clone` so that one settled request can hand the same failure to every caller that
/// joined it. A `status` of 0 means no HTTP response was obtained at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote request failed ({status}): {message}")]
pub struct RemoteError {
    pub status: u16,
    pub message: String,
}

impl RemoteError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        RemoteError {
            status,
            message: message.into(),
        }
    }

    /// Connection, timeout or decoding failure with no HTTP status attached.
    pub fn transport(message: impl Into<String>) -> Self {
        RemoteError::new(0, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Failure of the durable cache. Never fatal: callers treat it as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt cache record {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// What explorer operations surface to their callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExploreError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("node not found: {0}")]
    NotFound(NodeId),
}

impl ExploreError {
    /// Message suitable for showing to a user.
    pub fn user_message(&self) -> String {
        match self {
            ExploreError::Remote(e) if e.status == 0 => {
                format!("Could not reach the graph service: {}", e.message)
            }
            ExploreError::Remote(e) => format!("Graph service error {}: {}", e.status, e.message),
            ExploreError::NotFound(id) => format!("Node {} is not available", id),
        }
    }
}

//! Remote data gateway for the graph service
//!
//! [`GraphSource`] is the raw contract with the remote service; [`Gateway`] wraps any
//! source and folds concurrent identical requests into a single call.

pub mod gateway;
pub mod http;
pub mod inflight;
pub mod source;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use gateway::Gateway;
pub use http::{HttpGraphSource, HttpSourceConfig};
pub use inflight::Inflight;
pub use source::GraphSource;

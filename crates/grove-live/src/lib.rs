//! Live-update consumer
//!
//! Listens to the graph service's push channel and turns its signals into explorer
//! actions: a coarse `graph_updated` resets everything, a granular `node_updated` is only
//! recorded.

pub mod listener;
pub mod message;

pub use listener::{Dispatch, InvalidationListener, InvalidationTarget, LiveConfig, LiveError};
pub use message::{LiveMessage, NodeUpdate};

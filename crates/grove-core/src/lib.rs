//! Grove core: graph data model, node registry, and error taxonomy

pub mod error;
pub mod model;
pub mod registry;

#[cfg(test)]
mod tests;

pub use error::{CacheError, ExploreError, RemoteError};
pub use model::{
    Edge, EdgeKind, Expansion, Node, NodeId, NodeKind, OutgoingRef, SearchQuery, SearchResult,
};
pub use registry::Registry;

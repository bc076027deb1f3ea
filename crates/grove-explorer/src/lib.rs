//! Incremental expansion engine
//!
//! [`Explorer`] owns the node registry and the expansion record, resolves children from
//! the cache before the remote gateway, and derives navigation state from parent links.

pub mod events;
pub mod expansion;
pub mod explorer;
pub mod navigation;
pub mod view;


pub use events::ExplorerEvent;
pub use expansion::{ExpansionRecord, ExpansionState};
pub use explorer::{
    ExpandMode, ExpandOutcome, ExpandSource, Explorer, ExplorerConfig, ToggleOutcome,
};
pub use navigation::Breadcrumb;
pub use view::ViewSnapshot;

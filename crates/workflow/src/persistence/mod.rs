//! Persistence layer
//!
//! The engine runs entirely in memory; a [`WorkflowStore`] is an optional
//! write-through copy of definitions and instance snapshots.

mod memory;
mod store;

pub use memory::InMemoryWorkflowStore;
pub use store::{StoreError, WorkflowStore};

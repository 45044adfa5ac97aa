//! Workflow data model
//!
//! This module contains the declarative and runtime types:
//! - [`WorkflowDefinition`], [`WorkflowState`], [`StateAction`] for definitions
//! - [`EventToken`] for outcome labels
//! - [`ExecutionContext`] for the variable bag
//! - [`WorkflowInstance`] for run records

mod context;
mod definition;
mod event;
mod instance;
mod loader;

pub use context::ExecutionContext;
pub use definition::{
    ErrorPolicy, StateAction, WorkflowDefinition, WorkflowState, INTERNAL_SERVICE,
};
pub use event::EventToken;
pub use instance::{HistoryEntry, InstanceFilter, InstanceStatus, InstanceSummary, WorkflowInstance};
pub use loader::{load_definition_file, load_definitions_from_dir, save_definition_file, LoadError};

//! Workflow execution engine
//!
//! The engine module provides the [`ExecutionController`], which owns the
//! [`WorkflowRegistry`] and [`TriggerRouter`] and drives every instance with a
//! [`StateMachineExecutor`].

mod controller;
mod executor;
mod handle;
mod registry;
mod trigger;
mod validate;

pub use controller::{
    ControllerError, ExecutionController, ExecutionControllerBuilder, LoadReport, StartOptions,
};
pub use executor::{next_transition, StateMachineExecutor, Transition};
pub use registry::{WorkflowRegistry, WorkflowSummary};
pub use trigger::{PublishReport, TriggerRouter, WorkflowStarter, MANUAL_TRIGGER};
pub use validate::{validate_definition, DefinitionError};

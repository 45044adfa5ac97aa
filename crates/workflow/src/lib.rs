//! # Streamflow Workflow Engine
//!
//! An in-process state-machine executor for declarative streaming automation.
//!
//! ## Features
//!
//! - **Declarative workflows**: JSON or YAML definitions, validated on registration
//! - **Uniform collaborators**: every external service implements one async `invoke` contract
//! - **Variable substitution**: `${name}` and `${date}`/`${time}`/`${uuid}` placeholders in params
//! - **Reliability**: per-state timeouts, bounded retries with backoff, error policies
//! - **Live control**: pause, resume, single-step and cancel running instances
//! - **Triggers**: published events start every subscribed workflow
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ExecutionController                        │
//! │  (registry, trigger routing, instance lifecycle control)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  StateMachineExecutor                        │
//! │  (one task per instance: retries, timeouts, transitions)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ActionDispatcher                          │
//! │  (variable resolution, collaborators, outcome events)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use streamflow_workflow::prelude::*;
//!
//! let controller = ExecutionController::builder()
//!     .service("obs", Arc::new(ObsAdapter::connect(url).await?))
//!     .build();
//!
//! controller
//!     .load_workflows_from_dir("workflows")
//!     .await?;
//!
//! let id = controller.trigger_manual("stream_start_automation", Map::new()).await?;
//! let finished = controller.await_completion(id).await?;
//! ```

pub mod action;
pub mod clock;
pub mod config;
pub mod engine;
pub mod persistence;
pub mod reliability;
pub mod telemetry;
pub mod variables;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::action::{
        ActionError, Collaborator, FnCollaborator, Invocation, ServiceResponse,
    };
    pub use crate::clock::{Clock, IdGenerator, SystemClock, UuidV7Generator};
    pub use crate::config::EngineConfig;
    pub use crate::engine::{
        ControllerError, ExecutionController, PublishReport, StartOptions, MANUAL_TRIGGER,
    };
    pub use crate::persistence::{InMemoryWorkflowStore, StoreError, WorkflowStore};
    pub use crate::reliability::RetryPolicy;
    pub use crate::telemetry::{init_telemetry, TelemetryConfig};
    pub use crate::variables::VariablePolicy;
    pub use crate::workflow::{
        ErrorPolicy, EventToken, ExecutionContext, InstanceStatus, StateAction,
        WorkflowDefinition, WorkflowInstance, WorkflowState,
    };
    pub use serde_json::{json, Map, Value};
    pub use std::sync::Arc;
}

// Re-export key types at crate root
pub use action::{
    ActionDispatcher, ActionError, ActionOutcome, Collaborator, FnCollaborator, InternalService,
    Invocation, ServiceResponse,
};
pub use clock::{Clock, FixedClock, IdGenerator, SequentialIdGenerator, SystemClock, UuidV7Generator};
pub use config::EngineConfig;
pub use engine::{
    validate_definition, ControllerError, DefinitionError, ExecutionController,
    ExecutionControllerBuilder, LoadReport, PublishReport, StartOptions, TriggerRouter,
    WorkflowRegistry, MANUAL_TRIGGER,
};
pub use persistence::{InMemoryWorkflowStore, StoreError, WorkflowStore};
pub use reliability::RetryPolicy;
pub use telemetry::{init_telemetry, TelemetryConfig};
pub use variables::{VariableError, VariablePolicy, VariableResolver};
pub use workflow::{
    ErrorPolicy, EventToken, ExecutionContext, HistoryEntry, InstanceFilter, InstanceStatus,
    StateAction, WorkflowDefinition, WorkflowInstance, WorkflowState,
};

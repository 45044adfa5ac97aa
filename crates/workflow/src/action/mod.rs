//! Action dispatch
//!
//! This module contains:
//! - [`Collaborator`] - the invoke contract implemented by service adapters
//! - [`InternalService`] - built-ins served as the `internal` service
//! - [`ActionDispatcher`] - service registry and outcome normalization

mod collaborator;
mod dispatcher;
mod internal;

pub use collaborator::{ActionError, Collaborator, FnCollaborator, Invocation, ServiceResponse};
pub use dispatcher::{
    ActionDispatcher, ActionOutcome, CancellationError, DispatchError, DispatchOptions,
    UnknownServiceError,
};
pub use internal::InternalService;

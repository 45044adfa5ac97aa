//! The uniform contract every service adapter implements

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::workflow::EventToken;

/// Error type for collaborator failures
///
/// Becomes the `error` event; the serialized form is stored in the context
/// under `<state>.error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionError {
    /// Error message
    pub message: String,

    /// Error type/code for programmatic handling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    /// Whether the state's retry policy may try again
    pub retryable: bool,

    /// Additional error details (for debugging)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ActionError {
    /// Create a new retryable error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable: true,
            details: None,
        }
    }

    /// Create an error that skips any remaining attempts
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            ..Self::new(message)
        }
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// JSON payload recorded in the context
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.message.clone()))
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_type {
            Some(kind) => write!(f, "{}: {}", kind, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ActionError {}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// What a collaborator returns on a completed call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    /// Result value, recorded under `<state>.result`
    pub value: Value,

    /// Explicit outcome; `None` means `success`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventToken>,

    /// Variables merged into the top level of the context
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub exports: Map<String, Value>,
}

impl ServiceResponse {
    pub fn ok(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_event(mut self, event: impl Into<EventToken>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_exports(mut self, exports: Map<String, Value>) -> Self {
        self.exports = exports;
        self
    }
}

impl From<Value> for ServiceResponse {
    fn from(value: Value) -> Self {
        Self::ok(value)
    }
}

/// Information about the call being made
#[derive(Debug, Clone)]
pub struct Invocation {
    pub instance_id: Uuid,

    /// Name of the state whose action is executing
    pub state: String,

    /// Current attempt number (1-based)
    pub attempt: u32,

    /// Cancelled when the owning instance is cancelled
    pub cancellation: CancellationToken,
}

impl Invocation {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// A named external service the engine can invoke
///
/// # Example
///
/// ```ignore
/// struct Obs { client: ObsClient }
///
/// #[async_trait]
/// impl Collaborator for Obs {
///     async fn invoke(
///         &self,
///         method: &str,
///         params: Map<String, Value>,
///         _invocation: &Invocation,
///     ) -> Result<ServiceResponse, ActionError> {
///         match method {
///             "set_current_scene" => Ok(self.client.set_scene(&params).await?.into()),
///             other => Err(ActionError::non_retryable(format!("unknown method {other}"))),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Perform `method` with already-resolved parameters
    async fn invoke(
        &self,
        method: &str,
        params: Map<String, Value>,
        invocation: &Invocation,
    ) -> Result<ServiceResponse, ActionError>;

    /// Whether an in-flight call may be dropped on cancellation
    ///
    /// When `false` the call always runs to completion and the instance stops
    /// at the next transition boundary instead.
    fn supports_cancellation(&self) -> bool {
        true
    }
}

/// Adapts an async closure into a [`Collaborator`]
pub struct FnCollaborator<F> {
    f: F,
    cancellable: bool,
}

impl<F> FnCollaborator<F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            cancellable: true,
        }
    }

    /// Mark calls as uninterruptible
    pub fn without_cancellation(mut self) -> Self {
        self.cancellable = false;
        self
    }
}

#[async_trait]
impl<F, Fut> Collaborator for FnCollaborator<F>
where
    F: Fn(String, Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ServiceResponse, ActionError>> + Send,
{
    async fn invoke(
        &self,
        method: &str,
        params: Map<String, Value>,
        _invocation: &Invocation,
    ) -> Result<ServiceResponse, ActionError> {
        (self.f)(method.to_string(), params).await
    }

    fn supports_cancellation(&self) -> bool {
        self.cancellable
    }
}

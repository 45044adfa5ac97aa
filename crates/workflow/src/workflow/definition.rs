//! Workflow definition types
//!
//! A [`WorkflowDefinition`] is the declarative template registered with the
//! engine. It is immutable once accepted by the registry; instances only ever
//! hold an `Arc` to it.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::EventToken;
use crate::reliability::RetryPolicy;

/// Reserved service name for the built-in actions
pub const INTERNAL_SERVICE: &str = "internal";

/// A declarative multi-step workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Name of the state execution starts in
    pub initial_state: String,

    /// States in declaration order
    pub states: Vec<WorkflowState>,

    /// Trigger names that start this workflow when published
    #[serde(default)]
    pub triggers: Vec<String>,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl WorkflowDefinition {
    /// Create an empty definition; states are added with [`with_state`](Self::with_state)
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        initial_state: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            initial_state: initial_state.into(),
            states: Vec::new(),
            triggers: Vec::new(),
            version: default_version(),
            tags: Vec::new(),
            author: None,
        }
    }

    pub fn with_state(mut self, state: WorkflowState) -> Self {
        self.states.push(state);
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Look up a state by name
    pub fn state(&self, name: &str) -> Option<&WorkflowState> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.state(name).is_some()
    }

    pub fn declares_trigger(&self, trigger: &str) -> bool {
        self.triggers.iter().any(|t| t == trigger)
    }
}

/// What happens when an action fails and no transition handles `error`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Mark the instance failed
    #[default]
    Stop,

    /// Treat the failure as recoverable and end the workflow at this state
    Continue,
}

/// One step of a workflow: an action plus the event → next-state map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Unique within the definition
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub action: StateAction,

    /// Event token → next state; `null` ends the workflow
    #[serde(default)]
    pub transitions: BTreeMap<EventToken, Option<String>>,

    /// Deadline for each action attempt, in (fractional) seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,

    /// Target state when the deadline expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// Target state once all retry attempts failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_retry_exhausted: Option<String>,

    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl WorkflowState {
    pub fn new(name: impl Into<String>, action: StateAction) -> Self {
        Self {
            name: name.into(),
            description: None,
            action,
            transitions: BTreeMap::new(),
            timeout_seconds: None,
            on_timeout: None,
            retry: None,
            on_retry_exhausted: None,
            error_policy: ErrorPolicy::Stop,
        }
    }

    /// Route `event` to `target` (`None` ends the workflow)
    pub fn on(mut self, event: impl Into<EventToken>, target: Option<&str>) -> Self {
        self.transitions
            .insert(event.into(), target.map(str::to_string));
        self
    }

    pub fn with_timeout(mut self, seconds: f64, on_timeout: Option<&str>) -> Self {
        self.timeout_seconds = Some(seconds);
        self.on_timeout = on_timeout.map(str::to_string);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// The per-attempt deadline, if any
    ///
    /// Values with no `Duration` representation yield `None`; registration
    /// rejects them.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .filter(|limit| !limit.is_zero())
    }

    /// Effective retry policy (a single attempt when none is declared)
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_else(RetryPolicy::no_retry)
    }

    /// Every state name this state may transition to
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.transitions
            .values()
            .filter_map(|t| t.as_deref())
            .chain(self.on_timeout.as_deref())
            .chain(self.on_retry_exhausted.as_deref())
    }
}

/// A single invocation request against a named collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateAction {
    /// Collaborator name, or `internal` for the built-ins
    pub service: String,

    pub method: String,

    /// Raw values or `${var}` templates
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl StateAction {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            params: Map::new(),
        }
    }

    /// Shorthand for an `internal` action
    pub fn internal(method: impl Into<String>) -> Self {
        Self::new(INTERNAL_SERVICE, method)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

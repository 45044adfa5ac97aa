//! Structural checks run before a definition is accepted

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::workflow::{EventToken, WorkflowDefinition, WorkflowState};

/// A definition was rejected at registration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("workflow already registered: {0}")]
    DuplicateId(String),

    #[error("workflow id must not be empty")]
    EmptyId,

    #[error("workflow {0} declares no states")]
    NoStates(String),

    #[error("state {0} is declared more than once")]
    DuplicateState(String),

    #[error("initial state {0} is not declared")]
    MissingInitialState(String),

    #[error("state {state}: {kind} targets undeclared state {target}")]
    UnknownTarget {
        state: String,
        target: String,
        kind: String,
    },

    #[error("state {state}: invalid retry policy: {reason}")]
    InvalidRetry { state: String, reason: String },

    #[error("state {state}: timeout_seconds must be a positive number, got {value}")]
    InvalidTimeout { state: String, value: String },

    #[error("state {0}: action service must not be empty")]
    EmptyService(String),

    #[error("state {0}: action method must not be empty")]
    EmptyMethod(String),

    #[error("state {0}: transition event names must not be empty")]
    EmptyEvent(String),
}

/// Check every invariant a runnable definition must satisfy
///
/// Suspicious but legal shapes (a `timeout` route without a deadline, an
/// `on_retry_exhausted` target without retries) are logged, not rejected.
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), DefinitionError> {
    if def.id.trim().is_empty() {
        return Err(DefinitionError::EmptyId);
    }
    if def.states.is_empty() {
        return Err(DefinitionError::NoStates(def.id.clone()));
    }

    let mut names = HashSet::with_capacity(def.states.len());
    for state in &def.states {
        if !names.insert(state.name.as_str()) {
            return Err(DefinitionError::DuplicateState(state.name.clone()));
        }
    }

    if !names.contains(def.initial_state.as_str()) {
        return Err(DefinitionError::MissingInitialState(def.initial_state.clone()));
    }

    for state in &def.states {
        validate_state(&def.id, state, &names)?;
    }

    Ok(())
}

fn validate_state(
    workflow_id: &str,
    state: &WorkflowState,
    names: &HashSet<&str>,
) -> Result<(), DefinitionError> {
    if state.action.service.trim().is_empty() {
        return Err(DefinitionError::EmptyService(state.name.clone()));
    }
    if state.action.method.trim().is_empty() {
        return Err(DefinitionError::EmptyMethod(state.name.clone()));
    }

    let unknown = |target: &str, kind: String| DefinitionError::UnknownTarget {
        state: state.name.clone(),
        target: target.to_string(),
        kind,
    };

    for (event, target) in &state.transitions {
        if event.as_str().trim().is_empty() {
            return Err(DefinitionError::EmptyEvent(state.name.clone()));
        }
        if let Some(target) = target {
            if !names.contains(target.as_str()) {
                return Err(unknown(target, format!("transition '{event}'")));
            }
        }
    }

    if let Some(target) = &state.on_timeout {
        if !names.contains(target.as_str()) {
            return Err(unknown(target, "on_timeout".to_string()));
        }
    }
    if let Some(target) = &state.on_retry_exhausted {
        if !names.contains(target.as_str()) {
            return Err(unknown(target, "on_retry_exhausted".to_string()));
        }
    }

    if let Some(seconds) = state.timeout_seconds {
        let representable = Duration::try_from_secs_f64(seconds).is_ok_and(|d| !d.is_zero());
        if !representable {
            return Err(DefinitionError::InvalidTimeout {
                state: state.name.clone(),
                value: seconds.to_string(),
            });
        }
    }

    if let Some(retry) = &state.retry {
        retry.validate().map_err(|reason| DefinitionError::InvalidRetry {
            state: state.name.clone(),
            reason,
        })?;
    }

    let routes_timeout =
        state.on_timeout.is_some() || state.transitions.contains_key(&EventToken::Timeout);
    if routes_timeout && state.timeout().is_none() {
        warn!(
            workflow_id,
            state = %state.name,
            "timeout route declared without timeout_seconds; it can never fire"
        );
    }
    if state.on_retry_exhausted.is_some() && !state.retry_policy().retries() {
        warn!(
            workflow_id,
            state = %state.name,
            "on_retry_exhausted declared without a retry policy allowing more than one attempt"
        );
    }

    Ok(())
}

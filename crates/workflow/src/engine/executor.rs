//! State-machine executor
//!
//! Drives one instance through its states:
//!
//! ```text
//!   ┌──────────── safe point ────────────┐
//!   │ cancelled? ──► cancelled           │
//!   │ pause requested? ──► paused, wait  │
//!   └────────────────┬───────────────────┘
//!                    ▼
//!   dispatch action (per-attempt deadline, retries on `error`)
//!                    ▼
//!   record outcome in context + history
//!                    ▼
//!   next_transition ──► goto / completed / failed
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::handle::{InstanceHandle, RunControl};
use crate::action::{ActionDispatcher, ActionOutcome, DispatchError, DispatchOptions};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::persistence::WorkflowStore;
use crate::workflow::{ErrorPolicy, EventToken, HistoryEntry, InstanceStatus, WorkflowState};

/// Where an instance goes after a state's outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Continue with the named state
    Goto(String),

    /// End the workflow successfully
    Complete,

    /// End the workflow with an error message
    Fail(String),
}

/// Select the transition for an outcome
///
/// - `timeout`: `on_timeout`, then `transitions["timeout"]`, otherwise fail.
/// - `error`: `on_retry_exhausted` (when the state retries), then
///   `transitions["error"]`, otherwise the state's error policy.
/// - anything else: the matching transition; an unmatched event completes.
pub fn next_transition(state: &WorkflowState, event: &EventToken, payload: &Value) -> Transition {
    let route = |target: &Option<String>| match target {
        Some(next) => Transition::Goto(next.clone()),
        None => Transition::Complete,
    };

    match event {
        EventToken::Timeout => {
            if let Some(next) = &state.on_timeout {
                return Transition::Goto(next.clone());
            }
            match state.transitions.get(event) {
                Some(target) => route(target),
                None => Transition::Fail(format!("state {} timed out", state.name)),
            }
        }
        EventToken::Error => {
            if state.retry_policy().retries() {
                if let Some(next) = &state.on_retry_exhausted {
                    return Transition::Goto(next.clone());
                }
            }
            match state.transitions.get(event) {
                Some(target) => route(target),
                None => match state.error_policy {
                    ErrorPolicy::Stop => Transition::Fail(error_message(&state.name, payload)),
                    ErrorPolicy::Continue => Transition::Complete,
                },
            }
        }
        other => state
            .transitions
            .get(other)
            .map(route)
            .unwrap_or(Transition::Complete),
    }
}

fn error_message(state: &str, payload: &Value) -> String {
    match payload.get("message").and_then(Value::as_str) {
        Some(message) => format!("state {state} failed: {message}"),
        None => format!("state {state} failed"),
    }
}

enum StepError {
    Cancelled,
    Fatal(String),
}

impl From<DispatchError> for StepError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Cancelled(_) => Self::Cancelled,
            other => Self::Fatal(other.to_string()),
        }
    }
}

/// Runs instances to a terminal status
pub struct StateMachineExecutor {
    dispatcher: Arc<ActionDispatcher>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn WorkflowStore>>,
    config: EngineConfig,
}

impl std::fmt::Debug for StateMachineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachineExecutor")
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl StateMachineExecutor {
    pub fn new(
        dispatcher: Arc<ActionDispatcher>,
        clock: Arc<dyn Clock>,
        store: Option<Arc<dyn WorkflowStore>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            dispatcher,
            clock,
            store,
            config,
        }
    }

    /// Drive an instance until it is completed, failed or cancelled
    #[instrument(skip(self, handle), fields(instance_id = %handle.id, workflow_id = %handle.definition.id))]
    pub(crate) async fn drive(&self, handle: Arc<InstanceHandle>) {
        let definition = Arc::clone(&handle.definition);
        let mut steps: u64 = 0;

        loop {
            // Safe point: honor cancel, then pause
            if handle.is_cancel_requested() {
                self.finish(&handle, InstanceStatus::Cancelled, None).await;
                return;
            }
            if handle.control() == RunControl::Pause {
                handle.set_status(InstanceStatus::Paused, self.clock.now());
                self.persist(&handle).await;
                info!("instance paused");

                if !self.wait_for_resume(&handle).await {
                    self.finish(&handle, InstanceStatus::Cancelled, None).await;
                    return;
                }
                info!("instance resumed");
            }
            if handle.status() != InstanceStatus::Running {
                handle.set_status(InstanceStatus::Running, self.clock.now());
            }

            let current = handle.read(|i| i.current_state.clone());
            let Some(state) = current.as_deref().and_then(|name| definition.state(name)) else {
                let message = format!("state {} is not declared", current.unwrap_or_default());
                self.finish(&handle, InstanceStatus::Failed, Some(message)).await;
                return;
            };

            steps += 1;
            if steps > self.config.max_steps_per_instance {
                let message = format!(
                    "step limit of {} exceeded",
                    self.config.max_steps_per_instance
                );
                self.finish(&handle, InstanceStatus::Failed, Some(message)).await;
                return;
            }

            let outcome = match self.execute_state(&handle, state).await {
                Ok(outcome) => outcome,
                Err(StepError::Cancelled) => {
                    self.finish(&handle, InstanceStatus::Cancelled, None).await;
                    return;
                }
                Err(StepError::Fatal(message)) => {
                    self.finish(&handle, InstanceStatus::Failed, Some(message)).await;
                    return;
                }
            };

            let transition = next_transition(state, &outcome.event, &outcome.payload);
            debug!(state = %state.name, event = %outcome.event, ?transition, "transition");

            handle.update(self.clock.now(), |instance| {
                if outcome.is_failure() {
                    instance.context.record_error(&state.name, &outcome.payload);
                } else {
                    instance.context.record_result(&state.name, &outcome.payload);
                }
                instance.context.extend(outcome.exports.clone());
                if let Transition::Goto(next) = &transition {
                    instance.current_state = Some(next.clone());
                }
            });
            handle.finish_step();

            match transition {
                Transition::Goto(_) => self.persist(&handle).await,
                Transition::Complete => {
                    self.finish(&handle, InstanceStatus::Completed, None).await;
                    return;
                }
                Transition::Fail(message) => {
                    self.finish(&handle, InstanceStatus::Failed, Some(message)).await;
                    return;
                }
            }
        }
    }

    /// Run a state's action, retrying `error` outcomes within the policy
    async fn execute_state(
        &self,
        handle: &InstanceHandle,
        state: &WorkflowState,
    ) -> Result<ActionOutcome, StepError> {
        let policy = state.retry_policy();
        let timeout = state.timeout();
        let cancel = handle.cancellation();
        let mut attempt: u32 = 1;

        loop {
            if attempt > 1 {
                let delay = policy.delay_for_attempt(attempt);
                if !delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(StepError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                if cancel.is_cancelled() {
                    return Err(StepError::Cancelled);
                }
            }

            if timeout.is_some() {
                handle.set_status(InstanceStatus::WaitingTimeout, self.clock.now());
            }
            let context = handle.read(|i| i.context.clone());
            let options = DispatchOptions {
                instance_id: handle.id,
                state: state.name.clone(),
                attempt,
                timeout,
                cancellation: cancel.clone(),
            };

            let result = self.dispatcher.dispatch(&state.action, &context, &options).await;
            if timeout.is_some() && handle.status() == InstanceStatus::WaitingTimeout {
                handle.set_status(InstanceStatus::Running, self.clock.now());
            }
            let outcome = result?;

            self.record_history(handle, state, &outcome.event, attempt);

            let retry = outcome.event == EventToken::Error
                && outcome.retryable
                && policy.has_attempts_remaining(attempt);
            if !retry {
                return Ok(outcome);
            }

            warn!(
                state = %state.name,
                attempt,
                max_attempts = policy.max_attempts,
                "action failed, retrying"
            );
            attempt += 1;
        }
    }

    fn record_history(
        &self,
        handle: &InstanceHandle,
        state: &WorkflowState,
        event: &EventToken,
        attempt: u32,
    ) {
        let now = self.clock.now();
        let max = self.config.max_history_entries;
        handle.update(now, |instance| {
            instance.history.push(HistoryEntry {
                state: state.name.clone(),
                event: event.clone(),
                attempt,
                timestamp: now,
            });
            if instance.history.len() > max {
                let excess = instance.history.len() - max;
                instance.history.drain(..excess);
            }
        });
    }

    /// Block until the control flag leaves `Pause`; `false` if cancelled first
    async fn wait_for_resume(&self, handle: &InstanceHandle) -> bool {
        let cancel: &CancellationToken = handle.cancellation();
        let mut control = handle.subscribe_control();

        loop {
            if cancel.is_cancelled() {
                return false;
            }
            if *control.borrow_and_update() != RunControl::Pause {
                return true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                changed = control.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    async fn finish(&self, handle: &InstanceHandle, status: InstanceStatus, message: Option<String>) {
        let now = self.clock.now();
        handle.update(now, |instance| instance.error = message.clone());
        handle.record_status(status, now);

        match (&status, &message) {
            (InstanceStatus::Failed, Some(message)) => error!(error = %message, "instance failed"),
            _ => info!(%status, "instance finished"),
        }

        // Watchers see the terminal status only once the snapshot is stored
        self.persist(handle).await;
        handle.publish_status();
    }

    async fn persist(&self, handle: &InstanceHandle) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = handle.snapshot();
        if let Err(e) = store.save_instance(&snapshot).await {
            warn!(instance_id = %handle.id, error = %e, "failed to persist instance snapshot");
        }
    }
}

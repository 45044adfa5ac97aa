//! Routes state actions to registered collaborators

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{Collaborator, InternalService, Invocation};
use crate::reliability::with_deadline;
use crate::variables::{VariableError, VariableResolver};
use crate::workflow::{EventToken, ExecutionContext, StateAction, INTERNAL_SERVICE};

/// The action names a collaborator that was never registered
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown service: {service}")]
pub struct UnknownServiceError {
    pub service: String,
}

/// The instance was cancelled while the action was in flight
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("instance cancelled")]
pub struct CancellationError;

/// Failures that prevent an action from producing an event
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error(transparent)]
    UnknownService(#[from] UnknownServiceError),

    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error(transparent)]
    Cancelled(#[from] CancellationError),
}

/// Per-call settings supplied by the executor
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub instance_id: Uuid,
    pub state: String,
    pub attempt: u32,
    pub timeout: Option<Duration>,
    pub cancellation: CancellationToken,
}

/// A normalized action outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub event: EventToken,

    /// Result value for `success`/custom events, error payload otherwise
    pub payload: Value,

    /// Variables to merge into the context top level
    pub exports: Map<String, Value>,

    /// For `error`: whether another attempt may be made
    pub retryable: bool,
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.event, EventToken::Error | EventToken::Timeout)
    }
}

/// Maps service names to collaborators
///
/// `internal` is registered at construction like any other collaborator and
/// may be replaced.
pub struct ActionDispatcher {
    services: RwLock<HashMap<String, Arc<dyn Collaborator>>>,
    resolver: VariableResolver,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("services", &self.service_names())
            .field("resolver", &self.resolver)
            .finish()
    }
}

impl ActionDispatcher {
    pub fn new(resolver: VariableResolver) -> Self {
        let dispatcher = Self {
            services: RwLock::new(HashMap::new()),
            resolver,
        };
        dispatcher.register_service(INTERNAL_SERVICE, Arc::new(InternalService::new()));
        dispatcher
    }

    /// Register (or replace) a collaborator
    pub fn register_service(&self, name: impl Into<String>, collaborator: Arc<dyn Collaborator>) {
        let name = name.into();
        debug!(service = %name, "registered service");
        self.services.write().insert(name, collaborator);
    }

    pub fn service(&self, name: &str) -> Option<Arc<dyn Collaborator>> {
        self.services.read().get(name).cloned()
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Registered service names, sorted
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn resolver(&self) -> &VariableResolver {
        &self.resolver
    }

    /// Resolve parameters, invoke the collaborator and normalize its outcome
    ///
    /// Collaborator failures and expired deadlines come back as `Ok` outcomes
    /// carrying the `error` and `timeout` events.
    #[instrument(
        skip(self, action, ctx, options),
        fields(service = %action.service, method = %action.method, state = %options.state, attempt = options.attempt)
    )]
    pub async fn dispatch(
        &self,
        action: &StateAction,
        ctx: &ExecutionContext,
        options: &DispatchOptions,
    ) -> Result<ActionOutcome, DispatchError> {
        let params = self.resolver.resolve_params(&action.params, ctx)?;
        let service = self.service(&action.service).ok_or_else(|| UnknownServiceError {
            service: action.service.clone(),
        })?;

        if options.cancellation.is_cancelled() {
            return Err(CancellationError.into());
        }

        let invocation = Invocation {
            instance_id: options.instance_id,
            state: options.state.clone(),
            attempt: options.attempt,
            cancellation: options.cancellation.clone(),
        };

        let call = with_deadline(
            options.timeout,
            service.invoke(&action.method, params, &invocation),
        );

        let result = if service.supports_cancellation() {
            tokio::select! {
                biased;
                _ = options.cancellation.cancelled() => return Err(CancellationError.into()),
                result = call => result,
            }
        } else {
            call.await
        };

        let outcome = match result {
            Ok(Ok(response)) => ActionOutcome {
                event: response.event.unwrap_or(EventToken::Success),
                payload: response.value,
                exports: response.exports,
                retryable: true,
            },
            Ok(Err(error)) => ActionOutcome {
                event: EventToken::Error,
                payload: error.to_value(),
                exports: Map::new(),
                retryable: error.retryable,
            },
            Err(timeout) => ActionOutcome {
                event: EventToken::Timeout,
                payload: json!({
                    "message": timeout.to_string(),
                    "timeout_seconds": timeout.limit.as_secs_f64(),
                }),
                exports: Map::new(),
                retryable: false,
            },
        };

        debug!(event = %outcome.event, "action finished");
        Ok(outcome)
    }
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self::new(VariableResolver::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionError, FnCollaborator, ServiceResponse};
    use crate::variables::VariablePolicy;
    use std::time::Instant;

    fn options(state: &str) -> DispatchOptions {
        DispatchOptions {
            instance_id: Uuid::nil(),
            state: state.to_string(),
            attempt: 1,
            timeout: None,
            cancellation: CancellationToken::new(),
        }
    }

    fn echo() -> Arc<dyn Collaborator> {
        Arc::new(FnCollaborator::new(|method: String, params: Map<String, Value>| async move {
            match method.as_str() {
                "fail" => Err(ActionError::non_retryable("nope")),
                "cancel" => Ok(ServiceResponse::ok(Value::Null).with_event("cancel")),
                "hang" => {
                    std::future::pending::<()>().await;
                    Ok(ServiceResponse::default())
                }
                _ => Ok(ServiceResponse::ok(Value::Object(params))),
            }
        }))
    }

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.insert("title", json!("Late show"));
        ctx
    }

    #[tokio::test]
    async fn test_success_with_resolved_params() {
        let dispatcher = ActionDispatcher::default();
        dispatcher.register_service("twitch", echo());

        let action = StateAction::new("twitch", "update_channel").with_param("title", "${title}!");
        let outcome = dispatcher.dispatch(&action, &ctx(), &options("s")).await.unwrap();

        assert_eq!(outcome.event, EventToken::Success);
        assert_eq!(outcome.payload, json!({"title": "Late show!"}));
    }

    #[tokio::test]
    async fn test_failure_becomes_error_event() {
        let dispatcher = ActionDispatcher::default();
        dispatcher.register_service("twitch", echo());

        let outcome = dispatcher
            .dispatch(&StateAction::new("twitch", "fail"), &ctx(), &options("s"))
            .await
            .unwrap();

        assert_eq!(outcome.event, EventToken::Error);
        assert_eq!(outcome.payload["message"], "nope");
        assert!(!outcome.retryable);
        assert!(outcome.is_failure());
    }

    #[tokio::test]
    async fn test_custom_event_passes_through() {
        let dispatcher = ActionDispatcher::default();
        dispatcher.register_service("twitch", echo());

        let outcome = dispatcher
            .dispatch(&StateAction::new("twitch", "cancel"), &ctx(), &options("s"))
            .await
            .unwrap();
        assert_eq!(outcome.event, EventToken::custom("cancel"));
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let dispatcher = ActionDispatcher::default();
        let err = dispatcher
            .dispatch(&StateAction::new("discord", "send"), &ctx(), &options("s"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            DispatchError::UnknownService(UnknownServiceError {
                service: "discord".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_strict_variables_fail_dispatch() {
        let dispatcher =
            ActionDispatcher::new(VariableResolver::default().with_policy(VariablePolicy::Strict));
        let action = StateAction::internal("log").with_param("message", "${nobody}");

        let err = dispatcher.dispatch(&action, &ctx(), &options("s")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Variable(_)));
    }

    #[tokio::test]
    async fn test_deadline_yields_timeout_event() {
        let dispatcher = ActionDispatcher::default();
        dispatcher.register_service("obs", echo());

        let mut opts = options("s");
        opts.timeout = Some(Duration::from_millis(30));
        let outcome = dispatcher
            .dispatch(&StateAction::new("obs", "hang"), &ctx(), &opts)
            .await
            .unwrap();

        assert_eq!(outcome.event, EventToken::Timeout);
        assert_eq!(outcome.payload["timeout_seconds"], json!(0.03));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let dispatcher = ActionDispatcher::default();
        let opts = options("waiting");
        let token = opts.cancellation.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let started = Instant::now();
        let action = StateAction::internal("wait").with_param("seconds", 30);
        let err = dispatcher.dispatch(&action, &ctx(), &opts).await.unwrap_err();

        assert_eq!(err, DispatchError::Cancelled(CancellationError));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_uncancellable_call_runs_to_completion() {
        let dispatcher = ActionDispatcher::default();
        dispatcher.register_service(
            "slow",
            Arc::new(
                FnCollaborator::new(|_: String, _: Map<String, Value>| async {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    Ok::<_, ActionError>(ServiceResponse::ok(json!("done")))
                })
                .without_cancellation(),
            ),
        );

        let opts = options("s");
        let token = opts.cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            token.cancel();
        });

        let outcome = dispatcher
            .dispatch(&StateAction::new("slow", "go"), &ctx(), &opts)
            .await
            .unwrap();
        assert_eq!(outcome.payload, json!("done"));
    }

    #[test]
    fn test_internal_is_registered() {
        let dispatcher = ActionDispatcher::default();
        assert!(dispatcher.has_service(INTERNAL_SERVICE));
        assert_eq!(dispatcher.service_names(), vec!["internal".to_string()]);
    }
}

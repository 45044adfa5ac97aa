//! Built-in actions served under the `internal` service name

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::{ActionError, Collaborator, Invocation, ServiceResponse};
use crate::workflow::EventToken;

/// Built-in actions
///
/// | method            | params                                   | outcome                     |
/// |-------------------|------------------------------------------|-----------------------------|
/// | `wait`            | `seconds`                                | sleeps, `{"waited": s}`     |
/// | `log`             | `message`, `level`                       | tracing event               |
/// | `set_variables`   | any                                      | exports every param         |
/// | `conditional`     | `condition`, `true_event`, `false_event` | custom event by truthiness  |
/// | `merge_variables` | `target`, `sources`                      | exports the merged object   |
#[derive(Debug, Clone, Copy, Default)]
pub struct InternalService;

impl InternalService {
    pub const WAIT: &'static str = "wait";
    pub const LOG: &'static str = "log";
    pub const SET_VARIABLES: &'static str = "set_variables";
    pub const CONDITIONAL: &'static str = "conditional";
    pub const MERGE_VARIABLES: &'static str = "merge_variables";

    pub fn new() -> Self {
        Self
    }

    async fn wait(&self, params: &Map<String, Value>) -> Result<ServiceResponse, ActionError> {
        let seconds = match params.get("seconds") {
            None | Some(Value::Null) => 0.0,
            Some(value) => seconds_of(value).ok_or_else(|| {
                ActionError::non_retryable(format!("wait: invalid seconds value {value}"))
                    .with_type("INVALID_PARAMS")
            })?,
        };

        let pause = Duration::try_from_secs_f64(seconds).map_err(|_| {
            ActionError::non_retryable(format!("wait: {seconds:e} seconds is out of range"))
                .with_type("INVALID_PARAMS")
        })?;
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        Ok(ServiceResponse::ok(json!({ "waited": seconds })))
    }

    fn log(&self, params: &Map<String, Value>, invocation: &Invocation) -> ServiceResponse {
        let message = match params.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let level = params
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or("info")
            .to_ascii_lowercase();

        let instance_id = invocation.instance_id;
        let state = invocation.state.as_str();
        match level.as_str() {
            "debug" => debug!(%instance_id, state, "{message}"),
            "warn" | "warning" => warn!(%instance_id, state, "{message}"),
            "error" => error!(%instance_id, state, "{message}"),
            _ => info!(%instance_id, state, "{message}"),
        }

        ServiceResponse::ok(json!({ "logged": message, "level": level }))
    }

    fn set_variables(&self, params: Map<String, Value>) -> ServiceResponse {
        let keys: Vec<&String> = params.keys().collect();
        let value = json!({ "variables_set": keys });
        ServiceResponse::ok(value).with_exports(params)
    }

    fn conditional(&self, params: &Map<String, Value>) -> ServiceResponse {
        let result = params.get("condition").map(is_truthy).unwrap_or(false);
        let event_param = if result { "true_event" } else { "false_event" };
        let default_event = if result { "condition_true" } else { "condition_false" };
        let event = params
            .get(event_param)
            .and_then(Value::as_str)
            .unwrap_or(default_event);

        ServiceResponse::ok(json!({ "condition_result": result }))
            .with_event(EventToken::custom(event))
    }

    fn merge_variables(&self, params: &Map<String, Value>) -> Result<ServiceResponse, ActionError> {
        let target = params
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or("merged_result")
            .to_string();

        let sources = match params.get("sources") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(ActionError::non_retryable(format!(
                    "merge_variables: sources must be a list, got {other}"
                ))
                .with_type("INVALID_PARAMS"))
            }
        };

        let mut merged = Map::new();
        for source in &sources {
            // Non-object sources (unresolved or scalar) contribute nothing
            if let Value::Object(fields) = source {
                merged.extend(fields.clone());
            }
        }

        let mut exports = Map::new();
        exports.insert(target.clone(), Value::Object(merged));

        Ok(
            ServiceResponse::ok(json!({ "merged_to": target, "source_count": sources.len() }))
                .with_exports(exports),
        )
    }
}

#[async_trait]
impl Collaborator for InternalService {
    async fn invoke(
        &self,
        method: &str,
        params: Map<String, Value>,
        invocation: &Invocation,
    ) -> Result<ServiceResponse, ActionError> {
        match method {
            Self::WAIT => self.wait(&params).await,
            Self::LOG => Ok(self.log(&params, invocation)),
            Self::SET_VARIABLES => Ok(self.set_variables(params)),
            Self::CONDITIONAL => Ok(self.conditional(&params)),
            Self::MERGE_VARIABLES => self.merge_variables(&params),
            other => Err(
                ActionError::non_retryable(format!("unknown internal method: {other}"))
                    .with_type("UNKNOWN_METHOD"),
            ),
        }
    }
}

fn seconds_of(value: &Value) -> Option<f64> {
    let seconds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s.eq_ignore_ascii_case("false") || s == "0")
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

//! Mock collaborators and helpers shared by the integration tests

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use streamflow_workflow::{
    ActionError, Collaborator, ExecutionController, Invocation, ServiceResponse,
    WorkflowDefinition,
};

pub const STREAM_START: &str = include_str!("../../workflows/stream_start.json");

pub fn stream_start_definition() -> WorkflowDefinition {
    serde_json::from_str(STREAM_START).expect("sample workflow parses")
}

/// Initial variables for the sample stream-start workflow
pub fn stream_vars() -> Map<String, Value> {
    let vars = json!({
        "starting_scene": "Starting Soon",
        "main_scene": "Live",
        "stream_title": "Speedrun practice",
        "game": "Celeste",
        "countdown_seconds": 0.05,
    });
    match vars {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

pub fn vars(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

/// Poll `condition` every few milliseconds until it holds or `limit` passes
pub async fn wait_until<F, Fut>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================
// Mock collaborators
// ============================================

/// Records every call and answers like a connected OBS instance
#[derive(Default)]
pub struct MockObs {
    pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl MockObs {
    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(m, _)| m.clone()).collect()
    }
}

#[async_trait]
impl Collaborator for MockObs {
    async fn invoke(
        &self,
        method: &str,
        params: Map<String, Value>,
        _invocation: &Invocation,
    ) -> Result<ServiceResponse, ActionError> {
        self.calls.lock().push((method.to_string(), params.clone()));
        match method {
            "set_current_scene" => Ok(json!({
                "success": true,
                "scene": params.get("scene_name").cloned().unwrap_or(Value::Null),
            })
            .into()),
            "start_stream" => Ok(json!({"success": true, "streaming": true}).into()),
            other => Err(ActionError::non_retryable(format!("unsupported obs method {other}"))
                .with_type("UNKNOWN_METHOD")),
        }
    }
}

/// Twitch mock whose `update_channel` can be made to fail
#[derive(Default)]
pub struct MockTwitch {
    pub fail: bool,
    pub calls: Mutex<Vec<Map<String, Value>>>,
}

impl MockTwitch {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Collaborator for MockTwitch {
    async fn invoke(
        &self,
        method: &str,
        params: Map<String, Value>,
        _invocation: &Invocation,
    ) -> Result<ServiceResponse, ActionError> {
        if method != "update_channel" {
            return Err(ActionError::non_retryable(format!("unsupported twitch method {method}")));
        }
        self.calls.lock().push(params.clone());
        if self.fail {
            return Err(ActionError::new("helix returned 503").with_type("API_ERROR"));
        }
        Ok(json!({"success": true, "title": params.get("title").cloned()}).into())
    }
}

/// Never answers
#[derive(Default)]
pub struct HangingService {
    pub calls: AtomicU32,
}

#[async_trait]
impl Collaborator for HangingService {
    async fn invoke(
        &self,
        _method: &str,
        _params: Map<String, Value>,
        _invocation: &Invocation,
    ) -> Result<ServiceResponse, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Fails a fixed number of times, then succeeds
pub struct FlakyService {
    failures: u32,
    pub calls: AtomicU32,
}

impl FlakyService {
    pub fn failing_times(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Collaborator for FlakyService {
    async fn invoke(
        &self,
        _method: &str,
        _params: Map<String, Value>,
        invocation: &Invocation,
    ) -> Result<ServiceResponse, ActionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(ActionError::new(format!("transient failure {call}")));
        }
        Ok(json!({"attempt": invocation.attempt}).into())
    }
}

/// Counts invocations per state, optionally taking a while to answer
#[derive(Default)]
pub struct CountingService {
    pub calls: Mutex<Vec<String>>,
    pub delay: Option<Duration>,
}

impl CountingService {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn states(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Collaborator for CountingService {
    async fn invoke(
        &self,
        _method: &str,
        _params: Map<String, Value>,
        invocation: &Invocation,
    ) -> Result<ServiceResponse, ActionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let count = {
            let mut calls = self.calls.lock();
            calls.push(invocation.state.clone());
            calls.len()
        };
        Ok(json!({"count": count}).into())
    }
}

// ============================================
// Controller setup
// ============================================

/// Controller with mock `obs` and `twitch` services and the sample workflow registered
pub async fn stream_controller(
    obs: Arc<MockObs>,
    twitch: Arc<MockTwitch>,
) -> ExecutionController {
    let controller = ExecutionController::builder()
        .service("obs", obs)
        .service("twitch", twitch)
        .build();
    controller
        .register_workflow(stream_start_definition())
        .await
        .expect("sample workflow registers");
    controller
}

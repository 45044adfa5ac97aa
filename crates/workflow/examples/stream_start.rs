//! Run the sample stream-start workflow against logging stand-ins for OBS and Twitch
//!
//! ```sh
//! RUST_LOG=streamflow_workflow=debug cargo run -p streamflow-workflow --example stream_start
//! ```

use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Map, Value};
use tracing::info;

use streamflow_workflow::prelude::*;

const DEFINITION: &str = include_str!("../workflows/stream_start.json");

/// Pretends to be a broadcast tool: every call succeeds and is logged
struct LoggingService {
    name: &'static str,
}

#[async_trait::async_trait]
impl Collaborator for LoggingService {
    async fn invoke(
        &self,
        method: &str,
        params: Map<String, Value>,
        _invocation: &Invocation,
    ) -> Result<ServiceResponse, ActionError> {
        info!(service = self.name, method, params = %serde_json::Value::Object(params.clone()), "call");
        Ok(json!({ "success": true, "method": method }).into())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig::from_env());

    let controller = ExecutionController::builder()
        .config(EngineConfig::from_env())
        .store(Arc::new(InMemoryWorkflowStore::new()))
        .service("obs", Arc::new(LoggingService { name: "obs" }))
        .service("twitch", Arc::new(LoggingService { name: "twitch" }))
        .build();

    let definition: WorkflowDefinition =
        serde_json::from_str(DEFINITION).context("parsing sample workflow")?;
    controller.register_workflow(definition).await?;

    let vars = json!({
        "starting_scene": "Starting Soon",
        "main_scene": "Live",
        "stream_title": "Late night building",
        "game": "Software and Game Development",
        "countdown_seconds": 1,
    });
    let Value::Object(vars) = vars else {
        anyhow::bail!("initial variables must be an object");
    };

    let report = controller.publish_event("stream_start", vars).await;
    for (workflow_id, instance_id) in &report.started {
        let instance = controller.await_completion(*instance_id).await?;
        info!(
            %workflow_id,
            %instance_id,
            status = %instance.status,
            states = ?instance.visited_states(),
            "workflow finished"
        );
    }
    for (workflow_id, error) in &report.failed {
        tracing::error!(%workflow_id, %error, "workflow did not start");
    }

    controller.shutdown().await;
    Ok(())
}

//! Event trigger routing
//!
//! Maps trigger names (`stream_start`, `scheduled.stream_start`, `follow`, ...)
//! to the workflows that declare them.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::controller::ControllerError;
use crate::workflow::WorkflowDefinition;

/// Trigger name reserved for direct calls; never published
pub const MANUAL_TRIGGER: &str = "manual";

/// Starts a workflow on behalf of the router
#[async_trait]
pub trait WorkflowStarter: Send + Sync {
    async fn start_triggered(
        &self,
        workflow_id: &str,
        trigger: &str,
        vars: Map<String, Value>,
    ) -> Result<Uuid, ControllerError>;
}

/// Outcome of one publish call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishReport {
    /// `(workflow_id, instance_id)` for every started instance
    pub started: Vec<(String, Uuid)>,

    /// `(workflow_id, error)` for every start that was refused
    pub failed: Vec<(String, String)>,
}

impl PublishReport {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.failed.is_empty()
    }
}

/// Trigger name → subscribed workflow ids (registration order)
#[derive(Default)]
pub struct TriggerRouter {
    routes: RwLock<HashMap<String, Vec<String>>>,
}

impl TriggerRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a definition to each trigger it declares
    pub fn subscribe(&self, definition: &WorkflowDefinition) {
        let mut routes = self.routes.write();
        for trigger in &definition.triggers {
            let ids = routes.entry(trigger.clone()).or_default();
            if !ids.contains(&definition.id) {
                ids.push(definition.id.clone());
            }
        }
    }

    /// Drop a workflow from every trigger
    pub fn unsubscribe(&self, workflow_id: &str) {
        let mut routes = self.routes.write();
        for ids in routes.values_mut() {
            ids.retain(|id| id != workflow_id);
        }
        routes.retain(|_, ids| !ids.is_empty());
    }

    pub fn subscribers(&self, trigger: &str) -> Vec<String> {
        self.routes.read().get(trigger).cloned().unwrap_or_default()
    }

    /// Known trigger names, sorted
    pub fn triggers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Start every workflow subscribed to `trigger`, seeded with `vars`
    ///
    /// Starts run concurrently and independently; one refusal does not stop the
    /// others.
    #[instrument(skip(self, starter, vars))]
    pub async fn publish(
        &self,
        starter: &dyn WorkflowStarter,
        trigger: &str,
        vars: Map<String, Value>,
    ) -> PublishReport {
        if trigger == MANUAL_TRIGGER {
            warn!("the manual trigger is invoked directly, not published");
            return PublishReport::default();
        }

        let subscribers = self.subscribers(trigger);
        if subscribers.is_empty() {
            info!("no workflows subscribed to trigger");
            return PublishReport::default();
        }

        let results = join_all(subscribers.iter().map(|workflow_id| {
            let vars = vars.clone();
            async move {
                let result = starter.start_triggered(workflow_id, trigger, vars).await;
                (workflow_id.clone(), result)
            }
        }))
        .await;

        let mut report = PublishReport::default();
        for (workflow_id, result) in results {
            match result {
                Ok(instance_id) => report.started.push((workflow_id, instance_id)),
                Err(e) => {
                    warn!(workflow_id = %workflow_id, error = %e, "triggered start failed");
                    report.failed.push((workflow_id, e.to_string()));
                }
            }
        }

        info!(
            started = report.started.len(),
            failed = report.failed.len(),
            "published trigger"
        );
        report
    }
}

impl std::fmt::Debug for TriggerRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerRouter")
            .field("triggers", &self.triggers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{StateAction, WorkflowState};
    use parking_lot::Mutex;

    fn definition(id: &str, triggers: &[&str]) -> WorkflowDefinition {
        let mut def = WorkflowDefinition::new(id, id, "a")
            .with_state(WorkflowState::new("a", StateAction::internal("log")));
        for t in triggers {
            def = def.with_trigger(*t);
        }
        def
    }

    #[derive(Default)]
    struct RecordingStarter {
        calls: Mutex<Vec<(String, String, Map<String, Value>)>>,
    }

    #[async_trait]
    impl WorkflowStarter for RecordingStarter {
        async fn start_triggered(
            &self,
            workflow_id: &str,
            trigger: &str,
            vars: Map<String, Value>,
        ) -> Result<Uuid, ControllerError> {
            if workflow_id == "broken" {
                return Err(ControllerError::WorkflowNotFound(workflow_id.to_string()));
            }
            let mut calls = self.calls.lock();
            calls.push((workflow_id.to_string(), trigger.to_string(), vars));
            Ok(Uuid::from_u128(calls.len() as u128))
        }
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let router = TriggerRouter::new();
        router.subscribe(&definition("a", &["follow", "raid"]));
        router.subscribe(&definition("b", &["follow"]));
        router.subscribe(&definition("b", &["follow"]));

        assert_eq!(router.subscribers("follow"), vec!["a", "b"]);
        assert_eq!(router.triggers(), vec!["follow", "raid"]);

        router.unsubscribe("a");
        assert_eq!(router.subscribers("follow"), vec!["b"]);
        assert!(router.subscribers("raid").is_empty());
        assert_eq!(router.triggers(), vec!["follow"]);
    }

    #[tokio::test]
    async fn test_publish_starts_every_subscriber() {
        let router = TriggerRouter::new();
        router.subscribe(&definition("a", &["follow"]));
        router.subscribe(&definition("broken", &["follow"]));
        router.subscribe(&definition("c", &["follow"]));

        let starter = RecordingStarter::default();
        let mut vars = Map::new();
        vars.insert("follower".to_string(), Value::from("ana"));

        let report = router.publish(&starter, "follow", vars).await;

        let started: Vec<_> = report.started.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(started, vec!["a", "c"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken");

        let calls = starter.calls.lock();
        assert!(calls.iter().all(|(_, trigger, vars)| trigger == "follow" && vars["follower"] == "ana"));
    }

    #[tokio::test]
    async fn test_publish_unknown_and_manual() {
        let router = TriggerRouter::new();
        router.subscribe(&definition("a", &["manual"]));
        let starter = RecordingStarter::default();

        assert!(router.publish(&starter, "nobody", Map::new()).await.is_empty());
        assert!(router.publish(&starter, MANUAL_TRIGGER, Map::new()).await.is_empty());
        assert!(starter.calls.lock().is_empty());
    }
}

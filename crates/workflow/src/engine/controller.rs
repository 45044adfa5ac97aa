//! Execution controller
//!
//! Owns the live instance table and is the API surface front ends talk to.
//! Each instance runs as its own task; control operations post requests that
//! the task observes at its next transition boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::executor::StateMachineExecutor;
use super::handle::{InstanceHandle, RunControl};
use super::registry::{WorkflowRegistry, WorkflowSummary};
use super::trigger::{PublishReport, TriggerRouter, WorkflowStarter, MANUAL_TRIGGER};
use super::validate::DefinitionError;
use crate::action::{ActionDispatcher, Collaborator, UnknownServiceError};
use crate::clock::{Clock, IdGenerator, SystemClock, UuidV7Generator};
use crate::config::EngineConfig;
use crate::persistence::{StoreError, WorkflowStore};
use crate::variables::VariableResolver;
use crate::workflow::{
    load_definitions_from_dir, ExecutionContext, HistoryEntry, InstanceFilter, InstanceStatus,
    InstanceSummary, LoadError, WorkflowDefinition, WorkflowInstance,
};

/// Errors reported synchronously by the controller
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(Uuid),

    #[error("cannot {operation} instance {instance_id} while {status}")]
    InvalidState {
        instance_id: Uuid,
        status: InstanceStatus,
        operation: &'static str,
    },

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    UnknownService(#[from] UnknownServiceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("controller is shutting down")]
    ShuttingDown,
}

/// Options for [`ExecutionController::start_with`]
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Trigger name recorded on the instance
    pub trigger: Option<String>,

    /// Create the instance paused so it can be driven with `step`
    pub paused: bool,
}

impl StartOptions {
    pub fn triggered_by(trigger: impl Into<String>) -> Self {
        Self {
            trigger: Some(trigger.into()),
            paused: false,
        }
    }

    pub fn paused() -> Self {
        Self {
            trigger: None,
            paused: true,
        }
    }
}

/// Result of loading a directory of definition files
#[derive(Debug, Default)]
pub struct LoadReport {
    pub registered: Vec<String>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Builder for [`ExecutionController`]
pub struct ExecutionControllerBuilder {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    store: Option<Arc<dyn WorkflowStore>>,
    services: Vec<(String, Arc<dyn Collaborator>)>,
}

impl Default for ExecutionControllerBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidV7Generator),
            store: None,
            services: Vec::new(),
        }
    }
}

impl ExecutionControllerBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn service(mut self, name: impl Into<String>, collaborator: Arc<dyn Collaborator>) -> Self {
        self.services.push((name.into(), collaborator));
        self
    }

    pub fn build(self) -> ExecutionController {
        let resolver = VariableResolver::new(Arc::clone(&self.clock), Arc::clone(&self.ids))
            .with_policy(self.config.variable_policy);
        let dispatcher = Arc::new(ActionDispatcher::new(resolver));
        for (name, collaborator) in self.services {
            dispatcher.register_service(name, collaborator);
        }

        let executor = Arc::new(StateMachineExecutor::new(
            Arc::clone(&dispatcher),
            Arc::clone(&self.clock),
            self.store.clone(),
            self.config.clone(),
        ));

        ExecutionController {
            registry: WorkflowRegistry::new(),
            router: TriggerRouter::new(),
            dispatcher,
            executor,
            store: self.store,
            instances: DashMap::new(),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            config: self.config,
            clock: self.clock,
            ids: self.ids,
        }
    }
}

/// Manages workflow definitions and live instances
///
/// # Example
///
/// ```ignore
/// let controller = ExecutionController::builder()
///     .service("obs", Arc::new(obs))
///     .build();
///
/// controller.register_workflow(definition).await?;
/// let id = controller.start("stream_start", vars).await?;
/// let finished = controller.await_completion(id).await?;
/// ```
pub struct ExecutionController {
    registry: WorkflowRegistry,
    router: TriggerRouter,
    dispatcher: Arc<ActionDispatcher>,
    executor: Arc<StateMachineExecutor>,
    store: Option<Arc<dyn WorkflowStore>>,
    instances: DashMap<Uuid, Arc<InstanceHandle>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl std::fmt::Debug for ExecutionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionController")
            .field("registry", &self.registry)
            .field("router", &self.router)
            .field("dispatcher", &self.dispatcher)
            .field("instances", &self.instances.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionController {
    pub fn builder() -> ExecutionControllerBuilder {
        ExecutionControllerBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn router(&self) -> &TriggerRouter {
        &self.router
    }

    // ------------------------------------------------------------------
    // Definitions and services
    // ------------------------------------------------------------------

    /// Register (or replace) a collaborator under `name`
    pub fn register_service(&self, name: impl Into<String>, collaborator: Arc<dyn Collaborator>) {
        self.dispatcher.register_service(name, collaborator);
    }

    /// Validate and register a definition, subscribing its triggers
    pub async fn register_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<Arc<WorkflowDefinition>, ControllerError> {
        let definition = self.registry.register(definition)?;
        self.router.subscribe(&definition);

        if let Some(store) = &self.store {
            if let Err(e) = store.save_definition(&definition).await {
                warn!(workflow_id = %definition.id, error = %e, "failed to persist definition");
            }
        }
        Ok(definition)
    }

    /// Remove a definition; running instances keep their copy
    pub async fn unregister_workflow(&self, workflow_id: &str) -> Result<(), ControllerError> {
        self.registry
            .unregister(workflow_id)
            .ok_or_else(|| ControllerError::WorkflowNotFound(workflow_id.to_string()))?;
        self.router.unsubscribe(workflow_id);

        if let Some(store) = &self.store {
            match store.delete_definition(workflow_id).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(e) => warn!(workflow_id, error = %e, "failed to delete stored definition"),
            }
        }
        Ok(())
    }

    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        self.registry.summaries()
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.registry.get(workflow_id)
    }

    /// Register every definition file in `dir` that parses and validates
    pub async fn load_workflows_from_dir(
        &self,
        dir: impl AsRef<Path>,
    ) -> Result<LoadReport, ControllerError> {
        let mut report = LoadReport::default();

        for (path, parsed) in load_definitions_from_dir(dir)? {
            let result = match parsed {
                Ok(definition) => self
                    .register_workflow(definition)
                    .await
                    .map(|def| def.id.clone())
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match result {
                Ok(id) => report.registered.push(id),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "definition not registered");
                    report.failed.push((path, e));
                }
            }
        }

        info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            "loaded workflow directory"
        );
        Ok(report)
    }

    /// Register every definition held by the configured store
    ///
    /// Returns how many were registered; ids already present are skipped.
    pub async fn restore_definitions(&self) -> Result<usize, ControllerError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let mut restored = 0;
        for definition in store.load_definitions().await? {
            if self.registry.contains(&definition.id) {
                debug!(workflow_id = %definition.id, "definition already registered");
                continue;
            }
            let definition = self.registry.register(definition)?;
            self.router.subscribe(&definition);
            restored += 1;
        }
        Ok(restored)
    }

    // ------------------------------------------------------------------
    // Starting instances
    // ------------------------------------------------------------------

    /// Start an instance and return its id immediately
    pub async fn start(
        &self,
        workflow_id: &str,
        vars: Map<String, Value>,
    ) -> Result<Uuid, ControllerError> {
        self.start_with(workflow_id, vars, StartOptions::default())
            .await
    }

    /// Start an instance through the `manual` trigger
    pub async fn trigger_manual(
        &self,
        workflow_id: &str,
        vars: Map<String, Value>,
    ) -> Result<Uuid, ControllerError> {
        self.start_with(workflow_id, vars, StartOptions::triggered_by(MANUAL_TRIGGER))
            .await
    }

    #[instrument(skip(self, vars, options), fields(trigger = ?options.trigger, paused = options.paused))]
    pub async fn start_with(
        &self,
        workflow_id: &str,
        vars: Map<String, Value>,
        options: StartOptions,
    ) -> Result<Uuid, ControllerError> {
        if self.shutdown.is_cancelled() {
            return Err(ControllerError::ShuttingDown);
        }
        self.evict_expired();

        let definition = self
            .registry
            .get(workflow_id)
            .ok_or_else(|| ControllerError::WorkflowNotFound(workflow_id.to_string()))?;

        if let Some(missing) = definition
            .states
            .iter()
            .find(|s| !self.dispatcher.has_service(&s.action.service))
        {
            return Err(UnknownServiceError {
                service: missing.action.service.clone(),
            }
            .into());
        }

        let instance_id = self.ids.next_id();
        let mut instance = WorkflowInstance::new(
            instance_id,
            workflow_id,
            ExecutionContext::from_map(vars),
            self.clock.now(),
        );
        instance.trigger = options.trigger;
        instance.current_state = Some(definition.initial_state.clone());

        let control = if options.paused {
            RunControl::Pause
        } else {
            RunControl::Run
        };
        let handle = Arc::new(InstanceHandle::new(
            instance,
            definition,
            self.shutdown.child_token(),
            control,
        ));
        self.instances.insert(instance_id, Arc::clone(&handle));

        if let Some(store) = &self.store {
            if let Err(e) = store.save_instance(&handle.snapshot()).await {
                warn!(%instance_id, error = %e, "failed to persist instance snapshot");
            }
        }

        let executor = Arc::clone(&self.executor);
        self.tracker.spawn(async move {
            executor.drive(handle).await;
        });

        info!(%instance_id, "started workflow instance");
        Ok(instance_id)
    }

    // ------------------------------------------------------------------
    // Control operations
    // ------------------------------------------------------------------

    /// Ask the instance to pause after its in-flight action
    #[instrument(skip(self))]
    pub async fn pause(&self, instance_id: Uuid) -> Result<(), ControllerError> {
        let handle = self.handle(instance_id)?;
        let _ops = handle.lock_ops().await;

        let status = handle.status();
        if status.is_terminal() || status == InstanceStatus::Paused {
            return Err(invalid(instance_id, status, "pause"));
        }
        handle.request(RunControl::Pause);
        info!("pause requested");
        Ok(())
    }

    /// Let a paused (or pause-pending) instance continue
    #[instrument(skip(self))]
    pub async fn resume(&self, instance_id: Uuid) -> Result<(), ControllerError> {
        let handle = self.handle(instance_id)?;
        let _ops = handle.lock_ops().await;

        let status = handle.status();
        let pending_pause = handle.control() != RunControl::Run;
        if status.is_terminal() || (status != InstanceStatus::Paused && !pending_pause) {
            return Err(invalid(instance_id, status, "resume"));
        }
        handle.request(RunControl::Run);
        info!("resume requested");
        Ok(())
    }

    /// Execute exactly one state of a paused instance, then pause again
    #[instrument(skip(self))]
    pub async fn step(&self, instance_id: Uuid) -> Result<(), ControllerError> {
        let handle = self.handle(instance_id)?;
        let _ops = handle.lock_ops().await;

        let status = handle.status();
        if status != InstanceStatus::Paused {
            return Err(invalid(instance_id, status, "step"));
        }
        handle.request(RunControl::Step);
        debug!("step requested");
        Ok(())
    }

    /// Request cancellation; in-flight calls are dropped when they allow it
    #[instrument(skip(self))]
    pub async fn cancel(&self, instance_id: Uuid) -> Result<(), ControllerError> {
        let handle = self.handle(instance_id)?;
        let _ops = handle.lock_ops().await;

        let status = handle.status();
        if status.is_terminal() {
            return Err(invalid(instance_id, status, "cancel"));
        }
        handle.cancellation().cancel();
        info!("cancel requested");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn get_status(&self, instance_id: Uuid) -> Result<InstanceStatus, ControllerError> {
        match self.handle(instance_id).ok() {
            Some(handle) => Ok(handle.status()),
            None => Ok(self.stored_instance(instance_id).await?.status),
        }
    }

    pub async fn get_history(&self, instance_id: Uuid) -> Result<Vec<HistoryEntry>, ControllerError> {
        match self.handle(instance_id).ok() {
            Some(handle) => Ok(handle.read(|i| i.history.clone())),
            None => Ok(self.stored_instance(instance_id).await?.history),
        }
    }

    /// Full snapshot of an instance
    pub async fn get_instance(&self, instance_id: Uuid) -> Result<WorkflowInstance, ControllerError> {
        match self.handle(instance_id).ok() {
            Some(handle) => Ok(handle.snapshot()),
            None => self.stored_instance(instance_id).await,
        }
    }

    /// Live instances plus stored ones no longer in memory, oldest first
    pub async fn list_instances(
        &self,
        filter: &InstanceFilter,
    ) -> Result<Vec<InstanceSummary>, ControllerError> {
        let mut summaries: Vec<InstanceSummary> = self
            .instances
            .iter()
            .filter_map(|entry| {
                let instance = entry.value().snapshot();
                filter.matches(&instance).then(|| instance.summary())
            })
            .collect();

        if let Some(store) = &self.store {
            for instance in store.list_instances(filter).await? {
                if !self.instances.contains_key(&instance.instance_id) {
                    summaries.push(instance.summary());
                }
            }
        }

        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        Ok(summaries)
    }

    /// Wait until the instance's status satisfies `predicate`
    ///
    /// Returns immediately when it already does. Only live instances can be
    /// awaited.
    pub async fn wait_for_status<F>(
        &self,
        instance_id: Uuid,
        predicate: F,
    ) -> Result<InstanceStatus, ControllerError>
    where
        F: Fn(InstanceStatus) -> bool,
    {
        let handle = self.handle(instance_id)?;
        let mut rx = handle.subscribe_status();
        let status = rx
            .wait_for(|status| predicate(*status))
            .await
            .map(|status| *status)
            .map_err(|_| ControllerError::InstanceNotFound(instance_id))?;
        Ok(status)
    }

    /// Wait for a terminal status and return the final snapshot
    pub async fn await_completion(&self, instance_id: Uuid) -> Result<WorkflowInstance, ControllerError> {
        if !self.instances.contains_key(&instance_id) {
            return self.stored_instance(instance_id).await;
        }
        self.wait_for_status(instance_id, |s| s.is_terminal()).await?;
        self.get_instance(instance_id).await
    }

    // ------------------------------------------------------------------
    // Triggers and lifecycle
    // ------------------------------------------------------------------

    /// Start every workflow declaring `trigger`
    pub async fn publish_event(&self, trigger: &str, vars: Map<String, Value>) -> PublishReport {
        self.router.publish(self, trigger, vars).await
    }

    /// Drop terminal instances older than the retention window
    ///
    /// Returns how many were evicted.
    pub fn evict_expired(&self) -> usize {
        let Some(retention) = self.config.instance_retention else {
            return 0;
        };
        let retention = match chrono::Duration::from_std(retention) {
            Ok(retention) => retention,
            Err(_) => return 0,
        };
        let now = self.clock.now();

        let before = self.instances.len();
        // Only instances whose terminal status watchers have already seen
        self.instances.retain(|_, handle| {
            if !handle.status().is_terminal() {
                return true;
            }
            handle.read(|i| match i.finished_at {
                Some(finished) => now - finished < retention,
                None => true,
            })
        });
        let evicted = before.saturating_sub(self.instances.len());
        if evicted > 0 {
            debug!(evicted, "evicted finished instances");
        }
        evicted
    }

    /// Remove a terminal instance from memory right away
    pub fn evict(&self, instance_id: Uuid) -> Result<(), ControllerError> {
        let handle = self.handle(instance_id)?;
        let status = handle.status();
        if !status.is_terminal() {
            return Err(invalid(instance_id, status, "evict"));
        }
        self.instances.remove(&instance_id);
        Ok(())
    }

    /// Cancel every live instance, refuse new starts, and wait for tasks to end
    pub async fn shutdown(&self) {
        info!(live = self.instances.len(), "shutting down execution controller");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn handle(&self, instance_id: Uuid) -> Result<Arc<InstanceHandle>, ControllerError> {
        self.instances
            .get(&instance_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ControllerError::InstanceNotFound(instance_id))
    }

    async fn stored_instance(&self, instance_id: Uuid) -> Result<WorkflowInstance, ControllerError> {
        let Some(store) = &self.store else {
            return Err(ControllerError::InstanceNotFound(instance_id));
        };
        store
            .load_instance(instance_id)
            .await?
            .ok_or(ControllerError::InstanceNotFound(instance_id))
    }
}

#[async_trait]
impl WorkflowStarter for ExecutionController {
    async fn start_triggered(
        &self,
        workflow_id: &str,
        trigger: &str,
        vars: Map<String, Value>,
    ) -> Result<Uuid, ControllerError> {
        self.start_with(workflow_id, vars, StartOptions::triggered_by(trigger))
            .await
    }
}

fn invalid(instance_id: Uuid, status: InstanceStatus, operation: &'static str) -> ControllerError {
    warn!(%instance_id, %status, operation, "control operation refused");
    ControllerError::InvalidState {
        instance_id,
        status,
        operation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SequentialIdGenerator};
    use crate::persistence::InMemoryWorkflowStore;
    use crate::workflow::{StateAction, WorkflowState};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn log_workflow(id: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(id, id, "hello").with_state(
            WorkflowState::new("hello", StateAction::internal("log").with_param("message", "hi"))
                .on("success", None),
        )
    }

    fn wait_workflow(id: &str, seconds: u64) -> WorkflowDefinition {
        WorkflowDefinition::new(id, id, "wait").with_state(
            WorkflowState::new("wait", StateAction::internal("wait").with_param("seconds", seconds))
                .on("success", None),
        )
    }

    async fn completion(controller: &ExecutionController, id: Uuid) -> WorkflowInstance {
        tokio::time::timeout(Duration::from_secs(5), controller.await_completion(id))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_unknown_workflow() {
        let controller = ExecutionController::builder().build();
        let err = controller.start("nope", Map::new()).await.unwrap_err();
        assert!(matches!(err, ControllerError::WorkflowNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_start_rejects_unregistered_service() {
        let controller = ExecutionController::builder().build();
        controller
            .register_workflow(
                WorkflowDefinition::new("wf", "wf", "a")
                    .with_state(WorkflowState::new("a", StateAction::new("discord", "send"))),
            )
            .await
            .unwrap();

        let err = controller.start("wf", Map::new()).await.unwrap_err();
        assert!(matches!(err, ControllerError::UnknownService(_)));
    }

    #[tokio::test]
    async fn test_instance_ids_come_from_generator() {
        let controller = ExecutionController::builder()
            .id_generator(Arc::new(SequentialIdGenerator::new()))
            .build();
        controller.register_workflow(log_workflow("wf")).await.unwrap();

        let id = controller.start("wf", Map::new()).await.unwrap();
        assert_eq!(id, Uuid::from_u128(1));

        let done = completion(&controller, id).await;
        assert_eq!(done.status, InstanceStatus::Completed);
        assert_eq!(done.visited_states(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_control_operations_validate_status() {
        let controller = ExecutionController::builder().build();
        controller.register_workflow(log_workflow("wf")).await.unwrap();
        let id = controller.start("wf", Map::new()).await.unwrap();
        completion(&controller, id).await;

        for result in [
            controller.pause(id).await,
            controller.resume(id).await,
            controller.step(id).await,
            controller.cancel(id).await,
        ] {
            assert!(matches!(result, Err(ControllerError::InvalidState { .. })));
        }

        assert!(matches!(
            controller.pause(Uuid::nil()).await,
            Err(ControllerError::InstanceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_live_instances() {
        let controller = ExecutionController::builder().build();
        controller.register_workflow(wait_workflow("slow", 30)).await.unwrap();
        let id = controller.start("slow", Map::new()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), controller.shutdown())
            .await
            .unwrap();

        assert_eq!(controller.get_status(id).await.unwrap(), InstanceStatus::Cancelled);
        assert!(matches!(
            controller.start("slow", Map::new()).await,
            Err(ControllerError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_eviction_and_store_fallback() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let store = Arc::new(InMemoryWorkflowStore::new());
        let controller = ExecutionController::builder()
            .clock(clock.clone())
            .store(store.clone())
            .config(EngineConfig::default().with_retention(Some(Duration::from_secs(60))))
            .build();
        controller.register_workflow(log_workflow("wf")).await.unwrap();

        let id = controller.start("wf", Map::new()).await.unwrap();
        completion(&controller, id).await;
        assert_eq!(controller.evict_expired(), 0);

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(controller.evict_expired(), 1);

        // Evicted from memory, still answered from the store
        let status = controller.get_status(id).await.unwrap();
        assert_eq!(status, InstanceStatus::Completed);
        assert_eq!(controller.get_history(id).await.unwrap().len(), 1);

        let listed = controller.list_instances(&InstanceFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(store.definition_count(), 1);
    }

    #[tokio::test]
    async fn test_eviction_waits_for_published_status() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let controller = ExecutionController::builder()
            .clock(clock.clone())
            .config(EngineConfig::default().with_retention(Some(Duration::ZERO)))
            .build();
        let definition = Arc::new(log_workflow("wf"));
        let id = Uuid::now_v7();
        let instance = WorkflowInstance::new(id, "wf", ExecutionContext::from_map(Map::new()), clock.now());
        let handle = Arc::new(InstanceHandle::new(
            instance,
            definition,
            CancellationToken::new(),
            RunControl::Run,
        ));
        controller.instances.insert(id, Arc::clone(&handle));

        // Recorded as finished but not yet announced to watchers
        handle.record_status(InstanceStatus::Completed, clock.now());
        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(controller.evict_expired(), 0);
        assert!(controller.instances.contains_key(&id));

        handle.publish_status();
        assert_eq!(controller.evict_expired(), 1);
        assert!(controller.instances.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_and_restore() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let first = ExecutionController::builder().store(store.clone()).build();
        first.register_workflow(log_workflow("a")).await.unwrap();
        first.register_workflow(log_workflow("b")).await.unwrap();
        first.unregister_workflow("b").await.unwrap();
        assert!(matches!(
            first.unregister_workflow("b").await,
            Err(ControllerError::WorkflowNotFound(_))
        ));

        let second = ExecutionController::builder().store(store).build();
        assert_eq!(second.restore_definitions().await.unwrap(), 1);
        assert_eq!(second.restore_definitions().await.unwrap(), 0);
        let ids: Vec<_> = second.list_workflows().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_manual_trigger_is_recorded() {
        let controller = ExecutionController::builder().build();
        controller.register_workflow(log_workflow("wf")).await.unwrap();

        let id = controller.trigger_manual("wf", Map::new()).await.unwrap();
        let done = completion(&controller, id).await;
        assert_eq!(done.trigger.as_deref(), Some("manual"));
    }
}

//! Shared state between an instance's task and control operations

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::workflow::{InstanceStatus, WorkflowDefinition, WorkflowInstance};

/// What the executor loop should do at its next transition boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunControl {
    Run,
    Pause,
    /// Run one state, then fall back to `Pause`
    Step,
}

/// Live instance record
///
/// The instance task is the only writer of state progress; control operations
/// hold `ops` while they inspect status and post a request.
pub(crate) struct InstanceHandle {
    pub id: Uuid,
    pub definition: Arc<WorkflowDefinition>,
    instance: Mutex<WorkflowInstance>,
    status_tx: watch::Sender<InstanceStatus>,
    control_tx: watch::Sender<RunControl>,
    cancel: CancellationToken,
    ops: tokio::sync::Mutex<()>,
}

impl InstanceHandle {
    pub fn new(
        instance: WorkflowInstance,
        definition: Arc<WorkflowDefinition>,
        cancel: CancellationToken,
        control: RunControl,
    ) -> Self {
        let (status_tx, _) = watch::channel(instance.status);
        let (control_tx, _) = watch::channel(control);
        Self {
            id: instance.instance_id,
            definition,
            instance: Mutex::new(instance),
            status_tx,
            control_tx,
            cancel,
            ops: tokio::sync::Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> WorkflowInstance {
        self.instance.lock().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&WorkflowInstance) -> R) -> R {
        f(&self.instance.lock())
    }

    /// Mutate the record; `updated_at` is bumped
    pub fn update<R>(&self, now: DateTime<Utc>, f: impl FnOnce(&mut WorkflowInstance) -> R) -> R {
        let mut instance = self.instance.lock();
        let result = f(&mut instance);
        instance.updated_at = now;
        result
    }

    pub fn status(&self) -> InstanceStatus {
        *self.status_tx.borrow()
    }

    /// Change status, publishing it to watchers while the record is locked
    pub fn set_status(&self, status: InstanceStatus, now: DateTime<Utc>) {
        let mut instance = self.instance.lock();
        Self::apply_status(&mut instance, status, now);
        self.status_tx.send_replace(status);
    }

    /// Change the recorded status without notifying watchers yet
    pub fn record_status(&self, status: InstanceStatus, now: DateTime<Utc>) {
        Self::apply_status(&mut self.instance.lock(), status, now);
    }

    /// Notify watchers of the recorded status
    pub fn publish_status(&self) {
        let instance = self.instance.lock();
        self.status_tx.send_replace(instance.status);
    }

    fn apply_status(instance: &mut WorkflowInstance, status: InstanceStatus, now: DateTime<Utc>) {
        instance.status = status;
        instance.updated_at = now;
        if status.is_terminal() && instance.finished_at.is_none() {
            instance.finished_at = Some(now);
        }
    }

    pub fn subscribe_status(&self) -> watch::Receiver<InstanceStatus> {
        self.status_tx.subscribe()
    }

    pub fn control(&self) -> RunControl {
        *self.control_tx.borrow()
    }

    pub fn request(&self, control: RunControl) {
        self.control_tx.send_replace(control);
    }

    pub fn subscribe_control(&self) -> watch::Receiver<RunControl> {
        self.control_tx.subscribe()
    }

    /// Turn a consumed `Step` back into `Pause`
    pub fn finish_step(&self) {
        self.control_tx.send_if_modified(|control| {
            if *control == RunControl::Step {
                *control = RunControl::Pause;
                true
            } else {
                false
            }
        });
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Serialize control operations on this instance
    pub async fn lock_ops(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.ops.lock().await
    }
}

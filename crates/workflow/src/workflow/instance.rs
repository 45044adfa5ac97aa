//! Workflow instance run records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{EventToken, ExecutionContext};

/// Lifecycle status of an instance
///
/// ```text
/// pending → running → {paused, waiting_timeout} → running → {completed, failed, cancelled}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Created, loop not yet scheduled
    Pending,

    /// Loop is executing states
    Running,

    /// Suspended at a transition boundary
    Paused,

    /// An action guarded by `timeout_seconds` is in flight
    WaitingTimeout,

    Completed,

    Failed,

    Cancelled,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::WaitingTimeout => write!(f, "waiting_timeout"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One dispatched action attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub state: String,
    pub event: EventToken,
    /// 1-based attempt number within the state
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

/// One execution of a workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub instance_id: Uuid,
    pub workflow_id: String,
    /// Trigger that started the instance, if any
    pub trigger: Option<String>,
    pub status: InstanceStatus,
    pub current_state: Option<String>,
    pub context: ExecutionContext,
    pub history: Vec<HistoryEntry>,
    /// Message of the failure that ended the instance
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    pub fn new(
        instance_id: Uuid,
        workflow_id: impl Into<String>,
        context: ExecutionContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_id,
            workflow_id: workflow_id.into(),
            trigger: None,
            status: InstanceStatus::Pending,
            current_state: None,
            context,
            history: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// State names in dispatch order (retries appear once per attempt)
    pub fn visited_states(&self) -> Vec<&str> {
        self.history.iter().map(|h| h.state.as_str()).collect()
    }

    pub fn last_event(&self) -> Option<&EventToken> {
        self.history.last().map(|h| &h.event)
    }

    /// Lightweight listing view
    pub fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            instance_id: self.instance_id,
            workflow_id: self.workflow_id.clone(),
            status: self.status,
            current_state: self.current_state.clone(),
            trigger: self.trigger.clone(),
            created_at: self.created_at,
            finished_at: self.finished_at,
            history_len: self.history.len(),
        }
    }
}

/// Listing view of an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub instance_id: Uuid,
    pub workflow_id: String,
    pub status: InstanceStatus,
    pub current_state: Option<String>,
    pub trigger: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub history_len: usize,
}

/// Filter for listing instances
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub workflow_id: Option<String>,
    pub status: Option<InstanceStatus>,
}

impl InstanceFilter {
    pub fn workflow(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: Some(workflow_id.into()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, instance: &WorkflowInstance) -> bool {
        self.workflow_id
            .as_deref()
            .map_or(true, |id| instance.workflow_id == id)
            && self.status.map_or(true, |s| instance.status == s)
    }
}

//! WorkflowStore trait definition

use async_trait::async_trait;
use uuid::Uuid;

use crate::workflow::{InstanceFilter, WorkflowDefinition, WorkflowInstance};

/// Error type for store operations
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend failure (connection, I/O, ...)
    #[error("store backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable copies of definitions and instance snapshots
///
/// The controller writes through this trait but never reads from it on the
/// hot path; in-memory state stays authoritative while an instance is live.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert or replace a definition
    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), StoreError>;

    async fn delete_definition(&self, workflow_id: &str) -> Result<(), StoreError>;

    /// All stored definitions, in the order they were first saved
    async fn load_definitions(&self) -> Result<Vec<WorkflowDefinition>, StoreError>;

    /// Insert or replace an instance snapshot
    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    async fn load_instance(&self, instance_id: Uuid) -> Result<Option<WorkflowInstance>, StoreError>;

    /// Snapshots matching `filter`, oldest first
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<WorkflowInstance>, StoreError>;
}

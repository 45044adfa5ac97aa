//! In-memory store for tests and single-process deployments

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{StoreError, WorkflowStore};
use crate::workflow::{InstanceFilter, WorkflowDefinition, WorkflowInstance};

#[derive(Debug, Default)]
struct Definitions {
    by_id: HashMap<String, WorkflowDefinition>,
    order: Vec<String>,
}

/// [`WorkflowStore`] backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    definitions: RwLock<Definitions>,
    instances: RwLock<HashMap<Uuid, WorkflowInstance>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.read().order.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
        let mut defs = self.definitions.write();
        if !defs.by_id.contains_key(&definition.id) {
            defs.order.push(definition.id.clone());
        }
        defs.by_id.insert(definition.id.clone(), definition.clone());
        Ok(())
    }

    async fn delete_definition(&self, workflow_id: &str) -> Result<(), StoreError> {
        let mut defs = self.definitions.write();
        if defs.by_id.remove(workflow_id).is_none() {
            return Err(StoreError::NotFound(format!("workflow {workflow_id}")));
        }
        defs.order.retain(|id| id != workflow_id);
        Ok(())
    }

    async fn load_definitions(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let defs = self.definitions.read();
        Ok(defs
            .order
            .iter()
            .filter_map(|id| defs.by_id.get(id).cloned())
            .collect())
    }

    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        self.instances
            .write()
            .insert(instance.instance_id, instance.clone());
        Ok(())
    }

    async fn load_instance(&self, instance_id: Uuid) -> Result<Option<WorkflowInstance>, StoreError> {
        Ok(self.instances.read().get(&instance_id).cloned())
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<WorkflowInstance>, StoreError> {
        let mut matching: Vec<WorkflowInstance> = self
            .instances
            .read()
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        Ok(matching)
    }
}

//! Registry of validated workflow definitions
//!
//! Definitions are stored behind `Arc` and never mutated after acceptance, so
//! running instances keep the exact definition they started with even if the
//! id is later unregistered.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::validate::{validate_definition, DefinitionError};
use crate::workflow::WorkflowDefinition;

/// Listing view of a registered definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub triggers: Vec<String>,
    pub state_count: usize,
}

impl From<&WorkflowDefinition> for WorkflowSummary {
    fn from(def: &WorkflowDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            version: def.version.clone(),
            author: def.author.clone(),
            tags: def.tags.clone(),
            triggers: def.triggers.clone(),
            state_count: def.states.len(),
        }
    }
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<String, Arc<WorkflowDefinition>>,
    order: Vec<String>,
}

/// Registry of workflow definitions
///
/// Lookups by id, listing in registration order.
#[derive(Default)]
pub struct WorkflowRegistry {
    entries: RwLock<Entries>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a definition
    pub fn register(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<Arc<WorkflowDefinition>, DefinitionError> {
        validate_definition(&definition)?;

        let mut entries = self.entries.write();
        if entries.by_id.contains_key(&definition.id) {
            return Err(DefinitionError::DuplicateId(definition.id));
        }

        let id = definition.id.clone();
        let definition = Arc::new(definition);
        entries.by_id.insert(id.clone(), Arc::clone(&definition));
        entries.order.push(id);

        info!(
            workflow_id = %definition.id,
            states = definition.states.len(),
            triggers = ?definition.triggers,
            "registered workflow"
        );
        Ok(definition)
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.entries.read().by_id.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().by_id.contains_key(id)
    }

    /// All definitions in registration order
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|id| entries.by_id.get(id).cloned())
            .collect()
    }

    pub fn summaries(&self) -> Vec<WorkflowSummary> {
        self.list()
            .iter()
            .map(|def| WorkflowSummary::from(def.as_ref()))
            .collect()
    }

    /// Remove a definition, returning it if it was registered
    pub fn unregister(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        let mut entries = self.entries.write();
        let removed = entries.by_id.remove(id)?;
        entries.order.retain(|existing| existing != id);
        info!(workflow_id = %id, "unregistered workflow");
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflows", &self.entries.read().order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{StateAction, WorkflowState};

    fn definition(id: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(id, format!("Workflow {id}"), "only")
            .with_trigger("follow")
            .with_state(WorkflowState::new("only", StateAction::internal("log")).on("success", None))
    }

    #[test]
    fn test_register_and_get() {
        let registry = WorkflowRegistry::new();
        let stored = registry.register(definition("greet")).unwrap();

        assert_eq!(stored.id, "greet");
        assert!(registry.contains("greet"));
        assert_eq!(registry.get("greet").unwrap().name, "Workflow greet");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = WorkflowRegistry::new();
        registry.register(definition("greet")).unwrap();

        assert_eq!(
            registry.register(definition("greet")).unwrap_err(),
            DefinitionError::DuplicateId("greet".to_string())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_definition_not_stored() {
        let registry = WorkflowRegistry::new();
        let mut def = definition("bad");
        def.initial_state = "nope".to_string();

        assert!(registry.register(def).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let registry = WorkflowRegistry::new();
        for id in ["zeta", "alpha", "mid"] {
            registry.register(definition(id)).unwrap();
        }

        let ids: Vec<_> = registry.list().iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);

        let summaries = registry.summaries();
        assert_eq!(summaries[1].id, "alpha");
        assert_eq!(summaries[1].state_count, 1);
        assert_eq!(summaries[1].triggers, vec!["follow".to_string()]);
    }

    #[test]
    fn test_unregister() {
        let registry = WorkflowRegistry::new();
        registry.register(definition("a")).unwrap();
        let held = registry.get("a").unwrap();

        assert!(registry.unregister("a").is_some());
        assert!(registry.unregister("a").is_none());
        assert!(!registry.contains("a"));
        assert_eq!(held.id, "a");

        registry.register(definition("a")).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_debug_lists_ids() {
        let registry = WorkflowRegistry::new();
        registry.register(definition("a")).unwrap();
        assert!(format!("{registry:?}").contains("\"a\""));
    }
}

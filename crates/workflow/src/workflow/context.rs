//! Execution context threaded through an instance

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mutable variable bag consulted by the resolver
///
/// Seeded with the start variables, then extended after every state with the
/// action's outcome under the state's name:
///
/// ```text
/// { "<state>": { "result": <value>, <flattened object fields>... } }
/// { "<state>": { "error": <error payload> } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    vars: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(vars: Map<String, Value>) -> Self {
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Walk a dotted path (`stream.title`, `items.0.name`) into the context
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.vars.get(segments.next()?)?;

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    /// Merge top-level variables, overwriting existing keys
    pub fn extend(&mut self, vars: Map<String, Value>) {
        self.vars.extend(vars);
    }

    /// Record a state's successful result
    pub fn record_result(&mut self, state: &str, result: &Value) {
        let mut entry = Map::new();
        if let Value::Object(fields) = result {
            for (key, value) in fields {
                entry.insert(key.clone(), value.clone());
            }
        }
        entry.insert("result".to_string(), result.clone());
        self.vars.insert(state.to_string(), Value::Object(entry));
    }

    /// Record a state's failure payload
    pub fn record_error(&mut self, state: &str, error: &Value) {
        let mut entry = Map::new();
        entry.insert("error".to_string(), error.clone());
        self.vars.insert(state.to_string(), Value::Object(entry));
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.vars
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl From<Map<String, Value>> for ExecutionContext {
    fn from(vars: Map<String, Value>) -> Self {
        Self::from_map(vars)
    }
}

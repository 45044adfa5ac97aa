//! `${...}` template resolution

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::clock::{Clock, IdGenerator, SystemClock, UuidV7Generator};
use crate::workflow::ExecutionContext;

static TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][\w\-]*(?:\.[\w\-]+)*)\}").expect("template pattern is a valid regex")
});

/// What to do with a reference that names nothing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariablePolicy {
    /// Substitute an empty string and log a warning
    #[default]
    Lenient,

    /// Fail with [`VariableError::Unresolved`]
    Strict,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VariableError {
    #[error("unresolved variable reference: ${{{reference}}}")]
    Unresolved { reference: String },
}

/// Substitutes `${path}` markers using built-ins and the execution context
///
/// Built-ins (checked before the context, single-segment names only):
///
/// | name        | value                            |
/// |-------------|----------------------------------|
/// | `date`      | `YYYY-MM-DD`                     |
/// | `time`      | `HH:MM:SS`                       |
/// | `now`       | RFC 3339 timestamp               |
/// | `timestamp` | alias of `now`                   |
/// | `uuid`      | fresh id from the id generator   |
///
/// A string consisting of exactly one marker is replaced by the referenced
/// value with its JSON type intact. Markers embedded in a longer string are
/// interpolated as text. Substituted values are never scanned again.
#[derive(Clone)]
pub struct VariableResolver {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    policy: VariablePolicy,
}

impl std::fmt::Debug for VariableResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableResolver")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for VariableResolver {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(UuidV7Generator))
    }
}

impl VariableResolver {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            clock,
            ids,
            policy: VariablePolicy::Lenient,
        }
    }

    pub fn with_policy(mut self, policy: VariablePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> VariablePolicy {
        self.policy
    }

    /// Resolve every marker in `value`, walking nested objects and arrays
    ///
    /// Object keys are left untouched.
    pub fn resolve(&self, value: &Value, ctx: &ExecutionContext) -> Result<Value, VariableError> {
        match value {
            Value::String(template) => self.resolve_str(template, ctx),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => self.resolve_params(map, ctx).map(Value::Object),
            literal => Ok(literal.clone()),
        }
    }

    /// Resolve an action's parameter map
    pub fn resolve_params(
        &self,
        params: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>, VariableError> {
        params
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.resolve(value, ctx)?)))
            .collect()
    }

    /// Resolve a single template string
    pub fn resolve_str(&self, template: &str, ctx: &ExecutionContext) -> Result<Value, VariableError> {
        let mut matches = TEMPLATE.captures_iter(template).peekable();
        if matches.peek().is_none() {
            return Ok(Value::String(template.to_string()));
        }

        let mut out = String::with_capacity(template.len());
        let mut last = 0;

        for caps in matches {
            let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
                continue;
            };

            if whole.start() == 0 && whole.end() == template.len() {
                return Ok(self.value_of(path.as_str(), ctx)?.unwrap_or_else(|| Value::String(String::new())));
            }

            out.push_str(&template[last..whole.start()]);
            if let Some(value) = self.value_of(path.as_str(), ctx)? {
                out.push_str(&stringify(&value));
            }
            last = whole.end();
        }

        out.push_str(&template[last..]);
        Ok(Value::String(out))
    }

    /// `Ok(None)` is an unresolved reference tolerated by the lenient policy
    fn value_of(&self, path: &str, ctx: &ExecutionContext) -> Result<Option<Value>, VariableError> {
        if let Some(value) = self.builtin(path) {
            return Ok(Some(value));
        }
        if let Some(value) = ctx.lookup(path) {
            return Ok(Some(value.clone()));
        }

        match self.policy {
            VariablePolicy::Strict => Err(VariableError::Unresolved {
                reference: path.to_string(),
            }),
            VariablePolicy::Lenient => {
                warn!(reference = %path, "unresolved variable, substituting empty string");
                Ok(None)
            }
        }
    }

    fn builtin(&self, name: &str) -> Option<Value> {
        let value = match name {
            "date" => self.clock.now().format("%Y-%m-%d").to_string(),
            "time" => self.clock.now().format("%H:%M:%S").to_string(),
            "now" | "timestamp" => self.clock.now().to_rfc3339(),
            "uuid" => self.ids.next_id().to_string(),
            _ => return None,
        };
        Some(Value::String(value))
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SequentialIdGenerator};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn resolver() -> VariableResolver {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 9, 18, 30, 5).unwrap());
        VariableResolver::new(Arc::new(clock), Arc::new(SequentialIdGenerator::new()))
    }

    fn ctx(vars: Value) -> ExecutionContext {
        match vars {
            Value::Object(map) => ExecutionContext::from_map(map),
            _ => ExecutionContext::new(),
        }
    }

    #[test]
    fn test_interpolates_inside_text() {
        let ctx = ctx(json!({"stream_title": "Speedrun", "viewers": 12}));
        let out = resolver()
            .resolve_str("Live: ${stream_title} (${viewers} watching)", &ctx)
            .unwrap();
        assert_eq!(out, json!("Live: Speedrun (12 watching)"));
    }

    #[test]
    fn test_whole_marker_keeps_type() {
        let ctx = ctx(json!({"countdown_seconds": 0, "tags": ["a", "b"]}));
        let r = resolver();
        assert_eq!(r.resolve_str("${countdown_seconds}", &ctx).unwrap(), json!(0));
        assert_eq!(r.resolve_str("${tags}", &ctx).unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn test_dotted_paths_and_state_results() {
        let mut c = ExecutionContext::new();
        c.record_result("fetch", &json!({"user": {"name": "ana"}}));
        let out = resolver().resolve_str("hi ${fetch.user.name}", &c).unwrap();
        assert_eq!(out, json!("hi ana"));
    }

    #[test]
    fn test_builtins_are_deterministic_with_injected_sources() {
        let empty = ExecutionContext::new();
        let a = resolver();
        let b = resolver();

        for template in ["${date}", "${time}", "${now}", "${uuid}"] {
            assert_eq!(
                a.resolve_str(template, &empty).unwrap(),
                b.resolve_str(template, &empty).unwrap()
            );
        }

        let r = resolver();
        assert_eq!(r.resolve_str("${date}", &empty).unwrap(), json!("2024-03-09"));
        assert_eq!(r.resolve_str("${time}", &empty).unwrap(), json!("18:30:05"));
        assert_eq!(
            r.resolve_str("${timestamp}", &empty).unwrap(),
            json!("2024-03-09T18:30:05+00:00")
        );
        assert_eq!(
            r.resolve_str("${uuid}", &empty).unwrap(),
            json!("00000000-0000-0000-0000-000000000001")
        );
    }

    #[test]
    fn test_builtins_shadow_context() {
        let c = ctx(json!({"date": "yesterday"}));
        assert_eq!(resolver().resolve_str("${date}", &c).unwrap(), json!("2024-03-09"));
    }

    #[test]
    fn test_lenient_substitutes_empty_string() {
        let empty = ExecutionContext::new();
        let r = resolver();
        assert_eq!(r.resolve_str("${missing}", &empty).unwrap(), json!(""));
        assert_eq!(r.resolve_str("[${missing}]", &empty).unwrap(), json!("[]"));
    }

    #[test]
    fn test_strict_fails_on_unresolved() {
        let r = resolver().with_policy(VariablePolicy::Strict);
        let err = r
            .resolve_str("title ${stream.title}", &ExecutionContext::new())
            .unwrap_err();
        assert_eq!(
            err,
            VariableError::Unresolved {
                reference: "stream.title".to_string()
            }
        );
        assert_eq!(err.to_string(), "unresolved variable reference: ${stream.title}");
    }

    #[test]
    fn test_resolved_values_are_not_rescanned() {
        let c = ctx(json!({"chat": "${secret}", "secret": "hunter2"}));
        let r = resolver();

        let once = r.resolve_str("said: ${chat}", &c).unwrap();
        assert_eq!(once, json!("said: ${secret}"));
    }

    #[test]
    fn test_resolution_is_idempotent_on_literals() {
        let c = ctx(json!({"game": "Celeste"}));
        let r = resolver();
        let params = json!({"title": "Playing ${game}", "nested": [{"n": 1}, "${game}"], "flag": true});

        let once = r.resolve(&params, &c).unwrap();
        let twice = r.resolve(&once, &c).unwrap();

        assert_eq!(once, twice);
        assert_eq!(once["nested"][1], json!("Celeste"));
    }

    #[test]
    fn test_non_string_interpolation() {
        let c = ctx(json!({"obj": {"a": 1}, "nothing": null}));
        let r = resolver();
        assert_eq!(r.resolve_str("v=${obj}", &c).unwrap(), json!("v={\"a\":1}"));
        assert_eq!(r.resolve_str("v=${nothing}", &c).unwrap(), json!("v="));
    }

    #[test]
    fn test_malformed_markers_are_literal() {
        let r = resolver();
        let out = r.resolve_str("cost: $5 ${ } ${1abc}", &ExecutionContext::new()).unwrap();
        assert_eq!(out, json!("cost: $5 ${ } ${1abc}"));
    }
}

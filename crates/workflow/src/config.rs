//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::variables::VariablePolicy;

/// Default cap on executed actions per instance
pub const DEFAULT_MAX_STEPS: u64 = 10_000;

/// Default cap on stored history entries per instance
pub const DEFAULT_MAX_HISTORY: usize = 1_000;

/// Default time terminal instances stay in the live set
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Configuration for the execution controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How unresolved `${...}` references are handled
    #[serde(default)]
    pub variable_policy: VariablePolicy,

    /// Actions an instance may execute before it is failed (cycle guard)
    #[serde(default = "default_max_steps")]
    pub max_steps_per_instance: u64,

    /// How long terminal instances remain queryable in memory
    ///
    /// `None` keeps them until evicted explicitly.
    #[serde(default = "default_retention", with = "option_duration_millis")]
    pub instance_retention: Option<Duration>,

    /// History entries kept per instance; the oldest are dropped first
    #[serde(default = "default_max_history")]
    pub max_history_entries: usize,
}

fn default_max_steps() -> u64 {
    DEFAULT_MAX_STEPS
}

fn default_retention() -> Option<Duration> {
    Some(DEFAULT_RETENTION)
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            variable_policy: VariablePolicy::Lenient,
            max_steps_per_instance: DEFAULT_MAX_STEPS,
            instance_retention: Some(DEFAULT_RETENTION),
            max_history_entries: DEFAULT_MAX_HISTORY,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `STREAMFLOW_STRICT_VARIABLES`: "true" or "1" for strict resolution
    /// - `STREAMFLOW_MAX_STEPS`: Cycle guard (default: 10000)
    /// - `STREAMFLOW_INSTANCE_RETENTION_SECS`: Retention in seconds, "none" to keep
    /// - `STREAMFLOW_MAX_HISTORY`: History cap (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let variable_policy = match std::env::var("STREAMFLOW_STRICT_VARIABLES") {
            Ok(v) if v == "1" || v.eq_ignore_ascii_case("true") => VariablePolicy::Strict,
            _ => defaults.variable_policy,
        };

        let max_steps_per_instance = std::env::var("STREAMFLOW_MAX_STEPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_steps_per_instance);

        let instance_retention = match std::env::var("STREAMFLOW_INSTANCE_RETENTION_SECS") {
            Ok(v) if v.eq_ignore_ascii_case("none") => None,
            Ok(v) => v
                .parse::<u64>()
                .map(|secs| Some(Duration::from_secs(secs)))
                .unwrap_or(defaults.instance_retention),
            Err(_) => defaults.instance_retention,
        };

        let max_history_entries = std::env::var("STREAMFLOW_MAX_HISTORY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_history_entries);

        Self {
            variable_policy,
            max_steps_per_instance,
            instance_retention,
            max_history_entries,
        }
    }

    pub fn with_variable_policy(mut self, policy: VariablePolicy) -> Self {
        self.variable_policy = policy;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps_per_instance = max_steps;
        self
    }

    pub fn with_retention(mut self, retention: Option<Duration>) -> Self {
        self.instance_retention = retention;
        self
    }

    pub fn with_max_history(mut self, entries: usize) -> Self {
        self.max_history_entries = entries;
        self
    }
}

mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

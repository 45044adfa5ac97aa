//! Event tokens used to select transitions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized outcome label of an action
///
/// The three well-known tokens are modeled as variants so the engine never
/// compares raw strings for them. Collaborator-defined outcomes (for example
/// `"cancel"` or `"condition_true"`) travel as [`EventToken::Custom`].
///
/// Serialized as a plain string: `"success"`, `"error"`, `"timeout"`, or the
/// custom name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventToken {
    /// The action completed successfully
    Success,

    /// The action failed (after any retries)
    Error,

    /// The state exceeded its `timeout_seconds`
    Timeout,

    /// Any other collaborator-defined outcome
    Custom(String),
}

impl EventToken {
    pub const SUCCESS: &'static str = "success";
    pub const ERROR: &'static str = "error";
    pub const TIMEOUT: &'static str = "timeout";

    /// Build a token from its string form
    pub fn parse(name: &str) -> Self {
        match name {
            Self::SUCCESS => Self::Success,
            Self::ERROR => Self::Error,
            Self::TIMEOUT => Self::Timeout,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Create a custom token
    pub fn custom(name: impl Into<String>) -> Self {
        Self::parse(&name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => Self::SUCCESS,
            Self::Error => Self::ERROR,
            Self::Timeout => Self::TIMEOUT,
            Self::Custom(name) => name,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn is_well_known(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl From<String> for EventToken {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for EventToken {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<EventToken> for String {
    fn from(token: EventToken) -> Self {
        match token {
            EventToken::Custom(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_tokens_parse_to_variants() {
        assert_eq!(EventToken::parse("success"), EventToken::Success);
        assert_eq!(EventToken::parse("error"), EventToken::Error);
        assert_eq!(EventToken::parse("timeout"), EventToken::Timeout);
        assert_eq!(
            EventToken::parse("cancel"),
            EventToken::Custom("cancel".to_string())
        );
    }

    #[test]
    fn test_custom_constructor_normalizes_known_names() {
        assert_eq!(EventToken::custom("error"), EventToken::Error);
        assert!(!EventToken::custom("path_a").is_well_known());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&EventToken::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");

        let parsed: EventToken = serde_json::from_str("\"raid\"").unwrap();
        assert_eq!(parsed, EventToken::Custom("raid".to_string()));
        assert_eq!(parsed.to_string(), "raid");
    }
}

//! Runtime configuration.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default ceiling for scheduler passes and immediate-scope passes.
pub const DEFAULT_RECURSION_LIMIT: usize = 42;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Maximum number of passes a single flush may run before failing.
    pub recursion_limit: usize,

    /// Maximum number of passes the immediate-scope loop may run for one write.
    pub immediate_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            immediate_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recursion_ceiling() {
        let config = Config::default();
        assert_eq!(config.recursion_limit, 42);
        assert_eq!(config.immediate_limit, 42);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{ "recursion_limit": 7 }"#).unwrap();
        assert_eq!(config.recursion_limit, 7);
        assert_eq!(config.immediate_limit, 42);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Config::from_json(r#"{ "depth": 1 }"#).is_err());
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Desired or applied configuration, keyed by option name.
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// A single configuration value. Option types differ per key.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean option.
    Bool(bool),

    /// Integer option.
    Int(i64),

    /// String option.
    String(String),
}

impl ConfigValue {
    /// Returns the value as a string slice, if it is a string option.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the value as a boolean, if it is a boolean option.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json() {
        let map: ConfigMap = serde_json::from_str(
            r#"{"microceph": true, "mode": "cluster", "retries": 3, "snap-channel-lxd": ""}"#,
        )
        .unwrap();

        assert_eq!(map["microceph"], ConfigValue::Bool(true));
        assert_eq!(map["mode"], ConfigValue::from("cluster"));
        assert_eq!(map["retries"], ConfigValue::Int(3));
        assert_eq!(map["snap-channel-lxd"].as_str(), Some(""));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(ConfigValue::Bool(false).as_bool(), Some(false));
        assert_eq!(ConfigValue::Bool(false).as_str(), None);
        assert_eq!(ConfigValue::from("x").as_bool(), None);
        assert_eq!(ConfigValue::Int(7).to_string(), "7");
    }
}

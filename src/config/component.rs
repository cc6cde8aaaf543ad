//! Per-component option mappings.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::ConfigurationError;

/// Immutable option mapping handed to a single provider, plugin or output.
///
/// Accessors are lenient: a key that is absent or holds a value of the wrong
/// type reads as `None`. Components that need strict checking do so in their
/// own `validate_config`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentConfig {
    values: Arc<Map<String, Value>>,
}

impl ComponentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    /// Build from a JSON value; anything other than an object yields an empty config.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map),
            _ => Self::default(),
        }
    }

    /// Return a copy with `key` set to `value`.
    pub fn with(&self, key: &str, value: impl Into<Value>) -> Self {
        let mut map = (*self.values).clone();
        map.insert(key.to_string(), value.into());
        Self::from_map(map)
    }

    /// Return a copy with every key of `other` layered on top.
    pub fn merged(&self, other: &ComponentConfig) -> Self {
        let mut map = (*self.values).clone();
        for (key, value) in other.values.iter() {
            map.insert(key.clone(), value.clone());
        }
        Self::from_map(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    /// Non-blank string value, or a [`ConfigurationError`] naming `component`.
    pub fn require_str(&self, component: &str, key: &str) -> Result<&str, ConfigurationError> {
        match self.get_str(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigurationError::missing_key(component, key)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Map<String, Value>> for ComponentConfig {
    fn from(values: Map<String, Value>) -> Self {
        Self::from_map(values)
    }
}

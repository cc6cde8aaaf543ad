//! Priority-ordered plugin chain.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::traits::Plugin;
use crate::error::PluginError;

/// Order in which post-processing walks the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessOrder {
    /// Same order as pre-processing: lowest priority first.
    #[default]
    Ascending,
    /// Highest priority first, so the first plugin to see the input is the
    /// last to see the output.
    Reverse,
}

impl PostProcessOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Reverse => "reverse",
        }
    }
}

impl fmt::Display for PostProcessOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostProcessOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ascending" => Ok(Self::Ascending),
            "reverse" => Ok(Self::Reverse),
            other => Err(format!(
                "unknown post-process order `{other}` (expected ascending or reverse)"
            )),
        }
    }
}

#[derive(Clone)]
struct Registration {
    name: String,
    plugin: Arc<dyn Plugin>,
    priority: i32,
    seq: u64,
}

#[derive(Default)]
struct State {
    entries: Vec<Registration>,
    next_seq: u64,
    order: PostProcessOrder,
}

/// Agent-scoped plugin table.
///
/// Entries stay sorted by `(priority, registration sequence)`, so equal
/// priorities run in registration order. Re-registering a name replaces the
/// old entry and counts as a new registration.
#[derive(Default)]
pub struct PluginPipeline {
    state: RwLock<State>,
}

impl PluginPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(order: PostProcessOrder) -> Self {
        let pipeline = Self::new();
        pipeline.set_post_process_order(order);
        pipeline
    }

    /// Add or replace `name`, using the plugin's declared priority.
    pub fn register(&self, name: &str, plugin: Arc<dyn Plugin>) {
        let priority = plugin.priority();
        self.register_with_priority(name, plugin, priority);
    }

    /// Add or replace `name` with an explicit priority.
    pub fn register_with_priority(&self, name: &str, plugin: Arc<dyn Plugin>, priority: i32) {
        let mut state = self.state.write();
        state.entries.retain(|entry| entry.name != name);

        let seq = state.next_seq;
        state.next_seq += 1;
        let registration = Registration {
            name: name.to_string(),
            plugin,
            priority,
            seq,
        };
        let at = state
            .entries
            .partition_point(|entry| (entry.priority, entry.seq) < (priority, seq));
        state.entries.insert(at, registration);

        tracing::debug!(plugin = name, priority, "Registered plugin");
    }

    /// Remove `name`; returns whether anything was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut state = self.state.write();
        let before = state.entries.len();
        state.entries.retain(|entry| entry.name != name);
        let removed = state.entries.len() != before;
        if removed {
            tracing::debug!(plugin = name, "Unregistered plugin");
        }
        removed
    }

    pub fn set_post_process_order(&self, order: PostProcessOrder) {
        self.state.write().order = order;
    }

    pub fn post_process_order(&self) -> PostProcessOrder {
        self.state.read().order
    }

    /// Ordered, lock-free view of the chain as it is right now.
    pub fn snapshot(&self) -> PipelineSnapshot {
        let state = self.state.read();
        PipelineSnapshot {
            plugins: state
                .entries
                .iter()
                .map(|entry| (entry.name.clone(), Arc::clone(&entry.plugin)))
                .collect(),
            order: state.order,
        }
    }

    pub fn pre_process(&self, text: &str) -> Result<String, PluginError> {
        self.snapshot().pre_process(text)
    }

    pub fn post_process(&self, text: &str) -> Result<String, PluginError> {
        self.snapshot().post_process(text)
    }

    /// Registered names in execution order.
    pub fn names(&self) -> Vec<String> {
        self.state
            .read()
            .entries
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.read().entries.iter().any(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

/// Request-scoped copy of the chain.
#[derive(Clone)]
pub struct PipelineSnapshot {
    plugins: Vec<(String, Arc<dyn Plugin>)>,
    order: PostProcessOrder,
}

impl PipelineSnapshot {
    /// Run every pre-process hook in ascending priority order.
    pub fn pre_process(&self, text: &str) -> Result<String, PluginError> {
        let mut current = text.to_string();
        for (name, plugin) in &self.plugins {
            current = plugin
                .pre_process(&current)
                .map_err(|e| PluginError::new(name, format!("pre-process failed: {e:#}")))?;
        }
        Ok(current)
    }

    /// Run every post-process hook in the configured order.
    pub fn post_process(&self, text: &str) -> Result<String, PluginError> {
        let mut current = text.to_string();
        let apply = |current: &str, (name, plugin): &(String, Arc<dyn Plugin>)| {
            plugin
                .post_process(current)
                .map_err(|e| PluginError::new(name, format!("post-process failed: {e:#}")))
        };

        match self.order {
            PostProcessOrder::Ascending => {
                for entry in &self.plugins {
                    current = apply(&current, entry)?;
                }
            }
            PostProcessOrder::Reverse => {
                for entry in self.plugins.iter().rev() {
                    current = apply(&current, entry)?;
                }
            }
        }
        Ok(current)
    }

    pub fn order(&self) -> PostProcessOrder {
        self.order
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

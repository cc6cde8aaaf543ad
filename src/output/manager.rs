use parking_lot::RwLock;
use std::sync::Arc;

use super::traits::OutputSink;
use crate::error::OutputError;

#[derive(Default)]
struct State {
    sinks: Vec<(String, Arc<dyn OutputSink>)>,
    default: Option<String>,
}

impl State {
    fn position(&self, name: &str) -> Option<usize> {
        self.sinks.iter().position(|(n, _)| n == name)
    }

    /// Replace the sink under `name` in place, or append it.
    fn insert(&mut self, name: &str, sink: Arc<dyn OutputSink>) {
        match self.position(name) {
            Some(index) => self.sinks[index].1 = sink,
            None => self.sinks.push((name.to_string(), sink)),
        }
    }
}

/// Agent-scoped table of output sinks with one default.
///
/// The first registered sink becomes the default unless another is
/// designated. The default sink cannot be unregistered.
#[derive(Default)]
pub struct OutputManager {
    state: RwLock<State>,
}

impl OutputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `sink` under `name`, replacing any sink already registered there.
    pub fn register(&self, name: &str, sink: Arc<dyn OutputSink>) {
        let mut state = self.state.write();
        state.insert(name, sink);
        if state.default.is_none() {
            state.default = Some(name.to_string());
        }
        tracing::debug!(output = name, "Registered output sink");
    }

    /// Register `sink` and make it the default in one step.
    pub fn register_default(&self, name: &str, sink: Arc<dyn OutputSink>) {
        let mut state = self.state.write();
        state.insert(name, sink);
        state.default = Some(name.to_string());
        tracing::debug!(output = name, "Registered default output sink");
    }

    /// Remove `name`. Returns `Ok(false)` when nothing was registered there.
    pub fn unregister(&self, name: &str) -> Result<bool, OutputError> {
        let mut state = self.state.write();
        if state.default.as_deref() == Some(name) {
            return Err(OutputError::new(name, "cannot unregister the default output"));
        }
        match state.position(name) {
            Some(index) => {
                state.sinks.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_default(&self, name: &str) -> Result<(), OutputError> {
        let mut state = self.state.write();
        if state.position(name).is_none() {
            return Err(OutputError::new(name, "output not registered"));
        }
        state.default = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<String> {
        self.state.read().default.clone()
    }

    /// Resolve `name` (or the default when `None`) to its registered name and sink.
    pub fn resolve(
        &self,
        name: Option<&str>,
    ) -> Result<(String, Arc<dyn OutputSink>), OutputError> {
        let state = self.state.read();
        let target = match name.or(state.default.as_deref()) {
            Some(target) => target,
            None => return Err(OutputError::new("<default>", "no output registered")),
        };
        state
            .sinks
            .iter()
            .find(|(n, _)| n == target)
            .map(|(n, sink)| (n.clone(), Arc::clone(sink)))
            .ok_or_else(|| OutputError::new(target, "output not registered"))
    }

    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn OutputSink>, OutputError> {
        self.resolve(name).map(|(_, sink)| sink)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.read().position(name).is_some()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.state.read().sinks.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().sinks.is_empty()
    }
}

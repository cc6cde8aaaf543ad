use std::sync::Arc;

use super::agent::{Agent, AgentSettings, StreamPostProcess};
use crate::config::ComponentConfig;
use crate::error::ConfigurationError;
use crate::output::{OutputManager, OutputSink};
use crate::plugins::{Plugin, PluginPipeline, PostProcessOrder};
use crate::providers::Provider;

/// Fluent assembly of an [`Agent`]; everything is checked in [`AgentBuilder::build`].
///
/// Recognized config keys: `post_process_order` (`ascending` | `reverse`),
/// `stream_post_process` (`per_fragment` | `buffered`) and `output` (name of
/// the default sink). Unknown keys are ignored.
#[derive(Default)]
pub struct AgentBuilder {
    provider: Option<Arc<dyn Provider>>,
    plugins: Vec<(String, Arc<dyn Plugin>, Option<i32>)>,
    outputs: Vec<(String, Arc<dyn OutputSink>)>,
    default_output: Option<String>,
    config: ComponentConfig,
    settings: AgentSettings,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Register `plugin` under `name` with its declared priority.
    pub fn with_plugin(mut self, name: &str, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push((name.to_string(), plugin, None));
        self
    }

    pub fn with_plugin_priority(
        mut self,
        name: &str,
        plugin: Arc<dyn Plugin>,
        priority: i32,
    ) -> Self {
        self.plugins.push((name.to_string(), plugin, Some(priority)));
        self
    }

    pub fn with_output(mut self, name: &str, sink: Arc<dyn OutputSink>) -> Self {
        self.outputs.push((name.to_string(), sink));
        self
    }

    /// Register `sink` and designate it as the default.
    pub fn with_default_output(mut self, name: &str, sink: Arc<dyn OutputSink>) -> Self {
        self.default_output = Some(name.to_string());
        self.with_output(name, sink)
    }

    /// Layer `config` on top of options given earlier.
    pub fn with_config(mut self, config: ComponentConfig) -> Self {
        self.config = self.config.merged(&config);
        self
    }

    /// Base settings; keys passed through [`AgentBuilder::with_config`] win.
    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    fn resolve_settings(&self) -> Result<AgentSettings, ConfigurationError> {
        let mut settings = self.settings.clone();

        if let Some(value) = self.config.get("post_process_order") {
            settings.post_process_order = value
                .as_str()
                .ok_or_else(|| {
                    ConfigurationError::new("agent: `post_process_order` must be a string")
                })?
                .parse::<PostProcessOrder>()
                .map_err(|e| ConfigurationError::new(format!("agent: {e}")))?;
        }

        if let Some(value) = self.config.get("stream_post_process") {
            settings.stream_post_process = value
                .as_str()
                .ok_or_else(|| {
                    ConfigurationError::new("agent: `stream_post_process` must be a string")
                })?
                .parse::<StreamPostProcess>()
                .map_err(|e| ConfigurationError::new(format!("agent: {e}")))?;
        }

        if let Some(value) = self.config.get("output") {
            let name = value
                .as_str()
                .filter(|name| !name.trim().is_empty())
                .ok_or_else(|| {
                    ConfigurationError::new("agent: `output` must be a non-empty string")
                })?;
            settings.default_output = Some(name.to_string());
        }

        if let Some(name) = &self.default_output {
            settings.default_output = Some(name.clone());
        }

        Ok(settings)
    }

    pub fn build(self) -> Result<Agent, ConfigurationError> {
        let mut settings = self.resolve_settings()?;
        let provider = self
            .provider
            .ok_or_else(|| ConfigurationError::new("agent: no provider configured"))?;

        let pipeline = PluginPipeline::with_order(settings.post_process_order);
        for (name, plugin, priority) in self.plugins {
            match priority {
                Some(priority) => pipeline.register_with_priority(&name, plugin, priority),
                None => pipeline.register(&name, plugin),
            }
        }

        let outputs = OutputManager::new();
        for (name, sink) in self.outputs {
            outputs.register(&name, sink);
        }
        if let Some(name) = &settings.default_output {
            outputs.set_default(name).map_err(|_| {
                ConfigurationError::new(format!("agent: default output `{name}` is not registered"))
            })?;
        } else {
            settings.default_output = outputs.default_name();
        }

        tracing::debug!(
            provider = provider.name(),
            plugins = ?pipeline.names(),
            outputs = ?outputs.names(),
            default_output = ?settings.default_output,
            post_process_order = %settings.post_process_order,
            stream_post_process = %settings.stream_post_process,
            "Agent assembled"
        );

        Ok(Agent::from_parts(
            provider,
            Arc::new(pipeline),
            Arc::new(outputs),
            settings,
        ))
    }
}

//! Error taxonomy for the request pipeline.
//!
//! Each stage of a request converts lower-level failures into one of the typed
//! errors below. [`AgentError`] is what callers of the agent see; its
//! [`AgentError::kind`] is what the CLI prints.

use thiserror::Error;

/// Missing or invalid option, raised while constructing a component.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error for a required key that is absent from a component's config.
    pub fn missing_key(component: &str, key: &str) -> Self {
        Self::new(format!("{component}: missing required option `{key}`"))
    }
}

/// Transport, status or payload failure reported by a provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("[{provider}] {message}")]
pub struct ProviderError {
    pub provider: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// A registered plugin's transform failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("[{plugin}] {message}")]
pub struct PluginError {
    pub plugin: String,
    pub message: String,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}

/// Rendering target missing, or the render call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("[{output}] {message}")]
pub struct OutputError {
    pub output: String,
    pub message: String,
}

impl OutputError {
    pub fn new(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            message: message.into(),
        }
    }
}

/// Terminal failure of a request (or of agent construction).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),
    #[error("output error: {0}")]
    Output(#[from] OutputError),
}

impl AgentError {
    /// Short, stable name of the failing stage.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Provider(_) => "provider",
            Self::Plugin(_) => "plugin",
            Self::Output(_) => "output",
        }
    }

    /// One-line `error (<kind>): <message>` form printed by the CLI.
    pub fn report(&self) -> String {
        let detail = match self {
            Self::Configuration(e) => e.to_string(),
            Self::Provider(e) => e.to_string(),
            Self::Plugin(e) => e.to_string(),
            Self::Output(e) => e.to_string(),
        };
        format!("error ({}): {detail}", self.kind())
    }
}

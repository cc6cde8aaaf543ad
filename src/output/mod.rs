//! Output sinks and the manager that selects between them.

pub mod conversation;
pub mod manager;
pub mod terminal;
pub mod traits;

pub use conversation::ConversationOutput;
pub use manager::OutputManager;
pub use terminal::TerminalOutput;
pub use traits::OutputSink;

use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::registry::{ComponentInfo, Registry};

fn checked(sink: Arc<dyn OutputSink>) -> Result<Arc<dyn OutputSink>, ConfigurationError> {
    if sink.validate_config() {
        Ok(sink)
    } else {
        Err(ConfigurationError::new(format!(
            "{}: invalid output options",
            sink.name()
        )))
    }
}

/// Output table holding every compiled-in sink.
pub fn builtin_registry() -> Registry<dyn OutputSink> {
    let mut registry: Registry<dyn OutputSink> = Registry::new("output");

    registry.register(
        ComponentInfo {
            name: "terminal",
            display_name: "Terminal",
            aliases: &["console", "stdout"],
            description: "prints answers to stdout (options: color)",
        },
        |_, config| checked(Arc::new(TerminalOutput::from_config(config))),
    );
    registry.register(
        ComponentInfo {
            name: "conversation",
            display_name: "Conversation transcript",
            aliases: &["transcript"],
            description:
                "appends answers to a dated markdown file (options: save_dir, timestamp_format)",
        },
        |_, config| checked(Arc::new(ConversationOutput::from_config(config))),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComponentConfig;

    #[test]
    fn builtin_outputs_are_constructible() {
        let registry = builtin_registry();
        let sink = registry
            .create("stdout", &ComponentConfig::new().with("color", false))
            .unwrap();
        assert_eq!(sink.name(), "terminal");

        let cfg = ComponentConfig::new().with("save_dir", "/tmp/ai-agent-test");
        assert_eq!(registry.create("conversation", &cfg).unwrap().name(), "conversation");
    }

    #[test]
    fn bad_timestamp_format_rejected() {
        let cfg = ComponentConfig::new().with("timestamp_format", "%Q");
        assert!(builtin_registry().create("transcript", &cfg).is_err());
    }
}

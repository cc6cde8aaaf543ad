//! Text transform plugins and the pipeline that orders them.

pub mod builtin;
pub mod pipeline;
pub mod traits;
pub mod translator;

pub use builtin::{Phase, SuffixPlugin, UpperPlugin};
pub use pipeline::{PipelineSnapshot, PluginPipeline, PostProcessOrder};
pub use traits::{Plugin, DEFAULT_PRIORITY};
pub use translator::TranslatorPlugin;

use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::registry::{ComponentInfo, Registry};

fn checked(plugin: Arc<dyn Plugin>) -> Result<Arc<dyn Plugin>, ConfigurationError> {
    if plugin.validate_config() {
        Ok(plugin)
    } else {
        Err(ConfigurationError::new(format!(
            "{}: invalid plugin options",
            plugin.name()
        )))
    }
}

/// Plugin table holding every compiled-in plugin.
pub fn builtin_registry() -> Registry<dyn Plugin> {
    let mut registry: Registry<dyn Plugin> = Registry::new("plugin");

    registry.register(
        ComponentInfo {
            name: "upper",
            display_name: "Uppercase",
            aliases: &["uppercase"],
            description: "uppercases input and/or output (options: priority, phase)",
        },
        |_, config| checked(Arc::new(UpperPlugin::from_config(config)?)),
    );
    registry.register(
        ComponentInfo {
            name: "suffix",
            display_name: "Suffix",
            aliases: &[],
            description: "appends a fixed string (options: suffix, priority, phase)",
        },
        |_, config| checked(Arc::new(SuffixPlugin::from_config(config)?)),
    );
    registry.register(
        ComponentInfo {
            name: "translator",
            display_name: "Translator",
            aliases: &[],
            description:
                "tags text crossing a language boundary (options: source_lang, target_lang)",
        },
        |_, config| checked(Arc::new(TranslatorPlugin::from_config(config))),
    );

    registry
}

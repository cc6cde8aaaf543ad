//! Language tagging plugin.
//!
//! Marks input bound for an English-speaking model and marks the answer on
//! its way back. No translation service is called.

use anyhow::Result;

use super::traits::Plugin;
use crate::config::ComponentConfig;

/// Language codes accepted for `source_lang` and `target_lang`.
pub const SUPPORTED_LANGUAGES: [&str; 8] = ["auto", "en", "zh", "ja", "ko", "es", "fr", "de"];

#[derive(Debug, Clone)]
pub struct TranslatorPlugin {
    source_lang: String,
    target_lang: String,
    config: ComponentConfig,
}

impl TranslatorPlugin {
    pub fn new(source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        let source_lang = source_lang.into();
        let target_lang = target_lang.into();
        let config = ComponentConfig::new()
            .with("source_lang", source_lang.as_str())
            .with("target_lang", target_lang.as_str());
        Self {
            source_lang,
            target_lang,
            config,
        }
    }

    pub fn from_config(config: &ComponentConfig) -> Self {
        Self {
            source_lang: config.get_str("source_lang").unwrap_or("auto").to_string(),
            target_lang: config.get_str("target_lang").unwrap_or("en").to_string(),
            config: config.clone(),
        }
    }

    fn translating_to_english(&self) -> bool {
        self.source_lang != "en" && self.target_lang == "en"
    }
}

impl Plugin for TranslatorPlugin {
    fn name(&self) -> &str {
        "translator"
    }

    /// Runs before every other plugin.
    fn priority(&self) -> i32 {
        0
    }

    fn pre_process(&self, text: &str) -> Result<String> {
        if self.translating_to_english() {
            Ok(format!("[Translated to English]: {text}"))
        } else {
            Ok(text.to_string())
        }
    }

    fn post_process(&self, text: &str) -> Result<String> {
        if self.translating_to_english() {
            Ok(format!("[Translated back to {}]: {text}", self.source_lang))
        } else {
            Ok(text.to_string())
        }
    }

    fn validate_config(&self) -> bool {
        ["source_lang", "target_lang"].iter().all(|key| match self.config.get(key) {
            None => true,
            Some(value) => value
                .as_str()
                .is_some_and(|lang| SUPPORTED_LANGUAGES.contains(&lang)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_both_directions() {
        let plugin = TranslatorPlugin::new("zh", "en");
        assert_eq!(
            plugin.pre_process("你好，世界！").unwrap(),
            "[Translated to English]: 你好，世界！"
        );
        assert_eq!(
            plugin.post_process("Hello, World!").unwrap(),
            "[Translated back to zh]: Hello, World!"
        );
        assert!(plugin.validate_config());
    }

    #[test]
    fn english_source_is_untouched() {
        let plugin = TranslatorPlugin::new("en", "en");
        assert_eq!(plugin.pre_process("hi").unwrap(), "hi");
        assert_eq!(plugin.post_process("hi").unwrap(), "hi");
    }

    #[test]
    fn defaults_are_auto_to_english() {
        let plugin = TranslatorPlugin::from_config(&ComponentConfig::new());
        assert_eq!(plugin.priority(), 0);
        assert!(plugin.pre_process("x").unwrap().starts_with("[Translated to English]"));
        assert_eq!(
            plugin.post_process("y").unwrap(),
            "[Translated back to auto]: y"
        );
    }

    #[test]
    fn rejects_unknown_language() {
        let cfg =
            ComponentConfig::from_value(json!({"source_lang": "invalid", "target_lang": "en"}));
        assert!(!TranslatorPlugin::from_config(&cfg).validate_config());

        let cfg = ComponentConfig::from_value(json!({"target_lang": 5}));
        assert!(!TranslatorPlugin::from_config(&cfg).validate_config());
    }
}

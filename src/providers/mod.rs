//! Provider subsystem for model inference backends.
//!
//! Each provider implements the [`Provider`] trait defined in [`traits`] and
//! is registered in [`builtin_registry`] under its canonical name. Hosted
//! backends share [`compatible::OpenAiCompatibleProvider`] and differ only in
//! their [`ProviderPreset`].
//!
//! # Extension
//!
//! To add a new provider, implement [`Provider`] in a new submodule and
//! register a factory for it in [`builtin_registry`].

pub mod compatible;
pub mod echo;
pub mod sse;
pub mod traits;

pub use compatible::OpenAiCompatibleProvider;
pub use echo::EchoProvider;
pub use traits::{build_messages, ChatMessage, FragmentStream, Provider, Role};

use std::sync::Arc;

use crate::config::ComponentConfig;
use crate::error::{ConfigurationError, ProviderError};
use crate::registry::{ComponentInfo, Registry};

const MAX_API_ERROR_CHARS: usize = 200;

/// Shared fallback credential variable, checked after `<PROVIDER>_API_KEY`.
pub const FALLBACK_API_KEY_ENV: &str = "AI_AGENT_API_KEY";

/// Endpoint and default model of a hosted OpenAI-compatible backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderPreset {
    pub name: &'static str,
    pub display_name: &'static str,
    pub aliases: &'static [&'static str],
    pub base_url: &'static str,
    pub default_model: &'static str,
}

pub const PRESETS: &[ProviderPreset] = &[
    ProviderPreset {
        name: "openai",
        display_name: "OpenAI",
        aliases: &[],
        base_url: "https://api.openai.com/v1",
        default_model: "gpt-3.5-turbo",
    },
    ProviderPreset {
        name: "deepseek",
        display_name: "DeepSeek",
        aliases: &[],
        base_url: "https://api.deepseek.com/v1",
        default_model: "deepseek-chat",
    },
    ProviderPreset {
        name: "sustech",
        display_name: "SUSTech Chat",
        aliases: &[],
        base_url: "https://chat.sustech.edu.cn/api",
        default_model: "deepseek-r1-250120",
    },
    ProviderPreset {
        name: "ark",
        display_name: "Volcengine Ark",
        aliases: &["volcengine"],
        base_url: "https://ark.cn-beijing.volces.com/api/v3",
        default_model: "claude-2.1",
    },
];

/// Preset for a canonical name or alias.
pub fn find_preset(name: &str) -> Option<&'static ProviderPreset> {
    let name = name.trim();
    PRESETS.iter().find(|preset| {
        preset.name.eq_ignore_ascii_case(name)
            || preset
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
    })
}

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Redacts tokens with prefixes like `sk-`, `ak-`, `Bearer ` and `api_key=`.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 5] = ["sk-", "ak-", "Bearer ", "api_key=", "api-key="];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    ProviderError::new(provider, format!("API error ({status}): {sanitized}"))
}

/// Environment variable holding the credential for `name`.
pub fn credential_env_var(name: &str) -> String {
    format!("{}_API_KEY", name.trim().to_ascii_uppercase().replace('-', "_"))
}

/// Resolve the API key for a provider from config and environment variables.
///
/// Order: explicit value, `<PROVIDER>_API_KEY`, then `AI_AGENT_API_KEY`.
pub fn resolve_provider_credential(
    name: &str,
    credential_override: Option<&str>,
) -> Option<String> {
    if let Some(raw_override) = credential_override {
        let trimmed_override = raw_override.trim();
        if !trimmed_override.is_empty() {
            return Some(trimmed_override.to_owned());
        }
    }

    for env_var in [credential_env_var(name), FALLBACK_API_KEY_ENV.to_string()] {
        if let Ok(value) = std::env::var(&env_var) {
            let value = value.trim();
            if !value.is_empty() {
                tracing::debug!(
                    provider = name,
                    env_var = %env_var,
                    "Using credential from environment"
                );
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Copy of `config` with `api_key` filled in from the environment when absent.
pub fn with_resolved_credential(name: &str, config: &ComponentConfig) -> ComponentConfig {
    match resolve_provider_credential(name, config.get_str("api_key")) {
        Some(key) => config.with("api_key", key),
        None => config.clone(),
    }
}

/// Reject a freshly built provider whose options do not validate.
fn checked(provider: Arc<dyn Provider>) -> Result<Arc<dyn Provider>, ConfigurationError> {
    if provider.validate_config() {
        Ok(provider)
    } else {
        Err(ConfigurationError::new(format!(
            "{}: invalid provider options (temperature must be within 0..=1, \
             max_tokens must be a positive integer, stream must be a boolean)",
            provider.name()
        )))
    }
}

/// Provider table holding the hosted presets and the offline echo provider.
pub fn builtin_registry() -> Registry<dyn Provider> {
    let mut registry: Registry<dyn Provider> = Registry::new("provider");

    for preset in PRESETS {
        registry.register(
            ComponentInfo {
                name: preset.name,
                display_name: preset.display_name,
                aliases: preset.aliases,
                description: preset.base_url,
            },
            move |_, config| {
                let provider = OpenAiCompatibleProvider::from_config(preset, config)?;
                checked(Arc::new(provider))
            },
        );
    }

    registry.register(
        ComponentInfo {
            name: "echo",
            display_name: "Echo (offline)",
            aliases: &["stub"],
            description: "replies with the prompt or the configured `reply`; no credential",
        },
        |name, config| checked(Arc::new(EchoProvider::from_config(name, config))),
    );

    registry
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name used in config (e.g. `"openai"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
    /// Alternative names accepted in config
    pub aliases: &'static [&'static str],
    /// Whether the provider runs locally (no API key required)
    pub local: bool,
}

/// Return the list of all known providers for display in `ai-agent providers`.
pub fn list_providers() -> Vec<ProviderInfo> {
    builtin_registry()
        .infos()
        .map(|info| ProviderInfo {
            name: info.name,
            display_name: info.display_name,
            aliases: info.aliases,
            local: find_preset(info.name).is_none(),
        })
        .collect()
}

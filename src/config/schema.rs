use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::component::ComponentConfig;
use crate::agent::StreamPostProcess;
use crate::plugins::PostProcessOrder;

/// Directory override for `config.toml`.
pub const CONFIG_DIR_ENV: &str = "AI_AGENT_CONFIG_DIR";

const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level agent configuration, loaded from `config.toml`.
///
/// Resolution order: `--config` file → `--config-dir` / `AI_AGENT_CONFIG_DIR` →
/// `~/.ai-agent/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Provider name or alias (`openai`, `deepseek`, `sustech`, `ark`, `echo`).
    /// Default: `"openai"`.
    pub provider: String,
    /// API key for the selected provider.
    /// Falls back to `<PROVIDER>_API_KEY`, then `AI_AGENT_API_KEY`.
    pub api_key: Option<String>,
    /// Base URL override for the provider API.
    pub api_url: Option<String>,
    /// Model name; the provider's default when unset.
    pub model: Option<String>,
    /// Sampling temperature (0.0–1.0). Default: `0.7`.
    pub temperature: f64,
    /// Maximum tokens per answer. Default: `2000`.
    pub max_tokens: u64,
    /// Stream answers as they are generated. Default: `true`.
    pub stream: bool,
    /// Default output sink. Default: `"terminal"`.
    pub output: String,
    /// Plugins to enable, by name.
    pub plugins: Vec<String>,
    /// Order of post-processing (`ascending` or `reverse`).
    pub post_process_order: PostProcessOrder,
    /// Post-processing of streamed answers (`per_fragment` or `buffered`).
    pub stream_post_process: StreamPostProcess,
    /// Per-plugin options (`[plugin_config.<name>]`).
    pub plugin_config: BTreeMap<String, BTreeMap<String, Value>>,
    /// Per-output options (`[output_config.<name>]`).
    pub output_config: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());

        Self {
            config_path: home.join(".ai-agent").join(CONFIG_FILE_NAME),
            provider: "openai".to_string(),
            api_key: None,
            api_url: None,
            model: None,
            temperature: 0.7,
            max_tokens: 2000,
            stream: true,
            output: "terminal".to_string(),
            plugins: Vec::new(),
            post_process_order: PostProcessOrder::default(),
            stream_post_process: StreamPostProcess::default(),
            plugin_config: BTreeMap::new(),
            output_config: BTreeMap::new(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".ai-agent"))
}

/// Config directory: explicit argument, then `AI_AGENT_CONFIG_DIR`, then `~/.ai-agent`.
pub fn resolve_config_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Ok(custom) = std::env::var(CONFIG_DIR_ENV) {
        let custom = custom.trim();
        if !custom.is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(custom).into_owned()));
        }
    }
    default_config_dir()
}

fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_name_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn to_component(table: Option<&BTreeMap<String, Value>>) -> ComponentConfig {
    let map: Map<String, Value> = table
        .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    ComponentConfig::from_map(map)
}

// ── Config impl ──────────────────────────────────────────────────

impl Config {
    /// Load `config.toml` from the resolved config directory, writing the
    /// defaults there on first run.
    pub async fn load_or_init(config_dir: Option<&Path>) -> Result<Self> {
        let dir = resolve_config_dir(config_dir)?;
        let config_path = dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        if config_path.exists() {
            Self::load_from(&config_path).await
        } else {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;

            // Restrict permissions on newly created config file (may contain API keys)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }

            config.apply_env_overrides();
            config.validate()?;
            tracing::info!(
                path = %config.config_path.display(),
                initialized = true,
                "Config loaded"
            );
            Ok(config)
        }
    }

    /// Load an existing config file; a missing file is an error.
    pub async fn load_from(path: &Path) -> Result<Self> {
        // Warn if config file is world-readable (may contain API keys)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = fs::metadata(path).await {
                if meta.permissions().mode() & 0o004 != 0 {
                    tracing::warn!(
                        "Config file {:?} is world-readable (mode {:o}). \
                         Consider restricting with: chmod 600 {:?}",
                        path,
                        meta.permissions().mode() & 0o777,
                        path,
                    );
                }
            }
        }

        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&contents)?;
        config.config_path = path.to_path_buf();

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            initialized = false,
            "Config loaded"
        );
        Ok(config)
    }

    /// Parse TOML text without applying overrides or validation.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            anyhow::bail!("provider must not be empty");
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            anyhow::bail!(
                "temperature must be within 0.0..=1.0 (got {})",
                self.temperature
            );
        }
        if self.max_tokens == 0 {
            anyhow::bail!("max_tokens must be greater than 0");
        }
        if self.output.trim().is_empty() {
            anyhow::bail!("output must not be empty");
        }
        for (i, name) in self.plugins.iter().enumerate() {
            if name.trim().is_empty() {
                anyhow::bail!("plugins[{i}] must not be empty");
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("AI_AGENT_PROVIDER") {
            if !provider.trim().is_empty() {
                self.provider = provider.trim().to_string();
            }
        }

        if let Ok(model) = std::env::var("AI_AGENT_MODEL") {
            if !model.trim().is_empty() {
                self.model = Some(model.trim().to_string());
            }
        }

        if let Ok(plugins) = std::env::var("AI_AGENT_PLUGINS") {
            self.plugins = parse_name_list(&plugins);
        }

        if let Ok(output) = std::env::var("AI_AGENT_OUTPUT") {
            if !output.trim().is_empty() {
                self.output = output.trim().to_string();
            }
        }

        if let Ok(temp_str) = std::env::var("AI_AGENT_TEMPERATURE") {
            match temp_str.trim().parse::<f64>() {
                Ok(temp) if (0.0..=1.0).contains(&temp) => self.temperature = temp,
                _ => tracing::warn!(value = %temp_str, "Ignoring invalid AI_AGENT_TEMPERATURE"),
            }
        }

        if let Ok(tokens_str) = std::env::var("AI_AGENT_MAX_TOKENS") {
            match tokens_str.trim().parse::<u64>() {
                Ok(tokens) if tokens > 0 => self.max_tokens = tokens,
                _ => tracing::warn!(value = %tokens_str, "Ignoring invalid AI_AGENT_MAX_TOKENS"),
            }
        }

        if let Ok(flag) = std::env::var("AI_AGENT_STREAM") {
            match parse_bool_flag(&flag) {
                Some(stream) => self.stream = stream,
                None => tracing::warn!(value = %flag, "Ignoring invalid AI_AGENT_STREAM"),
            }
        }
    }

    /// Options handed to the provider factory.
    pub fn provider_config(&self) -> ComponentConfig {
        let mut config = ComponentConfig::new()
            .with("temperature", self.temperature)
            .with("max_tokens", self.max_tokens)
            .with("stream", self.stream);
        if let Some(key) = &self.api_key {
            config = config.with("api_key", key.as_str());
        }
        if let Some(url) = &self.api_url {
            config = config.with("api_url", url.as_str());
        }
        if let Some(model) = &self.model {
            config = config.with("model", model.as_str());
        }
        config
    }

    pub fn plugin_config(&self, name: &str) -> ComponentConfig {
        to_component(self.plugin_config.get(name))
    }

    pub fn output_config(&self, name: &str) -> ComponentConfig {
        to_component(self.output_config.get(name))
    }

    /// Options handed to the agent builder.
    pub fn agent_config(&self) -> ComponentConfig {
        ComponentConfig::new()
            .with("post_process_order", self.post_process_order.as_str())
            .with("stream_post_process", self.stream_post_process.as_str())
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.api_key.is_some() {
            copy.api_key = Some("***".to_string());
        }
        copy
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Write this configuration to `path`, which becomes its location.
    pub async fn save_to(&mut self, path: &Path) -> Result<()> {
        self.config_path = path.to_path_buf();
        self.save().await
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = self.to_toml()?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
        let backup_path = parent_dir.join(format!("{file_name}.bak"));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        let had_existing_config = self.config_path.exists();
        if had_existing_config {
            fs::copy(&self.config_path, &backup_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create config backup before atomic replace: {}",
                        backup_path.display()
                    )
                })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            if had_existing_config && backup_path.exists() {
                fs::copy(&backup_path, &self.config_path)
                    .await
                    .context("Failed to restore config backup")?;
            }
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await?;

        if had_existing_config {
            let _ = fs::remove_file(&backup_path).await;
        }

        Ok(())
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{Mutex, MutexGuard};
    use tokio::test;

    const ENV_VARS: [&str; 8] = [
        "AI_AGENT_PROVIDER",
        "AI_AGENT_MODEL",
        "AI_AGENT_PLUGINS",
        "AI_AGENT_OUTPUT",
        "AI_AGENT_TEMPERATURE",
        "AI_AGENT_MAX_TOKENS",
        "AI_AGENT_STREAM",
        CONFIG_DIR_ENV,
    ];

    async fn env_override_lock() -> MutexGuard<'static, ()> {
        static ENV_OVERRIDE_TEST_LOCK: Mutex<()> = Mutex::const_new(());
        let guard = ENV_OVERRIDE_TEST_LOCK.lock().await;
        for key in ENV_VARS {
            std::env::remove_var(key);
        }
        guard
    }

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    async fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.provider, "openai");
        assert!(c.model.is_none());
        assert!((c.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(c.max_tokens, 2000);
        assert!(c.stream);
        assert_eq!(c.output, "terminal");
        assert!(c.api_key.is_none());
        assert!(c.config_path.ends_with(".ai-agent/config.toml"));
        assert!(c.validate().is_ok());
    }

    // ── Parsing ──────────────────────────────────────────────

    #[test]
    async fn parses_full_document() {
        let config = Config::parse(
            r#"
provider = "deepseek"
api_key = "sk-file"
model = "deepseek-chat"
temperature = 0.2
max_tokens = 64
stream = false
output = "conversation"
plugins = ["upper", "suffix"]
post_process_order = "reverse"
stream_post_process = "buffered"

[plugin_config.suffix]
suffix = "!"
priority = 5

[output_config.conversation]
save_dir = "~/notes"
"#,
        )
        .unwrap();

        assert_eq!(config.provider, "deepseek");
        assert_eq!(config.plugins, vec!["upper", "suffix"]);
        assert_eq!(config.post_process_order, PostProcessOrder::Reverse);
        assert_eq!(config.stream_post_process, StreamPostProcess::Buffered);
        assert_eq!(config.plugin_config("suffix").get_str("suffix"), Some("!"));
        assert_eq!(config.plugin_config("suffix").get_i64("priority"), Some(5));
        assert!(config.plugin_config("upper").is_empty());
        assert_eq!(
            config.output_config("conversation").get_str("save_dir"),
            Some("~/notes")
        );
    }

    #[test]
    async fn missing_keys_use_defaults() {
        let config = Config::parse("provider = \"echo\"\n").unwrap();
        assert_eq!(config.provider, "echo");
        assert_eq!(config.max_tokens, 2000);
        assert!(config.plugins.is_empty());
    }

    #[test]
    async fn unknown_order_is_parse_error() {
        assert!(Config::parse("post_process_order = \"onion\"\n").is_err());
    }

    // ── Validation ───────────────────────────────────────────

    #[test]
    async fn validate_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.temperature = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_tokens = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.provider = "  ".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.plugins = vec!["upper".into(), String::new()];
        assert!(config.validate().is_err());
    }

    // ── Component views ──────────────────────────────────────

    #[test]
    async fn provider_config_carries_generation_options() {
        let mut config = Config::default();
        config.api_key = Some("k".into());
        config.model = Some("m".into());
        let provider = config.provider_config();
        assert_eq!(provider.get_str("api_key"), Some("k"));
        assert_eq!(provider.get_str("model"), Some("m"));
        assert_eq!(provider.get_f64("temperature"), Some(0.7));
        assert_eq!(provider.get_u64("max_tokens"), Some(2000));
        assert_eq!(provider.get_bool("stream"), Some(true));
        assert!(!provider.contains("api_url"));
    }

    #[test]
    async fn agent_config_uses_config_strings() {
        let mut config = Config::default();
        config.post_process_order = PostProcessOrder::Reverse;
        let agent = config.agent_config();
        assert_eq!(agent.get_str("post_process_order"), Some("reverse"));
        assert_eq!(agent.get_str("stream_post_process"), Some("per_fragment"));
    }

    #[test]
    async fn redacted_masks_api_key() {
        let mut config = Config::default();
        config.api_key = Some("sk-very-secret".into());
        let shown = config.redacted().to_toml().unwrap();
        assert!(!shown.contains("sk-very-secret"));
        assert!(shown.contains("***"));
    }

    // ── Env override tests ───────────────────────────────────

    #[test]
    async fn env_override_provider_and_model() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("AI_AGENT_PROVIDER", "deepseek");
        std::env::set_var("AI_AGENT_MODEL", "deepseek-coder");
        config.apply_env_overrides();
        assert_eq!(config.provider, "deepseek");
        assert_eq!(config.model.as_deref(), Some("deepseek-coder"));

        std::env::remove_var("AI_AGENT_PROVIDER");
        std::env::remove_var("AI_AGENT_MODEL");
    }

    #[test]
    async fn env_override_plugins_and_output() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("AI_AGENT_PLUGINS", "upper, ,translator");
        std::env::set_var("AI_AGENT_OUTPUT", "conversation");
        config.apply_env_overrides();
        assert_eq!(config.plugins, vec!["upper", "translator"]);
        assert_eq!(config.output, "conversation");

        std::env::remove_var("AI_AGENT_PLUGINS");
        std::env::remove_var("AI_AGENT_OUTPUT");
    }

    #[test]
    async fn env_override_temperature() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("AI_AGENT_TEMPERATURE", "0.5");
        config.apply_env_overrides();
        assert!((config.temperature - 0.5).abs() < f64::EPSILON);

        std::env::remove_var("AI_AGENT_TEMPERATURE");
    }

    #[test]
    async fn env_override_temperature_out_of_range_ignored() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();
        let original_temp = config.temperature;

        std::env::set_var("AI_AGENT_TEMPERATURE", "1.5");
        config.apply_env_overrides();
        assert!(
            (config.temperature - original_temp).abs() < f64::EPSILON,
            "Temperature 1.5 should be ignored (out of range)"
        );

        std::env::remove_var("AI_AGENT_TEMPERATURE");
    }

    #[test]
    async fn env_override_stream_and_max_tokens() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("AI_AGENT_STREAM", "off");
        std::env::set_var("AI_AGENT_MAX_TOKENS", "128");
        config.apply_env_overrides();
        assert!(!config.stream);
        assert_eq!(config.max_tokens, 128);

        std::env::set_var("AI_AGENT_STREAM", "sometimes");
        std::env::set_var("AI_AGENT_MAX_TOKENS", "0");
        config.apply_env_overrides();
        assert!(!config.stream);
        assert_eq!(config.max_tokens, 128);

        std::env::remove_var("AI_AGENT_STREAM");
        std::env::remove_var("AI_AGENT_MAX_TOKENS");
    }

    #[test]
    async fn env_override_empty_values_ignored() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("AI_AGENT_PROVIDER", "");
        std::env::set_var("AI_AGENT_OUTPUT", "  ");
        config.apply_env_overrides();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.output, "terminal");

        std::env::remove_var("AI_AGENT_PROVIDER");
        std::env::remove_var("AI_AGENT_OUTPUT");
    }

    // ── Load / save ──────────────────────────────────────────

    #[test]
    async fn load_or_init_writes_defaults_then_reloads() {
        let _env_guard = env_override_lock().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("agent");

        let created = Config::load_or_init(Some(&dir)).await.unwrap();
        assert!(dir.join("config.toml").exists());
        assert_eq!(created.config_path, dir.join("config.toml"));

        let mut edited = created.clone();
        edited.plugins = vec!["upper".into()];
        edited.save().await.unwrap();

        let loaded = Config::load_or_init(Some(&dir)).await.unwrap();
        assert_eq!(loaded.plugins, vec!["upper"]);
        assert_eq!(loaded, edited);
        assert!(!dir.join("config.toml.bak").exists());
    }

    #[test]
    async fn save_to_writes_a_loadable_copy() {
        let _env_guard = env_override_lock().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("exported").join("agent.toml");

        let mut config = Config::default();
        config.provider = "deepseek".into();
        config.plugins = vec!["upper".into(), "suffix".into()];
        config.save_to(&target).await.unwrap();
        assert_eq!(config.config_path, target);

        let loaded = Config::load_from(&target).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    async fn config_dir_env_is_honored() {
        let _env_guard = env_override_lock().await;
        let tmp = tempfile::TempDir::new().unwrap();

        std::env::set_var(CONFIG_DIR_ENV, tmp.path());
        let dir = resolve_config_dir(None).unwrap();
        std::env::remove_var(CONFIG_DIR_ENV);

        assert_eq!(dir, tmp.path());
        let explicit = resolve_config_dir(Some(Path::new("/elsewhere"))).unwrap();
        assert_eq!(explicit, PathBuf::from("/elsewhere"));
    }

    #[test]
    async fn load_from_missing_file_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = Config::load_from(&tmp.path().join("nope.toml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    async fn load_from_rejects_invalid_values() {
        let _env_guard = env_override_lock().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "temperature = 1.5\n").unwrap();
        assert!(Config::load_from(&path).await.is_err());
    }

    #[cfg(unix)]
    #[test]
    async fn new_config_file_has_restricted_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let _env_guard = env_override_lock().await;
        let tmp = tempfile::TempDir::new().unwrap();
        Config::load_or_init(Some(tmp.path())).await.unwrap();

        let meta = fs::metadata(tmp.path().join("config.toml")).await.unwrap();
        let mode = meta.permissions().mode() & 0o777;
        assert_eq!(
            mode, 0o600,
            "New config file should be owner-only (0600), got {mode:o}"
        );
    }
}

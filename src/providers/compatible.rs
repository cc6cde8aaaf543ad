//! Generic OpenAI-compatible provider.
//! Most LLM APIs follow the same `/chat/completions` format.
//! This module provides a single implementation that works for all of them.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::sse::fragments_from_body;
use super::traits::{build_messages, ChatMessage, FragmentStream, Provider};
use super::ProviderPreset;
use crate::config::ComponentConfig;
use crate::error::{ConfigurationError, ProviderError};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u64 = 2000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// A provider that speaks the OpenAI-compatible chat completions API.
/// Used by: OpenAI, DeepSeek, SUSTech chat, Volcengine Ark.
pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u64,
    config: ComponentConfig,
    client: Client,
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleProvider {
    /// Build a provider for `preset`, reading options from `config`.
    ///
    /// Only a missing credential rejects construction; range problems are
    /// reported by [`Provider::validate_config`].
    pub fn from_config(
        preset: &ProviderPreset,
        config: &ComponentConfig,
    ) -> Result<Self, ConfigurationError> {
        let api_key = config.require_str(preset.name, "api_key")?.trim().to_string();

        let base_url = config
            .get_str("api_url")
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(preset.base_url)
            .trim_end_matches('/')
            .to_string();
        let model = config
            .get_str("model")
            .filter(|model| !model.trim().is_empty())
            .unwrap_or(preset.default_model)
            .to_string();
        let timeout = config.get_u64("timeout_secs").unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            name: preset.name.to_string(),
            base_url,
            api_key,
            model,
            temperature: config.get_f64("temperature").unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: config.get_u64("max_tokens").unwrap_or(DEFAULT_MAX_TOKENS),
            config: config.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        })
    }

    /// Check an option mapping without building a provider.
    pub fn validate(config: &ComponentConfig) -> bool {
        match config.get("api_key").and_then(|v| v.as_str()) {
            Some(key) if !key.trim().is_empty() => {}
            _ => return false,
        }

        if let Some(value) = config.get("temperature") {
            match value.as_f64() {
                Some(t) if (0.0..=1.0).contains(&t) => {}
                _ => return false,
            }
        }

        if let Some(value) = config.get("max_tokens") {
            match value.as_u64() {
                Some(n) if n > 0 => {}
                _ => return false,
            }
        }

        if let Some(value) = config.get("stream") {
            if !value.is_boolean() {
                return false;
            }
        }

        true
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the full URL for chat completions, detecting if base_url already includes the path.
    /// This allows custom endpoints like `/api/coding/v3/chat/completions`.
    fn chat_completions_url(&self) -> String {
        let has_full_endpoint = reqwest::Url::parse(&self.base_url)
            .map(|url| {
                url.path()
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            })
            .unwrap_or_else(|_| {
                self.base_url
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            });

        if has_full_endpoint {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn build_request(
        &self,
        prompt: &str,
        conversation: &[ChatMessage],
        stream: bool,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: build_messages(prompt, conversation),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    /// Send `request` and return the response if the backend accepted it.
    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, ProviderError> {
        let url = self.chat_completions_url();
        tracing::debug!(
            provider = %self.name,
            %url,
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(
                    &self.name,
                    format!("request failed: {}", super::sanitize_api_error(&e.to_string())),
                )
            })?;

        if !response.status().is_success() {
            return Err(super::api_error(&self.name, response).await);
        }

        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u64,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_content(provider: &str, body: &str) -> Result<String, ProviderError> {
    let parsed: ApiChatResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::new(provider, format!("malformed response payload: {e}"))
    })?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            ProviderError::new(provider, "response has no choices[0].message.content")
        })
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_response(
        &self,
        prompt: &str,
        conversation: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let request = self.build_request(prompt, conversation, false);
        let response = self.send(&request).await?;
        let body = response.text().await.map_err(|e| {
            ProviderError::new(&self.name, format!("failed to read response body: {e}"))
        })?;
        extract_content(&self.name, &body)
    }

    async fn stream_response(
        &self,
        prompt: &str,
        conversation: &[ChatMessage],
    ) -> Result<FragmentStream, ProviderError> {
        let request = self.build_request(prompt, conversation, true);
        let response = self.send(&request).await?;
        Ok(fragments_from_body(&self.name, response.bytes_stream()))
    }

    fn validate_config(&self) -> bool {
        Self::validate(&self.config)
    }
}

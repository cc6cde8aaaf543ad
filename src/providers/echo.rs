//! Offline provider that answers with the prompt (or a fixed reply).

use async_trait::async_trait;
use futures_util::stream;

use super::traits::{ChatMessage, FragmentStream, Provider};
use crate::config::ComponentConfig;
use crate::error::ProviderError;

/// Echoes the prompt back, or answers every prompt with the configured `reply`.
#[derive(Debug, Clone)]
pub struct EchoProvider {
    name: String,
    reply: Option<String>,
}

impl EchoProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reply: None,
        }
    }

    pub fn with_reply(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reply: Some(reply.into()),
        }
    }

    pub fn from_config(name: &str, config: &ComponentConfig) -> Self {
        match config.get_str("reply") {
            Some(reply) => Self::with_reply(name, reply),
            None => Self::new(name),
        }
    }

    fn answer(&self, prompt: &str) -> String {
        self.reply.clone().unwrap_or_else(|| prompt.to_string())
    }
}

/// Split `text` after each whitespace run, so every fragment is a word plus
/// the whitespace that follows it.
pub fn split_fragments(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut in_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            in_space = true;
        } else if in_space {
            fragments.push(std::mem::take(&mut current));
            in_space = false;
        }
        current.push(c);
    }

    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_response(
        &self,
        prompt: &str,
        _conversation: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        Ok(self.answer(prompt))
    }

    async fn stream_response(
        &self,
        prompt: &str,
        _conversation: &[ChatMessage],
    ) -> Result<FragmentStream, ProviderError> {
        let fragments = split_fragments(&self.answer(prompt));
        Ok(Box::pin(stream::iter(fragments.into_iter().map(Ok))))
    }
}

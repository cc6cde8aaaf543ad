use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

use crate::error::ProviderError;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged message of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Lazy, finite sequence of non-empty answer fragments.
///
/// Concatenating every `Ok` item in order yields the full answer. An `Err`
/// item is always the last one. Dropping the stream cancels the request.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Outgoing message list: history verbatim, then the prompt as a user turn.
pub fn build_messages(prompt: &str, conversation: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.extend_from_slice(conversation);
    messages.push(ChatMessage::user(prompt));
    messages
}

/// A model backend that answers a prompt, all at once or incrementally.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name carried by every [`ProviderError`] this provider raises.
    fn name(&self) -> &str;

    /// Complete answer for `prompt`, with `conversation` as prior turns.
    async fn generate_response(
        &self,
        prompt: &str,
        conversation: &[ChatMessage],
    ) -> Result<String, ProviderError>;

    /// Same answer as [`Provider::generate_response`], delivered as fragments.
    ///
    /// Connection and status failures are returned directly; failures while
    /// reading the body arrive as the final item of the stream.
    async fn stream_response(
        &self,
        prompt: &str,
        conversation: &[ChatMessage],
    ) -> Result<FragmentStream, ProviderError>;

    /// Side-effect free check of the provider's options.
    fn validate_config(&self) -> bool {
        true
    }
}

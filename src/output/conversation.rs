//! Markdown transcript sink.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::traits::OutputSink;
use crate::config::ComponentConfig;

pub const DEFAULT_SAVE_DIR: &str = "~/.ai-agent/conversations";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Appends every rendered answer to `<save_dir>/conversation-<date>.md`.
#[derive(Debug, Clone)]
pub struct ConversationOutput {
    save_dir: PathBuf,
    timestamp_format: String,
    // Serializes appends so concurrent requests do not interleave entries.
    lock: std::sync::Arc<tokio::sync::Mutex<()>>,
}

impl ConversationOutput {
    pub fn new(save_dir: impl Into<PathBuf>, timestamp_format: impl Into<String>) -> Self {
        Self {
            save_dir: save_dir.into(),
            timestamp_format: timestamp_format.into(),
            lock: std::sync::Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn from_config(config: &ComponentConfig) -> Self {
        let raw_dir = config.get_str("save_dir").unwrap_or(DEFAULT_SAVE_DIR);
        let save_dir = shellexpand::tilde(raw_dir).into_owned();
        let timestamp_format = config
            .get_str("timestamp_format")
            .unwrap_or(DEFAULT_TIMESTAMP_FORMAT);
        Self::new(save_dir, timestamp_format)
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Transcript file for the current local date.
    pub fn transcript_path(&self) -> PathBuf {
        let date = Local::now().format("%Y-%m-%d");
        self.save_dir.join(format!("conversation-{date}.md"))
    }

    fn timestamp(&self) -> Result<String> {
        use std::fmt::Write;

        let mut out = String::new();
        write!(out, "{}", Local::now().format(&self.timestamp_format))
            .map_err(|_| anyhow::anyhow!("invalid timestamp_format `{}`", self.timestamp_format))?;
        Ok(out)
    }

    async fn append(&self, content: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        tokio::fs::create_dir_all(&self.save_dir)
            .await
            .with_context(|| format!("failed to create {}", self.save_dir.display()))?;

        let path = self.transcript_path();
        let is_new = !tokio::fs::try_exists(&path).await.unwrap_or(false);

        let mut entry = String::new();
        if is_new {
            entry.push_str(&format!(
                "# Conversation {}\n\n",
                Local::now().format("%Y-%m-%d")
            ));
        }
        entry.push_str(&format!("### {}\n\n{}\n\n", self.timestamp()?, content.trim_end()));

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.write_all(entry.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        file.flush().await?;

        tracing::debug!(path = %path.display(), bytes = entry.len(), "Appended transcript entry");
        Ok(())
    }
}

#[async_trait]
impl OutputSink for ConversationOutput {
    fn name(&self) -> &str {
        "conversation"
    }

    async fn render(&self, content: &str) -> Result<()> {
        self.append(content).await
    }

    async fn render_stream(&self, fragments: BoxStream<'_, String>) -> Result<()> {
        let content: String = fragments.collect::<Vec<_>>().await.concat();
        self.append(&content).await
    }

    fn validate_config(&self) -> bool {
        self.timestamp().is_ok()
    }
}

//! Plain terminal output with light styling.

use anyhow::{Context, Result};
use async_trait::async_trait;
use console::Style;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::io::Write;

use super::traits::OutputSink;
use crate::config::ComponentConfig;

/// Writes answers to stdout (or any writer), cyan when colors are enabled.
pub struct TerminalOutput {
    writer: Mutex<Box<dyn Write + Send>>,
    style: Style,
}

impl TerminalOutput {
    pub fn new(color: bool) -> Self {
        Self::with_writer(Box::new(std::io::stdout()), color)
    }

    /// Terminal sink over an arbitrary writer. Styling is forced on when
    /// `color` is set, since the writer may not be a tty.
    pub fn with_writer(writer: Box<dyn Write + Send>, color: bool) -> Self {
        let style = if color {
            Style::new().cyan().force_styling(true)
        } else {
            Style::new().force_styling(false)
        };
        Self {
            writer: Mutex::new(writer),
            style,
        }
    }

    pub fn from_config(config: &ComponentConfig) -> Self {
        let color = config.get_bool("color").unwrap_or_else(console::colors_enabled);
        if color {
            Self {
                writer: Mutex::new(Box::new(std::io::stdout())),
                style: Style::new().cyan(),
            }
        } else {
            Self::new(false)
        }
    }

    fn write(&self, text: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        write!(writer, "{}", self.style.apply_to(text)).context("failed to write to terminal")?;
        writer.flush().context("failed to flush terminal")
    }
}

#[async_trait]
impl OutputSink for TerminalOutput {
    fn name(&self) -> &str {
        "terminal"
    }

    async fn render(&self, content: &str) -> Result<()> {
        self.write(content)?;
        self.write("\n")
    }

    async fn render_stream(&self, mut fragments: BoxStream<'_, String>) -> Result<()> {
        while let Some(fragment) = fragments.next().await {
            self.write(&fragment)?;
        }
        self.write("\n")
    }
}

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// A presentation surface for generated text.
#[async_trait]
pub trait OutputSink: Send + Sync {
    fn name(&self) -> &str;

    /// Render a finished answer.
    async fn render(&self, content: &str) -> Result<()>;

    /// Render fragments as they arrive, in order and unmodified.
    ///
    /// The stream may end early when generation fails; the sink renders
    /// whatever it received.
    async fn render_stream(&self, fragments: BoxStream<'_, String>) -> Result<()>;

    fn validate_config(&self) -> bool {
        true
    }
}

use futures::stream::BoxStream;
use futures_util::{future, stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::builder::AgentBuilder;
use crate::error::{AgentError, OutputError};
use crate::output::{OutputManager, OutputSink};
use crate::plugins::{PipelineSnapshot, PluginPipeline, PostProcessOrder};
use crate::providers::{ChatMessage, Provider};

/// How post-processing applies to a streamed answer.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StreamPostProcess {
    /// Each fragment is post-processed on its own and rendered immediately.
    /// Fragments that post-process to the empty string are not rendered.
    #[default]
    PerFragment,
    /// The whole stream is collected, post-processed once and flushed to the
    /// sink as a single fragment.
    Buffered,
}

impl StreamPostProcess {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerFragment => "per_fragment",
            Self::Buffered => "buffered",
        }
    }
}

impl fmt::Display for StreamPostProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamPostProcess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_fragment" => Ok(Self::PerFragment),
            "buffered" => Ok(Self::Buffered),
            other => Err(format!(
                "unknown stream post-process mode `{other}` (expected per_fragment or buffered)"
            )),
        }
    }
}

/// Agent-wide behavior switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentSettings {
    pub post_process_order: PostProcessOrder,
    pub stream_post_process: StreamPostProcess,
    /// Sink designated as default at build time; the output manager owns
    /// the default from then on.
    pub default_output: Option<String>,
}

/// Lifecycle of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    PreProcessing,
    Generating,
    PostProcessing,
    Rendering,
    Completed,
    Failed,
}

impl RequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PreProcessing => "pre_processing",
            Self::Generating => "generating",
            Self::PostProcessing => "post_processing",
            Self::Rendering => "rendering",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prompt plus the context it is answered in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentRequest {
    pub input: String,
    /// Prior turns, sent verbatim before the prompt.
    pub history: Vec<ChatMessage>,
    /// Sink to render to; `None` uses the default.
    pub output: Option<String>,
}

impl AgentRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// Traces state transitions of one request.
struct RequestTrace {
    id: Uuid,
    mode: &'static str,
    state: RequestState,
}

impl RequestTrace {
    fn start(mode: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            state: RequestState::Idle,
        }
    }

    fn snapshot_taken(&self, plugins: &PipelineSnapshot) {
        tracing::debug!(
            request_id = %self.id,
            mode = self.mode,
            plugins = ?plugins.names(),
            order = plugins.order().as_str(),
            "Plugin chain captured"
        );
    }

    fn advance(&mut self, next: RequestState) {
        debug_assert!(!self.state.is_terminal(), "request already finished");
        tracing::debug!(
            request_id = %self.id,
            mode = self.mode,
            from = %self.state,
            to = %next,
            "Request state changed"
        );
        self.state = next;
    }

    /// Record that a streamed request failed in `stage`, which may precede
    /// the stage the trace has reached.
    fn attribute_failure(&mut self, stage: RequestState) {
        if stage != self.state {
            tracing::debug!(
                request_id = %self.id,
                mode = self.mode,
                from = %self.state,
                to = %stage,
                "Failure attributed to earlier stage"
            );
            self.state = stage;
        }
    }

    fn finish(&mut self, result: &Result<String, AgentError>) {
        match result {
            Ok(text) => {
                self.advance(RequestState::Completed);
                tracing::info!(
                    request_id = %self.id,
                    mode = self.mode,
                    chars = text.len(),
                    "Request completed"
                );
            }
            Err(error) => {
                let failed_in = self.state;
                self.advance(RequestState::Failed);
                tracing::warn!(
                    request_id = %self.id,
                    mode = self.mode,
                    failed_in = %failed_in,
                    kind = error.kind(),
                    %error,
                    "Request failed"
                );
            }
        }
    }
}

fn render_error(output: &str, error: &anyhow::Error) -> AgentError {
    OutputError::new(output, format!("render failed: {error:#}")).into()
}

/// Runs prompts through the plugin pipeline, the provider and an output sink.
///
/// Plugins and sinks are read through a snapshot taken when a request starts,
/// so runtime registration never affects a request already in flight.
pub struct Agent {
    provider: Arc<dyn Provider>,
    plugins: Arc<PluginPipeline>,
    outputs: Arc<OutputManager>,
    settings: AgentSettings,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub(crate) fn from_parts(
        provider: Arc<dyn Provider>,
        plugins: Arc<PluginPipeline>,
        outputs: Arc<OutputManager>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            provider,
            plugins,
            outputs,
            settings,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn plugins(&self) -> &PluginPipeline {
        &self.plugins
    }

    pub fn outputs(&self) -> &OutputManager {
        &self.outputs
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Buffered request: answer is generated in full, post-processed, rendered
    /// and returned. Nothing is rendered when any stage fails.
    pub async fn process(&self, input: &str) -> Result<String, AgentError> {
        self.process_request(AgentRequest::new(input)).await
    }

    /// Streaming request: fragments are rendered as they arrive. Returns the
    /// full post-processed answer.
    pub async fn process_stream(&self, input: &str) -> Result<String, AgentError> {
        self.process_stream_request(AgentRequest::new(input)).await
    }

    pub async fn process_request(&self, request: AgentRequest) -> Result<String, AgentError> {
        let mut trace = RequestTrace::start("buffered");
        let result = self.run_buffered(&request, &mut trace).await;
        trace.finish(&result);
        result
    }

    pub async fn process_stream_request(
        &self,
        request: AgentRequest,
    ) -> Result<String, AgentError> {
        let mut trace = RequestTrace::start("stream");
        let result = self.run_stream(&request, &mut trace).await;
        trace.finish(&result);
        result
    }

    fn select_output(
        &self,
        request: &AgentRequest,
    ) -> Result<(String, Arc<dyn OutputSink>), AgentError> {
        Ok(self.outputs.resolve(request.output.as_deref())?)
    }

    async fn run_buffered(
        &self,
        request: &AgentRequest,
        trace: &mut RequestTrace,
    ) -> Result<String, AgentError> {
        let plugins = self.plugins.snapshot();
        trace.snapshot_taken(&plugins);
        let (output_name, sink) = self.select_output(request)?;

        trace.advance(RequestState::PreProcessing);
        let prompt = plugins.pre_process(&request.input)?;

        trace.advance(RequestState::Generating);
        let answer = self
            .provider
            .generate_response(&prompt, &request.history)
            .await?;

        trace.advance(RequestState::PostProcessing);
        let text = plugins.post_process(&answer)?;

        trace.advance(RequestState::Rendering);
        sink.render(&text)
            .await
            .map_err(|e| render_error(&output_name, &e))?;

        Ok(text)
    }

    async fn run_stream(
        &self,
        request: &AgentRequest,
        trace: &mut RequestTrace,
    ) -> Result<String, AgentError> {
        let plugins = self.plugins.snapshot();
        trace.snapshot_taken(&plugins);
        let (output_name, sink) = self.select_output(request)?;

        trace.advance(RequestState::PreProcessing);
        let prompt = plugins.pre_process(&request.input)?;

        trace.advance(RequestState::Generating);
        let mut source = self
            .provider
            .stream_response(&prompt, &request.history)
            .await?;

        match self.settings.stream_post_process {
            StreamPostProcess::Buffered => {
                let mut raw = String::new();
                while let Some(fragment) = source.next().await {
                    raw.push_str(&fragment?);
                }
                drop(source);

                trace.advance(RequestState::PostProcessing);
                let text = plugins.post_process(&raw)?;

                trace.advance(RequestState::Rendering);
                let single: BoxStream<'_, String> =
                    stream::once(future::ready(text.clone())).boxed();
                sink.render_stream(single)
                    .await
                    .map_err(|e| render_error(&output_name, &e))?;
                Ok(text)
            }
            StreamPostProcess::PerFragment => {
                // Fragments are post-processed while the sink consumes them.
                trace.advance(RequestState::PostProcessing);
                trace.advance(RequestState::Rendering);

                let failure: Mutex<Option<(RequestState, AgentError)>> = Mutex::new(None);
                let rendered = Mutex::new(String::new());

                let fragments: BoxStream<'_, String> = source
                    .scan((), |_, item| {
                        let step: Result<String, (RequestState, AgentError)> = match item {
                            Err(error) => Err((RequestState::Generating, error.into())),
                            Ok(fragment) => plugins
                                .post_process(&fragment)
                                .map_err(|error| (RequestState::PostProcessing, error.into())),
                        };
                        future::ready(match step {
                            Ok(text) => {
                                rendered.lock().push_str(&text);
                                Some(text)
                            }
                            Err(failed) => {
                                *failure.lock() = Some(failed);
                                None
                            }
                        })
                    })
                    .filter(|text| future::ready(!text.is_empty()))
                    .boxed();

                let outcome = sink.render_stream(fragments).await;

                if let Some((stage, error)) = failure.into_inner() {
                    trace.attribute_failure(stage);
                    return Err(error);
                }
                outcome.map_err(|e| render_error(&output_name, &e))?;
                Ok(rendered.into_inner())
            }
        }
    }
}

//! Assembly from [`Config`] and the chat entry points used by the CLI.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};

use super::agent::{Agent, AgentRequest};
use crate::config::Config;
use crate::error::{AgentError, ConfigurationError};
use crate::providers::{self, ChatMessage};
use crate::registry::Registries;

/// Build an agent for `config`, creating every component through `registries`.
///
/// Credentials and option tables are looked up under the canonical component
/// name, so an alias in the config reads the same `<NAME>_API_KEY` and
/// `[plugin_config.<name>]` as the canonical name.
pub fn build_agent(
    config: &Config,
    registries: &Registries,
) -> Result<Agent, ConfigurationError> {
    let provider_name = registries
        .providers
        .info(&config.provider)
        .map_or(config.provider.as_str(), |info| info.name);
    let provider_config =
        providers::with_resolved_credential(provider_name, &config.provider_config());
    let provider = registries
        .providers
        .create(&config.provider, &provider_config)?;

    let mut builder = Agent::builder().with_provider(provider);

    for name in &config.plugins {
        let canonical = registries
            .plugins
            .info(name)
            .map_or(name.as_str(), |info| info.name);
        let options = config
            .plugin_config(canonical)
            .merged(&config.plugin_config(name));
        let plugin = registries.plugins.create(name, &options)?;
        builder = builder.with_plugin(canonical, plugin);
    }

    let sink = registries
        .outputs
        .create(&config.output, &config.output_config(&config.output))?;
    let sink_name = sink.name().to_string();
    builder = builder.with_default_output(&sink_name, sink);

    builder.with_config(config.agent_config()).build()
}

/// Answer a single prompt.
pub async fn run_once(agent: &Agent, prompt: &str, stream: bool) -> Result<String, AgentError> {
    let request = AgentRequest::new(prompt);
    if stream {
        agent.process_stream_request(request).await
    } else {
        agent.process_request(request).await
    }
}

fn is_exit_command(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "exit" | "quit")
}

/// Read prompts line by line until EOF or `exit`/`quit`.
///
/// Each completed turn is kept as conversation history for the next one.
/// A failed turn is reported on stderr and leaves the history untouched.
/// Returns the number of completed turns.
pub async fn run_interactive<R>(agent: &Agent, reader: R, stream: bool) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut stderr = tokio::io::stderr();
    let mut lines = reader.lines();
    let mut history: Vec<ChatMessage> = Vec::new();
    let mut completed = 0usize;

    loop {
        stderr.write_all(b"> ").await?;
        stderr.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit_command(input) {
            break;
        }

        let request = AgentRequest::new(input).with_history(history.clone());
        let result = if stream {
            agent.process_stream_request(request).await
        } else {
            agent.process_request(request).await
        };

        match result {
            Ok(answer) => {
                history.push(ChatMessage::user(input));
                history.push(ChatMessage::assistant(answer));
                completed += 1;
            }
            Err(error) => {
                let message = format!("{}\n", error.report());
                stderr.write_all(message.as_bytes()).await?;
            }
        }
    }

    tracing::debug!(turns = completed, "Interactive session ended");
    Ok(completed)
}

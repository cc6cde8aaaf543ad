#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use ai_agent::agent::{build_agent, run_interactive, run_once};
use ai_agent::config::Config;
use ai_agent::providers;
use ai_agent::{AgentError, ConfigCommands, Registries};
use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::BufReader;
use tracing_subscriber::{fmt, EnvFilter};

fn parse_temperature(s: &str) -> std::result::Result<f64, String> {
    let t: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !(0.0..=1.0).contains(&t) {
        return Err("temperature must be between 0.0 and 1.0".to_string());
    }
    Ok(t)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// `ai-agent` - pluggable chat agent for OpenAI-compatible providers.
#[derive(Parser, Debug)]
#[command(name = "ai-agent")]
#[command(version)]
#[command(about = "Chat with an AI provider through a plugin pipeline.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (default: ~/.ai-agent)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a question, or start an interactive session
    #[command(long_about = "\
Ask a question, or start an interactive session.

With a PROMPT the answer is printed once. Without one, prompts are read \
from stdin line by line and earlier turns are kept as conversation. \
Type 'exit' or 'quit' to leave.

Examples:
  ai-agent chat \"What is Rust?\"
  ai-agent chat -p deepseek --plugin translator
  ai-agent chat -p echo --no-stream hello")]
    Chat {
        /// Prompt to answer (interactive mode when omitted)
        prompt: Option<String>,

        /// Provider to use (openai, deepseek, sustech, ark, echo)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Plugin to enable (repeatable; replaces the configured list)
        #[arg(long = "plugin", value_name = "NAME")]
        plugins: Vec<String>,

        /// Output sink (terminal, conversation)
        #[arg(short, long)]
        output: Option<String>,

        /// Temperature (0.0 - 1.0)
        #[arg(short, long, value_parser = parse_temperature)]
        temperature: Option<f64>,

        /// Config file to use instead of <config-dir>/config.toml
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Wait for the full answer instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },

    /// List supported AI providers
    Providers,

    /// List available plugins
    Plugins,

    /// Manage configuration
    #[command(long_about = "\
Manage ai-agent configuration.

Examples:
  ai-agent config show
  ai-agent config schema > schema.json
  ai-agent config save ./agent.toml")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `ai-agent`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(ai-agent completions bash)
  ai-agent completions zsh > ~/.zfunc/_ai-agent
  ai-agent completions fish > ~/.config/fish/completions/ai-agent.fish")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

/// Overrides given on the `chat` command line.
#[derive(Debug, Default)]
struct ChatOverrides {
    provider: Option<String>,
    model: Option<String>,
    plugins: Vec<String>,
    output: Option<String>,
    temperature: Option<f64>,
    no_stream: bool,
}

impl ChatOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(model) = self.model {
            config.model = Some(model);
        }
        if !self.plugins.is_empty() {
            config.plugins = self.plugins;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if self.no_stream {
            config.stream = false;
        }
    }
}

fn init_logging() -> Result<()> {
    // Answers go to stdout; keep logs on stderr and quiet by default.
    let subscriber = fmt::Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

async fn load_config(config_dir: Option<&str>, file: Option<&PathBuf>) -> Result<Config> {
    match file {
        Some(path) => Config::load_from(path).await,
        None => Config::load_or_init(config_dir.map(std::path::Path::new)).await,
    }
}

async fn chat(
    mut config: Config,
    prompt: Option<String>,
    overrides: ChatOverrides,
) -> Result<Result<(), AgentError>> {
    overrides.apply(&mut config);
    config.validate()?;

    let registries = Registries::builtin();
    let agent = match build_agent(&config, &registries) {
        Ok(agent) => agent,
        Err(error) => return Ok(Err(error.into())),
    };

    match prompt {
        Some(prompt) => Ok(run_once(&agent, &prompt, config.stream).await.map(|_| ())),
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            run_interactive(&agent, stdin, config.stream).await?;
            Ok(Ok(()))
        }
    }
}

fn print_providers(config: &Config) {
    let providers = providers::list_providers();
    let current = config.provider.trim().to_ascii_lowercase();
    println!("Supported providers ({} total):\n", providers.len());
    println!("  ID (use in config)  DESCRIPTION");
    println!("  ─────────────────── ───────────");
    for p in &providers {
        let is_active = p.name.eq_ignore_ascii_case(&current)
            || p.aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(&current));
        let marker = if is_active { " (active)" } else { "" };
        let local_tag = if p.local { " [local]" } else { "" };
        let aliases = if p.aliases.is_empty() {
            String::new()
        } else {
            format!("  (aliases: {})", p.aliases.join(", "))
        };
        println!(
            "  {:<19} {}{}{}{}",
            p.name, p.display_name, local_tag, marker, aliases
        );
    }
}

fn print_plugins(config: &Config, registries: &Registries) {
    println!("Available plugins ({} total):\n", registries.plugins.len());
    for info in registries.plugins.infos() {
        let enabled = config
            .plugins
            .iter()
            .any(|name| registries.plugins.info(name).is_some_and(|i| i.name == info.name));
        let marker = if enabled { " (enabled)" } else { "" };
        println!("  {:<12} {}{}", info.name, info.description, marker);
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
    }

    // Completions must remain stdout-only and should not load config or initialize logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(ExitCode::SUCCESS);
    }

    if let Commands::Config {
        config_command: ConfigCommands::Schema,
    } = &cli.command
    {
        let schema = schemars::schema_for!(Config);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(ExitCode::SUCCESS);
    }

    init_logging()?;

    let config_file = match &cli.command {
        Commands::Chat { config, .. } => config.clone(),
        _ => None,
    };
    let config = match load_config(cli.config_dir.as_deref(), config_file.as_ref()).await {
        Ok(config) => config,
        Err(error) => {
            eprintln!("error (configuration): {error:#}");
            return Ok(ExitCode::FAILURE);
        }
    };

    match cli.command {
        Commands::Completions { .. } => unreachable!(),
        Commands::Config {
            config_command: ConfigCommands::Schema,
        } => unreachable!(),

        Commands::Chat {
            prompt,
            provider,
            model,
            plugins,
            output,
            temperature,
            config: _,
            no_stream,
        } => {
            let overrides = ChatOverrides {
                provider,
                model,
                plugins,
                output,
                temperature,
                no_stream,
            };
            match chat(config, prompt, overrides).await {
                Ok(Ok(())) => Ok(ExitCode::SUCCESS),
                Ok(Err(error)) => {
                    eprintln!("{}", error.report());
                    Ok(ExitCode::FAILURE)
                }
                Err(error) => {
                    eprintln!("error (configuration): {error:#}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Commands::Providers => {
            print_providers(&config);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Plugins => {
            print_plugins(&config, &Registries::builtin());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config {
            config_command: ConfigCommands::Show,
        } => {
            println!("# {}", config.config_path.display());
            print!("{}", config.redacted().to_toml()?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config {
            config_command: ConfigCommands::Save { path },
        } => {
            let mut config = config;
            config.save_to(&path).await?;
            println!("Saved configuration to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_wraps,
    dead_code
)]

use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod agent;
pub mod config;
pub mod error;
pub mod output;
pub mod plugins;
pub mod providers;
pub mod registry;

pub use agent::{Agent, AgentBuilder, AgentRequest};
pub use config::{ComponentConfig, Config};
pub use error::AgentError;
pub use registry::Registries;

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Print the resolved configuration (API key redacted)
    Show,
    /// Dump the full configuration JSON Schema to stdout
    #[command(long_about = "\
Dump the full configuration JSON Schema to stdout.

The schema documents every available key, type, and default value \
of config.toml.

Examples:
  ai-agent config schema
  ai-agent config schema > schema.json")]
    Schema,
    /// Write the resolved configuration to a file
    #[command(long_about = "\
Write the resolved configuration to a file.

The file is written atomically and can be used later with `chat --config`.

Examples:
  ai-agent config save ./agent.toml")]
    Save {
        /// Destination file
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

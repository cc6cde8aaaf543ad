#[allow(clippy::module_inception)]
pub mod agent;
pub mod builder;
pub mod run;

pub use agent::{Agent, AgentRequest, AgentSettings, RequestState, StreamPostProcess};
pub use builder::AgentBuilder;
pub use run::{build_agent, run_interactive, run_once};

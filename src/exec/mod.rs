/// Shared cancellation flag raised by termination signals
mod cancel;
pub use cancel::CancelFlag;

/// Run a subprocess
mod run_cmd;
pub use run_cmd::run_cmd;

/// Environment for external tool invocations
mod tool_env;
pub use tool_env::ToolEnv;

/// Runs an ordered list of stages, stopping at the first failure
mod stage_runner;
pub use stage_runner::{StageFailure, StageRunner};

/// Processes one work item end to end
mod worker;
pub use worker::Worker;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to execute {0}")]
    Spawn(String, #[source] std::io::Error),
    #[error("cancelled by termination signal")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

use crate::process::ProcessError;
use thiserror::Error;

/// Error taxonomy for supervisor operations.
///
/// Everything here is handled inside the supervisor or the launcher; the
/// binary only maps the final outcome to an exit code.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Spawn failed: {0}")]
    Spawn(#[from] ProcessError),

    #[error("Startup interrupted by shutdown")]
    Interrupted,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl SupervisorError {
    /// Errors that abort startup and produce a non-zero exit status.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            SupervisorError::Spawn(_) | SupervisorError::Configuration(_)
        )
    }

    /// Errors on the voluntary-shutdown path: the environment still winds
    /// down cleanly and the supervisor exits zero.
    pub fn is_voluntary(&self) -> bool {
        matches!(self, SupervisorError::Interrupted)
    }
}

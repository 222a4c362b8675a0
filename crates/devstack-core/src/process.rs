use crate::config::ProcessSpec;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Unique identifier for a spawned process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        Self(pid)
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a process as observed by its monitor
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessStatus {
    /// Process exited with status information
    Exited(std::process::ExitStatus),
    /// Process failed while being observed
    Failed(String),
}

impl ProcessStatus {
    /// True for a zero exit code.
    pub fn is_clean_exit(&self) -> bool {
        matches!(self, ProcessStatus::Exited(status) if status.success())
    }

    /// Exit code if the process exited normally, `None` when killed by a
    /// signal or never observed exiting.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessStatus::Exited(status) => status.code(),
            _ => None,
        }
    }
}

/// Result of a termination operation
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Process (or its whole group/tree) is gone or the forceful kill was issued
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Insufficient privileges to signal the process
    AccessDenied,
    /// Operation failed with a specific error message
    Failed(String),
}

impl TerminationResult {
    /// Both outcomes leave no live process behind.
    pub fn is_handled(&self) -> bool {
        matches!(
            self,
            TerminationResult::Success | TerminationResult::ProcessNotFound
        )
    }
}

/// Error types for process operations
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Trait representing a handle to one spawned process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID (None if the process has exited)
    fn pid(&self) -> Option<ProcessId>;

    /// Get the command that started this process
    fn command(&self) -> &str;

    /// Check if the process is still running (non-blocking)
    async fn is_running(&self) -> bool;

    /// Wait for the process to exit and reap it
    async fn wait(&mut self) -> Result<ProcessStatus>;

    /// Kill the process backing this handle
    async fn kill(&mut self) -> Result<()>;
}

/// Spawning side of a platform process manager
#[async_trait]
pub trait ProcessLifecycle: Send + Sync {
    /// Spawn a new process from its launch specification.
    ///
    /// On Unix the child is placed in a fresh process group so that
    /// termination can target the group, including any descendants the
    /// child itself spawns.
    async fn spawn_process(&self, spec: &ProcessSpec)
    -> Result<Box<dyn ProcessHandle>, ProcessError>;
}

/// Termination side of a platform process manager, covering whole
/// process trees
#[async_trait]
pub trait ProcessTermination: Send + Sync {
    /// Terminate the process group rooted at `pid` with a bounded grace
    /// window before escalating to a forceful kill. Unsupported on
    /// Windows, where it returns `ProcessNotFound`.
    async fn terminate_process_group(&self, pid: ProcessId, grace: Duration) -> TerminationResult;

    /// Find all descendants of a given process
    async fn find_child_processes(&self, pid: ProcessId) -> Result<Vec<ProcessId>>;

    /// Terminate a process and all of its descendants
    async fn terminate_process_tree(&self, root_pid: ProcessId, grace: Duration)
    -> TerminationResult;

    /// Complete termination strategy: process group first, then process
    /// tree as fallback. Returns once the forceful kill has been issued;
    /// exit confirmation is not required.
    async fn terminate_completely(&self, pid: ProcessId, grace: Duration) -> TerminationResult {
        match self.terminate_process_group(pid, grace).await {
            result if result.is_handled() => return result,
            _ => {
                // Group termination unsupported or refused, fall through
                // to the tree walk.
            }
        }

        self.terminate_process_tree(pid, grace).await
    }

    /// Forget a process the supervisor has already handled, so emergency
    /// cleanup does not signal it again.
    fn untrack(&self, pid: ProcessId);
}

/// High-level process manager trait combining both sides
#[async_trait]
pub trait ProcessManager: ProcessLifecycle + ProcessTermination {
    fn new() -> Self
    where
        Self: Sized;

    /// Terminate every process still tracked by this manager.
    async fn cleanup(&self, grace: Duration) -> Result<()>;
}

#[async_trait]
impl ProcessHandle for Box<dyn ProcessHandle> {
    fn pid(&self) -> Option<ProcessId> {
        (**self).pid()
    }

    fn command(&self) -> &str {
        (**self).command()
    }

    async fn is_running(&self) -> bool {
        (**self).is_running().await
    }

    async fn wait(&mut self) -> Result<ProcessStatus> {
        (**self).wait().await
    }

    async fn kill(&mut self) -> Result<()> {
        (**self).kill().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_handled_outcomes() {
        assert!(TerminationResult::Success.is_handled());
        assert!(TerminationResult::ProcessNotFound.is_handled());
        assert!(!TerminationResult::AccessDenied.is_handled());
        assert!(!TerminationResult::Failed("boom".to_string()).is_handled());
    }

    #[test]
    fn spawn_error_display_names_the_process() {
        let err = ProcessError::SpawnFailed {
            name: "frontend".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let display = format!("{err}");
        assert!(display.contains("frontend"));
        assert!(display.contains("Failed to spawn"));
    }

    #[test]
    fn process_id_display() {
        assert_eq!(ProcessId::from(42).to_string(), "42");
    }
}

//! Platform-independent core of the devstack supervisor: launch
//! specifications, lifecycle state, readiness types, the error taxonomy,
//! and the traits platform process managers implement.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod process;
pub mod readiness;

pub use config::{ProcessSpec, ProcessSpecBuilder, ReadinessConfig, StackConfig};
pub use error::SupervisorError;
pub use lifecycle::LifecycleState;
pub use process::{
    ProcessError, ProcessHandle, ProcessId, ProcessLifecycle, ProcessManager, ProcessStatus,
    ProcessTermination, TerminationResult,
};
pub use readiness::ReadinessResult;

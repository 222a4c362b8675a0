//! devstack: a local development-environment supervisor.
//!
//! Starts a backend API server and a frontend dev server in order, gates
//! the frontend on an HTTP readiness probe of the backend, opens a
//! browser, and on any termination trigger (OS signal, unexpected child
//! exit) shuts both down in reverse start order with a bounded grace
//! period, exactly once.

pub mod browser;
pub mod launcher;
pub mod platform;
pub mod probe;
pub mod signals;
pub mod supervisor;

pub use probe::ReadinessProbe;
pub use supervisor::{ExitEvent, ShutdownReason, ShutdownToken, Supervisor, SupervisorState};

// Re-export core functionality
pub use devstack_core::*;

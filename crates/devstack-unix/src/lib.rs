//! Unix process management for the devstack supervisor.
//!
//! Children are spawned into their own process groups; termination sends
//! SIGTERM to the group, waits out a bounded grace window, then escalates
//! to SIGKILL. A sysinfo-based tree walk covers processes that escaped
//! their group.

mod unix_process_manager;

pub use unix_process_manager::{UnixProcessHandle, UnixProcessManager};

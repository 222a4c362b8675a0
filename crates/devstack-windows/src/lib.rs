//! Windows process management for the devstack supervisor.
//!
//! Tree termination goes through `taskkill /T` with a sysinfo-based
//! manual walk as fallback; children are spawned with `CREATE_NO_WINDOW`.

mod windows_process_manager;

pub use windows_process_manager::{WindowsProcessHandle, WindowsProcessManager};

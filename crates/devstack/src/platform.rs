//! Compile-time selection of the platform process manager.

use devstack_core::ProcessManager;

#[cfg(unix)]
pub type PlatformProcessManager = devstack_unix::UnixProcessManager;

#[cfg(windows)]
pub type PlatformProcessManager = devstack_windows::WindowsProcessManager;

pub fn create_process_manager() -> PlatformProcessManager {
    <PlatformProcessManager as ProcessManager>::new()
}

pub fn platform_name() -> &'static str {
    #[cfg(unix)]
    return "unix";

    #[cfg(windows)]
    return "windows";
}

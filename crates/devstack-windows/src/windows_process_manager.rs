use devstack_core::{
    ProcessError, ProcessHandle, ProcessId, ProcessLifecycle, ProcessManager, ProcessStatus,
    ProcessTermination, TerminationResult,
};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use devstack_core::ProcessSpec;
    use std::collections::HashMap;
    use std::os::windows::process::CommandExt;
    use sysinfo::System;
    use tokio::process::{Child, Command};
    use tracing::{info, warn};

    /// Windows-specific process handle
    pub struct WindowsProcessHandle {
        child: Child,
        command: String,
    }

    impl WindowsProcessHandle {
        fn new(child: Child, command: String) -> Self {
            Self { child, command }
        }
    }

    #[async_trait]
    impl ProcessHandle for WindowsProcessHandle {
        fn pid(&self) -> Option<ProcessId> {
            self.child.id().map(ProcessId::from)
        }

        fn command(&self) -> &str {
            &self.command
        }

        async fn is_running(&self) -> bool {
            if let Some(pid) = self.pid() {
                let mut system = System::new();
                system.refresh_processes_specifics(
                    sysinfo::ProcessesToUpdate::All,
                    true,
                    sysinfo::ProcessRefreshKind::default(),
                );
                system.processes().keys().any(|p| p.as_u32() == pid.0)
            } else {
                false
            }
        }

        async fn wait(&mut self) -> Result<ProcessStatus> {
            let status = self.child.wait().await?;
            Ok(ProcessStatus::Exited(status))
        }

        async fn kill(&mut self) -> Result<()> {
            self.child
                .kill()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to kill process: {e}"))
        }
    }

    /// Windows process manager.
    ///
    /// Windows has no Unix-style process groups, so whole-tree termination
    /// goes through `taskkill /T`, with a sysinfo-based manual walk as the
    /// fallback when taskkill refuses.
    pub struct WindowsProcessManager {
        system: std::sync::Mutex<System>,
        active: std::sync::Mutex<HashMap<u32, String>>,
    }

    impl Default for WindowsProcessManager {
        fn default() -> Self {
            <Self as ProcessManager>::new()
        }
    }

    #[async_trait]
    impl ProcessLifecycle for WindowsProcessManager {
        async fn spawn_process(
            &self,
            spec: &ProcessSpec,
        ) -> Result<Box<dyn ProcessHandle>, ProcessError> {
            let mut cmd = Command::new(&spec.command);
            cmd.args(&spec.args);

            if let Some(dir) = &spec.working_directory {
                cmd.current_dir(dir);
            }

            for (key, value) in &spec.env {
                cmd.env(key, value);
            }

            // CREATE_NO_WINDOW: no console popup for background children
            cmd.creation_flags(0x08000000);

            let child = cmd.spawn().map_err(|source| ProcessError::SpawnFailed {
                name: spec.name.clone(),
                source,
            })?;

            if let Some(pid) = child.id() {
                info!(name = %spec.name, command = %spec.command, pid, "Spawned Windows process");
                self.active.lock().unwrap().insert(pid, spec.name.clone());
            }

            Ok(Box::new(WindowsProcessHandle::new(
                child,
                spec.command.clone(),
            )))
        }
    }

    #[async_trait]
    impl ProcessTermination for WindowsProcessManager {
        async fn terminate_process_group(
            &self,
            _pid: ProcessId,
            _grace: Duration,
        ) -> TerminationResult {
            // No process groups on Windows; callers fall through to the
            // tree termination.
            TerminationResult::ProcessNotFound
        }

        async fn find_child_processes(&self, parent_pid: ProcessId) -> Result<Vec<ProcessId>> {
            let mut system = self.system.lock().unwrap();
            system.refresh_processes_specifics(
                sysinfo::ProcessesToUpdate::All,
                true,
                sysinfo::ProcessRefreshKind::default(),
            );

            let mut children = Vec::new();
            Self::find_children_recursive(&system, parent_pid.0, &mut children);

            Ok(children.into_iter().map(ProcessId::from).collect())
        }

        async fn terminate_process_tree(
            &self,
            root_pid: ProcessId,
            grace: Duration,
        ) -> TerminationResult {
            info!(pid = %root_pid, "Terminating process tree");

            // Graceful attempt first, then the forceful whole-tree kill
            match self.taskkill(root_pid.0, false).await {
                Ok(true) => {
                    tokio::time::sleep(grace).await;
                }
                Ok(false) => {
                    // Not found or refused; the /F /T attempt decides
                }
                Err(e) => {
                    warn!(pid = %root_pid, error = %e, "Graceful taskkill failed");
                }
            }

            match self.taskkill_tree(root_pid.0).await {
                Ok(true) => {
                    info!(pid = %root_pid, "Terminated process tree");
                    TerminationResult::Success
                }
                Ok(false) => {
                    info!(pid = %root_pid, "Process tree not found (already terminated)");
                    TerminationResult::ProcessNotFound
                }
                Err(e) => {
                    warn!(pid = %root_pid, error = %e, "taskkill /T failed, walking tree manually");
                    self.terminate_tree_manually(root_pid).await
                }
            }
        }

        fn untrack(&self, pid: ProcessId) {
            self.active.lock().unwrap().remove(&pid.0);
        }
    }

    impl WindowsProcessManager {
        /// Run taskkill for one pid, optionally forceful.
        async fn taskkill(&self, pid: u32, force: bool) -> Result<bool> {
            let pid_string = pid.to_string();
            let mut args = vec!["/PID", &pid_string];
            if force {
                args.push("/F");
            }

            let output = Command::new("taskkill").args(&args).output().await?;
            Ok(output.status.success())
        }

        /// taskkill with /T to take the whole tree down.
        async fn taskkill_tree(&self, pid: u32) -> Result<bool> {
            let output = Command::new("taskkill")
                .args(["/F", "/T", "/PID", &pid.to_string()])
                .output()
                .await?;
            Ok(output.status.success())
        }

        /// Fallback tree termination: children bottom-up, then the root.
        async fn terminate_tree_manually(&self, root_pid: ProcessId) -> TerminationResult {
            let children = match self.find_child_processes(root_pid).await {
                Ok(children) => children,
                Err(e) => {
                    return TerminationResult::Failed(format!("Failed to enumerate children: {e}"));
                }
            };

            for child_pid in children.iter().rev() {
                if let Err(e) = self.taskkill(child_pid.0, true).await {
                    warn!(pid = %child_pid, error = %e, "Failed to kill child process");
                }
            }

            match self.taskkill(root_pid.0, true).await {
                Ok(_) => TerminationResult::Success,
                Err(e) => TerminationResult::Failed(format!("taskkill failed: {e}")),
            }
        }

        /// Recursively find all descendants, grandchildren before children
        fn find_children_recursive(system: &System, parent_pid: u32, result: &mut Vec<u32>) {
            for (pid, process) in system.processes() {
                #[allow(clippy::collapsible_if)]
                if let Some(ppid) = process.parent() {
                    if ppid.as_u32() == parent_pid {
                        let child_pid = pid.as_u32();
                        Self::find_children_recursive(system, child_pid, result);
                        result.push(child_pid);
                    }
                }
            }
        }
    }

    #[async_trait]
    impl ProcessManager for WindowsProcessManager {
        fn new() -> Self {
            Self {
                system: std::sync::Mutex::new(System::new_all()),
                active: std::sync::Mutex::new(HashMap::new()),
            }
        }

        async fn cleanup(&self, grace: Duration) -> Result<()> {
            let active: Vec<u32> = {
                let active = self.active.lock().unwrap();
                active.keys().copied().collect()
            };

            for pid in active {
                let result = self
                    .terminate_process_tree(ProcessId::from(pid), grace)
                    .await;
                if !result.is_handled() {
                    warn!(pid, ?result, "Cleanup failed to terminate process tree");
                }
            }

            self.active.lock().unwrap().clear();
            Ok(())
        }
    }

    impl Drop for WindowsProcessManager {
        fn drop(&mut self) {
            let active: Vec<u32> = {
                let active = self.active.lock().unwrap();
                active.keys().copied().collect()
            };

            if active.is_empty() {
                return;
            }

            warn!(
                count = active.len(),
                "Emergency cleanup: terminating process trees during drop"
            );

            for pid in active {
                if let Err(e) = std::process::Command::new("taskkill")
                    .args(["/F", "/T", "/PID", &pid.to_string()])
                    .output()
                {
                    warn!(pid, error = %e, "Emergency taskkill failed");
                }
            }
        }
    }
}

#[cfg(windows)]
pub use windows_impl::{WindowsProcessHandle, WindowsProcessManager};

// Stubs so the crate still builds in a cross-platform workspace
#[cfg(not(windows))]
pub struct WindowsProcessHandle;

#[cfg(not(windows))]
pub struct WindowsProcessManager;

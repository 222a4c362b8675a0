use devstack_core::{
    ProcessError, ProcessHandle, ProcessId, ProcessLifecycle, ProcessManager, ProcessStatus,
    ProcessTermination, TerminationResult,
};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use devstack_core::ProcessSpec;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use std::collections::HashMap;
    use sysinfo::System;
    use tokio::process::{Child, Command};
    use tracing::{debug, info, warn};

    /// How often the grace wait re-checks whether the group leader is gone.
    const GRACE_POLL: Duration = Duration::from_millis(100);

    /// Unix-specific process handle
    pub struct UnixProcessHandle {
        child: Child,
        command: String,
    }

    impl UnixProcessHandle {
        fn new(child: Child, command: String) -> Self {
            Self { child, command }
        }
    }

    #[async_trait]
    impl ProcessHandle for UnixProcessHandle {
        fn pid(&self) -> Option<ProcessId> {
            self.child.id().map(ProcessId::from)
        }

        fn command(&self) -> &str {
            &self.command
        }

        async fn is_running(&self) -> bool {
            if let Some(pid) = self.pid() {
                // Signal 0 probes for existence without delivering anything
                signal::kill(NixPid::from_raw(pid.0 as i32), None).is_ok()
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

    /// Unix process manager.
    ///
    /// Every child is spawned into its own process group, so termination
    /// targets the group and takes any grandchildren with it (a dev server
    /// that forks a bundler, for example). The sysinfo-based tree walk is
    /// the fallback for children that escaped their group.
    pub struct UnixProcessManager {
        system: std::sync::Mutex<System>,
        active: std::sync::Mutex<HashMap<u32, String>>,
    }

    impl Default for UnixProcessManager {
        fn default() -> Self {
            <Self as ProcessManager>::new()
        }
    }

    #[async_trait]
    impl ProcessLifecycle for UnixProcessManager {
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

            // Fresh process group so termination can target the whole tree
            cmd.process_group(0);

            let child = cmd.spawn().map_err(|source| ProcessError::SpawnFailed {
                name: spec.name.clone(),
                source,
            })?;

            if let Some(pid) = child.id() {
                info!(name = %spec.name, command = %spec.command, pid, "Spawned Unix process");
                self.active.lock().unwrap().insert(pid, spec.name.clone());
            }

            Ok(Box::new(UnixProcessHandle::new(
                child,
                spec.command.clone(),
            )))
        }
    }

    #[async_trait]
    impl ProcessTermination for UnixProcessManager {
        async fn terminate_process_group(
            &self,
            pid: ProcessId,
            grace: Duration,
        ) -> TerminationResult {
            let pgid = NixPid::from_raw(pid.0 as i32);

            match signal::killpg(pgid, Signal::SIGTERM) {
                Ok(()) => {
                    info!(pid = %pid, "Sent SIGTERM to process group");
                }
                Err(nix::errno::Errno::ESRCH) => {
                    info!(pid = %pid, "Process group not found (already terminated)");
                    return TerminationResult::ProcessNotFound;
                }
                Err(nix::errno::Errno::EPERM) => {
                    warn!(pid = %pid, "Permission denied to terminate process group");
                    return TerminationResult::AccessDenied;
                }
                Err(e) => {
                    warn!(pid = %pid, error = %e, "Failed to SIGTERM process group");
                    return TerminationResult::Failed(format!(
                        "SIGTERM to process group failed: {e}"
                    ));
                }
            }

            self.wait_for_leader_exit(pid, grace).await;

            // Escalate; ESRCH here means the whole group already went away
            match signal::killpg(pgid, Signal::SIGKILL) {
                Ok(()) => {
                    info!(pid = %pid, "Sent SIGKILL to process group");
                    TerminationResult::Success
                }
                Err(nix::errno::Errno::ESRCH) => {
                    debug!(pid = %pid, "Process group exited within grace window");
                    TerminationResult::Success
                }
                Err(e) => {
                    warn!(pid = %pid, error = %e, "Failed to SIGKILL process group");
                    TerminationResult::Failed(format!("SIGKILL to process group failed: {e}"))
                }
            }
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

            let children = match self.find_child_processes(root_pid).await {
                Ok(children) => children,
                Err(e) => {
                    warn!(pid = %root_pid, error = %e, "Failed to enumerate child processes");
                    return TerminationResult::Failed(format!("Failed to enumerate children: {e}"));
                }
            };

            // Children first, bottom-up, then the root
            for child_pid in children.iter().rev() {
                match self.terminate_single_process(*child_pid, grace).await {
                    result if result.is_handled() => {}
                    result => {
                        warn!(pid = %child_pid, ?result, "Failed to terminate child process");
                    }
                }
            }

            self.terminate_single_process(root_pid, grace).await
        }

        fn untrack(&self, pid: ProcessId) {
            self.active.lock().unwrap().remove(&pid.0);
        }
    }

    impl UnixProcessManager {
        /// Terminate a single process by PID with SIGTERM, a grace wait,
        /// and SIGKILL escalation.
        async fn terminate_single_process(
            &self,
            pid: ProcessId,
            grace: Duration,
        ) -> TerminationResult {
            let nix_pid = NixPid::from_raw(pid.0 as i32);

            match signal::kill(nix_pid, Signal::SIGTERM) {
                Ok(()) => {
                    info!(pid = %pid, "Sent SIGTERM to process");
                }
                Err(nix::errno::Errno::ESRCH) => {
                    info!(pid = %pid, "Process not found (already terminated)");
                    return TerminationResult::ProcessNotFound;
                }
                Err(nix::errno::Errno::EPERM) => {
                    warn!(pid = %pid, "Permission denied to terminate process");
                    return TerminationResult::AccessDenied;
                }
                Err(e) => {
                    warn!(pid = %pid, error = %e, "Failed to SIGTERM process");
                    return TerminationResult::Failed(format!("SIGTERM failed: {e}"));
                }
            }

            self.wait_for_leader_exit(pid, grace).await;

            match signal::kill(nix_pid, Signal::SIGKILL) {
                Ok(()) => {
                    info!(pid = %pid, "Sent SIGKILL to process");
                    TerminationResult::Success
                }
                Err(nix::errno::Errno::ESRCH) => {
                    debug!(pid = %pid, "Process exited within grace window");
                    TerminationResult::Success
                }
                Err(e) => {
                    warn!(pid = %pid, error = %e, "Failed to SIGKILL process");
                    TerminationResult::Failed(format!("SIGKILL failed: {e}"))
                }
            }
        }

        /// Poll for the process to disappear, up to the grace window.
        async fn wait_for_leader_exit(&self, pid: ProcessId, grace: Duration) {
            let deadline = tokio::time::Instant::now() + grace;
            let nix_pid = NixPid::from_raw(pid.0 as i32);

            while tokio::time::Instant::now() < deadline {
                if signal::kill(nix_pid, None).is_err() {
                    return;
                }
                tokio::time::sleep(GRACE_POLL.min(grace)).await;
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
    impl ProcessManager for UnixProcessManager {
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
                    .terminate_process_group(ProcessId::from(pid), grace)
                    .await;
                if !result.is_handled() {
                    warn!(pid, ?result, "Cleanup failed to terminate process group");
                }
            }

            self.active.lock().unwrap().clear();
            Ok(())
        }
    }

    impl Drop for UnixProcessManager {
        fn drop(&mut self) {
            // Emergency path only: the orderly shutdown untracks each pid,
            // so anything still here was never handled.
            let active: Vec<u32> = {
                let active = self.active.lock().unwrap();
                active.keys().copied().collect()
            };

            if active.is_empty() {
                return;
            }

            warn!(
                count = active.len(),
                "Emergency cleanup: terminating process groups during drop"
            );

            for pid in active {
                let pgid = NixPid::from_raw(pid as i32);
                if let Err(e) = signal::killpg(pgid, Signal::SIGTERM) {
                    if e != nix::errno::Errno::ESRCH {
                        warn!(pid, error = %e, "Emergency SIGTERM failed, escalating");
                        if let Err(e) = signal::killpg(pgid, Signal::SIGKILL) {
                            warn!(pid, error = %e, "Emergency SIGKILL failed");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
pub use unix_impl::{UnixProcessHandle, UnixProcessManager};

// Stubs so the crate still builds in a cross-platform workspace
#[cfg(not(unix))]
pub struct UnixProcessHandle;

#[cfg(not(unix))]
pub struct UnixProcessManager;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use devstack_core::ProcessSpec;

    fn sleep_spec(name: &str, seconds: &str) -> ProcessSpec {
        ProcessSpec::builder()
            .name(name)
            .command("sleep")
            .args([seconds])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn spawn_reports_a_pid_and_tracks_it() {
        let manager = <UnixProcessManager as ProcessManager>::new();
        let mut handle = manager.spawn_process(&sleep_spec("napper", "5")).await.unwrap();

        let pid = handle.pid().expect("live process has a pid");
        assert!(handle.is_running().await);

        let result = manager
            .terminate_process_group(pid, Duration::from_millis(200))
            .await;
        assert!(result.is_handled());

        let status = handle.wait().await.unwrap();
        assert!(!status.is_clean_exit());
    }

    #[tokio::test]
    async fn spawn_failure_names_the_process() {
        let manager = <UnixProcessManager as ProcessManager>::new();
        let spec = ProcessSpec::builder()
            .name("ghost")
            .command("definitely-not-a-real-command-devstack")
            .build()
            .unwrap();

        let Err(err) = manager.spawn_process(&spec).await else {
            panic!("spawning a missing binary should fail");
        };
        assert!(matches!(err, ProcessError::SpawnFailed { ref name, .. } if name == "ghost"));
    }

    #[tokio::test]
    async fn group_termination_takes_descendants() {
        let manager = <UnixProcessManager as ProcessManager>::new();
        // A shell whose child outlives it if only the leader were signalled
        let spec = ProcessSpec::builder()
            .name("tree")
            .command("sh")
            .args(["-c", "sleep 30 & wait"])
            .build()
            .unwrap();

        let mut handle = manager.spawn_process(&spec).await.unwrap();
        let pid = handle.pid().unwrap();

        // Give the shell a moment to fork its child
        tokio::time::sleep(Duration::from_millis(200)).await;

        let result = manager
            .terminate_process_group(pid, Duration::from_millis(300))
            .await;
        assert!(result.is_handled());
        handle.wait().await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let orphans = manager.find_child_processes(pid).await.unwrap();
        assert!(orphans.is_empty(), "descendants leaked: {orphans:?}");
    }

    #[tokio::test]
    async fn terminating_a_dead_pid_is_not_an_error() {
        let manager = <UnixProcessManager as ProcessManager>::new();
        let mut handle = manager.spawn_process(&sleep_spec("flash", "0")).await.unwrap();
        let pid = handle.pid().unwrap();
        handle.wait().await.unwrap();

        let result = manager
            .terminate_process_group(pid, Duration::from_millis(100))
            .await;
        assert!(result.is_handled());
    }

    #[tokio::test]
    async fn cleanup_sweeps_tracked_processes() {
        let manager = <UnixProcessManager as ProcessManager>::new();
        let mut a = manager.spawn_process(&sleep_spec("a", "30")).await.unwrap();
        let mut b = manager.spawn_process(&sleep_spec("b", "30")).await.unwrap();

        manager.cleanup(Duration::from_millis(200)).await.unwrap();

        assert!(!a.wait().await.unwrap().is_clean_exit());
        assert!(!b.wait().await.unwrap().is_clean_exit());
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use devstack_core::{
    LifecycleState, ProcessHandle, ProcessId, ProcessLifecycle, ProcessStatus, ProcessTermination,
    StackConfig, SupervisorError,
};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, error, info, warn};

use crate::platform::{self, PlatformProcessManager};
use crate::probe::ReadinessProbe;

/// Idempotence guard for the shutdown sequence.
///
/// Two layers: `request` fires the cancellation token so in-flight
/// readiness probes and settle delays stop promptly, and `try_begin` is
/// a compare-and-set that claims the termination sequence itself.
/// Exactly one caller wins the claim, every later call is a no-op, and
/// neither layer ever resets.
pub struct ShutdownToken {
    begun: AtomicBool,
    cancel: CancellationToken,
}

impl ShutdownToken {
    fn new() -> Self {
        Self {
            begun: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Ask for shutdown without running the sequence.
    pub fn request(&self) {
        self.cancel.cancel();
    }

    /// Claim the shutdown sequence. True for exactly one caller.
    pub fn try_begin(&self) -> bool {
        self.cancel.cancel();
        self.begun
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Supervisor phases. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

/// What ended the supervision session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An operating-system termination signal arrived.
    Signal,
    /// A managed process died outside the shutdown sequence.
    UnexpectedExit(String),
}

/// Delivered once per managed process by its monitor task.
#[derive(Debug)]
pub struct ExitEvent {
    pub name: String,
    pub status: ProcessStatus,
}

struct ManagedProcess {
    name: String,
    pid: ProcessId,
    state: LifecycleState,
}

/// Owns the managed processes and drives the
/// `Idle -> Starting -> Running -> ShuttingDown -> Terminated` state
/// machine.
///
/// Startup is strictly ordered: the backend is spawned and its readiness
/// resolved (or timed out) before the frontend is spawned. Shutdown
/// terminates the most-recently-started process first and runs at most
/// once, however many trigger sources fire.
pub struct Supervisor {
    config: StackConfig,
    manager: Arc<PlatformProcessManager>,
    probe: ReadinessProbe,
    shutdown: Arc<ShutdownToken>,
    state: std::sync::Mutex<SupervisorState>,
    processes: Arc<std::sync::Mutex<Vec<ManagedProcess>>>,
    exit_tx: mpsc::Sender<ExitEvent>,
    exit_rx: tokio::sync::Mutex<mpsc::Receiver<ExitEvent>>,
}

impl Supervisor {
    pub fn new(config: StackConfig) -> Result<Self, SupervisorError> {
        config
            .validate()
            .map_err(|e| SupervisorError::Configuration(e.to_string()))?;

        info!(platform = platform::platform_name(), "Creating supervisor");

        let (exit_tx, exit_rx) = mpsc::channel(8);

        Ok(Self {
            config,
            manager: Arc::new(platform::create_process_manager()),
            probe: ReadinessProbe::new(),
            shutdown: Arc::new(ShutdownToken::new()),
            state: std::sync::Mutex::new(SupervisorState::Idle),
            processes: Arc::new(std::sync::Mutex::new(Vec::new())),
            exit_tx,
            exit_rx: tokio::sync::Mutex::new(exit_rx),
        })
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock().unwrap()
    }

    pub fn shutdown_token(&self) -> &ShutdownToken {
        &self.shutdown
    }

    /// Owned handle to the token, for trigger sources that outlive a
    /// borrow of the supervisor.
    pub fn shutdown_handle(&self) -> Arc<ShutdownToken> {
        Arc::clone(&self.shutdown)
    }

    /// Current lifecycle state of a managed process, by name.
    pub fn process_state(&self, name: &str) -> Option<LifecycleState> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.state)
    }

    /// Start the whole stack: backend, readiness gate, frontend, settle
    /// delay.
    ///
    /// A readiness timeout is logged and startup proceeds anyway; a slow
    /// dependency must not block the rest of the environment forever.
    /// Spawn failures abort: for the backend there is nothing to clean
    /// up, for the frontend the backend is torn down again.
    pub async fn start_all(&self) -> Result<(), SupervisorError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != SupervisorState::Idle {
                return Err(SupervisorError::Configuration(format!(
                    "start_all called in state {:?}",
                    *state
                )));
            }
            *state = SupervisorState::Starting;
        }

        let backend = self.config.backend.clone();
        info!(name = %backend.name, command = %backend.command, "Starting backend process");
        self.spawn_managed(&backend).await?;

        if let Some(readiness) = &backend.readiness {
            let result = self
                .probe
                .wait_until_ready(readiness, self.shutdown.cancellation_token())
                .await;

            match result {
                devstack_core::ReadinessResult::Ready => {
                    info!(name = %backend.name, url = %readiness.url, "Backend is ready");
                }
                devstack_core::ReadinessResult::TimedOut => {
                    warn!(
                        name = %backend.name,
                        url = %readiness.url,
                        "Backend took too long to become ready, proceeding anyway"
                    );
                }
                devstack_core::ReadinessResult::NotYetReady => {
                    info!("Shutdown began during readiness wait, aborting startup");
                    return Err(SupervisorError::Interrupted);
                }
            }
        }
        self.mark_running(&backend.name);

        if self.shutdown.is_shutting_down() {
            return Err(SupervisorError::Interrupted);
        }

        let frontend = self.config.frontend.clone();
        info!(name = %frontend.name, command = %frontend.command, "Starting frontend process");
        if let Err(e) = self.spawn_managed(&frontend).await {
            error!(
                name = %frontend.name,
                error = %e,
                "Frontend failed to spawn, cleaning up backend"
            );
            self.shutdown_all().await;
            return Err(e);
        }

        // No readiness endpoint on the frontend; a fixed settle delay
        // stands in for the probe.
        let settle = frontend.settle_delay();
        if !settle.is_zero() {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(SupervisorError::Interrupted),
                _ = tokio::time::sleep(settle) => {}
            }
        }
        self.mark_running(&frontend.name);

        self.set_state(SupervisorState::Running);
        Ok(())
    }

    /// Block until a termination trigger fires, then run the shutdown
    /// sequence and report what triggered it.
    ///
    /// Triggers: a shutdown request on the token (how OS signals arrive,
    /// see [`crate::launcher`]), or an unexpected exit bubbled up from a
    /// process monitor. A clean (zero) exit of one process is logged and
    /// does not take its sibling down.
    pub async fn run(&self) -> ShutdownReason {
        let mut exit_rx = self.exit_rx.lock().await;

        let reason = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break ShutdownReason::Signal;
                }
                event = exit_rx.recv() => {
                    let Some(event) = event else {
                        // Channel cannot close while we hold a sender
                        continue;
                    };

                    if self.shutdown.is_shutting_down() {
                        debug!(name = %event.name, "Process exited during shutdown");
                        continue;
                    }

                    if event.status.is_clean_exit() {
                        info!(name = %event.name, "Process exited cleanly");
                        continue;
                    }

                    warn!(
                        name = %event.name,
                        exit_code = ?event.status.exit_code(),
                        "Process exited unexpectedly, shutting down siblings"
                    );
                    break ShutdownReason::UnexpectedExit(event.name);
                }
            }
        };

        drop(exit_rx);
        self.shutdown_all().await;
        reason
    }

    /// Terminate every managed process, most recently started first, each
    /// with the configured grace window.
    ///
    /// Guarded by the [`ShutdownToken`]: the sequence runs at most once
    /// and late callers get an empty report. A termination failure is
    /// logged and the sequence moves on; a stuck process never blocks the
    /// supervisor from finishing.
    pub async fn shutdown_all(&self) -> Vec<String> {
        if !self.shutdown.try_begin() {
            debug!("Shutdown already handled, ignoring trigger");
            return Vec::new();
        }

        self.set_state(SupervisorState::ShuttingDown);
        info!("Shutting down managed processes");

        let grace = self.config.grace();
        let targets: Vec<(String, ProcessId)> = {
            let mut processes = self.processes.lock().unwrap();
            processes
                .iter_mut()
                .rev()
                .map(|p| {
                    p.state.advance(LifecycleState::Stopping);
                    (p.name.clone(), p.pid)
                })
                .collect()
        };

        let mut handled = Vec::with_capacity(targets.len());
        for (name, pid) in targets {
            info!(name = %name, pid = %pid, "Stopping process");

            let result = self.manager.terminate_completely(pid, grace).await;
            if !result.is_handled() {
                warn!(
                    name = %name,
                    ?result,
                    "Termination failed, continuing with remaining processes"
                );
            }
            self.manager.untrack(pid);

            {
                let mut processes = self.processes.lock().unwrap();
                if let Some(p) = processes.iter_mut().find(|p| p.name == name) {
                    p.state.advance(LifecycleState::Stopped);
                }
            }
            handled.push(name);
        }

        self.set_state(SupervisorState::Terminated);
        info!("All managed processes handled");
        handled
    }

    /// Spawn one process and attach its monitor task.
    ///
    /// The monitor owns the process handle, awaits its exit exactly once,
    /// records the lifecycle outcome, and forwards an [`ExitEvent`] to
    /// the run loop.
    async fn spawn_managed(&self, spec: &devstack_core::ProcessSpec) -> Result<(), SupervisorError> {
        let mut handle = self
            .manager
            .spawn_process(spec)
            .await
            .map_err(SupervisorError::Spawn)?;

        let pid = handle.pid().ok_or_else(|| {
            SupervisorError::Other(anyhow::anyhow!("spawned '{}' has no pid", spec.name))
        })?;

        self.processes.lock().unwrap().push(ManagedProcess {
            name: spec.name.clone(),
            pid,
            state: LifecycleState::Starting,
        });

        let name = spec.name.clone();
        let exit_tx = self.exit_tx.clone();
        let processes = Arc::clone(&self.processes);
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            let status = match handle.wait().await {
                Ok(status) => status,
                Err(e) => ProcessStatus::Failed(e.to_string()),
            };

            let expected = shutdown.is_shutting_down();
            {
                let mut processes = processes.lock().unwrap();
                if let Some(p) = processes.iter_mut().find(|p| p.name == name) {
                    if expected || status.is_clean_exit() {
                        p.state.advance(LifecycleState::Stopping);
                        p.state.advance(LifecycleState::Stopped);
                    } else {
                        p.state.advance(LifecycleState::Failed);
                    }
                }
            }

            debug!(name = %name, ?status, "Process exited");
            let _ = exit_tx.send(ExitEvent { name, status }).await;
        });

        Ok(())
    }

    fn mark_running(&self, name: &str) {
        let mut processes = self.processes.lock().unwrap();
        if let Some(p) = processes.iter_mut().find(|p| p.name == name) {
            p.state.advance(LifecycleState::Running);
        }
    }

    fn set_state(&self, next: SupervisorState) {
        let mut state = self.state.lock().unwrap();
        // Terminated is absorbing
        if *state != SupervisorState::Terminated {
            *state = next;
        }
    }
}

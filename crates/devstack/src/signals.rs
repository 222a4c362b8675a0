//! Cross-platform termination-signal handling.
//!
//! On Unix SIGINT, SIGTERM, and SIGQUIT are handled, with
//! [`tokio::signal::ctrl_c`] awaited as a fallback. On other platforms
//! only `ctrl_c` is awaited.

/// Completes when the process receives a termination signal.
///
/// Each call creates independent signal listeners. Returns `Err` only if
/// signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

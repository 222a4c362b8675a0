use colored::Colorize;
use devstack_core::StackConfig;
use tracing::{error, info, warn};

use crate::browser;
use crate::signals;
use crate::supervisor::{ShutdownReason, Supervisor};

const RULE_WIDTH: usize = 70;

fn section(title: &str) {
    println!("\n{}", "=".repeat(RULE_WIDTH));
    println!("  {}", title.bold());
    println!("{}", "=".repeat(RULE_WIDTH));
}

/// Run the whole session: start the stack, open the browser, wait for a
/// termination trigger, shut everything down.
///
/// Returns the process exit code: 0 for a voluntary/clean shutdown,
/// non-zero for a startup failure. A completion line is printed on every
/// path before returning.
pub async fn run(config: StackConfig) -> i32 {
    section("devstack - development environment launcher");
    println!(
        "  {}",
        format!(
            "Starting {} and {}...",
            config.backend.name, config.frontend.name
        )
        .cyan()
    );

    let supervisor = match Supervisor::new(config.clone()) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            println!("\n{}", "Failed to start".red());
            return 1;
        }
    };

    // Listening starts before the first spawn so an interrupt during the
    // readiness wait still reaches the shutdown sequence.
    let shutdown = supervisor.shutdown_handle();
    tokio::spawn(async move {
        match signals::wait_for_shutdown_signal().await {
            Ok(()) => info!("Termination signal received"),
            Err(e) => error!(error = %e, "Signal handler registration failed, stopping"),
        }
        shutdown.request();
    });

    match supervisor.start_all().await {
        Ok(()) => {}
        Err(e) if e.is_voluntary() => {
            info!("Interrupted during startup, shutting down");
            supervisor.shutdown_all().await;
            println!("\n{}", "Cleanup complete".green());
            return 0;
        }
        Err(e) => {
            error!(error = %e, "Failed to start application");
            supervisor.shutdown_all().await;
            println!("\n{}", "Failed to start".red());
            return 1;
        }
    }

    section("Application ready");
    if let Some(readiness) = &config.backend.readiness {
        println!("  {} {}", "API:".green(), readiness.url);
    }
    if let Some(url) = &config.browser_url {
        println!("  {}  {}", "UI:".green(), url);
    }
    println!("\n  {}", "Press Ctrl+C to stop all servers".yellow());
    println!("{}\n", "=".repeat(RULE_WIDTH));

    if let Some(url) = &config.browser_url {
        info!(url = %url, "Opening browser");
        if let Err(e) = browser::open_url(url) {
            // Cosmetic convenience; the stack is up either way
            warn!(error = %e, "Could not open browser");
        }
    }

    let reason = supervisor.run().await;
    match &reason {
        ShutdownReason::Signal => info!("Stopped by termination signal"),
        ShutdownReason::UnexpectedExit(name) => {
            warn!(name = %name, "Stopped after unexpected process exit");
        }
    }

    println!("\n{}", "Cleanup complete".green());
    0
}

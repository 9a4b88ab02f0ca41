//! Minimal declarative process supervisor: launches the processes
//! listed in a configuration file, captures their output into
//! per-process log files, and restarts them after exit according to a
//! fixed-delay, bounded-count restart policy.

#![forbid(unsafe_code, future_incompatible)]
#![deny(
    missing_debug_implementations,
    nonstandard_style,
    // missing_docs,
    unreachable_pub,
    missing_copy_implementations,
    unused_qualifications,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

use tokio::sync::{mpsc, watch};

pub mod command;
pub mod config;
pub mod logs;
pub mod supervisor;

use config::Config;

/// Errors that can abort the supervisor as a whole. Per-process
/// failures (launch failures, crashes) are handled by the restart
/// policy and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two processes in the configuration share the same name.
    #[error("duplicate process name in configuration: {0}")]
    DuplicateProcessName(String),

    /// A process monitor task panicked or was aborted.
    #[error("process monitor failed")]
    MonitorFailed(#[from] tokio::task::JoinError),
}

/// Runs the supervisor: spawns one monitor task per configured process
/// and resolves once every monitor has finished, either because all
/// processes have stopped (exhausted their restart budget, or have
/// `autorestart` disabled) or because a shutdown signal arrived on
/// `shutdown_receiver`.
///
/// Shutdown terminates every running child with SIGTERM, abandons any
/// pending restart, and waits for the children to exit.
pub async fn run(
    config: Config,
    mut shutdown_receiver: mpsc::UnboundedReceiver<()>,
) -> Result<(), Error> {
    config.validate()?;

    // Broadcast the shutdown request to every monitor. The sender is
    // dropped as soon as the signal has been delivered (or can never
    // be delivered); monitors treat a closed channel as "no shutdown
    // will ever come".
    let (cancel_sender, cancel_receiver) = watch::channel(false);

    let mut monitors = Vec::with_capacity(config.processes.len());
    for process in config.processes {
        let name = process.name.clone();
        let monitor = tokio::spawn(supervisor::supervise(process, cancel_receiver.clone()));
        monitors.push((name, monitor));
    }

    drop(cancel_receiver);

    tokio::spawn(async move {
        if shutdown_receiver.recv().await.is_some() {
            tracing::info!("Shutdown signal received; stopping all processes");
            let _ = cancel_sender.send(true);
        }
    });

    for (name, monitor) in monitors {
        let status = monitor.await?;
        tracing::info!(process_name = %name, ?status, "Process monitor finished");
    }

    Ok(())
}

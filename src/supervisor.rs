//! Restart policy engine: one monitor task per supervised process,
//! relaunching it after exit until its restart budget is exhausted or
//! the supervisor shuts down.

use tokio::{
    sync::watch,
    time::{sleep_until, Instant},
};

use crate::{
    command::{self, Command},
    config::process::ProcessConfig,
};

/// Lifecycle of one supervised process.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ProcessStatus {
    /// Not running and not scheduled for a relaunch (initial state;
    /// also the final state after a clean stop or shutdown).
    Stopped,

    /// Launched and not yet exited.
    Running,

    /// Exited, with a relaunch pending after the restart delay.
    WaitingToRestart,

    /// Exited with the restart budget exhausted; never launched again
    /// for the life of the supervisor.
    PermanentlyStopped,
}

/// Decision taken after a process exit.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Decision {
    Restart,
    Stop,
    GiveUp,
}

/// Restart budget for one process. The count is monotonic: it only
/// grows, and it never exceeds the configured maximum.
#[derive(Debug)]
struct RestartPolicy {
    autorestart: bool,
    max_restarts: u32,
    restarts: u32,
}

impl RestartPolicy {
    fn new(spec: &ProcessConfig) -> Self {
        Self {
            autorestart: spec.autorestart,
            max_restarts: spec.max_restarts,
            restarts: 0,
        }
    }

    /// Decides what to do after an exit (of any cause, launch failures
    /// included); `Restart` consumes one unit of the restart budget.
    fn on_exit(&mut self) -> Decision {
        if !self.autorestart {
            Decision::Stop
        } else if self.restarts == self.max_restarts {
            Decision::GiveUp
        } else {
            self.restarts += 1;
            Decision::Restart
        }
    }
}

/// Supervises a single process until it stops for good or the
/// supervisor shuts down, returning the final status.
pub(crate) async fn supervise(
    spec: ProcessConfig,
    mut cancel: watch::Receiver<bool>,
) -> ProcessStatus {
    let mut policy = RestartPolicy::new(&spec);

    loop {
        tracing::info!(process_name = %spec.name, "Starting process");

        match Command::spawn(&spec).await {
            Ok(mut command) => {
                tracing::info!(process_name = %spec.name, status = ?ProcessStatus::Running, "Process started");

                let exit_status = tokio::select! {
                    status = command.wait() => Some(status),
                    _ = cancelled(&mut cancel) => None,
                };

                match exit_status {
                    Some(status) => {
                        tracing::info!(process_name = %spec.name, ?status, "Process exited");
                    }
                    None => {
                        tracing::info!(process_name = %spec.name, "Shutdown requested; stopping process");

                        if let Err(err) = command.kill(nix::sys::signal::Signal::SIGTERM) {
                            tracing::warn!(process_name = %spec.name, ?err, "Error signalling process");
                        }

                        command.wait().await;
                        return ProcessStatus::Stopped;
                    }
                }
            }
            Err(err) => {
                // A failed launch consumes restart budget exactly like
                // an immediate exit.
                tracing::error!(process_name = %spec.name, ?err, "Failed to launch process");
                append_status(&spec, &format!("vigil: launch failed: {err:#}")).await;
            }
        }

        // The restart delay runs from the exit, not from the launch.
        let exited_at = Instant::now();

        match policy.on_exit() {
            Decision::Stop => {
                return ProcessStatus::Stopped;
            }
            Decision::GiveUp => {
                tracing::warn!(
                    process_name = %spec.name,
                    restarts = policy.restarts,
                    "Restart limit reached; leaving process stopped"
                );
                append_status(
                    &spec,
                    &format!(
                        "vigil: process permanently stopped after {} restarts",
                        policy.restarts
                    ),
                )
                .await;
                return ProcessStatus::PermanentlyStopped;
            }
            Decision::Restart => {
                tracing::info!(
                    process_name = %spec.name,
                    status = ?ProcessStatus::WaitingToRestart,
                    delay_ms = spec.restart_delay,
                    "Waiting to restart process"
                );

                tokio::select! {
                    _ = sleep_until(exited_at + spec.restart_delay()) => {}
                    _ = cancelled(&mut cancel) => {
                        tracing::info!(process_name = %spec.name, "Shutdown requested; abandoning restart");
                        return ProcessStatus::Stopped;
                    }
                }
            }
        }
    }
}

/// Resolves once a shutdown has been requested. If the shutdown sender
/// is gone without having fired, no shutdown can ever be requested and
/// this future never resolves.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }

        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Appends a supervisor status message to the process's error log.
/// Failures are reported via tracing only; a broken log file must not
/// take down the monitor.
async fn append_status(spec: &ProcessConfig, message: &str) {
    match command::open_error_log(spec).await {
        Ok(mut writer) => {
            if let Err(err) = writer.append(message).await {
                tracing::warn!(process_name = %spec.name, ?err, "Error writing status message to error log");
            }
        }
        Err(err) => {
            tracing::warn!(process_name = %spec.name, ?err, "Unable to open error log for status message");
        }
    }
}

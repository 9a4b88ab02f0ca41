//! Launches supervised commands and monitors their completion.

use std::{path::PathBuf, process::Stdio};

use anyhow::Context;
use nix::unistd::Pid;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Child,
    sync::watch,
};
use tracing::Level;

use crate::{config::process::ProcessConfig, logs::LogWriter};

/// Exit status returned by a supervised command.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ExitStatus {
    /// Command exited with the given exit code.
    Exited(i32),

    /// Command was killed before it could exit.
    Killed,
}

/// Handle to a running supervised command: exposes the PID for
/// signalling and an awaitable exit status.
#[derive(Debug)]
pub struct Command {
    exited: watch::Receiver<Option<ExitStatus>>,
    output_tasks: Vec<tokio::task::JoinHandle<()>>,
    pid: Pid,
}

impl Command {
    /// Spawns the process described by `spec`: the script (run through
    /// its interpreter, if one is configured) in the configured
    /// working directory, with stdin disabled and stdout/stderr
    /// forwarded line-by-line to the process's log files.
    ///
    /// Any failure here (missing interpreter or script, unwritable log
    /// file, unresolvable `{{VAR}}` placeholder) is a launch failure;
    /// the caller treats it as an immediate exit.
    pub async fn spawn(spec: &ProcessConfig) -> anyhow::Result<Self> {
        let script = substitute_env_vars(&spec.script)?;

        // Build the argument vector. With an interpreter the script
        // becomes the interpreter's first argument; without one the
        // script is executed directly.
        let mut argv: Vec<String> = Vec::with_capacity(spec.args.len() + 1);
        let program = if let Some(interpreter) = &spec.interpreter {
            argv.push(script);
            substitute_env_vars(interpreter)?
        } else {
            script
        };

        for arg in &spec.args {
            argv.push(substitute_env_vars(arg)?);
        }

        tracing::event!(Level::DEBUG, name = %spec.name, %program, ?argv, "Running command");

        let mut command = tokio::process::Command::new(&program);
        command.args(&argv);

        if let Some(cwd) = &spec.cwd {
            command.current_dir(substitute_env_vars(cwd)?);
        }

        // Disable stdin, and capture stdout and stderr so that they
        // can be forwarded to the log sink.
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Open the log files before spawning so that a bad log path
        // fails the launch instead of silently dropping output.
        let stdout_writer = open_log(spec).await?;
        let stderr_writer = open_error_log(spec).await?;

        // Run the command.
        let mut child = command.spawn().with_context(|| "Error running command")?;
        let pid = Pid::from_raw(
            child
                .id()
                .with_context(|| "Unable to get PID of just-started process")? as i32,
        );

        tracing::event!(Level::DEBUG, name = %spec.name, %pid, "Command running");

        let mut output_tasks = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            output_tasks.push(forward_output(spec.name.clone(), stdout, stdout_writer));
        }

        if let Some(stderr) = child.stderr.take() {
            output_tasks.push(forward_output(spec.name.clone(), stderr, stderr_writer));
        }

        // Listen for the command to complete.
        let (sender, receiver) = watch::channel(None);
        monitor_process(spec.name.clone(), pid, child, sender);

        Ok(Self {
            exited: receiver,
            output_tasks,
            pid,
        })
    }

    /// Sends a signal to the process.
    pub fn kill(&self, signal: nix::sys::signal::Signal) -> anyhow::Result<()> {
        nix::sys::signal::kill(self.pid, signal)?;
        Ok(())
    }

    /// Waits for the process to exit. Can be called again after an
    /// abandoned wait; the exit status stays latched in the channel.
    pub async fn wait(&mut self) -> ExitStatus {
        let exit_status = loop {
            // Use the value immediately if we have one, otherwise wait
            // out the initial `None` value that will still be present
            // if the process has not yet stopped.
            if let Some(exit_status) = *self.exited.borrow_and_update() {
                break exit_status;
            }

            self.exited
                .changed()
                .await
                .unwrap_or_else(|_| panic!("Sender dropped for PID {}", self.pid));
        };

        // Let the forwarders drain the output pipes, so that every
        // captured line is in the log files before the exit is
        // reported.
        for task in self.output_tasks.drain(..) {
            let _ = task.await;
        }

        tracing::event!(Level::DEBUG, pid = %self.pid, "Command exited");
        exit_status
    }
}

/// Opens the process's stdout log file.
pub(crate) async fn open_log(spec: &ProcessConfig) -> anyhow::Result<LogWriter> {
    let path = substitute_path(&spec.log_file)?;
    LogWriter::open(&path, spec.timestamps)
        .await
        .with_context(|| "Unable to open log file")
}

/// Opens the process's stderr/status log file.
pub(crate) async fn open_error_log(spec: &ProcessConfig) -> anyhow::Result<LogWriter> {
    let path = substitute_path(&spec.error_file)?;
    LogWriter::open(&path, spec.timestamps)
        .await
        .with_context(|| "Unable to open error log file")
}

fn substitute_path(path: &std::path::Path) -> anyhow::Result<PathBuf> {
    let path = path
        .to_str()
        .with_context(|| "Log path is not valid UTF-8")?;
    Ok(PathBuf::from(substitute_env_vars(path)?))
}

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("Failed to compile regular expression")
});

fn substitute_env_vars(s: &str) -> anyhow::Result<String> {
    let mut missing = None;

    let substituted = ENV_VAR_PATTERN
        .replace_all(s, |caps: &Captures| match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                missing = Some(caps[1].to_string());
                String::new()
            }
        })
        .into_owned();

    if let Some(name) = missing {
        anyhow::bail!("missing environment variable: {name}");
    }

    Ok(substituted)
}

/// Forwards one captured output stream to its log file, line by line,
/// until the stream closes. Consuming the pipe also keeps the child
/// from blocking on a full OS buffer.
fn forward_output<R>(name: String, stream: R, mut writer: LogWriter) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if let Err(err) = writer.append(&line).await {
                tracing::warn!(%name, ?err, "Error writing captured output to log file");
            }
        }

        tracing::event!(Level::DEBUG, %name, "Output stream closed");
    })
}

fn monitor_process(
    name: String,
    pid: Pid,
    mut child: Child,
    sender: watch::Sender<Option<ExitStatus>>,
) {
    tokio::spawn(async move {
        match child.wait().await {
            Err(err) => {
                tracing::event!(Level::ERROR, %name, ?err, "Error waiting for command to exit");
                let _ = sender.send(Some(ExitStatus::Killed));
            }
            Ok(exit_status) => match exit_status.code() {
                Some(exit_code) => {
                    if exit_code == 0 {
                        tracing::event!(Level::DEBUG, %name, %pid, "Command exited cleanly");
                    } else {
                        tracing::event!(Level::ERROR, %name, %pid, %exit_code, "Command exited with non-zero exit code");
                    }

                    let _ = sender.send(Some(ExitStatus::Exited(exit_code)));
                }
                None => {
                    tracing::event!(Level::DEBUG, %name, %pid, "Command was killed");
                    let _ = sender.send(Some(ExitStatus::Killed));
                }
            },
        }
    });
}

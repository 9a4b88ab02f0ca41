//! Process configuration.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

/// Declarative description of one supervised process. Loaded once at
/// startup and never mutated afterwards.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProcessConfig {
    /// Unique identifier for this process; names log streams and
    /// tracing output.
    pub name: String,

    /// Program to run. Passed to the interpreter if one is configured,
    /// otherwise executed directly.
    pub script: String,

    /// Interpreter to run `script` with (e.g. a Python binary inside a
    /// virtualenv).
    #[serde(default)]
    pub interpreter: Option<String>,

    /// Arguments appended after the script.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the process; inherited from the
    /// supervisor if not set.
    #[serde(default)]
    pub cwd: Option<String>,

    /// Whether to relaunch the process after it exits (any exit,
    /// including a clean one).
    #[serde(default = "default_autorestart")]
    pub autorestart: bool,

    /// Wait between a process exit and the relaunch attempt, in
    /// milliseconds, measured from the exit.
    #[serde(default)]
    pub restart_delay: u64,

    /// Number of relaunches allowed before the process is left
    /// permanently stopped. The initial launch does not count.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// File receiving the process's stdout, appended to.
    pub log_file: PathBuf,

    /// File receiving the process's stderr and supervisor status
    /// messages, appended to.
    pub error_file: PathBuf,

    /// Prefix every captured line with a capture-time timestamp.
    #[serde(default, rename = "time")]
    pub timestamps: bool,
}

impl ProcessConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay)
    }
}

fn default_autorestart() -> bool {
    true
}

fn default_max_restarts() -> u32 {
    10
}

use std::collections::HashSet;

use serde::Deserialize;

use self::process::ProcessConfig;

pub mod process;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub processes: Vec<ProcessConfig>,
}

impl Config {
    /// Checks the constraints that the parser cannot express; process
    /// names must be unique, since the name identifies the process in
    /// log output and in supervisor diagnostics.
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut names = HashSet::new();
        for process in &self.processes {
            if !names.insert(process.name.as_str()) {
                return Err(crate::Error::DuplicateProcessName(process.name.clone()));
            }
        }

        Ok(())
    }
}

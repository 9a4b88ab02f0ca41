//! Helper functions for the vigil integration tests.

use std::{future::Future, time::Duration};

use tempfile::TempDir;
use tokio::sync::{
    mpsc::{self, UnboundedSender},
    oneshot,
};
use vigil::config::Config;

/// Writes the provided shell scripts into a fresh temporary directory,
/// performs template replacement in the configuration, and starts the
/// supervisor, returning its future, the shutdown handle, and the temp
/// directory.
///
/// `{temp_path}` is replaced with the temporary directory path in both
/// the configuration and the script contents, so scripts can be
/// addressed as `{temp_path}/<name>` and can write their output into
/// the test directory.
///
/// The returned future does no work until awaited; tests that need to
/// interact with a running process should do so from a spawned task
/// while awaiting the supervisor.
pub async fn start(
    config: &str,
    scripts: &[(&str, &str)],
) -> (
    impl Future<Output = Result<(), vigil::Error>>,
    UnboundedSender<()>,
    TempDir,
) {
    let dir = TempDir::new().unwrap();
    let temp_path = dir.path().to_str().unwrap().to_string();

    for (name, contents) in scripts {
        let path = dir.path().join(name);
        tokio::fs::write(&path, contents.replace("{temp_path}", &temp_path))
            .await
            .unwrap();
    }

    let config: Config = toml::from_str(&config.replace("{temp_path}", &temp_path)).unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let supervisor = vigil::run(config, rx);
    (supervisor, tx, dir)
}

/// Reads a file from the test directory, returning an empty string if
/// the file was never created.
#[allow(dead_code)]
pub async fn read_file(dir: &TempDir, name: &str) -> String {
    let path = dir.path().join(name);
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => panic!("Unable to read file: {err}"),
    }
}

/// Spawns a task that waits for the file with the given name to appear
/// in the test directory (with contents), then returns its contents.
#[allow(dead_code)]
pub fn spawn_file_waiter(dir: &TempDir, name: &str) -> oneshot::Receiver<String> {
    let (tx, rx) = oneshot::channel();
    let path = dir.path().join(name).to_str().unwrap().to_string();

    tokio::task::spawn(async move {
        loop {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) if !text.is_empty() => {
                    tx.send(text).unwrap();
                    break;
                }
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => panic!("Unable to read file: {err}"),
            };

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    rx
}

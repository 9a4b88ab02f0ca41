//! Tests of the log sink: stream separation, append semantics,
//! timestamp prefixes, and per-process file isolation.

use indoc::indoc;
use pretty_assertions::assert_eq;

use crate::common::{read_file, start};

mod common;

/// Asserts that a captured line starts with a
/// `YYYY-MM-DDTHH:MM:SS: ` prefix.
fn assert_timestamped(line: &str) {
    let (prefix, _) = line
        .split_once(": ")
        .unwrap_or_else(|| panic!("line has no timestamp prefix: {line}"));

    assert_eq!(19, prefix.len(), "unexpected timestamp: {prefix}");

    let bytes = prefix.as_bytes();
    for index in [0, 1, 2, 3, 5, 6, 8, 9, 11, 12, 14, 15, 17, 18] {
        assert!(
            bytes[index].is_ascii_digit(),
            "unexpected timestamp: {prefix}"
        );
    }
    assert_eq!(b'-', bytes[4]);
    assert_eq!(b'-', bytes[7]);
    assert_eq!(b'T', bytes[10]);
    assert_eq!(b':', bytes[13]);
    assert_eq!(b':', bytes[16]);
}

/// stdout lines land in the log file and stderr lines in the error
/// file, never the other way around.
#[test_log::test(tokio::test)]
async fn stdout_and_stderr_go_to_their_own_files() {
    let config = indoc! {r#"
        [[processes]]
        name = "chatty"
        script = "{temp_path}/chatty.sh"
        interpreter = "/bin/sh"
        autorestart = false
        log-file = "{temp_path}/chatty.log"
        error-file = "{temp_path}/chatty_error.log"
    "#};

    let scripts = [(
        "chatty.sh",
        "echo to-stdout\necho to-stderr 1>&2\nexit 0\n",
    )];

    let (supervisor, _tx, dir) = start(config, &scripts).await;
    let result = supervisor.await;

    assert!(result.is_ok());
    assert_eq!("to-stdout\n", read_file(&dir, "chatty.log").await);
    assert_eq!("to-stderr\n", read_file(&dir, "chatty_error.log").await);
}

/// With `time = true` every captured line carries a capture-time
/// timestamp prefix.
#[test_log::test(tokio::test)]
async fn timestamps_prefix_each_captured_line() {
    let config = indoc! {r#"
        [[processes]]
        name = "timestamped"
        script = "{temp_path}/timestamped.sh"
        interpreter = "/bin/sh"
        autorestart = false
        time = true
        log-file = "{temp_path}/timestamped.log"
        error-file = "{temp_path}/timestamped_error.log"
    "#};

    let scripts = [("timestamped.sh", "echo first\necho second\nexit 0\n")];

    let (supervisor, _tx, dir) = start(config, &scripts).await;
    let result = supervisor.await;

    assert!(result.is_ok());

    let log = read_file(&dir, "timestamped.log").await;
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(2, lines.len(), "unexpected log: {log}");

    for line in lines {
        assert_timestamped(line);
    }
}

/// Log files are opened in append mode; contents from before the
/// supervisor started (or from a previous run) are preserved.
#[test_log::test(tokio::test)]
async fn log_files_are_appended_not_truncated() {
    let config = indoc! {r#"
        [[processes]]
        name = "appender"
        script = "{temp_path}/appender.sh"
        interpreter = "/bin/sh"
        autorestart = false
        log-file = "{temp_path}/appender.log"
        error-file = "{temp_path}/appender_error.log"
    "#};

    // The pre-existing log file is seeded through the script-writing
    // mechanism; only `appender.sh` is actually executed.
    let scripts = [
        ("appender.sh", "echo fresh-run\nexit 0\n"),
        ("appender.log", "previous-run\n"),
    ];

    let (supervisor, _tx, dir) = start(config, &scripts).await;
    let result = supervisor.await;

    assert!(result.is_ok());
    assert_eq!(
        "previous-run\nfresh-run\n",
        read_file(&dir, "appender.log").await
    );
}

/// Two processes running concurrently each get their own lines, and
/// only their own lines, in their own log files.
#[test_log::test(tokio::test)]
async fn concurrent_processes_write_only_to_their_own_files() {
    let config = indoc! {r#"
        [[processes]]
        name = "alpha"
        script = "{temp_path}/alpha.sh"
        interpreter = "/bin/sh"
        autorestart = false
        log-file = "{temp_path}/alpha.log"
        error-file = "{temp_path}/alpha_error.log"

        [[processes]]
        name = "beta"
        script = "{temp_path}/beta.sh"
        interpreter = "/bin/sh"
        autorestart = false
        log-file = "{temp_path}/beta.log"
        error-file = "{temp_path}/beta_error.log"
    "#};

    let scripts = [
        ("alpha.sh", "for i in 1 2 3 4 5; do echo alpha; done\n"),
        ("beta.sh", "for i in 1 2 3 4 5; do echo beta; done\n"),
    ];

    let (supervisor, _tx, dir) = start(config, &scripts).await;
    let result = supervisor.await;

    assert!(result.is_ok());

    let alpha_log = read_file(&dir, "alpha.log").await;
    assert_eq!(5, alpha_log.lines().count());
    assert!(alpha_log.lines().all(|line| line == "alpha"));

    let beta_log = read_file(&dir, "beta.log").await;
    assert_eq!(5, beta_log.lines().count());
    assert!(beta_log.lines().all(|line| line == "beta"));
}

//! Minimal declarative process supervisor: launches the processes
//! listed in a configuration file, captures their output into
//! per-process log files, and restarts them after exit according to a
//! fixed-delay, bounded-count restart policy.

#![forbid(unsafe_code, future_incompatible)]
#![deny(
    missing_debug_implementations,
    nonstandard_style,
    missing_docs,
    unreachable_pub,
    missing_copy_implementations,
    unused_qualifications,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

use anyhow::Context;
use clap::Parser;
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::mpsc,
};
use vigil::config::Config;

#[derive(Parser)]
#[clap(about, long_about = None)]
struct Cli {
    /// Check the configuration file for errors, but do not start any
    /// processes.
    #[clap(long)]
    check: bool,

    config_file: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Crash the supervisor on a panic anywhere (including in a
    // background Tokio task, since we want panic to mean "something is
    // very wrong; stop everything").
    std::panic::set_hook(Box::new(|info| {
        eprintln!("Process panicked: {info}");
        std::process::abort();
    }));

    // Set the RUST_LOG, if it hasn't been explicitly defined
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info")
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stdout)
        .init();

    // Parse the command line arguments.
    let cli = Cli::parse();

    // Read and parse the config file.
    let config_file = tokio::fs::read_to_string(cli.config_file)
        .await
        .with_context(|| "Unable to read config file")?;
    let config: Config =
        toml::from_str(&config_file).with_context(|| "Error parsing config file")?;

    // We're done if this was only a config file check (but still run
    // the semantic checks that the parser cannot express).
    if cli.check {
        config.validate()?;
        return Ok(());
    }

    // Create the external shutdown signal (used to shut down the
    // supervisor, and with it every supervised process, on UNIX
    // signals).
    let (shutdown_sender, shutdown_receiver) = mpsc::unbounded_channel();

    let sigint_shutdown_sender = shutdown_sender.clone();
    tokio::spawn(async move {
        signal(SignalKind::interrupt())
            .expect("Failed to register SIGINT handler")
            .recv()
            .await;
        let _ = sigint_shutdown_sender.send(());
    });

    let sigterm_shutdown_sender = shutdown_sender.clone();
    tokio::spawn(async move {
        signal(SignalKind::terminate())
            .expect("Failed to register SIGTERM handler")
            .recv()
            .await;
        let _ = sigterm_shutdown_sender.send(());
    });

    vigil::run(config, shutdown_receiver)
        .await
        .with_context(|| "Supervisor aborted")
}

//! Worker binary.
//!
//! Spawned by the controller once per add-on id; serves execute
//! requests over stdio until stopped. Runs as its own OS process so a
//! crashing or hanging add-on can never take the controller with it.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Isolated add-on execution worker for kodidev.
#[derive(Parser, Debug)]
#[command(name = "kodidev-worker")]
struct Args {
    /// Exit after serving a single invocation instead of staying
    /// alive for reuse.
    #[arg(long)]
    single_shot: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // The controller owns stdout for the message channel; worker
    // logging goes to the inherited stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match kodidev::sandbox::worker::run(args.single_shot) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("worker error: {}", e);
            ExitCode::FAILURE
        }
    }
}

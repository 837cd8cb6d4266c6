//! Attest - command-line entry point
//!
//! Exit codes: 0 on success or a clean interrupt, 1 on errors, 2 when a
//! proof fails verification.

use std::process::ExitCode;

use attest_cli::{run, Cli, Outcome};
use attest_signer::CancellationToken;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so signed JSON on stdout stays clean
    let default_filter = if cli.verbose { "attest=debug" } else { "attest=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, cancelling");
            on_signal.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(Outcome::Interrupted) => {
            eprintln!("Interrupted");
            ExitCode::SUCCESS
        }
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

//! Main entry point for the qlgen CLI.

use clap::Parser;
use qlgen_cli::Cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "qlgen=debug"
    } else if cli.quiet {
        "qlgen=warn"
    } else {
        "qlgen=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match qlgen_cli::run(cli) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            qlgen_cli::report(&error);
            std::process::exit(1);
        }
    }
}

use clap::Parser;
use dotenv::dotenv;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

use cronweaver::presentation::cli::commands::dispatch;
use cronweaver::presentation::cli::Cli;

fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("cronweaver=debug,info")
    } else {
        EnvFilter::new("cronweaver=info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    ExitCode::from(dispatch(&cli))
}

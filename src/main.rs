use std::process::ExitCode;

use anyhow::Result;
use borrowline::cli::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    borrowline::telemetry::init(cli.log_format);
    cli.run().await
}

//! Binary entry point for querylytics-rs.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use querylytics_rs::cli::{Cli, execute};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    execute(Cli::parse()).await
}

mod analysis;
mod cli;
mod error;
mod insights;
mod merge;
mod models;
mod output;
mod pipeline;
mod progress;
mod providers;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting buildtrends");
    cli.execute().await?;

    Ok(())
}

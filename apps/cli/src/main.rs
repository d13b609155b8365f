//! SiteBot CLI: a Telegram bot that answers questions about a website.
//!
//! Runs the webhook server or the long-poll loop, and carries the small
//! operational commands around them.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

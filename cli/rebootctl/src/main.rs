//! rebootctl - control the reboot daemon and the fleet reboot locks.

use anyhow::Result;
use clap::Parser;

mod client;
mod commands;
mod error;
mod identity;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}

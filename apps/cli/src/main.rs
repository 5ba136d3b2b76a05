//! crmsync CLI - merge event feedback into a CRM contact export.
//!
//! Fetches the CRM contact CSV and the feedback form submissions, fills in
//! missing contact details, appends feedback history, and writes a
//! consolidated CSV.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

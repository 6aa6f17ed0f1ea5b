//! Storbatch CLI Binary
//!
//! Loads configuration, initializes logging, runs one batch, and applies the
//! exit-code policy.

use anyhow::Context;
use clap::Parser;
use std::process;
use storbatch::cli::{run, Cli};
use storbatch::config::StorbatchConfig;
use storbatch::logging::init_logging;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match real_main(&cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("batch run failed: {e:#}");
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

async fn real_main(cli: &Cli) -> anyhow::Result<i32> {
    let mut config =
        StorbatchConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);

    init_logging(Some(&config.logging)).context("failed to initialize logging")?;
    info!("storbatch starting");

    let code = run(cli, &config).await?;
    Ok(code)
}

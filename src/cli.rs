//! CLI surface: clap definitions and the top-level run flow.

use crate::artifact;
use crate::batch::Orchestrator;
use crate::config::StorbatchConfig;
use crate::error::ProvisionError;
use crate::remote::{ArmClient, ClientSecretTokenProvider};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

/// storbatch - batch provisioning of Azure storage accounts
#[derive(Parser)]
#[command(name = "storbatch")]
#[command(about = "Provision a batch of Azure storage accounts and emit their connection strings")]
pub struct Cli {
    /// Configuration file path (default: storbatch.toml in the working directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Resource group to create the accounts in
    #[arg(long)]
    pub resource_group: Option<String>,

    /// Region for the resource group and every account
    #[arg(long)]
    pub location: Option<String>,

    /// Account name prefix (lowercase letters and digits)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Number of accounts to create
    #[arg(long)]
    pub count: Option<usize>,

    /// Zero-padding width for the slot suffix
    #[arg(long)]
    pub digit_width: Option<usize>,

    /// Maximum provisioning tasks in flight at once
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Output artifact path
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Validate configuration and print the names that would be created,
    /// without any remote calls
    #[arg(long)]
    pub dry_run: bool,

    /// Exit non-zero if any individual account failed (the default is to
    /// report failures but exit 0 as long as the resource group succeeded)
    #[arg(long)]
    pub fail_on_account_errors: bool,

    /// Suppress all log output
    #[arg(long)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

impl Cli {
    /// Merge CLI flags over the loaded configuration. Flags win.
    pub fn apply_overrides(&self, config: &mut StorbatchConfig) {
        if let Some(ref resource_group) = self.resource_group {
            config.batch.resource_group = resource_group.clone();
        }
        if let Some(ref location) = self.location {
            config.batch.location = location.clone();
        }
        if let Some(ref prefix) = self.prefix {
            config.batch.name_prefix = prefix.clone();
        }
        if let Some(count) = self.count {
            config.batch.count = count;
        }
        if let Some(digit_width) = self.digit_width {
            config.batch.digit_width = digit_width;
        }
        if let Some(max_concurrency) = self.max_concurrency {
            config.batch.max_concurrency = max_concurrency;
        }
        if let Some(ref output) = self.output {
            config.output.path = output.clone();
        }

        if self.verbose {
            config.logging.level = "debug".to_string();
        }
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref format) = self.log_format {
            config.logging.format = format.clone();
        }
        if self.quiet {
            config.logging.level = "off".to_string();
        }
    }
}

/// Execute one batch run. Returns the process exit code.
pub async fn run(cli: &Cli, config: &StorbatchConfig) -> Result<i32, ProvisionError> {
    let request = config.batch_request();
    request.validate()?;

    if cli.dry_run {
        println!(
            "dry run: {} account(s) would be created in resource group '{}' ({})",
            request.count, request.resource_group, request.location
        );
        for slot in 0..request.count {
            println!("  {}", request.slot_name(slot));
        }
        return Ok(0);
    }

    config.validate_credentials()?;
    let tokens = Arc::new(
        ClientSecretTokenProvider::new(
            config.credentials.tenant_id.clone(),
            config.credentials.client_id.clone(),
            config.credentials.client_secret.clone(),
        )
        .map_err(|e| ProvisionError::Auth(e.to_string()))?,
    );
    let client = Arc::new(
        ArmClient::new(config.credentials.subscription_id.clone(), tokens)
            .map_err(|e| ProvisionError::Config(e.to_string()))?,
    );

    let orchestrator = Orchestrator::new(client, config.retry_policy());
    let outcome = orchestrator.run(&request).await?;

    for descriptor in outcome.connections().values() {
        println!("Storage account ready: {}", descriptor.account_name);
    }

    artifact::write_artifact(&outcome, &config.output.path)?;
    println!(
        "{} of {} accounts provisioned; connection configuration written to {}",
        outcome.connections().len(),
        request.count,
        config.output.path.display()
    );
    println!("{}", artifact::failure_summary(&outcome));

    if cli.fail_on_account_errors && !outcome.failures().is_empty() {
        Ok(1)
    } else {
        Ok(0)
    }
}

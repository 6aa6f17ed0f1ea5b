//! Configuration System
//!
//! Layered configuration for one batch run: an optional `storbatch.toml`
//! file overridden by `STORBATCH_*` environment variables, deserialized into
//! typed sections with per-field defaults. CLI flags are merged on top by
//! the caller (see `cli`). Validation happens once, at load time.

use crate::batch::{BatchRequest, DEFAULT_MAX_CONCURRENCY};
use crate::error::ProvisionError;
use crate::logging::LoggingConfig;
use crate::provision::KeySelection;
use crate::remote::{AccountKind, SkuName};
use crate::retry::RetryPolicy;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorbatchConfig {
    /// Service-principal credentials for the management API
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Batch shape: what to create, where, and how fast
    #[serde(default)]
    pub batch: BatchConfig,

    /// Retry policy for remote calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Output artifact settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub tenant_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub resource_group: String,

    #[serde(default = "default_location")]
    pub location: String,

    #[serde(default)]
    pub name_prefix: String,

    #[serde(default = "default_count")]
    pub count: usize,

    /// Zero-padding width for slot suffixes (0 disables padding)
    #[serde(default = "default_digit_width")]
    pub digit_width: usize,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_sku")]
    pub sku: SkuName,

    #[serde(default = "default_kind")]
    pub kind: AccountKind,

    /// Pick the key with this name instead of the first key in the list
    #[serde(default)]
    pub key_name: Option<String>,

    /// Overall bound on the fan-out, in seconds (unset = no deadline)
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

fn default_location() -> String {
    "northeurope".to_string()
}

fn default_count() -> usize {
    1
}

fn default_digit_width() -> usize {
    2
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_sku() -> SkuName {
    SkuName::StandardLrs
}

fn default_kind() -> AccountKind {
    AccountKind::StorageV2
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            resource_group: String::new(),
            location: default_location(),
            name_prefix: String::new(),
            count: default_count(),
            digit_width: default_digit_width(),
            max_concurrency: default_max_concurrency(),
            sku: default_sku(),
            kind: default_kind(),
            key_name: None,
            deadline_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_factor() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
}

fn default_output_path() -> PathBuf {
    PathBuf::from(crate::artifact::DEFAULT_ARTIFACT_NAME)
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

impl StorbatchConfig {
    /// Load configuration. Precedence (lowest to highest): struct defaults,
    /// config file, `STORBATCH_*` environment variables. Nested keys use a
    /// double underscore, e.g. `STORBATCH_BATCH__COUNT=10`.
    pub fn load(path: Option<&Path>) -> Result<Self, ProvisionError> {
        let mut builder = Config::builder();
        builder = match path {
            Some(explicit) => builder.add_source(File::from(explicit)),
            None => builder.add_source(File::with_name("storbatch").required(false)),
        };
        builder = builder.add_source(
            Environment::with_prefix("STORBATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder.build()?.try_deserialize()?;
        Ok(loaded)
    }

    /// Check everything needed to talk to the management API is present.
    /// Split from [`Self::load`] so dry runs work without credentials.
    pub fn validate_credentials(&self) -> Result<(), ProvisionError> {
        let missing: Vec<&str> = [
            ("credentials.subscription_id", &self.credentials.subscription_id),
            ("credentials.client_id", &self.credentials.client_id),
            ("credentials.client_secret", &self.credentials.client_secret),
            ("credentials.tenant_id", &self.credentials.tenant_id),
        ]
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// Build the immutable batch request from the batch section.
    pub fn batch_request(&self) -> BatchRequest {
        BatchRequest {
            resource_group: self.batch.resource_group.clone(),
            location: self.batch.location.clone(),
            name_prefix: self.batch.name_prefix.clone(),
            count: self.batch.count,
            digit_width: self.batch.digit_width,
            sku: self.batch.sku,
            kind: self.batch.kind,
            max_concurrency: self.batch.max_concurrency,
            key_selection: match &self.batch.key_name {
                Some(name) => KeySelection::Named(name.clone()),
                None => KeySelection::First,
            },
            deadline: self.batch.deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter_factor: self.retry.jitter_factor,
        }
    }
}

//! Structured logging via the `tracing` crate.
//!
//! Console-oriented: a batch run is one process invocation, so output goes to
//! stdout or stderr in text or JSON form. Account keys never appear in log
//! fields; log lines identify accounts by name only.

use crate::error::ProvisionError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable colored output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            color: default_true(),
        }
    }
}

/// Initialize the logging system.
///
/// The `STORBATCH_LOG` environment variable takes precedence over the
/// configured level and accepts full `EnvFilter` directives.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ProvisionError> {
    let filter = build_env_filter(config);
    let format = validated_format(config)?;
    let to_stdout = matches!(config.map(|c| c.output.as_str()), Some("stdout"));
    let use_color = config.map(|c| c.color).unwrap_or(true);

    let base = Registry::default().with(filter);

    if format == "json" {
        if to_stdout {
            base.with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stdout),
            )
            .init();
        } else {
            base.with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .init();
        }
    } else if to_stdout {
        base.with(
            fmt::layer()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(use_color)
                .with_writer(std::io::stdout),
        )
        .init();
    } else {
        base.with(
            fmt::layer()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(use_color)
                .with_writer(std::io::stderr),
        )
        .init();
    }

    Ok(())
}

fn build_env_filter(config: Option<&LoggingConfig>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_env("STORBATCH_LOG") {
        return filter;
    }
    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    EnvFilter::new(level)
}

fn validated_format(config: Option<&LoggingConfig>) -> Result<String, ProvisionError> {
    let format = config.map(|c| c.format.as_str()).unwrap_or("text");
    if format != "json" && format != "text" {
        return Err(ProvisionError::Config(format!(
            "invalid log format: {format} (must be 'json' or 'text')"
        )));
    }
    Ok(format.to_string())
}

//! Result Serializer
//!
//! Renders a settled [`BatchOutcome`] into the connection-configuration
//! artifact and the failure summary. The artifact framing is fixed for
//! downstream consumers: brace-delimited, one `"key":"value"` line per
//! successful account, keys ascending, comma after every entry except the
//! last, newline after every line.

use crate::batch::BatchOutcome;
use crate::error::ProvisionError;
use std::fs;
use std::path::Path;

pub const DEFAULT_ARTIFACT_NAME: &str = "sample.config.json";

/// Render the successes as the artifact text. Deterministic: the aggregate's
/// key order is the output order.
pub fn render(outcome: &BatchOutcome) -> String {
    let connections = outcome.connections();
    let mut buffer = String::from("{\n");
    for (index, (key, descriptor)) in connections.iter().enumerate() {
        buffer.push('"');
        buffer.push_str(key);
        buffer.push_str("\":\"");
        buffer.push_str(&descriptor.connection_string);
        buffer.push('"');
        if index + 1 < connections.len() {
            buffer.push(',');
        }
        buffer.push('\n');
    }
    buffer.push_str("}\n");
    buffer
}

/// Write the artifact to `path`, UTF-8 encoded.
pub fn write_artifact(outcome: &BatchOutcome, path: &Path) -> Result<(), ProvisionError> {
    fs::write(path, render(outcome)).map_err(|source| ProvisionError::Artifact {
        path: path.to_path_buf(),
        source,
    })
}

/// Human-readable failure report for the console summary. Failures are never
/// written into the artifact, but they are never dropped from the report
/// either. Contains account names and reasons only, no key material.
pub fn failure_summary(outcome: &BatchOutcome) -> String {
    let failures = outcome.failures();
    if failures.is_empty() {
        return "all accounts provisioned".to_string();
    }
    let mut lines = vec![format!("{} account(s) failed:", failures.len())];
    for failure in failures {
        lines.push(format!(
            "  {} (slot {}): {}: {}",
            failure.account_name, failure.slot, failure.kind, failure.message
        ));
    }
    lines.join("\n")
}

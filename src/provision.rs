//! Provisioning Task
//!
//! One unit of work: create a storage account, fetch its access key, and
//! produce a named connection descriptor. Every failure is captured into the
//! task's own result; nothing propagates across task boundaries.

use crate::error::{RemoteError, RemoteErrorKind};
use crate::remote::{AccountKey, AccountKind, RemoteClient, SkuName};
use crate::retry::{retry, RetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which access key to take from the list returned by the API.
///
/// The API does not guarantee positional stability across key rotations, so
/// selection is an explicit policy rather than a hard-coded index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeySelection {
    /// First key in the returned list (matches the original tool's behavior).
    First,
    /// Key with the given `keyName`, e.g. "key2".
    Named(String),
}

impl Default for KeySelection {
    fn default() -> Self {
        KeySelection::First
    }
}

impl KeySelection {
    pub fn select<'a>(&self, keys: &'a [AccountKey]) -> Option<&'a AccountKey> {
        match self {
            KeySelection::First => keys.first(),
            KeySelection::Named(name) => keys.iter().find(|k| &k.key_name == name),
        }
    }
}

/// Connection material for one provisioned account. The key is a secret:
/// it reaches the output artifact and nothing else.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub account_name: String,
    pub account_key: String,
    pub connection_string: String,
}

impl ConnectionDescriptor {
    pub fn new(account_name: &str, account_key: &str) -> Self {
        let connection_string = format!(
            "DefaultEndpointsProtocol=https;AccountName={account_name};AccountKey={account_key};EndpointSuffix=core.windows.net"
        );
        Self {
            account_name: account_name.to_string(),
            account_key: account_key.to_string(),
            connection_string,
        }
    }
}

// Manual Debug: descriptors end up in logs via results and must not leak keys.
impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .finish()
    }
}

/// Terminal outcome of one provisioning task.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(ConnectionDescriptor),
    Failure {
        kind: RemoteErrorKind,
        message: String,
    },
}

/// Result of one batch slot, immutable once produced.
#[derive(Debug, Clone)]
pub struct ProvisioningResult {
    pub slot: usize,
    pub account_name: String,
    pub outcome: Outcome,
}

impl ProvisioningResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }
}

/// Fixed per-batch parameters shared by every provisioning task.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub resource_group: String,
    pub location: String,
    pub sku: SkuName,
    pub kind: AccountKind,
    pub key_selection: KeySelection,
}

/// Drive one storage-account lifecycle end to end: create (retried), list
/// keys (retried), select a key, build the descriptor.
pub async fn provision_account(
    client: &dyn RemoteClient,
    policy: &RetryPolicy,
    spec: &TaskSpec,
    slot: usize,
    account_name: String,
) -> ProvisioningResult {
    let outcome = match provision_inner(client, policy, spec, &account_name).await {
        Ok(descriptor) => {
            info!(account = %account_name, slot, "storage account provisioned");
            Outcome::Success(descriptor)
        }
        Err(err) => {
            debug!(account = %account_name, slot, error = %err, "provisioning failed");
            Outcome::Failure {
                kind: err.kind(),
                message: err.to_string(),
            }
        }
    };
    ProvisioningResult {
        slot,
        account_name,
        outcome,
    }
}

async fn provision_inner(
    client: &dyn RemoteClient,
    policy: &RetryPolicy,
    spec: &TaskSpec,
    account_name: &str,
) -> Result<ConnectionDescriptor, RemoteError> {
    let created = retry(policy, "create_storage_account", || {
        client.create_storage_account(
            &spec.resource_group,
            account_name,
            &spec.location,
            spec.sku,
            spec.kind,
        )
    })
    .await?;
    debug!(
        account = %created.name,
        state = %created.provisioning_state,
        "storage account created"
    );

    let keys = retry(policy, "list_account_keys", || {
        client.list_account_keys(&spec.resource_group, account_name)
    })
    .await?;

    let key = spec.key_selection.select(&keys).ok_or_else(|| {
        RemoteError::Fatal(format!(
            "account '{account_name}' returned no key matching the selection policy"
        ))
    })?;

    Ok(ConnectionDescriptor::new(account_name, &key.value))
}

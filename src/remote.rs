//! Remote Resource Client Abstraction
//!
//! Narrow interface over the management API consumed by the orchestrator:
//! resource-group create-or-update, storage-account creation, and key listing.
//! The production implementation speaks the Azure Resource Manager REST API
//! (`arm`); tests substitute scripted mocks through the same trait.

use crate::error::RemoteError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod arm;
pub mod auth;

pub use arm::ArmClient;
pub use auth::{ClientSecretTokenProvider, TokenProvider};

/// Storage account SKU. All accounts within one batch share a SKU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkuName {
    #[serde(rename = "Standard_LRS")]
    StandardLrs,
    #[serde(rename = "Standard_GRS")]
    StandardGrs,
    #[serde(rename = "Standard_RAGRS")]
    StandardRagrs,
    #[serde(rename = "Standard_ZRS")]
    StandardZrs,
    #[serde(rename = "Premium_LRS")]
    PremiumLrs,
}

impl SkuName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkuName::StandardLrs => "Standard_LRS",
            SkuName::StandardGrs => "Standard_GRS",
            SkuName::StandardRagrs => "Standard_RAGRS",
            SkuName::StandardZrs => "Standard_ZRS",
            SkuName::PremiumLrs => "Premium_LRS",
        }
    }
}

/// Storage account kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    Storage,
    StorageV2,
    BlobStorage,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Storage => "Storage",
            AccountKind::StorageV2 => "StorageV2",
            AccountKind::BlobStorage => "BlobStorage",
        }
    }
}

/// Handle to a created storage account as reported by the management API.
#[derive(Debug, Clone)]
pub struct AccountHandle {
    pub id: String,
    pub name: String,
    pub location: String,
    pub provisioning_state: String,
}

/// One access key for a storage account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountKey {
    #[serde(rename = "keyName")]
    pub key_name: String,
    pub value: String,
    #[serde(default)]
    pub permissions: Option<String>,
}

/// Remote resource client trait
///
/// Implementations must be safe for concurrent use: one client handle is
/// shared across all provisioning tasks in a batch.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Create the resource group, or update it in place if it already exists.
    async fn create_or_update_resource_group(
        &self,
        name: &str,
        location: &str,
    ) -> Result<(), RemoteError>;

    /// Create one storage account and wait for it to reach a terminal state.
    async fn create_storage_account(
        &self,
        resource_group: &str,
        account_name: &str,
        location: &str,
        sku: SkuName,
        kind: AccountKind,
    ) -> Result<AccountHandle, RemoteError>;

    /// List the access keys of an existing storage account.
    async fn list_account_keys(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> Result<Vec<AccountKey>, RemoteError>;
}

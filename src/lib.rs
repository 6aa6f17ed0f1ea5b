//! Storbatch: Concurrent Batch Provisioning of Azure Storage Accounts
//!
//! Provisions a resource group and N storage accounts against the Azure
//! management API under a bounded concurrency ceiling, with kind-classified
//! retries for throttled and transient failures, and emits a deterministic
//! connection-configuration artifact.

pub mod artifact;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod namer;
pub mod provision;
pub mod remote;
pub mod retry;

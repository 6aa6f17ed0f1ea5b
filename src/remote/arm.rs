//! Azure Resource Manager REST client.
//!
//! Direct REST implementation of [`RemoteClient`]: resource-group
//! create-or-update, storage-account creation (with long-running-operation
//! polling), and key listing. HTTP failures are classified into the
//! Throttled/Conflict/Transient/Fatal taxonomy; retrying is the caller's job.

use crate::error::RemoteError;
use crate::remote::auth::TokenProvider;
use crate::remote::{AccountHandle, AccountKey, AccountKind, RemoteClient, SkuName};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

const ARM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ARM_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";
const STORAGE_API_VERSION: &str = "2023-01-01";

/// Default pause between long-running-operation polls when the service gives
/// no Retry-After hint.
const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(2);
const MAX_POLL_ATTEMPTS: u32 = 120;

fn build_arm_http_client() -> Result<Client, RemoteError> {
    Client::builder()
        .connect_timeout(ARM_CONNECT_TIMEOUT)
        .timeout(ARM_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| RemoteError::Fatal(format!("failed to create HTTP client: {e}")))
}

/// Map a transport-level failure (no HTTP status available) to the taxonomy.
fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Transient(format!("request timeout: {error}"))
    } else if error.is_connect() {
        RemoteError::Transient(format!("connection error: {error}"))
    } else {
        RemoteError::Fatal(format!("HTTP error: {error}"))
    }
}

fn retry_after_of(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Classify a non-success HTTP response, consuming its body for the message.
async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status();
    let retry_after = retry_after_of(&response);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());

    match status {
        StatusCode::TOO_MANY_REQUESTS => RemoteError::Throttled {
            message: format!("{status}: {body}"),
            retry_after,
        },
        StatusCode::CONFLICT => RemoteError::Conflict(format!("{status}: {body}")),
        StatusCode::REQUEST_TIMEOUT => RemoteError::Transient(format!("{status}: {body}")),
        _ if status.is_server_error() => RemoteError::Transient(format!("{status}: {body}")),
        _ => RemoteError::Fatal(format!("{status}: {body}")),
    }
}

#[derive(Deserialize)]
struct ArmAccountProperties {
    #[serde(rename = "provisioningState", default)]
    provisioning_state: Option<String>,
}

#[derive(Deserialize)]
struct ArmAccount {
    id: String,
    name: String,
    location: String,
    #[serde(default)]
    properties: Option<ArmAccountProperties>,
}

impl From<ArmAccount> for AccountHandle {
    fn from(account: ArmAccount) -> Self {
        AccountHandle {
            id: account.id,
            name: account.name,
            location: account.location,
            provisioning_state: account
                .properties
                .and_then(|p| p.provisioning_state)
                .unwrap_or_else(|| "Succeeded".to_string()),
        }
    }
}

#[derive(Deserialize)]
struct ListKeysResponse {
    keys: Vec<AccountKey>,
}

/// REST client for the Azure Resource Manager endpoint.
pub struct ArmClient {
    http: Client,
    base_url: String,
    subscription_id: String,
    tokens: Arc<dyn TokenProvider>,
}

impl ArmClient {
    pub fn new(subscription_id: String, tokens: Arc<dyn TokenProvider>) -> Result<Self, RemoteError> {
        Ok(Self {
            http: build_arm_http_client()?,
            base_url: "https://management.azure.com".to_string(),
            subscription_id,
            tokens,
        })
    }

    /// Override the management endpoint, e.g. for sovereign clouds or test servers.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn authorized_put(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<Response, RemoteError> {
        let token = self.tokens.bearer_token().await?;
        self.http
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)
    }

    /// Poll a long-running operation until the service reports a terminal
    /// state. Returns the final response body.
    async fn poll_until_done(&self, poll_url: &str) -> Result<ArmAccount, RemoteError> {
        for _ in 0..MAX_POLL_ATTEMPTS {
            let token = self.tokens.bearer_token().await?;
            let response = self
                .http
                .get(poll_url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(map_transport_error)?;

            match response.status() {
                StatusCode::OK => {
                    return response
                        .json::<ArmAccount>()
                        .await
                        .map_err(|e| RemoteError::Transient(format!("malformed poll response: {e}")));
                }
                StatusCode::ACCEPTED | StatusCode::CREATED | StatusCode::NO_CONTENT => {
                    let delay = retry_after_of(&response).unwrap_or(DEFAULT_POLL_DELAY);
                    debug!(poll_url, delay_ms = delay.as_millis() as u64, "operation in progress");
                    sleep(delay).await;
                }
                _ => return Err(error_from_response(response).await),
            }
        }
        Err(RemoteError::Transient(format!(
            "operation at {poll_url} did not settle within {MAX_POLL_ATTEMPTS} polls"
        )))
    }
}

#[async_trait]
impl RemoteClient for ArmClient {
    async fn create_or_update_resource_group(
        &self,
        name: &str,
        location: &str,
    ) -> Result<(), RemoteError> {
        let url = format!(
            "{}/subscriptions/{}/resourcegroups/{}?api-version={}",
            self.base_url, self.subscription_id, name, RESOURCE_GROUP_API_VERSION
        );
        let response = self.authorized_put(&url, json!({ "location": location })).await?;

        if response.status().is_success() {
            debug!(resource_group = name, "resource group ensured");
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn create_storage_account(
        &self,
        resource_group: &str,
        account_name: &str,
        location: &str,
        sku: SkuName,
        kind: AccountKind,
    ) -> Result<AccountHandle, RemoteError> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}?api-version={}",
            self.base_url, self.subscription_id, resource_group, account_name, STORAGE_API_VERSION
        );
        let body = json!({
            "location": location,
            "sku": { "name": sku.as_str() },
            "kind": kind.as_str(),
            "properties": {}
        });
        let response = self.authorized_put(&url, body).await?;

        match response.status() {
            StatusCode::OK => response
                .json::<ArmAccount>()
                .await
                .map(AccountHandle::from)
                .map_err(|e| RemoteError::Transient(format!("malformed create response: {e}"))),
            StatusCode::ACCEPTED => {
                // Creation is asynchronous. Prefer the Location header: its
                // terminal 200 carries the resource body, so one poll loop
                // covers both it and the plain resource URL fallback.
                let poll_url = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .unwrap_or(url);
                self.poll_until_done(&poll_url).await.map(AccountHandle::from)
            }
            _ => Err(error_from_response(response).await),
        }
    }

    async fn list_account_keys(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> Result<Vec<AccountKey>, RemoteError> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}/listKeys?api-version={}",
            self.base_url, self.subscription_id, resource_group, account_name, STORAGE_API_VERSION
        );
        let token = self.tokens.bearer_token().await?;
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status().is_success() {
            response
                .json::<ListKeysResponse>()
                .await
                .map(|r| r.keys)
                .map_err(|e| RemoteError::Transient(format!("malformed listKeys response: {e}")))
        } else {
            Err(error_from_response(response).await)
        }
    }
}

//! Service-principal authentication against AAD.
//!
//! Client-credentials token fetch with in-process caching. Kept behind a
//! trait so the ARM client (and tests) never depend on the concrete flow.

use crate::error::RemoteError;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

const TOKEN_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Renew this long before the reported expiry to avoid using a token that
/// dies mid-request.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Source of bearer tokens for management API requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, RemoteError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// OAuth2 client-credentials token provider for a service principal.
pub struct ClientSecretTokenProvider {
    http: Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    scope: String,
    authority: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientSecretTokenProvider {
    pub fn new(
        tenant_id: String,
        client_id: String,
        client_secret: String,
    ) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .connect_timeout(TOKEN_CONNECT_TIMEOUT)
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Fatal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            tenant_id,
            client_id,
            client_secret,
            scope: "https://management.azure.com/.default".to_string(),
            authority: "https://login.microsoftonline.com".to_string(),
            cached: Mutex::new(None),
        })
    }

    /// Override the token authority, e.g. for sovereign clouds or test servers.
    pub fn with_authority(mut self, authority: String) -> Self {
        self.authority = authority;
        self
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.cached.lock();
        guard.as_ref().and_then(|cached| {
            if Instant::now() < cached.expires_at {
                Some(cached.token.clone())
            } else {
                None
            }
        })
    }

    async fn fetch_token(&self) -> Result<TokenResponse, RemoteError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        );
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];
        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    RemoteError::Transient(format!("token endpoint unreachable: {e}"))
                } else {
                    RemoteError::Fatal(format!("token request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(if status.is_server_error() {
                RemoteError::Transient(format!("token endpoint returned {status}: {body}"))
            } else {
                RemoteError::Fatal(format!("authentication rejected ({status}): {body}"))
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| RemoteError::Fatal(format!("malformed token response: {e}")))
    }
}

#[async_trait]
impl TokenProvider for ClientSecretTokenProvider {
    async fn bearer_token(&self) -> Result<String, RemoteError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let fetched = self.fetch_token().await?;
        debug!(expires_in = fetched.expires_in, "acquired management API token");

        let lifetime = Duration::from_secs(fetched.expires_in).saturating_sub(EXPIRY_SKEW);
        let mut guard = self.cached.lock();
        *guard = Some(CachedToken {
            token: fetched.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(fetched.access_token)
    }
}

//! Process-wide cache of short-lived access tokens.
//!
//! Tokens are keyed by credential identity. Each key has its own async
//! mutex, so concurrent requesters for the same key wait on a single refresh
//! instead of racing. A token is refreshed once its remaining lifetime drops
//! below the cache's margin.
//!
//! The Vertex flavour of the Gemini adapter obtains its bearer token here by
//! exchanging an RS256-signed assertion built from a service account key.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Refresh tokens with less than this lifetime left
pub const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// OAuth scope requested for Vertex calls
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Shared cache used by every turn in the process
pub static TOKEN_CACHE: Lazy<TokenCache> = Lazy::new(|| TokenCache::new(REFRESH_MARGIN));

/// Failures obtaining an access token
#[derive(Error, Debug)]
pub enum TokenCacheError {
    #[error("Invalid service account key: {message}")]
    InvalidServiceAccount { message: String },

    #[error("Failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Token exchange failed: {message}")]
    Exchange {
        status: Option<u16>,
        message: String,
    },
}

/// A bearer token and the instant it stops being valid
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Instant::now() + lifetime,
        }
    }

    /// Check if at least `margin` of lifetime remains
    pub fn is_fresh(&self, margin: Duration) -> bool {
        self.expires_at.saturating_duration_since(Instant::now()) > margin
    }
}

type Slot = Arc<Mutex<Option<AccessToken>>>;

/// Single-flight TTL cache of access tokens
#[derive(Debug)]
pub struct TokenCache {
    entries: Mutex<HashMap<String, Slot>>,
    margin: Duration,
}

impl TokenCache {
    pub fn new(margin: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            margin,
        }
    }

    /// Return the cached token for `key`, running `refresh` when it is
    /// missing or close to expiry.
    ///
    /// Only one refresh runs per key at a time; other callers wait for it
    /// and then reuse its result. A failed refresh leaves the slot empty.
    pub async fn get_or_refresh<F, Fut, E>(&self, key: &str, refresh: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, E>>,
    {
        let slot = {
            let mut entries = self.entries.lock().await;
            entries.entry(key.to_string()).or_default().clone()
        };

        let mut guard = slot.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh(self.margin) {
                return Ok(token.value.clone());
            }
            tracing::debug!("🔑 Cached token for {} is near expiry, refreshing", key);
        }

        let token = refresh().await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    /// Drop the cached token for `key`
    pub async fn invalidate(&self, key: &str) {
        let slot = self.entries.lock().await.get(key).cloned();
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service account key file used for token exchange
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parse a service account key from its JSON text
    pub fn from_json(json: &str) -> Result<Self, TokenCacheError> {
        serde_json::from_str(json).map_err(|e| TokenCacheError::InvalidServiceAccount {
            message: e.to_string(),
        })
    }

    /// Cache key identifying this credential
    pub fn cache_key(&self) -> String {
        format!("{}|{}", self.client_email, self.token_uri)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Build the RS256-signed assertion exchanged for an access token
pub fn sign_assertion(key: &ServiceAccountKey, issued_at: i64) -> Result<String, TokenCacheError> {
    let claims = Claims {
        iss: &key.client_email,
        scope: CLOUD_PLATFORM_SCOPE,
        aud: &key.token_uri,
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };
    let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
    let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(jsonwebtoken::encode(&header, &claims, &encoding_key)?)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Exchange a signed assertion for a fresh access token
pub async fn exchange(
    client: &reqwest::Client,
    key: &ServiceAccountKey,
) -> Result<AccessToken, TokenCacheError> {
    let assertion = sign_assertion(key, chrono::Utc::now().timestamp())?;
    tracing::debug!("🔑 Exchanging assertion for {} at {}", key.client_email, key.token_uri);

    let response = client
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(|e| TokenCacheError::Exchange {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(TokenCacheError::Exchange {
            status: Some(status.as_u16()),
            message: format!("HTTP {}: {}", status.as_u16(), body),
        });
    }

    let token: TokenResponse = response.json().await.map_err(|e| TokenCacheError::Exchange {
        status: None,
        message: format!("invalid token response: {}", e),
    })?;
    tracing::info!(
        "🔑 Obtained access token for {} valid for {}s",
        key.client_email,
        token.expires_in
    );
    Ok(AccessToken::new(
        token.access_token,
        Duration::from_secs(token.expires_in),
    ))
}

/// Bearer token for a service account, served from [`TOKEN_CACHE`]
pub async fn service_account_token(
    client: &reqwest::Client,
    key: &ServiceAccountKey,
) -> Result<String, TokenCacheError> {
    TOKEN_CACHE
        .get_or_refresh(&key.cache_key(), || exchange(client, key))
        .await
}

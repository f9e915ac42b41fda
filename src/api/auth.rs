//! Bearer token providers
//!
//! The fetcher only ever asks for "a currently valid token". Client-credentials
//! tokens are renewed proactively, five minutes before they expire.

use crate::config::AuthConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// How long before expiry a token is renewed
pub const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Longest a token is cached before asking for a new one, whatever its lifetime
pub const MAX_TOKEN_CACHE: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors raised while obtaining a token
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Token response has no access_token")]
    MissingToken,
}

/// Source of bearer credentials for the API
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token that is valid right now
    async fn token(&self) -> Result<String, AuthError>;
}

/// A fixed token from the configuration
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth client-credentials grant with a cached, proactively renewed token
pub struct ClientCredentials {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentials {
    pub fn new(
        client: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cached: Mutex::new(None),
        }
    }

    async fn request_token(&self) -> Result<CachedToken, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status(status.as_u16()));
        }

        let body: TokenResponse = response.json().await?;
        let value = body.access_token.ok_or(AuthError::MissingToken)?;
        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(0));

        tracing::info!("Renewed access token, valid for {}s", lifetime.as_secs());

        Ok(CachedToken {
            value,
            refresh_at: refresh_deadline(Instant::now(), lifetime),
        })
    }
}

/// When a token issued at `now` with `lifetime` should be renewed
///
/// Never later than [`MAX_TOKEN_CACHE`] from `now`; falls back to `now` if
/// the clock cannot represent the deadline.
fn refresh_deadline(now: Instant, lifetime: Duration) -> Instant {
    let refresh_in = if lifetime > REFRESH_MARGIN {
        lifetime - REFRESH_MARGIN
    } else {
        lifetime / 2
    };
    now.checked_add(refresh_in.min(MAX_TOKEN_CACHE)).unwrap_or(now)
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    async fn token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }
}

/// Builds the provider described by an `[auth]` section
///
/// Returns `None` when the section names neither a token nor client credentials;
/// validation rejects that case before this is reached.
pub fn provider_from_config(config: &AuthConfig, client: &Client) -> Option<Arc<dyn TokenProvider>> {
    if let Some(token) = &config.token {
        return Some(Arc::new(StaticToken::new(token.clone())));
    }

    match (&config.token_url, &config.client_id, &config.client_secret) {
        (Some(url), Some(id), Some(secret)) => Some(Arc::new(ClientCredentials::new(
            client.clone(),
            url.clone(),
            id.clone(),
            secret.clone(),
        ))),
        _ => None,
    }
}

//! TokenManager - keeps one provider credential valid across requests
//!
//! Owns the access/refresh/expiry/account quadruple. Readers always go
//! through [`TokenManager::snapshot`] so they observe either the state
//! before a refresh or the state after it, never a mix of both.
//!
//! Refreshes are single-flight: a caller that arrives while another refresh
//! is running waits for it and reuses its result instead of hitting the
//! token endpoint a second time.

use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use crate::Result;
use crate::error::Error;
use super::credentials::{account_id_from_jwt, TokenRecord, TokenStore};

/// Public OAuth client id used by the Codex CLI
pub const CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";

/// OpenAI OAuth token endpoint
pub const TOKEN_URL: &str = "https://auth.openai.com/oauth/token";

/// Current credential values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// `None` means the token is treated as already expired
    pub expires_at: Option<DateTime<Utc>>,
    pub account_id: Option<String>,
}

impl TokenState {
    pub fn from_record(record: &TokenRecord) -> Self {
        Self {
            access_token: record.access.clone(),
            refresh_token: record.refresh.clone(),
            expires_at: record
                .expires
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            account_id: record
                .account_id
                .clone()
                .or_else(|| account_id_from_jwt(&record.access)),
        }
    }

    pub fn to_record(&self) -> TokenRecord {
        TokenRecord {
            access: self.access_token.clone(),
            refresh: self.refresh_token.clone(),
            expires: self.expires_at.map(|at| at.timestamp()),
            account_id: self.account_id.clone(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => true,
        }
    }
}

/// Fresh credentials returned by the token endpoint
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl TokenGrant {
    /// Absolute expiry of this grant when issued at `now`
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        chrono::Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                Error::Refresh(format!(
                    "Token refresh returned invalid expires_in: {}",
                    self.expires_in
                ))
            })
    }
}

/// Exchanges a refresh token for a new grant
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str, client_id: &str) -> Result<TokenGrant>;
}

/// Token endpoint over HTTPS
#[derive(Clone)]
pub struct HttpTokenEndpoint {
    http: Client,
    url: String,
}

impl HttpTokenEndpoint {
    pub fn new() -> Self {
        Self::with_url(TOKEN_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }
}

impl Default for HttpTokenEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn refresh(&self, refresh_token: &str, client_id: &str) -> Result<TokenGrant> {
        let response = self
            .http
            .post(&self.url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Refresh(refresh_error_message(status, &body)));
        }

        parse_grant(&body)
    }
}

/// Build the failure message for a non-success token endpoint response.
pub(crate) fn refresh_error_message(status: StatusCode, body: &str) -> String {
    format!(
        "Token refresh failed ({}): {}",
        status.as_u16(),
        describe_oauth_error(body)
    )
}

/// Prefer `error_description`, then `error`, then the raw body.
pub(crate) fn describe_oauth_error(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.get("error_description")
                .and_then(Value::as_str)
                .or_else(|| v.get("error").and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

/// Upper bound accepted for `expires_in`, in seconds
const MAX_EXPIRES_IN: i64 = i32::MAX as i64;

/// Parse a token endpoint success body; all three fields are mandatory.
pub(crate) fn parse_grant(body: &str) -> Result<TokenGrant> {
    let data: Value = serde_json::from_str(body)
        .map_err(|e| Error::Refresh(format!("Token refresh returned invalid JSON: {e}")))?;

    let access_token = data.get("access_token").and_then(Value::as_str);
    let refresh_token = data.get("refresh_token").and_then(Value::as_str);
    let expires_in = data.get("expires_in").and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    });

    match (access_token, refresh_token, expires_in) {
        (Some(_), Some(_), Some(expires_in)) if !(0..=MAX_EXPIRES_IN).contains(&expires_in) => {
            Err(Error::Refresh(format!(
                "Token refresh returned invalid expires_in: {expires_in}"
            )))
        }
        (Some(access), Some(refresh), Some(expires_in)) => Ok(TokenGrant {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_in,
        }),
        _ => Err(Error::Refresh(
            "Token refresh response missing required fields".to_string(),
        )),
    }
}

/// Invoked with the new state after every successful refresh
pub type RefreshCallback = Arc<dyn Fn(&TokenState) + Send + Sync>;

struct Inner {
    state: TokenState,
    /// Bumped on every applied refresh
    generation: u64,
}

/// Owns one credential's lifecycle
pub struct TokenManager {
    inner: RwLock<Inner>,
    refresh_lock: Mutex<()>,
    endpoint: Arc<dyn TokenEndpoint>,
    client_id: String,
    on_refresh: Option<RefreshCallback>,
}

impl TokenManager {
    pub fn new(state: TokenState, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            inner: RwLock::new(Inner { state, generation: 0 }),
            refresh_lock: Mutex::new(()),
            endpoint,
            client_id: CLIENT_ID.to_string(),
            on_refresh: None,
        }
    }

    /// Build from a cached record, talking to the real token endpoint
    pub fn from_record(record: &TokenRecord) -> Self {
        Self::new(
            TokenState::from_record(record),
            Arc::new(HttpTokenEndpoint::new()),
        )
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_refresh_callback(mut self, callback: RefreshCallback) -> Self {
        self.on_refresh = Some(callback);
        self
    }

    /// Write every refreshed token through `store` under `provider`.
    pub fn persist_to(self, store: Arc<dyn TokenStore>, provider: impl Into<String>) -> Self {
        let provider = provider.into();
        self.with_refresh_callback(Arc::new(move |state: &TokenState| {
            if let Err(e) = store.save(&provider, &state.to_record()) {
                warn!("Failed to persist refreshed token for {}: {}", provider, e);
            }
        }))
    }

    /// Consistent copy of the current state
    pub async fn snapshot(&self) -> TokenState {
        self.inner.read().await.state.clone()
    }

    pub async fn access_token(&self) -> String {
        self.inner.read().await.state.access_token.clone()
    }

    pub async fn account_id(&self) -> Option<String> {
        self.inner.read().await.state.account_id.clone()
    }

    pub async fn can_refresh(&self) -> bool {
        self.inner.read().await.state.refresh_token.is_some()
    }

    pub async fn is_expired(&self) -> bool {
        self.inner.read().await.state.is_expired_at(Utc::now())
    }

    /// Refresh if the access token is expired; otherwise a no-op.
    pub async fn ensure_valid(&self) -> Result<()> {
        if !self.is_expired().await {
            return Ok(());
        }

        let _guard = self.refresh_lock.lock().await;
        if !self.is_expired().await {
            debug!("Token was refreshed while waiting");
            return Ok(());
        }

        self.refresh_locked().await.map(|_| ())
    }

    /// Exchange the refresh token for a new credential and return the new access token.
    pub async fn refresh(&self) -> Result<String> {
        let seen = self.inner.read().await.generation;
        let _guard = self.refresh_lock.lock().await;

        {
            let inner = self.inner.read().await;
            if inner.generation != seen {
                debug!("Reusing token from concurrent refresh");
                return Ok(inner.state.access_token.clone());
            }
        }

        self.refresh_locked().await
    }

    /// Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> Result<String> {
        let (refresh_token, previous_account) = {
            let inner = self.inner.read().await;
            (
                inner.state.refresh_token.clone(),
                inner.state.account_id.clone(),
            )
        };

        let refresh_token = refresh_token.ok_or_else(|| {
            Error::Refresh("Cannot refresh token: refresh_token not provided".to_string())
        })?;

        info!("Refreshing access token");
        let grant = self.endpoint.refresh(&refresh_token, &self.client_id).await?;

        let expires_at = grant.expires_at(Utc::now())?;
        let account_id = account_id_from_jwt(&grant.access_token).or(previous_account);
        let state = TokenState {
            expires_at: Some(expires_at),
            access_token: grant.access_token,
            refresh_token: Some(grant.refresh_token),
            account_id,
        };

        {
            let mut inner = self.inner.write().await;
            inner.state = state.clone();
            inner.generation += 1;
        }

        if let Some(callback) = &self.on_refresh {
            callback(&state);
        }

        Ok(state.access_token)
    }
}

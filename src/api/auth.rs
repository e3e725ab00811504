//! OAuth2 client-credentials token management
//!
//! `TokenProvider` owns the single cached bearer token for one connection and
//! serialises refreshes so concurrent callers never trigger duplicate token
//! exchanges.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;

use super::constants::{headers, TOKEN_SAFETY_MARGIN_SECS};
use super::error::{ApiError, ApiResult};
use super::resilience::MetricsCollector;
use crate::config::ConnectionConfig;

/// Body of a successful token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Lifetime in seconds; some identity providers send it as a string
    #[serde(default, deserialize_with = "seconds_from_number_or_string")]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
}

fn seconds_from_number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(i64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(n) => Ok(n),
        Seconds::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Cached token and its absolute expiry; an empty token means "none cached"
#[derive(Debug, Clone, Default)]
struct TokenState {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    /// The cached token, if it is still outside the safety margin
    fn usable_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let expires_at = self.expires_at?;
        if self.access_token.is_empty() {
            return None;
        }
        let margin = chrono::Duration::seconds(TOKEN_SAFETY_MARGIN_SECS);
        (now < expires_at - margin).then_some(self.access_token.as_str())
    }
}

/// Absolute expiry for a token issued at `now` that lives `expires_in` seconds
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> ApiResult<DateTime<Utc>> {
    if expires_in < 0 {
        return Err(ApiError::Auth(format!(
            "token response has a negative expires_in: {}",
            expires_in
        )));
    }
    chrono::Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            ApiError::Auth(format!(
                "token response has an out-of-range expires_in: {}",
                expires_in
            ))
        })
}

/// Provides valid bearer tokens for one Business Central connection
pub struct TokenProvider {
    config: ConnectionConfig,
    http_client: reqwest::Client,
    state: RwLock<TokenState>,
    metrics: MetricsCollector,
}

impl TokenProvider {
    pub fn new(config: ConnectionConfig) -> ApiResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("bc-odata/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_http_client(config, http_client))
    }

    /// Create a provider with custom HTTP client configuration
    pub fn with_http_client(config: ConnectionConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
            state: RwLock::new(TokenState::default()),
            metrics: MetricsCollector::new(),
        }
    }

    /// Counters shared with clients built on this provider
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Return a currently valid token, exchanging credentials if needed
    pub async fn get_token(&self) -> ApiResult<String> {
        {
            let state = self.state.read().await;
            if let Some(token) = state.usable_token(Utc::now()) {
                debug!("Using cached OAuth token");
                return Ok(token.to_string());
            }
        }

        info!("Fetching new OAuth token from {}", self.config.token_url);
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> ApiResult<String> {
        let mut state = self.state.write().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = state.usable_token(Utc::now()) {
            debug!("Token was refreshed by another task, using cached token");
            return Ok(token.to_string());
        }

        let response = self.fetch_token().await.inspect_err(|e| {
            error!("Failed to fetch OAuth token: {}", e);
        })?;

        let expires_at = expiry_after(Utc::now(), response.expires_in)?;
        if response.expires_in <= TOKEN_SAFETY_MARGIN_SECS {
            warn!(
                "Token lifetime of {}s is inside the {}s safety margin, it will not be reused",
                response.expires_in, TOKEN_SAFETY_MARGIN_SECS
            );
        }

        state.access_token = response.access_token;
        state.expires_at = Some(expires_at);

        info!(
            "Successfully obtained OAuth token (expires at {}, in {}s)",
            expires_at.to_rfc3339(),
            response.expires_in
        );
        Ok(state.access_token.clone())
    }

    /// Drop the cached token so the next `get_token` performs an exchange.
    ///
    /// Calling this with nothing cached is a no-op.
    pub async fn invalidate_token(&self) {
        let mut state = self.state.write().await;
        if !state.access_token.is_empty() || state.expires_at.is_some() {
            warn!("Invalidating cached OAuth token");
            *state = TokenState::default();
            self.metrics.record_token_invalidation();
        }
    }

    /// Replace the cached token, e.g. with one persisted by a previous run
    pub async fn seed_token(&self, access_token: impl Into<String>, expires_at: DateTime<Utc>) {
        let mut state = self.state.write().await;
        state.access_token = access_token.into();
        state.expires_at = Some(expires_at);
    }

    /// Whether a token is cached, regardless of its validity
    pub async fn has_cached_token(&self) -> bool {
        !self.state.read().await.access_token.is_empty()
    }

    pub async fn cached_expiry(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.expires_at
    }

    async fn fetch_token(&self) -> ApiResult<TokenResponse> {
        debug!(
            "Preparing OAuth token request (grant_type: {}, client_id: {}, scope: {})",
            self.config.grant_type, self.config.client_id, self.config.scope
        );

        let form = [
            ("grant_type", self.config.grant_type.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", self.config.scope.as_str()),
        ];
        let body = form
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        self.metrics.record_token_exchange();
        let response = self
            .http_client
            .post(&self.config.token_url)
            .header(CONTENT_TYPE, &self.config.content_type)
            .header(ACCEPT, headers::CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("failed to make token request: {}", e)))?;

        let status = response.status();
        debug!("Token request status: {}", status);

        if status != reqwest::StatusCode::OK {
            let detail = response.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!(
                "token request failed with status {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Auth(format!("failed to decode token response: {}", e)))?;

        if token.access_token.is_empty() {
            return Err(ApiError::Auth("token response has an empty access_token".to_string()));
        }

        Ok(token)
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("token_url", &self.config.token_url)
            .field("client_id", &self.config.client_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state_has_no_token() {
        let state = TokenState::default();
        assert!(state.usable_token(Utc::now()).is_none());
    }

    #[test]
    fn test_safety_margin() {
        let now = Utc::now();
        let mut state = TokenState {
            access_token: "abc".to_string(),
            expires_at: Some(now + chrono::Duration::minutes(10)),
        };
        assert_eq!(state.usable_token(now), Some("abc"));

        // Four minutes left is inside the five minute margin
        state.expires_at = Some(now + chrono::Duration::minutes(4));
        assert!(state.usable_token(now).is_none());
    }

    #[test]
    fn test_expiry_rejects_negative_and_huge_lifetimes() {
        let now = Utc::now();

        assert_eq!(expiry_after(now, 3600).unwrap(), now + chrono::Duration::hours(1));
        assert_eq!(expiry_after(now, 0).unwrap(), now);
        assert!(matches!(expiry_after(now, -1), Err(ApiError::Auth(_))));
        assert!(matches!(expiry_after(now, 10_000_000_000_000), Err(ApiError::Auth(_))));
        assert!(matches!(expiry_after(now, i64::MAX), Err(ApiError::Auth(_))));
    }

    #[test]
    fn test_token_response_json() {
        let json = r#"{"access_token":"tok","token_type":"Bearer","expires_in":3599,"scope":"s"}"#;
        let parsed: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.access_token, "tok");
        assert_eq!(parsed.expires_in, 3599);

        let as_string = r#"{"access_token":"tok","expires_in":"3600"}"#;
        let parsed: TokenResponse = serde_json::from_str(as_string).unwrap();
        assert_eq!(parsed.expires_in, 3600);
        assert_eq!(parsed.token_type, "");

        assert!(serde_json::from_str::<TokenResponse>(r#"{"token_type":"Bearer"}"#).is_err());
    }

    #[tokio::test]
    async fn test_invalidate_on_empty_state_is_noop() {
        let provider =
            TokenProvider::with_http_client(ConnectionConfig::default(), reqwest::Client::new());

        provider.invalidate_token().await;
        provider.invalidate_token().await;

        assert!(!provider.has_cached_token().await);
        assert!(provider.cached_expiry().await.is_none());
        assert_eq!(provider.metrics().snapshot().token_invalidations, 0);
    }

    #[tokio::test]
    async fn test_seeded_token_is_served_from_cache() {
        let provider =
            TokenProvider::with_http_client(ConnectionConfig::default(), reqwest::Client::new());
        provider.seed_token("cached", Utc::now() + chrono::Duration::hours(1)).await;

        assert_eq!(provider.get_token().await.unwrap(), "cached");
        assert_eq!(provider.metrics().snapshot().token_exchanges, 0);

        provider.invalidate_token().await;
        assert!(!provider.has_cached_token().await);
        assert_eq!(provider.metrics().snapshot().token_invalidations, 1);
    }
}

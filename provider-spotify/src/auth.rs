//! Access token management
//!
//! Spotify access tokens live for an hour. [`SpotifyAuth`] keeps the current
//! token in memory and mints a new one through the accounts service's
//! `refresh_token` grant when the cached token is about to expire, or when
//! the API rejected it with 401 and the caller invalidated it.
//!
//! A pre-issued access token with no refresh token is used as-is until it is
//! rejected; after that every call fails with `AuthenticationFailed`.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use core_runtime::config::SpotifyCredentials;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, SpotifyError};
use crate::types::TokenResponse;

/// Accounts service token endpoint
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Refresh this long before the reported expiry
const REFRESH_MARGIN_SECS: i64 = 60;

/// Credentials needed to mint access tokens.
#[derive(Clone)]
pub struct SpotifyAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub token_url: String,
}

impl SpotifyAuthConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: None,
            access_token: None,
            token_url: TOKEN_URL.to_string(),
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.client_secret);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl From<&SpotifyCredentials> for SpotifyAuthConfig {
    fn from(credentials: &SpotifyCredentials) -> Self {
        Self {
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            refresh_token: credentials.refresh_token.clone(),
            access_token: credentials.access_token.clone(),
            token_url: TOKEN_URL.to_string(),
        }
    }
}

impl fmt::Debug for SpotifyAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_url", &self.token_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    /// None for a pre-issued token of unknown lifetime
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(REFRESH_MARGIN_SECS) < expires_at,
            None => true,
        }
    }
}

#[derive(Debug)]
struct TokenState {
    cached: Option<CachedToken>,
    refresh_token: Option<String>,
}

/// Caches and refreshes Spotify access tokens.
///
/// The state mutex is held across a refresh so concurrent callers wait for a
/// single token request instead of racing.
pub struct SpotifyAuth {
    config: SpotifyAuthConfig,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    state: Mutex<TokenState>,
}

impl SpotifyAuth {
    pub fn new(config: SpotifyAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_clock(config, http_client, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SpotifyAuthConfig,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cached = config.access_token.clone().map(|access_token| CachedToken {
            access_token,
            expires_at: None,
        });
        let state = TokenState {
            cached,
            refresh_token: config.refresh_token.clone(),
        };

        Self {
            config,
            http_client,
            clock,
            state: Mutex::new(state),
        }
    }

    /// Whether a refresh token is available.
    pub async fn can_refresh(&self) -> bool {
        self.state.lock().await.refresh_token.is_some()
    }

    /// Returns a usable access token, refreshing first if needed.
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailed` when there is no token and no way to mint one,
    ///   or the accounts service rejects the refresh token
    /// - `BridgeError` on transport failure
    pub async fn access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if let Some(cached) = state.cached.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.access_token.clone());
            }
            debug!("Cached Spotify token expires soon, refreshing");
        }

        let refresh_token = state.refresh_token.clone().ok_or_else(|| {
            SpotifyError::AuthenticationFailed(
                "No valid access token and no refresh token configured".to_string(),
            )
        })?;

        let response = self.refresh(&refresh_token).await?;
        let token = response.access_token.clone();

        state.cached = Some(CachedToken {
            access_token: response.access_token,
            expires_at: Some(now + Duration::seconds(response.expires_in)),
        });
        if let Some(rotated) = response.refresh_token {
            debug!("Spotify rotated the refresh token");
            state.refresh_token = Some(rotated);
        }

        Ok(token)
    }

    /// Drop the cached token after the API rejected it.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if state.cached.take().is_some() {
            warn!("Spotify access token rejected; will refresh on next request");
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        debug!("Refreshing Spotify access token");

        let request = HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
            .header("Authorization", self.config.basic_auth_header())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]);

        let response = self.http_client.execute(request).await?;

        if response.is_success() {
            let token: TokenResponse = response
                .json()
                .map_err(|e| SpotifyError::ParseError(format!("token response: {}", e)))?;
            info!(expires_in = token.expires_in, "Spotify access token refreshed");
            return Ok(token);
        }

        let body = String::from_utf8_lossy(&response.body).to_string();
        warn!(status = response.status, "Spotify token refresh rejected");

        if response.is_client_error() {
            Err(SpotifyError::AuthenticationFailed(format!(
                "token refresh rejected (status {}): {}",
                response.status, body
            )))
        } else {
            Err(SpotifyError::ApiError {
                status_code: response.status,
                message: body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::http::HttpResponse;
    use bridge_traits::time::ManualClock;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn token_response(token: &str, expires_in: i64) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from(format!(
                r#"{{"access_token":"{}","token_type":"Bearer","expires_in":{}}}"#,
                token, expires_in
            )),
        }
    }

    fn config() -> SpotifyAuthConfig {
        SpotifyAuthConfig::new("client", "secret").with_refresh_token("refresh-1")
    }

    #[tokio::test]
    async fn test_refresh_request_shape() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            assert_eq!(req.url, TOKEN_URL);
            // base64("client:secret")
            assert_eq!(
                req.headers.get("Authorization").map(String::as_str),
                Some("Basic Y2xpZW50OnNlY3JldA==")
            );
            let body = req.body.clone().unwrap_or_default();
            assert_eq!(
                &body[..],
                b"grant_type=refresh_token&refresh_token=refresh-1"
            );
            Ok(token_response("access-1", 3600))
        });

        let auth = SpotifyAuth::new(config(), Arc::new(mock_http));
        assert_eq!(auth.access_token().await.unwrap(), "access-1");
    }

    #[tokio::test]
    async fn test_token_is_cached_until_expiry() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut mock_http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(token_response("access-1", 3600)));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(token_response("access-2", 3600)));

        let auth = SpotifyAuth::with_clock(config(), Arc::new(mock_http), clock.clone());

        assert_eq!(auth.access_token().await.unwrap(), "access-1");
        clock.advance(Duration::minutes(30));
        assert_eq!(auth.access_token().await.unwrap(), "access-1");

        // inside the refresh margin
        clock.advance(Duration::seconds(30 * 60 - 30));
        assert_eq!(auth.access_token().await.unwrap(), "access-2");
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(token_response("fresh", 3600)));

        let auth = SpotifyAuth::new(
            config().with_access_token("stale"),
            Arc::new(mock_http),
        );

        assert_eq!(auth.access_token().await.unwrap(), "stale");
        auth.invalidate().await;
        assert_eq!(auth.access_token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_static_token_without_refresh() {
        let mock_http = MockHttpClient::new();
        let auth = SpotifyAuth::new(
            SpotifyAuthConfig::new("client", "secret").with_access_token("only"),
            Arc::new(mock_http),
        );

        assert!(!auth.can_refresh().await);
        assert_eq!(auth.access_token().await.unwrap(), "only");

        auth.invalidate().await;
        let result = auth.access_token().await;
        assert!(matches!(result, Err(SpotifyError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_auth_failure() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 400,
                headers: HashMap::new(),
                body: Bytes::from_static(br#"{"error":"invalid_grant"}"#),
            })
        });

        let auth = SpotifyAuth::new(config(), Arc::new(mock_http));
        let result = auth.access_token().await;
        assert!(matches!(result, Err(SpotifyError::AuthenticationFailed(msg)) if msg.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_kept() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(HttpResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: Bytes::from_static(
                        br#"{"access_token":"a1","expires_in":3600,"refresh_token":"refresh-2"}"#,
                    ),
                })
            });
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                let body = req.body.clone().unwrap_or_default();
                assert!(String::from_utf8_lossy(&body).contains("refresh_token=refresh-2"));
                Ok(token_response("a2", 3600))
            });

        let auth = SpotifyAuth::new(config(), Arc::new(mock_http));
        assert_eq!(auth.access_token().await.unwrap(), "a1");
        auth.invalidate().await;
        assert_eq!(auth.access_token().await.unwrap(), "a2");
    }
}

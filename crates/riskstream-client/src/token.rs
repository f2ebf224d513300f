//! Token acquisition and expiry-aware renewal
//!
//! The vendor's OAuth endpoint exchanges the long-lived application key for
//! a short-lived bearer token via a client-credentials grant. The provider
//! caches the credential, refreshes it before the safety margin is crossed,
//! and coalesces concurrent renewals into a single in-flight request.

use crate::error::{ClientError, ClientResult};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use riskstream_core::config::AuthSettings;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A short-lived bearer credential.
///
/// Invalid after `expires_at`; callers obtain a fresh one through
/// [`TokenProvider::ensure_valid`] rather than holding on to this value.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from a token response issued at `issued_at`.
    pub fn issued(access_token: String, expires_in_secs: u64, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token,
            expires_at: issued_at + chrono::Duration::seconds(expires_in_secs as i64),
        }
    }

    /// Whether the credential is within `margin` of expiry.
    pub fn is_stale(&self, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::zero());
        Utc::now() >= self.expires_at - margin
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Obtains and renews the bearer credential for the vendor API
pub struct TokenProvider {
    http: Client,
    token_url: String,
    application_key: String,
    safety_margin: Duration,
    current: RwLock<Option<Credential>>,
    // Single-flight guard: renewal holds this across the HTTP round trip
    renewal: Mutex<()>,
}

impl TokenProvider {
    /// Create a new token provider
    pub fn new(auth: &AuthSettings, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(format!("riskstream/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            token_url: auth.token_url(),
            application_key: auth.application_key.clone(),
            safety_margin: auth.safety_margin(),
            current: RwLock::new(None),
            renewal: Mutex::new(()),
        }
    }

    /// Exchange the application key for a fresh access token.
    pub async fn acquire(&self) -> ClientResult<Credential> {
        debug!("Requesting access token");

        let response = self
            .http
            .post(&self.token_url)
            .header("Authorization", format!("Bearer {}", self.application_key))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let issued_at = Utc::now();
                let body = response.json::<TokenResponse>().await?;
                let access_token = body.access_token.ok_or_else(|| {
                    ClientError::MalformedTokenResponse("missing access_token".to_string())
                })?;
                let expires_in = body.expires_in.ok_or_else(|| {
                    ClientError::MalformedTokenResponse("missing expires_in".to_string())
                })?;

                info!("Obtained access token, expires in {}s", expires_in);
                Ok(Credential::issued(access_token, expires_in, issued_at))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let message = response.text().await.unwrap_or_default();
                warn!("Token request rejected ({}): {}", status, message);
                Err(ClientError::Auth(format!(
                    "token request rejected with {}",
                    status
                )))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                warn!("Token endpoint rate limited, retry after {}s", retry_after);
                Err(ClientError::RateLimited(retry_after))
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(ClientError::server(status.as_u16(), message))
            }
        }
    }

    /// Return the cached credential, re-acquiring when it is within the
    /// safety margin of expiry. Concurrent callers coalesce into one
    /// renewal request.
    pub async fn ensure_valid(&self) -> ClientResult<Credential> {
        {
            let guard = self.current.read().await;
            if let Some(credential) = guard.as_ref() {
                if !credential.is_stale(self.safety_margin) {
                    return Ok(credential.clone());
                }
            }
        }

        let _renewal = self.renewal.lock().await;

        // Another caller may have renewed while we waited on the lock
        {
            let guard = self.current.read().await;
            if let Some(credential) = guard.as_ref() {
                if !credential.is_stale(self.safety_margin) {
                    return Ok(credential.clone());
                }
            }
        }

        let fresh = self.acquire().await?;
        *self.current.write().await = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the cached credential so the next `ensure_valid` re-acquires.
    /// Used when the stream endpoint rejects the token mid-run.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth_settings(server: &MockServer) -> AuthSettings {
        AuthSettings {
            application_key: "app-key-1".to_string(),
            api_base: server.uri(),
            safety_margin_secs: 30,
        }
    }

    fn provider(server: &MockServer) -> TokenProvider {
        TokenProvider::new(&auth_settings(server), Duration::from_secs(5))
    }

    #[test]
    fn test_credential_expiry_from_issue_time() {
        let issued_at = Utc::now();
        let credential = Credential::issued("tok123".to_string(), 3600, issued_at);
        assert_eq!(
            credential.expires_at,
            issued_at + chrono::Duration::seconds(3600)
        );
    }

    #[test]
    fn test_credential_staleness() {
        let fresh = Credential::issued("t".to_string(), 3600, Utc::now());
        assert!(!fresh.is_stale(Duration::from_secs(30)));
        // Margin wider than the lifetime makes it immediately stale
        assert!(fresh.is_stale(Duration::from_secs(7200)));

        let expired = Credential::issued("t".to_string(), 0, Utc::now());
        assert!(expired.is_stale(Duration::from_secs(0)));
    }

    #[tokio::test]
    async fn test_acquire_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header("Authorization", "Bearer app-key-1"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok123",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        let before = Utc::now();
        let credential = provider(&server).acquire().await.unwrap();
        let after = Utc::now();

        assert_eq!(credential.access_token, "tok123");
        assert!(credential.expires_at >= before + chrono::Duration::seconds(3600));
        assert!(credential.expires_at <= after + chrono::Duration::seconds(3600));
    }

    #[tokio::test]
    async fn test_acquire_missing_field_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "expires_in": 3600 })),
            )
            .mount(&server)
            .await;

        let err = provider(&server).acquire().await.unwrap_err();
        assert!(err.is_auth());
        assert!(matches!(err, ClientError::MalformedTokenResponse(_)));
    }

    #[tokio::test]
    async fn test_acquire_rejected_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = provider(&server).acquire().await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));
    }

    #[tokio::test]
    async fn test_ensure_valid_reuses_fresh_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok123",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let first = provider.ensure_valid().await.unwrap();
        let second = provider.ensure_valid().await.unwrap();
        assert_eq!(first.access_token, second.access_token);
    }

    #[tokio::test]
    async fn test_ensure_valid_refreshes_stale_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok123",
                "expires_in": 10,
            })))
            .expect(2)
            .mount(&server)
            .await;

        // Safety margin wider than the token lifetime: every call re-acquires
        let mut settings = auth_settings(&server);
        settings.safety_margin_secs = 60;
        let provider = TokenProvider::new(&settings, Duration::from_secs(5));

        provider.ensure_valid().await.unwrap();
        provider.ensure_valid().await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_valid_never_returns_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok123",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        let credential = provider(&server).ensure_valid().await.unwrap();
        assert!(credential.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_renewal_is_single_flight() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "access_token": "tok123",
                        "expires_in": 3600,
                    }))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = Arc::new(provider(&server));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let provider = provider.clone();
            handles.push(tokio::spawn(async move {
                provider.ensure_valid().await.unwrap()
            }));
        }
        for handle in handles {
            let credential = handle.await.unwrap();
            assert_eq!(credential.access_token, "tok123");
        }
    }

    #[tokio::test]
    async fn test_invalidate_forces_reacquire() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok123",
                "expires_in": 3600,
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider = provider(&server);
        provider.ensure_valid().await.unwrap();
        provider.invalidate().await;
        provider.ensure_valid().await.unwrap();
    }
}

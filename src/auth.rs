use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::protocol::{
    DEFAULT_DEVICE_AUTHORIZE_URL, DEFAULT_TOKEN_URL, DEVICE_CODE_GRANT, OAUTH_CLIENT_ID,
    OAUTH_SCOPE,
};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
}

/// Produces fresh tokens for a [`Session`](crate::Session).
pub trait Authenticator: Send + Sync + 'static {
    /// Exchanges `refresh_token` for a new token, or starts an interactive
    /// login when there is none.
    fn authenticate(
        &self,
        refresh_token: Option<String>,
    ) -> impl Future<Output = Result<Token>> + Send;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_token(self) -> Token {
        Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expiry: Utc::now() + chrono::Duration::seconds(self.expires_in),
        }
    }
}

#[derive(Deserialize)]
struct DeviceAuthorization {
    device_code: String,
    verification_uri_complete: String,
    #[serde(default = "default_device_expiry")]
    expires_in: u64,
    #[serde(default = "default_device_interval")]
    interval: u64,
}

fn default_device_expiry() -> u64 {
    300
}

fn default_device_interval() -> u64 {
    5
}

#[derive(Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth2 against the tado° identity provider: refresh-token grant when a
/// token is known, device-code grant otherwise.
#[derive(Debug, Clone)]
pub struct OAuthAuthenticator {
    http: reqwest::Client,
    token_url: String,
    device_authorize_url: String,
    client_id: String,
}

impl Default for OAuthAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthAuthenticator {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            device_authorize_url: DEFAULT_DEVICE_AUTHORIZE_URL.to_string(),
            client_id: OAUTH_CLIENT_ID.to_string(),
        }
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn device_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.device_authorize_url = url.into();
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<Token> {
        debug!(url = %self.token_url, "refreshing access token");
        let resp = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("refresh grant rejected ({status}): {body}")));
        }
        let token: TokenResponse = resp.json().await?;
        Ok(token.into_token())
    }

    pub async fn device_login(&self) -> Result<Token> {
        let resp = self
            .http
            .post(&self.device_authorize_url)
            .header("Accept", "application/json")
            .form(&[("client_id", self.client_id.as_str()), ("scope", OAUTH_SCOPE)])
            .send()
            .await?
            .error_for_status()?;
        let device: DeviceAuthorization = resp.json().await?;

        info!(
            url = %device.verification_uri_complete,
            "device authentication required, open the URL to grant access"
        );

        let mut interval = Duration::from_secs(device.interval);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(device.expires_in);

        loop {
            tokio::time::sleep(interval).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Auth("device code expired before it was confirmed".into()));
            }

            let resp = self
                .http
                .post(&self.token_url)
                .header("Accept", "application/json")
                .form(&[
                    ("client_id", self.client_id.as_str()),
                    ("device_code", device.device_code.as_str()),
                    ("grant_type", DEVICE_CODE_GRANT),
                ])
                .send()
                .await?;

            if resp.status().is_success() {
                let token: TokenResponse = resp.json().await?;
                return Ok(token.into_token());
            }

            let err: OAuthError = resp.json().await?;
            match err.error.as_str() {
                "authorization_pending" => debug!("device authorization still pending"),
                "slow_down" => interval += Duration::from_secs(5),
                other => {
                    let detail = err.error_description.unwrap_or_default();
                    return Err(Error::Auth(format!("device grant failed: {other} {detail}")));
                }
            }
        }
    }
}

impl Authenticator for OAuthAuthenticator {
    async fn authenticate(&self, refresh_token: Option<String>) -> Result<Token> {
        match refresh_token {
            Some(token) if !token.trim().is_empty() => {
                info!("authenticating with existing refresh token");
                self.refresh(&token).await
            }
            _ => self.device_login().await,
        }
    }
}

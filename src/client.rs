use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::api::{TokenSource, ZoneApi};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    overlay_body, parse_rate_limit, presence_body, rooms_query, DEFAULT_BASE_URL, RATE_LIMIT_HEADER,
    RATE_LIMIT_POLICY_HEADER,
};
use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

struct StaticToken(String);

impl TokenSource for StaticToken {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

pub struct TadoClientBuilder {
    base_url: String,
    request_timeout: Duration,
    token_source: Option<Arc<dyn TokenSource>>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl Default for TadoClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TadoClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            token_source: None,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Upper bound for each request, including reading the body.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Where the bearer token comes from, usually a [`Session`](crate::Session).
    pub fn token_source(mut self, source: impl TokenSource) -> Self {
        self.token_source = Some(Arc::new(source));
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.token_source(StaticToken(token.into()))
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<TadoClient> {
        let http = reqwest::Client::builder().build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(MessageLogger::new(mode, &path)?)),
            _ => None,
        };

        Ok(TadoClient {
            http,
            base_url: self.base_url,
            request_timeout: self.request_timeout,
            token_source: self.token_source,
            logger,
            rate_limit: Mutex::new(None),
        })
    }
}

/// HTTP client for the tado° cloud API.
pub struct TadoClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    token_source: Option<Arc<dyn TokenSource>>,
    logger: Option<Mutex<MessageLogger>>,
    rate_limit: Mutex<Option<RateLimit>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() { Error::Timeout } else { Error::Http(e) }
}

impl TadoClient {
    pub fn builder() -> TadoClientBuilder {
        TadoClientBuilder::new()
    }

    pub async fn me(&self) -> Result<Me> {
        self.get_json("/me").await
    }

    pub async fn zones(&self, home: HomeId) -> Result<Vec<Zone>> {
        self.get_json(&format!("/homes/{home}/zones")).await
    }

    pub async fn zone_states(&self, home: HomeId) -> Result<ZoneStates> {
        self.get_json(&format!("/homes/{home}/zoneStates")).await
    }

    pub async fn zone_state(&self, home: HomeId, zone: ZoneId) -> Result<ZoneState> {
        self.get_json(&format!("/homes/{home}/zones/{zone}/state")).await
    }

    pub async fn home_state(&self, home: HomeId) -> Result<HomeState> {
        self.get_json(&format!("/homes/{home}/state")).await
    }

    pub async fn set_presence(&self, home: HomeId, presence: Presence) -> Result<()> {
        let body = presence_body(presence);
        self.send(Method::PUT, &format!("/homes/{home}/presenceLock"), Some(body))
            .await
            .map(drop)
    }

    /// Current overlay of a zone; `None` while it follows its schedule.
    pub async fn zone_overlay(&self, home: HomeId, zone: ZoneId) -> Result<Option<Overlay>> {
        match self.get_json(&format!("/homes/{home}/zones/{zone}/overlay")).await {
            Ok(overlay) => Ok(Some(overlay)),
            Err(Error::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn set_zone_overlays(
        &self,
        home: HomeId,
        overlays: &[OverlayRequest],
        termination: OverlayTermination,
    ) -> Result<()> {
        let body = overlay_body(overlays, termination);
        self.send(Method::POST, &format!("/homes/{home}/overlay"), Some(body))
            .await
            .map(drop)
    }

    pub async fn clear_zone_overlays(&self, home: HomeId, zones: &[ZoneId]) -> Result<()> {
        let path = format!("/homes/{home}/overlay?rooms={}", rooms_query(zones));
        self.send(Method::DELETE, &path, None).await.map(drop)
    }

    /// Budget reported by the most recent response.
    pub fn rate_limit(&self) -> Option<RateLimit> {
        *lock(&self.rate_limit)
    }

    // -- Helpers --

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.send(Method::GET, path, None).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<String> {
        let token = self
            .token_source
            .as_ref()
            .and_then(|s| s.access_token())
            .ok_or(Error::NotAuthenticated)?;

        if let Some(logger) = &self.logger {
            lock(logger).log_request(method.as_str(), path, body.as_ref());
        }

        let url = format!("{}{}", self.base_url, path);
        debug!(%method, url = %url, "tado request");

        let mut req = self
            .http
            .request(method, &url)
            .bearer_auth(token)
            .timeout(self.request_timeout);
        if let Some(body) = &body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(map_send_error)?;
        self.record_rate_limit(&resp);

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(map_send_error)?;
        trace!(status, len = text.len(), "tado response");

        if let Some(logger) = &self.logger {
            let json = serde_json::from_str(&text).unwrap_or(Value::Null);
            lock(logger).log_response(path, status, &json);
        }

        if !(200..300).contains(&status) {
            return Err(Error::Api { status, message: text });
        }
        Ok(text)
    }

    fn record_rate_limit(&self, resp: &Response) {
        let header = |name: &str| resp.headers().get(name).and_then(|v| v.to_str().ok());
        if let Some(rl) =
            parse_rate_limit(header(RATE_LIMIT_POLICY_HEADER), header(RATE_LIMIT_HEADER))
        {
            *lock(&self.rate_limit) = Some(rl);
        }
    }
}

impl ZoneApi for TadoClient {
    async fn zone_states(&self, home: HomeId) -> Result<ZoneStates> {
        TadoClient::zone_states(self, home).await
    }

    async fn zone_state(&self, home: HomeId, zone: ZoneId) -> Result<ZoneState> {
        TadoClient::zone_state(self, home, zone).await
    }

    async fn rate_limit(&self) -> Result<Option<RateLimit>> {
        Ok(TadoClient::rate_limit(self))
    }
}

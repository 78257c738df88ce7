use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{error, info, warn};

use crate::api::{AuthGate, TokenSource};
use crate::auth::{Authenticator, OAuthAuthenticator, Token};
use crate::config::GlobalSettings;
use crate::{Error, Result};

const REFRESH_TOKEN_WARN_DAYS: i64 = 25;

type TokenCallback = Box<dyn Fn(&Token) + Send + Sync>;
type Attempt = Shared<BoxFuture<'static, std::result::Result<(), String>>>;

struct SessionState {
    token: Option<Token>,
    refresh_token: Option<String>,
    refresh_token_set_at: Option<DateTime<Utc>>,
    in_flight: Option<(u64, Attempt)>,
}

struct SessionInner<A> {
    authenticator: A,
    ready: AtomicBool,
    attempts: AtomicU64,
    state: Mutex<SessionState>,
    token_callbacks: Vec<TokenCallback>,
}

impl<A: Authenticator> SessionInner<A> {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn authenticate_once(&self) -> std::result::Result<(), String> {
        let refresh_token = self.state().refresh_token.clone();
        info!("starting authentication");

        match self.authenticator.authenticate(refresh_token).await {
            Ok(token) => {
                let set_at = {
                    let mut state = self.state();
                    if let Some(new_refresh) = &token.refresh_token
                        && state.refresh_token.as_ref() != Some(new_refresh)
                    {
                        state.refresh_token = Some(new_refresh.clone());
                        state.refresh_token_set_at = Some(Utc::now());
                    }
                    state.token = Some(token.clone());
                    state.refresh_token_set_at
                };
                for cb in &self.token_callbacks {
                    cb(&token);
                }
                self.ready.store(true, Ordering::SeqCst);
                info!("authenticated successfully");
                if let Some(set_at) = set_at {
                    refresh_token_age_warning(set_at, Utc::now());
                }
                Ok(())
            }
            Err(e) => {
                self.ready.store(false, Ordering::SeqCst);
                error!(error = %e, "authentication failed");
                Err(match e {
                    Error::Auth(reason) => reason,
                    other => other.to_string(),
                })
            }
        }
    }
}

/// Single authenticated session shared by every consumer of the cloud API.
///
/// Cheap to clone; all clones share readiness, tokens and the in-flight
/// authentication attempt.
pub struct Session<A = OAuthAuthenticator> {
    inner: Arc<SessionInner<A>>,
}

impl<A> Clone for Session<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub struct SessionBuilder<A> {
    authenticator: A,
    refresh_token: Option<String>,
    refresh_token_set_at: Option<DateTime<Utc>>,
    token_callbacks: Vec<TokenCallback>,
}

impl<A: Authenticator> SessionBuilder<A> {
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator,
            refresh_token: None,
            refresh_token_set_at: None,
            token_callbacks: Vec::new(),
        }
    }

    pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn refresh_token_set_at(mut self, at: DateTime<Utc>) -> Self {
        self.refresh_token_set_at = Some(at);
        self
    }

    /// Seeds the refresh token and its age from persisted settings.
    pub fn settings(mut self, settings: &GlobalSettings) -> Self {
        if let Some(token) = settings.refresh_token.as_ref().filter(|t| !t.trim().is_empty()) {
            self.refresh_token = Some(token.clone());
        }
        self.refresh_token_set_at = settings.refresh_token_set_at.or(self.refresh_token_set_at);
        self
    }

    /// Called with every token obtained; the place to persist it.
    pub fn on_token(mut self, f: impl Fn(&Token) + Send + Sync + 'static) -> Self {
        self.token_callbacks.push(Box::new(f));
        self
    }

    pub fn build(self) -> Session<A> {
        Session {
            inner: Arc::new(SessionInner {
                authenticator: self.authenticator,
                ready: AtomicBool::new(false),
                attempts: AtomicU64::new(0),
                state: Mutex::new(SessionState {
                    token: None,
                    refresh_token: self.refresh_token,
                    refresh_token_set_at: self.refresh_token_set_at,
                    in_flight: None,
                }),
                token_callbacks: self.token_callbacks,
            }),
        }
    }
}

impl<A: Authenticator> Session<A> {
    pub fn builder(authenticator: A) -> SessionBuilder<A> {
        SessionBuilder::new(authenticator)
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.state().token.as_ref().map(|t| t.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.state().refresh_token.clone()
    }

    /// Number of authentication attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Authenticates unless already ready. Concurrent callers share one
    /// attempt and all see its outcome.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let (id, attempt) = {
            let mut state = self.inner.state();
            if let Some(shared) = state.in_flight.clone() {
                shared
            } else {
                let id = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let inner = Arc::clone(&self.inner);
                let attempt = async move { inner.authenticate_once().await }.boxed().shared();
                state.in_flight = Some((id, attempt.clone()));
                (id, attempt)
            }
        };

        let outcome = attempt.await;

        {
            let mut state = self.inner.state();
            if state.in_flight.as_ref().is_some_and(|(current, _)| *current == id) {
                state.in_flight = None;
            }
        }

        outcome.map_err(Error::Auth)
    }

    /// Drops readiness so the next [`ensure_authenticated`](Self::ensure_authenticated)
    /// starts over.
    pub fn reset(&self) {
        self.inner.ready.store(false, Ordering::SeqCst);
        self.inner.state().in_flight = None;
    }

    /// Re-authenticates after a 401. Any other error is left alone.
    pub async fn handle_api_error(&self, err: &Error) -> bool {
        if !err.is_unauthorized() {
            return false;
        }
        warn!("401 received, re-authenticating");
        self.reset();
        self.ensure_authenticated().await.is_ok()
    }
}

impl<A: Authenticator> AuthGate for Session<A> {
    fn is_ready(&self) -> bool {
        Session::is_ready(self)
    }

    async fn handle_api_error(&self, err: &Error) -> bool {
        Session::handle_api_error(self, err).await
    }
}

impl<A: Authenticator> TokenSource for Session<A> {
    fn access_token(&self) -> Option<String> {
        Session::access_token(self)
    }
}

/// Logs a warning once a refresh token gets close to its 30-day lifetime.
/// Returns the age in days when it does.
pub fn refresh_token_age_warning(set_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<i64> {
    let days = (now - set_at).num_days();
    if days > REFRESH_TOKEN_WARN_DAYS {
        warn!(
            days,
            "refresh token is {days} days old (30-day limit), re-authentication may be needed soon"
        );
        Some(days)
    } else {
        None
    }
}

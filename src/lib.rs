mod api;
mod auth;
mod client;
mod config;
mod diff;
mod error;
mod logger;
mod polling;
mod protocol;
mod session;
pub mod temperature;
mod types;

pub use api::{AuthGate, TokenSource, ZoneApi};
pub use auth::{Authenticator, OAuthAuthenticator, Token};
pub use client::{DEFAULT_REQUEST_TIMEOUT, TadoClient, TadoClientBuilder};
pub use config::{
    DEFAULT_POLL_INTERVAL, GlobalSettings, MIN_POLL_INTERVAL, PollConfig, RATE_LIMIT_LOW_WATER,
    THROTTLED_POLL_INTERVAL,
};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use polling::{CachedZoneState, PollingService, PollingServiceBuilder, Subscription};
pub use protocol::{parse_rate_limit, DEFAULT_BASE_URL, DEFAULT_TOKEN_URL};
pub use session::{Session, SessionBuilder, refresh_token_age_warning};
pub use temperature::TemperatureUnit;
pub use types::*;

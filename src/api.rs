//! Outbound boundary of the polling service.
//!
//! [`ZoneApi`] is the cloud-facing side (implemented by
//! [`TadoClient`](crate::TadoClient)), [`AuthGate`] the session side
//! (implemented by [`Session`](crate::Session)). Both are plain traits so the
//! service can be driven by in-memory fakes.

use std::future::Future;
use std::sync::Arc;

use crate::types::{HomeId, RateLimit, ZoneId, ZoneState, ZoneStates};
use crate::{Error, Result};

pub trait ZoneApi: Send + Sync + 'static {
    /// All zone states of one home in a single call.
    fn zone_states(&self, home: HomeId) -> impl Future<Output = Result<ZoneStates>> + Send;

    fn zone_state(
        &self,
        home: HomeId,
        zone: ZoneId,
    ) -> impl Future<Output = Result<ZoneState>> + Send;

    /// Remaining request budget, if the API has reported one.
    fn rate_limit(&self) -> impl Future<Output = Result<Option<RateLimit>>> + Send;
}

pub trait AuthGate: Send + Sync + 'static {
    fn is_ready(&self) -> bool;

    /// Gives the session a chance to recover from `err`. Returns `true` when
    /// it re-authenticated.
    fn handle_api_error(&self, err: &Error) -> impl Future<Output = bool> + Send;
}

/// Supplies the bearer token for outgoing requests.
pub trait TokenSource: Send + Sync + 'static {
    fn access_token(&self) -> Option<String>;
}

impl<T: ZoneApi> ZoneApi for Arc<T> {
    fn zone_states(&self, home: HomeId) -> impl Future<Output = Result<ZoneStates>> + Send {
        (**self).zone_states(home)
    }

    fn zone_state(
        &self,
        home: HomeId,
        zone: ZoneId,
    ) -> impl Future<Output = Result<ZoneState>> + Send {
        (**self).zone_state(home, zone)
    }

    fn rate_limit(&self) -> impl Future<Output = Result<Option<RateLimit>>> + Send {
        (**self).rate_limit()
    }
}

impl<T: AuthGate> AuthGate for Arc<T> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn handle_api_error(&self, err: &Error) -> impl Future<Output = bool> + Send {
        (**self).handle_api_error(err)
    }
}

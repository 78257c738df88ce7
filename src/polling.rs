//! Zone polling and caching.
//!
//! UI actions register the zones they show and subscribe to updates. The
//! [`PollingService`] keeps one background sweep alive while any zone is
//! registered, fetches each home's zones with a single batch call, caches the
//! result and fans it out to every subscriber.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{AuthGate, ZoneApi};
use crate::config::PollConfig;
use crate::types::{HomeId, ZoneId, ZoneKey, ZoneState};

type Listener = Arc<dyn Fn(HomeId, ZoneId, &ZoneState) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedZoneState {
    pub state: ZoneState,
    pub last_updated: DateTime<Utc>,
}

/// Zones wanted per home, with the number of watchers of each zone. Both
/// levels keep insertion order, which is the order homes are swept in.
#[derive(Debug, Default)]
struct Registry {
    homes: IndexMap<HomeId, IndexMap<ZoneId, usize>>,
}

impl Registry {
    fn is_empty(&self) -> bool {
        self.homes.is_empty()
    }

    fn insert(&mut self, home: HomeId, zone: ZoneId) {
        *self.homes.entry(home).or_default().entry(zone).or_insert(0) += 1;
    }

    fn remove(&mut self, home: HomeId, zone: ZoneId) {
        let Some(zones) = self.homes.get_mut(&home) else {
            return;
        };
        if let Some(count) = zones.get_mut(&zone) {
            *count -= 1;
            if *count == 0 {
                zones.shift_remove(&zone);
            }
        }
        if zones.is_empty() {
            self.homes.shift_remove(&home);
        }
    }

    fn watchers(&self, home: HomeId, zone: ZoneId) -> usize {
        self.homes
            .get(&home)
            .and_then(|zones| zones.get(&zone))
            .copied()
            .unwrap_or(0)
    }

    fn zones(&self, home: HomeId) -> Vec<ZoneId> {
        self.homes
            .get(&home)
            .map(|zones| zones.keys().copied().collect())
            .unwrap_or_default()
    }

    fn homes(&self) -> Vec<HomeId> {
        self.homes.keys().copied().collect()
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

impl Listeners {
    fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|(i, _)| *i == id)
    }
}

struct State {
    registry: Registry,
    cache: HashMap<ZoneKey, CachedZoneState>,
    interval: Duration,
    task: Option<CancellationToken>,
}

struct Inner<A, G> {
    api: A,
    gate: G,
    config: PollConfig,
    runtime: Option<Handle>,
    state: Mutex<State>,
    listeners: Arc<Mutex<Listeners>>,
    /// Held for the whole sweep; a restarted task waits here for the
    /// previous task's sweep to finish.
    sweep_lock: tokio::sync::Mutex<()>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl<A: ZoneApi, G: AuthGate> Inner<A, G> {
    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn interested_zones(&self, home: HomeId) -> Vec<ZoneId> {
        self.state().registry.zones(home)
    }

    fn start(self: &Arc<Self>, state: &mut State) {
        if state.task.is_some() {
            return;
        }
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            error!("no tokio runtime available, polling not started");
            return;
        };

        info!(interval_secs = state.interval.as_secs(), "starting polling");
        let token = CancellationToken::new();
        state.task = Some(token.clone());

        let inner = Arc::clone(self);
        runtime.spawn(async move {
            loop {
                inner.sweep().await;
                let interval = inner.state().interval;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
    }

    fn stop(state: &mut State) {
        if let Some(token) = state.task.take() {
            token.cancel();
            info!("stopped polling, no zones registered");
        }
    }

    async fn sweep(&self) {
        let _running = self.sweep_lock.lock().await;

        if !self.gate.is_ready() {
            debug!("session not ready, skipping sweep");
            return;
        }

        let homes = self.state().registry.homes();
        for home in homes {
            self.sweep_home(home).await;
        }

        self.adapt_to_rate_limit().await;
    }

    async fn sweep_home(&self, home: HomeId) {
        if self.interested_zones(home).is_empty() {
            return;
        }

        let err = match self.api.zone_states(home).await {
            Ok(batch) => {
                for zone in self.interested_zones(home) {
                    if let Some(state) = batch.get(zone) {
                        self.store(home, zone, state.clone());
                    }
                }
                return;
            }
            Err(err) => err,
        };

        if self.gate.handle_api_error(&err).await {
            debug!(home = %home, "session recovered, retrying on next tick");
            return;
        }

        error!(home = %home, error = %err, "poll failed, falling back to per-zone fetch");
        for zone in self.interested_zones(home) {
            match self.api.zone_state(home, zone).await {
                Ok(state) => self.store(home, zone, state),
                Err(e) => error!(home = %home, zone = %zone, error = %e, "fallback fetch failed"),
            }
        }
    }

    async fn adapt_to_rate_limit(&self) {
        let rate_limit = match self.api.rate_limit().await {
            Ok(Some(rl)) => rl,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "rate limit unavailable");
                return;
            }
        };

        if rate_limit.remaining < self.config.low_water_mark {
            let mut state = self.state();
            let widened = state.interval.max(self.config.throttled_interval);
            warn!(
                remaining = rate_limit.remaining,
                limit = rate_limit.limit,
                interval_secs = widened.as_secs(),
                "rate limit low, slowing down polling"
            );
            state.interval = widened;
        }
    }

    fn store(&self, home: HomeId, zone: ZoneId, state: ZoneState) {
        let entry = CachedZoneState {
            state,
            last_updated: Utc::now(),
        };
        self.state().cache.insert(ZoneKey::new(home, zone), entry.clone());
        self.broadcast(home, zone, &entry.state);
    }

    fn broadcast(&self, home: HomeId, zone: ZoneId, state: &ZoneState) {
        let snapshot: Vec<(u64, Listener)> = lock(&self.listeners)
            .entries
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        for (id, listener) in snapshot {
            if !lock(&self.listeners).contains(id) {
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(home, zone, state)));
            if let Err(payload) = outcome {
                error!(
                    home = %home,
                    zone = %zone,
                    error = panic_message(payload.as_ref()),
                    "zone update listener failed"
                );
            }
        }
    }
}

/// Handle returned by [`PollingService::on_update`]. The listener stays
/// registered until this is dropped or [`unsubscribe`](Self::unsubscribe)d.
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

pub struct PollingServiceBuilder<A, G> {
    api: A,
    gate: G,
    config: PollConfig,
    runtime: Option<Handle>,
}

impl<A: ZoneApi, G: AuthGate> PollingServiceBuilder<A, G> {
    pub fn new(api: A, gate: G) -> Self {
        Self {
            api,
            gate,
            config: PollConfig::default(),
            runtime: None,
        }
    }

    pub fn config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn low_water_mark(mut self, remaining: u64) -> Self {
        self.config.low_water_mark = remaining;
        self
    }

    pub fn throttled_interval(mut self, interval: Duration) -> Self {
        self.config.throttled_interval = interval;
        self
    }

    /// Runtime the sweep task is spawned on. Defaults to the runtime that
    /// is current when polling starts.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> PollingService<A, G> {
        let interval = self.config.clamp(self.config.interval);
        PollingService {
            inner: Arc::new(Inner {
                api: self.api,
                gate: self.gate,
                config: self.config,
                runtime: self.runtime.or_else(|| Handle::try_current().ok()),
                state: Mutex::new(State {
                    registry: Registry::default(),
                    cache: HashMap::new(),
                    interval,
                    task: None,
                }),
                listeners: Arc::new(Mutex::new(Listeners::default())),
                sweep_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }
}

/// Shared zone cache with a background sweep driven by registered interest.
pub struct PollingService<A, G> {
    inner: Arc<Inner<A, G>>,
}

impl<A, G> Clone for PollingService<A, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: ZoneApi, G: AuthGate> PollingService<A, G> {
    pub fn builder(api: A, gate: G) -> PollingServiceBuilder<A, G> {
        PollingServiceBuilder::new(api, gate)
    }

    pub fn new(api: A, gate: G) -> Self {
        Self::builder(api, gate).build()
    }

    /// Adds one watcher of `zone`. The first registration overall starts
    /// polling with an immediate sweep.
    pub fn register_zone(&self, home: HomeId, zone: ZoneId) {
        let mut state = self.inner.state();
        let was_empty = state.registry.is_empty();
        state.registry.insert(home, zone);
        debug!(home = %home, zone = %zone, "zone registered");
        if was_empty {
            self.inner.start(&mut state);
        }
    }

    /// Drops one watcher of `zone`; the zone stays registered while others
    /// remain. Polling stops once nothing is registered.
    pub fn unregister_zone(&self, home: HomeId, zone: ZoneId) {
        let mut state = self.inner.state();
        state.registry.remove(home, zone);
        debug!(home = %home, zone = %zone, "zone unregistered");
        if state.registry.is_empty() {
            Inner::<A, G>::stop(&mut state);
        }
    }

    pub fn is_registered(&self, home: HomeId, zone: ZoneId) -> bool {
        self.watchers(home, zone) > 0
    }

    pub fn watchers(&self, home: HomeId, zone: ZoneId) -> usize {
        self.inner.state().registry.watchers(home, zone)
    }

    pub fn registered_zones(&self, home: HomeId) -> Vec<ZoneId> {
        self.inner.interested_zones(home)
    }

    pub fn is_polling(&self) -> bool {
        self.inner.state().task.is_some()
    }

    pub fn on_update(
        &self,
        f: impl Fn(HomeId, ZoneId, &ZoneState) + Send + Sync + 'static,
    ) -> Subscription {
        let mut listeners = lock(&self.inner.listeners);
        listeners.next_id += 1;
        let id = listeners.next_id;
        let listener: Listener = Arc::new(f);
        listeners.entries.push((id, listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.inner.listeners),
        }
    }

    pub fn cached(&self, home: HomeId, zone: ZoneId) -> Option<ZoneState> {
        self.cached_entry(home, zone).map(|entry| entry.state)
    }

    pub fn cached_entry(&self, home: HomeId, zone: ZoneId) -> Option<CachedZoneState> {
        self.inner.state().cache.get(&ZoneKey::new(home, zone)).cloned()
    }

    /// Fetches one zone right away, outside the regular cadence.
    pub async fn refresh_zone(&self, home: HomeId, zone: ZoneId) -> Option<ZoneState> {
        match self.inner.api.zone_state(home, zone).await {
            Ok(state) => {
                self.inner.store(home, zone, state.clone());
                Some(state)
            }
            Err(e) => {
                error!(home = %home, zone = %zone, error = %e, "refresh failed");
                None
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.state().interval
    }

    /// Changes the cadence (never below the configured floor). A running
    /// sweep task is restarted, which sweeps immediately.
    pub fn set_poll_interval(&self, interval: Duration) {
        let interval = self.inner.config.clamp(interval);
        let mut state = self.inner.state();
        if state.interval == interval {
            return;
        }
        debug!(interval_secs = interval.as_secs(), "poll interval changed");
        state.interval = interval;
        if state.task.is_some() {
            Inner::<A, G>::stop(&mut state);
            self.inner.start(&mut state);
        }
    }

    /// Stops the sweep task while keeping registrations and the cache.
    pub fn shutdown(&self) {
        Inner::<A, G>::stop(&mut self.inner.state());
    }
}

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::models::Location;

use super::LocationChain;

/// Polling period when none is configured.
pub const DEFAULT_TRACKING_INTERVAL_SECS: u64 = 30;

/// Shortest polling period; shorter requests are raised to it.
pub const MIN_TRACKING_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SessionKey {
    Bus(String),
    /// The single `track_all` session.
    Fleet,
}

/// Periodic location polling.
///
/// Holds at most one session per bus id plus one fleet session. Starting a
/// session aborts the one it replaces. Dropping the tracker aborts all of
/// them. Sessions are tokio tasks, so starting one needs a running runtime.
pub struct LocationTracker {
    chain: Arc<LocationChain>,
    interval: Duration,
    sessions: DashMap<SessionKey, JoinHandle<()>>,
}

impl LocationTracker {
    pub fn new(chain: LocationChain, interval: Duration) -> Self {
        Self {
            chain: Arc::new(chain),
            interval: interval.max(MIN_TRACKING_INTERVAL),
            sessions: DashMap::new(),
        }
    }

    pub fn chain(&self) -> &LocationChain {
        &self.chain
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Where the bus is now. Never fails.
    pub async fn resolve_location(&self, bus_id: &str) -> Location {
        self.chain.resolve(bus_id).await
    }

    /// Poll one bus, calling `on_update` on every tick.
    ///
    /// The first tick fires immediately. A running session for the same bus
    /// is cancelled first.
    pub fn start_tracking<F>(&self, bus_id: &str, on_update: F)
    where
        F: Fn(Location) + Send + Sync + 'static,
    {
        let chain = self.chain.clone();
        let period = self.interval;
        let id = bus_id.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                on_update(chain.resolve(&id).await);
            }
        });
        self.replace(SessionKey::Bus(bus_id.to_string()), handle);
        info!(bus_id = %bus_id, interval_secs = period.as_secs(), "Tracking started");
    }

    /// Cancel the session for a bus. Returns whether one was running.
    pub fn stop_tracking(&self, bus_id: &str) -> bool {
        let stopped = self.stop(&SessionKey::Bus(bus_id.to_string()));
        if stopped {
            info!(bus_id = %bus_id, "Tracking stopped");
        }
        stopped
    }

    /// Poll every bus on each tick, concurrently, delivering one batch.
    ///
    /// Replaces any previous fleet session. Batch order follows `bus_ids`.
    pub fn track_all<F>(&self, bus_ids: Vec<String>, on_update: F)
    where
        F: Fn(Vec<Location>) + Send + Sync + 'static,
    {
        let chain = self.chain.clone();
        let period = self.interval;
        let count = bus_ids.len();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let batch = join_all(bus_ids.iter().map(|id| chain.resolve(id))).await;
                on_update(batch);
            }
        });
        self.replace(SessionKey::Fleet, handle);
        info!(buses = count, interval_secs = period.as_secs(), "Fleet tracking started");
    }

    pub fn stop_fleet(&self) -> bool {
        self.stop(&SessionKey::Fleet)
    }

    pub fn is_tracking(&self, bus_id: &str) -> bool {
        self.sessions
            .get(&SessionKey::Bus(bus_id.to_string()))
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Running sessions, the fleet session included.
    pub fn active_sessions(&self) -> usize {
        self.sessions.iter().filter(|entry| !entry.value().is_finished()).count()
    }

    pub fn stop_all(&self) {
        let count = self.sessions.len();
        self.sessions.retain(|_, handle| {
            handle.abort();
            false
        });
        if count > 0 {
            info!(sessions = count, "All tracking stopped");
        }
    }

    fn replace(&self, key: SessionKey, handle: JoinHandle<()>) {
        if let Some(previous) = self.sessions.insert(key.clone(), handle) {
            previous.abort();
            debug!(session = ?key, "Replaced running session");
        }
    }

    fn stop(&self, key: &SessionKey) -> bool {
        match self.sessions.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for LocationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationTracker")
            .field("chain", &self.chain)
            .field("interval", &self.interval)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

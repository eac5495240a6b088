//! The console session object.
//!
//! `Console` owns the remote store handle, the entity cache and the
//! location tracker for one admin session. It has an explicit lifecycle:
//! build it with [`Console::connect`] or [`Console::new`], call
//! [`Console::init`], then [`Console::reload`] whenever fresher data is
//! wanted. The mutating entry points live in the `sync` module.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::api::{ApiError, HttpGateway, RemoteStore};
use crate::cache::EntityCache;
use crate::config::Config;
use crate::error::Result;
use crate::location::{
    GpsProvider, LocationChain, LocationTracker, PrimaryServiceProvider, StoreDocumentProvider,
    DEFAULT_TRACKING_INTERVAL_SECS,
};
use crate::models::{Bus, Collection, Location, Statistics};

// ============================================================================
// Constants
// ============================================================================

/// Page-level bulk load timeout in seconds.
pub const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleSettings {
    pub load_timeout: Duration,
    pub tracking_interval: Duration,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(DEFAULT_LOAD_TIMEOUT_SECS),
            tracking_interval: Duration::from_secs(DEFAULT_TRACKING_INTERVAL_SECS),
        }
    }
}

pub struct Console {
    pub(crate) remote: RemoteStore,
    pub(crate) cache: EntityCache,
    tracker: LocationTracker,
    settings: ConsoleSettings,
}

impl Console {
    pub fn new(remote: RemoteStore, settings: ConsoleSettings, chain: LocationChain) -> Self {
        Self {
            remote,
            cache: EntityCache::new(),
            tracker: LocationTracker::new(chain, settings.tracking_interval),
            settings,
        }
    }

    /// Build a console over the HTTP store described by `config`.
    ///
    /// The location chain is primary service, store document, GPS, with the
    /// unconfigured services left out.
    pub fn connect(config: &Config) -> anyhow::Result<Self> {
        let store_url = config
            .store_url
            .as_deref()
            .context("No store URL configured (set KIDSBUS_STORE_URL)")?;
        let mut gateway =
            HttpGateway::new(store_url, config.request_timeout()).context("Failed to build HTTP client")?;
        if let Some(ref token) = config.store_token {
            gateway = gateway.with_token(Arc::new(token.clone()));
        }
        let client = gateway.client().clone();
        let remote = RemoteStore::new(Arc::new(gateway));

        let mut chain = LocationChain::new();
        if let Some(ref url) = config.primary_location_url {
            chain = chain.with(PrimaryServiceProvider::new(client.clone(), url.as_str()));
        }
        chain = chain.with(StoreDocumentProvider::new(remote.clone()));
        if let Some(ref url) = config.gps_url {
            chain = chain.with(GpsProvider::new(client, url.as_str()));
        }
        info!(store = %store_url, providers = ?chain.names(), "Console configured");

        Ok(Self::new(remote, config.settings(), chain))
    }

    pub fn remote(&self) -> &RemoteStore {
        &self.remote
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub fn settings(&self) -> ConsoleSettings {
        self.settings
    }

    pub fn tracker(&self) -> &LocationTracker {
        &self.tracker
    }

    // ===== Lifecycle =====

    /// Load every collection. On failure the previous contents stay.
    pub async fn init(&mut self) -> Result<()> {
        self.cache.init(&self.remote, self.settings.load_timeout).await
    }

    pub async fn reload(&mut self, collection: Collection) -> Result<usize> {
        self.cache
            .reload(collection, &self.remote, self.settings.load_timeout)
            .await
    }

    /// Dashboard counts from the cache.
    pub fn statistics(&self) -> Statistics {
        self.cache.statistics()
    }

    /// Dashboard counts as the store computes them.
    pub async fn remote_statistics(&self) -> std::result::Result<Statistics, ApiError> {
        self.remote.statistics().await
    }

    // ===== Location =====

    pub async fn resolve_location(&self, bus_id: &str) -> Result<Location> {
        self.cache.require::<Bus>(bus_id)?;
        Ok(self.tracker.resolve_location(bus_id).await)
    }

    pub fn start_tracking<F>(&self, bus_id: &str, on_update: F) -> Result<()>
    where
        F: Fn(Location) + Send + Sync + 'static,
    {
        self.cache.require::<Bus>(bus_id)?;
        self.tracker.start_tracking(bus_id, on_update);
        Ok(())
    }

    pub fn stop_tracking(&self, bus_id: &str) -> bool {
        self.tracker.stop_tracking(bus_id)
    }

    /// Track the given buses as one fleet. Every id must be cached.
    pub fn track_all<F>(&self, bus_ids: Vec<String>, on_update: F) -> Result<()>
    where
        F: Fn(Vec<Location>) + Send + Sync + 'static,
    {
        for bus_id in &bus_ids {
            self.cache.require::<Bus>(bus_id)?;
        }
        self.tracker.track_all(bus_ids, on_update);
        Ok(())
    }

    /// Track every active cached bus. Returns how many are tracked.
    pub fn track_fleet<F>(&self, on_update: F) -> usize
    where
        F: Fn(Vec<Location>) + Send + Sync + 'static,
    {
        let bus_ids: Vec<String> = self
            .cache
            .all::<Bus>()
            .iter()
            .filter(|b| b.is_active)
            .map(|b| b.id.clone())
            .collect();
        let count = bus_ids.len();
        self.tracker.track_all(bus_ids, on_update);
        count
    }

    /// Cancel the `track_all`/`track_fleet` session. Per-bus sessions keep running.
    pub fn stop_fleet_tracking(&self) -> bool {
        self.tracker.stop_fleet()
    }

    pub fn stop_all_tracking(&self) {
        self.tracker.stop_all();
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("cache", &self.cache)
            .field("tracker", &self.tracker)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

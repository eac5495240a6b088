use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::api::ApiError;
use crate::models::Location;

/// A source able to answer "where is this bus right now".
///
/// `Ok(None)` means the provider has nothing for the bus; the chain moves
/// on exactly as it does for an error.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn locate(&self, bus_id: &str) -> Result<Option<Location>, ApiError>;
}

/// Providers in priority order. The first `Some` wins.
#[derive(Clone, Default)]
pub struct LocationChain {
    providers: Vec<Arc<dyn LocationProvider>>,
}

impl LocationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider at the lowest priority so far.
    pub fn with(mut self, provider: impl LocationProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn resolve(&self, bus_id: &str) -> Location {
        for provider in &self.providers {
            match provider.locate(bus_id).await {
                Ok(Some(location)) => {
                    debug!(bus_id = %bus_id, provider = provider.name(), "Location resolved");
                    return location;
                }
                Ok(None) => debug!(bus_id = %bus_id, provider = provider.name(), "No location from provider"),
                Err(e) => debug!(bus_id = %bus_id, provider = provider.name(), error = %e, "Location provider failed"),
            }
        }
        debug!(bus_id = %bus_id, "All location providers exhausted");
        Location::unavailable(bus_id)
    }
}

impl std::fmt::Debug for LocationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationChain").field("providers", &self.names()).finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::models::{Coordinates, LocationSource};

    #[derive(Debug, Clone, Copy)]
    pub(crate) enum Answer {
        Fail,
        Empty,
        At(f64, f64),
    }

    /// Provider with a canned answer and a call counter.
    pub(crate) struct StubProvider {
        pub name: &'static str,
        pub answer: Answer,
        pub delay: Duration,
        pub calls: Arc<AtomicUsize>,
    }

    impl StubProvider {
        pub(crate) fn new(name: &'static str, answer: Answer) -> Self {
            Self {
                name,
                answer,
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl LocationProvider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn locate(&self, bus_id: &str) -> Result<Option<Location>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.answer {
                Answer::Fail => Err(ApiError::ServerError("provider down".to_string())),
                Answer::Empty => Ok(None),
                Answer::At(lat, lng) => Ok(Some(Location::at(
                    bus_id,
                    Coordinates::new(lat, lng),
                    LocationSource::StoreDocument,
                ))),
            }
        }
    }
}

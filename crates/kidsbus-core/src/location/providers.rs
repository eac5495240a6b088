//! The concrete location providers, in chain order.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::api::{ApiError, RemoteStore};
use crate::models::{GpsFix, Location, LocationSource, RawLocationFields};

use super::LocationProvider;

/// The dedicated location service: `GET {base}/buses/{id}/location`.
#[derive(Clone)]
pub struct PrimaryServiceProvider {
    client: Client,
    base_url: String,
}

impl PrimaryServiceProvider {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, bus_id: &str) -> String {
        format!("{}/buses/{}/location", self.base_url, bus_id)
    }
}

#[async_trait]
impl LocationProvider for PrimaryServiceProvider {
    fn name(&self) -> &str {
        "primary"
    }

    async fn locate(&self, bus_id: &str) -> Result<Option<Location>, ApiError> {
        let fields: Option<RawLocationFields> = get_optional(&self.client, &self.url(bus_id)).await?;
        Ok(fields.and_then(|f| f.into_location(bus_id)).map(|mut location| {
            location.source = LocationSource::Primary;
            location
        }))
    }
}

/// Location fields read straight off the bus document in the store.
#[derive(Clone)]
pub struct StoreDocumentProvider {
    remote: RemoteStore,
}

impl StoreDocumentProvider {
    pub fn new(remote: RemoteStore) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl LocationProvider for StoreDocumentProvider {
    fn name(&self) -> &str {
        "store"
    }

    async fn locate(&self, bus_id: &str) -> Result<Option<Location>, ApiError> {
        let fields = self.remote.read_bus_document(bus_id).await?;
        Ok(fields.and_then(|f| f.into_location(bus_id)))
    }
}

/// The vehicle GPS provider: `GET {base}/vehicles/{id}/location`.
#[derive(Clone)]
pub struct GpsProvider {
    client: Client,
    base_url: String,
}

impl GpsProvider {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, bus_id: &str) -> String {
        format!("{}/vehicles/{}/location", self.base_url, bus_id)
    }
}

#[async_trait]
impl LocationProvider for GpsProvider {
    fn name(&self) -> &str {
        "gps"
    }

    async fn locate(&self, bus_id: &str) -> Result<Option<Location>, ApiError> {
        let fix: Option<GpsFix> = get_optional(&self.client, &self.url(bus_id)).await?;
        Ok(fix.and_then(|f| f.into_location(bus_id)))
    }
}

/// GET a JSON body where 404 and `null` both mean "nothing here".
async fn get_optional<T: DeserializeOwned>(client: &Client, url: &str) -> Result<Option<T>, ApiError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::from_status(status, &body));
    }
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e)))
}

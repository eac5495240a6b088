//! The remote store contract consumed by the console.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{Collection, Entity, RawLocationFields, Statistics};

use super::ApiError;

/// Acknowledgement of a successful write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteAck {
    /// Present when the store assigned an id (adds).
    pub id: Option<String>,
}

impl WriteAck {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()) }
    }
}

/// Wire shape of a write result: `{success, id?, error?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteResponse {
    pub fn into_result(self) -> Result<WriteAck, ApiError> {
        if self.success {
            Ok(WriteAck { id: self.id })
        } else {
            Err(ApiError::Rejected(
                self.error.unwrap_or_else(|| "store rejected the write".to_string()),
            ))
        }
    }
}

/// CRUD access to the remote document store.
///
/// Every call is a suspension point; callers resume only after the
/// specific call settles.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn list(&self, collection: Collection) -> Result<Vec<Value>, ApiError>;

    async fn read_document(&self, collection: Collection, id: &str) -> Result<Option<Value>, ApiError>;

    async fn add(&self, collection: Collection, data: Value) -> Result<WriteAck, ApiError>;

    async fn update(&self, collection: Collection, id: &str, changes: Value) -> Result<WriteAck, ApiError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<WriteAck, ApiError>;

    /// Set `studentsCount` only if the stored value still equals `expected`.
    ///
    /// Fails with [`ApiError::Conflict`] when another session moved it first.
    async fn set_occupancy(&self, bus_id: &str, expected: u32, count: u32) -> Result<WriteAck, ApiError>;

    async fn statistics(&self) -> Result<Statistics, ApiError>;
}

/// Typed access over a [`Gateway`].
///
/// Clone is cheap - the gateway is shared behind an `Arc`.
#[derive(Clone)]
pub struct RemoteStore {
    gateway: Arc<dyn Gateway>,
}

impl RemoteStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    /// Fetch a whole collection.
    ///
    /// Field decoding is tolerant, so a document only fails when it is not
    /// an object at all. One such document fails the whole fetch: a partial
    /// collection would hide references from the deletion and seat checks.
    pub async fn fetch_all<T: Entity>(&self) -> Result<Vec<T>, ApiError> {
        let documents = self.gateway.list(T::COLLECTION).await?;
        let items = documents
            .into_iter()
            .map(|doc| {
                let id = doc.get("id").and_then(Value::as_str).unwrap_or("?").to_string();
                serde_json::from_value::<T>(doc).map_err(|e| {
                    warn!(collection = %T::COLLECTION, id = %id, error = %e, "Undecodable document");
                    ApiError::InvalidResponse(format!("{} document {}: {}", T::COLLECTION, id, e))
                })
            })
            .collect::<Result<Vec<T>, ApiError>>()?;
        debug!(collection = %T::COLLECTION, fetched = items.len(), "Collection fetched");
        Ok(items)
    }

    /// Add a document and return the id the store assigned.
    pub async fn add<T: Entity>(&self, item: &T) -> Result<String, ApiError> {
        let data = to_document(item)?;
        let ack = self.gateway.add(T::COLLECTION, data).await?;
        ack.id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse(format!("add to {} acknowledged without id", T::COLLECTION)))
    }

    pub async fn update<P: Serialize>(&self, collection: Collection, id: &str, patch: &P) -> Result<(), ApiError> {
        let changes = to_document(patch)?;
        self.gateway.update(collection, id, changes).await?;
        Ok(())
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<(), ApiError> {
        self.gateway.delete(collection, id).await?;
        Ok(())
    }

    pub async fn set_occupancy(&self, bus_id: &str, expected: u32, count: u32) -> Result<(), ApiError> {
        self.gateway.set_occupancy(bus_id, expected, count).await?;
        Ok(())
    }

    /// Location fields straight from the bus document.
    pub async fn read_bus_document(&self, bus_id: &str) -> Result<Option<RawLocationFields>, ApiError> {
        match self.gateway.read_document(Collection::Buses, bus_id).await? {
            Some(doc) => serde_json::from_value(doc)
                .map(Some)
                .map_err(|e| ApiError::InvalidResponse(format!("bus document {}: {}", bus_id, e))),
            None => Ok(None),
        }
    }

    pub async fn statistics(&self) -> Result<Statistics, ApiError> {
        self.gateway.statistics().await
    }
}

fn to_document<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::InvalidResponse(format!("failed to encode document: {}", e)))
}

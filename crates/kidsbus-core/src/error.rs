//! Error types for the console core.

use thiserror::Error;

use crate::api::ApiError;
use crate::models::Collection;
use crate::sync::Drift;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed input. Raised before any remote call.
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Bus {bus_id} is full: {assigned} of {capacity} seats taken, {requested} more requested")]
    CapacityExceeded {
        bus_id: String,
        capacity: u32,
        assigned: u32,
        requested: u32,
    },

    /// The store refused the write or could not be reached. The cache is untouched.
    #[error("Remote write failed: {0}")]
    RemoteWrite(#[from] ApiError),

    #[error("Failed to load {collection}: {source}")]
    LoadFailed {
        collection: Collection,
        #[source]
        source: ApiError,
    },

    #[error("Loading {what} timed out after {seconds}s - reload to try again")]
    LoadTimeout { what: String, seconds: u64 },

    #[error("{collection} {id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("{collection} {id} is still referenced by {count} {referenced_by}")]
    ReferencesExist {
        collection: Collection,
        id: String,
        referenced_by: Collection,
        count: usize,
    },

    #[error("Relationship drift ({count} found), first: {first}")]
    RelationshipDrift { count: usize, first: Drift },
}

impl Error {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(collection: Collection, id: &str) -> Self {
        Error::NotFound {
            collection,
            id: id.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }
}

/// Result type for console operations.
pub type Result<T> = std::result::Result<T, Error>;

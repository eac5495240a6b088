//! Data models for the school-transport collections.
//!
//! This module contains the documents mirrored from the remote store:
//!
//! - `Student`: a rider, with denormalized parent and bus fields
//! - `Parent`, `ChildSummary`: a guardian and the embedded summaries of their children
//! - `Bus`: a vehicle with seat capacity and occupancy
//! - `Supervisor`: read-only staff records
//! - `Location`: a resolved bus position
//! - `Statistics`: dashboard aggregate counts

pub mod bus;
pub(crate) mod lenient;
pub mod location;
pub mod parent;
pub mod statistics;
pub mod student;
pub mod supervisor;

use serde::{de::DeserializeOwned, Serialize};

pub use bus::{Bus, BusDraft, BusPatch, BusStatus, Coordinates, DEFAULT_CAPACITY};
pub use location::{GpsFix, Location, LocationSource, RawLocationFields};
pub use parent::{ChildSummary, Parent, ParentDraft, ParentPatch};
pub use statistics::Statistics;
pub use student::{
    ParentChange, ParentSelection, Student, StudentChanges, StudentDraft, StudentPatch, StudentStatus,
};
pub use supervisor::Supervisor;

/// The remote collections this console mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Students,
    Parents,
    Buses,
    Supervisors,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Students,
        Collection::Parents,
        Collection::Buses,
        Collection::Supervisors,
    ];

    /// Path segment used by the remote store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::Parents => "parents",
            Collection::Buses => "buses",
            Collection::Supervisors => "supervisors",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document that lives in one of the remote collections.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
}

impl Entity for Student {
    const COLLECTION: Collection = Collection::Students;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Parent {
    const COLLECTION: Collection = Collection::Parents;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Bus {
    const COLLECTION: Collection = Collection::Buses;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Supervisor {
    const COLLECTION: Collection = Collection::Supervisors;

    fn id(&self) -> &str {
        &self.id
    }
}

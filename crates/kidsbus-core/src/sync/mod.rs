//! Relationship synchronizer.
//!
//! Keeps the denormalized copies in step with their sources of truth:
//!
//! - `Student.parentId` and the parent's embedded `children` summaries
//! - `Student.parentName` / `parentPhone` and the parent document
//! - `Student.busId` / `busRoute` and the bus occupancy count
//!
//! Every mutation follows the same order: validate, write the primary
//! document, mutate the cache only after the store acknowledged, then run
//! the cascades. A failed cascade is logged and reported in
//! [`Synced::cascade_failures`]; the primary write is never rolled back.

pub mod audit;
pub mod buses;
pub mod capacity;
pub mod parents;
pub mod students;
pub mod validation;

use tracing::warn;

use crate::api::ApiError;
use crate::console::Console;
use crate::models::{Bus, ChildSummary, Collection, Parent, ParentPatch};

pub use audit::{audit, Drift};
pub use capacity::{can_assign, seats_assigned};

/// A follow-up write that failed after the primary write succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeFailure {
    pub collection: Collection,
    pub id: String,
    pub action: &'static str,
    pub error: String,
}

impl std::fmt::Display for CascadeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {} failed: {}", self.collection, self.id, self.action, self.error)
    }
}

/// Result of a mutation: the primary value plus any cascade failures.
#[derive(Debug, Clone)]
pub struct Synced<T> {
    pub value: T,
    pub cascade_failures: Vec<CascadeFailure>,
}

impl<T> Synced<T> {
    pub(crate) fn new(value: T, cascade_failures: Vec<CascadeFailure>) -> Self {
        Self {
            value,
            cascade_failures,
        }
    }

    pub(crate) fn clean(value: T) -> Self {
        Self::new(value, Vec::new())
    }

    /// True when every cascade landed.
    pub fn is_clean(&self) -> bool {
        self.cascade_failures.is_empty()
    }
}

/// Collects cascade failures for one operation.
#[derive(Debug, Default)]
pub(crate) struct Cascades {
    failures: Vec<CascadeFailure>,
}

impl Cascades {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, collection: Collection, id: &str, action: &'static str, error: impl ToString) {
        let error = error.to_string();
        warn!(collection = %collection, id = %id, action, error = %error, "Cascade failed, primary write kept");
        self.failures.push(CascadeFailure {
            collection,
            id: id.to_string(),
            action,
            error,
        });
    }

    pub(crate) fn finish<T>(self, value: T) -> Synced<T> {
        Synced::new(value, self.failures)
    }
}

// ============================================================================
// Shared cascade steps
// ============================================================================

impl Console {
    /// Replace a parent's children list, remote first.
    pub(crate) async fn write_children(&mut self, parent_id: &str, children: Vec<ChildSummary>) -> Result<(), ApiError> {
        let patch = ParentPatch::children(children);
        self.remote.update(Collection::Parents, parent_id, &patch).await?;
        if let Some(parent) = self.cache.find_mut::<Parent>(parent_id) {
            parent.apply(&patch);
        }
        Ok(())
    }

    /// Make the parent hold exactly one summary for the student, matching it.
    pub(crate) async fn upsert_summary(&mut self, parent_id: &str, summary: ChildSummary, cascades: &mut Cascades) {
        let Some(parent) = self.cache.find::<Parent>(parent_id) else {
            cascades.record(Collection::Parents, parent_id, "add child summary", "parent not in cache");
            return;
        };
        let children = parent.children_with(summary);
        if children == parent.children {
            return;
        }
        if let Err(e) = self.write_children(parent_id, children).await {
            cascades.record(Collection::Parents, parent_id, "add child summary", e);
        }
    }

    /// Remove every summary of the student from the parent.
    pub(crate) async fn drop_summary(&mut self, parent_id: &str, student_id: &str, cascades: &mut Cascades) {
        let Some(parent) = self.cache.find::<Parent>(parent_id) else {
            return;
        };
        if parent.child(student_id).is_none() {
            return;
        }
        let children = parent.children_without(student_id);
        if let Err(e) = self.write_children(parent_id, children).await {
            cascades.record(Collection::Parents, parent_id, "remove child summary", e);
        }
    }

    /// Give back one seat on a bus the student left.
    pub(crate) async fn release_seat(&mut self, bus_id: &str, cascades: &mut Cascades) {
        let Some(recorded) = self.cache.find::<Bus>(bus_id).map(|b| b.students_count) else {
            return;
        };
        if recorded == 0 {
            return;
        }
        match self.remote.set_occupancy(bus_id, recorded, recorded - 1).await {
            Ok(()) => {
                if let Some(bus) = self.cache.find_mut::<Bus>(bus_id) {
                    bus.students_count = recorded - 1;
                }
            }
            Err(e) => cascades.record(Collection::Buses, bus_id, "release seat", e),
        }
    }
}

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::RemoteStore;
use crate::error::{Error, Result};
use crate::models::{Bus, Collection, Entity, Parent, Statistics, Student, Supervisor};

/// A loaded collection and when it was loaded.
#[derive(Debug, Clone)]
pub struct CachedData<T> {
    pub data: T,
    pub loaded_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            loaded_at: Utc::now(),
        }
    }
}

/// Render the time since `loaded_at` as "just now", "12m ago", "3h ago" or
/// "2d ago", rounding hours and days to the nearest whole unit.
pub fn describe_age(loaded_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    const HOUR: i64 = 60;
    const DAY: i64 = 24 * HOUR;

    match (now - loaded_at).num_minutes() {
        // Negative ages come from clock skew.
        m if m < 1 => "just now".to_string(),
        m if m < HOUR => format!("{}m ago", m),
        m if m < DAY => format!("{}h ago", (m + HOUR / 2) / HOUR),
        m => format!("{}d ago", (m + DAY / 2) / DAY),
    }
}

/// Entities the cache holds a slot for.
pub trait Cached: Entity {
    fn slot(cache: &EntityCache) -> &Option<CachedData<Vec<Self>>>;
    fn slot_mut(cache: &mut EntityCache) -> &mut Option<CachedData<Vec<Self>>>;
}

macro_rules! cached_slot {
    ($ty:ty, $field:ident) => {
        impl Cached for $ty {
            fn slot(cache: &EntityCache) -> &Option<CachedData<Vec<Self>>> {
                &cache.$field
            }

            fn slot_mut(cache: &mut EntityCache) -> &mut Option<CachedData<Vec<Self>>> {
                &mut cache.$field
            }
        }
    };
}

cached_slot!(Student, students);
cached_slot!(Parent, parents);
cached_slot!(Bus, buses);
cached_slot!(Supervisor, supervisors);

/// In-memory mirror of the remote collections for one console session.
///
/// Nothing refreshes it behind the caller's back: contents are as fresh as
/// the last explicit load. Mutators are crate-private so every change goes
/// through the synchronizer.
#[derive(Debug, Default)]
pub struct EntityCache {
    students: Option<CachedData<Vec<Student>>>,
    parents: Option<CachedData<Vec<Parent>>>,
    buses: Option<CachedData<Vec<Bus>>>,
    supervisors: Option<CachedData<Vec<Supervisor>>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every collection concurrently, racing `timeout`.
    ///
    /// All or nothing: on failure or timeout the previous contents stay.
    pub async fn init(&mut self, remote: &RemoteStore, timeout: Duration) -> Result<()> {
        info!("Loading all collections");
        let loads = async {
            tokio::join!(
                remote.fetch_all::<Student>(),
                remote.fetch_all::<Parent>(),
                remote.fetch_all::<Bus>(),
                remote.fetch_all::<Supervisor>(),
            )
        };

        let (students, parents, buses, supervisors) = tokio::time::timeout(timeout, loads)
            .await
            .map_err(|_| Error::LoadTimeout {
                what: "collections".to_string(),
                seconds: timeout.as_secs(),
            })?;

        let students = students.map_err(|e| load_failed(Collection::Students, e))?;
        let parents = parents.map_err(|e| load_failed(Collection::Parents, e))?;
        let buses = buses.map_err(|e| load_failed(Collection::Buses, e))?;
        let supervisors = supervisors.map_err(|e| load_failed(Collection::Supervisors, e))?;

        self.replace(students);
        self.replace(parents);
        self.replace(buses);
        self.replace(supervisors);
        info!(
            students = self.all::<Student>().len(),
            parents = self.all::<Parent>().len(),
            buses = self.all::<Bus>().len(),
            supervisors = self.all::<Supervisor>().len(),
            "Collections loaded"
        );
        Ok(())
    }

    /// Full reload of one collection, replacing its prior contents.
    pub async fn load<T: Cached>(&mut self, remote: &RemoteStore, timeout: Duration) -> Result<&[T]> {
        let items = tokio::time::timeout(timeout, remote.fetch_all::<T>())
            .await
            .map_err(|_| Error::LoadTimeout {
                what: T::COLLECTION.to_string(),
                seconds: timeout.as_secs(),
            })?
            .map_err(|e| load_failed(T::COLLECTION, e))?;
        self.replace(items);
        Ok(self.all::<T>())
    }

    /// Reload a collection chosen at runtime.
    pub async fn reload(&mut self, collection: Collection, remote: &RemoteStore, timeout: Duration) -> Result<usize> {
        let count = match collection {
            Collection::Students => self.load::<Student>(remote, timeout).await?.len(),
            Collection::Parents => self.load::<Parent>(remote, timeout).await?.len(),
            Collection::Buses => self.load::<Bus>(remote, timeout).await?.len(),
            Collection::Supervisors => self.load::<Supervisor>(remote, timeout).await?.len(),
        };
        debug!(collection = %collection, count, "Collection reloaded");
        Ok(count)
    }

    pub fn replace<T: Cached>(&mut self, items: Vec<T>) {
        *T::slot_mut(self) = Some(CachedData::new(items));
    }

    pub fn all<T: Cached>(&self) -> &[T] {
        T::slot(self).as_ref().map(|c| c.data.as_slice()).unwrap_or(&[])
    }

    pub fn find<T: Cached>(&self, id: &str) -> Option<&T> {
        self.all::<T>().iter().find(|item| item.id() == id)
    }

    /// Like [`find`](Self::find) but failing with `NotFound`.
    pub fn require<T: Cached>(&self, id: &str) -> Result<&T> {
        self.find::<T>(id).ok_or_else(|| Error::not_found(T::COLLECTION, id))
    }

    pub fn is_loaded<T: Cached>(&self) -> bool {
        T::slot(self).is_some()
    }

    pub fn loaded_at<T: Cached>(&self) -> Option<DateTime<Utc>> {
        T::slot(self).as_ref().map(|c| c.loaded_at)
    }

    pub(crate) fn find_mut<T: Cached>(&mut self, id: &str) -> Option<&mut T> {
        T::slot_mut(self)
            .as_mut()
            .and_then(|c| c.data.iter_mut().find(|item| item.id() == id))
    }

    /// Insert or replace by id.
    pub(crate) fn upsert<T: Cached>(&mut self, item: T) {
        let slot = T::slot_mut(self).get_or_insert_with(|| CachedData::new(Vec::new()));
        match slot.data.iter_mut().find(|existing| existing.id() == item.id()) {
            Some(existing) => *existing = item,
            None => slot.data.push(item),
        }
    }

    pub(crate) fn remove<T: Cached>(&mut self, id: &str) -> Option<T> {
        let slot = T::slot_mut(self).as_mut()?;
        let index = slot.data.iter().position(|item| item.id() == id)?;
        Some(slot.data.remove(index))
    }

    // ===== Relationship queries =====

    /// Students whose `parentId` points at the parent.
    pub fn children_of(&self, parent_id: &str) -> Vec<&Student> {
        self.all::<Student>()
            .iter()
            .filter(|s| s.parent_id.as_deref() == Some(parent_id))
            .collect()
    }

    pub fn students_on_bus(&self, bus_id: &str) -> Vec<&Student> {
        self.all::<Student>()
            .iter()
            .filter(|s| s.bus_id.as_deref() == Some(bus_id))
            .collect()
    }

    pub fn qr_code_taken(&self, qr_code: &str) -> bool {
        self.all::<Student>().iter().any(|s| s.qr_code == qr_code)
    }

    /// Plate numbers compare case- and space-insensitively.
    pub fn plate_taken(&self, plate: &str, except_id: Option<&str>) -> bool {
        let wanted = normalize_plate(plate);
        self.all::<Bus>()
            .iter()
            .filter(|b| Some(b.id.as_str()) != except_id)
            .any(|b| normalize_plate(&b.plate_number) == wanted)
    }

    /// Dashboard counts from the cached collections.
    pub fn statistics(&self) -> Statistics {
        Statistics::tally(
            self.all::<Student>(),
            self.all::<Parent>(),
            self.all::<Bus>(),
            self.all::<Supervisor>(),
        )
    }

    /// How long ago each collection was loaded.
    pub fn ages(&self) -> CacheAges {
        let now = Utc::now();
        let age = |at: Option<DateTime<Utc>>| at.map(|at| describe_age(at, now));
        CacheAges {
            students: age(self.loaded_at::<Student>()),
            parents: age(self.loaded_at::<Parent>()),
            buses: age(self.loaded_at::<Bus>()),
            supervisors: age(self.loaded_at::<Supervisor>()),
        }
    }
}

fn load_failed(collection: Collection, source: crate::api::ApiError) -> Error {
    warn!(collection = %collection, error = %source, "Collection load failed");
    Error::LoadFailed { collection, source }
}

fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Per-collection load ages; `None` for a collection never loaded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheAges {
    pub students: Option<String>,
    pub parents: Option<String>,
    pub buses: Option<String>,
    pub supervisors: Option<String>,
}

impl std::fmt::Display for CacheAges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = [
            (Collection::Students, &self.students),
            (Collection::Parents, &self.parents),
            (Collection::Buses, &self.buses),
            (Collection::Supervisors, &self.supervisors),
        ];
        for (i, (collection, age)) in entries.into_iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", collection, age.as_deref().unwrap_or("never"))?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

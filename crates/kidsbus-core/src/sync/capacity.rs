//! Capacity guard.
//!
//! Reads the cache immediately before an assignment write. The check alone
//! is not transactional: the seat is then claimed with a conditional
//! occupancy write so two sessions cannot both take the last one.

use crate::cache::EntityCache;
use crate::console::Console;
use crate::error::{Error, Result};
use crate::models::Bus;

/// Seats taken on a bus, as far as the cache can tell.
///
/// The larger of the recorded `studentsCount` and the number of cached
/// students pointing at the bus.
pub fn seats_assigned(cache: &EntityCache, bus: &Bus) -> u32 {
    let riding = cache.students_on_bus(&bus.id).len() as u32;
    bus.students_count.max(riding)
}

/// Check that `proposed` more students fit on the bus.
///
/// Returns the seats assigned before the change.
pub fn can_assign(cache: &EntityCache, bus_id: &str, proposed: u32) -> Result<u32> {
    let bus = cache.require::<Bus>(bus_id)?;
    let assigned = seats_assigned(cache, bus);
    if assigned.saturating_add(proposed) > bus.capacity {
        return Err(Error::CapacityExceeded {
            bus_id: bus_id.to_string(),
            capacity: bus.capacity,
            assigned,
            requested: proposed,
        });
    }
    Ok(assigned)
}

impl Console {
    /// Whether `proposed` more students fit on the bus.
    pub fn can_assign(&self, bus_id: &str, proposed: u32) -> Result<()> {
        can_assign(&self.cache, bus_id, proposed).map(|_| ())
    }
}

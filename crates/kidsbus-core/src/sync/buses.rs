//! Bus records and student seat assignment.

use tracing::{info, warn};

use crate::console::Console;
use crate::error::{Error, Result};
use crate::models::{Bus, BusDraft, BusPatch, Collection, Student, StudentPatch};

use super::capacity::{can_assign, seats_assigned};
use super::{validation, Cascades, Synced};

impl Console {
    // ===== Bus records =====

    pub async fn create_bus(&mut self, draft: BusDraft) -> Result<Synced<Bus>> {
        let plate = validation::required("plateNumber", &draft.plate_number)?;
        if self.cache.plate_taken(&plate, None) {
            return Err(Error::validation("plateNumber", format!("{} is already registered", plate)));
        }
        if draft.capacity < 1 {
            return Err(Error::validation("capacity", "must be at least 1"));
        }
        validation::fuel_level(draft.fuel_level)?;
        if !draft.driver_phone.trim().is_empty() {
            validation::phone("driverPhone", &draft.driver_phone)?;
        }

        let mut bus = draft.into_bus();
        bus.id = self.remote.add(&bus).await?;
        self.cache.upsert(bus.clone());
        info!(bus_id = %bus.id, plate = %bus.plate_number, "Bus created");
        Ok(Synced::clean(bus))
    }

    /// Edit a bus. A new route is pushed to the students riding it.
    pub async fn update_bus(&mut self, id: &str, patch: BusPatch) -> Result<Synced<Bus>> {
        let current = self.cache.require::<Bus>(id)?.clone();

        let plate_number = patch
            .plate_number
            .as_deref()
            .map(|p| validation::required("plateNumber", p))
            .transpose()?;
        if let Some(ref plate) = plate_number {
            if self.cache.plate_taken(plate, Some(id)) {
                return Err(Error::validation("plateNumber", format!("{} is already registered", plate)));
            }
        }
        if let Some(capacity) = patch.capacity {
            let assigned = seats_assigned(&self.cache, &current);
            if capacity < assigned.max(1) {
                return Err(Error::validation(
                    "capacity",
                    format!("must be at least {}", assigned.max(1)),
                ));
            }
        }
        if let Some(fuel) = patch.fuel_level {
            validation::fuel_level(fuel)?;
        }
        let patch = BusPatch { plate_number, ..patch };
        if patch == BusPatch::default() {
            return Ok(Synced::clean(current));
        }

        self.remote.update(Collection::Buses, id, &patch).await?;
        let updated = match self.cache.find_mut::<Bus>(id) {
            Some(bus) => {
                bus.apply(&patch);
                bus.clone()
            }
            None => current.clone(),
        };

        let mut cascades = Cascades::new();
        if updated.route != current.route {
            let riders: Vec<String> = self
                .cache
                .students_on_bus(id)
                .into_iter()
                .filter(|s| s.bus_route != updated.route)
                .map(|s| s.id.clone())
                .collect();
            for student_id in riders {
                let student_patch = StudentPatch {
                    bus_route: Some(updated.route.clone()),
                    ..Default::default()
                };
                self.patch_student(&student_id, student_patch, "refresh bus route", &mut cascades)
                    .await;
                self.refresh_summary(&student_id, &mut cascades).await;
            }
        }
        Ok(cascades.finish(updated))
    }

    /// Delete a bus. Refused while any cached student is assigned to it.
    pub async fn delete_bus(&mut self, id: &str) -> Result<Synced<Bus>> {
        let bus = self.cache.require::<Bus>(id)?.clone();
        let count = self.cache.students_on_bus(id).len();
        if count > 0 {
            return Err(Error::ReferencesExist {
                collection: Collection::Buses,
                id: id.to_string(),
                referenced_by: Collection::Students,
                count,
            });
        }
        self.remote.delete(Collection::Buses, id).await?;
        self.cache.remove::<Bus>(id);
        info!(bus_id = %id, "Bus deleted");
        Ok(Synced::clean(bus))
    }

    // ===== Seat assignment =====

    /// Seat a student on a bus.
    ///
    /// The seat is claimed with a conditional occupancy write before the
    /// student document changes; if another session took it first the
    /// claim fails with a conflict and nothing is cached.
    pub async fn assign_student_to_bus(&mut self, student_id: &str, bus_id: &str) -> Result<Synced<Student>> {
        let student = self.cache.require::<Student>(student_id)?.clone();
        let bus = self.cache.require::<Bus>(bus_id)?.clone();
        if student.bus_id.as_deref() == Some(bus_id) {
            return Ok(Synced::clean(student));
        }

        let assigned = can_assign(&self.cache, bus_id, 1)?;
        let claimed = assigned + 1;
        self.remote.set_occupancy(bus_id, bus.students_count, claimed).await?;
        if let Some(cached) = self.cache.find_mut::<Bus>(bus_id) {
            cached.students_count = claimed;
        }

        let patch = StudentPatch {
            bus_id: Some(Some(bus_id.to_string())),
            bus_route: Some(bus.route.clone()).filter(|r| !r.is_empty()),
            ..Default::default()
        };
        if let Err(e) = self.remote.update(Collection::Students, student_id, &patch).await {
            self.give_back_claim(bus_id, claimed, bus.students_count).await;
            return Err(e.into());
        }
        let updated = match self.cache.find_mut::<Student>(student_id) {
            Some(cached) => {
                cached.apply(&patch);
                cached.clone()
            }
            None => student.clone(),
        };
        info!(student_id = %student_id, bus_id = %bus_id, seats = claimed, capacity = bus.capacity, "Student assigned to bus");

        let mut cascades = Cascades::new();
        if let Some(ref previous) = student.bus_id {
            self.release_seat(previous, &mut cascades).await;
        }
        self.refresh_summary(student_id, &mut cascades).await;
        Ok(cascades.finish(updated))
    }

    /// Clear a student's bus assignment and release the seat.
    pub async fn remove_student_from_bus(&mut self, student_id: &str) -> Result<Synced<Student>> {
        let student = self.cache.require::<Student>(student_id)?.clone();
        let Some(bus_id) = student.bus_id.clone() else {
            return Ok(Synced::clean(student));
        };

        let patch = StudentPatch {
            bus_id: Some(None),
            bus_route: Some(String::new()),
            ..Default::default()
        };
        self.remote.update(Collection::Students, student_id, &patch).await?;
        let updated = match self.cache.find_mut::<Student>(student_id) {
            Some(cached) => {
                cached.apply(&patch);
                cached.clone()
            }
            None => student,
        };
        info!(student_id = %student_id, bus_id = %bus_id, "Student removed from bus");

        let mut cascades = Cascades::new();
        self.release_seat(&bus_id, &mut cascades).await;
        self.refresh_summary(student_id, &mut cascades).await;
        Ok(cascades.finish(updated))
    }

    /// Undo a seat claim whose student write failed.
    async fn give_back_claim(&mut self, bus_id: &str, claimed: u32, previous: u32) {
        match self.remote.set_occupancy(bus_id, claimed, previous).await {
            Ok(()) => {
                if let Some(bus) = self.cache.find_mut::<Bus>(bus_id) {
                    bus.students_count = previous;
                }
            }
            Err(e) => warn!(bus_id = %bus_id, error = %e, "Could not release claimed seat"),
        }
    }

    /// Re-sync the cached student's summary on its parent, if it has one.
    async fn refresh_summary(&mut self, student_id: &str, cascades: &mut Cascades) {
        let Some((parent_id, summary)) = self
            .cache
            .find::<Student>(student_id)
            .and_then(|s| s.parent_id.clone().map(|p| (p, s.summary())))
        else {
            return;
        };
        self.upsert_summary(&parent_id, summary, cascades).await;
    }
}

//! Consistency scan over the cached collections.
//!
//! Nothing here runs implicitly. Call [`Console::audit`] after a reload to
//! find drift left behind by failed cascades or by other sessions.

use std::collections::HashMap;

use crate::cache::EntityCache;
use crate::console::Console;
use crate::error::{Error, Result};
use crate::models::{Bus, Parent, Student};

use super::capacity::seats_assigned;

/// One inconsistency between a source of truth and its copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// The student points at the parent but the parent lacks its summary.
    MissingSummary { parent_id: String, student_id: String },
    /// The summary no longer matches the student's fields.
    StaleSummary { parent_id: String, student_id: String },
    /// The parent holds a summary for a student that does not point back.
    OrphanSummary { parent_id: String, student_id: String },
    DuplicateSummary {
        parent_id: String,
        student_id: String,
        count: usize,
    },
    /// The student names a parent that is not in the cache.
    MissingParent { student_id: String, parent_id: String },
    OverCapacity { bus_id: String, capacity: u32, assigned: u32 },
    /// The recorded `studentsCount` differs from the students assigned.
    OccupancyMismatch { bus_id: String, recorded: u32, riding: u32 },
}

impl std::fmt::Display for Drift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Drift::MissingSummary { parent_id, student_id } => {
                write!(f, "parent {} is missing the summary of student {}", parent_id, student_id)
            }
            Drift::StaleSummary { parent_id, student_id } => {
                write!(f, "parent {} holds a stale summary of student {}", parent_id, student_id)
            }
            Drift::OrphanSummary { parent_id, student_id } => {
                write!(f, "parent {} lists student {} which is not its child", parent_id, student_id)
            }
            Drift::DuplicateSummary {
                parent_id,
                student_id,
                count,
            } => write!(f, "parent {} lists student {} {} times", parent_id, student_id, count),
            Drift::MissingParent { student_id, parent_id } => {
                write!(f, "student {} points at unknown parent {}", student_id, parent_id)
            }
            Drift::OverCapacity {
                bus_id,
                capacity,
                assigned,
            } => write!(f, "bus {} has {} students for {} seats", bus_id, assigned, capacity),
            Drift::OccupancyMismatch {
                bus_id,
                recorded,
                riding,
            } => write!(f, "bus {} records {} students but {} are assigned", bus_id, recorded, riding),
        }
    }
}

/// Every drift the cache currently shows, parents first.
pub fn audit(cache: &EntityCache) -> Vec<Drift> {
    let mut drifts = Vec::new();

    for parent in cache.all::<Parent>() {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for child in &parent.children {
            *counts.entry(child.id.as_str()).or_default() += 1;
        }

        for child in &parent.children {
            let Some(count) = counts.remove(child.id.as_str()) else {
                continue; // already reported
            };
            if count > 1 {
                drifts.push(Drift::DuplicateSummary {
                    parent_id: parent.id.clone(),
                    student_id: child.id.clone(),
                    count,
                });
            }
            match cache.find::<Student>(&child.id) {
                Some(student) if student.parent_id.as_deref() == Some(parent.id.as_str()) => {
                    if student.summary() != *child {
                        drifts.push(Drift::StaleSummary {
                            parent_id: parent.id.clone(),
                            student_id: child.id.clone(),
                        });
                    }
                }
                _ => drifts.push(Drift::OrphanSummary {
                    parent_id: parent.id.clone(),
                    student_id: child.id.clone(),
                }),
            }
        }
    }

    for student in cache.all::<Student>() {
        let Some(ref parent_id) = student.parent_id else {
            continue;
        };
        match cache.find::<Parent>(parent_id) {
            Some(parent) if parent.child(&student.id).is_none() => drifts.push(Drift::MissingSummary {
                parent_id: parent_id.clone(),
                student_id: student.id.clone(),
            }),
            Some(_) => {}
            None => drifts.push(Drift::MissingParent {
                student_id: student.id.clone(),
                parent_id: parent_id.clone(),
            }),
        }
    }

    for bus in cache.all::<Bus>() {
        let riding = cache.students_on_bus(&bus.id).len() as u32;
        let assigned = seats_assigned(cache, bus);
        if assigned > bus.capacity {
            drifts.push(Drift::OverCapacity {
                bus_id: bus.id.clone(),
                capacity: bus.capacity,
                assigned,
            });
        }
        if riding != bus.students_count {
            drifts.push(Drift::OccupancyMismatch {
                bus_id: bus.id.clone(),
                recorded: bus.students_count,
                riding,
            });
        }
    }

    drifts
}

impl Console {
    pub fn audit(&self) -> Vec<Drift> {
        audit(&self.cache)
    }

    /// Fail with `RelationshipDrift` when the audit finds anything.
    pub fn ensure_consistent(&self) -> Result<()> {
        let mut drifts = self.audit();
        if drifts.is_empty() {
            return Ok(());
        }
        let count = drifts.len();
        Err(Error::RelationshipDrift {
            count,
            first: drifts.swap_remove(0),
        })
    }
}

use serde::{Deserialize, Serialize};

use super::{Bus, Parent, Student, StudentStatus, Supervisor};

/// Aggregate counts shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase", default)]
pub struct Statistics {
    pub total_students: u32,
    pub total_supervisors: u32,
    pub total_parents: u32,
    pub active_students: u32,
    pub students_on_bus: u32,
    pub students_at_school: u32,
    pub students_at_home: u32,
    pub total_buses: u32,
    pub seats_total: u32,
    pub seats_assigned: u32,
}

impl Statistics {
    /// Count the given collections. Inactive documents are left out.
    pub fn tally(students: &[Student], parents: &[Parent], buses: &[Bus], supervisors: &[Supervisor]) -> Self {
        let mut stats = Statistics::default();
        for student in students.iter().filter(|s| s.is_active) {
            stats.total_students += 1;
            match student.current_status {
                StudentStatus::Inactive => {}
                StudentStatus::OnBus => {
                    stats.active_students += 1;
                    stats.students_on_bus += 1;
                }
                StudentStatus::AtSchool => {
                    stats.active_students += 1;
                    stats.students_at_school += 1;
                }
                StudentStatus::Home => {
                    stats.active_students += 1;
                    stats.students_at_home += 1;
                }
            }
        }
        stats.total_parents = parents.iter().filter(|p| p.is_active).count() as u32;
        stats.total_supervisors = supervisors.iter().filter(|s| s.is_active).count() as u32;
        for bus in buses.iter().filter(|b| b.is_active) {
            stats.total_buses += 1;
            stats.seats_total += bus.capacity;
            stats.seats_assigned += bus.students_count;
        }
        stats
    }

    /// Share of seats in use, 0-100.
    pub fn occupancy_percent(&self) -> u32 {
        if self.seats_total == 0 {
            0
        } else {
            ((self.seats_assigned as u64 * 100) / self.seats_total as u64) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_remote_statistics() {
        let stats: Statistics = serde_json::from_str(r#"{"totalStudents":12,"studentsOnBus":3}"#).unwrap();
        assert_eq!(stats.total_students, 12);
        assert_eq!(stats.students_on_bus, 3);
        assert_eq!(stats.total_buses, 0);
    }

    #[test]
    fn test_occupancy_percent() {
        let stats = Statistics {
            seats_total: 60,
            seats_assigned: 45,
            ..Default::default()
        };
        assert_eq!(stats.occupancy_percent(), 75);
        assert_eq!(Statistics::default().occupancy_percent(), 0);
    }
}

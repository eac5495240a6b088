use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lenient;
use super::parent::{ChildSummary, ParentDraft};

/// Where a student currently is during the school day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub enum StudentStatus {
    #[default]
    Home,
    OnBus,
    AtSchool,
    Inactive,
}

impl std::fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StudentStatus::Home => write!(f, "home"),
            StudentStatus::OnBus => write!(f, "on bus"),
            StudentStatus::AtSchool => write!(f, "at school"),
            StudentStatus::Inactive => write!(f, "inactive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Student {
    /// Assigned by the remote store; empty until the add is acknowledged.
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub grade: String,
    #[serde(rename = "schoolName", alias = "school", default, deserialize_with = "lenient::text")]
    pub school_name: String,
    #[serde(rename = "parentId", default, deserialize_with = "lenient::reference")]
    pub parent_id: Option<String>,
    #[serde(rename = "parentName", default, deserialize_with = "lenient::text")]
    pub parent_name: String,
    #[serde(rename = "parentPhone", default, deserialize_with = "lenient::text")]
    pub parent_phone: String,
    #[serde(rename = "busRoute", default, deserialize_with = "lenient::text")]
    pub bus_route: String,
    #[serde(rename = "busId", default, deserialize_with = "lenient::reference")]
    pub bus_id: Option<String>,
    #[serde(rename = "qrCode", default, deserialize_with = "lenient::text")]
    pub qr_code: String,
    #[serde(rename = "currentStatus", default, deserialize_with = "lenient::or_default")]
    pub current_status: StudentStatus,
    #[serde(rename = "isActive", default = "default_true", deserialize_with = "lenient::active_flag")]
    pub is_active: bool,
    #[serde(
        rename = "createdAt",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "updatedAt",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::timestamp"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Student {
    /// The summary a parent embeds for this student.
    pub fn summary(&self) -> ChildSummary {
        ChildSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            grade: self.grade.clone(),
            school_name: self.school_name.clone(),
            bus_route: self.bus_route.clone(),
            qr_code: self.qr_code.clone(),
            current_status: self.current_status,
        }
    }

    pub fn has_parent(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Apply an acknowledged patch to the cached copy.
    pub fn apply(&mut self, patch: &StudentPatch) {
        if let Some(ref name) = patch.name {
            self.name = name.clone();
        }
        if let Some(ref grade) = patch.grade {
            self.grade = grade.clone();
        }
        if let Some(ref school) = patch.school_name {
            self.school_name = school.clone();
        }
        if let Some(ref route) = patch.bus_route {
            self.bus_route = route.clone();
        }
        if let Some(ref bus_id) = patch.bus_id {
            self.bus_id = bus_id.clone();
        }
        if let Some(ref parent_id) = patch.parent_id {
            self.parent_id = Some(parent_id.clone()).filter(|p| !p.is_empty());
        }
        if let Some(ref parent_name) = patch.parent_name {
            self.parent_name = parent_name.clone();
        }
        if let Some(ref parent_phone) = patch.parent_phone {
            self.parent_phone = parent_phone.clone();
        }
        if let Some(status) = patch.current_status {
            self.current_status = status;
        }
        if let Some(active) = patch.is_active {
            self.is_active = active;
        }
        self.updated_at = Some(Utc::now());
    }
}

/// Which parent a new student should be linked to.
#[derive(Debug, Clone, Default)]
pub enum ParentSelection {
    /// Parent not yet registered.
    #[default]
    None,
    Existing(String),
    /// Create the parent first and link the student to it.
    New(ParentDraft),
}

/// Input for creating a student.
#[derive(Debug, Clone, Default)]
pub struct StudentDraft {
    pub name: String,
    pub grade: String,
    pub school_name: String,
    pub bus_route: String,
    pub parent: ParentSelection,
    /// Contact phone; falls back to the selected parent's phone when empty.
    pub parent_phone: Option<String>,
    /// Supplied QR code; generated when absent.
    pub qr_code: Option<String>,
    pub current_status: StudentStatus,
}

/// How an update changes the parent link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParentChange {
    #[default]
    Keep,
    Detach,
    Attach(String),
}

/// Caller-facing edit of a student. `qr_code` is deliberately absent.
#[derive(Debug, Clone, Default)]
pub struct StudentChanges {
    pub name: Option<String>,
    pub grade: Option<String>,
    pub school_name: Option<String>,
    pub bus_route: Option<String>,
    pub parent_phone: Option<String>,
    pub current_status: Option<StudentStatus>,
    pub is_active: Option<bool>,
    pub parent: ParentChange,
}

impl StudentChanges {
    /// True when a field embedded in a parent's child summary changes.
    pub fn touches_summary(&self) -> bool {
        self.name.is_some()
            || self.grade.is_some()
            || self.school_name.is_some()
            || self.bus_route.is_some()
            || self.current_status.is_some()
    }
}

/// Wire-level partial update of a student document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(rename = "schoolName", skip_serializing_if = "Option::is_none")]
    pub school_name: Option<String>,
    #[serde(rename = "busRoute", skip_serializing_if = "Option::is_none")]
    pub bus_route: Option<String>,
    /// `Some(None)` clears the assignment.
    #[serde(rename = "busId", skip_serializing_if = "Option::is_none")]
    pub bus_id: Option<Option<String>>,
    /// An empty string detaches the student from its parent.
    #[serde(rename = "parentId", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(rename = "parentName", skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(rename = "parentPhone", skip_serializing_if = "Option::is_none")]
    pub parent_phone: Option<String>,
    #[serde(rename = "currentStatus", skip_serializing_if = "Option::is_none")]
    pub current_status: Option<StudentStatus>,
    #[serde(rename = "isActive", skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        *self == StudentPatch::default()
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_student_from_store_document() {
        let doc = json!({
            "id": "s1",
            "name": "Ali",
            "grade": "G3",
            "schoolName": "X",
            "parentId": "",
            "busRoute": "Route1",
            "qrCode": "STUDENT_1",
            "currentStatus": "onBus"
        });
        let student: Student = serde_json::from_value(doc).unwrap();
        assert_eq!(student.parent_id, None);
        assert_eq!(student.current_status, StudentStatus::OnBus);
        assert!(student.is_active);
        assert!(student.bus_id.is_none());
    }

    #[test]
    fn test_new_student_serializes_without_id() {
        let student = Student {
            id: String::new(),
            name: "Sara".to_string(),
            grade: "G1".to_string(),
            school_name: "North".to_string(),
            parent_id: None,
            parent_name: String::new(),
            parent_phone: "0501234567".to_string(),
            bus_route: "Route2".to_string(),
            bus_id: None,
            qr_code: "STUDENT_9".to_string(),
            current_status: StudentStatus::Home,
            is_active: true,
            created_at: None,
            updated_at: None,
        };
        let value = serde_json::to_value(&student).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["schoolName"], "North");
    }

    #[test]
    fn test_patch_clears_bus_with_null() {
        let patch = StudentPatch {
            bus_id: Some(None),
            bus_route: Some(String::new()),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert!(value["busId"].is_null());
        assert!(value.get("name").is_none());
    }

    #[test]
    fn test_apply_detaches_parent_on_empty_id() {
        let mut student: Student = serde_json::from_value(json!({
            "id": "s1", "name": "Ali", "parentId": "P1"
        }))
        .unwrap();
        student.apply(&StudentPatch {
            parent_id: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(student.parent_id, None);
    }
}

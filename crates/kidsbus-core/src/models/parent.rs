use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lenient;
use super::student::StudentStatus;

/// A student's fields as embedded in the parent's document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct ChildSummary {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub grade: String,
    #[serde(rename = "schoolName", default, deserialize_with = "lenient::text")]
    pub school_name: String,
    #[serde(rename = "busRoute", default, deserialize_with = "lenient::text")]
    pub bus_route: String,
    #[serde(rename = "qrCode", default, deserialize_with = "lenient::text")]
    pub qr_code: String,
    #[serde(rename = "currentStatus", default, deserialize_with = "lenient::or_default")]
    pub current_status: StudentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Parent {
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub phone: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub occupation: Option<String>,
    #[serde(rename = "emergencyPhone", default, deserialize_with = "lenient::or_default")]
    pub emergency_phone: Option<String>,
    #[serde(default)]
    pub children: Vec<ChildSummary>,
    #[serde(default = "default_status", deserialize_with = "lenient::text")]
    pub status: String,
    #[serde(rename = "notificationPreferences", default, deserialize_with = "lenient::or_default")]
    pub notification_preferences: Vec<String>,
    #[serde(rename = "isActive", default = "default_true", deserialize_with = "lenient::active_flag")]
    pub is_active: bool,
    #[serde(
        rename = "updatedAt",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::timestamp"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Parent {
    pub fn child(&self, student_id: &str) -> Option<&ChildSummary> {
        self.children.iter().find(|c| c.id == student_id)
    }

    /// Children list with `summary` inserted or replaced in place.
    ///
    /// Any duplicate entries for the same id collapse into the first one.
    pub fn children_with(&self, summary: ChildSummary) -> Vec<ChildSummary> {
        let mut children = Vec::with_capacity(self.children.len() + 1);
        let mut placed = false;
        for child in &self.children {
            if child.id == summary.id {
                if !placed {
                    children.push(summary.clone());
                    placed = true;
                }
            } else {
                children.push(child.clone());
            }
        }
        if !placed {
            children.push(summary);
        }
        children
    }

    /// Children list with every entry for `student_id` removed.
    pub fn children_without(&self, student_id: &str) -> Vec<ChildSummary> {
        self.children
            .iter()
            .filter(|c| c.id != student_id)
            .cloned()
            .collect()
    }

    pub fn apply(&mut self, patch: &ParentPatch) {
        if let Some(ref name) = patch.name {
            self.name = name.clone();
        }
        if let Some(ref email) = patch.email {
            self.email = email.clone();
        }
        if let Some(ref phone) = patch.phone {
            self.phone = phone.clone();
        }
        if let Some(ref address) = patch.address {
            self.address = Some(address.clone());
        }
        if let Some(ref occupation) = patch.occupation {
            self.occupation = Some(occupation.clone());
        }
        if let Some(ref emergency) = patch.emergency_phone {
            self.emergency_phone = Some(emergency.clone());
        }
        if let Some(ref status) = patch.status {
            self.status = status.clone();
        }
        if let Some(ref prefs) = patch.notification_preferences {
            self.notification_preferences = prefs.clone();
        }
        if let Some(ref children) = patch.children {
            self.children = children.clone();
        }
        self.updated_at = Some(Utc::now());
    }
}

/// Input for registering a parent.
#[derive(Debug, Clone, Default)]
pub struct ParentDraft {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
    pub occupation: Option<String>,
    pub emergency_phone: Option<String>,
}

impl ParentDraft {
    pub(crate) fn into_parent(self) -> Parent {
        Parent {
            id: String::new(),
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            address: self.address,
            occupation: self.occupation,
            emergency_phone: self.emergency_phone,
            children: Vec::new(),
            status: default_status(),
            notification_preferences: Vec::new(),
            is_active: true,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(rename = "emergencyPhone", skip_serializing_if = "Option::is_none")]
    pub emergency_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "notificationPreferences", skip_serializing_if = "Option::is_none")]
    pub notification_preferences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ChildSummary>>,
}

impl ParentPatch {
    pub fn children(children: Vec<ChildSummary>) -> Self {
        Self {
            children: Some(children),
            ..Default::default()
        }
    }
}

fn default_status() -> String {
    "active".to_string()
}

fn default_true() -> bool {
    true
}

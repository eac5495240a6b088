use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::lenient;

/// Staff record shown by the console; never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Supervisor {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub phone: String,
    #[serde(rename = "busRoute", default, deserialize_with = "lenient::text")]
    pub bus_route: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub permissions: BTreeSet<String>,
    #[serde(rename = "isActive", default = "default_true", deserialize_with = "lenient::active_flag")]
    pub is_active: bool,
}

impl Supervisor {
    pub fn can(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

fn default_true() -> bool {
    true
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::lenient;

/// Seats assumed when a bus document carries no capacity.
pub const DEFAULT_CAPACITY: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub enum BusStatus {
    #[default]
    Active,
    Maintenance,
    OutOfService,
}

impl std::fmt::Display for BusStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusStatus::Active => write!(f, "Active"),
            BusStatus::Maintenance => write!(f, "Maintenance"),
            BusStatus::OutOfService => write!(f, "Out of service"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Coordinates {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude", alias = "lon")]
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Bus {
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(rename = "plateNumber", default, deserialize_with = "lenient::text")]
    pub plate_number: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: String,
    #[serde(rename = "driverName", default, deserialize_with = "lenient::text")]
    pub driver_name: String,
    #[serde(rename = "driverPhone", default, deserialize_with = "lenient::text")]
    pub driver_phone: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub route: String,
    #[serde(default = "default_capacity", deserialize_with = "seats")]
    pub capacity: u32,
    #[serde(rename = "studentsCount", default, deserialize_with = "lenient::count")]
    pub students_count: u32,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub status: BusStatus,
    #[serde(rename = "fuelLevel", default = "full_tank", deserialize_with = "clamped_fuel")]
    pub fuel_level: f64,
    #[serde(rename = "currentLocation", default, deserialize_with = "lenient::text")]
    pub current_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::or_default")]
    pub coordinates: Option<Coordinates>,
    #[serde(rename = "hasAirConditioning", default, deserialize_with = "lenient::or_default")]
    pub has_air_conditioning: bool,
    #[serde(rename = "isActive", default = "default_true", deserialize_with = "lenient::active_flag")]
    pub is_active: bool,
}

impl Bus {
    pub fn seats_left(&self) -> u32 {
        self.capacity.saturating_sub(self.students_count)
    }

    pub fn is_full(&self) -> bool {
        self.students_count >= self.capacity
    }

    /// Label used in lists, e.g. "ABC 123 (Route 1)".
    pub fn label(&self) -> String {
        if self.route.is_empty() {
            self.plate_number.clone()
        } else {
            format!("{} ({})", self.plate_number, self.route)
        }
    }

    pub fn apply(&mut self, patch: &BusPatch) {
        if let Some(ref plate) = patch.plate_number {
            self.plate_number = plate.clone();
        }
        if let Some(ref description) = patch.description {
            self.description = description.clone();
        }
        if let Some(ref driver) = patch.driver_name {
            self.driver_name = driver.clone();
        }
        if let Some(ref phone) = patch.driver_phone {
            self.driver_phone = phone.clone();
        }
        if let Some(ref route) = patch.route {
            self.route = route.clone();
        }
        if let Some(capacity) = patch.capacity {
            self.capacity = capacity;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(fuel) = patch.fuel_level {
            self.fuel_level = fuel.clamp(0.0, 100.0);
        }
        if let Some(ref location) = patch.current_location {
            self.current_location = location.clone();
        }
        if let Some(ac) = patch.has_air_conditioning {
            self.has_air_conditioning = ac;
        }
    }
}

/// Input for registering a bus.
#[derive(Debug, Clone)]
pub struct BusDraft {
    pub plate_number: String,
    pub description: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub route: String,
    pub capacity: u32,
    pub fuel_level: f64,
    pub has_air_conditioning: bool,
}

impl Default for BusDraft {
    fn default() -> Self {
        Self {
            plate_number: String::new(),
            description: String::new(),
            driver_name: String::new(),
            driver_phone: String::new(),
            route: String::new(),
            capacity: DEFAULT_CAPACITY,
            fuel_level: 100.0,
            has_air_conditioning: false,
        }
    }
}

impl BusDraft {
    pub(crate) fn into_bus(self) -> Bus {
        Bus {
            id: String::new(),
            plate_number: self.plate_number.trim().to_string(),
            description: self.description,
            driver_name: self.driver_name.trim().to_string(),
            driver_phone: self.driver_phone.trim().to_string(),
            route: self.route.trim().to_string(),
            capacity: self.capacity,
            students_count: 0,
            status: BusStatus::Active,
            fuel_level: self.fuel_level,
            current_location: String::new(),
            coordinates: None,
            has_air_conditioning: self.has_air_conditioning,
            is_active: true,
        }
    }
}

/// Partial update of a bus. `studentsCount` only moves through occupancy writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BusPatch {
    #[serde(rename = "plateNumber", skip_serializing_if = "Option::is_none")]
    pub plate_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "driverName", skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    #[serde(rename = "driverPhone", skip_serializing_if = "Option::is_none")]
    pub driver_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BusStatus>,
    #[serde(rename = "fuelLevel", skip_serializing_if = "Option::is_none")]
    pub fuel_level: Option<f64>,
    #[serde(rename = "currentLocation", skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,
    #[serde(rename = "hasAirConditioning", skip_serializing_if = "Option::is_none")]
    pub has_air_conditioning: Option<bool>,
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

fn full_tank() -> f64 {
    100.0
}

fn default_true() -> bool {
    true
}

fn clamped_fuel<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lenient::number(&value).unwrap_or_else(full_tank).clamp(0.0, 100.0))
}

/// A stored capacity of 0, or one that cannot be read, means the default.
fn seats<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match lenient::count_from(&value) {
        0 => Ok(DEFAULT_CAPACITY),
        seats => Ok(seats),
    }
}

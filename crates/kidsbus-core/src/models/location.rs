use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bus::Coordinates;

/// Which provider answered a location lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub enum LocationSource {
    Primary,
    StoreDocument,
    Gps,
    Unavailable,
}

impl std::fmt::Display for LocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationSource::Primary => write!(f, "location service"),
            LocationSource::StoreDocument => write!(f, "bus document"),
            LocationSource::Gps => write!(f, "gps"),
            LocationSource::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Description carried by the fallback location.
pub const UNAVAILABLE_DESCRIPTION: &str = "Location unavailable";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Location {
    #[serde(rename = "busId")]
    pub bus_id: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(rename = "recordedAt", default)]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    pub source: LocationSource,
}

impl Location {
    pub fn at(bus_id: impl Into<String>, coordinates: Coordinates, source: LocationSource) -> Self {
        Self {
            bus_id: bus_id.into(),
            coordinates: Some(coordinates),
            speed: None,
            heading: None,
            recorded_at: None,
            description: None,
            source,
        }
    }

    /// The static value returned when every provider fails.
    pub fn unavailable(bus_id: impl Into<String>) -> Self {
        Self {
            bus_id: bus_id.into(),
            coordinates: None,
            speed: None,
            heading: None,
            recorded_at: None,
            description: Some(UNAVAILABLE_DESCRIPTION.to_string()),
            source: LocationSource::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        self.source != LocationSource::Unavailable
    }
}

/// Location fields as they appear on a bus document in the store.
///
/// Older documents carry flat `lat`/`lng` (or `latitude`/`longitude`),
/// newer ones a nested `coordinates` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLocationFields {
    #[serde(alias = "latitude")]
    pub lat: Option<f64>,
    #[serde(alias = "longitude", alias = "lon")]
    pub lng: Option<f64>,
    pub coordinates: Option<Coordinates>,
    #[serde(rename = "currentLocation")]
    pub current_location: Option<String>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    #[serde(rename = "lastUpdated", alias = "updatedAt")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl RawLocationFields {
    /// A location only when the document holds usable coordinates.
    pub fn into_location(self, bus_id: &str) -> Option<Location> {
        let coordinates = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => self.coordinates,
        }
        .filter(Coordinates::is_valid)?;

        Some(Location {
            bus_id: bus_id.to_string(),
            coordinates: Some(coordinates),
            speed: self.speed,
            heading: self.heading,
            recorded_at: self.last_updated,
            description: self.current_location.filter(|s| !s.trim().is_empty()),
            source: LocationSource::StoreDocument,
        })
    }
}

/// Reading from the dedicated GPS provider.
#[derive(Debug, Clone, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl GpsFix {
    pub fn into_location(self, bus_id: &str) -> Option<Location> {
        let coordinates = Coordinates::new(self.lat, self.lng);
        if !coordinates.is_valid() {
            return None;
        }
        Some(Location {
            bus_id: bus_id.to_string(),
            coordinates: Some(coordinates),
            speed: self.speed,
            heading: self.heading,
            recorded_at: self.timestamp,
            description: None,
            source: LocationSource::Gps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_document_fields() {
        let raw: RawLocationFields = serde_json::from_str(r#"{"lat":24.7,"lng":46.7}"#).unwrap();
        let location = raw.into_location("bus_1").unwrap();
        assert_eq!(location.coordinates, Some(Coordinates::new(24.7, 46.7)));
        assert_eq!(location.source, LocationSource::StoreDocument);
    }

    #[test]
    fn test_nested_document_coordinates() {
        let raw: RawLocationFields = serde_json::from_str(
            r#"{"coordinates":{"latitude":24.1,"longitude":46.2},"currentLocation":"Gate 2"}"#,
        )
        .unwrap();
        let location = raw.into_location("bus_1").unwrap();
        assert_eq!(location.description.as_deref(), Some("Gate 2"));
    }

    #[test]
    fn test_document_without_coordinates_is_no_result() {
        let raw: RawLocationFields =
            serde_json::from_str(r#"{"currentLocation":"School"}"#).unwrap();
        assert!(raw.into_location("bus_1").is_none());
    }

    #[test]
    fn test_gps_fix_rejects_out_of_range() {
        let fix: GpsFix = serde_json::from_str(r#"{"lat":95.0,"lng":46.7}"#).unwrap();
        assert!(fix.into_location("bus_1").is_none());
    }

    #[test]
    fn test_unavailable_fallback() {
        let location = Location::unavailable("bus_1");
        assert!(!location.is_available());
        assert!(location.coordinates.is_none());
    }
}

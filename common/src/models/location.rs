//! Geographic models.

use serde::{Deserialize, Serialize};

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A named place that may or may not have been geocoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedLocation {
    pub name: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

impl NamedLocation {
    pub fn new(name: impl Into<String>, coordinates: Option<Coordinates>) -> Self {
        Self {
            name: name.into(),
            coordinates,
        }
    }
}

/// Closest known location to a reference point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestLocation {
    pub name: String,
    pub distance_km: f64,
    pub coordinates: Coordinates,
}

//! Great-circle distance helpers.

use crate::models::location::{Coordinates, NamedLocation, NearestLocation};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const MILES_PER_KM: f64 = 0.621371;

/// Converts kilometres to miles.
pub fn km_to_miles(km: f64) -> f64 {
    km * MILES_PER_KM
}

/// Haversine distance between two points, in kilometres, on a spherical Earth.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Finds the closest location to `point`. Entries without coordinates are skipped.
///
/// Ties keep the first location encountered.
pub fn nearest_location(point: Coordinates, locations: &[NamedLocation]) -> Option<NearestLocation> {
    let mut nearest: Option<NearestLocation> = None;
    for location in locations {
        let Some(coords) = location.coordinates else {
            continue;
        };
        let distance = haversine_km(point, coords);
        let closer = nearest
            .as_ref()
            .map_or(true, |current| distance < current.distance_km);
        if closer {
            nearest = Some(NearestLocation {
                name: location.name.clone(),
                distance_km: distance,
                coordinates: coords,
            });
        }
    }
    nearest
}

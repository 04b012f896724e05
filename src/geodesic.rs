//! Great-circle distance between track points.
//!
//! Uses the haversine formula on a sphere. Inputs are plain degrees; callers
//! are trusted to pass real coordinates.

use geo::Point;

/// Sphere radius used for every distance in this crate, in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in metres between two lat/lon pairs (degrees).
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Same as [`distance_m`] for `geo` points (x = longitude, y = latitude).
pub fn distance_between(a: Point<f64>, b: Point<f64>) -> f64 {
    distance_m(a.y(), a.x(), b.y(), b.x())
}

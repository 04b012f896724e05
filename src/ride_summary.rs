//! Ride summary: distance, duration and speed figures for one ride.

use serde::Serialize;

use crate::enrichment::{parse_timestamp, KinematicSample, KMH_PER_MS};

/// Headline numbers for one ride.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RideSummary {
    pub points: usize,
    pub distance_km: f64,
    pub duration_s: f64,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub samples_with_power: usize,
}

pub fn summarize(samples: &[KinematicSample]) -> RideSummary {
    let distance_m: f64 = samples.iter().map(|s| s.segment_distance_m).sum();

    let mut times = samples.iter().filter_map(|s| parse_timestamp(&s.timestamp));
    let duration_s = match (times.next(), times.last()) {
        (Some(first), Some(last)) => last.signed_duration_since(first).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    };

    let average_speed_kmh = if duration_s > 0.0 {
        distance_m / duration_s * KMH_PER_MS
    } else {
        0.0
    };
    let max_speed_kmh = samples
        .iter()
        .map(|s| s.speed_kmh)
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);

    RideSummary {
        points: samples.len(),
        distance_km: distance_m / 1000.0,
        duration_s,
        average_speed_kmh,
        max_speed_kmh,
        samples_with_power: samples.iter().filter(|s| s.has_scorable_power()).count(),
    }
}

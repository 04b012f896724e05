//! Sample enrichment: raw track points in, kinematic samples out.
//!
//! Each sample after the first gets the haversine distance to its
//! predecessor, the elapsed time between the two timestamps and the
//! resulting speed. Bad or duplicate timestamps never abort a ride; the
//! affected pair just keeps a speed of zero. The first point of a new track
//! segment starts at rest, so a pause between segments is not read as motion.

use chrono::{DateTime, NaiveDateTime, Utc};
use geo::{point, Point};
use serde::Serialize;
use tracing::warn;

use crate::geodesic::distance_between;

/// m/s -> km/h
pub const KMH_PER_MS: f64 = 3.6;

/// Layout accepted when a timestamp is not full RFC 3339.
const FALLBACK_TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One decoded track point, as produced by the track reader.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    pub timestamp: String,
    pub power_w: f64,
    pub cadence_rpm: f64,
    /// First point of a track segment after the first one
    pub starts_segment: bool,
}

impl RawSample {
    pub fn position(&self) -> Point<f64> {
        point!(x: self.longitude, y: self.latitude)
    }
}

/// A raw sample plus the kinematics derived from its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KinematicSample {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    pub timestamp: String,
    pub power_w: f64,
    pub cadence_rpm: f64,
    pub segment_distance_m: f64,
    pub elapsed_s: f64,
    pub speed_kmh: f64,
}

impl KinematicSample {
    fn at_rest(raw: &RawSample) -> Self {
        KinematicSample {
            latitude: raw.latitude,
            longitude: raw.longitude,
            elevation_m: raw.elevation_m,
            timestamp: raw.timestamp.clone(),
            power_w: raw.power_w,
            cadence_rpm: raw.cadence_rpm,
            segment_distance_m: 0.0,
            elapsed_s: 0.0,
            speed_kmh: 0.0,
        }
    }

    /// Power that the optimizer is allowed to score.
    pub fn has_scorable_power(&self) -> bool {
        self.power_w > 0.0 && self.power_w.is_finite()
    }
}

/// Parse a track timestamp. RFC 3339 first, then the bare `Z` layout.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, FALLBACK_TIME_LAYOUT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Seconds between two timestamps, or 0.0 if either fails to parse.
fn elapsed_seconds(from: &str, to: &str) -> f64 {
    match (parse_timestamp(from), parse_timestamp(to)) {
        (Some(t1), Some(t2)) => t2.signed_duration_since(t1).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    }
}

/// Derive speed, segment distance and elapsed time for every sample.
///
/// The output has the same length and order as the input.
pub fn enrich_samples(raw: &[RawSample]) -> Vec<KinematicSample> {
    let mut enriched = Vec::with_capacity(raw.len());
    let mut unparseable = 0usize;

    for (i, sample) in raw.iter().enumerate() {
        let mut current = KinematicSample::at_rest(sample);

        if i > 0 && !sample.starts_segment {
            let prev = &raw[i - 1];
            let distance = distance_between(prev.position(), sample.position());
            if parse_timestamp(&sample.timestamp).is_none() {
                unparseable += 1;
            }
            let elapsed = elapsed_seconds(&prev.timestamp, &sample.timestamp);

            current.segment_distance_m = distance;
            current.elapsed_s = elapsed;
            if elapsed != 0.0 {
                current.speed_kmh = (distance / elapsed) * KMH_PER_MS;
            }
        }

        enriched.push(current);
    }

    if unparseable > 0 {
        warn!(unparseable, "timestamps could not be parsed, speed left at 0 for those points");
    }

    enriched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(lat: f64, lon: f64, timestamp: &str) -> RawSample {
        RawSample {
            latitude: lat,
            longitude: lon,
            elevation_m: 100.0,
            timestamp: timestamp.to_string(),
            power_w: 200.0,
            cadence_rpm: 90.0,
            starts_segment: false,
        }
    }

    #[test]
    fn test_first_sample_has_zero_speed() {
        let samples = enrich_samples(&[
            raw(45.0, 7.0, "2024-05-01T08:00:00Z"),
            raw(45.001, 7.0, "2024-05-01T08:00:10Z"),
        ]);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].speed_kmh, 0.0);
        assert_eq!(samples[0].segment_distance_m, 0.0);
        assert!(samples[1].speed_kmh > 0.0);
    }

    #[test]
    fn test_identical_timestamps_give_zero_speed() {
        let samples = enrich_samples(&[
            raw(45.0, 7.0, "2024-05-01T08:00:00Z"),
            raw(45.001, 7.0, "2024-05-01T08:00:00Z"),
        ]);
        assert_eq!(samples[1].speed_kmh, 0.0);
        assert!(samples[1].speed_kmh.is_finite());
        assert!(samples[1].segment_distance_m > 100.0);
    }

    #[test]
    fn test_ten_km_per_hour() {
        // ~27.8 m north in 10 s
        let dlat = 27.8 / 111_194.93;
        let samples = enrich_samples(&[
            raw(45.0, 7.0, "2024-05-01T08:00:00Z"),
            raw(45.0 + dlat, 7.0, "2024-05-01T08:00:10Z"),
        ]);
        assert_eq!(samples[1].elapsed_s, 10.0);
        assert!((samples[1].speed_kmh - 10.0).abs() < 0.05, "got {}", samples[1].speed_kmh);
    }

    #[test]
    fn test_unparseable_timestamp_is_local() {
        let samples = enrich_samples(&[
            raw(45.0, 7.0, "2024-05-01T08:00:00Z"),
            raw(45.0001, 7.0, "not a time"),
            raw(45.0002, 7.0, "2024-05-01T08:00:02Z"),
            raw(45.0003, 7.0, "2024-05-01T08:00:03Z"),
        ]);
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[1].speed_kmh, 0.0);
        assert_eq!(samples[2].speed_kmh, 0.0);
        assert!(samples[3].speed_kmh > 0.0);
    }

    #[test]
    fn test_new_segment_starts_at_rest() {
        let mut resumed = raw(45.01, 7.0, "2024-05-01T09:00:00Z");
        resumed.starts_segment = true;
        let samples = enrich_samples(&[
            raw(45.0, 7.0, "2024-05-01T08:00:00Z"),
            raw(45.0001, 7.0, "2024-05-01T08:00:01Z"),
            resumed,
            raw(45.0101, 7.0, "2024-05-01T09:00:01Z"),
        ]);
        assert!(samples[1].speed_kmh > 0.0);
        assert_eq!(samples[2].speed_kmh, 0.0);
        assert_eq!(samples[2].segment_distance_m, 0.0);
        assert_eq!(samples[2].elapsed_s, 0.0);
        assert!(samples[3].speed_kmh > 0.0);
    }

    #[test]
    fn test_fractional_and_offset_timestamps() {
        assert!(parse_timestamp("2024-05-01T08:00:00.500Z").is_some());
        assert!(parse_timestamp("2024-05-01T10:00:00+02:00").is_some());
        assert_eq!(
            parse_timestamp("2024-05-01T10:00:00+02:00"),
            parse_timestamp("2024-05-01T08:00:00Z")
        );
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_carries_raw_fields() {
        let input = vec![raw(45.0, 7.0, "2024-05-01T08:00:00Z")];
        let samples = enrich_samples(&input);
        assert_eq!(samples[0].power_w, 200.0);
        assert_eq!(samples[0].cadence_rpm, 90.0);
        assert_eq!(samples[0].elevation_m, 100.0);
        assert_eq!(samples[0].timestamp, "2024-05-01T08:00:00Z");
    }

    #[test]
    fn test_empty_input() {
        assert!(enrich_samples(&[]).is_empty());
    }
}

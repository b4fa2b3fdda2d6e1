//! Speed and distance between two fixes.

use geo::{GeodesicDistance, Point};

use crate::geo_fix::GeoFix;

const MS_TO_KMH: f64 = 3.6;

/// Geodesic distance in meters on the WGS-84 ellipsoid.
pub fn distance_m(a: &GeoFix, b: &GeoFix) -> f64 {
    let from = Point::new(a.longitude, a.latitude);
    let to = Point::new(b.longitude, b.latitude);
    from.geodesic_distance(&to)
}

/// Average speed in km/h between `last` and `current`, rounded to the nearest unit.
///
/// Returns 0 when no time has elapsed or the timestamps run backwards.
pub fn calculate_speed(last: &GeoFix, current: &GeoFix) -> u32 {
    let elapsed_s = (current.timestamp - last.timestamp).num_milliseconds() as f64 / 1000.0;
    if elapsed_s <= 0.0 {
        return 0;
    }
    let speed_ms = distance_m(last, current) / elapsed_s;
    (speed_ms * MS_TO_KMH).round() as u32
}

/// A limit of `None` or 0 means unknown and is never exceeded.
pub fn speed_limit_exceeded(speed_kmh: u32, speed_limit: Option<u32>) -> bool {
    match speed_limit {
        Some(limit) if limit > 0 => speed_kmh > limit,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_speed_over_100_meters_in_10_seconds() {
        let t0 = Utc::now();
        // 0.0009 degrees of latitude is ~99.9 m at 38 N
        let last = GeoFix::new(38.0, -0.7785, t0);
        let current = GeoFix::new(38.0009, -0.7785, t0 + Duration::seconds(10));
        let distance = distance_m(&last, &current);
        assert!((distance - 100.0).abs() < 0.5, "distance {}", distance);
        assert_eq!(calculate_speed(&last, &current), 36);
    }

    #[test]
    fn test_identical_timestamps_give_zero() {
        let t0 = Utc::now();
        let last = GeoFix::new(38.1194, -0.7785, t0);
        let current = GeoFix::new(38.1200, -0.7790, t0);
        assert_eq!(calculate_speed(&last, &current), 0);
        let earlier = GeoFix::new(38.1200, -0.7790, t0 - Duration::seconds(1));
        assert_eq!(calculate_speed(&last, &earlier), 0);
    }

    #[test]
    fn test_stationary_vehicle() {
        let t0 = Utc::now();
        let last = GeoFix::new(38.1194, -0.7785, t0);
        let current = GeoFix::new(38.1194, -0.7785, t0 + Duration::seconds(1));
        assert_eq!(distance_m(&last, &current), 0.0);
        assert_eq!(calculate_speed(&last, &current), 0);
    }

    #[test]
    fn test_speed_limit_exceeded() {
        assert!(speed_limit_exceeded(95, Some(90)));
        assert!(!speed_limit_exceeded(90, Some(90)));
        assert!(!speed_limit_exceeded(200, Some(0)));
        assert!(!speed_limit_exceeded(200, None));
    }
}

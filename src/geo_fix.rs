//! Position fixes and the last/current coordinate store.

use chrono::{DateTime, Utc};

/// A decoded position stamped with the time it was received.
///
/// The coordinate pair (0, 0) is the "no fix" sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Reception time
    pub timestamp: DateTime<Utc>,
}

impl GeoFix {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self { latitude, longitude, timestamp }
    }

    /// The sentinel fix, (0, 0) at the Unix epoch.
    pub fn sentinel() -> Self {
        Self::new(0.0, 0.0, DateTime::<Utc>::default())
    }

    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// False only for the (0, 0) sentinel.
    pub fn valid_coordinates(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }
}

/// Source of fix timestamps.
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Holds the two most recent fixes.
#[derive(Debug, Default, Clone)]
pub struct CoordinateStore {
    last: Option<GeoFix>,
    current: Option<GeoFix>,
}

impl CoordinateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shifts `current` into `last` and stores `fix` as the new `current`.
    pub fn push(&mut self, fix: GeoFix) {
        self.last = self.current.replace(fix);
    }

    pub fn clear(&mut self) {
        self.last = None;
        self.current = None;
    }

    pub fn last(&self) -> Option<&GeoFix> {
        self.last.as_ref()
    }

    pub fn current(&self) -> Option<&GeoFix> {
        self.current.as_ref()
    }

    /// Both fixes, once two have been stored.
    pub fn pair(&self) -> Option<(&GeoFix, &GeoFix)> {
        Some((self.last.as_ref()?, self.current.as_ref()?))
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_sentinel_is_invalid() {
        assert!(!GeoFix::sentinel().valid_coordinates());
        let now = Utc::now();
        assert!(!GeoFix::new(0.0, 0.0, now).valid_coordinates());
        assert!(GeoFix::new(38.1194, -0.7785, now).valid_coordinates());
        assert!(GeoFix::new(0.0, -0.7785, now).valid_coordinates());
        assert!(GeoFix::new(38.1194, 0.0, now).valid_coordinates());
    }

    #[test]
    fn test_push_shifts_current_into_last() {
        let t0 = Utc::now();
        let mut store = CoordinateStore::new();
        assert!(store.is_empty());
        assert!(store.pair().is_none());

        store.push(GeoFix::new(38.1194, -0.7785, t0));
        assert!(store.last().is_none());
        assert!(store.pair().is_none());

        store.push(GeoFix::new(38.1200, -0.7790, t0 + Duration::seconds(1)));
        let (last, current) = store.pair().unwrap();
        assert_eq!(last.coordinates(), (38.1194, -0.7785));
        assert_eq!(current.coordinates(), (38.1200, -0.7790));

        store.clear();
        assert!(store.is_empty());
        assert!(store.last().is_none());
    }
}

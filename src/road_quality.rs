//! Road surface classification from vertical acceleration.
//!
//! Samples far from 1 g push a "bad" counter, samples close to it push a
//! "good" counter and drain the bad one. The road is flagged bad while the bad
//! counter is at the maximum; a full run of good samples clears it outright.
//!
//! The accelerometer driver is not part of this crate. The board integration
//! implements [`AccelSource`] for its sensor and runs
//! [`RoadQualityMonitor::run_once`] as the step of a [`crate::worker::Worker`].

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::context::{ContextStore, ContextValue};
use crate::error::Result;

/// Standard gravity in m/s²
pub const EARTH_GRAVITY: f64 = 9.80665;
/// Deviation from gravity, in m/s², that counts as a rough sample
pub const DEVIATION_THRESHOLD: f64 = 2.0;
pub const MAX_COUNTER: u32 = 5;

/// Vertical acceleration sensor.
pub trait AccelSource: Send {
    /// Acceleration along the vertical axis in m/s².
    fn vertical_acceleration(&mut self) -> Result<f64>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadQualityClassifier {
    max_counter: u32,
    good: u32,
    bad: u32,
    bad_road: bool,
}

impl Default for RoadQualityClassifier {
    fn default() -> Self {
        Self::new(MAX_COUNTER)
    }
}

impl RoadQualityClassifier {
    pub fn new(max_counter: u32) -> Self {
        Self {
            max_counter,
            good: 0,
            bad: 0,
            bad_road: false,
        }
    }

    pub fn is_bad_road(&self) -> bool {
        self.bad_road
    }

    /// Feeds one sample and returns the resulting road state.
    pub fn update(&mut self, vertical: f64) -> bool {
        if (vertical - EARTH_GRAVITY).abs() > DEVIATION_THRESHOLD {
            self.bad = self.bad.saturating_add(1);
            self.good = self.good.saturating_sub(1);
        } else {
            self.good = (self.good + 1).min(self.max_counter);
            if self.good >= self.max_counter {
                self.bad = 0;
            } else {
                self.bad = self.bad.saturating_sub(1);
            }
        }

        self.bad_road = self.bad >= self.max_counter;
        if self.bad_road {
            self.good = 0;
        }
        self.bad_road
    }
}

pub struct RoadQualityMonitor<A: AccelSource> {
    sensor: A,
    classifier: RoadQualityClassifier,
    context: Arc<ContextStore>,
    interval: Duration,
}

impl<A: AccelSource> RoadQualityMonitor<A> {
    pub fn new(sensor: A, context: Arc<ContextStore>, interval: Duration) -> Self {
        Self {
            sensor,
            classifier: RoadQualityClassifier::default(),
            context,
            interval,
        }
    }

    pub fn classifier(&self) -> &RoadQualityClassifier {
        &self.classifier
    }

    /// Takes one sample, publishes the road state and returns the pause before the next sample.
    pub fn run_once(&mut self) -> Duration {
        match self.sensor.vertical_acceleration() {
            Ok(vertical) => {
                let was_bad = self.classifier.is_bad_road();
                let bad = self.classifier.update(vertical);
                if bad != was_bad {
                    info!("Road surface is now {}", if bad { "bad" } else { "good" });
                }
                self.context.set(ContextValue::BadRoadState(bad));
            }
            Err(e) => warn!("Accelerometer read failed: {}", e),
        }
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    const SMOOTH: f64 = 9.9;
    const ROUGH: f64 = 13.5;

    #[test]
    fn test_needs_full_run_of_rough_samples() {
        let mut classifier = RoadQualityClassifier::default();
        for _ in 0..4 {
            assert!(!classifier.update(ROUGH));
        }
        assert!(classifier.update(ROUGH));
    }

    #[test]
    fn test_isolated_bumps_are_absorbed() {
        let mut classifier = RoadQualityClassifier::default();
        for _ in 0..20 {
            classifier.update(ROUGH);
            classifier.update(SMOOTH);
            classifier.update(SMOOTH);
        }
        assert!(!classifier.is_bad_road());
    }

    #[test]
    fn test_long_rough_stretch_drains_slowly() {
        let mut classifier = RoadQualityClassifier::default();
        for _ in 0..8 {
            classifier.update(5.0);
        }
        assert!(classifier.is_bad_road());
        // bad counter 8 -> 7 -> 6 -> 5 stays flagged
        for _ in 0..3 {
            assert!(classifier.update(SMOOTH));
        }
        assert!(!classifier.update(SMOOTH));
    }

    #[test]
    fn test_smooth_run_clears_bad_counter() {
        let mut classifier = RoadQualityClassifier::default();
        for _ in 0..4 {
            classifier.update(ROUGH);
        }
        for _ in 0..5 {
            classifier.update(SMOOTH);
        }
        // a full smooth run reset the bad counter, so four bumps are not enough
        for _ in 0..4 {
            assert!(!classifier.update(ROUGH));
        }
    }

    struct Samples(VecDeque<Option<f64>>);

    impl AccelSource for Samples {
        fn vertical_acceleration(&mut self) -> Result<f64> {
            match self.0.pop_front().flatten() {
                Some(sample) => Ok(sample),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "no sample").into()),
            }
        }
    }

    #[test]
    fn test_monitor_publishes_state() {
        let context = Arc::new(ContextStore::new());
        let mut samples: VecDeque<Option<f64>> = (0..5).map(|_| Some(ROUGH)).collect();
        samples.push_back(None);
        let mut monitor = RoadQualityMonitor::new(Samples(samples), context.clone(), Duration::from_millis(50));
        for _ in 0..5 {
            assert_eq!(monitor.run_once(), Duration::from_millis(50));
        }
        assert!(context.snapshot().bad_road_state);
        monitor.run_once();
        assert!(context.snapshot().bad_road_state);
        assert!(monitor.classifier().is_bad_road());
    }

    #[test]
    fn test_monitor_runs_as_worker() {
        use crate::worker::{StopSignal, Worker};
        use std::time::Instant;

        let context = Arc::new(ContextStore::new());
        let samples: VecDeque<Option<f64>> = (0..50).map(|_| Some(ROUGH)).collect();
        let mut monitor = RoadQualityMonitor::new(Samples(samples), context.clone(), Duration::from_millis(1));
        let worker = Worker::spawn("accel", StopSignal::new(), move || monitor.run_once()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !context.snapshot().bad_road_state && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(worker.stop(Duration::from_secs(2)));
        assert!(context.snapshot().bad_road_state);
    }
}

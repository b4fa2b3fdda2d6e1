//! GPS navigation state machine.
//!
//! The [`Navigator`] is driven one tick at a time. While acquiring it probes a
//! bounded number of sentences for a first usable fix; once ready it reads one
//! fix per tick, derives speed from the last two fixes and resolves the road
//! speed limit and location. Everything it learns is published to the shared
//! [`ContextStore`].
//!
//! # State machine
//! - `Acquiring { cold_start }` probes 10 sentences on a cold start and 5 when
//!   reacquiring. A round without a fix escalates the pause (1 s, 10 s, 30 s).
//! - `Ready` tolerates `failure_threshold` consecutive failed ticks before
//!   falling back to `Acquiring { cold_start: false }` with the context reset.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::NavigationConfig;
use crate::context::{ContextStore, ContextValue};
use crate::error::{NavError, Result};
use crate::geo_fix::{Clock, CoordinateStore, GeoFix, SystemClock};
use crate::network::Reachability;
use crate::nmea_parser::{self, ParseResult, PositionFix, RejectReason, Telemetry};
use crate::road_resolver::RoadResolver;
use crate::speed::{calculate_speed, speed_limit_exceeded};
use crate::worker::StopSignal;

/// A stream of raw NMEA lines.
pub trait SentenceSource: Send {
    /// Next line, or `None` when the read timed out.
    fn read_sentence(&mut self) -> Result<Option<Vec<u8>>>;

    /// Drops input buffered before this call.
    fn discard_pending(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Acquiring { cold_start: bool },
    Ready,
}

/// Why a ready tick produced no fix.
#[derive(Debug)]
enum TickFailure {
    Rejected(RejectReason),
    NoFix,
    Sentinel,
    Io(NavError),
}

impl fmt::Display for TickFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickFailure::Rejected(reason) => write!(f, "sentence rejected: {}", reason),
            TickFailure::NoFix => write!(f, "no position sentence received"),
            TickFailure::Sentinel => write!(f, "receiver reported the null position"),
            TickFailure::Io(e) => write!(f, "read error: {}", e),
        }
    }
}

pub struct Navigator<S: SentenceSource> {
    source: S,
    context: Arc<ContextStore>,
    resolver: RoadResolver,
    network: Box<dyn Reachability>,
    clock: Box<dyn Clock>,
    config: NavigationConfig,
    state: NavState,
    fixes: CoordinateStore,
    failures: u32,
    acquire_failures: u32,
}

impl<S: SentenceSource> Navigator<S> {
    pub fn new(
        source: S,
        context: Arc<ContextStore>,
        resolver: RoadResolver,
        network: Box<dyn Reachability>,
        config: NavigationConfig,
    ) -> Self {
        Self {
            source,
            context,
            resolver,
            network,
            clock: Box::new(SystemClock),
            config,
            state: NavState::Acquiring { cold_start: true },
            fixes: CoordinateStore::new(),
            failures: 0,
            acquire_failures: 0,
        }
    }

    /// Replaces the clock used to timestamp fixes.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn fixes(&self) -> &CoordinateStore {
        &self.fixes
    }

    /// Failed ticks since the last fix while ready.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Runs one step of the state machine and returns the pause before the next one.
    pub fn tick(&mut self) -> Duration {
        self.source.discard_pending();
        match self.state {
            NavState::Acquiring { cold_start } => self.acquire(cold_start),
            NavState::Ready => self.follow(),
        }
    }

    /// Ticks until `stop` is set.
    pub fn run(&mut self, stop: &StopSignal) {
        while !stop.is_stopped() {
            let pause = self.tick();
            stop.sleep(pause);
        }
    }

    fn acquire(&mut self, cold_start: bool) -> Duration {
        let probes = if cold_start {
            self.config.cold_start_probes
        } else {
            self.config.reacquire_probes
        };

        for _ in 0..probes {
            let line = match self.source.read_sentence() {
                Ok(Some(line)) => line,
                Ok(None) => continue,
                Err(e) => {
                    warn!("GPS read failed while acquiring: {}", e);
                    break;
                }
            };
            match nmea_parser::parse_bytes(&line) {
                ParseResult::ValidFix(position) => {
                    let fix = self.stamp(&position);
                    if !fix.valid_coordinates() {
                        self.context.reset_navigation();
                        continue;
                    }
                    info!(
                        "GPS fix acquired at {:.6}, {:.6} from {:?}",
                        fix.latitude, fix.longitude, position.kind
                    );
                    self.state = NavState::Ready;
                    self.fixes.clear();
                    self.fixes.push(fix);
                    self.publish_position(&position, &fix);
                    self.failures = 0;
                    self.acquire_failures = 0;
                    return self.config.tick();
                }
                ParseResult::ValidNonPositional(telemetry) => self.apply_telemetry(telemetry),
                ParseResult::Rejected(reason) => {
                    debug!("Probe rejected: {}", reason);
                    self.context.reset_navigation();
                }
            }
        }

        let pause = self.config.backoff(self.acquire_failures);
        self.acquire_failures = self.acquire_failures.saturating_add(1);
        warn!(
            "No GPS fix after {} probes (round {}), retrying in {:?}",
            probes, self.acquire_failures, pause
        );
        pause
    }

    fn follow(&mut self) -> Duration {
        let position = match self.next_position() {
            Ok(position) => position,
            Err(failure) => return self.fail(failure),
        };
        let fix = self.stamp(&position);
        if !fix.valid_coordinates() {
            self.context.reset_navigation();
            return self.fail(TickFailure::Sentinel);
        }

        self.fixes.push(fix);
        self.publish_position(&position, &fix);
        self.failures = 0;

        let Some((last, current)) = self.fixes.pair().map(|(l, c)| (*l, *c)) else {
            return self.config.tick();
        };
        if !last.valid_coordinates() {
            self.context.reset_navigation();
            return self.fail(TickFailure::Sentinel);
        }

        let speed = calculate_speed(&last, &current);
        self.context.set(ContextValue::Speed(Some(speed)));
        self.context.set(ContextValue::VehicleStopped(speed == 0));

        let online = self.network.is_online();
        let resolution = self.resolver.resolve(&current, online);
        if speed_limit_exceeded(speed, resolution.speed_limit) {
            info!("Speed {} km/h above the {:?} km/h limit", speed, resolution.speed_limit);
        }
        debug!(
            "Speed {} km/h, limit {:?}, location '{}' ({})",
            speed,
            resolution.speed_limit,
            resolution.location,
            if online { "online" } else { "offline" }
        );
        self.context.set(ContextValue::SpeedLimit(resolution.speed_limit));
        self.context.set(ContextValue::Location(resolution.location));
        self.config.tick()
    }

    /// Reads until a positional sentence shows up, a sentence is rejected or the
    /// per-tick budget runs out. Timeouts spend budget.
    fn next_position(&mut self) -> std::result::Result<PositionFix, TickFailure> {
        for _ in 0..self.config.max_sentences_per_tick {
            let line = match self.source.read_sentence() {
                Ok(Some(line)) => line,
                Ok(None) => continue,
                Err(e) => return Err(TickFailure::Io(e)),
            };
            match nmea_parser::parse_bytes(&line) {
                ParseResult::ValidFix(position) => return Ok(position),
                ParseResult::ValidNonPositional(telemetry) => self.apply_telemetry(telemetry),
                ParseResult::Rejected(reason) => return Err(TickFailure::Rejected(reason)),
            }
        }
        Err(TickFailure::NoFix)
    }

    fn fail(&mut self, failure: TickFailure) -> Duration {
        self.failures += 1;
        warn!(
            "GPS tick failed ({}/{}): {}",
            self.failures, self.config.failure_threshold, failure
        );
        if self.failures < self.config.failure_threshold {
            return self.config.tick();
        }

        info!("GPS fix stream lost, reacquiring");
        self.state = NavState::Acquiring { cold_start: false };
        self.context.reset_navigation();
        self.fixes.clear();
        self.failures = 0;
        self.acquire_failures = 0;
        self.config.backoff(0)
    }

    fn apply_telemetry(&self, telemetry: Telemetry) {
        match telemetry {
            Telemetry::SatellitesInView(count) => {
                self.context.set(ContextValue::SatellitesInView(count));
            }
            Telemetry::Precision { pdop, .. } => self.context.set(ContextValue::Precision(pdop)),
            Telemetry::Ignored(id) => debug!("Ignoring {} sentence", id),
        }
    }

    /// Coordinates always; satellite count and HDOP only when the sentence carries them (GGA).
    fn publish_position(&self, position: &PositionFix, fix: &GeoFix) {
        self.context.set(ContextValue::Coordinates(Some(fix.coordinates())));
        if let Some(used) = position.satellites_used {
            self.context.set(ContextValue::SatellitesUsed(used));
        }
        if position.hdop.is_some() {
            self.context.set(ContextValue::Hdop(position.hdop));
        }
    }

    fn stamp(&self, position: &PositionFix) -> GeoFix {
        GeoFix::new(position.latitude, position.longitude, self.clock.now())
    }
}

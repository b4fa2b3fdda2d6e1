//! Shared navigation context.
//!
//! One writer per field (the worker that owns it), many readers. Updates are
//! last-writer-wins per field; there is no cross-field atomicity, so readers
//! must tolerate stale or defaulted values.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::speed::speed_limit_exceeded;

/// Snapshot of everything the display and persistence consumers read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NavigationContext {
    /// Latest valid (latitude, longitude)
    pub coordinates: Option<(f64, f64)>,
    /// Current speed in km/h
    pub speed_kmh: Option<u32>,
    /// Speed limit of the current road in km/h, 0 when the road class is unknown
    pub speed_limit: Option<u32>,
    /// Human readable location, empty when unknown
    pub location: String,
    pub satellites_in_view: u8,
    /// Satellites used for the last GGA fix
    pub satellites_used: u8,
    /// Horizontal dilution of precision of the last GGA fix
    pub hdop: Option<f64>,
    /// Position dilution of precision reported by the receiver
    pub precision: f64,
    pub vehicle_stopped: bool,
    pub bad_road_state: bool,
}

impl NavigationContext {
    pub fn speed_limit_exceeded(&self) -> bool {
        self.speed_kmh
            .is_some_and(|speed| speed_limit_exceeded(speed, self.speed_limit))
    }
}

/// Field selector for keyed access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    Coordinates,
    Speed,
    SpeedLimit,
    Location,
    SatellitesInView,
    SatellitesUsed,
    Hdop,
    Precision,
    VehicleStopped,
    BadRoadState,
}

/// Typed value for a [`ContextKey`].
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Coordinates(Option<(f64, f64)>),
    Speed(Option<u32>),
    SpeedLimit(Option<u32>),
    Location(String),
    SatellitesInView(u8),
    SatellitesUsed(u8),
    Hdop(Option<f64>),
    Precision(f64),
    VehicleStopped(bool),
    BadRoadState(bool),
}

impl ContextValue {
    pub fn key(&self) -> ContextKey {
        match self {
            ContextValue::Coordinates(_) => ContextKey::Coordinates,
            ContextValue::Speed(_) => ContextKey::Speed,
            ContextValue::SpeedLimit(_) => ContextKey::SpeedLimit,
            ContextValue::Location(_) => ContextKey::Location,
            ContextValue::SatellitesInView(_) => ContextKey::SatellitesInView,
            ContextValue::SatellitesUsed(_) => ContextKey::SatellitesUsed,
            ContextValue::Hdop(_) => ContextKey::Hdop,
            ContextValue::Precision(_) => ContextKey::Precision,
            ContextValue::VehicleStopped(_) => ContextKey::VehicleStopped,
            ContextValue::BadRoadState(_) => ContextKey::BadRoadState,
        }
    }
}

/// Process-wide context shared between workers through an `Arc`.
#[derive(Debug, Default)]
pub struct ContextStore {
    inner: RwLock<NavigationContext>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking writer cannot leave a field half-written, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, NavigationContext> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, NavigationContext> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, value: ContextValue) {
        let mut ctx = self.write();
        match value {
            ContextValue::Coordinates(v) => ctx.coordinates = v,
            ContextValue::Speed(v) => ctx.speed_kmh = v,
            ContextValue::SpeedLimit(v) => ctx.speed_limit = v,
            ContextValue::Location(v) => ctx.location = v,
            ContextValue::SatellitesInView(v) => ctx.satellites_in_view = v,
            ContextValue::SatellitesUsed(v) => ctx.satellites_used = v,
            ContextValue::Hdop(v) => ctx.hdop = v,
            ContextValue::Precision(v) => ctx.precision = v,
            ContextValue::VehicleStopped(v) => ctx.vehicle_stopped = v,
            ContextValue::BadRoadState(v) => ctx.bad_road_state = v,
        }
    }

    /// Current value of `key`; fields that were never written hold their default.
    pub fn get(&self, key: ContextKey) -> ContextValue {
        let ctx = self.read();
        match key {
            ContextKey::Coordinates => ContextValue::Coordinates(ctx.coordinates),
            ContextKey::Speed => ContextValue::Speed(ctx.speed_kmh),
            ContextKey::SpeedLimit => ContextValue::SpeedLimit(ctx.speed_limit),
            ContextKey::Location => ContextValue::Location(ctx.location.clone()),
            ContextKey::SatellitesInView => ContextValue::SatellitesInView(ctx.satellites_in_view),
            ContextKey::SatellitesUsed => ContextValue::SatellitesUsed(ctx.satellites_used),
            ContextKey::Hdop => ContextValue::Hdop(ctx.hdop),
            ContextKey::Precision => ContextValue::Precision(ctx.precision),
            ContextKey::VehicleStopped => ContextValue::VehicleStopped(ctx.vehicle_stopped),
            ContextKey::BadRoadState => ContextValue::BadRoadState(ctx.bad_road_state),
        }
    }

    pub fn snapshot(&self) -> NavigationContext {
        self.read().clone()
    }

    /// Resets the fields derived from GPS fixes to their placeholder values.
    ///
    /// GSV/GSA telemetry (satellites in view, precision) and the road surface
    /// flag are owned by other producers and left untouched.
    pub fn reset_navigation(&self) {
        let mut ctx = self.write();
        ctx.coordinates = None;
        ctx.speed_kmh = None;
        ctx.speed_limit = None;
        ctx.location.clear();
        ctx.vehicle_stopped = false;
        ctx.satellites_used = 0;
        ctx.hdop = None;
    }
}

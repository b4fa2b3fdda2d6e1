//! Runtime configuration.
//!
//! Loaded from a JSON settings file; every section and field falls back to its
//! default, so `{}` is a valid configuration. Command line flags override the
//! file in `main.rs`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{NavError, Result};

/// Serial link to the GPS receiver
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout for one line
    pub timeout_ms: u64,
    /// Delay between attempts to open the port
    pub open_retry_secs: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyAMA4".into(),
            baud_rate: 9600,
            timeout_ms: 500,
            open_retry_secs: 30,
        }
    }
}

/// Acquisition and readiness tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Sentences probed per tick after a cold start
    pub cold_start_probes: usize,
    /// Sentences probed per tick after losing the fix stream
    pub reacquire_probes: usize,
    /// Consecutive failed ticks tolerated while ready
    pub failure_threshold: u32,
    /// Upper bound of sentences read in one ready tick
    pub max_sentences_per_tick: usize,
    /// Baseline pause between ticks
    pub tick_secs: u64,
    /// Escalating pauses after failed acquisition rounds
    pub backoff_secs: Vec<u64>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            cold_start_probes: 10,
            reacquire_probes: 5,
            failure_threshold: 3,
            max_sentences_per_tick: 8,
            tick_secs: 1,
            backoff_secs: vec![1, 10, 30],
        }
    }
}

impl NavigationConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Pause after `failures` consecutive failed rounds, saturating at the last step.
    pub fn backoff(&self, failures: u32) -> Duration {
        let step = (failures as usize).min(self.backoff_secs.len().saturating_sub(1));
        self.backoff_secs
            .get(step)
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or_else(|| self.tick())
    }
}

/// Reachability probe
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub probe_host: String,
    pub probe_port: u16,
    pub probe_timeout_ms: u64,
    /// Never use the online geocoder
    pub force_offline: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_host: "8.8.8.8".into(),
            probe_port: 53,
            probe_timeout_ms: 1000,
            force_offline: false,
        }
    }
}

/// Online reverse geocoder
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub language: String,
    pub timeout_ms: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".into(),
            user_agent: concat!("gps-navigator/", env!("CARGO_PKG_VERSION")).into(),
            language: "es".into(),
            timeout_ms: 5000,
        }
    }
}

/// Offline road datasets
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RoadsConfig {
    pub data_dir: PathBuf,
    /// Delay before retrying a province dataset that failed to load
    pub load_retry_secs: u64,
}

impl Default for RoadsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            load_retry_secs: 30,
        }
    }
}

/// Worker supervision
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long to wait for a worker thread to exit after a stop request
    pub stop_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { stop_timeout_secs: 2 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub navigation: NavigationConfig,
    pub network: NetworkConfig,
    pub geocoder: GeocoderConfig,
    pub roads: RoadsConfig,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(NavError::Config("serial port path is empty".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(NavError::Config("baud rate must be positive".into()));
        }
        let nav = &self.navigation;
        if nav.cold_start_probes == 0 || nav.reacquire_probes == 0 || nav.max_sentences_per_tick == 0 {
            return Err(NavError::Config("sentence probe counts must be positive".into()));
        }
        if nav.failure_threshold == 0 {
            return Err(NavError::Config("failure threshold must be positive".into()));
        }
        if nav.backoff_secs.is_empty() {
            return Err(NavError::Config("backoff schedule is empty".into()));
        }
        Ok(())
    }
}

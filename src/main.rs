//! Onboard navigation service.
//!
//! Runs the GPS worker against the configured serial receiver and reports the
//! shared navigation context periodically until the optional run time elapses.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command, value_parser};
use log::{info, warn};

use gps_navigator::config::Config;
use gps_navigator::context::{ContextStore, NavigationContext};
use gps_navigator::geocoder::{NominatimGeocoder, ReverseGeocoder};
use gps_navigator::navigation::Navigator;
use gps_navigator::network::{AlwaysOffline, Reachability, TcpProbe};
use gps_navigator::road_resolver::RoadResolver;
use gps_navigator::road_store::{JsonRoadStore, RoadStore};
use gps_navigator::serial_source::SerialNmeaSource;
use gps_navigator::worker::{StopSignal, Worker};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    let matches = Command::new("GPS Navigator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reads a serial GPS receiver and tracks position, speed and road speed limit")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("JSON settings file (defaults are used when omitted)")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .help("Serial port of the GPS receiver")
                .value_name("PORT"),
        )
        .arg(
            Arg::new("baud")
                .long("baud")
                .help("Serial baud rate")
                .value_name("RATE")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .help("Directory holding the offline road datasets")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .help("Never use the online reverse geocoder")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("run-for")
                .long("run-for")
                .help("Stop after this many seconds (runs until killed otherwise)")
                .value_name("SECS")
                .value_parser(value_parser!(u64)),
        )
        .get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load configuration from {}", path))?,
        None => Config::default(),
    };
    if let Some(port) = matches.get_one::<String>("port") {
        config.serial.port = port.clone();
    }
    if let Some(baud) = matches.get_one::<u32>("baud") {
        config.serial.baud_rate = *baud;
    }
    if let Some(dir) = matches.get_one::<String>("data-dir") {
        config.roads.data_dir = PathBuf::from(dir);
    }
    if matches.get_flag("offline") {
        config.network.force_offline = true;
    }
    config.validate().context("Invalid configuration")?;
    let run_for = matches.get_one::<u64>("run-for").map(|secs| Duration::from_secs(*secs));

    let context = Arc::new(ContextStore::new());
    let store: Option<Box<dyn RoadStore>> = match JsonRoadStore::open(&config.roads.data_dir) {
        Ok(store) => {
            info!("Offline road data: {} municipalities", store.municipalities().len());
            Some(Box::new(store))
        }
        Err(e) => {
            warn!("Offline road data unavailable in {}: {}", config.roads.data_dir.display(), e);
            None
        }
    };
    let mut geocoder: Option<Box<dyn ReverseGeocoder>> = None;
    let mut network: Box<dyn Reachability> = Box::new(AlwaysOffline);
    if config.network.force_offline {
        info!("Forced offline, using offline road data only");
    } else {
        geocoder = Some(Box::new(NominatimGeocoder::new(&config.geocoder)));
        network = Box::new(TcpProbe::new(&config.network));
    }

    let mut navigator = Navigator::new(
        SerialNmeaSource::new(config.serial.clone()),
        context.clone(),
        RoadResolver::new(geocoder, store).with_load_retry(Duration::from_secs(config.roads.load_retry_secs)),
        network,
        config.navigation.clone(),
    );
    let gps = Worker::spawn("gps", StopSignal::new(), move || navigator.tick()).context("Failed to start GPS worker")?;
    info!("Navigation started on {} at {} baud", config.serial.port, config.serial.baud_rate);

    let started = Instant::now();
    loop {
        let pause = match run_for {
            Some(limit) => match limit.checked_sub(started.elapsed()) {
                Some(remaining) if !remaining.is_zero() => STATUS_INTERVAL.min(remaining),
                _ => break,
            },
            None => STATUS_INTERVAL,
        };
        thread::sleep(pause);
        report(&context.snapshot());
    }

    info!("Stopping navigation");
    gps.stop(Duration::from_secs(config.worker.stop_timeout_secs));
    Ok(())
}

fn report(ctx: &NavigationContext) {
    let position = match ctx.coordinates {
        Some((lat, lon)) => format!("{:.6}, {:.6}", lat, lon),
        None => "no fix".to_string(),
    };
    let speed = ctx.speed_kmh.map_or_else(|| "-".to_string(), |s| s.to_string());
    let limit = ctx.speed_limit.map_or_else(|| "-".to_string(), |l| l.to_string());
    info!(
        "Position {} | {} km/h (limit {}){} | {} | satellites {} | PDOP {:.1}{}{}",
        position,
        speed,
        limit,
        if ctx.speed_limit_exceeded() { " OVER LIMIT" } else { "" },
        if ctx.location.is_empty() { "unknown location" } else { ctx.location.as_str() },
        ctx.satellites_in_view,
        ctx.precision,
        if ctx.vehicle_stopped { " | stopped" } else { "" },
        if ctx.bad_road_state { " | bad road" } else { "" },
    );
}

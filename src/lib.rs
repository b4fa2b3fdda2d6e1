//! GPS acquisition and navigation core for an onboard vehicle unit.
//!
//! Reads NMEA-0183 sentences from a serial GPS receiver, keeps the last two
//! valid fixes, derives speed and resolves the speed limit and a readable
//! location for the current road, either through an online reverse geocoder
//! or from offline road datasets. Results are published to a shared
//! [`context::ContextStore`] read by display and persistence consumers.
//!
//! # Usage
//! ```no_run
//! use std::sync::Arc;
//! use gps_navigator::config::Config;
//! use gps_navigator::context::ContextStore;
//! use gps_navigator::navigation::Navigator;
//! use gps_navigator::network::AlwaysOffline;
//! use gps_navigator::road_resolver::RoadResolver;
//! use gps_navigator::serial_source::SerialNmeaSource;
//!
//! let config = Config::default();
//! let context = Arc::new(ContextStore::new());
//! let mut navigator = Navigator::new(
//!     SerialNmeaSource::new(config.serial.clone()),
//!     context.clone(),
//!     RoadResolver::new(None, None),
//!     Box::new(AlwaysOffline),
//!     config.navigation.clone(),
//! );
//! let pause = navigator.tick();
//! println!("{:?}, next tick in {:?}", context.snapshot(), pause);
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod geo_fix;
pub mod geocoder;
pub mod navigation;
pub mod network;
pub mod nmea_parser;
pub mod road_quality;
pub mod road_resolver;
pub mod road_store;
pub mod serial_source;
pub mod speed;
pub mod worker;

pub use error::{NavError, Result};

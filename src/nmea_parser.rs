//! NMEA-0183 Sentence Parser
//!
//! This module decodes single NMEA sentences read from a GPS receiver into typed
//! results. Each line is classified as a usable position fix, a non-positional
//! update (satellites in view, dilution of precision) or a rejection carrying
//! the reason. Parsing never fails with an error and never panics: malformed,
//! truncated or low-quality input is reported as [`ParseResult::Rejected`].
//!
//! # Features
//! - Parses GGA, GLL, RMC, GSV and GSA sentences from any talker (GP, GN, GL, GA, GB, BD)
//! - Gates fixes on the GGA fix indicator, the GLL status and the GLL/RMC mode indicator
//! - Verifies the `*hh` checksum when the sentence carries one
//! - Provides utility functions for latitude/longitude parsing
//!
//! # Usage
//!
//! ```rust
//! use gps_navigator::nmea_parser::{parse, ParseResult};
//! match parse("$GPGGA,123519,3807.1640,N,00046.7100,W,1,08,0.9,545.4,M,46.9,M,,*5C") {
//!     ParseResult::ValidFix(fix) => println!("Position: {}, {}", fix.latitude, fix.longitude),
//!     ParseResult::ValidNonPositional(update) => println!("Update: {:?}", update),
//!     ParseResult::Rejected(reason) => println!("Rejected: {}", reason),
//! }
//! ```

use std::fmt;

/// Sentence types understood by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentenceKind {
    /// Global positioning system fix data
    Gga,
    /// Geographic position, latitude/longitude
    Gll,
    /// Recommended minimum specific GNSS data
    Rmc,
    /// Satellites in view
    Gsv,
    /// DOP and active satellites
    Gsa,
    /// Any other sentence, carrying its identifier
    Unknown(String),
}

impl SentenceKind {
    /// Classifies a sentence identifier such as `GPGGA` or `GNRMC`.
    fn from_id(id: &str) -> Self {
        if id.len() != 5 || !id.is_ascii() {
            return SentenceKind::Unknown(id.to_string());
        }
        match &id[2..] {
            "GGA" => SentenceKind::Gga,
            "GLL" => SentenceKind::Gll,
            "RMC" => SentenceKind::Rmc,
            "GSV" => SentenceKind::Gsv,
            "GSA" => SentenceKind::Gsa,
            _ => SentenceKind::Unknown(id.to_string()),
        }
    }
}

/// GGA fix quality indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixQuality {
    Invalid,
    /// Standard positioning service
    Sps,
    /// Differential GPS
    Differential,
    /// Precise positioning service
    Pps,
    /// Real time kinematic
    Rtk,
    FloatRtk,
    /// Dead reckoning
    Estimated,
    Manual,
    Simulation,
}

impl FixQuality {
    fn from_field(field: &str) -> Option<Self> {
        match field {
            "0" => Some(FixQuality::Invalid),
            "1" => Some(FixQuality::Sps),
            "2" => Some(FixQuality::Differential),
            "3" => Some(FixQuality::Pps),
            "4" => Some(FixQuality::Rtk),
            "5" => Some(FixQuality::FloatRtk),
            "6" => Some(FixQuality::Estimated),
            "7" => Some(FixQuality::Manual),
            "8" => Some(FixQuality::Simulation),
            _ => None,
        }
    }

    /// Only SPS, differential and PPS fixes are trusted for navigation.
    pub fn is_accepted(self) -> bool {
        matches!(self, FixQuality::Sps | FixQuality::Differential | FixQuality::Pps)
    }
}

/// GLL/RMC positioning mode indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositioningMode {
    Autonomous,
    Differential,
    Estimated,
    Manual,
    Simulation,
    NotValid,
}

impl PositioningMode {
    fn from_field(field: &str) -> Option<Self> {
        match field {
            "A" => Some(PositioningMode::Autonomous),
            "D" => Some(PositioningMode::Differential),
            "E" => Some(PositioningMode::Estimated),
            "M" => Some(PositioningMode::Manual),
            "S" => Some(PositioningMode::Simulation),
            "N" => Some(PositioningMode::NotValid),
            _ => None,
        }
    }
}

/// A position decoded from a GGA, GLL or RMC sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    /// Sentence the position was decoded from
    pub kind: SentenceKind,
    /// Latitude in decimal degrees, negative south of the equator
    pub latitude: f64,
    /// Longitude in decimal degrees, negative west of Greenwich
    pub longitude: f64,
    /// Number of satellites used for the fix (GGA only)
    pub satellites_used: Option<u8>,
    /// Fix quality indicator (GGA only)
    pub fix_quality: Option<FixQuality>,
    /// Horizontal dilution of precision (GGA only)
    pub hdop: Option<f64>,
}

/// Receiver state carried by sentences that do not report a position.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    /// Total satellites in view (GSV)
    SatellitesInView(u8),
    /// Dilution of precision values (GSA)
    Precision {
        pdop: f64,
        hdop: Option<f64>,
        vdop: Option<f64>,
    },
    /// A well-formed sentence this parser does not interpret
    Ignored(String),
}

/// Why a line did not produce a usable result.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NotUtf8,
    MissingPrefix,
    EmptyTalker,
    BadChecksum,
    Truncated(SentenceKind),
    InvalidFix(String),
    InvalidStatus(String),
    InvalidMode(String),
    InvalidOperationalMode(String),
    EmptySatelliteCount,
    Malformed(&'static str),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotUtf8 => write!(f, "sentence is not valid UTF-8"),
            RejectReason::MissingPrefix => write!(f, "sentence does not start with '$'"),
            RejectReason::EmptyTalker => write!(f, "empty talker field"),
            RejectReason::BadChecksum => write!(f, "checksum mismatch"),
            RejectReason::Truncated(kind) => write!(f, "truncated {:?} sentence", kind),
            RejectReason::InvalidFix(v) => write!(f, "fix indicator '{}' not accepted", v),
            RejectReason::InvalidStatus(v) => write!(f, "status '{}' not valid", v),
            RejectReason::InvalidMode(v) => write!(f, "mode '{}' not accepted", v),
            RejectReason::InvalidOperationalMode(v) => write!(f, "operational mode '{}' has no fix", v),
            RejectReason::EmptySatelliteCount => write!(f, "satellites in view field is empty"),
            RejectReason::Malformed(field) => write!(f, "malformed {}", field),
        }
    }
}

/// Outcome of parsing one line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    ValidFix(PositionFix),
    ValidNonPositional(Telemetry),
    Rejected(RejectReason),
}

impl ParseResult {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ParseResult::Rejected(_))
    }
}

/// Parses a raw line as read from the serial port.
///
/// Bytes that are not valid UTF-8 are rejected instead of being decoded lossily.
pub fn parse_bytes(raw: &[u8]) -> ParseResult {
    match std::str::from_utf8(raw) {
        Ok(line) => parse(line),
        Err(_) => ParseResult::Rejected(RejectReason::NotUtf8),
    }
}

/// Parses a single NMEA sentence, with or without its trailing CR/LF.
///
/// # Arguments
/// * `line` - A string slice containing one NMEA sentence.
///
/// # Example
/// ```
/// use gps_navigator::nmea_parser::parse;
/// let result = parse("$GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00*74");
/// assert!(!result.is_rejected());
/// ```
pub fn parse(line: &str) -> ParseResult {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(sentence) = line.strip_prefix('$') else {
        return ParseResult::Rejected(RejectReason::MissingPrefix);
    };
    let body = match split_checksum(sentence) {
        Ok(body) => body,
        Err(reason) => return ParseResult::Rejected(reason),
    };
    let parts: Vec<&str> = body.split(',').collect();
    let id = parts[0];
    if id.is_empty() {
        return ParseResult::Rejected(RejectReason::EmptyTalker);
    }
    match SentenceKind::from_id(id) {
        SentenceKind::Gga => into_fix_result(decode_gga(&parts)),
        SentenceKind::Gll => into_fix_result(decode_gll(&parts)),
        SentenceKind::Rmc => into_fix_result(decode_rmc(&parts)),
        SentenceKind::Gsv => into_update_result(decode_gsv(&parts)),
        SentenceKind::Gsa => into_update_result(decode_gsa(&parts)),
        SentenceKind::Unknown(id) => ParseResult::ValidNonPositional(Telemetry::Ignored(id)),
    }
}

/// Strips and verifies the `*hh` suffix. Sentences without one are accepted as-is.
fn split_checksum(sentence: &str) -> Result<&str, RejectReason> {
    let Some((body, checksum)) = sentence.rsplit_once('*') else {
        return Ok(sentence);
    };
    let expected = u8::from_str_radix(checksum.trim(), 16).map_err(|_| RejectReason::BadChecksum)?;
    let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
    if actual == expected {
        Ok(body)
    } else {
        Err(RejectReason::BadChecksum)
    }
}

fn field<'a>(parts: &[&'a str], index: usize, kind: SentenceKind) -> Result<&'a str, RejectReason> {
    parts.get(index).copied().ok_or(RejectReason::Truncated(kind))
}

/// Decodes a GGA sentence. Field positions: 2-5 coordinates, 6 fix indicator,
/// 7 satellites used, 8 HDOP.
fn decode_gga(parts: &[&str]) -> Result<PositionFix, RejectReason> {
    let indicator = field(parts, 6, SentenceKind::Gga)?;
    let quality = FixQuality::from_field(indicator)
        .filter(|q| q.is_accepted())
        .ok_or_else(|| RejectReason::InvalidFix(indicator.to_string()))?;
    let (latitude, longitude) = decode_position(parts, 2, SentenceKind::Gga)?;
    let satellites_used = field(parts, 7, SentenceKind::Gga)?.parse().ok();
    let hdop = parts.get(8).and_then(|s| s.parse().ok());
    Ok(PositionFix {
        kind: SentenceKind::Gga,
        latitude,
        longitude,
        satellites_used,
        fix_quality: Some(quality),
        hdop,
    })
}

/// Decodes a GLL sentence. Field positions: 1-4 coordinates, 6 status, 7 mode.
fn decode_gll(parts: &[&str]) -> Result<PositionFix, RejectReason> {
    let status = field(parts, 6, SentenceKind::Gll)?;
    if status != "A" {
        return Err(RejectReason::InvalidStatus(status.to_string()));
    }
    check_mode(field(parts, 7, SentenceKind::Gll)?)?;
    let (latitude, longitude) = decode_position(parts, 1, SentenceKind::Gll)?;
    Ok(position_only(SentenceKind::Gll, latitude, longitude))
}

/// Decodes an RMC sentence. Field positions: 3-6 coordinates, 12 mode.
fn decode_rmc(parts: &[&str]) -> Result<PositionFix, RejectReason> {
    check_mode(field(parts, 12, SentenceKind::Rmc)?)?;
    let (latitude, longitude) = decode_position(parts, 3, SentenceKind::Rmc)?;
    Ok(position_only(SentenceKind::Rmc, latitude, longitude))
}

/// Decodes a GSV sentence; only the satellites in view count (field 3) is used.
fn decode_gsv(parts: &[&str]) -> Result<Telemetry, RejectReason> {
    let in_view = field(parts, 3, SentenceKind::Gsv)?;
    if in_view.is_empty() {
        return Err(RejectReason::EmptySatelliteCount);
    }
    let count = in_view
        .parse::<u8>()
        .map_err(|_| RejectReason::Malformed("satellites in view"))?;
    Ok(Telemetry::SatellitesInView(count))
}

/// Decodes a GSA sentence. Field positions: 2 mode (1 none, 2 2D, 3 3D), 15-17 PDOP/HDOP/VDOP.
fn decode_gsa(parts: &[&str]) -> Result<Telemetry, RejectReason> {
    let mode = field(parts, 2, SentenceKind::Gsa)?;
    if mode != "2" && mode != "3" {
        return Err(RejectReason::InvalidOperationalMode(mode.to_string()));
    }
    let pdop = field(parts, 15, SentenceKind::Gsa)?
        .parse::<f64>()
        .map_err(|_| RejectReason::Malformed("PDOP"))?;
    let hdop = parts.get(16).and_then(|s| s.parse().ok());
    let vdop = parts.get(17).and_then(|s| s.parse().ok());
    Ok(Telemetry::Precision { pdop, hdop, vdop })
}

fn check_mode(mode: &str) -> Result<(), RejectReason> {
    match PositioningMode::from_field(mode) {
        Some(PositioningMode::Autonomous) => Ok(()),
        _ => Err(RejectReason::InvalidMode(mode.to_string())),
    }
}

fn position_only(kind: SentenceKind, latitude: f64, longitude: f64) -> PositionFix {
    PositionFix {
        kind,
        latitude,
        longitude,
        satellites_used: None,
        fix_quality: None,
        hdop: None,
    }
}

fn into_fix_result(decoded: Result<PositionFix, RejectReason>) -> ParseResult {
    match decoded {
        Ok(fix) => ParseResult::ValidFix(fix),
        Err(reason) => ParseResult::Rejected(reason),
    }
}

fn into_update_result(decoded: Result<Telemetry, RejectReason>) -> ParseResult {
    match decoded {
        Ok(update) => ParseResult::ValidNonPositional(update),
        Err(reason) => ParseResult::Rejected(reason),
    }
}

/// Decodes the four consecutive latitude, N/S, longitude, E/W fields starting at `first`.
fn decode_position(parts: &[&str], first: usize, kind: SentenceKind) -> Result<(f64, f64), RejectReason> {
    let lat = field(parts, first, kind.clone())?;
    let lat_hemi = field(parts, first + 1, kind.clone())?;
    let lon = field(parts, first + 2, kind.clone())?;
    let lon_hemi = field(parts, first + 3, kind)?;
    let latitude = parse_lat(lat, lat_hemi).ok_or(RejectReason::Malformed("latitude"))?;
    let longitude = parse_lon(lon, lon_hemi).ok_or(RejectReason::Malformed("longitude"))?;
    Ok((latitude, longitude))
}

/// Converts an NMEA `[d]ddmm.mmmm` value to decimal degrees.
fn degrees_minutes(value: &str) -> Option<f64> {
    let val = value.parse::<f64>().ok()?;
    if !val.is_finite() || val < 0.0 {
        return None;
    }
    let deg = (val / 100.0).floor();
    let min = val % 100.0;
    if min >= 60.0 {
        return None;
    }
    Some(deg + min / 60.0)
}

/// Parses latitude from NMEA format to decimal degrees.
///
/// # Arguments
/// * `value` - Latitude value as string (DDMM.MMMM)
/// * `hemi` - Hemisphere ("N" or "S")
///
/// # Returns
/// * `Option<f64>` - Latitude in decimal degrees
pub fn parse_lat(value: &str, hemi: &str) -> Option<f64> {
    let result = degrees_minutes(value)?;
    if result > 90.0 {
        return None;
    }
    match hemi {
        "N" => Some(result),
        "S" => Some(-result),
        _ => None,
    }
}

/// Parses longitude from NMEA format to decimal degrees.
///
/// # Arguments
/// * `value` - Longitude value as string (DDDMM.MMMM)
/// * `hemi` - Hemisphere ("E" or "W")
///
/// # Returns
/// * `Option<f64>` - Longitude in decimal degrees
pub fn parse_lon(value: &str, hemi: &str) -> Option<f64> {
    let result = degrees_minutes(value)?;
    if result > 180.0 {
        return None;
    }
    match hemi {
        "E" => Some(result),
        "W" => Some(-result),
        _ => None,
    }
}

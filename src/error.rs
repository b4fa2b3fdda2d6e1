//! Error type shared by the navigation core.
//!
//! Sentence-level problems are never errors: the parser reports them as
//! [`crate::nmea_parser::ParseResult::Rejected`]. The variants below cover the
//! collaborators (serial port, datasets, geocoder, configuration).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NavError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Geocoder error: {0}")]
    Geocoder(String),
    #[error("Dataset error: {0}")]
    Dataset(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NavError>;

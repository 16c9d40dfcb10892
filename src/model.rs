//! Md5, BagMetadata, LocationCategory, TimeOfDay, OutputRow, GeotagError
//! core data structures and error handling
//!
//! Core data types for the bag geotagging utilities.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains no I/O; the only logic is identifier validation and the
//! display names that end up in the CSV logs.

use chrono::{DateTime, Utc};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Length of a bag identifier in hex characters.
pub const MD5_HEX_LEN: usize = 32;

/// A bag identifier: a 32-character lowercase hex string.
///
/// Used as an opaque lookup key into the metadata service. It is never
/// recomputed or verified against any content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Md5(String);

impl Md5 {
    /// Returns `None` unless `s` is exactly 32 lowercase hex characters.
    pub fn parse(s: &str) -> Option<Md5> {
        let valid = s.len() == MD5_HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Md5(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Md5 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// The subset of a metadata record the drivers care about.
///
/// Produced by `ingest::metadata::fetch_metadata`. Coordinates are `None`
/// when the record has no `fdi.gps` block or when the values are not a
/// usable WGS84 position.
#[derive(Debug, Clone, PartialEq)]
pub struct BagMetadata {
    pub md5: Md5,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub collected_at: Option<DateTime<Utc>>,
    pub weather: Option<String>,
}

impl BagMetadata {
    /// Returns `(latitude, longitude)` only if both are present and valid.
    pub fn coordinate(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if is_valid_coordinate(lat, lon) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// WGS84 range check. NaN and infinities are rejected.
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

// ---------------------------------------------------------------------------
// Classifications
// ---------------------------------------------------------------------------

/// Location label derived from a reverse-geocoding response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationCategory {
    Highway,
    Urban,
    Rural,
    Unknown,
    /// The geocoder gave no response at all (HTTP or network failure).
    OutOfRange,
}

impl fmt::Display for LocationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationCategory::Highway => write!(f, "Highway"),
            LocationCategory::Urban => write!(f, "Urban"),
            LocationCategory::Rural => write!(f, "Rural"),
            LocationCategory::Unknown => write!(f, "Unknown"),
            LocationCategory::OutOfRange => write!(f, "Out of Range"),
        }
    }
}

/// Light phase at the moment a bag was collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Day,
    Night,
    Dawn,
    Dusk,
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeOfDay::Day => write!(f, "Day"),
            TimeOfDay::Night => write!(f, "Night"),
            TimeOfDay::Dawn => write!(f, "Dawn"),
            TimeOfDay::Dusk => write!(f, "Dusk"),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Column names of both CSV logs, in order.
pub const LOG_HEADER: [&str; 7] = [
    "MD5",
    "Location",
    "Times of Day",
    "Weather",
    "Latitude",
    "Longitude",
    "Mviz",
];

/// One row of a CSV log. `None` fields are written as empty cells.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub md5: Md5,
    pub location: Option<LocationCategory>,
    pub time_of_day: Option<TimeOfDay>,
    pub weather: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub viewer_url: String,
}

impl OutputRow {
    /// Cells in `LOG_HEADER` order.
    pub fn to_record(&self) -> [String; 7] {
        fn cell<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map(|v| v.to_string()).unwrap_or_default()
        }
        [
            self.md5.to_string(),
            cell(&self.location),
            cell(&self.time_of_day),
            cell(&self.weather),
            cell(&self.latitude),
            cell(&self.longitude),
            self.viewer_url.clone(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while fetching, classifying, or logging bag data.
#[derive(Debug)]
pub enum GeotagError {
    /// Non-2xx HTTP response from a remote service.
    HttpError(u16),
    /// The request could not be sent or the connection failed.
    RequestError(String),
    /// A response body or input file could not be decoded.
    ParseError(String),
    /// Reading or writing a local file failed.
    IoError(String),
    /// The configuration is missing or invalid.
    ConfigError(String),
    /// The land-boundary dataset is unusable.
    LandDataError(String),
}

impl fmt::Display for GeotagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeotagError::HttpError(code) => write!(f, "HTTP error: {}", code),
            GeotagError::RequestError(msg) => write!(f, "Request failed: {}", msg),
            GeotagError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            GeotagError::IoError(msg) => write!(f, "I/O error: {}", msg),
            GeotagError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            GeotagError::LandDataError(msg) => write!(f, "Land data error: {}", msg),
        }
    }
}

impl std::error::Error for GeotagError {}

impl From<std::io::Error> for GeotagError {
    fn from(e: std::io::Error) -> Self {
        GeotagError::IoError(e.to_string())
    }
}

impl From<reqwest::Error> for GeotagError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GeotagError::ParseError(e.to_string())
        } else {
            GeotagError::RequestError(e.to_string())
        }
    }
}

impl From<csv::Error> for GeotagError {
    fn from(e: csv::Error) -> Self {
        GeotagError::IoError(e.to_string())
    }
}

impl From<serde_json::Error> for GeotagError {
    fn from(e: serde_json::Error) -> Self {
        GeotagError::ParseError(e.to_string())
    }
}

impl From<toml::de::Error> for GeotagError {
    fn from(e: toml::de::Error) -> Self {
        GeotagError::ConfigError(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

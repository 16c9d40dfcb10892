//! Metadata Service Client
//!
//! Looks up per-bag metadata (GPS fix, collection time, weather) from the
//! internal metadata service. Bags are keyed by their MD5 identifier.
//!
//! Endpoint: `POST {endpoint}/api/v1/meta` with `{"md5_list": [...]}`,
//! authenticated with a bearer token. The response is a JSON array with one
//! record per identifier the service knows about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::MetadataConfig;
use crate::logging::{self, Source};
use crate::model::{BagMetadata, GeotagError, Md5};

const META_PATH: &str = "/api/v1/meta";

// ============================================================================
// Metadata Response Structures
// ============================================================================

/// One record of a metadata response. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MetaRecord {
    #[serde(default)]
    pub md5: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub collected_time: Option<f64>,
    #[serde(default)]
    pub fdi: Option<Fdi>,
}

/// Sensor metadata bundle.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Fdi {
    #[serde(default)]
    pub gps: Option<Gps>,
    #[serde(default)]
    pub weather: Option<Weather>,
    /// Sensor fields the drivers do not read.
    #[serde(flatten, default)]
    pub other: Map<String, Value>,
}

impl Fdi {
    /// `{}`: the service has not processed the bag yet.
    pub fn is_empty(&self) -> bool {
        self.gps.is_none() && self.weather.is_none() && self.other.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Gps {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Weather {
    #[serde(default)]
    pub weather: Option<String>,
}

#[derive(Debug, Serialize)]
struct MetaRequest<'a> {
    md5_list: Vec<&'a str>,
}

// ============================================================================
// Client
// ============================================================================

/// Anything that can answer metadata lookups for a list of identifiers.
pub trait MetadataSource {
    fn get_meta(&self, md5s: &[Md5]) -> Result<Vec<MetaRecord>, GeotagError>;
}

/// HTTP client for the metadata service.
pub struct MetadataClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: String,
}

impl MetadataClient {
    pub fn new(config: &MetadataConfig) -> Result<Self, GeotagError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if config.token.is_empty() {
            logging::warn(Source::Metadata, None, "No access token configured (set MINING_TOKEN)");
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn meta_url(&self) -> String {
        format!("{}{}", self.endpoint, META_PATH)
    }
}

impl MetadataSource for MetadataClient {
    fn get_meta(&self, md5s: &[Md5]) -> Result<Vec<MetaRecord>, GeotagError> {
        let body = MetaRequest {
            md5_list: md5s.iter().map(|m| m.as_str()).collect(),
        };

        let response = self
            .client
            .post(self.meta_url())
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            return Err(GeotagError::HttpError(response.status().as_u16()));
        }

        let records: Vec<MetaRecord> = response.json()?;
        Ok(records)
    }
}

// ============================================================================
// Fetch Helpers
// ============================================================================

/// Fetch and flatten the metadata for one bag.
///
/// Returns `None` if the call failed, the service has no record for the
/// identifier (records naming a different identifier are logged and
/// ignored), or the record's sensor bundle is missing or empty; the bag is
/// then retried on a later run. A record whose bundle lacks GPS is still
/// returned, with empty coordinates.
pub fn fetch_metadata<M: MetadataSource + ?Sized>(source: &M, md5: &Md5) -> Option<BagMetadata> {
    let records = match source.get_meta(std::slice::from_ref(md5)) {
        Ok(records) => records,
        Err(e) => {
            logging::log_fetch_failure(Source::Metadata, Some(md5.as_str()), "Metadata lookup", &e);
            return None;
        }
    };

    // A record naming this identifier wins; one that names nobody is taken
    // as the answer to the single-identifier query.
    let record = records
        .iter()
        .find(|r| r.md5.as_deref() == Some(md5.as_str()))
        .or_else(|| records.iter().find(|r| r.md5.is_none()));

    let Some(record) = record else {
        if let Some(other) = records.iter().find_map(|r| r.md5.as_deref()) {
            logging::warn(
                Source::Metadata,
                Some(md5.as_str()),
                &format!("Service answered with a record for {}; ignoring it", other),
            );
        } else {
            logging::debug(Source::Metadata, Some(md5.as_str()), "No record returned");
        }
        return None;
    };
    if record.fdi.as_ref().is_none_or(Fdi::is_empty) {
        logging::debug(Source::Metadata, Some(md5.as_str()), "No sensor metadata yet");
        return None;
    }
    Some(to_bag_metadata(md5, record))
}

/// Flatten a raw record into the fields the drivers consume.
pub fn to_bag_metadata(md5: &Md5, record: &MetaRecord) -> BagMetadata {
    let gps = record.fdi.as_ref().and_then(|f| f.gps.as_ref());
    let weather = record
        .fdi
        .as_ref()
        .and_then(|f| f.weather.as_ref())
        .and_then(|w| w.weather.clone())
        .filter(|w| !w.trim().is_empty());

    BagMetadata {
        md5: md5.clone(),
        latitude: gps.and_then(|g| g.latitude),
        longitude: gps.and_then(|g| g.longitude),
        collected_at: record.collected_time.and_then(unix_seconds_to_utc),
        weather,
    }
}

/// Converts fractional Unix seconds. Out-of-range values yield `None`.
pub fn unix_seconds_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

// ============================================================================
// Tests
// ============================================================================

//! Nominatim Reverse-Geocoding Client
//!
//! Turns a WGS84 coordinate into an OpenStreetMap place description.
//!
//! API Documentation: https://nominatim.org/release-docs/latest/api/Reverse/
//!
//! The public instance requires an identifying User-Agent and allows about
//! one request per second, so lookups go through `GeocodeCache`, which
//! memoizes answers for the lifetime of one run.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::config::GeocoderConfig;
use crate::logging::{self, Source};
use crate::model::GeotagError;

// ============================================================================
// Nominatim Response Structures
// ============================================================================

/// Reverse-geocoding answer. Every field is optional; the service returns
/// `{"error": "Unable to geocode"}` for open water and similar spots.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GeocodeResponse {
    #[serde(rename = "type", default)]
    pub place_type: Option<String>,
    #[serde(default)]
    pub address: Option<Map<String, Value>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl GeocodeResponse {
    pub fn has_address_field(&self, key: &str) -> bool {
        self.address.as_ref().is_some_and(|a| a.contains_key(key))
    }
}

// ============================================================================
// Client
// ============================================================================

pub trait ReverseGeocoder {
    fn reverse(&self, latitude: f64, longitude: f64) -> Result<GeocodeResponse, GeotagError>;
}

pub struct NominatimClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeotagError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl ReverseGeocoder for NominatimClient {
    fn reverse(&self, latitude: f64, longitude: f64) -> Result<GeocodeResponse, GeotagError> {
        let url = format!("{}/reverse", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("format", "json".to_string()),
            ])
            .header("Accept", "application/json")
            .send()?;

        if !response.status().is_success() {
            return Err(GeotagError::HttpError(response.status().as_u16()));
        }

        let body: GeocodeResponse = response.json()?;
        Ok(body)
    }
}

// ============================================================================
// Per-run Memoization
// ============================================================================

type CoordKey = (u64, u64);

/// Bounded least-recently-used memo in front of a `ReverseGeocoder`.
///
/// Failed lookups are memoized as `None` as well, so a coordinate that
/// failed once is not retried within the run.
pub struct GeocodeCache<G: ReverseGeocoder> {
    geocoder: G,
    capacity: usize,
    entries: HashMap<CoordKey, Option<GeocodeResponse>>,
    // front = least recently used
    order: VecDeque<CoordKey>,
    requests: usize,
}

impl<G: ReverseGeocoder> GeocodeCache<G> {
    pub fn new(geocoder: G, capacity: usize) -> Self {
        Self {
            geocoder,
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
            requests: 0,
        }
    }

    /// Number of calls that actually reached the geocoder.
    pub fn requests(&self) -> usize {
        self.requests
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a coordinate, calling the geocoder only on a cache miss.
    pub fn lookup(&mut self, latitude: f64, longitude: f64) -> Option<GeocodeResponse> {
        let key = (latitude.to_bits(), longitude.to_bits());

        if let Some(hit) = self.entries.get(&key).cloned() {
            self.touch(key);
            return hit;
        }

        let result = self.fetch(latitude, longitude);
        self.insert(key, result.clone());
        result
    }

    fn fetch(&mut self, latitude: f64, longitude: f64) -> Option<GeocodeResponse> {
        self.requests += 1;
        let start = Instant::now();
        let result = self.geocoder.reverse(latitude, longitude);
        logging::info(
            Source::Geocoder,
            None,
            &format!("API call took {:.2} seconds", start.elapsed().as_secs_f64()),
        );

        match result {
            Ok(body) => Some(body),
            Err(e) => {
                let op = format!("Reverse geocode ({}, {})", latitude, longitude);
                logging::log_fetch_failure(Source::Geocoder, None, &op, &e);
                None
            }
        }
    }

    fn touch(&mut self, key: CoordKey) {
        if let Some(pos) = self.order.iter().position(|k| *k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key);
    }

    fn insert(&mut self, key: CoordKey, value: Option<GeocodeResponse>) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.entries.insert(key, value);
        self.order.push_back(key);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counting {
        calls: Cell<usize>,
        fail: bool,
    }

    impl Counting {
        fn new(fail: bool) -> Self {
            Self { calls: Cell::new(0), fail }
        }
    }

    impl ReverseGeocoder for Counting {
        fn reverse(&self, _lat: f64, _lon: f64) -> Result<GeocodeResponse, GeotagError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                Err(GeotagError::HttpError(500))
            } else {
                Ok(GeocodeResponse {
                    place_type: Some("motorway".to_string()),
                    ..GeocodeResponse::default()
                })
            }
        }
    }

    #[test]
    fn test_parses_nominatim_body() {
        let body = r#"{
            "place_id": 1, "type": "motorway", "display_name": "A9",
            "address": {"road": "A9", "city": "München", "country_code": "de"}
        }"#;
        let parsed: GeocodeResponse = serde_json::from_str(body).expect("valid body");
        assert_eq!(parsed.place_type.as_deref(), Some("motorway"));
        assert!(parsed.has_address_field("city"));
        assert!(!parsed.has_address_field("village"));
    }

    #[test]
    fn test_parses_error_body() {
        let parsed: GeocodeResponse = serde_json::from_str(r#"{"error":"Unable to geocode"}"#).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("Unable to geocode"));
        assert!(parsed.address.is_none());
    }

    #[test]
    fn test_repeat_coordinate_hits_cache() {
        let mut cache = GeocodeCache::new(Counting::new(false), 10);
        assert!(cache.lookup(48.1, 11.5).is_some());
        assert!(cache.lookup(48.1, 11.5).is_some());
        assert!(cache.lookup(48.2, 11.5).is_some());
        assert_eq!(cache.requests(), 2);
        assert_eq!(cache.geocoder.calls.get(), 2);
    }

    #[test]
    fn test_failures_are_memoized() {
        let mut cache = GeocodeCache::new(Counting::new(true), 10);
        assert!(cache.lookup(1.0, 1.0).is_none());
        assert!(cache.lookup(1.0, 1.0).is_none());
        assert_eq!(cache.requests(), 1);
    }

    #[test]
    fn test_least_recently_used_entry_is_evicted() {
        let mut cache = GeocodeCache::new(Counting::new(false), 2);
        cache.lookup(1.0, 0.0);
        cache.lookup(2.0, 0.0);
        cache.lookup(1.0, 0.0); // refresh 1.0
        cache.lookup(3.0, 0.0); // evicts 2.0
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.requests(), 3);

        cache.lookup(1.0, 0.0);
        assert_eq!(cache.requests(), 3, "1.0 should still be cached");
        cache.lookup(2.0, 0.0);
        assert_eq!(cache.requests(), 4, "2.0 should have been evicted");
    }

    #[test]
    fn test_zero_capacity_disables_memo() {
        let mut cache = GeocodeCache::new(Counting::new(false), 0);
        cache.lookup(1.0, 1.0);
        cache.lookup(1.0, 1.0);
        assert_eq!(cache.requests(), 2);
        assert!(cache.is_empty());
    }
}

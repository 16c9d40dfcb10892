//! Integration tests for the batch driver
//!
//! Tests verify:
//! 1. Routing between the valid and invalid logs
//! 2. Dedup against earlier runs (idempotent re-runs)
//! 3. Per-run geocoding memo
//! 4. Interrupt flush of pending rows
//!
//! The metadata service and geocoder are replaced by in-process fakes and the
//! logs live in a temp directory, so these run offline.
//!
//! Run with: cargo test --test batch_integration

use bag_geotag::config::BatchConfig;
use bag_geotag::extract::extract_md5s;
use bag_geotag::ingest::metadata::{Fdi, Gps, MetaRecord, MetadataSource, Weather};
use bag_geotag::ingest::nominatim::{GeocodeResponse, ReverseGeocoder};
use bag_geotag::interrupt::PendingRows;
use bag_geotag::land::LandMask;
use bag_geotag::ledger::CsvLedger;
use bag_geotag::model::{GeotagError, Md5, OutputRow};
use bag_geotag::pipeline::{BatchLedgers, Enricher, RunSummary, run_batch};

use geo::{LineString, Polygon};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

const ON_LAND: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const AT_SEA: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const NO_GPS: &str = "cccccccccccccccccccccccccccccccc";
const UNKNOWN_TO_SERVICE: &str = "dddddddddddddddddddddddddddddddd";
const SAME_SPOT: &str = "eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

const MUNICH: (f64, f64) = (48.137, 11.575);
const ATLANTIC: (f64, f64) = (45.0, -30.0);

/// 2024-06-21 12:00:00 UTC
const MIDSUMMER_NOON: f64 = 1_718_971_200.0;

#[derive(Clone, Default)]
struct FakeMetadata {
    records: HashMap<String, MetaRecord>,
    calls: Rc<RefCell<Vec<String>>>,
}

impl FakeMetadata {
    fn with(mut self, md5: &str, record: MetaRecord) -> Self {
        self.records.insert(md5.to_string(), record);
        self
    }
}

impl MetadataSource for FakeMetadata {
    fn get_meta(&self, md5s: &[Md5]) -> Result<Vec<MetaRecord>, GeotagError> {
        let mut out = Vec::new();
        for md5 in md5s {
            self.calls.borrow_mut().push(md5.to_string());
            if let Some(record) = self.records.get(md5.as_str()) {
                out.push(record.clone());
            }
        }
        Ok(out)
    }
}

/// Answers "city" on land and "Unable to geocode" at sea.
#[derive(Clone, Default)]
struct FakeGeocoder {
    calls: Rc<RefCell<usize>>,
}

impl ReverseGeocoder for FakeGeocoder {
    fn reverse(&self, latitude: f64, longitude: f64) -> Result<GeocodeResponse, GeotagError> {
        *self.calls.borrow_mut() += 1;
        if (latitude, longitude) == ATLANTIC {
            return Ok(GeocodeResponse {
                error: Some("Unable to geocode".to_string()),
                ..GeocodeResponse::default()
            });
        }
        let body = serde_json::json!({"type": "residential", "address": {"city": "München"}});
        Ok(serde_json::from_value(body).expect("static body"))
    }
}

fn record(coordinate: Option<(f64, f64)>) -> MetaRecord {
    MetaRecord {
        md5: None,
        collected_time: Some(MIDSUMMER_NOON),
        fdi: Some(Fdi {
            gps: coordinate.map(|(lat, lon)| Gps { latitude: Some(lat), longitude: Some(lon) }),
            weather: Some(Weather { weather: Some("sunny".to_string()) }),
            ..Fdi::default()
        }),
    }
}

fn service() -> FakeMetadata {
    FakeMetadata::default()
        .with(ON_LAND, record(Some(MUNICH)))
        .with(AT_SEA, record(Some(ATLANTIC)))
        .with(NO_GPS, record(None))
}

/// Europe-ish box: lon 0..20, lat 40..60.
fn land() -> LandMask {
    LandMask::from_polygons(vec![Polygon::new(
        LineString::from(vec![(0.0, 40.0), (20.0, 40.0), (20.0, 60.0), (0.0, 60.0), (0.0, 40.0)]),
        vec![],
    )])
}

fn input(md5s: &[&str]) -> BTreeSet<Md5> {
    let text: String = md5s.iter().map(|m| format!(r#"{{"md5":"{}","size":1}},"#, m)).collect();
    extract_md5s(&format!("[{}]", text))
}

fn ledgers(dir: &Path) -> BatchLedgers {
    BatchLedgers {
        valid: CsvLedger::new(dir.join("valid_coordinates_log.csv")),
        invalid: CsvLedger::new(dir.join("invalid_coordinates_log.csv")),
    }
}

fn settings(size: usize) -> BatchConfig {
    BatchConfig { size, throttle_ms: 0 }
}

fn run(
    metadata: FakeMetadata,
    geocoder: FakeGeocoder,
    ledgers: &BatchLedgers,
    md5s: &BTreeSet<Md5>,
    batch_size: usize,
) -> RunSummary {
    let mut enricher = Enricher::new(metadata, geocoder, 1000, "https://viewer/?bag_md5={md5}");
    run_batch(&mut enricher, &land(), ledgers, &PendingRows::new(), md5s, &settings(batch_size))
        .expect("batch run should succeed")
}

/// Rows of a log as header-keyed maps.
fn read_rows(ledger: &CsvLedger) -> Vec<HashMap<String, String>> {
    if !ledger.path().exists() {
        return Vec::new();
    }
    let mut reader = csv::Reader::from_path(ledger.path()).unwrap();
    let headers = reader.headers().unwrap().clone();
    reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            headers.iter().map(String::from).zip(r.iter().map(String::from)).collect()
        })
        .collect()
}

fn find<'a>(rows: &'a [HashMap<String, String>], md5: &str) -> Option<&'a HashMap<String, String>> {
    rows.iter().find(|r| r["MD5"] == md5)
}

// ---------------------------------------------------------------------------
// 1. Routing
// ---------------------------------------------------------------------------

#[test]
fn test_on_land_bag_goes_to_valid_log() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    let summary = run(service(), FakeGeocoder::default(), &ledgers, &input(&[ON_LAND]), 100);

    assert_eq!(summary.valid, 1);
    let rows = read_rows(&ledgers.valid);
    let row = find(&rows, ON_LAND).expect("row in valid log");
    assert_eq!(row["Location"], "Urban");
    assert_eq!(row["Times of Day"], "Day");
    assert_eq!(row["Weather"], "sunny");
    assert_eq!(row["Latitude"], "48.137");
    assert_eq!(row["Longitude"], "11.575");
    assert_eq!(row["Mviz"], format!("https://viewer/?bag_md5={}", ON_LAND));
    assert!(read_rows(&ledgers.invalid).is_empty());
}

#[test]
fn test_off_land_bag_goes_to_invalid_log_with_classification() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    run(service(), FakeGeocoder::default(), &ledgers, &input(&[AT_SEA]), 100);

    let rows = read_rows(&ledgers.invalid);
    let row = find(&rows, AT_SEA).expect("row in invalid log");
    assert_eq!(row["Location"], "Unknown");
    assert_eq!(row["Latitude"], "45");
    assert!(!row["Times of Day"].is_empty());
    assert!(read_rows(&ledgers.valid).is_empty());
}

#[test]
fn test_missing_gps_goes_to_invalid_log_with_empty_fields() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    let geocoder = FakeGeocoder::default();
    let geocoder_calls = geocoder.calls.clone();

    run(service(), geocoder, &ledgers, &input(&[NO_GPS]), 100);

    let rows = read_rows(&ledgers.invalid);
    let row = find(&rows, NO_GPS).expect("row in invalid log");
    assert_eq!(row["Location"], "");
    assert_eq!(row["Times of Day"], "");
    assert_eq!(row["Latitude"], "");
    assert_eq!(row["Longitude"], "");
    assert_eq!(row["Weather"], "sunny");
    assert_eq!(*geocoder_calls.borrow(), 0, "no coordinate, no geocoding");
}

#[test]
fn test_bag_without_metadata_is_not_logged() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    let summary = run(service(), FakeGeocoder::default(), &ledgers, &input(&[UNKNOWN_TO_SERVICE]), 100);

    assert_eq!(summary.unavailable, 1);
    assert!(!ledgers.valid.path().exists());
    assert!(!ledgers.invalid.path().exists());
}

#[test]
fn test_bag_without_sensor_metadata_is_not_logged() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    let pending_bag = MetaRecord {
        collected_time: Some(MIDSUMMER_NOON),
        ..MetaRecord::default()
    };
    let metadata = FakeMetadata::default().with(UNKNOWN_TO_SERVICE, pending_bag);

    let summary = run(metadata, FakeGeocoder::default(), &ledgers, &input(&[UNKNOWN_TO_SERVICE]), 100);

    assert_eq!(summary, RunSummary { found: 1, already_logged: 0, valid: 0, invalid: 0, unavailable: 1 });
    assert!(!ledgers.valid.path().exists());
    assert!(!ledgers.invalid.path().exists());
}

#[test]
fn test_every_processed_bag_in_exactly_one_log() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    let all = [ON_LAND, AT_SEA, NO_GPS, UNKNOWN_TO_SERVICE];
    let summary = run(service(), FakeGeocoder::default(), &ledgers, &input(&all), 2);

    let valid = ledgers.valid.load_md5s().unwrap();
    let invalid = ledgers.invalid.load_md5s().unwrap();
    assert!(valid.is_disjoint(&invalid));
    assert_eq!(valid.len() + invalid.len(), summary.valid + summary.invalid);
    assert_eq!(summary, RunSummary { found: 4, already_logged: 0, valid: 1, invalid: 2, unavailable: 1 });
}

// ---------------------------------------------------------------------------
// 2. Dedup
// ---------------------------------------------------------------------------

#[test]
fn test_rerun_processes_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    let md5s = input(&[ON_LAND, AT_SEA, NO_GPS]);

    run(service(), FakeGeocoder::default(), &ledgers, &md5s, 100);
    let before_valid = std::fs::read_to_string(ledgers.valid.path()).unwrap();
    let before_invalid = std::fs::read_to_string(ledgers.invalid.path()).unwrap();

    let second = service();
    let calls = second.calls.clone();
    let summary = run(second, FakeGeocoder::default(), &ledgers, &md5s, 100);

    assert_eq!(summary.already_logged, 3);
    assert_eq!(summary.to_process(), 0);
    assert!(calls.borrow().is_empty(), "logged bags must not be fetched again: {:?}", calls.borrow());
    assert_eq!(std::fs::read_to_string(ledgers.valid.path()).unwrap(), before_valid);
    assert_eq!(std::fs::read_to_string(ledgers.invalid.path()).unwrap(), before_invalid);
}

#[test]
fn test_unavailable_bags_are_retried_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    let md5s = input(&[ON_LAND, UNKNOWN_TO_SERVICE]);

    run(service(), FakeGeocoder::default(), &ledgers, &md5s, 100);

    let second = service();
    let calls = second.calls.clone();
    run(second, FakeGeocoder::default(), &ledgers, &md5s, 100);
    assert_eq!(*calls.borrow(), vec![UNKNOWN_TO_SERVICE.to_string()]);
}

#[test]
fn test_dedup_reads_logs_written_by_other_tools() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    std::fs::write(
        ledgers.invalid.path(),
        format!("MD5,Location,Times of Day,Weather,Latitude,Longitude,Mviz\n{},,,,,,\n", ON_LAND),
    )
    .unwrap();

    let summary = run(service(), FakeGeocoder::default(), &ledgers, &input(&[ON_LAND]), 100);
    assert_eq!(summary.already_logged, 1);
    assert!(!ledgers.valid.path().exists());
}

// ---------------------------------------------------------------------------
// 3. Geocoding memo
// ---------------------------------------------------------------------------

#[test]
fn test_identical_coordinates_geocoded_once() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    let metadata = service().with(SAME_SPOT, record(Some(MUNICH)));
    let geocoder = FakeGeocoder::default();
    let calls = geocoder.calls.clone();

    let summary = run(metadata, geocoder, &ledgers, &input(&[ON_LAND, SAME_SPOT]), 1);

    assert_eq!(summary.valid, 2);
    assert_eq!(*calls.borrow(), 1);
}

// ---------------------------------------------------------------------------
// 4. Interrupt flush
// ---------------------------------------------------------------------------

#[test]
fn test_pending_rows_flush_to_valid_log() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    let pending = PendingRows::new();

    // what the signal handler sees if it fires between accept and write
    pending.push(OutputRow {
        md5: Md5::parse(ON_LAND).unwrap(),
        location: None,
        time_of_day: None,
        weather: None,
        latitude: Some(MUNICH.0),
        longitude: Some(MUNICH.1),
        viewer_url: String::new(),
    });
    let handler_view = pending.clone();
    assert_eq!(handler_view.flush_to(&ledgers.valid).unwrap(), 1);

    assert!(find(&read_rows(&ledgers.valid), ON_LAND).is_some());
    assert!(pending.is_empty());
}

#[test]
fn test_buffer_is_empty_after_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = ledgers(dir.path());
    let pending = PendingRows::new();
    let mut enricher = Enricher::new(service(), FakeGeocoder::default(), 1000, "{md5}");

    run_batch(&mut enricher, &land(), &ledgers, &pending, &input(&[ON_LAND, AT_SEA]), &settings(100)).unwrap();

    assert!(pending.is_empty());
    assert_eq!(ledgers.valid.load_md5s().unwrap().len(), 1);
}

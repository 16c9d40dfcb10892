//! Pre-flight Verification Module
//!
//! Checks the configured environment before a long batch run: is the
//! metadata service answering, is the geocoder answering, does the land
//! dataset load, and are the existing CSV logs well-formed.
//!
//! Used by the `check` subcommand.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::Config;
use crate::extract::extract_md5s_from_file;
use crate::ingest::metadata::{MetadataClient, MetadataSource};
use crate::ingest::nominatim::{NominatimClient, ReverseGeocoder};
use crate::land::LandMask;
use crate::ledger::CsvLedger;
use crate::model::{GeotagError, Md5};

/// Marienplatz, Munich. Reliably geocodes to a city.
pub const SAMPLE_COORDINATE: (f64, f64) = (48.1374, 11.5755);

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub metadata: ServiceVerification,
    pub geocoder: ServiceVerification,
    pub land: LandVerification,
    pub ledgers: Vec<LedgerVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub checks_total: usize,
    pub checks_working: usize,
    pub checks_failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceVerification {
    pub name: String,
    pub status: VerificationStatus,
    pub api_responsive: bool,
    /// Identifier or coordinate that was looked up.
    pub probe: String,
    pub sample_data_count: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandVerification {
    pub path: String,
    pub status: VerificationStatus,
    pub polygon_count: usize,
    /// Whether the sample coordinate tests as land.
    pub sample_on_land: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerVerification {
    pub path: String,
    pub status: VerificationStatus,
    pub exists: bool,
    pub header_ok: bool,
    pub rows: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Metadata Service Verification
// ============================================================================

/// Without a sample identifier only reachability can be tested; an empty
/// answer then counts as a partial success.
pub fn verify_metadata_source<M: MetadataSource + ?Sized>(source: &M, sample: Option<&Md5>) -> ServiceVerification {
    let mut result = ServiceVerification {
        name: "metadata".to_string(),
        status: VerificationStatus::Failed,
        api_responsive: false,
        probe: sample.map(|m| m.to_string()).unwrap_or_default(),
        sample_data_count: 0,
        error_message: None,
    };

    let query: Vec<Md5> = sample.cloned().into_iter().collect();
    match source.get_meta(&query) {
        Ok(records) => {
            result.api_responsive = true;
            result.sample_data_count = records.len();

            let with_gps = records
                .iter()
                .filter(|r| r.fdi.as_ref().and_then(|f| f.gps.as_ref()).is_some())
                .count();

            result.status = if with_gps > 0 {
                VerificationStatus::Success
            } else {
                VerificationStatus::PartialSuccess
            };
        }
        Err(e) => {
            result.error_message = Some(format!("API request failed: {}", e));
        }
    }

    result
}

// ============================================================================
// Geocoder Verification
// ============================================================================

pub fn verify_geocoder<G: ReverseGeocoder + ?Sized>(geocoder: &G, latitude: f64, longitude: f64) -> ServiceVerification {
    let mut result = ServiceVerification {
        name: "geocoder".to_string(),
        status: VerificationStatus::Failed,
        api_responsive: false,
        probe: format!("{}, {}", latitude, longitude),
        sample_data_count: 0,
        error_message: None,
    };

    match geocoder.reverse(latitude, longitude) {
        Ok(body) => {
            result.api_responsive = true;
            result.sample_data_count = body.address.as_ref().map(|a| a.len()).unwrap_or(0);

            if let Some(err) = body.error {
                result.error_message = Some(err);
                result.status = VerificationStatus::PartialSuccess;
            } else if result.sample_data_count > 0 {
                result.status = VerificationStatus::Success;
            } else {
                result.status = VerificationStatus::PartialSuccess;
            }
        }
        Err(e) => {
            result.error_message = Some(format!("API request failed: {}", e));
        }
    }

    result
}

// ============================================================================
// Local File Verification
// ============================================================================

pub fn verify_land_mask(path: &Path) -> LandVerification {
    let mut result = LandVerification {
        path: path.display().to_string(),
        status: VerificationStatus::Failed,
        polygon_count: 0,
        sample_on_land: false,
        error_message: None,
    };

    match LandMask::load(path) {
        Ok(mask) => {
            result.polygon_count = mask.len();
            result.sample_on_land = mask.contains(SAMPLE_COORDINATE.0, SAMPLE_COORDINATE.1);
            result.status = if result.sample_on_land {
                VerificationStatus::Success
            } else {
                // loads, but a city centre is not on land: wrong axis order or wrong file
                VerificationStatus::PartialSuccess
            };
        }
        Err(e) => {
            result.error_message = Some(e.to_string());
        }
    }

    result
}

/// A log that does not exist yet is fine; a log with a foreign header is not.
pub fn verify_ledger(ledger: &CsvLedger) -> LedgerVerification {
    let mut result = LedgerVerification {
        path: ledger.path().display().to_string(),
        status: VerificationStatus::Failed,
        exists: false,
        header_ok: false,
        rows: 0,
        error_message: None,
    };

    match ledger.inspect() {
        Ok(stats) => {
            result.exists = stats.exists;
            result.header_ok = stats.header_ok;
            result.rows = stats.rows;
            result.status = match (stats.exists, stats.header_ok) {
                (false, _) => VerificationStatus::PartialSuccess,
                (true, true) => VerificationStatus::Success,
                (true, false) => {
                    result.error_message = Some("Unexpected header row".to_string());
                    VerificationStatus::Failed
                }
            };
        }
        Err(e) => {
            result.error_message = Some(e.to_string());
        }
    }

    result
}

// ============================================================================
// Full Verification Runner
// ============================================================================

pub fn run_full_verification(config: &Config) -> Result<VerificationReport, GeotagError> {
    let metadata_client = MetadataClient::new(&config.metadata)?;
    let geocoder = NominatimClient::new(&config.geocoder)?;

    // First identifier of the input, if the input is there
    let sample = extract_md5s_from_file(Path::new(&config.input.path))
        .ok()
        .and_then(|set| set.into_iter().next());

    eprintln!("🔍 Verifying metadata service...");
    let metadata = verify_metadata_source(&metadata_client, sample.as_ref());
    print_status(&metadata.name, &metadata.status, metadata.error_message.as_deref());

    eprintln!("🔍 Verifying geocoder...");
    let geocoder = verify_geocoder(&geocoder, SAMPLE_COORDINATE.0, SAMPLE_COORDINATE.1);
    print_status(&geocoder.name, &geocoder.status, geocoder.error_message.as_deref());

    eprintln!("🔍 Verifying land dataset...");
    let land = verify_land_mask(Path::new(&config.land.path));
    print_status(&land.path, &land.status, land.error_message.as_deref());

    eprintln!("🔍 Verifying CSV logs...");
    let ledgers: Vec<LedgerVerification> = [&config.output.valid_log, &config.output.invalid_log]
        .into_iter()
        .map(|path| verify_ledger(&CsvLedger::new(path)))
        .collect();
    for ledger in &ledgers {
        print_status(&ledger.path, &ledger.status, ledger.error_message.as_deref());
    }

    let statuses: Vec<&VerificationStatus> = [&metadata.status, &geocoder.status, &land.status]
        .into_iter()
        .chain(ledgers.iter().map(|l| &l.status))
        .collect();
    let summary = summarize(&statuses);

    Ok(VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        metadata,
        geocoder,
        land,
        ledgers,
        summary,
    })
}

pub fn summarize(statuses: &[&VerificationStatus]) -> VerificationSummary {
    let checks_failed = statuses.iter().filter(|s| ***s == VerificationStatus::Failed).count();
    VerificationSummary {
        checks_total: statuses.len(),
        checks_working: statuses.len() - checks_failed,
        checks_failed,
    }
}

fn print_status(name: &str, status: &VerificationStatus, error: Option<&str>) {
    match status {
        VerificationStatus::Success => eprintln!("  {} ... ✓ OK", name),
        VerificationStatus::PartialSuccess => {
            eprintln!("  {} ... ⚠ Partial{}", name, error.map(|e| format!(" ({})", e)).unwrap_or_default())
        }
        VerificationStatus::Failed => eprintln!("  {} ... ✗ FAILED: {}", name, error.unwrap_or("Unknown")),
    }
}

pub fn print_summary(report: &VerificationReport) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("📊 VERIFICATION SUMMARY");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!("Metadata service: {:?}", report.metadata.status);
    println!("Geocoder:         {:?}", report.geocoder.status);
    println!("Land dataset:     {:?} ({} polygons)", report.land.status, report.land.polygon_count);
    for ledger in &report.ledgers {
        println!("Log {}: {:?} ({} rows)", ledger.path, ledger.status, ledger.rows);
    }
    println!();
    println!(
        "Checks passing: {}/{} ({} failed)",
        report.summary.checks_working, report.summary.checks_total, report.summary.checks_failed
    );
    println!("═══════════════════════════════════════════════════════════");
}

// ============================================================================
// Tests
// ============================================================================

//! Probe and batch drivers.
//!
//! Both are linear: extract identifiers, look each one up, classify, emit.
//! Everything is sequential and blocking; the only throttle is a fixed sleep
//! between identifiers.

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::io::Write;
use std::thread;
use std::time::Duration;

use crate::classify::{categorize_lookup, categorize_time};
use crate::config::BatchConfig;
use crate::ingest::metadata::{MetadataSource, fetch_metadata};
use crate::ingest::nominatim::{GeocodeCache, ReverseGeocoder};
use crate::interrupt::PendingRows;
use crate::land::LandMask;
use crate::ledger::{CsvLedger, load_existing_md5s};
use crate::logging::{self, Source};
use crate::model::{BagMetadata, GeotagError, LocationCategory, Md5, OutputRow};

// ---------------------------------------------------------------------------
// Per-bag enrichment
// ---------------------------------------------------------------------------

/// Metadata lookup plus memoized geocoding, shared by both drivers.
pub struct Enricher<M: MetadataSource, G: ReverseGeocoder> {
    metadata: M,
    geocoder: GeocodeCache<G>,
    viewer_url_template: String,
}

impl<M: MetadataSource, G: ReverseGeocoder> Enricher<M, G> {
    /// `viewer_url_template` must contain `{md5}`.
    pub fn new(metadata: M, geocoder: G, cache_capacity: usize, viewer_url_template: &str) -> Self {
        Self {
            metadata,
            geocoder: GeocodeCache::new(geocoder, cache_capacity),
            viewer_url_template: viewer_url_template.to_string(),
        }
    }

    pub fn fetch(&self, md5: &Md5) -> Option<BagMetadata> {
        fetch_metadata(&self.metadata, md5)
    }

    /// Requests that actually went out to the geocoder so far.
    pub fn geocoder_requests(&self) -> usize {
        self.geocoder.requests()
    }

    /// Derive the output row for one bag.
    ///
    /// Without a usable coordinate nothing is geocoded and the location,
    /// time-of-day, latitude and longitude cells stay empty.
    pub fn build_row(&mut self, meta: &BagMetadata) -> OutputRow {
        let coordinate = meta.coordinate();

        let location = coordinate.map(|(lat, lon)| {
            let info = self.geocoder.lookup(lat, lon);
            categorize_lookup(info.as_ref())
        });

        let time_of_day = match (coordinate, meta.collected_at) {
            (Some((lat, lon)), Some(at)) => Some(categorize_time(at, lat, lon)),
            _ => None,
        };

        OutputRow {
            md5: meta.md5.clone(),
            location,
            time_of_day,
            weather: meta.weather.clone(),
            latitude: coordinate.map(|c| c.0),
            longitude: coordinate.map(|c| c.1),
            viewer_url: self.viewer_url_template.replace("{md5}", meta.md5.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch driver
// ---------------------------------------------------------------------------

/// Where a batch run writes. The two files must differ.
pub struct BatchLedgers {
    pub valid: CsvLedger,
    pub invalid: CsvLedger,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Distinct identifiers in the input.
    pub found: usize,
    /// Of those, already present in a log from an earlier run.
    pub already_logged: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Metadata lookup failed or returned nothing; retried on the next run.
    pub unavailable: usize,
}

impl RunSummary {
    pub fn to_process(&self) -> usize {
        self.found - self.already_logged
    }
}

/// Process every identifier in `found` that is not yet in either log.
///
/// On-land coordinates go to the valid log (through `pending`, so an
/// interrupt can flush them); off-land or missing coordinates go to the
/// invalid log. Each row is appended as soon as it is built.
pub fn run_batch<M, G>(
    enricher: &mut Enricher<M, G>,
    land: &LandMask,
    ledgers: &BatchLedgers,
    pending: &PendingRows,
    found: &BTreeSet<Md5>,
    settings: &BatchConfig,
) -> Result<RunSummary, GeotagError>
where
    M: MetadataSource,
    G: ReverseGeocoder,
{
    let mut summary = RunSummary {
        found: found.len(),
        ..RunSummary::default()
    };
    logging::info(Source::System, None, &format!("Total unique MD5s found: {}", found.len()));

    let existing = load_existing_md5s(&[&ledgers.valid, &ledgers.invalid])?;
    let todo: Vec<&Md5> = found.iter().filter(|md5| !existing.contains(*md5)).collect();
    summary.already_logged = found.len() - todo.len();
    logging::info(Source::System, None, &format!("New MD5s to process: {}", todo.len()));

    let batch_size = settings.size.max(1);
    let batch_count = todo.len().div_ceil(batch_size);
    let throttle = Duration::from_millis(settings.throttle_ms);

    let pb = batch_progress(todo.len());

    for (index, batch) in todo.chunks(batch_size).enumerate() {
        for &md5 in batch {
            let meta = enricher.fetch(md5);
            if !throttle.is_zero() {
                thread::sleep(throttle);
            }
            pb.inc(1);

            let Some(meta) = meta else {
                summary.unavailable += 1;
                logging::debug(Source::Metadata, Some(md5.as_str()), "Skipped: no metadata");
                continue;
            };

            let on_land = meta.coordinate().is_some_and(|(lat, lon)| land.contains(lat, lon));
            let row = enricher.build_row(&meta);

            if on_land {
                pending.push(row);
                pending.flush_to(&ledgers.valid)?;
                summary.valid += 1;
            } else {
                ledgers.invalid.append(std::slice::from_ref(&row))?;
                summary.invalid += 1;
            }
        }

        logging::debug(
            Source::System,
            None,
            &format!("Finished batch {}/{} ({} rows)", index + 1, batch_count, batch.len()),
        );
    }
    pb.finish_with_message("Processing MD5s done");

    logging::info(Source::System, None, "All data processed and saved to CSV.");
    logging::debug(
        Source::Geocoder,
        None,
        &format!("Geocoder requests this run: {}", enricher.geocoder_requests()),
    );
    logging::log_run_summary(summary.to_process(), summary.valid, summary.invalid, summary.unavailable);
    Ok(summary)
}

/// Per-identifier progress bar for a batch run, drawn on stderr.
pub fn batch_progress(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message("Processing MD5s");
    pb
}

// ---------------------------------------------------------------------------
// Probe driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub found: usize,
    pub printed: usize,
    pub unavailable: usize,
}

/// Look up every identifier and print its classification to `out`.
///
/// Sleeps `throttle` after each identifier that had metadata. Nothing is
/// written to the CSV logs.
pub fn run_probe<M, G, W>(
    enricher: &mut Enricher<M, G>,
    found: &BTreeSet<Md5>,
    throttle: Duration,
    out: &mut W,
) -> Result<ProbeSummary, GeotagError>
where
    M: MetadataSource,
    G: ReverseGeocoder,
    W: Write,
{
    let mut summary = ProbeSummary {
        found: found.len(),
        ..ProbeSummary::default()
    };

    writeln!(out, "MD5 check complete. Starting processing of MD5s...")?;

    for md5 in found {
        let Some(meta) = enricher.fetch(md5) else {
            summary.unavailable += 1;
            continue;
        };

        let row = enricher.build_row(&meta);
        let location = row.location.unwrap_or(LocationCategory::OutOfRange);

        writeln!(out, "MD5: {}", row.md5)?;
        writeln!(out, "Latitude: {}", display_or_none(row.latitude))?;
        writeln!(out, "Longitude: {}", display_or_none(row.longitude))?;
        writeln!(out, "Location Category: {}", location)?;
        writeln!(out, "----------------------------")?;
        summary.printed += 1;

        if !throttle.is_zero() {
            thread::sleep(throttle);
        }
    }

    writeln!(out, "\nAll data processed.")?;
    Ok(summary)
}

fn display_or_none(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "None".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_progress_counts_identifiers() {
        let pb = batch_progress(99);
        assert_eq!(pb.length(), Some(99));
        assert_eq!(pb.message(), "Processing MD5s");

        for _ in 0..99 {
            pb.inc(1);
        }
        assert_eq!(pb.position(), 99);
    }
}

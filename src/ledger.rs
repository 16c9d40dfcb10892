//! Append-only CSV logs of processed bags.
//!
//! Two logs exist per working directory: one for bags whose coordinates are
//! on land and one for everything else. Together they are also the
//! deduplication ledger: a bag present in either log is never fetched again.
//!
//! The header row is written when the file is created (or found empty) and
//! never again, so appends from any number of runs produce one valid CSV.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::model::{GeotagError, LOG_HEADER, Md5, OutputRow};

#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
}

/// What `CsvLedger::inspect` found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerStats {
    pub exists: bool,
    pub rows: usize,
    pub header_ok: bool,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identifiers already recorded. A missing file is an empty ledger.
    ///
    /// The first line is skipped as the header; rows with an empty first
    /// cell are ignored.
    pub fn load_md5s(&self) -> Result<HashSet<Md5>, GeotagError> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let mut md5s = HashSet::new();
        for record in reader.records() {
            let record = record?;
            if let Some(md5) = record.get(0).and_then(|cell| Md5::parse(cell.trim())) {
                md5s.insert(md5);
            }
        }
        Ok(md5s)
    }

    /// Append rows, writing the header first if the file is new or empty.
    pub fn append(&self, rows: &[OutputRow]) -> Result<(), GeotagError> {
        let needs_header = std::fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        if needs_header {
            writer.write_record(LOG_HEADER)?;
        }
        for row in rows {
            writer.write_record(row.to_record())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn inspect(&self) -> Result<LedgerStats, GeotagError> {
        if !self.path.exists() {
            return Ok(LedgerStats { exists: false, rows: 0, header_ok: false });
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;
        let header_ok = reader.headers()?.iter().eq(LOG_HEADER.iter().copied());
        let rows = reader.records().filter(|r| r.is_ok()).count();

        Ok(LedgerStats { exists: true, rows, header_ok })
    }
}

/// Union of the identifiers recorded in all `ledgers`.
pub fn load_existing_md5s(ledgers: &[&CsvLedger]) -> Result<HashSet<Md5>, GeotagError> {
    let mut all = HashSet::new();
    for ledger in ledgers {
        all.extend(ledger.load_md5s()?);
    }
    Ok(all)
}

//! Bag identifier extraction from free-form text dumps.
//!
//! Dumps are pasted query results: mostly JSON, sometimes truncated or
//! interleaved with log noise, so they are scanned with a regex rather than
//! parsed.

use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use crate::model::{GeotagError, Md5};

static MD5_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""md5":"([a-f0-9]{32})""#).expect("static pattern compiles"));

/// Returns every distinct identifier that appears as `"md5":"<32 hex>"`.
///
/// The set is ordered so runs process identifiers in a stable order.
pub fn extract_md5s(text: &str) -> BTreeSet<Md5> {
    MD5_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| Md5::parse(m.as_str()))
        .collect()
}

/// Reads `path` and extracts its identifiers.
pub fn extract_md5s_from_file(path: &Path) -> Result<BTreeSet<Md5>, GeotagError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| GeotagError::IoError(format!("{}: {}", path.display(), e)))?;
    Ok(extract_md5s(&text))
}

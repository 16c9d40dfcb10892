//! Clients for the two remote services a run depends on.
//!
//! Submodules:
//! - `metadata`: per-bag GPS/time/weather lookup from the metadata service.
//! - `nominatim`: reverse geocoding plus the per-run lookup memo.

pub mod metadata;
pub mod nominatim;

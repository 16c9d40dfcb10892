//! Bag geotagging utilities.
//!
//! Looks up the GPS fix of recorded bags (keyed by MD5) in the metadata
//! service, reverse-geocodes it, labels it Highway/Urban/Rural and
//! Day/Night/Dawn/Dusk, and keeps the results in two append-only CSV logs.
//! Also home to a small, unrelated pie chart dashboard.

pub mod classify;
pub mod config;
pub mod dashboard;
pub mod extract;
pub mod ingest;
pub mod interrupt;
pub mod land;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod verify;

//! Labels derived for each bag.
//!
//! Submodules:
//! - `location`: Highway / Urban / Rural / Unknown from a geocoding response.
//! - `daylight`: Day / Night / Dawn / Dusk from sun position.

pub mod daylight;
pub mod location;

pub use daylight::categorize_time;
pub use location::{categorize_location, categorize_lookup};

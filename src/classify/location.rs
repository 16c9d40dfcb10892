//! Location classification from a reverse-geocoding response.

use crate::ingest::nominatim::GeocodeResponse;
use crate::model::LocationCategory;

/// Nominatim's answer for coordinates it cannot place (open sea, etc.).
pub const UNABLE_TO_GEOCODE: &str = "Unable to geocode";

/// Address keys that mark a built-up area.
const URBAN_KEYS: [&str; 3] = ["town", "residential", "city"];

/// Maps a geocoding response onto a location label.
///
/// Decision order:
///   1. "Unable to geocode" error → Unknown
///   2. type `motorway` (any case) → Highway, whatever the address says
///   3. address has town / residential / city → Urban
///   4. address has village → Rural
///   5. anything else → Unknown
pub fn categorize_location(info: &GeocodeResponse) -> LocationCategory {
    if info.error.as_deref() == Some(UNABLE_TO_GEOCODE) {
        return LocationCategory::Unknown;
    }

    let place_type = info.place_type.as_deref().unwrap_or_default().to_lowercase();
    if place_type == "motorway" {
        return LocationCategory::Highway;
    }
    if URBAN_KEYS.iter().any(|k| info.has_address_field(k)) {
        return LocationCategory::Urban;
    }
    if info.has_address_field("village") {
        return LocationCategory::Rural;
    }

    LocationCategory::Unknown
}

/// Like `categorize_location`, but a missing response means the geocoder
/// could not be reached at all.
pub fn categorize_lookup(info: Option<&GeocodeResponse>) -> LocationCategory {
    info.map(categorize_location).unwrap_or(LocationCategory::OutOfRange)
}

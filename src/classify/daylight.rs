//! Time-of-day classification from sun position.
//!
//! Solar events are computed with the NOAA solar equations (Meeus, low
//! accuracy variant). They are good to about a minute between ±72°
//! latitude, which is far tighter than the dawn/dusk windows being bucketed.
//!
//! # Clock injection
//! Every function takes the instant to classify as a parameter; nothing here
//! reads the system clock.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use crate::model::TimeOfDay;

/// Zenith of the sun's upper limb at sunrise/sunset, refraction included.
pub const SUNRISE_ZENITH_DEG: f64 = 90.833;

/// Civil twilight: sun centre 6° below the horizon.
pub const CIVIL_ZENITH_DEG: f64 = 96.0;

// 1970-01-01 counted from 0001-01-01 (day 1)
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;
const J2000: f64 = 2_451_545.0;

/// Dawn, sunrise, sunset and dusk for one date and place.
///
/// An event is `None` when the sun never crosses the corresponding zenith
/// that day (midnight sun, polar night, white nights).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarEvents {
    pub dawn: Option<DateTime<Utc>>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub dusk: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Solar geometry
// ---------------------------------------------------------------------------

fn julian_day(date: NaiveDate) -> f64 {
    (date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE) as f64 + UNIX_EPOCH_JULIAN_DAY
}

fn julian_century(jd: f64) -> f64 {
    (jd - J2000) / 36_525.0
}

/// Returns (declination in radians, equation of time in minutes).
fn sun_parameters(t: f64) -> (f64, f64) {
    let mean_long = (280.46646 + t * (36_000.76983 + 0.000_303_2 * t)).rem_euclid(360.0);
    let mean_anomaly = 357.52911 + t * (35_999.05029 - 0.000_153_7 * t);
    let eccentricity = 0.016_708_634 - t * (0.000_042_037 + 0.000_000_126_7 * t);

    let m = mean_anomaly.to_radians();
    let center = m.sin() * (1.914_602 - t * (0.004_817 + 0.000_014 * t))
        + (2.0 * m).sin() * (0.019_993 - 0.000_101 * t)
        + (3.0 * m).sin() * 0.000_289;

    let omega = (125.04 - 1_934.136 * t).to_radians();
    let apparent_long = mean_long + center - 0.005_69 - 0.004_78 * omega.sin();

    let mean_obliquity = 23.0 + (26.0 + (21.448 - t * (46.815 + t * (0.000_59 - t * 0.001_813))) / 60.0) / 60.0;
    let obliquity = (mean_obliquity + 0.002_56 * omega.cos()).to_radians();

    let declination = (obliquity.sin() * apparent_long.to_radians().sin()).asin();

    let y = (obliquity / 2.0).tan().powi(2);
    let l0 = mean_long.to_radians();
    let e = eccentricity;
    let eq_time = y * (2.0 * l0).sin() - 2.0 * e * m.sin() + 4.0 * e * y * m.sin() * (2.0 * l0).cos()
        - 0.5 * y * y * (4.0 * l0).sin()
        - 1.25 * e * e * (2.0 * m).sin();

    (declination, 4.0 * eq_time.to_degrees())
}

/// Hour angle (degrees) at which the sun reaches `zenith_deg`, if it does.
fn hour_angle(latitude: f64, declination: f64, zenith_deg: f64) -> Option<f64> {
    let lat = latitude.to_radians();
    let cos_ha = zenith_deg.to_radians().cos() / (lat.cos() * declination.cos()) - lat.tan() * declination.tan();
    if !cos_ha.is_finite() || !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }
    Some(cos_ha.acos().to_degrees())
}

/// Minutes after 00:00 UTC of `date` at which the sun crosses `zenith_deg`.
/// May be negative or exceed 1440 far from Greenwich.
fn event_minutes(date: NaiveDate, latitude: f64, longitude: f64, zenith_deg: f64, rising: bool) -> Option<f64> {
    let jd = julian_day(date);
    // first guess: local solar noon
    let mut t = julian_century(jd + 0.5 - longitude / 360.0);
    let mut minutes = 0.0;

    for _ in 0..2 {
        let (declination, eq_time) = sun_parameters(t);
        let ha = hour_angle(latitude, declination, zenith_deg)?;
        let ha = if rising { ha } else { -ha };
        minutes = 720.0 - 4.0 * (longitude + ha) - eq_time;
        t = julian_century(jd + minutes / 1440.0);
    }

    Some(minutes)
}

fn at_minutes(date: NaiveDate, minutes: f64) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc() + Duration::milliseconds((minutes * 60_000.0).round() as i64)
}

/// Solar events for `date` at the given position.
pub fn solar_events(date: NaiveDate, latitude: f64, longitude: f64) -> SolarEvents {
    let event = |zenith, rising| {
        event_minutes(date, latitude, longitude, zenith, rising).map(|m| at_minutes(date, m))
    };

    SolarEvents {
        dawn: event(CIVIL_ZENITH_DEG, true),
        sunrise: event(SUNRISE_ZENITH_DEG, true),
        sunset: event(SUNRISE_ZENITH_DEG, false),
        dusk: event(CIVIL_ZENITH_DEG, false),
    }
}

/// Solar noon for `date` at `longitude`.
pub fn solar_noon(date: NaiveDate, longitude: f64) -> DateTime<Utc> {
    let jd = julian_day(date);
    let t = julian_century(jd + 0.5 - longitude / 360.0);
    let (_, eq_time) = sun_parameters(t);
    at_minutes(date, 720.0 - 4.0 * longitude - eq_time)
}

/// Sun elevation above the horizon in degrees (no refraction).
pub fn solar_elevation(at: DateTime<Utc>, latitude: f64, longitude: f64) -> f64 {
    let date = at.date_naive();
    let minutes = (at - date.and_time(NaiveTime::MIN).and_utc()).num_milliseconds() as f64 / 60_000.0;
    let t = julian_century(julian_day(date) + minutes / 1440.0);
    let (declination, eq_time) = sun_parameters(t);

    let true_solar_time = (minutes + eq_time + 4.0 * longitude).rem_euclid(1440.0);
    let ha = (true_solar_time / 4.0 - 180.0).to_radians();
    let lat = latitude.to_radians();

    let cos_zenith = lat.sin() * declination.sin() + lat.cos() * declination.cos() * ha.cos();
    90.0 - cos_zenith.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Calendar date of local mean solar time at `longitude`.
///
/// Using this rather than the UTC date keeps the whole local day (midnight to
/// midnight) on one set of events, wherever the coordinate is.
pub fn solar_date(at: DateTime<Utc>, longitude: f64) -> NaiveDate {
    (at + Duration::seconds((longitude * 240.0).round() as i64)).date_naive()
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Buckets `at` against one day's events.
///
///   sunrise <= at < sunset  → Day
///   at >= dusk or at < dawn → Night
///   dawn <= at < sunrise    → Dawn
///   sunset <= at < dusk     → Dusk
pub fn bucket(
    at: DateTime<Utc>,
    dawn: DateTime<Utc>,
    sunrise: DateTime<Utc>,
    sunset: DateTime<Utc>,
    dusk: DateTime<Utc>,
) -> TimeOfDay {
    if sunrise <= at && at < sunset {
        TimeOfDay::Day
    } else if at >= dusk || at < dawn {
        TimeOfDay::Night
    } else if dawn <= at && at < sunrise {
        TimeOfDay::Dawn
    } else {
        TimeOfDay::Dusk
    }
}

/// Classifies the light phase at `at` for the given position.
///
/// When one of the four events does not happen that day, the sun's elevation
/// at `at` decides instead: above the sunrise zenith is Day, below civil
/// twilight is Night, anything between is Dawn before solar noon and Dusk
/// after it.
///
/// Events are looked up for the local solar date at `longitude` (see
/// `solar_date`), not the UTC calendar date of `at`. The two differ for
/// evening bags west of Greenwich and morning bags far east of it.
pub fn categorize_time(at: DateTime<Utc>, latitude: f64, longitude: f64) -> TimeOfDay {
    let date = solar_date(at, longitude);
    let events = solar_events(date, latitude, longitude);

    if let (Some(dawn), Some(sunrise), Some(sunset), Some(dusk)) =
        (events.dawn, events.sunrise, events.sunset, events.dusk)
    {
        return bucket(at, dawn, sunrise, sunset, dusk);
    }

    let elevation = solar_elevation(at, latitude, longitude);
    if elevation > 90.0 - SUNRISE_ZENITH_DEG {
        TimeOfDay::Day
    } else if elevation < 90.0 - CIVIL_ZENITH_DEG {
        TimeOfDay::Night
    } else if at < solar_noon(date, longitude) {
        TimeOfDay::Dawn
    } else {
        TimeOfDay::Dusk
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

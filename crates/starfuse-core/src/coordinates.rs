use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::constants::*;

/// Errors raised while reading sky coordinates from text
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("empty coordinate")]
    Empty,

    #[error("malformed coordinate '{0}'")]
    Malformed(String),

    #[error("coordinate '{text}' out of range: {reason}")]
    OutOfRange { text: String, reason: &'static str },
}

/// Equatorial position (J2000), both angles in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquatorialPosition {
    pub ra: f64,   // [0, 360)
    pub dec: f64,  // [-90, 90]
}

impl EquatorialPosition {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    /// Great-circle separation in degrees
    pub fn separation_deg(&self, other: &EquatorialPosition) -> f64 {
        angular_distance_deg(self.ra, self.dec, other.ra, other.dec)
    }

    /// Canonical sexagesimal text for both axes
    pub fn to_sexagesimal(&self) -> (String, String) {
        (format_ra(self.ra), format_dec(self.dec))
    }
}

/// Great-circle distance between two positions (degrees in, degrees out).
///
/// Haversine form, stable for the sub-arcsecond separations cross-matching
/// works with.
pub fn angular_distance_deg(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let phi1 = dec1.to_radians();
    let phi2 = dec2.to_radians();
    let d_phi = phi2 - phi1;
    let d_lambda = (ra2 - ra1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);

    (2.0 * a.sqrt().min(1.0).asin()).to_degrees()
}

/// Absolute RA difference in degrees, folded across the 0/360 wrap
pub fn ra_difference_deg(ra1: f64, ra2: f64) -> f64 {
    let delta = (ra1 - ra2).abs() % FULL_CIRCLE_DEG;
    delta.min(FULL_CIRCLE_DEG - delta)
}

pub fn arcsec_to_deg(arcsec: f64) -> f64 {
    arcsec / ARCSEC_PER_DEG
}

pub fn deg_to_arcsec(deg: f64) -> f64 {
    deg * ARCSEC_PER_DEG
}

/// Parse right ascension given as "HH MM SS.sss", "HH:MM[:SS]" or decimal degrees.
///
/// A single field is always read as degrees; two or three fields are hours,
/// minutes and optional seconds of time.
pub fn parse_ra(text: &str) -> Result<f64, CoordinateError> {
    let fields = split_fields(text);

    let degrees = match fields.as_slice() {
        [] => return Err(CoordinateError::Empty),
        [deg] => parse_field(text, deg)?,
        [hours, tail @ ..] if tail.len() <= 2 => {
            let hours = parse_field(text, hours)?;
            if !(0.0..24.0).contains(&hours) {
                return Err(out_of_range(text, "hours must be in [0, 24)"));
            }
            let (minutes, seconds) = minutes_seconds(text, tail)?;
            (hours * 3600.0 + minutes * 60.0 + seconds) / TIME_SECONDS_PER_DEG
        }
        _ => return Err(CoordinateError::Malformed(text.to_string())),
    };

    if !(0.0..FULL_CIRCLE_DEG).contains(&degrees) {
        return Err(out_of_range(text, "right ascension must be in [0, 360)"));
    }

    Ok(degrees)
}

/// Parse declination given as "+DD MM SS.ss", "-DD:MM" or decimal degrees
pub fn parse_dec(text: &str) -> Result<f64, CoordinateError> {
    let fields = split_fields(text);

    let degrees = match fields.as_slice() {
        [] => return Err(CoordinateError::Empty),
        [deg] => parse_field(text, deg)?,
        [head, tail @ ..] if tail.len() <= 2 => {
            // the sign lives on the degree field, "-00 30" is still negative
            let negative = head.starts_with('-');
            let deg = parse_field(text, head.trim_start_matches(['+', '-']))?;
            let (minutes, seconds) = minutes_seconds(text, tail)?;
            let magnitude = (deg * 3600.0 + minutes * 60.0 + seconds) / ARCSEC_PER_DEG;
            if negative { -magnitude } else { magnitude }
        }
        _ => return Err(CoordinateError::Malformed(text.to_string())),
    };

    if !(-90.0..=90.0).contains(&degrees) {
        return Err(out_of_range(text, "declination must be in [-90, 90]"));
    }

    Ok(degrees)
}

/// Canonical RA text: "HH MM SS.sss"
pub fn format_ra(degrees: f64) -> String {
    const MS_PER_DAY: u64 = 86_400_000;
    let total_ms = (degrees.rem_euclid(FULL_CIRCLE_DEG) * TIME_SECONDS_PER_DEG * 1000.0).round() as u64
        % MS_PER_DAY;

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;

    format!("{:02} {:02} {:02}.{:03}", hours, minutes, seconds, millis)
}

/// Canonical DEC text: "+DD MM SS.ss"
pub fn format_dec(degrees: f64) -> String {
    let total_cas = (degrees.abs() * ARCSEC_PER_DEG * 100.0).round() as u64;

    let deg = total_cas / 360_000;
    let minutes = (total_cas / 6000) % 60;
    let seconds = (total_cas / 100) % 60;
    let centis = total_cas % 100;
    let sign = if degrees < 0.0 && total_cas > 0 { '-' } else { '+' };

    format!("{}{:02} {:02} {:02}.{:02}", sign, deg, minutes, seconds, centis)
}

fn split_fields(text: &str) -> Vec<&str> {
    text.split(|c: char| c.is_whitespace() || c == ':')
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_field(text: &str, field: &str) -> Result<f64, CoordinateError> {
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CoordinateError::Malformed(text.to_string()))
}

fn minutes_seconds(text: &str, tail: &[&str]) -> Result<(f64, f64), CoordinateError> {
    let minutes = match tail.first() {
        Some(m) => parse_field(text, m)?,
        None => 0.0,
    };
    let seconds = match tail.get(1) {
        Some(s) => parse_field(text, s)?,
        None => 0.0,
    };

    if !(0.0..60.0).contains(&minutes) {
        return Err(out_of_range(text, "minutes must be in [0, 60)"));
    }
    if !(0.0..60.0).contains(&seconds) {
        return Err(out_of_range(text, "seconds must be in [0, 60)"));
    }

    Ok((minutes, seconds))
}

fn out_of_range(text: &str, reason: &'static str) -> CoordinateError {
    CoordinateError::OutOfRange { text: text.to_string(), reason }
}

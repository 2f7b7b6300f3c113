/// Degrees of right ascension per hour of time
pub const DEG_PER_HOUR: f64 = 15.0;

/// Seconds of time per degree of right ascension
pub const TIME_SECONDS_PER_DEG: f64 = 240.0;

/// Arcseconds per degree
pub const ARCSEC_PER_DEG: f64 = 3600.0;

/// Milliarcseconds per degree
pub const MAS_PER_DEG: f64 = 3.6e6;

/// Full circle in degrees
pub const FULL_CIRCLE_DEG: f64 = 360.0;

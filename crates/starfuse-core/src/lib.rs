//! Sky coordinate primitives shared by the star fusion crates

pub mod constants;
pub mod coordinates;

#[cfg(test)]
mod tests;

pub use coordinates::{
    angular_distance_deg, format_dec, format_ra, parse_dec, parse_ra, ra_difference_deg,
    CoordinateError, EquatorialPosition,
};

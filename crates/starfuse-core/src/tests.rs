use crate::coordinates::*;
use approx::assert_relative_eq;

#[test]
fn test_parse_ra_sexagesimal() {
    assert_relative_eq!(parse_ra("12 30 00.000").unwrap(), 187.5);
    assert_relative_eq!(parse_ra("00 00 01").unwrap(), 1.0 / 240.0, epsilon = 1e-15);
    assert_relative_eq!(parse_ra("06:00:00").unwrap(), 90.0);
}

#[test]
fn test_parse_ra_without_seconds_matches_full_form() {
    let short = parse_ra("12 30").unwrap();
    let full = parse_ra("12 30 00.000").unwrap();
    assert_eq!(short.to_bits(), full.to_bits());
}

#[test]
fn test_parse_ra_degrees() {
    assert_relative_eq!(parse_ra("187.5").unwrap(), 187.5);
}

#[test]
fn test_parse_ra_rejects_garbage() {
    assert_eq!(parse_ra("   "), Err(CoordinateError::Empty));
    assert!(matches!(parse_ra("12 xx 00"), Err(CoordinateError::Malformed(_))));
    assert!(matches!(parse_ra("25 00 00"), Err(CoordinateError::OutOfRange { .. })));
    assert!(matches!(parse_ra("12 61 00"), Err(CoordinateError::OutOfRange { .. })));
    assert!(matches!(parse_ra("1 2 3 4"), Err(CoordinateError::Malformed(_))));
}

#[test]
fn test_parse_dec_signs() {
    assert_relative_eq!(parse_dec("+20 00 00").unwrap(), 20.0);
    assert_relative_eq!(parse_dec("-45 30").unwrap(), -45.5);
    // negative zero degrees keeps its sign through the minutes
    assert_relative_eq!(parse_dec("-00 30 00").unwrap(), -0.5);
    assert_relative_eq!(parse_dec("-12.25").unwrap(), -12.25);
    assert!(matches!(parse_dec("+91 00 00"), Err(CoordinateError::OutOfRange { .. })));
}

#[test]
fn test_format_roundtrip() {
    assert_eq!(format_ra(187.5), "12 30 00.000");
    assert_eq!(format_dec(20.0), "+20 00 00.00");
    assert_eq!(format_dec(-0.5), "-00 30 00.00");

    for text in ["01 02 03.456", "23 59 59.999", "00 00 00.000"] {
        assert_eq!(format_ra(parse_ra(text).unwrap()), text);
    }
    for text in ["+89 59 59.99", "-10 20 30.40", "+00 00 00.00"] {
        assert_eq!(format_dec(parse_dec(text).unwrap()), text);
    }
}

#[test]
fn test_format_ra_carries_rounding() {
    // 23h59m59.9996s rounds up to the next day
    let deg = parse_ra("23 59 59.9996").unwrap();
    assert_eq!(format_ra(deg), "00 00 00.000");
}

#[test]
fn test_angular_distance_known_values() {
    assert_relative_eq!(angular_distance_deg(0.0, 0.0, 90.0, 0.0), 90.0, epsilon = 1e-12);
    assert_relative_eq!(angular_distance_deg(0.0, -90.0, 0.0, 90.0), 180.0, epsilon = 1e-12);
    assert_relative_eq!(angular_distance_deg(10.0, 45.0, 10.0, 45.0), 0.0);

    // one second of time at dec +20 is 15" * cos(20°)
    let sep = angular_distance_deg(150.0, 20.0, 150.0 + 1.0 / 240.0, 20.0);
    assert_relative_eq!(sep * 3600.0, 15.0 * 20f64.to_radians().cos(), epsilon = 1e-6);
}

#[test]
fn test_angular_distance_symmetry() {
    let pairs = [
        (10.0, 20.0, 10.001, 20.0005),
        (359.9999, -30.0, 0.0001, -30.0001),
        (200.0, 89.9, 20.0, 89.9),
    ];

    for (ra1, dec1, ra2, dec2) in pairs {
        let ab = angular_distance_deg(ra1, dec1, ra2, dec2);
        let ba = angular_distance_deg(ra2, dec2, ra1, dec1);
        assert!((ab - ba).abs() <= f64::EPSILON * ab.max(1.0), "{} vs {}", ab, ba);
    }
}

#[test]
fn test_ra_difference_wraps() {
    assert_relative_eq!(ra_difference_deg(359.5, 0.5), 1.0, epsilon = 1e-12);
    assert_relative_eq!(ra_difference_deg(10.0, 20.0), 10.0);
    assert_relative_eq!(ra_difference_deg(0.0, 180.0), 180.0);
}

#[test]
fn test_equatorial_position_sexagesimal() {
    let pos = EquatorialPosition::new(150.0, 20.0);
    let (ra, dec) = pos.to_sexagesimal();
    assert_eq!(ra, "10 00 00.000");
    assert_eq!(dec, "+20 00 00.00");
    assert_relative_eq!(pos.separation_deg(&pos), 0.0);
}

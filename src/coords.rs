//! Coordinate value types and the frame conversions between them.
//!
//! All conversions take an explicit timestamp (seconds since the Unix
//! epoch) and an observing location, so callers never reach for a global
//! clock.

use crate::astro_math::{
    self, alt_from_ha_dec, az_from_ha_dec, ha_dec_from_alt_az, local_sidereal_time, modulo,
    Degrees, Hours,
};
use crate::environment::{Clock, ObservingLocation};
use crate::errors::{MountError, Result};

/// A horizontal-frame direction. Which frame (sky or telescope) is carried
/// by context; the alignment engine maps between the two.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AltAz {
    pub alt: Degrees,
    pub az: Degrees,
}

impl AltAz {
    pub fn new(alt: Degrees, az: Degrees) -> Self {
        AltAz { alt, az }
    }
}

/// An equatorial direction: right ascension in hours, declination in
/// degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RaDec {
    pub ra: Hours,
    pub dec: Degrees,
}

impl RaDec {
    pub fn new(ra: Hours, dec: Degrees) -> Self {
        RaDec { ra, dec }
    }
}

/// An [`AltAz`] stamped with the moment it was observed or computed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pointing {
    pub alt_az: AltAz,
    pub timestamp: f64,
}

impl Pointing {
    pub fn new(alt_az: AltAz, timestamp: f64) -> Self {
        Pointing { alt_az, timestamp }
    }
}

/// Horizontal coordinates of an equatorial target at the given time.
pub fn altaz_from_radec(ra_dec: RaDec, location: &ObservingLocation, timestamp: f64) -> AltAz {
    let time = Clock::datetime_from_timestamp(timestamp);
    let lst = local_sidereal_time(time, location.longitude);
    let ha = modulo(lst - ra_dec.ra, 24.0);
    AltAz {
        alt: alt_from_ha_dec(ha, ra_dec.dec, location.latitude),
        az: az_from_ha_dec(ha, ra_dec.dec, location.latitude),
    }
}

/// Equatorial coordinates of a horizontal direction at the given time.
pub fn radec_from_altaz(alt_az: AltAz, location: &ObservingLocation, timestamp: f64) -> RaDec {
    let time = Clock::datetime_from_timestamp(timestamp);
    let lst = local_sidereal_time(time, location.longitude);
    let (ha, dec) = ha_dec_from_alt_az(alt_az.alt, alt_az.az, location.latitude);
    RaDec {
        ra: modulo(lst - ha, 24.0),
        dec,
    }
}

/// Where the sky point currently at `alt_az` will be `timediff` seconds
/// later. Used by the position loop to lead the sidereal track.
pub fn altaz_at_different_time(
    alt_az: AltAz,
    location: &ObservingLocation,
    timestamp: f64,
    timediff: f64,
) -> AltAz {
    let ra_dec = radec_from_altaz(alt_az, location, timestamp);
    altaz_from_radec(ra_dec, location, timestamp + timediff)
}

/// Parse a sexagesimal string such as `"12:34:56"`, `"+40*30:00"` or
/// `"-05*30"`. A `*` separator is accepted wherever a `:` is.
pub fn parse_sexagesimal(value: &str) -> Result<f64> {
    let cleaned = value.trim().replace('*', ":");
    let (sign, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };

    let mut result = 0.0;
    let mut scale = 1.0;
    let parts: Vec<&str> = body.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(MountError::invalid_argument(format!(
            "cannot parse {value:?} as a sexagesimal value"
        )));
    }
    for part in parts {
        let field: f64 = part.trim().parse().map_err(|_| {
            MountError::invalid_argument(format!(
                "cannot parse {value:?} as a sexagesimal value"
            ))
        })?;
        result += field * scale;
        scale /= 60.0;
    }
    Ok(sign * result)
}

/// Parse the LX200 `HH:MM:SS` right ascension and `sDD*MM:SS` declination
/// pair (`:` also accepted as the degree separator).
pub fn radec_from_lx200(ra_str: &str, dec_str: &str) -> Result<RaDec> {
    let ra = parse_sexagesimal(ra_str)?;
    if !(0.0..24.0).contains(&ra) {
        return Err(MountError::invalid_argument(format!(
            "right ascension {ra_str:?} out of range"
        )));
    }
    let dec = parse_sexagesimal(dec_str)?;
    if !(-90.0..=90.0).contains(&dec) {
        return Err(MountError::invalid_argument(format!(
            "declination {dec_str:?} out of range"
        )));
    }
    Ok(RaDec { ra, dec })
}

/// Split a non-negative value into (whole, minutes, seconds), rounded to
/// whole seconds so a value just below a field boundary never renders as
/// `:60`.
pub fn to_dms(value: f64) -> (u32, u32, u32) {
    let total_seconds = (value.abs() * 3600.0).round() as u64;
    (
        (total_seconds / 3600) as u32,
        ((total_seconds % 3600) / 60) as u32,
        (total_seconds % 60) as u32,
    )
}

pub fn format_ra(ra: Hours) -> String {
    let ra = astro_math::modulo(ra, 24.0);
    let (h, m, s) = to_dms(ra);
    format!("{:02}:{:02}:{:02}", h, m, s)
}

pub fn format_dec(dec: Degrees) -> String {
    let sign = if dec < 0.0 { '-' } else { '+' };
    let (d, m, s) = to_dms(dec);
    format!("{}{:02}*{:02}:{:02}", sign, d, m, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn madrid() -> ObservingLocation {
        ObservingLocation {
            latitude: 40.5,
            longitude: -3.883333,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_sexagesimal() {
        assert_float_absolute_eq!(parse_sexagesimal("12:30:00").unwrap(), 12.5);
        assert_float_absolute_eq!(parse_sexagesimal("+40*30:00").unwrap(), 40.5);
        assert_float_absolute_eq!(parse_sexagesimal("-05*30").unwrap(), -5.5);
        assert_float_absolute_eq!(parse_sexagesimal("-0:30:36").unwrap(), -0.51);
        assert_float_absolute_eq!(parse_sexagesimal("40.25").unwrap(), 40.25);
        assert!(parse_sexagesimal("twelve").is_err());
        assert!(parse_sexagesimal("1:2:3:4").is_err());
    }

    #[test]
    fn test_radec_from_lx200() {
        let ra_dec = radec_from_lx200("05:30:00", "+40*30:00").unwrap();
        assert_float_absolute_eq!(ra_dec.ra, 5.5);
        assert_float_absolute_eq!(ra_dec.dec, 40.5);
        // A ':' degree separator must work too.
        let ra_dec = radec_from_lx200("05:30:00", "-40:30:00").unwrap();
        assert_float_absolute_eq!(ra_dec.dec, -40.5);
        assert!(radec_from_lx200("25:00:00", "+00*00:00").is_err());
        assert!(radec_from_lx200("05:00:00", "+95*00:00").is_err());
    }

    #[test]
    fn test_format_ra_dec() {
        assert_eq!(format_ra(5.5), "05:30:00");
        assert_eq!(format_ra(0.0), "00:00:00");
        assert_eq!(format_dec(40.5), "+40*30:00");
        assert_eq!(format_dec(-5.51), "-05*30:36");
    }

    #[test]
    fn test_radec_altaz_round_trip() {
        let location = madrid();
        let timestamp = 1_685_620_800.0;
        let ra_dec = RaDec::new(13.4, 54.9);
        let alt_az = altaz_from_radec(ra_dec, &location, timestamp);
        let back = radec_from_altaz(alt_az, &location, timestamp);
        assert_float_absolute_eq!(back.ra, ra_dec.ra, 1E-6);
        assert_float_absolute_eq!(back.dec, ra_dec.dec, 1E-6);
    }

    #[test]
    fn test_altaz_at_different_time_follows_sky() {
        let location = madrid();
        let timestamp = 1_685_620_800.0;
        let alt_az = AltAz::new(55.0, 210.0);

        // The same sky point an hour later has moved west.
        let later = altaz_at_different_time(alt_az, &location, timestamp, 3600.0);
        assert!(later.az > alt_az.az);

        // Zero time difference is the identity.
        let same = altaz_at_different_time(alt_az, &location, timestamp, 0.0);
        assert_float_absolute_eq!(same.alt, alt_az.alt, 1E-9);
        assert_float_absolute_eq!(same.az, alt_az.az, 1E-9);
    }
}

//! Pure angle and sidereal-time math. Everything here is unit-suffixed
//! `f64`; no locks, no I/O.

use chrono::{DateTime, Datelike, Timelike, Utc};
use polynomials::poly;
use std::f64::consts::{PI, TAU};

pub type Hours = f64;
pub type Degrees = f64;
pub type Radians = f64;

pub fn deg_to_rad(degrees: Degrees) -> Radians {
    PI * degrees / 180.
}

pub fn rad_to_deg(rad: Radians) -> Degrees {
    180. * rad / PI
}

pub fn hours_to_rad(hours: Hours) -> Radians {
    PI * hours / 12.
}

pub fn rad_to_hours(rad: Radians) -> Hours {
    12. * rad / PI
}

pub fn deg_to_hours(deg: Degrees) -> Hours {
    deg / 15.
}

pub fn hours_to_deg(hours: Hours) -> Degrees {
    hours * 15.
}

/// Remainder of `val / base` in [0, base).
pub fn modulo(val: f64, base: f64) -> f64 {
    ((val % base) + base) % base
}

/// Reduce an angle into [-180, 180). Used for altitude reads and for
/// shortest-path deltas.
pub fn wrap_at_180(angle: Degrees) -> Degrees {
    modulo(angle + 180., 360.) - 180.
}

/// Reduce an angle into [0, 360). Used for azimuth reads.
pub fn wrap_at_360(angle: Degrees) -> Degrees {
    modulo(angle, 360.)
}

/// Julian Date of a UTC time.
/// See https://scienceworld.wolfram.com/astronomy/JulianDate.html
fn julian_date(time: DateTime<Utc>) -> f64 {
    let y = time.year() as f64;
    let m = time.month() as f64;
    let d = time.day() as f64;

    let mut jd = 367. * y;
    jd -= f64::floor(7. * (y + f64::floor((m + 9.) / 12.)) / 4.);
    jd -= f64::floor(3. * (f64::floor((y + (m - 9.) / 7.) / 100.) + 1.) / 4.);
    jd += f64::floor(275. * m / 9.);
    jd += d;
    jd += 1721028.5;

    let seconds = time.second() as f64 + time.nanosecond() as f64 * 1e-9;
    let day_fraction =
        (time.hour() as f64 + time.minute() as f64 / 60. + seconds / 3600.) / 24.;
    jd + day_fraction
}

/// Greenwich mean sidereal time in hours.
/// See https://thecynster.home.blog/2019/11/04/calculating-sidereal-time/
pub fn greenwich_sidereal_time(time: DateTime<Utc>) -> Hours {
    // Off by the difference in leap seconds from this count at the given date.
    const LEAP_SECOND_TOTAL: f64 = 27.;

    let jd_utc = julian_date(time);

    let du = jd_utc - 2451545.0;
    let theta = rad_to_hours(modulo(
        TAU * (0.779_057_273_264f64 + 1.002_737_811_911_354_5f64 * du),
        TAU,
    ));

    let gmst_polynomial = poly![
        0.014506,
        4612.156534,
        1.3915817,
        -0.00000044,
        -0.000029956,
        -0.0000000368
    ];
    let jd_tt = jd_utc + ((LEAP_SECOND_TOTAL + 32.184) / 3600.) / 24.;
    let t = (jd_tt - 2451545.0) / 36525.;
    let gmst_p = deg_to_hours(modulo(gmst_polynomial.eval(t).unwrap() / 3600., 360.));

    modulo(theta + gmst_p, 24.)
}

/// Local sidereal time in hours for an east-positive longitude in degrees.
pub fn local_sidereal_time(time: DateTime<Utc>, longitude: Degrees) -> Hours {
    modulo(greenwich_sidereal_time(time) + deg_to_hours(longitude), 24.)
}

/// Altitude [deg] of a target at the given hour angle [hours], declination
/// [deg] and site latitude [deg].
pub fn alt_from_ha_dec(ha: Hours, dec: Degrees, lat: Degrees) -> Degrees {
    let ha = hours_to_rad(ha);
    let dec = deg_to_rad(dec);
    let lat = deg_to_rad(lat);
    rad_to_deg((dec.sin() * lat.sin() + dec.cos() * lat.cos() * ha.cos()).asin())
}

/// Azimuth [deg], measured from north through east, of a target at the given
/// hour angle [hours], declination [deg] and site latitude [deg].
pub fn az_from_ha_dec(ha: Hours, dec: Degrees, lat: Degrees) -> Degrees {
    let ha = hours_to_rad(ha);
    let dec = deg_to_rad(dec);
    let lat = deg_to_rad(lat);
    let az = f64::atan2(
        -ha.sin() * dec.cos(),
        dec.sin() * lat.cos() - dec.cos() * lat.sin() * ha.cos(),
    );
    wrap_at_360(rad_to_deg(az))
}

/// Hour angle [hours] and declination [deg] of the point at the given
/// altitude and azimuth [deg] for a site latitude [deg].
pub fn ha_dec_from_alt_az(alt: Degrees, az: Degrees, lat: Degrees) -> (Hours, Degrees) {
    let alt = deg_to_rad(alt);
    let az = deg_to_rad(az);
    let lat = deg_to_rad(lat);

    let dec = (alt.sin() * lat.sin() + alt.cos() * lat.cos() * az.cos()).asin();
    let ha = f64::atan2(
        -az.sin() * alt.cos(),
        alt.sin() * lat.cos() - alt.cos() * lat.sin() * az.cos(),
    );

    (modulo(rad_to_hours(ha), 24.), rad_to_deg(dec))
}

use hifitime::Epoch;

use crate::constants::{DPI, MJD, Radian, T2000};
use crate::skyfit_errors::SkyfitError;

/// Compute the Greenwich Mean Sidereal Time at a given epoch.
///
/// Uses the IAU 1982 polynomial for GMST at 0h UT1, then adds the rotation
/// accumulated over the fraction of the day, scaled by the ratio of the
/// sidereal to the solar day.
///
/// Arguments
/// ---------
/// * `tjm`: Modified Julian Date (UT1 scale; UTC is adequate at the
///   arcsecond level required for all-sky astrometry).
///
/// Return
/// ------
/// * GMST in radians, normalized to [0, 2π).
pub fn gmst(tjm: MJD) -> Radian {
    // Polynomial coefficients for GMST at 0h UT1 (in seconds)
    const C0: f64 = 24110.54841;
    const C1: f64 = 8640184.812866;
    const C2: f64 = 9.3104e-2;
    const C3: f64 = -6.2e-6;

    // Ratio of sidereal day to solar day
    const RAP: f64 = 1.00273790934;

    let t = (tjm.floor() - T2000) / 36525.0;

    // GMST at 0h UT1, converted from seconds of time to radians
    let gmst0 = (((C3 * t + C2) * t + C1) * t + C0) * DPI / 86400.0;

    // Add the fraction of the current day, sped up to the sidereal rate
    let gmst = gmst0 + tjm.fract() * DPI * RAP;

    gmst.rem_euclid(DPI)
}

/// Parse an event timestamp of the form `YYYY-MM-DD HH:MM:SS.ffffff` (UTC).
///
/// This is the timestamp format carried by sighting records. Fractional
/// seconds are optional and may have any number of digits.
///
/// Arguments
/// ---------
/// * `value`: the timestamp string.
///
/// Return
/// ------
/// * The corresponding [`hifitime::Epoch`], or
///   [`SkyfitError::MalformedTimestamp`] if any field is missing or out of range.
pub fn parse_event_time(value: &str) -> Result<Epoch, SkyfitError> {
    let malformed = || SkyfitError::MalformedTimestamp(value.to_string());

    let mut parts = value.trim().split_whitespace();
    let date = parts.next().ok_or_else(malformed)?;
    let clock = parts.next().ok_or_else(malformed)?;
    if parts.next().is_some() {
        return Err(malformed());
    }

    let mut date_fields = date.split('-');
    let year: i32 = date_fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(malformed)?;
    let month: u8 = date_fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(malformed)?;
    let day: u8 = date_fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(malformed)?;
    if date_fields.next().is_some() {
        return Err(malformed());
    }

    let mut clock_fields = clock.split(':');
    let hour: u8 = clock_fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(malformed)?;
    let minute: u8 = clock_fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(malformed)?;
    let second_field = clock_fields.next().ok_or_else(malformed)?;
    if clock_fields.next().is_some() {
        return Err(malformed());
    }

    let seconds: f64 = second_field.parse().map_err(|_| malformed())?;
    if !(0.0..60.0).contains(&seconds) {
        return Err(malformed());
    }
    let whole = seconds.trunc() as u8;
    let nanos = ((seconds - seconds.trunc()) * 1e9).round() as u32;

    Ok(Epoch::from_gregorian_utc(
        year, month, day, hour, minute, whole, nanos,
    ))
}

/// Modified Julian Date (UTC) of an epoch.
pub fn epoch_to_mjd(epoch: &Epoch) -> MJD {
    epoch.to_mjd_utc_days()
}

#[cfg(test)]
mod time_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gmst_at_j2000() {
        // GMST at the J2000.0 epoch (2000-01-01 12:00 UT): 18h 41m 50.548s
        let expected = (18.0 + 41.0 / 60.0 + 50.54841 / 3600.0) / 24.0 * DPI;
        assert_relative_eq!(gmst(T2000), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_gmst_range() {
        for mjd in [40000.0, 51544.5, 56222.98, 60725.25] {
            let g = gmst(mjd);
            assert!((0.0..DPI).contains(&g));
        }
    }

    #[test]
    fn test_gmst_advances_at_sidereal_rate() {
        // One solar day advances GMST by ~3m 56.6s of time
        let delta = (gmst(56223.0) - gmst(56222.0)).rem_euclid(DPI);
        let expected = DPI * (1.00273790934 - 1.0);
        assert_relative_eq!(delta, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_parse_event_time() {
        let epoch = parse_event_time("2012-10-22 23:43:51.333000").unwrap();
        assert_relative_eq!(
            epoch.to_mjd_utc_days(),
            56222.0 + (23.0 * 3600.0 + 43.0 * 60.0 + 51.333) / 86400.0,
            epsilon = 1e-9
        );

        let no_fraction = parse_event_time("2021-01-01 00:00:00").unwrap();
        assert_relative_eq!(no_fraction.to_mjd_utc_days(), 59215.0, epsilon = 1e-9);
    }

    #[test]
    fn test_parse_event_time_rejects_malformed() {
        for bad in ["", "2012-10-22", "2012-10-22 23:43", "yesterday night", "2012-10-22 23:43:61"] {
            assert!(parse_event_time(bad).is_err(), "accepted {bad:?}");
        }
    }
}

//! # Observing stations
//!
//! An all-sky camera is tied to a geodetic site: latitude, longitude and
//! elevation. The [`Station`] type carries that site and converts catalogue
//! equatorial positions into the horizontal frame the projection model works
//! in, via the local sidereal time.
//!
//! A small built-in registry of network stations is provided; custom sites
//! are constructed directly with [`Station::new`].

use hifitime::Epoch;

use crate::constants::{Degree, Meter, RADEG, Radian};
use crate::skyfit_errors::SkyfitError;
use crate::spherical::{AltAz, normalize_azimuth};
use crate::time::{epoch_to_mjd, gmst};

/// A geodetic observing site.
///
/// Latitude and longitude are stored in degrees (east longitude positive),
/// matching how sighting records carry them; conversions to radians happen
/// at the point of use.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub name: String,
    pub latitude: Degree,
    pub longitude: Degree,
    pub elevation: Meter,
}

impl Station {
    pub fn new(name: &str, latitude: Degree, longitude: Degree, elevation: Meter) -> Self {
        Station {
            name: name.to_string(),
            latitude,
            longitude,
            elevation,
        }
    }

    /// Look up a built-in network station by name.
    ///
    /// Return
    /// ------
    /// * The station, or [`SkyfitError::UnknownStation`] if the name is not
    ///   in the registry. Sites not listed here are created with
    ///   [`Station::new`].
    pub fn from_name(name: &str) -> Result<Self, SkyfitError> {
        builtin_stations()
            .into_iter()
            .find(|station| station.name == name)
            .ok_or_else(|| SkyfitError::UnknownStation(name.to_string()))
    }

    pub fn latitude_rad(&self) -> Radian {
        self.latitude * RADEG
    }

    pub fn longitude_rad(&self) -> Radian {
        self.longitude * RADEG
    }

    /// Local mean sidereal time at this station.
    pub fn local_sidereal_time(&self, epoch: &Epoch) -> Radian {
        normalize_azimuth(gmst(epoch_to_mjd(epoch)) + self.longitude_rad())
    }

    /// Convert an equatorial position to the horizontal frame of this
    /// station at a given epoch.
    ///
    /// Arguments
    /// ---------
    /// * `ra`: right ascension in radians.
    /// * `dec`: declination in radians.
    /// * `epoch`: time of observation.
    ///
    /// Return
    /// ------
    /// * Altitude and azimuth (azimuth from north through east).
    pub fn equatorial_to_altaz(&self, ra: Radian, dec: Radian, epoch: &Epoch) -> AltAz {
        let hour_angle = self.local_sidereal_time(epoch) - ra;
        let phi = self.latitude_rad();

        // Horizontal unit vector: x north, y east, z up
        let north = -dec.cos() * hour_angle.cos() * phi.sin() + dec.sin() * phi.cos();
        let east = -dec.cos() * hour_angle.sin();
        let up = dec.cos() * hour_angle.cos() * phi.cos() + dec.sin() * phi.sin();

        AltAz::new(up.clamp(-1.0, 1.0).asin(), normalize_azimuth(east.atan2(north)))
    }
}

/// The built-in station registry.
///
/// Covers the fixed sites of the all-sky network; observers at other
/// locations construct a [`Station`] directly from the sighting record.
pub fn builtin_stations() -> Vec<Station> {
    vec![
        Station::new("AGO", 48.37291, 17.27396, 531.1),
        Station::new("ARBO", 48.32104, 18.36919, 201.0),
        Station::new("KNM", 49.30734, 18.76538, 417.0),
    ]
}

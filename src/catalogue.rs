//! # Star catalogue
//!
//! An ordered collection of reference stars with equatorial positions and
//! visual magnitudes, loaded wholesale from a tab-separated file. Masking
//! flags entries out of the working set without deleting them; only
//! [`Catalogue::cull`] shrinks the collection, and that is irreversible.

use serde::Deserialize;

use crate::constants::{Magnitude, RADEG, Radian};
use crate::mask::ValidMask;
use crate::skyfit_errors::SkyfitError;
use crate::spherical::AltAz;
use crate::station::Station;
use hifitime::Epoch;

/// One reference star.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Star {
    /// Right ascension, radians.
    pub ra: Radian,
    /// Declination, radians.
    pub dec: Radian,
    /// Visual magnitude.
    pub vmag: Magnitude,
}

/// On-disk form of one catalogue row (degrees).
#[derive(Debug, Deserialize)]
struct StarRecord {
    ra: f64,
    dec: f64,
    vmag: f64,
}

/// The star catalogue with its validity mask.
#[derive(Debug, Clone)]
pub struct Catalogue {
    stars: Vec<Star>,
    mask: ValidMask,
}

impl Catalogue {
    pub fn new(stars: Vec<Star>) -> Self {
        let mask = ValidMask::all_valid(stars.len());
        Catalogue { stars, mask }
    }

    /// Load a catalogue from a tab-separated file with a header line and
    /// columns `ra`, `dec` (degrees) and `vmag`.
    ///
    /// The whole file is parsed before the catalogue is built, so a
    /// malformed row leaves no partially loaded state behind. Order is
    /// preserved and duplicate rows are permitted.
    pub fn from_tsv_path(path: &str) -> Result<Self, SkyfitError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(path)?;
        Self::from_records(&mut reader)
    }

    /// Load a catalogue from in-memory TSV text (same format as
    /// [`Catalogue::from_tsv_path`]).
    pub fn from_tsv(text: &str) -> Result<Self, SkyfitError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(text.as_bytes());
        Self::from_records(&mut reader)
    }

    fn from_records<R: std::io::Read>(reader: &mut csv::Reader<R>) -> Result<Self, SkyfitError> {
        let mut stars = Vec::new();
        for row in reader.deserialize::<StarRecord>() {
            let record = row?;
            stars.push(Star {
                ra: record.ra * RADEG,
                dec: record.dec * RADEG,
                vmag: record.vmag,
            });
        }
        Ok(Catalogue::new(stars))
    }

    pub fn count(&self) -> usize {
        self.stars.len()
    }

    pub fn count_valid(&self) -> usize {
        self.mask.count_valid()
    }

    pub fn is_valid(&self, index: usize) -> bool {
        self.mask.is_valid(index)
    }

    pub fn stars(&self) -> &[Star] {
        &self.stars
    }

    pub fn mask(&self) -> &ValidMask {
        &self.mask
    }

    /// Invalidate every star whose flag is set; cumulative with earlier
    /// masking.
    pub fn mask_where(&mut self, invalidate: &[bool]) -> Result<(), SkyfitError> {
        self.mask.combine(invalidate)
    }

    /// Invalidate stars fainter than the magnitude limit.
    pub fn mask_fainter_than(&mut self, limit: Magnitude) -> Result<(), SkyfitError> {
        let flags: Vec<bool> = self.stars.iter().map(|s| s.vmag > limit).collect();
        self.mask.combine(&flags)
    }

    /// Restore all remaining entries to valid.
    pub fn reset_mask(&mut self) {
        self.mask.reset();
    }

    /// Permanently discard invalid entries, renumbering the survivors.
    pub fn cull(&mut self) {
        let keep = self.mask.valid_indices();
        self.stars = keep.iter().map(|&i| self.stars[i]).collect();
        self.mask = ValidMask::all_valid(self.stars.len());
    }

    /// Reorder the catalogue into the given index order, dropping everything
    /// else. Used by the pairing step to align stars with sensor dots.
    pub(crate) fn reordered(&self, order: &[usize]) -> Catalogue {
        Catalogue::new(order.iter().map(|&i| self.stars[i]).collect())
    }

    /// Horizontal positions of the stars at a station and epoch.
    ///
    /// Arguments
    /// ---------
    /// * `station`, `epoch`: observing site and time.
    /// * `masked`: when true, only valid entries are returned (in order);
    ///   when false, every entry.
    pub fn altaz(&self, station: &Station, epoch: &Epoch, masked: bool) -> Vec<AltAz> {
        self.stars
            .iter()
            .enumerate()
            .filter(|(i, _)| !masked || self.mask.is_valid(*i))
            .map(|(_, s)| station.equatorial_to_altaz(s.ra, s.dec, epoch))
            .collect()
    }

    /// Visual magnitudes, optionally restricted to valid entries.
    pub fn vmags(&self, masked: bool) -> Vec<Magnitude> {
        self.stars
            .iter()
            .enumerate()
            .filter(|(i, _)| !masked || self.mask.is_valid(*i))
            .map(|(_, s)| s.vmag)
            .collect()
    }
}

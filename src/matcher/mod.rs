//! # Correspondence engine
//!
//! Reconciling the sensor with the catalogue happens in two phases with
//! different semantics, expressed as one sum type:
//!
//! - [`Matcher::Unpaired`] — no fixed correspondence yet; every error is a
//!   nearest-neighbour search under the trial projection.
//! - [`Matcher::Paired`] — a frozen 1:1 index correspondence; errors are
//!   direct index-wise distances and the paired residuals feed the kernel
//!   smoothers.
//!
//! A session starts unpaired, transitions to paired exactly once through
//! [`Matcher::pair`], and never transitions back. Callers branch on the
//! explicit state, or go through the uniform operations below which
//! dispatch on it; operations that only make sense when paired return
//! [`SkyfitError::NotPaired`] otherwise.
//!
//! Derived state (projected positions, smoothers) is rebuilt from its
//! inputs whenever a governing parameter changes; nothing is patched in
//! place. A session is single-threaded; embedding hosts serialize access
//! externally.

pub mod paired;
pub mod unpaired;

pub use paired::PairedMatcher;
pub use unpaired::UnpairedMatcher;

use nalgebra::Vector2;

use crate::catalogue::Catalogue;
use crate::constants::{Magnitude, Radian};
use crate::photometry::LogCalibration;
use crate::projection::{BorovickaProjection, ProjectionParams};
use crate::sensor_data::SensorData;
use crate::skyfit_errors::SkyfitError;
use crate::smoother::Kernel;
use crate::spherical::AltAz;
use crate::station::Station;

/// One row of the corrected-meteor output: everything an export layer needs
/// for a track sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedSample {
    /// Video frame index of the sample.
    pub frame: u32,
    /// Raw projected position.
    pub raw: AltAz,
    /// Corrected position; `None` when the correction field was degenerate
    /// at this sample.
    pub corrected: Option<AltAz>,
    /// The sample's own calibrated magnitude (not smoothed).
    pub magnitude: Magnitude,
}

/// Mean of an error vector; 0 for an empty one.
pub fn avg_error(errors: &[Radian]) -> Radian {
    if errors.is_empty() {
        0.0
    } else {
        errors.iter().sum::<f64>() / errors.len() as f64
    }
}

/// Maximum of an error vector; 0 for an empty one.
pub fn max_error(errors: &[Radian]) -> Radian {
    errors.iter().copied().fold(0.0, f64::max)
}

/// The correspondence engine, polymorphic over the pairing state.
#[derive(Debug, Clone)]
pub enum Matcher {
    Unpaired(UnpairedMatcher),
    Paired(PairedMatcher),
}

impl Matcher {
    /// Start an unpaired session.
    pub fn new(station: Station, catalogue: Catalogue, sensor_data: SensorData) -> Self {
        Matcher::Unpaired(UnpairedMatcher::new(station, catalogue, sensor_data))
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, Matcher::Paired(_))
    }

    pub fn catalogue(&self) -> &Catalogue {
        match self {
            Matcher::Unpaired(m) => m.catalogue(),
            Matcher::Paired(m) => m.catalogue(),
        }
    }

    pub fn sensor_data(&self) -> &SensorData {
        match self {
            Matcher::Unpaired(m) => m.sensor_data(),
            Matcher::Paired(m) => m.sensor_data(),
        }
    }

    /// Per-dot position error under a trial projection: nearest-neighbour
    /// distance when unpaired, index-wise distance when paired.
    pub fn position_errors(
        &self,
        projection: &BorovickaProjection,
        masked: bool,
    ) -> Vec<Radian> {
        match self {
            Matcher::Unpaired(m) => m.position_errors(projection, masked),
            Matcher::Paired(m) => m.position_errors(projection, masked),
        }
    }

    /// Per-star position error, the mirror image of
    /// [`Matcher::position_errors`].
    pub fn position_errors_inverse(
        &self,
        projection: &BorovickaProjection,
        masked: bool,
    ) -> Vec<Radian> {
        match self {
            Matcher::Unpaired(m) => m.position_errors_inverse(projection, masked),
            Matcher::Paired(m) => m.position_errors_inverse(projection, masked),
        }
    }

    /// Per-pair magnitude residual. Requires a pairing.
    pub fn magnitude_errors(
        &self,
        calibration: &LogCalibration,
        masked: bool,
    ) -> Result<Vec<Magnitude>, SkyfitError> {
        match self {
            Matcher::Unpaired(_) => Err(SkyfitError::NotPaired),
            Matcher::Paired(m) => Ok(m.magnitude_errors(calibration, masked)),
        }
    }

    /// Invalidate catalogue entries whose flag is set. When paired, the
    /// flags hit both sides identically, preserving the count invariant.
    pub fn mask_catalogue(&mut self, invalidate: &[bool]) -> Result<(), SkyfitError> {
        match self {
            Matcher::Unpaired(m) => m.catalogue_mut().mask_where(invalidate),
            Matcher::Paired(m) => m.mask_where(invalidate),
        }
    }

    /// Invalidate sensor dots whose flag is set; same pairing rule as
    /// [`Matcher::mask_catalogue`].
    pub fn mask_sensor_data(&mut self, invalidate: &[bool]) -> Result<(), SkyfitError> {
        match self {
            Matcher::Unpaired(m) => m.sensor_data_mut().dots.mask_where(invalidate),
            Matcher::Paired(m) => m.mask_where(invalidate),
        }
    }

    /// Invalidate catalogue stars fainter than the magnitude limit.
    pub fn mask_catalogue_fainter_than(&mut self, limit: Magnitude) -> Result<(), SkyfitError> {
        match self {
            Matcher::Unpaired(m) => m.catalogue_mut().mask_fainter_than(limit),
            Matcher::Paired(m) => m.mask_fainter_than(limit),
        }
    }

    /// Invalidate sensor dots whose position error under the projection
    /// exceeds the limit.
    pub fn mask_sensor_data_by_error(
        &mut self,
        projection: &BorovickaProjection,
        limit: Radian,
    ) -> Result<(), SkyfitError> {
        let flags: Vec<bool> = self
            .position_errors(projection, false)
            .into_iter()
            .map(|error| error > limit)
            .collect();
        self.mask_sensor_data(&flags)
    }

    /// Invalidate catalogue stars farther than the limit from any sensor
    /// dot under the projection.
    pub fn mask_catalogue_by_distance(
        &mut self,
        projection: &BorovickaProjection,
        limit: Radian,
    ) -> Result<(), SkyfitError> {
        let flags: Vec<bool> = self
            .position_errors_inverse(projection, false)
            .into_iter()
            .map(|error| error > limit)
            .collect();
        self.mask_catalogue(&flags)
    }

    /// Restore all remaining entries to valid. Cannot undo a prior cull.
    pub fn reset_mask(&mut self) {
        match self {
            Matcher::Unpaired(m) => {
                m.catalogue_mut().reset_mask();
                m.sensor_data_mut().dots.reset_mask();
            }
            Matcher::Paired(m) => m.reset_mask(),
        }
    }

    /// Permanently discard invalid entries. Irreversible within a session;
    /// call only once the correspondence is stable.
    pub fn cull(&mut self) {
        match self {
            Matcher::Unpaired(m) => {
                m.catalogue_mut().cull();
                m.sensor_data_mut().dots.cull();
            }
            Matcher::Paired(m) => m.cull(),
        }
    }

    /// Transition to the paired state under the given projection.
    ///
    /// On an unpaired matcher this establishes the 1:1 nearest-neighbour
    /// correspondence (culling both sides first); on failure the matcher is
    /// left in its previous state. On an already-paired matcher the call
    /// culls invalid pairs and otherwise does nothing — the correspondence
    /// is established exactly once.
    pub fn pair(&mut self, projection: &BorovickaProjection) -> Result<(), SkyfitError> {
        match self {
            Matcher::Unpaired(m) => {
                let paired = m.pair(projection)?;
                *self = Matcher::Paired(paired);
                Ok(())
            }
            Matcher::Paired(m) => {
                m.cull();
                Ok(())
            }
        }
    }

    /// Rebuild the position smoother from the current pairing. A no-op
    /// before pairing: there are no fixed residuals to learn from yet.
    pub fn update_position_smoother(
        &mut self,
        projection: &BorovickaProjection,
        kernel: Kernel,
        bandwidth: f64,
    ) -> Result<(), SkyfitError> {
        match self {
            Matcher::Unpaired(_) => Ok(()),
            Matcher::Paired(m) => m.update_position_smoother(projection, kernel, bandwidth),
        }
    }

    /// Rebuild the magnitude smoother from the current pairing. A no-op
    /// before pairing.
    pub fn update_magnitude_smoother(
        &mut self,
        projection: &BorovickaProjection,
        calibration: &LogCalibration,
        kernel: Kernel,
        bandwidth: f64,
    ) -> Result<(), SkyfitError> {
        match self {
            Matcher::Unpaired(_) => Ok(()),
            Matcher::Paired(m) => {
                m.update_magnitude_smoother(projection, calibration, kernel, bandwidth)
            }
        }
    }

    /// Raw projected meteor track.
    pub fn project_meteor(&self, projection: &BorovickaProjection) -> Vec<AltAz> {
        match self {
            Matcher::Unpaired(m) => m.sensor_data().meteor.project(projection),
            Matcher::Paired(m) => m.project_meteor(projection),
        }
    }

    /// Corrected meteor track positions. Requires a pairing with a fitted
    /// position smoother.
    pub fn correct_meteor(
        &self,
        projection: &BorovickaProjection,
    ) -> Result<Vec<Option<AltAz>>, SkyfitError> {
        match self {
            Matcher::Unpaired(_) => Err(SkyfitError::NotPaired),
            Matcher::Paired(m) => m.correct_meteor(projection),
        }
    }

    /// Full corrected-meteor output record. Requires a pairing with a
    /// fitted position smoother.
    pub fn corrected_track(
        &self,
        projection: &BorovickaProjection,
        calibration: &LogCalibration,
    ) -> Result<Vec<CorrectedSample>, SkyfitError> {
        match self {
            Matcher::Unpaired(_) => Err(SkyfitError::NotPaired),
            Matcher::Paired(m) => m.corrected_track(projection, calibration),
        }
    }

    /// Position-correction field on a grid over the unit disk.
    pub fn correction_grid(
        &self,
        resolution: usize,
    ) -> Result<Vec<(Vector2<f64>, Option<Vector2<f64>>)>, SkyfitError> {
        match self {
            Matcher::Unpaired(_) => Err(SkyfitError::NotPaired),
            Matcher::Paired(m) => m.correction_grid(resolution),
        }
    }

    /// Magnitude-correction field on a grid over the unit disk.
    pub fn magnitude_grid(
        &self,
        resolution: usize,
    ) -> Result<Vec<(Vector2<f64>, Option<Magnitude>)>, SkyfitError> {
        match self {
            Matcher::Unpaired(_) => Err(SkyfitError::NotPaired),
            Matcher::Paired(m) => m.magnitude_grid(resolution),
        }
    }

    /// Cost of a trial parameter vector for the calibration optimizer: the
    /// mean squared position error over valid entries.
    pub fn cost(&self, params: &ProjectionParams) -> f64 {
        let projection = BorovickaProjection::new(*params);
        let errors = self.position_errors(&projection, true);
        if errors.is_empty() {
            return 0.0;
        }
        errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64
    }
}

//! Paired correspondence: a fixed 1:1 index association between sensor dots
//! and catalogue stars. Error computation is a direct index-wise distance,
//! and the paired residuals drive the kernel smoothers that learn the
//! position and magnitude correction fields.

use hifitime::Epoch;
use nalgebra::{Vector1, Vector2};
use tracing::debug;

use crate::catalogue::Catalogue;
use crate::constants::{Magnitude, Radian};
use crate::photometry::LogCalibration;
use crate::projection::BorovickaProjection;
use crate::sensor_data::SensorData;
use crate::skyfit_errors::SkyfitError;
use crate::smoother::{Kernel, KernelSmoother};
use crate::spherical::{AltAz, altaz_to_disk, angular_difference, angular_distance, disk_to_altaz};
use crate::station::Station;

use super::CorrectedSample;

/// Matcher state after pairing.
///
/// Invariant: the catalogue and the dot collection have the same length and
/// identical validity masks; every masking operation goes through
/// [`PairedMatcher::mask_where`], which applies the flags to both sides.
/// The smoothers are derived state — any change to the pairing or the masks
/// drops them, to be rebuilt from current residuals.
#[derive(Debug, Clone)]
pub struct PairedMatcher {
    pub(crate) station: Station,
    pub(crate) epoch: Epoch,
    pub(crate) catalogue: Catalogue,
    pub(crate) sensor_data: SensorData,
    position_smoother: Option<KernelSmoother<2>>,
    magnitude_smoother: Option<KernelSmoother<1>>,
}

impl PairedMatcher {
    /// Build a paired matcher from collections already reduced to the same
    /// length.
    ///
    /// Return
    /// ------
    /// * The matcher, or [`SkyfitError::CorrespondenceMismatch`] if the
    ///   counts differ.
    pub fn new(
        station: Station,
        epoch: Epoch,
        catalogue: Catalogue,
        sensor_data: SensorData,
    ) -> Result<Self, SkyfitError> {
        if catalogue.count() != sensor_data.dots.count() {
            return Err(SkyfitError::CorrespondenceMismatch {
                catalogue: catalogue.count(),
                dots: sensor_data.dots.count(),
            });
        }
        debug!(pairs = catalogue.count(), "paired matcher constructed");
        Ok(PairedMatcher {
            station,
            epoch,
            catalogue,
            sensor_data,
            position_smoother: None,
            magnitude_smoother: None,
        })
    }

    pub fn count(&self) -> usize {
        self.catalogue.count()
    }

    pub fn count_valid(&self) -> usize {
        self.catalogue.count_valid()
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn sensor_data(&self) -> &SensorData {
        &self.sensor_data
    }

    /// Invalidate pairs whose flag is set, on both sides identically.
    pub fn mask_where(&mut self, invalidate: &[bool]) -> Result<(), SkyfitError> {
        self.catalogue.mask_where(invalidate)?;
        self.sensor_data.dots.mask_where(invalidate)?;
        self.invalidate_smoothers();
        Ok(())
    }

    /// Invalidate pairs whose catalogue star is fainter than the limit.
    pub fn mask_fainter_than(&mut self, limit: Magnitude) -> Result<(), SkyfitError> {
        let flags: Vec<bool> = self
            .catalogue
            .stars()
            .iter()
            .map(|s| s.vmag > limit)
            .collect();
        self.mask_where(&flags)
    }

    /// Restore every pair to valid.
    pub fn reset_mask(&mut self) {
        self.catalogue.reset_mask();
        self.sensor_data.dots.reset_mask();
        self.invalidate_smoothers();
    }

    /// Permanently discard invalid pairs from both sides.
    pub fn cull(&mut self) {
        self.catalogue.cull();
        self.sensor_data.dots.cull();
        self.invalidate_smoothers();
        debug!(pairs = self.count(), "culled paired collections");
    }

    fn invalidate_smoothers(&mut self) {
        self.position_smoother = None;
        self.magnitude_smoother = None;
    }

    /// Index-wise angular distance between each dot's projected position and
    /// its paired star.
    pub fn position_errors(
        &self,
        projection: &BorovickaProjection,
        masked: bool,
    ) -> Vec<Radian> {
        let dots = self.sensor_data.dots.project(projection, masked);
        let stars = self.catalogue.altaz(&self.station, &self.epoch, masked);
        dots.iter()
            .zip(stars.iter())
            .map(|(d, s)| angular_distance(*d, *s))
            .collect()
    }

    /// With a fixed pairing the inverse search degenerates to the same
    /// index-wise distances.
    pub fn position_errors_inverse(
        &self,
        projection: &BorovickaProjection,
        masked: bool,
    ) -> Vec<Radian> {
        self.position_errors(projection, masked)
    }

    /// Directional (Δ co-altitude, Δ azimuth) residual per pair, pointing
    /// from the projected dot towards its star.
    pub fn position_vector_errors(
        &self,
        projection: &BorovickaProjection,
        masked: bool,
    ) -> Vec<Vector2<f64>> {
        let dots = self.sensor_data.dots.project(projection, masked);
        let stars = self.catalogue.altaz(&self.station, &self.epoch, masked);
        dots.iter()
            .zip(stars.iter())
            .map(|(d, s)| angular_difference(*d, *s))
            .collect()
    }

    /// Catalogue-minus-instrumental magnitude residual per pair.
    pub fn magnitude_errors(
        &self,
        calibration: &LogCalibration,
        masked: bool,
    ) -> Vec<Magnitude> {
        let observed = self.sensor_data.dots.magnitudes(calibration, masked);
        let vmags = self.catalogue.vmags(masked);
        vmags
            .iter()
            .zip(observed.iter())
            .map(|(v, o)| v - o)
            .collect()
    }

    /// Rebuild the position smoother from the current valid pairs.
    ///
    /// Training points are the projected dots in disk coordinates; the
    /// residual at each point is the disk-space offset towards the paired
    /// star. Must be called again after any change to the projection
    /// parameters, the bandwidth or the masks — the previous field is
    /// dropped, never patched.
    pub fn update_position_smoother(
        &mut self,
        projection: &BorovickaProjection,
        kernel: Kernel,
        bandwidth: f64,
    ) -> Result<(), SkyfitError> {
        let observed: Vec<Vector2<f64>> = self
            .sensor_data
            .dots
            .project(projection, true)
            .into_iter()
            .map(altaz_to_disk)
            .collect();
        let residuals: Vec<Vector2<f64>> = self
            .catalogue
            .altaz(&self.station, &self.epoch, true)
            .into_iter()
            .map(altaz_to_disk)
            .zip(observed.iter())
            .map(|(cat, obs)| cat - obs)
            .collect();
        self.position_smoother = Some(KernelSmoother::new(
            observed, residuals, kernel, bandwidth,
        )?);
        Ok(())
    }

    /// Rebuild the magnitude smoother from the current valid pairs.
    pub fn update_magnitude_smoother(
        &mut self,
        projection: &BorovickaProjection,
        calibration: &LogCalibration,
        kernel: Kernel,
        bandwidth: f64,
    ) -> Result<(), SkyfitError> {
        let points: Vec<Vector2<f64>> = self
            .sensor_data
            .dots
            .project(projection, true)
            .into_iter()
            .map(altaz_to_disk)
            .collect();
        let residuals: Vec<Vector1<f64>> = self
            .magnitude_errors(calibration, true)
            .into_iter()
            .map(Vector1::new)
            .collect();
        self.magnitude_smoother = Some(KernelSmoother::new(
            points, residuals, kernel, bandwidth,
        )?);
        Ok(())
    }

    pub fn position_smoother(&self) -> Option<&KernelSmoother<2>> {
        self.position_smoother.as_ref()
    }

    pub fn magnitude_smoother(&self) -> Option<&KernelSmoother<1>> {
        self.magnitude_smoother.as_ref()
    }

    /// Raw (uncorrected) sky positions of the meteor track.
    pub fn project_meteor(&self, projection: &BorovickaProjection) -> Vec<AltAz> {
        self.sensor_data.meteor.project(projection)
    }

    /// Corrected sky positions of the meteor track.
    ///
    /// Each sample is projected, moved to disk coordinates, shifted by the
    /// learned correction and lifted back to the sky. A degenerate smoother
    /// query yields `None` for that sample only.
    ///
    /// Return
    /// ------
    /// * One entry per track sample, or [`SkyfitError::SmootherNotFitted`]
    ///   if the position smoother has not been rebuilt since the last
    ///   parameter change.
    pub fn correct_meteor(
        &self,
        projection: &BorovickaProjection,
    ) -> Result<Vec<Option<AltAz>>, SkyfitError> {
        let smoother = self
            .position_smoother
            .as_ref()
            .ok_or(SkyfitError::SmootherNotFitted)?;
        Ok(self
            .project_meteor(projection)
            .into_iter()
            .map(|raw| {
                let xy = altaz_to_disk(raw);
                smoother.estimate(xy).ok().map(|dxdy| disk_to_altaz(xy + dxdy))
            })
            .collect())
    }

    /// The full corrected-meteor output record: per sample the frame index,
    /// the raw and corrected positions and the sample's own magnitude.
    pub fn corrected_track(
        &self,
        projection: &BorovickaProjection,
        calibration: &LogCalibration,
    ) -> Result<Vec<CorrectedSample>, SkyfitError> {
        let raw = self.project_meteor(projection);
        let corrected = self.correct_meteor(projection)?;
        Ok(self
            .sensor_data
            .meteor
            .samples()
            .iter()
            .zip(raw.into_iter().zip(corrected))
            .map(|(sample, (raw, corrected))| CorrectedSample {
                frame: sample.frame,
                raw,
                corrected,
                magnitude: calibration.magnitude(sample.intensity),
            })
            .collect())
    }

    /// Evaluate the position-correction field on a square grid over the unit
    /// disk. Nodes outside the disk, and degenerate queries, are `None`.
    pub fn correction_grid(
        &self,
        resolution: usize,
    ) -> Result<Vec<(Vector2<f64>, Option<Vector2<f64>>)>, SkyfitError> {
        let smoother = self
            .position_smoother
            .as_ref()
            .ok_or(SkyfitError::SmootherNotFitted)?;
        Ok(smoother.estimate_grid(resolution))
    }

    /// Evaluate the magnitude-correction field on a square grid over the
    /// unit disk.
    pub fn magnitude_grid(
        &self,
        resolution: usize,
    ) -> Result<Vec<(Vector2<f64>, Option<Magnitude>)>, SkyfitError> {
        let smoother = self
            .magnitude_smoother
            .as_ref()
            .ok_or(SkyfitError::SmootherNotFitted)?;
        Ok(smoother
            .estimate_grid(resolution)
            .into_iter()
            .map(|(position, value)| (position, value.map(|v| v.x)))
            .collect())
    }
}

#[cfg(test)]
mod paired_test {
    use super::*;
    use crate::matcher::unpaired::unpaired_test::{
        equator_station, synthetic_scene, test_epoch,
    };
    use crate::matcher::UnpairedMatcher;
    use crate::projection::ProjectionParams;
    use crate::constants::RADEG;
    use approx::assert_relative_eq;

    fn paired_scene() -> PairedMatcher {
        let (catalogue, sensor_data) = synthetic_scene(&[
            (10.0 * RADEG, 0.0),
            (45.0 * RADEG, 90.0 * RADEG),
            (80.0 * RADEG, 180.0 * RADEG),
            (30.0 * RADEG, 270.0 * RADEG),
        ]);
        let matcher = UnpairedMatcher::new(equator_station(), catalogue, sensor_data);
        let projection = BorovickaProjection::new(ProjectionParams::identity());
        matcher.pair(&projection).unwrap()
    }

    #[test]
    fn test_construction_rejects_unequal_counts() {
        let (_, sensor_data) = synthetic_scene(&[(45.0 * RADEG, 0.0)]);
        let (empty_catalogue, _) = synthetic_scene(&[]);
        let result = PairedMatcher::new(
            equator_station(),
            test_epoch(),
            empty_catalogue,
            sensor_data,
        );
        assert!(matches!(
            result,
            Err(SkyfitError::CorrespondenceMismatch { .. })
        ));
    }

    #[test]
    fn test_masking_keeps_sides_aligned() {
        let mut paired = paired_scene();
        paired.mask_where(&[true, false, false, true]).unwrap();
        assert_eq!(paired.catalogue().count_valid(), 2);
        assert_eq!(paired.sensor_data().dots.count_valid(), 2);
        paired.reset_mask();
        assert_eq!(paired.catalogue().count_valid(), 4);
        assert_eq!(paired.sensor_data().dots.count_valid(), 4);
    }

    #[test]
    fn test_magnitude_masking_drops_both_sides_equally() {
        let mut paired = paired_scene();
        // All synthetic stars have vmag 2.0: a limit below that kills all,
        // above keeps all
        paired.mask_fainter_than(1.0).unwrap();
        assert_eq!(paired.catalogue().count_valid(), 0);
        assert_eq!(paired.sensor_data().dots.count_valid(), 0);
        paired.reset_mask();
        paired.mask_fainter_than(3.0).unwrap();
        assert_eq!(paired.catalogue().count_valid(), 4);
        assert_eq!(paired.sensor_data().dots.count_valid(), 4);
    }

    #[test]
    fn test_index_wise_errors() {
        let paired = paired_scene();
        let projection = BorovickaProjection::new(ProjectionParams::identity());
        let errors = paired.position_errors(&projection, true);
        assert_eq!(errors.len(), 4);
        for error in errors {
            assert!(error < 1e-9);
        }
    }

    #[test]
    fn test_smoother_learns_shift() {
        let mut paired = paired_scene();
        // Introduce a known distortion: shift the optical axis slightly
        let shifted = BorovickaProjection::new(ProjectionParams {
            x0: 0.02,
            ..ProjectionParams::identity()
        });
        paired
            .update_position_smoother(&shifted, Kernel::NegExp, 0.3)
            .unwrap();

        // The learned correction at a training point pulls the projected
        // position back towards the catalogue star
        let errors_before = paired.position_errors(&shifted, true);
        let observed = paired.sensor_data.dots.project(&shifted, true);
        let stars = paired.catalogue.altaz(&paired.station, &paired.epoch, true);
        let smoother = paired.position_smoother().unwrap();
        for ((obs, star), before) in observed.iter().zip(&stars).zip(&errors_before) {
            let xy = altaz_to_disk(*obs);
            let corrected = disk_to_altaz(xy + smoother.estimate(xy).unwrap());
            let after = angular_distance(corrected, *star);
            assert!(
                after < *before,
                "correction must reduce the error ({after} !< {before})"
            );
        }
    }

    #[test]
    fn test_correct_meteor_requires_fitted_smoother() {
        let paired = paired_scene();
        let projection = BorovickaProjection::new(ProjectionParams::identity());
        assert!(matches!(
            paired.correct_meteor(&projection),
            Err(SkyfitError::SmootherNotFitted)
        ));
    }

    #[test]
    fn test_masking_invalidates_smoothers() {
        let mut paired = paired_scene();
        let projection = BorovickaProjection::new(ProjectionParams::identity());
        paired
            .update_position_smoother(&projection, Kernel::NegExp, 0.3)
            .unwrap();
        assert!(paired.position_smoother().is_some());
        paired.mask_where(&[false, false, false, true]).unwrap();
        assert!(paired.position_smoother().is_none());
    }

    #[test]
    fn test_magnitude_errors_and_smoother() {
        let mut paired = paired_scene();
        let projection = BorovickaProjection::new(ProjectionParams::identity());
        // Synthetic dots all have intensity 4000 → instrumental magnitude 0,
        // catalogue vmag 2 → residual 2 everywhere
        let calibration = LogCalibration::new(4000.0);
        for residual in paired.magnitude_errors(&calibration, true) {
            assert_relative_eq!(residual, 2.0, epsilon = 1e-12);
        }
        paired
            .update_magnitude_smoother(&projection, &calibration, Kernel::NegExp, 0.3)
            .unwrap();
        let grid = paired.magnitude_grid(11).unwrap();
        let center = &grid[(11 * 11) / 2];
        assert_relative_eq!(center.1.unwrap(), 2.0, epsilon = 1e-9);
    }
}

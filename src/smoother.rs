//! # Kernel-weighted residual smoother
//!
//! A Nadaraya–Watson estimator over the unit disk: given training pairs of
//! (disk position, residual), the estimate at a query point is the
//! kernel-weighted average of the training residuals,
//!
//! ```text
//! r(q) = Σᵢ wᵢ(q)·rᵢ / Σᵢ wᵢ(q),    wᵢ(q) = kernel(‖q − pᵢ‖ / h)
//! ```
//!
//! with bandwidth `h` controlling locality. Because the estimate is a
//! continuous weighted average rather than a nearest-neighbour lookup,
//! ordering and tie-breaking among training points are irrelevant.
//!
//! The residual dimension is const-generic: the position smoother runs with
//! `N = 2` (disk-space correction vectors), the magnitude smoother with
//! `N = 1` (scalar magnitude offsets). Both are rebuilt wholesale whenever
//! the projection parameters, the bandwidth or the pairing change.

use nalgebra::{SVector, Vector2};

use crate::skyfit_errors::SkyfitError;

/// Weighting kernel for the smoother.
///
/// All kernels take the normalized distance `d = ‖q − p‖ / h` and return a
/// non-negative weight. The negative-exponential kernel is the default; the
/// compactly supported kernels reach exactly zero past `d = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Kernel {
    /// `exp(−d)` — slowly decaying, never exactly zero.
    #[default]
    NegExp,
    /// `exp(−d²/2)`.
    Gaussian,
    /// `¾·(1 − d²)` for `d < 1`, else 0.
    Epanechnikov,
    /// `½` for `d < 1`, else 0.
    Uniform,
}

impl Kernel {
    pub fn weight(&self, d: f64) -> f64 {
        match self {
            Kernel::NegExp => (-d).exp(),
            Kernel::Gaussian => (-0.5 * d * d).exp(),
            Kernel::Epanechnikov => {
                if d < 1.0 {
                    0.75 * (1.0 - d * d)
                } else {
                    0.0
                }
            }
            Kernel::Uniform => {
                if d < 1.0 {
                    0.5
                } else {
                    0.0
                }
            }
        }
    }
}

/// A fitted residual field: training points, residuals, kernel, bandwidth.
///
/// Immutable once constructed; a parameter change on the caller's side means
/// building a new smoother, not patching this one.
#[derive(Debug, Clone)]
pub struct KernelSmoother<const N: usize> {
    points: Vec<Vector2<f64>>,
    residuals: Vec<SVector<f64, N>>,
    kernel: Kernel,
    bandwidth: f64,
}

impl<const N: usize> KernelSmoother<N> {
    /// Construct a smoother from training pairs.
    ///
    /// Arguments
    /// ---------
    /// * `points`: query-domain positions of the training data (disk space).
    /// * `residuals`: the residual observed at each position.
    /// * `kernel`: weighting kernel.
    /// * `bandwidth`: locality parameter `h`, finite and positive.
    ///
    /// Return
    /// ------
    /// * The smoother, or an error if the arrays are empty, differ in
    ///   length, or the bandwidth is degenerate.
    pub fn new(
        points: Vec<Vector2<f64>>,
        residuals: Vec<SVector<f64, N>>,
        kernel: Kernel,
        bandwidth: f64,
    ) -> Result<Self, SkyfitError> {
        if points.len() != residuals.len() {
            return Err(SkyfitError::SmootherLengthMismatch {
                points: points.len(),
                residuals: residuals.len(),
            });
        }
        if points.is_empty() {
            return Err(SkyfitError::EmptySmootherTraining);
        }
        if !bandwidth.is_finite() || bandwidth <= 0.0 {
            return Err(SkyfitError::InvalidBandwidth(bandwidth));
        }
        Ok(KernelSmoother {
            points,
            residuals,
            kernel,
            bandwidth,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Estimate the residual at a query point.
    ///
    /// Return
    /// ------
    /// * The weighted average of the training residuals, or
    ///   [`SkyfitError::DegenerateSmootherQuery`] if every kernel weight
    ///   underflows to zero (query far outside the training support, or a
    ///   pathologically small bandwidth). The condition is per-query and
    ///   does not invalidate the smoother.
    pub fn estimate(&self, query: Vector2<f64>) -> Result<SVector<f64, N>, SkyfitError> {
        let mut weight_sum = 0.0;
        let mut accumulator = SVector::<f64, N>::zeros();

        for (point, residual) in self.points.iter().zip(self.residuals.iter()) {
            let w = self.kernel.weight((query - point).norm() / self.bandwidth);
            weight_sum += w;
            accumulator += residual * w;
        }

        if weight_sum <= f64::MIN_POSITIVE {
            return Err(SkyfitError::DegenerateSmootherQuery {
                x: query.x,
                y: query.y,
            });
        }
        Ok(accumulator / weight_sum)
    }

    /// Estimate the residual at every query point of a batch.
    ///
    /// Degenerate queries yield `None` for their own slot only; they do not
    /// abort the batch.
    pub fn estimate_batch(&self, queries: &[Vector2<f64>]) -> Vec<Option<SVector<f64, N>>> {
        queries
            .iter()
            .map(|q| self.estimate(*q).ok())
            .collect()
    }

    /// Evaluate the smoother on a square grid spanning [−1, 1]².
    ///
    /// Nodes outside the unit disk are skipped (`None`), matching the
    /// visible hemisphere; degenerate queries inside the disk are `None` as
    /// well. Nodes are returned row by row, `resolution × resolution` of
    /// them, each with its disk position.
    pub fn estimate_grid(&self, resolution: usize) -> Vec<(Vector2<f64>, Option<SVector<f64, N>>)> {
        let mut nodes = Vec::with_capacity(resolution * resolution);
        for row in 0..resolution {
            for col in 0..resolution {
                let position = grid_node(row, col, resolution);
                let value = if position.norm() <= 1.0 {
                    self.estimate(position).ok()
                } else {
                    None
                };
                nodes.push((position, value));
            }
        }
        nodes
    }
}

/// Position of one node of the `resolution × resolution` grid over [−1, 1]².
fn grid_node(row: usize, col: usize, resolution: usize) -> Vector2<f64> {
    let step = if resolution > 1 {
        2.0 / (resolution - 1) as f64
    } else {
        0.0
    };
    Vector2::new(-1.0 + col as f64 * step, -1.0 + row as f64 * step)
}

#[cfg(test)]
mod smoother_test {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector1;

    fn training() -> (Vec<Vector2<f64>>, Vec<Vector2<f64>>) {
        let points = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(0.5, 0.0),
            Vector2::new(0.0, 0.5),
            Vector2::new(-0.4, -0.3),
        ];
        let residuals = vec![
            Vector2::new(0.01, 0.00),
            Vector2::new(0.00, 0.02),
            Vector2::new(-0.01, 0.01),
            Vector2::new(0.02, -0.01),
        ];
        (points, residuals)
    }

    #[test]
    fn test_constructor_validation() {
        let (points, residuals) = training();
        assert!(matches!(
            KernelSmoother::new(points.clone(), residuals[..2].to_vec(), Kernel::NegExp, 0.1),
            Err(SkyfitError::SmootherLengthMismatch { .. })
        ));
        assert!(matches!(
            KernelSmoother::<2>::new(vec![], vec![], Kernel::NegExp, 0.1),
            Err(SkyfitError::EmptySmootherTraining)
        ));
        assert!(matches!(
            KernelSmoother::new(points, residuals, Kernel::NegExp, 0.0),
            Err(SkyfitError::InvalidBandwidth(_))
        ));
    }

    #[test]
    fn test_training_point_recovered_as_bandwidth_shrinks() {
        let (points, residuals) = training();
        for (kernel, bandwidth) in [(Kernel::NegExp, 1e-3), (Kernel::Gaussian, 1e-2)] {
            let smoother =
                KernelSmoother::new(points.clone(), residuals.clone(), kernel, bandwidth).unwrap();
            let estimate = smoother.estimate(points[1]).unwrap();
            assert_relative_eq!(estimate.x, residuals[1].x, epsilon = 1e-6);
            assert_relative_eq!(estimate.y, residuals[1].y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_wide_bandwidth_averages_everything() {
        let (points, residuals) = training();
        let mean = residuals.iter().sum::<Vector2<f64>>() / residuals.len() as f64;
        let smoother = KernelSmoother::new(points, residuals, Kernel::Gaussian, 1e4).unwrap();
        let estimate = smoother.estimate(Vector2::new(0.3, -0.2)).unwrap();
        assert_relative_eq!(estimate.x, mean.x, epsilon = 1e-6);
        assert_relative_eq!(estimate.y, mean.y, epsilon = 1e-6);
    }

    #[test]
    fn test_degenerate_query_reported_not_panicking() {
        let (points, residuals) = training();
        let smoother =
            KernelSmoother::new(points, residuals, Kernel::Epanechnikov, 0.05).unwrap();
        // Far outside the compact support of every training point
        let result = smoother.estimate(Vector2::new(0.9, 0.9));
        assert!(matches!(
            result,
            Err(SkyfitError::DegenerateSmootherQuery { .. })
        ));
    }

    #[test]
    fn test_batch_isolates_degenerate_queries() {
        let (points, residuals) = training();
        let smoother =
            KernelSmoother::new(points, residuals, Kernel::Epanechnikov, 0.05).unwrap();
        let batch = smoother.estimate_batch(&[
            Vector2::new(0.0, 0.0),
            Vector2::new(0.9, 0.9),
            Vector2::new(0.5, 0.0),
        ]);
        assert!(batch[0].is_some());
        assert!(batch[1].is_none());
        assert!(batch[2].is_some());
    }

    #[test]
    fn test_scalar_instance() {
        let points = vec![Vector2::new(0.0, 0.0), Vector2::new(0.2, 0.1)];
        let residuals = vec![Vector1::new(0.5), Vector1::new(-0.3)];
        let smoother = KernelSmoother::new(points, residuals, Kernel::NegExp, 1e-3).unwrap();
        let estimate = smoother.estimate(Vector2::new(0.0, 0.0)).unwrap();
        assert_relative_eq!(estimate.x, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_grid_masks_outside_disk() {
        let (points, residuals) = training();
        let smoother = KernelSmoother::new(points, residuals, Kernel::NegExp, 0.3).unwrap();
        let grid = smoother.estimate_grid(21);
        assert_eq!(grid.len(), 21 * 21);
        for (position, value) in &grid {
            if position.norm() > 1.0 {
                assert!(value.is_none());
            } else {
                assert!(value.is_some());
            }
        }
        // Corners lie outside the disk, the center inside
        assert!(grid[0].1.is_none());
        assert!(grid[(21 * 21) / 2].1.is_some());
    }
}

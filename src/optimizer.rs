//! # Calibration optimizer
//!
//! A thin driver that searches the 12-dimensional projection parameter
//! space for the vector minimizing the matcher's position error. The search
//! is a Nelder–Mead downhill simplex: derivative-free, bounded by an
//! iteration budget, and guaranteed to hand back the best vertex found even
//! when the budget runs out — non-convergence is a soft outcome flag, never
//! an error.
//!
//! The cost function is supplied by the caller (normally
//! [`Matcher::cost`](crate::matcher::Matcher::cost)); the optimizer knows
//! nothing about matchers or projections beyond the parameter vector.

use nalgebra::SVector;
use tracing::debug;

use crate::projection::ProjectionParams;

const DIM: usize = 12;

type ParamVector = SVector<f64, DIM>;

/// Search settings with the usual fluent builder.
///
/// Defaults are deliberately generous: all-sky calibrations are cheap to
/// evaluate and the simplex is restarted from scratch on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParams {
    /// Iteration budget; the search stops here regardless of convergence.
    pub max_iterations: usize,
    /// Relative scale of the initial simplex around the starting vector.
    pub simplex_scale: f64,
    /// Convergence threshold on the cost spread across the simplex.
    pub tolerance: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        FitParams {
            max_iterations: 500,
            simplex_scale: 0.05,
            tolerance: 1e-12,
        }
    }
}

impl FitParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> FitParamsBuilder {
        FitParamsBuilder::new()
    }
}

/// Fluent builder for [`FitParams`].
#[derive(Debug, Clone, Default)]
pub struct FitParamsBuilder {
    params: FitParams,
}

impl FitParamsBuilder {
    pub fn new() -> Self {
        FitParamsBuilder {
            params: FitParams::default(),
        }
    }

    pub fn max_iterations(mut self, value: usize) -> Self {
        self.params.max_iterations = value;
        self
    }

    pub fn simplex_scale(mut self, value: f64) -> Self {
        self.params.simplex_scale = value;
        self
    }

    pub fn tolerance(mut self, value: f64) -> Self {
        self.params.tolerance = value;
        self
    }

    pub fn build(self) -> FitParams {
        self.params
    }
}

/// Outcome of a calibration fit.
///
/// Always carries the best parameter vector found; `converged` is false
/// when the iteration budget ran out first, and the caller decides how to
/// present that.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOutcome {
    /// Best parameter vector found.
    pub params: ProjectionParams,
    /// Cost at the best vector.
    pub cost: f64,
    /// Iterations actually performed.
    pub iterations: usize,
    /// Whether the simplex collapsed below the tolerance within the budget.
    pub converged: bool,
}

/// Minimize a cost function over the projection parameter space.
///
/// Arguments
/// ---------
/// * `cost`: the error function of the trial parameters; supplied by the
///   current matcher.
/// * `initial`: the starting parameter vector.
/// * `options`: iteration budget, simplex scale and tolerance.
///
/// Return
/// ------
/// * The best vector found and a convergence indicator; see [`FitOutcome`].
pub fn minimize<F>(cost: F, initial: &ProjectionParams, options: &FitParams) -> FitOutcome
where
    F: Fn(&ProjectionParams) -> f64,
{
    // Standard Nelder–Mead coefficients
    const REFLECT: f64 = 1.0;
    const EXPAND: f64 = 2.0;
    const CONTRACT: f64 = 0.5;
    const SHRINK: f64 = 0.5;

    let evaluate = |v: &ParamVector| cost(&ProjectionParams::from_array(&vector_to_array(v)));

    // Initial simplex: the starting point plus one vertex per coordinate,
    // displaced proportionally to the coordinate magnitude (or by a small
    // absolute step for zero-valued coordinates).
    let origin = ParamVector::from_column_slice(&initial.to_array());
    let mut simplex: Vec<ParamVector> = Vec::with_capacity(DIM + 1);
    simplex.push(origin);
    for i in 0..DIM {
        let mut vertex = origin;
        let step = if origin[i].abs() > 1e-8 {
            options.simplex_scale * origin[i]
        } else {
            options.simplex_scale * 0.05
        };
        vertex[i] += step;
        simplex.push(vertex);
    }
    let mut costs: Vec<f64> = simplex.iter().map(&evaluate).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iterations {
        iterations += 1;

        // Order the simplex: best first, worst last
        let mut order: Vec<usize> = (0..simplex.len()).collect();
        order.sort_by(|&a, &b| costs[a].total_cmp(&costs[b]));
        simplex = order.iter().map(|&i| simplex[i]).collect();
        costs = order.iter().map(|&i| costs[i]).collect();

        let best = costs[0];
        let worst = costs[DIM];
        if (worst - best).abs() <= options.tolerance * (1.0 + best.abs()) {
            converged = true;
            break;
        }

        // Centroid of all vertices but the worst
        let centroid: ParamVector = simplex[..DIM]
            .iter()
            .fold(ParamVector::zeros(), |acc, v| acc + v)
            / DIM as f64;

        // Reflection
        let reflected = centroid + (centroid - simplex[DIM]) * REFLECT;
        let reflected_cost = evaluate(&reflected);

        if reflected_cost < costs[0] {
            // Expansion
            let expanded = centroid + (reflected - centroid) * EXPAND;
            let expanded_cost = evaluate(&expanded);
            if expanded_cost < reflected_cost {
                simplex[DIM] = expanded;
                costs[DIM] = expanded_cost;
            } else {
                simplex[DIM] = reflected;
                costs[DIM] = reflected_cost;
            }
            continue;
        }

        if reflected_cost < costs[DIM - 1] {
            simplex[DIM] = reflected;
            costs[DIM] = reflected_cost;
            continue;
        }

        // Contraction, towards the better of the worst vertex and its
        // reflection
        let contracted = if reflected_cost < costs[DIM] {
            centroid + (reflected - centroid) * CONTRACT
        } else {
            centroid + (simplex[DIM] - centroid) * CONTRACT
        };
        let contracted_cost = evaluate(&contracted);
        if contracted_cost < costs[DIM].min(reflected_cost) {
            simplex[DIM] = contracted;
            costs[DIM] = contracted_cost;
            continue;
        }

        // Shrink everything towards the best vertex
        for i in 1..=DIM {
            simplex[i] = simplex[0] + (simplex[i] - simplex[0]) * SHRINK;
            costs[i] = evaluate(&simplex[i]);
        }
    }

    let (best_index, best_cost) = costs
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, c)| (i, *c))
        .expect("simplex is non-empty");

    debug!(
        iterations,
        converged,
        cost = best_cost,
        "calibration fit finished"
    );

    FitOutcome {
        params: ProjectionParams::from_array(&vector_to_array(&simplex[best_index])),
        cost: best_cost,
        iterations,
        converged,
    }
}

fn vector_to_array(v: &ParamVector) -> [f64; DIM] {
    let mut array = [0.0; DIM];
    array.copy_from_slice(v.as_slice());
    array
}

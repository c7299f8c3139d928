//! Newton iteration on the coupled stage system.

use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use serde::{Deserialize, Serialize};

use crate::assembly::assemble_stage_system;
use crate::butcher::ButcherTable;
use crate::error::StepError;
use crate::stages::prepare_u_ext_vec;
use crate::traits::{LinearSolver, StationaryProblem};

/// Settings controlling the Newton iteration of one time step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewtonSettings {
    /// Residual norm below which the iteration is considered converged.
    pub tolerance: f64,
    /// Iteration budget; exceeding it fails the step.
    pub max_steps: usize,
    /// Multiplier applied to the Newton update.
    pub damping: f64,
    /// Residual norm above which the iteration is declared divergent
    /// without exhausting the budget.
    pub max_residual_norm: f64,
    /// When set, the stage system is treated as linear in K: one assembly,
    /// one solve, no residual-norm iteration.
    pub is_linear: bool,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_steps: 20,
            damping: 1.0,
            max_residual_norm: 1e6,
            is_linear: false,
        }
    }
}

impl NewtonSettings {
    /// Settings for a problem whose stationary residual is linear in the
    /// trial state; a single Newton step is then exact.
    pub fn linear() -> Self {
        Self {
            is_linear: true,
            ..Self::default()
        }
    }
}

/// Outcome of a converged Newton solve.
#[derive(Debug, Clone, Copy)]
pub struct NewtonReport {
    /// Number of linear solves performed.
    pub iterations: usize,
    /// Residual norm at the last convergence check.
    pub residual_norm: f64,
}

/// Solves the coupled stage system for K.
///
/// `k` carries the initial guess in and the converged stage vector out; on
/// failure its contents are unspecified and the caller must discard them.
/// The Jacobian is assembled whenever `jacobian_changed` is set or the
/// cache is empty; with `jacobian_changed = false` the cached augmented
/// Jacobian is reused, across iterations and across calls.
#[allow(clippy::too_many_arguments)]
pub fn solve_stage_system<P: StationaryProblem + ?Sized>(
    problem: &mut P,
    solver: &mut dyn LinearSolver,
    bt: &ButcherTable,
    t: f64,
    dt: f64,
    y_prev: &DVector<f64>,
    k: &mut DVector<f64>,
    jacobian_cache: &mut Option<CscMatrix<f64>>,
    jacobian_changed: bool,
    residual_as_vector: bool,
    settings: &NewtonSettings,
) -> Result<NewtonReport, StepError> {
    let mass = problem.mass_matrix().map_err(StepError::Problem)?;

    if settings.is_linear {
        let u_ext = prepare_u_ext_vec(bt, dt, k);
        let with_jacobian = jacobian_changed || jacobian_cache.is_none();
        let system =
            assemble_stage_system(problem, bt, t, dt, y_prev, &mass, k, &u_ext, with_jacobian)
                .map_err(StepError::Problem)?;
        let residual_norm = norm_of(&system.residual, residual_as_vector);
        let jacobian = refresh_cache(jacobian_cache, system.jacobian)?;
        let delta = solver
            .solve(jacobian, &system.residual.map(|v| -v))
            .map_err(StepError::LinearSolver)?;
        *k += delta;
        debug!("linear stage solve done, initial residual norm {residual_norm:e}");
        return Ok(NewtonReport {
            iterations: 1,
            residual_norm,
        });
    }

    let mut iterations = 0usize;
    loop {
        let u_ext = prepare_u_ext_vec(bt, dt, k);
        let with_jacobian = jacobian_changed || jacobian_cache.is_none();
        let system =
            assemble_stage_system(problem, bt, t, dt, y_prev, &mass, k, &u_ext, with_jacobian)
                .map_err(StepError::Problem)?;

        let residual_norm = norm_of(&system.residual, residual_as_vector);
        debug!("newton iteration {iterations}: residual norm {residual_norm:e}");

        if !residual_norm.is_finite() || residual_norm > settings.max_residual_norm {
            return Err(StepError::ResidualBlowUp {
                iteration: iterations,
                residual_norm,
                limit: settings.max_residual_norm,
            });
        }
        if residual_norm < settings.tolerance {
            return Ok(NewtonReport {
                iterations,
                residual_norm,
            });
        }
        if iterations >= settings.max_steps {
            return Err(StepError::NewtonDiverged {
                iterations,
                residual_norm,
            });
        }

        let jacobian = refresh_cache(jacobian_cache, system.jacobian)?;
        let delta = solver
            .solve(jacobian, &system.residual.map(|v| -v))
            .map_err(StepError::LinearSolver)?;
        k.axpy(settings.damping, &delta, 1.0);
        iterations += 1;
    }
}

fn norm_of(residual: &DVector<f64>, residual_as_vector: bool) -> f64 {
    if residual_as_vector {
        residual.norm()
    } else {
        residual.amax()
    }
}

fn refresh_cache(
    cache: &mut Option<CscMatrix<f64>>,
    fresh: Option<CscMatrix<f64>>,
) -> Result<&CscMatrix<f64>, StepError> {
    if let Some(jacobian) = fresh {
        *cache = Some(jacobian);
    }
    cache
        .as_ref()
        .ok_or_else(|| StepError::Problem(anyhow::anyhow!("stage Jacobian was never assembled")))
}

//! The Runge-Kutta time-stepping engine.

use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use serde::{Deserialize, Serialize};

use crate::butcher::ButcherTable;
use crate::error::StepError;
use crate::newton::{solve_stage_system, NewtonReport, NewtonSettings};
use crate::solution::Solution;
use crate::solver::DenseLuSolver;
use crate::stages::combine_stages;
use crate::traits::{LinearSolver, StationaryProblem};

/// Engine-level configuration, fixed at construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RungeKuttaSettings {
    /// When set, every step starts the Newton iteration from K = 0 instead
    /// of the stage vector retained from the previous successful step.
    pub start_from_zero_k_vector: bool,
    /// Convergence norm: L2 over the augmented residual when set, maximum
    /// norm otherwise.
    pub residual_as_vector: bool,
}

impl Default for RungeKuttaSettings {
    fn default() -> Self {
        Self {
            start_from_zero_k_vector: false,
            residual_as_vector: true,
        }
    }
}

/// Per-step options of `rk_time_step`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepOptions {
    /// When false, the augmented Jacobian cached from an earlier call is
    /// reused instead of being reassembled each Newton iteration.
    pub jacobian_changed: bool,
    /// Requests the embedded error estimate; the table must carry a
    /// nonzero B2 row.
    pub estimate_error: bool,
    pub newton: NewtonSettings,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            jacobian_changed: true,
            estimate_error: false,
            newton: NewtonSettings::default(),
        }
    }
}

/// Output of one successful time step.
#[derive(Debug, Clone)]
pub struct TimeStepResult {
    /// The new time-level solution, on the problem's current space.
    pub solution: Solution,
    /// Embedded local error estimate, present iff requested.
    pub error_estimate: Option<DVector<f64>>,
    pub newton: NewtonReport,
}

/// Advances a spatially discretized PDE in time with the Runge-Kutta
/// method given by a Butcher table.
///
/// The engine owns the stage vector K (retained between steps as the next
/// initial guess unless configured otherwise), the cached augmented
/// Jacobian, and the step counter. Calls must be sequenced one at a time
/// on the same instance.
///
/// Vectors of coupled unknowns are handled by stacking all components into
/// the single coefficient vector reported by the problem's `ndof`; true
/// multi-equation coupling with distinct spaces per component is not
/// supported.
pub struct RungeKutta<P: StationaryProblem> {
    problem: P,
    bt: ButcherTable,
    solver: Box<dyn LinearSolver>,
    settings: RungeKuttaSettings,
    k_vector: Option<DVector<f64>>,
    stage_jacobian: Option<CscMatrix<f64>>,
    steps_taken: u64,
}

impl<P: StationaryProblem> RungeKutta<P> {
    /// Creates an engine with the default dense LU backend.
    pub fn new(problem: P, bt: ButcherTable) -> Self {
        Self::with_solver(problem, bt, Box::new(DenseLuSolver), RungeKuttaSettings::default())
    }

    pub fn with_solver(
        problem: P,
        bt: ButcherTable,
        solver: Box<dyn LinearSolver>,
        settings: RungeKuttaSettings,
    ) -> Self {
        Self {
            problem,
            bt,
            solver,
            settings,
            k_vector: None,
            stage_jacobian: None,
            steps_taken: 0,
        }
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn problem_mut(&mut self) -> &mut P {
        &mut self.problem
    }

    pub fn butcher_table(&self) -> &ButcherTable {
        &self.bt
    }

    /// Number of successful calls to `rk_time_step` on this instance.
    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    /// Drops the retained stage vector and the cached Jacobian, e.g. after
    /// the discrete space changed.
    pub fn reset_stage_state(&mut self) {
        self.k_vector = None;
        self.stage_jacobian = None;
    }

    /// Performs one explicit or implicit time step from `sln_prev` at time
    /// `t` with step size `dt`.
    ///
    /// On failure the retained stage vector, the step counter, and the
    /// caller's snapshot are untouched; callers typically retry with a
    /// smaller `dt` or adjusted Newton settings.
    pub fn rk_time_step(
        &mut self,
        t: f64,
        dt: f64,
        sln_prev: &Solution,
        opts: &StepOptions,
    ) -> Result<TimeStepResult, StepError> {
        if opts.estimate_error && !self.bt.has_embedded() {
            return Err(StepError::ErrorEstimateUnavailable);
        }

        // Fast path: no projection when the spaces coincide.
        let y_prev = if sln_prev.space == self.problem.space() {
            sln_prev.coeffs.clone()
        } else {
            self.problem
                .project(&sln_prev.coeffs, sln_prev.space)
                .map_err(StepError::Problem)?
        };

        let ndof = self.problem.ndof();
        if y_prev.len() != ndof {
            return Err(StepError::DimensionMismatch {
                expected: ndof,
                got: y_prev.len(),
            });
        }

        let size = self.bt.num_stages() * ndof;
        let mut k = match &self.k_vector {
            Some(prev) if !self.settings.start_from_zero_k_vector && prev.len() == size => {
                prev.clone()
            }
            _ => DVector::zeros(size),
        };

        debug!(
            "rk step {}: t = {t}, dt = {dt}, {} stages, {ndof} dofs",
            self.steps_taken,
            self.bt.num_stages()
        );

        let report = solve_stage_system(
            &mut self.problem,
            self.solver.as_mut(),
            &self.bt,
            t,
            dt,
            &y_prev,
            &mut k,
            &mut self.stage_jacobian,
            opts.jacobian_changed,
            self.settings.residual_as_vector,
            &opts.newton,
        )?;

        let y_new = combine_stages(&y_prev, self.bt.weights(), dt, &k);
        let error_estimate = match (opts.estimate_error, self.bt.embedded_weights()) {
            (true, Some(b2)) => Some(&y_new - combine_stages(&y_prev, b2, dt, &k)),
            _ => None,
        };

        self.steps_taken += 1;
        self.k_vector = if self.settings.start_from_zero_k_vector {
            None
        } else {
            Some(k)
        };

        Ok(TimeStepResult {
            solution: Solution::new(self.problem.space(), y_new),
            error_estimate,
            newton: report,
        })
    }
}

//! Contracts between the time-stepping engine and its collaborators.

use anyhow::{bail, Result};
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;

use crate::solution::SpaceId;

/// The spatial discretization, seen by the engine as an oracle for the
/// semidiscrete equation M dY/dt = F(t, Y).
///
/// `residual` and `jacobian` evaluate the stationary operator F and its
/// derivative at a fixed time and trial coefficient vector; the mass matrix
/// M multiplies the time derivative and does not depend on time.
pub trait StationaryProblem {
    /// Degrees of freedom of the current discrete space.
    fn ndof(&self) -> usize;

    /// Identifier of the current discrete space.
    fn space(&self) -> SpaceId;

    /// Evaluates the stationary residual F(time, trial), length `ndof`.
    fn residual(&mut self, time: f64, trial: &DVector<f64>) -> Result<DVector<f64>>;

    /// Evaluates the Jacobian dF/dY at (time, trial), `ndof` x `ndof`.
    fn jacobian(&mut self, time: f64, trial: &DVector<f64>) -> Result<CscMatrix<f64>>;

    /// Assembles the mass matrix, `ndof` x `ndof`.
    fn mass_matrix(&mut self) -> Result<CscMatrix<f64>>;

    /// Projects a coefficient vector from another discrete space onto the
    /// current one. Only called when the spaces differ, e.g. after adaptive
    /// refinement changed the space between steps.
    fn project(&mut self, _coeffs: &DVector<f64>, from: SpaceId) -> Result<DVector<f64>> {
        bail!(
            "projection from space {:?} is not supported by this problem",
            from
        )
    }
}

/// A sparse linear-system backend usable inside the Newton iteration.
///
/// Implementations report singular or otherwise unsolvable systems as
/// errors; the engine surfaces those as step failures.
pub trait LinearSolver {
    fn solve(&mut self, matrix: &CscMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>>;
}

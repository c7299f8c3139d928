//! Default linear-solver backend.

use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;

use crate::traits::LinearSolver;

/// Expands the sparse system to dense storage and solves it by LU
/// factorization. Suitable for small and moderate problems; larger runs
/// should plug in a genuinely sparse backend through the `LinearSolver`
/// trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenseLuSolver;

impl LinearSolver for DenseLuSolver {
    fn solve(&mut self, matrix: &CscMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let n = matrix.nrows();
        if matrix.ncols() != n {
            bail!("linear system matrix must be square, got {}x{}", n, matrix.ncols());
        }
        if rhs.len() != n {
            bail!("right-hand side has length {}, expected {}", rhs.len(), n);
        }

        let mut dense = DMatrix::zeros(n, n);
        for (row, col, value) in matrix.triplet_iter() {
            dense[(row, col)] += *value;
        }

        let solution = dense
            .lu()
            .solve(rhs)
            .ok_or_else(|| anyhow!("linear system is singular"))?;
        if solution.iter().any(|v| !v.is_finite()) {
            bail!("linear solve produced non-finite values");
        }
        Ok(solution)
    }
}

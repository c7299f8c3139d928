//! Assembly of the augmented multi-stage system.
//!
//! For an s-stage method applied to M dY/dt = F(t, Y), the stage vector K
//! satisfies the coupled system
//!
//!   M K_i - F(t + c_i dt, Y_prev + dt sum_j A[i][j] K_j) = 0,  i = 0..s-1.
//!
//! The residual and Jacobian of this system are block structured with
//! blocks of size `ndof`; the Jacobian block (i, j) is
//! delta_ij M - dt A[i][j] J_i, where J_i is the oracle Jacobian at stage i.

use anyhow::{bail, Result};
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::butcher::ButcherTable;
use crate::stages::stage_trial;
use crate::traits::StationaryProblem;

/// Applies the block-diagonal replication of `matrix` to `x`.
///
/// Treats `x` as `num_stages` contiguous blocks and multiplies each block
/// by the same matrix. Equivalent to applying the Kronecker product
/// (I_s (x) M), but the replicated matrix is never materialized; memory
/// stays proportional to the number of nonzeros of one block.
pub fn multiply_as_diagonal_block_matrix(
    matrix: &CscMatrix<f64>,
    num_stages: usize,
    x: &DVector<f64>,
) -> Result<DVector<f64>> {
    let ndof = matrix.nrows();
    if matrix.ncols() != ndof {
        bail!(
            "block matrix must be square, got {}x{}",
            matrix.nrows(),
            matrix.ncols()
        );
    }
    if x.len() != num_stages * ndof {
        bail!(
            "stage vector has length {}, expected {} stages of {}",
            x.len(),
            num_stages,
            ndof
        );
    }

    let mut y = DVector::zeros(x.len());
    for (row, col, value) in matrix.triplet_iter() {
        for stage in 0..num_stages {
            y[stage * ndof + row] += value * x[stage * ndof + col];
        }
    }
    Ok(y)
}

/// Residual and (optionally) Jacobian of the coupled stage system.
pub struct StageSystem {
    pub residual: DVector<f64>,
    pub jacobian: Option<CscMatrix<f64>>,
}

/// Assembles the augmented residual, and the augmented Jacobian when
/// `with_jacobian` is set, for the current stage vector `k` and its
/// extension vector `u_ext`.
///
/// Zero entries of the coupling matrix are skipped, so explicit and
/// diagonally implicit tables produce a system with the corresponding
/// block sparsity.
#[allow(clippy::too_many_arguments)]
pub fn assemble_stage_system<P: StationaryProblem + ?Sized>(
    problem: &mut P,
    bt: &ButcherTable,
    t: f64,
    dt: f64,
    y_prev: &DVector<f64>,
    mass: &CscMatrix<f64>,
    k: &DVector<f64>,
    u_ext: &DVector<f64>,
    with_jacobian: bool,
) -> Result<StageSystem> {
    let num_stages = bt.num_stages();
    let ndof = y_prev.len();
    let size = num_stages * ndof;

    // Left part: block-diagonal mass matrix applied to K.
    let mut residual = multiply_as_diagonal_block_matrix(mass, num_stages, k)?;

    let mut coo = if with_jacobian {
        let mut coo = CooMatrix::new(size, size);
        for (row, col, value) in mass.triplet_iter() {
            for stage in 0..num_stages {
                coo.push(stage * ndof + row, stage * ndof + col, *value);
            }
        }
        Some(coo)
    } else {
        None
    };

    for i in 0..num_stages {
        let stage_time = t + bt.c(i) * dt;
        let trial = stage_trial(y_prev, u_ext, i, ndof);

        let f = problem.residual(stage_time, &trial)?;
        if f.len() != ndof {
            bail!(
                "stationary residual has length {}, expected {}",
                f.len(),
                ndof
            );
        }
        for d in 0..ndof {
            residual[i * ndof + d] -= f[d];
        }

        if let Some(coo) = coo.as_mut() {
            let jac = problem.jacobian(stage_time, &trial)?;
            if jac.nrows() != ndof || jac.ncols() != ndof {
                bail!(
                    "stationary Jacobian is {}x{}, expected {}x{}",
                    jac.nrows(),
                    jac.ncols(),
                    ndof,
                    ndof
                );
            }
            for j in 0..num_stages {
                let scale = -dt * bt.a(i, j);
                if scale == 0.0 {
                    continue;
                }
                for (row, col, value) in jac.triplet_iter() {
                    coo.push(i * ndof + row, j * ndof + col, scale * value);
                }
            }
        }
    }

    Ok(StageSystem {
        residual,
        jacobian: coo.map(|coo| CscMatrix::from(&coo)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::SpaceId;
    use nalgebra::DMatrix;

    fn csc_from_dense(rows: usize, cols: usize, entries: &[f64]) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                let v = entries[r * cols + c];
                if v != 0.0 {
                    coo.push(r, c, v);
                }
            }
        }
        CscMatrix::from(&coo)
    }

    fn csc_to_dense(matrix: &CscMatrix<f64>) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(matrix.nrows(), matrix.ncols());
        for (row, col, value) in matrix.triplet_iter() {
            dense[(row, col)] += *value;
        }
        dense
    }

    #[test]
    fn block_multiply_matches_per_block_reference() {
        let entries = [2.0, -1.0, 0.0, 1.0, 3.0, 0.5, 0.0, -2.0, 4.0];
        let matrix = csc_from_dense(3, 3, &entries);
        let dense = DMatrix::from_row_slice(3, 3, &entries);

        for num_stages in [1usize, 2, 4] {
            let x = DVector::from_iterator(
                num_stages * 3,
                (0..num_stages * 3).map(|i| 0.7 * i as f64 - 1.3),
            );
            let y = multiply_as_diagonal_block_matrix(&matrix, num_stages, &x)
                .expect("block multiply should succeed");

            for stage in 0..num_stages {
                let block = x.rows(stage * 3, 3).into_owned();
                let reference = &dense * block;
                for d in 0..3 {
                    assert!(
                        (y[stage * 3 + d] - reference[d]).abs() < 1e-12,
                        "stage {stage} component {d} mismatch"
                    );
                }
            }
        }
    }

    #[test]
    fn block_multiply_rejects_bad_lengths() {
        let matrix = csc_from_dense(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let x = DVector::zeros(3);
        let err = multiply_as_diagonal_block_matrix(&matrix, 2, &x)
            .expect_err("expected length error");
        assert!(format!("{err}").contains("expected 2 stages"));
    }

    /// Scalar linear oracle F(t, y) = lambda * y with identity mass.
    struct ScalarDecay {
        lambda: f64,
    }

    impl StationaryProblem for ScalarDecay {
        fn ndof(&self) -> usize {
            1
        }

        fn space(&self) -> SpaceId {
            SpaceId(0)
        }

        fn residual(&mut self, _time: f64, trial: &DVector<f64>) -> Result<DVector<f64>> {
            Ok(trial * self.lambda)
        }

        fn jacobian(&mut self, _time: f64, _trial: &DVector<f64>) -> Result<CscMatrix<f64>> {
            Ok(csc_from_dense(1, 1, &[self.lambda]))
        }

        fn mass_matrix(&mut self) -> Result<CscMatrix<f64>> {
            Ok(csc_from_dense(1, 1, &[1.0]))
        }
    }

    #[test]
    fn implicit_euler_stage_system_has_expected_entries() {
        let mut problem = ScalarDecay { lambda: -2.0 };
        let bt = ButcherTable::implicit_euler();
        let dt = 0.1;
        let y_prev = DVector::from_vec(vec![1.0]);
        let mass = problem.mass_matrix().expect("mass");
        let k = DVector::from_vec(vec![0.5]);
        let u_ext = crate::stages::prepare_u_ext_vec(&bt, dt, &k);

        let system = assemble_stage_system(
            &mut problem,
            &bt,
            0.0,
            dt,
            &y_prev,
            &mass,
            &k,
            &u_ext,
            true,
        )
        .expect("assembly should succeed");

        // Residual: K - lambda * (y + dt * K).
        let expected_residual = 0.5 - (-2.0) * (1.0 + dt * 0.5);
        assert!((system.residual[0] - expected_residual).abs() < 1e-12);

        // Jacobian: 1 - dt * lambda.
        let jac = csc_to_dense(system.jacobian.as_ref().expect("jacobian"));
        assert!((jac[(0, 0)] - (1.0 - dt * (-2.0))).abs() < 1e-12);
    }

    #[test]
    fn explicit_table_yields_lower_triangular_coupling() {
        let mut problem = ScalarDecay { lambda: 3.0 };
        let bt = ButcherTable::heun_euler_embedded();
        let dt = 0.2;
        let y_prev = DVector::from_vec(vec![2.0]);
        let mass = problem.mass_matrix().expect("mass");
        let k = DVector::from_vec(vec![1.0, 1.0]);
        let u_ext = crate::stages::prepare_u_ext_vec(&bt, dt, &k);

        let system = assemble_stage_system(
            &mut problem,
            &bt,
            0.0,
            dt,
            &y_prev,
            &mass,
            &k,
            &u_ext,
            true,
        )
        .expect("assembly should succeed");

        let jac = csc_to_dense(system.jacobian.as_ref().expect("jacobian"));
        // Diagonal blocks carry the mass matrix only (A has zero diagonal).
        assert!((jac[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((jac[(1, 1)] - 1.0).abs() < 1e-12);
        // Stage 1 couples back to stage 0 through A[1][0] = 1.
        assert!((jac[(1, 0)] - (-dt * 3.0)).abs() < 1e-12);
        // No coupling above the diagonal for an explicit table.
        assert_eq!(jac[(0, 1)], 0.0);
    }
}

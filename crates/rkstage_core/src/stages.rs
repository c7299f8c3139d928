//! Stage-vector bookkeeping.
//!
//! The stage vector K concatenates the per-stage derivative estimates of a
//! multi-stage method: block i of length `ndof` holds K_i. The helpers here
//! derive the extension vector u_ext used to evaluate the stationary
//! oracle at each stage, and combine stages into a new time level.

use nalgebra::DVector;

use crate::butcher::ButcherTable;

/// Computes the extension vector: block i equals dt * sum_j A[i][j] * K_j.
///
/// Recomputed every Newton iteration, since K changes; this is the only
/// place stage coupling enters the oracle's trial-state argument.
pub fn prepare_u_ext_vec(bt: &ButcherTable, dt: f64, k: &DVector<f64>) -> DVector<f64> {
    let num_stages = bt.num_stages();
    debug_assert_eq!(k.len() % num_stages, 0);
    let ndof = k.len() / num_stages;

    let mut u_ext = DVector::zeros(k.len());
    for i in 0..num_stages {
        for j in 0..num_stages {
            let weight = dt * bt.a(i, j);
            if weight == 0.0 {
                continue;
            }
            for d in 0..ndof {
                u_ext[i * ndof + d] += weight * k[j * ndof + d];
            }
        }
    }
    u_ext
}

/// Trial coefficient vector for one stage: Y_prev + u_ext block `stage`.
pub fn stage_trial(
    y_prev: &DVector<f64>,
    u_ext: &DVector<f64>,
    stage: usize,
    ndof: usize,
) -> DVector<f64> {
    let mut trial = y_prev.clone();
    for d in 0..ndof {
        trial[d] += u_ext[stage * ndof + d];
    }
    trial
}

/// Weighted stage combination: Y_prev + dt * sum_i w_i * K_i.
pub fn combine_stages(
    y_prev: &DVector<f64>,
    weights: &DVector<f64>,
    dt: f64,
    k: &DVector<f64>,
) -> DVector<f64> {
    let ndof = y_prev.len();
    let mut combined = y_prev.clone();
    for (i, &w) in weights.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        for d in 0..ndof {
            combined[d] += dt * w * k[i * ndof + d];
        }
    }
    combined
}

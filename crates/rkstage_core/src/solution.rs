//! Time-level solution snapshots.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a discrete space, assigned by the discretization.
///
/// The engine only compares identifiers: when the space of the previous
/// time level differs from the problem's current space, the previous
/// solution is projected before stage combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceId(pub u64);

/// Coefficient vector of one time level together with its discrete space.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub space: SpaceId,
    pub coeffs: DVector<f64>,
}

impl Solution {
    pub fn new(space: SpaceId, coeffs: DVector<f64>) -> Self {
        Self { space, coeffs }
    }

    /// Number of degrees of freedom of this snapshot.
    pub fn ndof(&self) -> usize {
        self.coeffs.len()
    }
}

//! Butcher tables describing Runge-Kutta methods.
//!
//! A table holds the stage coupling matrix A, the weight vector B, an
//! optional embedded weight vector B2 for local error estimation, and the
//! stage time offsets C.

use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};

/// Coefficients of an explicit or implicit Runge-Kutta method.
#[derive(Debug, Clone, PartialEq)]
pub struct ButcherTable {
    a: DMatrix<f64>,
    b: DVector<f64>,
    b2: Option<DVector<f64>>,
    c: DVector<f64>,
}

impl ButcherTable {
    /// Creates a table without an embedded weight row.
    pub fn new(a: DMatrix<f64>, b: DVector<f64>, c: DVector<f64>) -> Result<Self> {
        Self::validate(&a, &b, None, &c)?;
        Ok(Self { a, b, b2: None, c })
    }

    /// Creates a table with an embedded lower-order weight row B2.
    pub fn with_embedded(
        a: DMatrix<f64>,
        b: DVector<f64>,
        b2: DVector<f64>,
        c: DVector<f64>,
    ) -> Result<Self> {
        Self::validate(&a, &b, Some(&b2), &c)?;
        Ok(Self {
            a,
            b,
            b2: Some(b2),
            c,
        })
    }

    fn validate(
        a: &DMatrix<f64>,
        b: &DVector<f64>,
        b2: Option<&DVector<f64>>,
        c: &DVector<f64>,
    ) -> Result<()> {
        let s = a.nrows();
        if s == 0 {
            bail!("Butcher table must have at least one stage");
        }
        if a.ncols() != s {
            bail!(
                "stage coupling matrix must be square, got {}x{}",
                a.nrows(),
                a.ncols()
            );
        }
        if b.len() != s {
            bail!("weight vector B has length {}, expected {}", b.len(), s);
        }
        if let Some(b2) = b2 {
            if b2.len() != s {
                bail!(
                    "embedded weight vector B2 has length {}, expected {}",
                    b2.len(),
                    s
                );
            }
        }
        if c.len() != s {
            bail!("stage offset vector C has length {}, expected {}", c.len(), s);
        }
        Ok(())
    }

    pub fn num_stages(&self) -> usize {
        self.a.nrows()
    }

    pub fn a(&self, i: usize, j: usize) -> f64 {
        self.a[(i, j)]
    }

    pub fn b(&self, i: usize) -> f64 {
        self.b[i]
    }

    pub fn b2(&self, i: usize) -> f64 {
        self.b2.as_ref().map_or(0.0, |b2| b2[i])
    }

    pub fn c(&self, i: usize) -> f64 {
        self.c[i]
    }

    pub fn weights(&self) -> &DVector<f64> {
        &self.b
    }

    pub fn embedded_weights(&self) -> Option<&DVector<f64>> {
        self.b2.as_ref()
    }

    /// True when an embedded row is present and not identically zero, i.e.
    /// the table can drive a local error estimate.
    pub fn has_embedded(&self) -> bool {
        self.b2
            .as_ref()
            .is_some_and(|b2| b2.iter().any(|&v| v != 0.0))
    }

    /// True when A is strictly lower triangular.
    pub fn is_explicit(&self) -> bool {
        let s = self.num_stages();
        (0..s).all(|i| (i..s).all(|j| self.a[(i, j)] == 0.0))
    }

    /// True when A is lower triangular (diagonal entries allowed).
    pub fn is_diagonally_implicit(&self) -> bool {
        let s = self.num_stages();
        (0..s).all(|i| (i + 1..s).all(|j| self.a[(i, j)] == 0.0))
    }

    /// Forward Euler, order 1.
    pub fn explicit_euler() -> Self {
        Self {
            a: DMatrix::zeros(1, 1),
            b: DVector::from_element(1, 1.0),
            b2: None,
            c: DVector::zeros(1),
        }
    }

    /// Backward Euler, order 1, L-stable.
    pub fn implicit_euler() -> Self {
        Self {
            a: DMatrix::from_element(1, 1, 1.0),
            b: DVector::from_element(1, 1.0),
            b2: None,
            c: DVector::from_element(1, 1.0),
        }
    }

    /// The classical explicit fourth-order method.
    pub fn explicit_rk4() -> Self {
        Self {
            a: DMatrix::from_row_slice(
                4,
                4,
                &[
                    0.0, 0.0, 0.0, 0.0, //
                    0.5, 0.0, 0.0, 0.0, //
                    0.0, 0.5, 0.0, 0.0, //
                    0.0, 0.0, 1.0, 0.0,
                ],
            ),
            b: DVector::from_vec(vec![1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0]),
            b2: None,
            c: DVector::from_vec(vec![0.0, 0.5, 0.5, 1.0]),
        }
    }

    /// Trapezoidal rule (Lobatto IIIA, two stages), order 2, A-stable.
    pub fn crank_nicolson() -> Self {
        Self {
            a: DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 0.5, 0.5]),
            b: DVector::from_vec(vec![0.5, 0.5]),
            b2: None,
            c: DVector::from_vec(vec![0.0, 1.0]),
        }
    }

    /// Alexander's two-stage SDIRK method, order 2, L-stable.
    pub fn sdirk22() -> Self {
        let gamma = 1.0 - std::f64::consts::FRAC_1_SQRT_2;
        Self {
            a: DMatrix::from_row_slice(2, 2, &[gamma, 0.0, 1.0 - gamma, gamma]),
            b: DVector::from_vec(vec![1.0 - gamma, gamma]),
            b2: None,
            c: DVector::from_vec(vec![gamma, 1.0]),
        }
    }

    /// Heun's method with an embedded forward-Euler row, orders 2(1).
    pub fn heun_euler_embedded() -> Self {
        Self {
            a: DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 0.0]),
            b: DVector::from_vec(vec![0.5, 0.5]),
            b2: Some(DVector::from_vec(vec![1.0, 0.0])),
            c: DVector::from_vec(vec![0.0, 1.0]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_square_coupling_matrix() {
        let a = DMatrix::zeros(2, 3);
        let b = DVector::zeros(2);
        let c = DVector::zeros(2);
        let err = ButcherTable::new(a, b, c).expect_err("expected shape error");
        assert!(format!("{err}").contains("square"));
    }

    #[test]
    fn rejects_zero_stages() {
        let err = ButcherTable::new(DMatrix::zeros(0, 0), DVector::zeros(0), DVector::zeros(0))
            .expect_err("expected stage count error");
        assert!(format!("{err}").contains("at least one stage"));
    }

    #[test]
    fn rejects_mismatched_weight_lengths() {
        let a = DMatrix::zeros(2, 2);
        let b = DVector::zeros(3);
        let c = DVector::zeros(2);
        let err = ButcherTable::new(a, b, c).expect_err("expected length error");
        assert!(format!("{err}").contains("weight vector B"));
    }

    #[test]
    fn classifies_table_structure() {
        assert!(ButcherTable::explicit_euler().is_explicit());
        assert!(ButcherTable::explicit_rk4().is_explicit());
        assert!(!ButcherTable::implicit_euler().is_explicit());
        assert!(ButcherTable::implicit_euler().is_diagonally_implicit());
        assert!(ButcherTable::sdirk22().is_diagonally_implicit());
        assert!(!ButcherTable::sdirk22().is_explicit());
        assert!(!ButcherTable::crank_nicolson().is_explicit());
        assert!(ButcherTable::crank_nicolson().is_diagonally_implicit());
    }

    #[test]
    fn embedded_row_detection() {
        assert!(!ButcherTable::implicit_euler().has_embedded());
        assert!(ButcherTable::heun_euler_embedded().has_embedded());

        // An all-zero B2 row does not enable error estimation.
        let table = ButcherTable::with_embedded(
            DMatrix::from_element(1, 1, 1.0),
            DVector::from_element(1, 1.0),
            DVector::zeros(1),
            DVector::from_element(1, 1.0),
        )
        .expect("table should validate");
        assert!(!table.has_embedded());
    }

    #[test]
    fn weights_sum_to_one_for_named_tables() {
        for table in [
            ButcherTable::explicit_euler(),
            ButcherTable::implicit_euler(),
            ButcherTable::explicit_rk4(),
            ButcherTable::crank_nicolson(),
            ButcherTable::sdirk22(),
            ButcherTable::heun_euler_embedded(),
        ] {
            let sum: f64 = table.weights().iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "B rows must sum to one");
        }
    }
}

//! Failure taxonomy of a time step.

use thiserror::Error;

/// Reasons a call to `rk_time_step` can fail.
///
/// Every failure leaves the previous solution and the retained stage
/// vector untouched; callers typically retry with a smaller step size or
/// relaxed Newton parameters.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("error estimate requested but the Butcher table has no usable embedded weights")]
    ErrorEstimateUnavailable,

    #[error("previous solution has {got} degrees of freedom, problem expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Newton iteration failed to converge within {iterations} steps (residual norm {residual_norm:e})")]
    NewtonDiverged {
        iterations: usize,
        residual_norm: f64,
    },

    #[error("residual norm {residual_norm:e} exceeded the allowed maximum {limit:e} at iteration {iteration}")]
    ResidualBlowUp {
        iteration: usize,
        residual_norm: f64,
        limit: f64,
    },

    #[error("linear solve failed during Newton iteration")]
    LinearSolver(#[source] anyhow::Error),

    #[error("spatial problem evaluation failed")]
    Problem(#[source] anyhow::Error),
}

pub mod assembly;
pub mod butcher;
pub mod error;
/// The `rkstage_core` crate advances a spatially discretized, time-dependent
/// PDE by one step of an explicit or implicit Runge-Kutta method given by a
/// Butcher table. The spatial discretization is an opaque collaborator that
/// evaluates a mass matrix, a stationary residual, and its Jacobian.
///
/// Key components:
/// - **Butcher**: `ButcherTable` coefficients plus a catalogue of named tables.
/// - **Traits**: `StationaryProblem` (the discretization oracle) and
///   `LinearSolver` (pluggable sparse-system backend).
/// - **Assembly**: block-diagonal mass application and the augmented
///   multi-stage residual/Jacobian.
/// - **Newton**: damped Newton iteration on the coupled stage system.
/// - **Stepper**: the `RungeKutta` engine and its `rk_time_step` entry point.
pub mod newton;
pub mod solution;
pub mod solver;
pub mod stages;
pub mod stepper;
pub mod traits;

//! Dense non-negative least squares solved with the active-set method of
//! Lawson and Hanson.
//!
//! This crate minimizes `||A*x - b||` subject to `x >= 0` for a dense matrix
//! `A` with at least as many rows as columns. It factorizes passive-column
//! subsets with a dense QR and reuses allocations across solves.
//!
//! How it works (high level):
//! - Start with every variable active (pinned at zero).
//! - Each iteration frees the variable whose gradient `A^T (b - A*x)` most
//!   violates optimality and re-solves the unconstrained least-squares
//!   problem over the freed columns.
//! - Candidates with negative entries are pulled back to the last feasible
//!   point on the segment toward them, and the binding variable returns to
//!   zero, until the candidate is feasible.
//!
//! Calling it:
//! - Build a column-major `faer_core::Mat` for `A`.
//! - Create an `NnlsSolver` (this allocates every buffer the solve needs).
//! - Call `NnlsSolver::solve` per right-hand side and inspect `SolverStats`.
//!
//! Example:
//! ```rust
//! use faer_core::{mat, Parallelism};
//! use nnls_rs::{NnlsSolver, SolveStatus, SolverOptions};
//!
//! let a = mat![
//!     [1.0, 1.0],
//!     [2.0, 4.0],
//!     [3.0, 9.0],
//!     [4.0, 16.0_f64],
//! ];
//!
//! let mut solver = NnlsSolver::new(a, SolverOptions::default(), Parallelism::None).unwrap();
//! let stats = solver.solve(&[0.6, 2.2, 4.8, 8.4], None);
//!
//! assert_eq!(stats.status, SolveStatus::Success);
//! assert!((solver.solution()[0] - 0.1).abs() <= 1e-6);
//! assert!((solver.solution()[1] - 0.5).abs() <= 1e-6);
//! ```

mod lstsq;
mod report;
mod solver;

pub use lstsq::WorkspaceError;
pub use report::{IterationReport, Reporter, SolveStatus, SolverStats, StdoutReporter};
pub use solver::{NnlsSolver, SolverError, SolverOptions};

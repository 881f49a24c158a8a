use core::fmt;

use std::time::{Duration, Instant};

use faer_core::{Mat, Parallelism};

use crate::lstsq::{SubsetLstsq, WorkspaceError};
use crate::report::{emit_line, IterationReport, Reporter, SolveStatus, SolverStats, StdoutReporter};

/// Errors while constructing the solver.
#[derive(Debug)]
pub enum SolverError {
    /// The matrix has zero rows or columns, or fewer rows than columns.
    ///
    /// A unique least-squares solution over any passive subset needs full
    /// column rank, which requires at least as many rows as columns.
    InvalidDimensions { nrows: usize, ncols: usize },
    /// The factorization workspace could not be sized or allocated.
    Workspace(WorkspaceError),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { nrows, ncols } => {
                write!(f, "invalid dimensions: nrows={nrows}, ncols={ncols}")
            }
            Self::Workspace(err) => write!(f, "workspace error: {err}"),
        }
    }
}

impl std::error::Error for SolverError {}

impl From<WorkspaceError> for SolverError {
    fn from(err: WorkspaceError) -> Self {
        Self::Workspace(err)
    }
}

/// Options controlling the active-set solve.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Maximum number of outer iterations; `None` resolves to twice the
    /// column count.
    pub max_iterations: Option<usize>,
    /// Optimality tolerance on gradient entries of active variables.
    ///
    /// Not rescaled by the solver; callers should scale it to the magnitude
    /// of their data.
    pub tolerance: f64,
    /// Emit per-iteration diagnostics to stdout by default.
    pub verbose: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: None,
            tolerance: f64::EPSILON,
            verbose: false,
        }
    }
}

/// Non-negative least squares by the active-set method of Lawson and Hanson.
///
/// Minimizes `||A*x - b||` subject to `x >= 0`. Every variable starts active
/// (pinned at zero); each outer iteration frees the variable whose gradient
/// most violates optimality and re-solves the unconstrained least-squares
/// problem over the freed columns. Infeasible candidates are pulled back to
/// the feasible segment and the binding variable returns to zero.
///
/// All iterate, gradient, and factorization storage is allocated at
/// construction and reused, so `solve` itself does not allocate.
pub struct NnlsSolver {
    a: Mat<f64>,
    max_iterations: Option<usize>,
    tolerance: f64,
    verbose: bool,
    lstsq: SubsetLstsq,
    /// Permutation of `0..n`; the first `num_passive` entries form the
    /// passive set, the rest the active set.
    indices: Vec<usize>,
    num_passive: usize,
    x: Vec<f64>,
    candidate: Vec<f64>,
    residual: Vec<f64>,
    gradient: Vec<f64>,
    iterations: usize,
    status: Option<SolveStatus>,
}

impl fmt::Debug for NnlsSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NnlsSolver")
            .field("nrows", &self.a.nrows())
            .field("ncols", &self.a.ncols())
            .field("max_iterations", &self.max_iterations)
            .field("tolerance", &self.tolerance)
            .field("verbose", &self.verbose)
            .field("num_passive", &self.num_passive)
            .field("iterations", &self.iterations)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

enum ReporterSlot<'a> {
    External(&'a mut dyn Reporter),
    Local(StdoutReporter),
    None,
}

impl<'a> ReporterSlot<'a> {
    fn new(reporter: Option<&'a mut dyn Reporter>, verbose: bool) -> Self {
        match reporter {
            Some(r) => Self::External(r),
            None if verbose => Self::Local(StdoutReporter::new()),
            None => Self::None,
        }
    }

    fn as_mut(&mut self) -> Option<&mut dyn Reporter> {
        match self {
            Self::External(r) => Some(*r),
            Self::Local(r) => Some(r),
            Self::None => None,
        }
    }
}

impl NnlsSolver {
    /// Create a solver for the given matrix and parallelism mode.
    ///
    /// Requires `a.nrows() >= a.ncols() >= 1`.
    pub fn new(
        a: Mat<f64>,
        options: SolverOptions,
        parallelism: Parallelism,
    ) -> Result<Self, SolverError> {
        let nrows = a.nrows();
        let ncols = a.ncols();
        if nrows == 0 || ncols == 0 || nrows < ncols {
            return Err(SolverError::InvalidDimensions { nrows, ncols });
        }

        let lstsq = SubsetLstsq::new(nrows, ncols, parallelism)?;

        Ok(Self {
            a,
            max_iterations: options.max_iterations,
            tolerance: options.tolerance,
            verbose: options.verbose,
            lstsq,
            indices: (0..ncols).collect(),
            num_passive: 0,
            x: vec![0.0; ncols],
            candidate: vec![0.0; ncols],
            residual: vec![0.0; nrows],
            gradient: vec![0.0; ncols],
            iterations: 0,
            status: None,
        })
    }

    /// The problem matrix.
    pub fn matrix(&self) -> &Mat<f64> {
        &self.a
    }

    pub fn nrows(&self) -> usize {
        self.a.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.a.ncols()
    }

    /// Resolved iteration budget: the configured value, or twice the column
    /// count when none was configured.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations.unwrap_or(2 * self.a.ncols())
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = Some(max_iterations);
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    /// Solution of the most recent solve; all zeros before the first call.
    ///
    /// Entries are exactly zero for active variables and non-negative
    /// everywhere.
    pub fn solution(&self) -> &[f64] {
        &self.x
    }

    /// Outer iterations consumed by the most recent solve.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Status of the most recent solve, or `None` before the first call.
    pub fn status(&self) -> Option<SolveStatus> {
        self.status
    }

    /// Minimize `||A*x - b||` subject to `x >= 0`.
    ///
    /// Fully resets the variable partition and iterate, so repeated calls on
    /// the same solver are independent. The result stays readable through
    /// [`solution`](Self::solution), [`status`](Self::status) and
    /// [`iterations`](Self::iterations) after this returns.
    pub fn solve(
        &mut self,
        b: &[f64],
        reporter: Option<&mut dyn Reporter>,
    ) -> SolverStats {
        let m = self.a.nrows();
        let n = self.a.ncols();

        self.iterations = 0;
        self.num_passive = 0;
        for (pos, idx) in self.indices.iter_mut().enumerate() {
            *idx = pos;
        }
        self.x.fill(0.0);

        if b.len() != m {
            self.status = Some(SolveStatus::InvalidInput);
            return SolverStats {
                status: SolveStatus::InvalidInput,
                iterations: 0,
                residual_norm: f64::NAN,
                grad_max: f64::NAN,
            };
        }

        let start_time = self.verbose.then(Instant::now);
        let mut reporter = ReporterSlot::new(reporter, self.verbose);
        let max_iterations = self.max_iterations();

        let status = loop {
            // The unconstrained optimum over all columns satisfies the dual
            // conditions; nothing is left to free.
            if self.num_passive == n {
                break SolveStatus::Success;
            }

            compute_residual(&mut self.residual, &self.a, b, &self.x);
            compute_gradient(&mut self.gradient, &self.a, &self.residual);

            // Most optimality-violating active variable, if any.
            let mut entering = None;
            let mut best = self.tolerance;
            for pos in self.num_passive..n {
                let w = self.gradient[self.indices[pos]];
                if w > best {
                    best = w;
                    entering = Some(pos);
                }
            }
            let Some(pos) = entering else {
                break SolveStatus::Success;
            };
            if self.iterations >= max_iterations {
                break SolveStatus::NoConvergence;
            }
            self.iterations += 1;

            let entering_idx = self.indices[pos];
            self.indices.swap(pos, self.num_passive);
            self.num_passive += 1;

            // Feasibility loop: re-solve on the passive columns until the
            // candidate is non-negative, walking back along the segment from
            // the current iterate and pinning the binding variable at zero.
            let mut dropped = 0usize;
            loop {
                if self.num_passive == 0 {
                    self.x.fill(0.0);
                    break;
                }
                let p = self.num_passive;
                {
                    let z = self.lstsq.solve(&self.a, &self.indices[..p], b);
                    self.candidate[..p].copy_from_slice(z);
                }

                let mut alpha = f64::INFINITY;
                let mut binding = None;
                for k in 0..p {
                    let z_k = self.candidate[k];
                    if z_k <= 0.0 {
                        let x_k = self.x[self.indices[k]];
                        let step = x_k / (x_k - z_k);
                        if step < alpha {
                            alpha = step;
                            binding = Some(k);
                        }
                    }
                }

                let Some(bind) = binding else {
                    for k in 0..p {
                        self.x[self.indices[k]] = self.candidate[k];
                    }
                    break;
                };

                for k in 0..p {
                    let j = self.indices[k];
                    self.x[j] += alpha * (self.candidate[k] - self.x[j]);
                }
                self.x[self.indices[bind]] = 0.0;
                dropped += 1;
                self.num_passive -= 1;
                self.indices.swap(bind, self.num_passive);
            }

            if let Some(rep) = reporter.as_mut() {
                compute_residual(&mut self.residual, &self.a, b, &self.x);
                rep.on_iteration(&IterationReport {
                    iteration: self.iterations,
                    entering: entering_idx,
                    gradient: best,
                    passive: self.num_passive,
                    dropped,
                    residual_norm: l2_norm(&self.residual),
                });
            }
        };

        compute_residual(&mut self.residual, &self.a, b, &self.x);
        compute_gradient(&mut self.gradient, &self.a, &self.residual);
        let mut grad_max = 0.0;
        for pos in self.num_passive..n {
            let w = self.gradient[self.indices[pos]];
            if w > grad_max {
                grad_max = w;
            }
        }

        self.status = Some(status);
        let stats = SolverStats {
            status,
            iterations: self.iterations,
            residual_norm: l2_norm(&self.residual),
            grad_max,
        };
        finish_stats(stats, start_time, &mut reporter)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}

fn l2_norm(x: &[f64]) -> f64 {
    dot(x, x).sqrt()
}

/// residual = b - A*x, skipping the zero entries of x.
fn compute_residual(residual: &mut [f64], a: &Mat<f64>, b: &[f64], x: &[f64]) {
    residual.copy_from_slice(b);
    for (j, &x_j) in x.iter().enumerate() {
        if x_j == 0.0 {
            continue;
        }
        for (i, r) in residual.iter_mut().enumerate() {
            *r -= a.read(i, j) * x_j;
        }
    }
}

/// gradient = A^T * residual.
fn compute_gradient(gradient: &mut [f64], a: &Mat<f64>, residual: &[f64]) {
    for (j, g) in gradient.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (i, &r) in residual.iter().enumerate() {
            sum += a.read(i, j) * r;
        }
        *g = sum;
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 1.0 {
        format!("{:.3} s", secs)
    } else if secs >= 1e-3 {
        format!("{:.3} ms", secs * 1e3)
    } else if secs >= 1e-6 {
        format!("{:.3} us", secs * 1e6)
    } else {
        format!("{:.0} ns", secs * 1e9)
    }
}

fn finish_stats(
    stats: SolverStats,
    start_time: Option<Instant>,
    reporter: &mut ReporterSlot<'_>,
) -> SolverStats {
    if let Some(reporter) = reporter.as_mut() {
        reporter.on_finish();
    }
    if let Some(start) = start_time {
        let elapsed = format_duration(start.elapsed());
        emit_line(&format!("time: {elapsed}"));
    }
    stats
}

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets};

/// Outcome of a call to [`NnlsSolver::solve`](crate::NnlsSolver::solve).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Dual feasibility and complementary slackness hold within tolerance.
    Success,
    /// The iteration budget ran out; the best iterate found is retained.
    NoConvergence,
    /// The right-hand side length does not match the matrix row count.
    InvalidInput,
}

#[derive(Debug, Clone)]
pub struct SolverStats {
    pub status: SolveStatus,
    pub iterations: usize,
    /// `||b - A*x||` at the returned iterate.
    pub residual_norm: f64,
    /// Largest gradient entry over the active set at termination.
    pub grad_max: f64,
}

/// One record per outer iteration of the active-set loop.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: usize,
    /// Variable freed from the active set this iteration.
    pub entering: usize,
    /// Its gradient value at the time it was freed.
    pub gradient: f64,
    /// Passive-set size after the feasibility loop settled.
    pub passive: usize,
    /// Variables pinned back to zero by the feasibility loop.
    pub dropped: usize,
    pub residual_norm: f64,
}

pub(crate) fn emit_line(line: &str) {
    if log::log_enabled!(log::Level::Info) {
        log::info!("{line}");
    } else {
        println!("{line}");
    }
}

pub trait Reporter {
    fn on_iteration(&mut self, report: &IterationReport);
    fn on_finish(&mut self) {}
}

pub struct StdoutReporter {
    rows: Vec<IterationReport>,
}

impl StdoutReporter {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }
}

impl Default for StdoutReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for StdoutReporter {
    fn on_iteration(&mut self, report: &IterationReport) {
        self.rows.push(report.clone());
    }

    fn on_finish(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        if !log::log_enabled!(log::Level::Info) {
            println!();
        }
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("iter").set_alignment(CellAlignment::Right),
            Cell::new("entering").set_alignment(CellAlignment::Right),
            Cell::new("gradient").set_alignment(CellAlignment::Right),
            Cell::new("passive").set_alignment(CellAlignment::Right),
            Cell::new("dropped").set_alignment(CellAlignment::Right),
            Cell::new("residual").set_alignment(CellAlignment::Right),
        ]);
        for row in &self.rows {
            table.add_row(vec![
                Cell::new(row.iteration).set_alignment(CellAlignment::Right),
                Cell::new(row.entering).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.4e}", row.gradient)).set_alignment(CellAlignment::Right),
                Cell::new(row.passive).set_alignment(CellAlignment::Right),
                Cell::new(row.dropped).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.4e}", row.residual_norm))
                    .set_alignment(CellAlignment::Right),
            ]);
        }

        for line in table.to_string().lines() {
            emit_line(line);
        }
        self.rows.clear();
    }
}

use core::fmt;

use dyn_stack::{GlobalPodBuffer, PodStack, ReborrowMut};
use faer_core::{householder, mat, solve, Conj, Mat, Parallelism};
use faer_qr::no_pivoting::compute;

/// Errors while sizing or allocating the factorization workspace.
#[derive(Debug, Clone)]
pub enum WorkspaceError {
    /// Workspace requirement overflowed.
    SizeOverflow,
    /// Workspace allocation failed.
    AllocationFailed,
}

impl fmt::Display for WorkspaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeOverflow => write!(f, "workspace size overflow"),
            Self::AllocationFailed => write!(f, "workspace allocation failed"),
        }
    }
}

impl std::error::Error for WorkspaceError {}

/// Unconstrained least-squares solves over a column subset of a dense matrix.
///
/// Gathers the requested columns into a scratch matrix, factorizes it with a
/// dense no-pivoting QR, applies the Householder sequence to the right-hand
/// side and back-substitutes through the triangular factor. All storage is
/// sized for the widest subset (`max_cols`) at construction and reused, so
/// `solve` performs no allocation.
pub(crate) struct SubsetLstsq {
    nrows: usize,
    blocksize: usize,
    parallelism: Parallelism,
    qr: Vec<f64>,
    factor: Vec<f64>,
    rhs: Vec<f64>,
    stack: GlobalPodBuffer,
}

impl SubsetLstsq {
    pub(crate) fn new(
        nrows: usize,
        max_cols: usize,
        parallelism: Parallelism,
    ) -> Result<Self, WorkspaceError> {
        let blocksize = compute::recommended_blocksize::<f64>(nrows, max_cols);
        let mut req =
            householder::apply_block_householder_sequence_transpose_on_the_left_in_place_req::<f64>(
                nrows, blocksize, 1,
            )
            .map_err(|_| WorkspaceError::SizeOverflow)?;
        // Every subset width re-uses the same buffer, so take the union of the
        // factorization requirements over all of them.
        for ncols in 1..=max_cols {
            let factor_req = compute::qr_in_place_req::<f64>(
                nrows,
                ncols,
                blocksize,
                parallelism,
                Default::default(),
            )
            .map_err(|_| WorkspaceError::SizeOverflow)?;
            req = req
                .try_or(factor_req)
                .map_err(|_| WorkspaceError::SizeOverflow)?;
        }
        let stack = GlobalPodBuffer::try_new(req).map_err(|_| WorkspaceError::AllocationFailed)?;

        Ok(Self {
            nrows,
            blocksize,
            parallelism,
            qr: vec![0.0; nrows * max_cols],
            factor: vec![0.0; blocksize * max_cols],
            rhs: vec![0.0; nrows],
            stack,
        })
    }

    /// Solves `min ||A[:, cols] * z - b||` and returns `z`, one entry per
    /// requested column, in the order of `cols`.
    ///
    /// The subset must have full column rank; a rank-deficient subset produces
    /// non-finite entries rather than an error.
    pub(crate) fn solve(&mut self, a: &Mat<f64>, cols: &[usize], b: &[f64]) -> &[f64] {
        let m = self.nrows;
        let p = cols.len();
        debug_assert!(p >= 1);
        debug_assert!(m * p <= self.qr.len());
        debug_assert_eq!(b.len(), m);

        for (k, &col) in cols.iter().enumerate() {
            for i in 0..m {
                self.qr[k * m + i] = a.read(i, col);
            }
        }
        self.rhs.copy_from_slice(b);
        self.factor[..self.blocksize * p].fill(0.0);

        let mut stack = PodStack::new(&mut self.stack);
        {
            let qr = mat::from_column_major_slice_mut::<f64>(&mut self.qr[..m * p], m, p);
            let factor = mat::from_column_major_slice_mut::<f64>(
                &mut self.factor[..self.blocksize * p],
                self.blocksize,
                p,
            );
            compute::qr_in_place(
                qr,
                factor,
                self.parallelism,
                stack.rb_mut(),
                Default::default(),
            );
        }
        {
            let qr = mat::from_column_major_slice::<f64>(&self.qr[..m * p], m, p);
            let factor = mat::from_column_major_slice::<f64>(
                &self.factor[..self.blocksize * p],
                self.blocksize,
                p,
            );
            let rhs = mat::from_column_major_slice_mut::<f64>(&mut self.rhs, m, 1);
            householder::apply_block_householder_sequence_transpose_on_the_left_in_place_with_conj(
                qr,
                factor,
                Conj::Yes,
                rhs,
                self.parallelism,
                stack.rb_mut(),
            );
        }
        {
            let qr = mat::from_column_major_slice::<f64>(&self.qr[..m * p], m, p);
            let rhs = mat::from_column_major_slice_mut::<f64>(&mut self.rhs[..p], p, 1);
            solve::solve_upper_triangular_in_place(qr.split_at_row(p).0, rhs, self.parallelism);
        }
        &self.rhs[..p]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer_core::mat;

    #[test]
    fn solves_overdetermined_subset() {
        let a = mat![
            [-1.14920683, -1.67950492],
            [-0.93009756, -0.03885086],
            [1.22579735, 0.88489976],
            [0.70698973, 0.38928314],
            [-1.66293762, 0.38123281],
            [0.27639595, -0.32559289],
            [-0.37506387, -0.13180778],
            [-1.20774962, -0.38635657],
            [0.44373549, 0.84397648],
            [-1.96779374, -1.42751757_f64],
        ];
        let b = [
            -0.14689786,
            -1.00844774,
            1.07941646,
            0.1281168,
            -0.49385283,
            0.65117811,
            0.85599951,
            -0.12635444,
            0.02383305,
            0.34158312,
        ];
        // computed with numpy
        let expected = [0.33960324, -0.25718351];

        let mut lstsq = SubsetLstsq::new(a.nrows(), a.ncols(), Parallelism::None).unwrap();
        let z = lstsq.solve(&a, &[0, 1], &b);
        assert!((z[0] - expected[0]).abs() <= 1e-7);
        assert!((z[1] - expected[1]).abs() <= 1e-7);

        // single-column subsets restrict the fit to that column
        let z = lstsq.solve(&a, &[1], &b);
        let mut num = 0.0;
        let mut den = 0.0;
        for i in 0..a.nrows() {
            num += a.read(i, 1) * b[i];
            den += a.read(i, 1) * a.read(i, 1);
        }
        assert!((z[0] - num / den).abs() <= 1e-12);
    }
}

//! Core linear-algebra traits for sublin.

/// Shape of a matrix.
pub trait MatShape {
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;
    fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }
}

/// Matrix–vector product: y ← A x.
pub trait MatVec {
    /// Compute y = A · x. `y` is overwritten, never accumulated into.
    fn matvec(&self, x: &[f64], y: &mut [f64]);
}

/// Matrix-transpose–vector product: y ← Aᵀ x.
pub trait MatTransVec {
    fn mattransvec(&self, x: &[f64], y: &mut [f64]);
}

/// Random access to a single entry; absent entries read as zero.
pub trait MatrixGet<T> {
    fn get(&self, i: usize, j: usize) -> T;
}

/// Row-wise access to the stored entries.
///
/// `row_entries` is recomputed from immutable row bounds on every call, so a
/// row can be walked any number of times.
pub trait RowAccess: MatShape {
    type Row<'a>: Iterator<Item = (usize, f64)> + Clone
    where
        Self: 'a;

    fn row_entries(&self, row: usize) -> Self::Row<'_>;

    /// Number of stored entries.
    fn nnz(&self) -> usize;

    /// Diagonal entry of `row` (duplicates, if any, are summed).
    fn diagonal_entry(&self, row: usize) -> f64 {
        self.row_entries(row).filter(|&(c, _)| c == row).map(|(_, v)| v).sum()
    }

    fn diagonal(&self) -> Vec<f64> {
        (0..self.nrows().min(self.ncols())).map(|i| self.diagonal_entry(i)).collect()
    }

    /// Approximate heap footprint in bytes, used for memory estimates.
    fn memory_bytes(&self) -> usize;
}

/// Everything the solvers need from a matrix.
pub trait LinearOperator: MatVec + RowAccess {}

impl<T: MatVec + RowAccess + ?Sized> LinearOperator for T {}

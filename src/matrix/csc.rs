//! Compressed sparse column storage.
//!
//! Mostly used as the transposed view of a row operator: walking column `u`
//! of a CSC matrix visits every row that references `u`, which is what the
//! backward push needs.

use crate::core::traits::{MatShape, MatVec, MatrixGet, RowAccess};
use crate::matrix::sparse::{CsrMatrix, Triplet};

#[derive(Debug, Clone, PartialEq)]
pub struct CscMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    row_indices: Vec<u32>,
    col_ptr: Vec<u32>,
}

impl CscMatrix {
    /// O(nnz) transpose of the CSR structure by counting sort on columns.
    /// Row indices come out sorted within each column.
    pub fn from_csr(csr: &CsrMatrix) -> Self {
        Self::from_operator(csr)
    }

    /// Column-compressed copy of any row operator.
    pub fn from_operator<M: RowAccess + ?Sized>(op: &M) -> Self {
        let (rows, cols) = (op.nrows(), op.ncols());
        let mut col_ptr = vec![0u32; cols + 1];
        for r in 0..rows {
            for (c, _) in op.row_entries(r) {
                col_ptr[c + 1] += 1;
            }
        }
        for c in 0..cols {
            col_ptr[c + 1] += col_ptr[c];
        }
        let nnz = col_ptr[cols] as usize;
        let mut next: Vec<u32> = col_ptr[..cols].to_vec();
        let mut row_indices = vec![0u32; nnz];
        let mut values = vec![0.0; nnz];
        for r in 0..rows {
            for (c, v) in op.row_entries(r) {
                let dst = next[c] as usize;
                row_indices[dst] = r as u32;
                values[dst] = v;
                next[c] += 1;
            }
        }
        Self { rows, cols, values, row_indices, col_ptr }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn row_indices(&self) -> &[u32] {
        &self.row_indices
    }

    pub fn col_ptr(&self) -> &[u32] {
        &self.col_ptr
    }

    /// `(row, value)` pairs of column `col`, rows ascending.
    pub fn col_entries(&self, col: usize) -> impl Iterator<Item = (usize, f64)> + Clone + '_ {
        let range = self.col_ptr[col] as usize..self.col_ptr[col + 1] as usize;
        self.row_indices[range.clone()]
            .iter()
            .zip(&self.values[range])
            .map(|(&r, &v)| (r as usize, v))
    }

    pub fn get_entry(&self, row: usize, col: usize) -> f64 {
        if row >= self.rows || col >= self.cols {
            return 0.0;
        }
        let range = self.col_ptr[col] as usize..self.col_ptr[col + 1] as usize;
        match self.row_indices[range.clone()].binary_search(&(row as u32)) {
            Ok(k) => self.values[range.start + k],
            Err(_) => 0.0,
        }
    }

    /// `out = M · x`, scattering column by column.
    pub fn multiply_vector(&self, x: &[f64], out: &mut [f64]) {
        assert_eq!(x.len(), self.cols, "Input vector x has incorrect length");
        assert_eq!(out.len(), self.rows, "Output vector has incorrect length");
        out.iter_mut().for_each(|o| *o = 0.0);
        for (c, &xc) in x.iter().enumerate() {
            if xc == 0.0 {
                continue;
            }
            for (r, v) in self.col_entries(c) {
                out[r] += v * xc;
            }
        }
    }

    pub fn to_triplets(&self) -> Vec<Triplet> {
        (0..self.cols)
            .flat_map(|c| self.col_entries(c).map(move |(r, v)| (r, c, v)))
            .collect()
    }

    /// Back to row-compressed form; the same counting sort run the other way.
    pub fn to_csr(&self) -> CsrMatrix {
        let mut row_ptr = vec![0u32; self.rows + 1];
        for &r in &self.row_indices {
            row_ptr[r as usize + 1] += 1;
        }
        for r in 0..self.rows {
            row_ptr[r + 1] += row_ptr[r];
        }
        let mut next: Vec<u32> = row_ptr[..self.rows].to_vec();
        let mut col_indices = vec![0u32; self.values.len()];
        let mut values = vec![0.0; self.values.len()];
        for c in 0..self.cols {
            for (r, v) in self.col_entries(c) {
                let dst = next[r] as usize;
                col_indices[dst] = c as u32;
                values[dst] = v;
                next[r] += 1;
            }
        }
        CsrMatrix::from_parts_unchecked(self.rows, self.cols, row_ptr, col_indices, values, true)
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn memory_bytes(&self) -> usize {
        self.values.len() * std::mem::size_of::<f64>()
            + (self.row_indices.len() + self.col_ptr.len()) * std::mem::size_of::<u32>()
    }
}

impl MatShape for CscMatrix {
    fn nrows(&self) -> usize {
        self.rows
    }
    fn ncols(&self) -> usize {
        self.cols
    }
}

impl MatVec for CscMatrix {
    fn matvec(&self, x: &[f64], y: &mut [f64]) {
        self.multiply_vector(x, y);
    }
}

impl MatrixGet<f64> for CscMatrix {
    fn get(&self, i: usize, j: usize) -> f64 {
        self.get_entry(i, j)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CsrMatrix {
        // [[4, 0, 1],
        //  [0, 3, 0],
        //  [2, 0, 5]]
        let t = vec![(0, 0, 4.0), (0, 2, 1.0), (1, 1, 3.0), (2, 0, 2.0), (2, 2, 5.0)];
        CsrMatrix::from_coo(3, 3, t).unwrap()
    }

    #[test]
    fn transpose_layout() {
        let csc = CscMatrix::from_csr(&sample());
        assert_eq!(csc.col_ptr(), &[0, 2, 3, 5]);
        assert_eq!(csc.row_indices(), &[0, 2, 1, 0, 2]);
        assert_eq!(csc.values(), &[4.0, 2.0, 3.0, 1.0, 5.0]);
        assert_eq!(csc.get_entry(2, 0), 2.0);
        assert_eq!(csc.get_entry(1, 0), 0.0);
    }

    #[test]
    fn round_trip_preserves_triplets() {
        let csr = sample();
        let back = CscMatrix::from_csr(&csr).to_csr();
        assert_eq!(back, csr);
        let mut a = csr.to_triplets();
        let mut b = CscMatrix::from_csr(&csr).to_triplets();
        a.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        b.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        assert_eq!(a, b);
    }

    #[test]
    fn spmv_matches_csr() {
        let csr = sample();
        let csc = CscMatrix::from_csr(&csr);
        let x = [1.0, -2.0, 0.5];
        let (mut y1, mut y2) = (vec![0.0; 3], vec![0.0; 3]);
        csr.multiply_vector(&x, &mut y1);
        csc.multiply_vector(&x, &mut y2);
        assert_eq!(y1, y2);
    }
}

//! Dense matrix on top of Faer.
//!
//! Semantically row-major (`from_rows`, JSON as an array of rows); storage is
//! a `faer::Mat<f64>` so callers can hand it straight to Faer factorizations.

use faer::{Mat, MatRef};
use serde::{Deserialize, Serialize};

use crate::core::traits::{MatShape, MatTransVec, MatVec, MatrixGet, RowAccess};
use crate::error::SolverError;
use crate::matrix::sparse::CsrMatrix;

#[derive(Debug, Clone, PartialEq)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct DenseMatrix {
    data: Mat<f64>,
    nnz: usize,
}

impl DenseMatrix {
    /// Build from a slice of rows. Ragged rows and NaN/Inf are rejected.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, SolverError> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, |r| r.as_ref().len());
        for (i, r) in rows.iter().enumerate() {
            let r = r.as_ref();
            if r.len() != ncols {
                return Err(SolverError::MalformedInput(format!(
                    "row {i} has {} entries, expected {ncols}",
                    r.len()
                )));
            }
            if let Some(j) = r.iter().position(|v| !v.is_finite()) {
                return Err(SolverError::MalformedInput(format!("non-finite value at ({i}, {j})")));
            }
        }
        Ok(Self::from_mat(Mat::from_fn(nrows, ncols, |i, j| rows[i].as_ref()[j])))
    }

    /// Construct from raw column-major storage.
    pub fn from_col_major(nrows: usize, ncols: usize, data: &[f64]) -> Result<Self, SolverError> {
        if data.len() != nrows * ncols {
            return Err(SolverError::Shape(format!(
                "{} values for a {nrows}x{ncols} matrix",
                data.len()
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::MalformedInput("non-finite value in dense data".into()));
        }
        Ok(Self::from_mat(Mat::from_fn(nrows, ncols, |i, j| data[j * nrows + i])))
    }

    pub fn from_fn(nrows: usize, ncols: usize, f: impl FnMut(usize, usize) -> f64) -> Self {
        Self::from_mat(Mat::from_fn(nrows, ncols, f))
    }

    fn from_mat(data: Mat<f64>) -> Self {
        let mut nnz = 0;
        for j in 0..data.ncols() {
            for i in 0..data.nrows() {
                if data[(i, j)] != 0.0 {
                    nnz += 1;
                }
            }
        }
        Self { data, nnz }
    }

    pub fn as_faer(&self) -> MatRef<'_, f64> {
        self.data.as_ref()
    }

    pub fn into_faer(self) -> Mat<f64> {
        self.data
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.data.nrows())
            .map(|i| (0..self.data.ncols()).map(|j| self.data[(i, j)]).collect())
            .collect()
    }

    /// Drops explicit zeros.
    pub fn to_csr(&self) -> CsrMatrix {
        let (nrows, ncols) = (self.data.nrows(), self.data.ncols());
        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_indices = Vec::with_capacity(self.nnz);
        let mut values = Vec::with_capacity(self.nnz);
        row_ptr.push(0u32);
        for i in 0..nrows {
            for j in 0..ncols {
                let v = self.data[(i, j)];
                if v != 0.0 {
                    col_indices.push(j as u32);
                    values.push(v);
                }
            }
            row_ptr.push(col_indices.len() as u32);
        }
        CsrMatrix::from_parts_unchecked(nrows, ncols, row_ptr, col_indices, values, true)
    }
}

impl From<Mat<f64>> for DenseMatrix {
    fn from(m: Mat<f64>) -> Self {
        Self::from_mat(m)
    }
}

impl TryFrom<Vec<Vec<f64>>> for DenseMatrix {
    type Error = SolverError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(&rows)
    }
}

impl From<DenseMatrix> for Vec<Vec<f64>> {
    fn from(m: DenseMatrix) -> Self {
        m.to_rows()
    }
}

impl MatShape for DenseMatrix {
    fn nrows(&self) -> usize {
        self.data.nrows()
    }
    fn ncols(&self) -> usize {
        self.data.ncols()
    }
}

impl MatVec for DenseMatrix {
    fn matvec(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.data.ncols(), "Input vector x has incorrect length");
        assert_eq!(y.len(), self.data.nrows(), "Output vector y has incorrect length");
        for (i, yi) in y.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (j, &xj) in x.iter().enumerate() {
                sum += self.data[(i, j)] * xj;
            }
            *yi = sum;
        }
    }
}

impl MatTransVec for DenseMatrix {
    fn mattransvec(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.data.nrows(), "Input vector x has incorrect length");
        assert_eq!(y.len(), self.data.ncols(), "Output vector y has incorrect length");
        for (j, yj) in y.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (i, &xi) in x.iter().enumerate() {
                sum += self.data[(i, j)] * xi;
            }
            *yj = sum;
        }
    }
}

impl MatrixGet<f64> for DenseMatrix {
    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }
}

/// Nonzero entries of one dense row.
#[derive(Clone)]
pub struct DenseRowIter<'a> {
    data: &'a Mat<f64>,
    row: usize,
    col: usize,
}

impl Iterator for DenseRowIter<'_> {
    type Item = (usize, f64);

    fn next(&mut self) -> Option<Self::Item> {
        while self.col < self.data.ncols() {
            let j = self.col;
            self.col += 1;
            let v = self.data[(self.row, j)];
            if v != 0.0 {
                return Some((j, v));
            }
        }
        None
    }
}

impl RowAccess for DenseMatrix {
    type Row<'a> = DenseRowIter<'a>;

    fn row_entries(&self, row: usize) -> DenseRowIter<'_> {
        DenseRowIter { data: &self.data, row, col: 0 }
    }

    fn nnz(&self) -> usize {
        self.nnz
    }

    fn diagonal_entry(&self, row: usize) -> f64 {
        self.data[(row, row)]
    }

    fn memory_bytes(&self) -> usize {
        self.data.nrows() * self.data.ncols() * std::mem::size_of::<f64>()
    }
}

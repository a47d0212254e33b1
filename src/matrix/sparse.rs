//! Compressed sparse row storage.
//!
//! Indices are stored as `u32` to halve index memory against `usize`; a
//! matrix with more than `u32::MAX` stored entries or dimensions is rejected
//! at construction.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::traits::{MatShape, MatTransVec, MatVec, MatrixGet, RowAccess};
use crate::error::SolverError;

/// A `(row, col, value)` triplet.
pub type Triplet = (usize, usize, f64);

/// CSR matrix. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CsrParts", into = "CsrParts")]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    col_indices: Vec<u32>,
    row_ptr: Vec<u32>,
    sorted: bool,
}

/// Wire shape of a CSR matrix: `{rows, cols, values, colIndices, rowPtr}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrParts {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f64>,
    pub col_indices: Vec<u32>,
    pub row_ptr: Vec<u32>,
}

impl TryFrom<CsrParts> for CsrMatrix {
    type Error = SolverError;

    fn try_from(p: CsrParts) -> Result<Self, Self::Error> {
        CsrMatrix::from_raw(p.rows, p.cols, p.row_ptr, p.col_indices, p.values)
    }
}

impl From<CsrMatrix> for CsrParts {
    fn from(m: CsrMatrix) -> Self {
        CsrParts {
            rows: m.rows,
            cols: m.cols,
            values: m.values,
            col_indices: m.col_indices,
            row_ptr: m.row_ptr,
        }
    }
}

fn check_dim(name: &str, n: usize) -> Result<(), SolverError> {
    if n > u32::MAX as usize {
        return Err(SolverError::MalformedInput(format!(
            "{name} = {n} exceeds the u32 index range"
        )));
    }
    Ok(())
}

impl CsrMatrix {
    /// Build from arbitrary triplets. Entries are sorted by (row, col) and
    /// duplicate coordinates are summed.
    pub fn from_coo<I>(rows: usize, cols: usize, triplets: I) -> Result<Self, SolverError>
    where
        I: IntoIterator<Item = Triplet>,
    {
        check_dim("rows", rows)?;
        check_dim("cols", cols)?;
        let triplets: Vec<Triplet> = triplets.into_iter().collect();
        check_dim("nnz", triplets.len())?;

        // Counting sort by row.
        let mut counts = vec![0usize; rows + 1];
        for &(r, c, v) in &triplets {
            if r >= rows || c >= cols {
                return Err(SolverError::MalformedInput(format!(
                    "triplet ({r}, {c}) out of bounds for a {rows}x{cols} matrix"
                )));
            }
            if !v.is_finite() {
                return Err(SolverError::MalformedInput(format!(
                    "non-finite value {v} at ({r}, {c})"
                )));
            }
            counts[r + 1] += 1;
        }
        for i in 0..rows {
            counts[i + 1] += counts[i];
        }
        let mut next = counts.clone();
        let mut by_row: Vec<(u32, f64)> = vec![(0, 0.0); triplets.len()];
        for &(r, c, v) in &triplets {
            by_row[next[r]] = (c as u32, v);
            next[r] += 1;
        }

        // Sort each row by column and merge duplicates.
        let mut row_ptr = Vec::with_capacity(rows + 1);
        let mut col_indices = Vec::with_capacity(triplets.len());
        let mut values = Vec::with_capacity(triplets.len());
        row_ptr.push(0u32);
        for r in 0..rows {
            let row = &mut by_row[counts[r]..counts[r + 1]];
            row.sort_unstable_by_key(|&(c, _)| c);
            let row_start = col_indices.len();
            for &(c, v) in row.iter() {
                if col_indices.len() > row_start && col_indices[col_indices.len() - 1] == c {
                    let last = values.len() - 1;
                    values[last] += v;
                } else {
                    col_indices.push(c);
                    values.push(v);
                }
            }
            row_ptr.push(col_indices.len() as u32);
        }

        Ok(Self { rows, cols, values, col_indices, row_ptr, sorted: true })
    }

    /// Build from raw CSR arrays, validating every structural invariant.
    pub fn from_raw(
        rows: usize,
        cols: usize,
        row_ptr: Vec<u32>,
        col_indices: Vec<u32>,
        values: Vec<f64>,
    ) -> Result<Self, SolverError> {
        check_dim("rows", rows)?;
        check_dim("cols", cols)?;
        if row_ptr.len() != rows + 1 {
            return Err(SolverError::MalformedInput(format!(
                "rowPtr has length {}, expected {}",
                row_ptr.len(),
                rows + 1
            )));
        }
        if row_ptr[0] != 0 {
            return Err(SolverError::MalformedInput("rowPtr[0] must be 0".into()));
        }
        if let Some(pos) = row_ptr.windows(2).position(|w| w[0] > w[1]) {
            return Err(SolverError::MalformedInput(format!(
                "rowPtr decreases at position {}",
                pos + 1
            )));
        }
        let nnz = row_ptr[rows] as usize;
        if nnz != values.len() || nnz != col_indices.len() {
            return Err(SolverError::MalformedInput(format!(
                "rowPtr[rows] = {nnz} but {} values and {} column indices",
                values.len(),
                col_indices.len()
            )));
        }
        if let Some(&c) = col_indices.iter().find(|&&c| c as usize >= cols) {
            return Err(SolverError::MalformedInput(format!(
                "column index {c} out of bounds for {cols} columns"
            )));
        }
        if let Some(v) = values.iter().find(|v| !v.is_finite()) {
            return Err(SolverError::MalformedInput(format!("non-finite value {v}")));
        }

        let mut sorted = true;
        for r in 0..rows {
            let cols_r = &col_indices[row_ptr[r] as usize..row_ptr[r + 1] as usize];
            if cols_r.windows(2).any(|w| w[0] == w[1]) {
                return Err(SolverError::MalformedInput(format!(
                    "duplicate column index in row {r}"
                )));
            }
            if cols_r.windows(2).any(|w| w[0] > w[1]) {
                sorted = false;
            }
        }
        if !sorted {
            // Lookup in unsorted rows falls back to a linear scan; duplicates
            // there are only caught by this quadratic check.
            for r in 0..rows {
                let cols_r = &col_indices[row_ptr[r] as usize..row_ptr[r + 1] as usize];
                let mut seen = cols_r.to_vec();
                seen.sort_unstable();
                if seen.windows(2).any(|w| w[0] == w[1]) {
                    return Err(SolverError::MalformedInput(format!(
                        "duplicate column index in row {r}"
                    )));
                }
            }
        }

        Ok(Self { rows, cols, values, col_indices, row_ptr, sorted })
    }

    /// Internal constructor for arrays produced by this crate.
    pub(crate) fn from_parts_unchecked(
        rows: usize,
        cols: usize,
        row_ptr: Vec<u32>,
        col_indices: Vec<u32>,
        values: Vec<f64>,
        sorted: bool,
    ) -> Self {
        debug_assert_eq!(row_ptr.len(), rows + 1);
        debug_assert_eq!(col_indices.len(), values.len());
        Self { rows, cols, values, col_indices, row_ptr, sorted }
    }

    pub fn identity(n: usize) -> Self {
        Self::from_parts_unchecked(
            n,
            n,
            (0..=n as u32).collect(),
            (0..n as u32).collect(),
            vec![1.0; n],
            true,
        )
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn col_indices(&self) -> &[u32] {
        &self.col_indices
    }

    pub fn row_ptr(&self) -> &[u32] {
        &self.row_ptr
    }

    pub fn has_sorted_rows(&self) -> bool {
        self.sorted
    }

    #[inline]
    fn row_range(&self, row: usize) -> Range<usize> {
        self.row_ptr[row] as usize..self.row_ptr[row + 1] as usize
    }

    pub fn row_nnz(&self, row: usize) -> usize {
        self.row_range(row).len()
    }

    /// `out = M · x` in O(nnz). `out` is overwritten.
    pub fn multiply_vector(&self, x: &[f64], out: &mut [f64]) {
        assert_eq!(x.len(), self.cols, "Input vector x has incorrect length");
        assert_eq!(out.len(), self.rows, "Output vector has incorrect length");
        for (r, o) in out.iter_mut().enumerate() {
            let range = self.row_range(r);
            let mut sum = 0.0;
            for (&c, &v) in self.col_indices[range.clone()].iter().zip(&self.values[range]) {
                sum += v * x[c as usize];
            }
            *o = sum;
        }
    }

    /// Parallel SpMV using Rayon.
    #[cfg(feature = "rayon")]
    pub fn multiply_vector_parallel(&self, x: &[f64], out: &mut [f64]) {
        use rayon::prelude::*;
        assert_eq!(x.len(), self.cols, "Input vector x has incorrect length");
        assert_eq!(out.len(), self.rows, "Output vector has incorrect length");
        out.par_iter_mut().enumerate().for_each(|(r, o)| {
            let range = self.row_range(r);
            *o = self.col_indices[range.clone()]
                .iter()
                .zip(&self.values[range])
                .map(|(&c, &v)| v * x[c as usize])
                .sum();
        });
    }

    /// Entry lookup: binary search in sorted rows, linear scan otherwise.
    pub fn get_entry(&self, row: usize, col: usize) -> f64 {
        if row >= self.rows || col >= self.cols {
            return 0.0;
        }
        let range = self.row_range(row);
        let cols_r = &self.col_indices[range.clone()];
        let hit = if self.sorted {
            cols_r.binary_search(&(col as u32)).ok()
        } else {
            cols_r.iter().position(|&c| c as usize == col)
        };
        hit.map_or(0.0, |k| self.values[range.start + k])
    }

    /// Lazy iterator over `(col, value)` of one row.
    pub fn row_iter(&self, row: usize) -> CsrRowIter<'_> {
        let range = self.row_range(row);
        CsrRowIter { cols: &self.col_indices[range.clone()], vals: &self.values[range], pos: 0 }
    }

    pub fn to_triplets(&self) -> Vec<Triplet> {
        (0..self.rows)
            .flat_map(|r| self.row_iter(r).map(move |(c, v)| (r, c, v)))
            .collect()
    }

    /// Copy of the rows in `range` as a standalone matrix.
    pub fn slice_rows(&self, range: Range<usize>) -> CsrMatrix {
        let start = self.row_ptr[range.start];
        let end = self.row_ptr[range.end] as usize;
        let row_ptr = self.row_ptr[range.start..=range.end].iter().map(|p| p - start).collect();
        CsrMatrix::from_parts_unchecked(
            range.len(),
            self.cols,
            row_ptr,
            self.col_indices[start as usize..end].to_vec(),
            self.values[start as usize..end].to_vec(),
            self.sorted,
        )
    }
}

/// Row iterator for [`CsrMatrix`]. Calling `row_iter` again restarts from
/// the row start.
#[derive(Debug, Clone)]
pub struct CsrRowIter<'a> {
    cols: &'a [u32],
    vals: &'a [f64],
    pos: usize,
}

impl Iterator for CsrRowIter<'_> {
    type Item = (usize, f64);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let c = *self.cols.get(self.pos)?;
        let v = self.vals[self.pos];
        self.pos += 1;
        Some((c as usize, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.cols.len() - self.pos;
        (left, Some(left))
    }
}

impl ExactSizeIterator for CsrRowIter<'_> {}

impl MatShape for CsrMatrix {
    fn nrows(&self) -> usize {
        self.rows
    }
    fn ncols(&self) -> usize {
        self.cols
    }
}

impl MatVec for CsrMatrix {
    fn matvec(&self, x: &[f64], y: &mut [f64]) {
        self.multiply_vector(x, y);
    }
}

impl MatTransVec for CsrMatrix {
    fn mattransvec(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.rows, "Input vector x has incorrect length");
        assert_eq!(y.len(), self.cols, "Output vector y has incorrect length");
        y.iter_mut().for_each(|v| *v = 0.0);
        for (r, &xr) in x.iter().enumerate() {
            for (c, v) in self.row_iter(r) {
                y[c] += v * xr;
            }
        }
    }
}

impl MatrixGet<f64> for CsrMatrix {
    fn get(&self, i: usize, j: usize) -> f64 {
        self.get_entry(i, j)
    }
}

impl RowAccess for CsrMatrix {
    type Row<'a> = CsrRowIter<'a>;

    fn row_entries(&self, row: usize) -> CsrRowIter<'_> {
        self.row_iter(row)
    }

    fn nnz(&self) -> usize {
        self.values.len()
    }

    fn diagonal_entry(&self, row: usize) -> f64 {
        self.get_entry(row, row)
    }

    fn memory_bytes(&self) -> usize {
        self.values.len() * std::mem::size_of::<f64>()
            + (self.col_indices.len() + self.row_ptr.len()) * std::mem::size_of::<u32>()
    }
}

//! Structural analysis used for method selection and diagnostics.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::core::traits::{LinearOperator, MatShape, MatVec, RowAccess};

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct MatrixTraits: u32 {
        const SQUARE                       = 0b0001;
        /// `|m_ii| ≥ Σ_{j≠i} |m_ij|` on every row.
        const DIAGONALLY_DOMINANT          = 0b0010;
        /// Strict inequality on every row.
        const STRICTLY_DIAGONALLY_DOMINANT = 0b0100;
        const ZERO_DIAGONAL                = 0b1000;
    }
}

/// How the sublinear methods are expected to scale on this matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplexityClass {
    Logarithmic,
    Sublinear,
    Linear,
    Superlinear,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixProfile {
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
    /// `nnz / (rows · cols)`; zero for an empty matrix.
    pub density: f64,
    /// `min_i (|m_ii| − Σ_{j≠i}|m_ij|) / |m_ii|`. Positive iff strictly
    /// dominant; `-inf` when some diagonal entry is zero.
    pub dominance_margin: f64,
    /// `max_i Σ_{j≠i}|m_ij| / |m_ii|`, an upper bound on `‖D⁻¹R‖∞`.
    pub max_offdiag_ratio: f64,
    pub traits: MatrixTraits,
}

impl MatrixProfile {
    /// One pass over the stored entries.
    pub fn analyze<M: RowAccess + ?Sized>(op: &M) -> Self {
        let (rows, cols) = (op.nrows(), op.ncols());
        let nnz = op.nnz();
        let density = if rows == 0 || cols == 0 {
            0.0
        } else {
            nnz as f64 / (rows as f64 * cols as f64)
        };

        let mut traits = MatrixTraits::empty();
        if rows == cols {
            traits |= MatrixTraits::SQUARE;
        }

        let mut margin = f64::INFINITY;
        let mut ratio: f64 = 0.0;
        let mut dominant = true;
        let mut strict = true;
        for i in 0..rows.min(cols) {
            let mut diag = 0.0;
            let mut off = 0.0;
            for (j, v) in op.row_entries(i) {
                if j == i {
                    diag += v;
                } else {
                    off += v.abs();
                }
            }
            let d = diag.abs();
            if d == 0.0 {
                traits |= MatrixTraits::ZERO_DIAGONAL;
                margin = f64::NEG_INFINITY;
                ratio = f64::INFINITY;
                dominant = false;
                strict = false;
                continue;
            }
            margin = margin.min((d - off) / d);
            ratio = ratio.max(off / d);
            dominant &= d >= off;
            strict &= d > off;
        }
        if margin == f64::INFINITY {
            // No rows: vacuously dominant with full margin.
            margin = 1.0;
        }
        if traits.contains(MatrixTraits::SQUARE) {
            if dominant {
                traits |= MatrixTraits::DIAGONALLY_DOMINANT;
            }
            if strict {
                traits |= MatrixTraits::STRICTLY_DIAGONALLY_DOMINANT;
            }
        }

        Self {
            rows,
            cols,
            nnz,
            density,
            dominance_margin: margin,
            max_offdiag_ratio: ratio,
            traits,
        }
    }

    pub fn complexity(&self) -> ComplexityClass {
        if self.traits.contains(MatrixTraits::ZERO_DIAGONAL) {
            ComplexityClass::Superlinear
        } else if self.traits.contains(MatrixTraits::STRICTLY_DIAGONALLY_DOMINANT)
            && self.max_offdiag_ratio < 0.5
        {
            ComplexityClass::Logarithmic
        } else if self.traits.contains(MatrixTraits::DIAGONALLY_DOMINANT) {
            ComplexityClass::Sublinear
        } else {
            ComplexityClass::Linear
        }
    }
}

/// Power-iteration estimate of the spectral radius of `D⁻¹R`, the Jacobi
/// iteration matrix of `M = D − R`. Infinite when `M` has a zero diagonal.
pub fn estimate_spectral_radius<M: LinearOperator + ?Sized>(op: &M, steps: usize) -> f64 {
    let n = op.nrows();
    if n == 0 {
        return 0.0;
    }
    let diag = op.diagonal();
    if diag.iter().any(|&d| d == 0.0) {
        return f64::INFINITY;
    }

    let mut v = vec![1.0 / (n as f64).sqrt(); n];
    let mut mv = vec![0.0; n];
    let mut lambda = 0.0;
    for _ in 0..steps.max(1) {
        // (D⁻¹R)v = v − D⁻¹Mv
        op.matvec(&v, &mut mv);
        for i in 0..n {
            mv[i] = v[i] - mv[i] / diag[i];
        }
        let norm = mv.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm < 1e-14 {
            return 0.0;
        }
        lambda = norm;
        for i in 0..n {
            v[i] = mv[i] / norm;
        }
    }
    lambda
}

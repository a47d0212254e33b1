//! Matrix module: dense, sparse and streaming storage.

pub mod csc;
pub mod dense;
pub mod sparse;
pub mod streaming;

pub use csc::CscMatrix;
pub use dense::DenseMatrix;
pub use sparse::{CsrMatrix, CsrParts, Triplet};
pub use streaming::{CacheStats, ChunkSource, StreamingMatrix};

use crate::core::traits::{MatShape, RowAccess};

/// Any matrix the engine accepts. Dispatched once per call.
#[derive(Debug)]
pub enum Matrix {
    Dense(DenseMatrix),
    Csr(CsrMatrix),
    Csc(CscMatrix),
    Streaming(StreamingMatrix),
}

impl Matrix {
    pub fn kind(&self) -> &'static str {
        match self {
            Matrix::Dense(_) => "dense",
            Matrix::Csr(_) => "csr",
            Matrix::Csc(_) => "csc",
            Matrix::Streaming(_) => "streaming",
        }
    }

    pub fn nnz(&self) -> usize {
        match self {
            Matrix::Dense(m) => m.nnz(),
            Matrix::Csr(m) => m.nnz(),
            Matrix::Csc(m) => m.nnz(),
            Matrix::Streaming(m) => m.nnz(),
        }
    }
}

impl MatShape for Matrix {
    fn nrows(&self) -> usize {
        match self {
            Matrix::Dense(m) => m.nrows(),
            Matrix::Csr(m) => m.nrows(),
            Matrix::Csc(m) => m.nrows(),
            Matrix::Streaming(m) => m.nrows(),
        }
    }

    fn ncols(&self) -> usize {
        match self {
            Matrix::Dense(m) => m.ncols(),
            Matrix::Csr(m) => m.ncols(),
            Matrix::Csc(m) => m.ncols(),
            Matrix::Streaming(m) => m.ncols(),
        }
    }
}

impl From<DenseMatrix> for Matrix {
    fn from(m: DenseMatrix) -> Self {
        Matrix::Dense(m)
    }
}

impl From<CsrMatrix> for Matrix {
    fn from(m: CsrMatrix) -> Self {
        Matrix::Csr(m)
    }
}

impl From<CscMatrix> for Matrix {
    fn from(m: CscMatrix) -> Self {
        Matrix::Csc(m)
    }
}

impl From<StreamingMatrix> for Matrix {
    fn from(m: StreamingMatrix) -> Self {
        Matrix::Streaming(m)
    }
}

//! sublin: sublinear-time solvers for diagonally dominant sparse systems
//!
//! This crate approximates solutions of `Mx = b` for diagonally dominant `M`
//! with Neumann series, forward/backward push and random-walk estimators, over
//! dense (faer-backed), CSR, CSC and chunked streaming matrices. It also
//! answers single-entry queries without a full solve and computes PageRank.
//!
//! ```rust,ignore
//! use sublin::{CsrMatrix, SolverConfig};
//! let m = CsrMatrix::from_coo(3, 3, triplets)?;
//! let res = sublin::solve(&m.into(), &[3.0, 2.0, 3.0], &SolverConfig::default())?;
//! assert!(res.converged);
//! ```

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod matrix;
pub mod result;
pub mod solver;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use context::*;
pub use self::core::*;
pub use error::*;
pub use matrix::*;
pub use result::*;
pub use solver::*;
pub use utils::*;

/// Solve with a throwaway [`SolverEngine`].
pub fn solve(
    matrix: &Matrix,
    b: &[f64],
    config: &SolverConfig,
) -> std::result::Result<SolverResult, SolverError> {
    SolverEngine::new().solve(matrix, b, config)
}

/// Random-walk estimate of one entry with a throwaway [`SolverEngine`].
pub fn estimate_entry(
    matrix: &Matrix,
    b: &[f64],
    config: &SolverConfig,
) -> std::result::Result<EstimationResult, SolverError> {
    SolverEngine::new().estimate_entry(matrix, b, config)
}

/// PageRank with a throwaway [`SolverEngine`].
pub fn compute_page_rank(
    adjacency: &Matrix,
    config: &PageRankConfig,
) -> std::result::Result<Vec<f64>, SolverError> {
    SolverEngine::new().compute_page_rank(adjacency, config)
}

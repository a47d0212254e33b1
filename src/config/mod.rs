//! Solver and PageRank configuration.

pub mod options;
pub use options::{Method, PageRankConfig, Precision, SolverConfig};

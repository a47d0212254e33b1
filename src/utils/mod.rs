//! Numeric utilities shared by every solver.

pub mod analysis;
pub mod convergence;
pub mod monitor;
pub mod pool;
pub mod vector;

pub use analysis::{estimate_spectral_radius, ComplexityClass, MatrixProfile, MatrixTraits};
pub use convergence::{
    ConvergenceChecker, ConvergenceState, GrowthRule, SolveStats, StepNorms, TerminationReason,
};
pub use monitor::{PerformanceMetrics, PerformanceMonitor};
pub use pool::{PoolStats, PooledVector, VectorPool};
pub use vector::*;

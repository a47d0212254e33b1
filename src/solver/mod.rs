//! Sublinear solver interfaces.
//!
//! Every method works on the Jacobi splitting `M = D − R`, i.e. on the fixed
//! point `x = Px + c` with `P = D⁻¹R` and `c = D⁻¹b`. They differ in how they
//! expand `x = Σ_k P^k c`: all at once (Neumann), along sampled paths (random
//! walks), or locally where the residual mass is large (push methods).

use crate::core::traits::{LinearOperator, MatVec, RowAccess};
use crate::error::SolverError;
use crate::result::Progress;
use crate::utils::convergence::{SolveStats, TerminationReason};
use crate::utils::monitor::PerformanceMonitor;
use crate::utils::pool::{PooledVector, VectorPool};

pub mod backward_push;
pub mod bidirectional;
pub mod forward_push;
pub mod neumann;
pub mod pagerank;
pub mod random_walk;

pub use backward_push::BackwardPushSolver;
pub use bidirectional::BidirectionalSolver;
pub use forward_push::ForwardPushSolver;
pub use neumann::NeumannSolver;
pub use pagerank::page_rank;
pub use random_walk::RandomWalkSolver;

/// Common interface for the full-vector solvers.
pub trait LinearSolver {
    /// Approximate `M⁻¹b`.
    fn solve<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        ctx: &mut SolveContext<'_>,
    ) -> Result<SolveStats, SolverError>;
}

/// Solvers that can answer for a single entry `x_s` without a full solve.
pub trait EntrySolver {
    fn solve_entry<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        source: usize,
        ctx: &mut SolveContext<'_>,
    ) -> Result<EntryStats, SolverError>;
}

/// Raw single-entry outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryStats {
    pub value: f64,
    pub iterations: usize,
    pub residual_mass: f64,
}

/// Per-call state shared by all algorithms: scratch pool, accounting and the
/// progress callback.
pub struct SolveContext<'a> {
    pub pool: &'a VectorPool,
    pub monitor: PerformanceMonitor,
    progress: Option<&'a mut dyn FnMut(&Progress) -> bool>,
    interval: usize,
}

impl<'a> SolveContext<'a> {
    pub fn new(pool: &'a VectorPool) -> Self {
        Self { pool, monitor: PerformanceMonitor::start(), progress: None, interval: 1 }
    }

    pub fn with_progress(
        mut self,
        callback: &'a mut dyn FnMut(&Progress) -> bool,
        interval: usize,
    ) -> Self {
        self.progress = Some(callback);
        self.interval = interval.max(1);
        self
    }

    /// Called once per iteration. Returns `false` when the caller asked to stop.
    pub fn report(&mut self, iteration: usize, residual: f64) -> bool {
        self.monitor.set_iterations(iteration);
        if iteration % self.interval != 0 {
            return true;
        }
        match self.progress.as_mut() {
            Some(callback) => callback(&Progress { iteration, residual }),
            None => true,
        }
    }
}

/// `D` and `c = D⁻¹b` of the Jacobi splitting.
#[derive(Debug, Clone)]
pub struct JacobiSplit {
    pub diag: Vec<f64>,
    pub inv_diag: Vec<f64>,
    pub c: Vec<f64>,
}

impl JacobiSplit {
    /// Fails on a zero diagonal entry, where the splitting is undefined.
    pub fn new<M: LinearOperator + ?Sized>(a: &M, b: &[f64]) -> Result<Self, SolverError> {
        let diag = a.diagonal();
        if let Some(i) = diag.iter().position(|&d| d == 0.0) {
            return Err(SolverError::MalformedInput(format!("zero diagonal entry at row {i}")));
        }
        let inv_diag: Vec<f64> = diag.iter().map(|d| 1.0 / d).collect();
        let c = b.iter().zip(&inv_diag).map(|(bi, di)| bi * di).collect();
        Ok(Self { diag, inv_diag, c })
    }

    /// `P_uj = −a_uj / a_uu` for `j ≠ u`.
    #[inline]
    pub fn p(&self, u: usize, a_uj: f64) -> f64 {
        -a_uj * self.inv_diag[u]
    }
}

/// Lowest-residual iterate seen so far, in a pooled buffer.
///
/// A run that does not converge hands this back instead of its last state.
pub(crate) struct BestIterate<'p> {
    x: PooledVector<'p>,
    residual: f64,
}

impl<'p> BestIterate<'p> {
    pub(crate) fn new(pool: &'p VectorPool, n: usize) -> Result<Self, SolverError> {
        Ok(Self { x: pool.acquire(n)?, residual: f64::INFINITY })
    }

    /// Keep `x` if `residual` beats everything offered before. NaN never does.
    pub(crate) fn offer(&mut self, residual: f64, x: &[f64]) -> bool {
        if residual < self.residual {
            self.residual = residual;
            self.x.copy_from_slice(x);
            true
        } else {
            false
        }
    }

    pub(crate) fn residual(&self) -> f64 {
        self.residual
    }

    /// Solution and residual to report: the last iterate when it converged
    /// or nothing better was ever seen, the best one otherwise.
    pub(crate) fn finish(
        self,
        last: PooledVector<'p>,
        last_residual: f64,
        reason: TerminationReason,
    ) -> (Vec<f64>, f64) {
        let keep_last = reason == TerminationReason::Converged
            || !self.residual.is_finite()
            || self.residual >= last_residual;
        if keep_last {
            (last.detach(), last_residual)
        } else {
            (self.x.detach(), self.residual)
        }
    }
}

/// `r = b − M x`; returns `‖r‖₂`.
pub fn residual_into<M: LinearOperator + ?Sized>(
    a: &M,
    x: &[f64],
    b: &[f64],
    r: &mut [f64],
) -> f64 {
    a.matvec(x, r);
    for (ri, bi) in r.iter_mut().zip(b) {
        *ri = bi - *ri;
    }
    crate::utils::vector::vector_norm2(&*r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DenseMatrix;

    #[test]
    fn splitting_of_tridiagonal() {
        let m = DenseMatrix::from_rows(&[[4.0, -1.0], [-2.0, 5.0]]).unwrap();
        let s = JacobiSplit::new(&m, &[8.0, 10.0]).unwrap();
        assert_eq!(s.c, vec![2.0, 2.0]);
        assert_eq!(s.p(0, -1.0), 0.25);
        assert_eq!(s.p(1, -2.0), 0.4);
    }

    #[test]
    fn zero_diagonal_is_malformed() {
        let m = DenseMatrix::from_rows(&[[0.0, 1.0], [1.0, 1.0]]).unwrap();
        assert!(matches!(JacobiSplit::new(&m, &[1.0, 1.0]), Err(SolverError::MalformedInput(_))));
    }

    #[test]
    fn best_iterate_keeps_the_lowest_residual() {
        let pool = VectorPool::new();
        let mut best = BestIterate::new(&pool, 2).unwrap();
        assert!(best.offer(5.0, &[1.0, 1.0]));
        assert!(best.offer(2.0, &[2.0, 2.0]));
        assert!(!best.offer(3.0, &[3.0, 3.0]));
        assert!(!best.offer(f64::NAN, &[4.0, 4.0]));
        assert_eq!(best.residual(), 2.0);

        let last = pool.acquire_from(&[9.0, 9.0]).unwrap();
        let (x, res) = best.finish(last, 1e6, TerminationReason::Diverged);
        assert_eq!(x, vec![2.0, 2.0]);
        assert_eq!(res, 2.0);
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn converged_run_reports_its_last_iterate() {
        let pool = VectorPool::new();
        let mut best = BestIterate::new(&pool, 1).unwrap();
        best.offer(1e-3, &[1.0]);
        let last = pool.acquire_from(&[7.0]).unwrap();
        let (x, res) = best.finish(last, 5e-3, TerminationReason::Converged);
        assert_eq!((x, res), (vec![7.0], 5e-3));
    }

    #[test]
    fn progress_respects_interval_and_cancel() {
        let pool = VectorPool::new();
        let mut seen = Vec::new();
        let mut cb = |p: &Progress| {
            seen.push(p.iteration);
            p.iteration < 4
        };
        let mut ctx = SolveContext::new(&pool).with_progress(&mut cb, 2);
        assert!(ctx.report(1, 1.0));
        assert!(ctx.report(2, 1.0));
        assert!(ctx.report(3, 1.0));
        assert!(!ctx.report(4, 1.0));
        drop(ctx);
        assert_eq!(seen, vec![2, 4]);
    }
}

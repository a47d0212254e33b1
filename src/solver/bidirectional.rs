//! Backward push to a coarse tolerance, then sampling on what is left.
//!
//! After the push, `x = x̂ + (I − P)⁻¹ r` with `r` small. The remainder
//! `e = (I − P)⁻¹ r` is again a Neumann-type series, evaluated with random
//! walks for a full solve or with a forward push from the queried index for a
//! single entry (`x_s = x̂_s + Σ_v q_v r_v`).

use log::debug;

use crate::core::traits::LinearOperator;
use crate::error::SolverError;
use crate::solver::backward_push::BackwardPushSolver;
use crate::solver::forward_push::push_from;
use crate::solver::random_walk::RandomWalkSolver;
use crate::solver::{EntryStats, EntrySolver, JacobiSplit, LinearSolver, SolveContext};
use crate::utils::convergence::{SolveStats, TerminationReason};
use crate::utils::vector::vector_norm_inf;

pub struct BidirectionalSolver {
    pub tol: f64,
    pub max_iters: usize,
    pub seed: Option<u64>,
    divergence: (f64, usize),
}

impl BidirectionalSolver {
    pub fn new(tol: f64, max_iters: usize) -> Self {
        Self { tol, max_iters, seed: None, divergence: (10.0, 3) }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_divergence(mut self, factor: f64, patience: usize) -> Self {
        self.divergence = (factor, patience);
        self
    }

    /// Tolerance of the push phase: `√ε`, never tighter than `ε`.
    pub fn coarse_tol(&self) -> f64 {
        self.tol.sqrt().max(self.tol)
    }

    fn push_phase(&self) -> BackwardPushSolver {
        BackwardPushSolver::new(self.coarse_tol(), self.max_iters)
            .with_divergence(self.divergence.0, self.divergence.1)
    }
}

impl LinearSolver for BidirectionalSolver {
    fn solve<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        ctx: &mut SolveContext<'_>,
    ) -> Result<SolveStats, SolverError> {
        let coarse = self.push_phase().run(a, b, ctx)?;
        let pushed = coarse.stats;
        debug!(
            "bidirectional: push phase {:?} after {} rounds, residual {:e}",
            pushed.reason, pushed.iterations, pushed.final_residual
        );
        let done = pushed.final_residual < self.tol
            || matches!(pushed.reason, TerminationReason::Diverged | TerminationReason::Cancelled);
        if done {
            let reason = if pushed.final_residual < self.tol {
                TerminationReason::Converged
            } else {
                pushed.reason
            };
            return Ok(SolveStats { reason, ..pushed });
        }

        let remaining = self.max_iters.saturating_sub(pushed.iterations).max(1);
        let split = JacobiSplit::new(a, b)?;
        let walks = RandomWalkSolver::new(self.tol, remaining)
            .with_seed(self.seed)
            .with_divergence(self.divergence.0, self.divergence.1);
        let sampled =
            walks.solve_remainder(a, b, &split, &coarse.residual, Some(&pushed.solution), ctx)?;

        let iterations = pushed.iterations + sampled.iterations;
        let mut history = pushed.history;
        history.extend_from_slice(&sampled.history);
        // Sampling that never beat the push leaves the pushed estimate in place.
        let keep_sampled = sampled.converged()
            || !pushed.final_residual.is_finite()
            || sampled.final_residual <= pushed.final_residual;
        let (solution, final_residual) = if keep_sampled {
            (sampled.solution, sampled.final_residual)
        } else {
            (pushed.solution, pushed.final_residual)
        };
        Ok(SolveStats { solution, iterations, final_residual, reason: sampled.reason, history })
    }
}

impl EntrySolver for BidirectionalSolver {
    fn solve_entry<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        source: usize,
        ctx: &mut SolveContext<'_>,
    ) -> Result<EntryStats, SolverError> {
        let coarse = self.push_phase().run(a, b, ctx)?;
        let r = &coarse.residual;
        let threshold = self.tol / vector_norm_inf(r).max(1.0);
        let local = push_from(a, source, threshold, self.max_iters, self.divergence)?;
        ctx.monitor.track_bytes(local.memory_bytes());
        let value = coarse.stats.solution[source] + local.dot(|v| r[v]);
        Ok(EntryStats {
            value,
            iterations: coarse.stats.iterations + local.rounds,
            residual_mass: local.residual_mass() * vector_norm_inf(r),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DenseMatrix;
    use crate::utils::pool::VectorPool;
    use approx::assert_abs_diff_eq;

    fn system() -> (DenseMatrix, Vec<f64>) {
        let a = DenseMatrix::from_rows(&[
            [5.0, -1.0, 0.0, -1.0],
            [-1.0, 5.0, -1.0, 0.0],
            [0.0, -1.0, 5.0, -1.0],
            [-1.0, 0.0, -1.0, 5.0],
        ])
        .unwrap();
        (a, vec![3.0, 3.0, 3.0, 3.0]) // x = [1, 1, 1, 1]
    }

    #[test]
    fn entry_combines_push_and_local_sweep() {
        let (a, b) = system();
        let pool = VectorPool::new();
        let mut ctx = SolveContext::new(&pool);
        let e = BidirectionalSolver::new(1e-8, 1000).solve_entry(&a, &b, 2, &mut ctx).unwrap();
        assert_abs_diff_eq!(e.value, 1.0, epsilon = 1e-7);
    }

    #[test]
    fn full_solve_refines_coarse_push() {
        let (a, b) = system();
        let pool = VectorPool::new();
        let mut ctx = SolveContext::new(&pool);
        let stats = BidirectionalSolver::new(1e-4, 400)
            .with_seed(Some(3))
            .solve(&a, &b, &mut ctx)
            .unwrap();
        for xi in &stats.solution {
            assert_abs_diff_eq!(*xi, 1.0, epsilon = 1e-2);
        }
        assert!(stats.iterations > 0);
        assert_eq!(pool.stats().outstanding, 0);
    }
}

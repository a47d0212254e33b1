//! Truncated Neumann series `x = Σ_k P^k c`.
//!
//! Evaluated as the Jacobi iteration `x_{k+1} = x_k + D⁻¹(b − M x_k)`, which
//! equals `c + P x_k` but yields the residual of every iterate for free: one
//! matvec per iteration and no explicit `P`.

use log::{debug, trace, warn};

use crate::config::Precision;
use crate::core::traits::LinearOperator;
use crate::error::SolverError;
use crate::solver::{
    residual_into, BestIterate, EntryStats, EntrySolver, JacobiSplit, LinearSolver, SolveContext,
};
use crate::utils::convergence::{ConvergenceChecker, SolveStats, TerminationReason};
use crate::utils::vector::{round_through, vector_norm2};

/// Relative residual below which `f32` iterates stop making progress.
const F32_FLOOR: f64 = 1e3 * f32::EPSILON as f64;

pub struct NeumannSolver {
    pub tol: f64,
    pub max_iters: usize,
    pub precision: Precision,
    divergence: (f64, usize),
}

impl NeumannSolver {
    pub fn new(tol: f64, max_iters: usize) -> Self {
        Self { tol, max_iters, precision: Precision::Double, divergence: (10.0, 3) }
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_divergence(mut self, factor: f64, patience: usize) -> Self {
        self.divergence = (factor, patience);
        self
    }
}

impl LinearSolver for NeumannSolver {
    fn solve<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        ctx: &mut SolveContext<'_>,
    ) -> Result<SolveStats, SolverError> {
        let n = b.len();
        let split = JacobiSplit::new(a, b)?;
        let pool = ctx.pool;

        let mut x = pool.acquire_from(&split.c)?;
        let mut best = BestIterate::new(pool, n)?;
        let mut r = pool.acquire(n)?;

        let b_norm = vector_norm2(b).max(f64::MIN_POSITIVE);
        let mut narrow = self.precision != Precision::Double;
        if narrow {
            round_through::<f32, f64>(&mut x);
        }

        let mut checker = ConvergenceChecker::new(self.tol, self.max_iters)
            .with_divergence(self.divergence.0, self.divergence.1);
        let mut history = Vec::new();
        debug!("neumann: n = {n}, tol = {:e}, precision = {:?}", self.tol, self.precision);

        let reason = loop {
            let res = residual_into(a, &x, b, &mut r);
            history.push(res);
            best.offer(res, &x);
            let state = checker.observe(res, None);
            trace!("neumann: iter {} residual {:e}", checker.iterations(), res);
            if state.is_terminal() {
                break TerminationReason::from(state);
            }
            if !ctx.report(checker.iterations(), res) {
                break TerminationReason::Cancelled;
            }

            for ((xi, ri), di) in x.iter_mut().zip(r.iter()).zip(&split.inv_diag) {
                *xi += ri * di;
            }
            if narrow {
                round_through::<f32, f64>(&mut x);
                if self.precision == Precision::Adaptive && res / b_norm < F32_FLOOR {
                    debug!("neumann: switching to f64 at iteration {}", checker.iterations());
                    narrow = false;
                }
            }
        };

        if reason == TerminationReason::Diverged {
            warn!("neumann: diverged after {} iterations", checker.iterations());
        }
        let last_residual = history.last().copied().unwrap_or(f64::INFINITY);
        let (solution, final_residual) = best.finish(x, last_residual, reason);

        Ok(SolveStats {
            solution,
            iterations: checker.iterations(),
            final_residual,
            reason,
            history,
        })
    }
}

impl EntrySolver for NeumannSolver {
    /// Neumann has no local form; the entry comes from a full solve.
    fn solve_entry<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        source: usize,
        ctx: &mut SolveContext<'_>,
    ) -> Result<EntryStats, SolverError> {
        let stats = self.solve(a, b, ctx)?;
        Ok(EntryStats {
            value: stats.solution[source],
            iterations: stats.iterations,
            residual_mass: stats.final_residual,
        })
    }
}

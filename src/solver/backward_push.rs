//! Backward push: residual propagation along the columns of `P`.
//!
//! Starts from `x̂ = 0, r = c` and keeps the invariant `x = x̂ + (I − P)⁻¹ r`,
//! which means `b − M x̂ = D r` at all times. Pushing `u` moves `r_u` into
//! `x̂_u` and adds `P_iu · r_u` to every `r_i` in column `u`. Nodes are pushed
//! while `|d_u r_u| > ε / (2√n)`, so a drained queue guarantees
//! `‖b − M x̂‖₂ ≤ ε / 2`. When `b` is sparse only its neighbourhood is touched.

use log::{debug, trace, warn};

use crate::core::traits::{LinearOperator, MatShape};
use crate::error::SolverError;
use crate::matrix::CscMatrix;
use crate::solver::{EntryStats, EntrySolver, JacobiSplit, LinearSolver, SolveContext};
use crate::utils::convergence::{ConvergenceChecker, SolveStats, TerminationReason};
use crate::utils::pool::{PooledVector, VectorPool};

/// Estimate and leftover residual of a backward push.
pub(crate) struct PushState {
    pub stats: SolveStats,
    /// `r` of the invariant, in the scaled (`c`) space.
    pub residual: Vec<f64>,
}

/// Best `(x̂, r)` pair seen so far. Only entries touched since the last
/// snapshot are copied, so keeping it costs no more than the pushes did.
struct Snapshot<'p> {
    x: PooledVector<'p>,
    r: PooledVector<'p>,
    residual: f64,
    dirty: Vec<usize>,
    is_dirty: Vec<bool>,
}

impl<'p> Snapshot<'p> {
    fn new(pool: &'p VectorPool, x: &[f64], r: &[f64]) -> Result<Self, SolverError> {
        Ok(Self {
            x: pool.acquire_from(x)?,
            r: pool.acquire_from(r)?,
            residual: f64::INFINITY,
            dirty: Vec::new(),
            is_dirty: vec![false; x.len()],
        })
    }

    #[inline]
    fn touch(&mut self, i: usize) {
        if !self.is_dirty[i] {
            self.is_dirty[i] = true;
            self.dirty.push(i);
        }
    }

    fn offer(&mut self, residual: f64, x: &[f64], r: &[f64]) {
        if residual < self.residual {
            self.residual = residual;
            for i in self.dirty.drain(..) {
                self.is_dirty[i] = false;
                self.x[i] = x[i];
                self.r[i] = r[i];
            }
        }
    }
}

pub struct BackwardPushSolver {
    pub tol: f64,
    pub max_iters: usize,
    divergence: (f64, usize),
}

impl BackwardPushSolver {
    pub fn new(tol: f64, max_iters: usize) -> Self {
        Self { tol, max_iters, divergence: (10.0, 3) }
    }

    pub fn with_divergence(mut self, factor: f64, patience: usize) -> Self {
        self.divergence = (factor, patience);
        self
    }

    pub(crate) fn run<M: LinearOperator + ?Sized>(
        &self,
        a: &M,
        b: &[f64],
        ctx: &mut SolveContext<'_>,
    ) -> Result<PushState, SolverError> {
        let n = b.len();
        let split = JacobiSplit::new(a, b)?;
        let cols = CscMatrix::from_operator(a);
        let cols_bytes = cols.memory_bytes();
        ctx.monitor.track_bytes(cols_bytes);

        let pool = ctx.pool;
        let mut x = pool.acquire(n)?;
        let mut r = pool.acquire_from(&split.c)?;
        let mut best = Snapshot::new(pool, &x, &r)?;
        let threshold = self.tol / (2.0 * (n.max(1) as f64).sqrt());
        let scaled = |i: usize, r_i: f64| (split.diag[i] * r_i).abs();

        let mut queued = vec![false; n];
        let mut active: Vec<usize> = (0..n).filter(|&i| scaled(i, r[i]) > threshold).collect();
        active.iter().for_each(|&i| queued[i] = true);
        let mut next = Vec::new();
        // ‖D r‖₂², kept up to date as residuals move.
        let mut sq: f64 = b.iter().map(|v| v * v).sum();

        let mut checker = ConvergenceChecker::new(self.tol, self.max_iters)
            .with_divergence(self.divergence.0, self.divergence.1);
        let mut history = Vec::new();
        debug!("backward-push: n = {n}, threshold {threshold:e}, {} active", active.len());

        let mut residual;
        let reason = loop {
            for u in active.drain(..) {
                queued[u] = false;
                let r_u = r[u];
                if scaled(u, r_u) <= threshold {
                    continue;
                }
                x[u] += r_u;
                r[u] = 0.0;
                best.touch(u);
                sq -= (split.diag[u] * r_u).powi(2);
                for (i, a_iu) in cols.col_entries(u) {
                    if i == u || a_iu == 0.0 {
                        continue;
                    }
                    best.touch(i);
                    let before = split.diag[i] * r[i];
                    r[i] += split.p(i, a_iu) * r_u;
                    let after = split.diag[i] * r[i];
                    sq += after * after - before * before;
                    if !queued[i] && after.abs() > threshold {
                        queued[i] = true;
                        next.push(i);
                    }
                }
            }
            std::mem::swap(&mut active, &mut next);

            // Recompute exactly before trusting a small or drained value.
            if active.is_empty() || !sq.is_finite() || sq < self.tol * self.tol {
                sq = r.iter().enumerate().map(|(i, &ri)| (split.diag[i] * ri).powi(2)).sum();
            }
            residual = sq.max(0.0).sqrt();
            history.push(residual);
            best.offer(residual, &x, &r);
            let state = checker.observe(residual, None);
            trace!(
                "backward-push: round {} residual {residual:e}, {} active",
                checker.iterations(),
                active.len()
            );
            if state.is_terminal() {
                break TerminationReason::from(state);
            }
            if !ctx.report(checker.iterations(), residual) {
                break TerminationReason::Cancelled;
            }
        };
        ctx.monitor.release_bytes(cols_bytes);
        if reason == TerminationReason::Diverged {
            warn!("backward-push: diverged after {} rounds", checker.iterations());
        }

        // Anything short of convergence reports the best pair seen.
        let keep_last = reason == TerminationReason::Converged
            || !best.residual.is_finite()
            || best.residual >= residual;
        let (solution, leftover, final_residual) = if keep_last {
            (x.detach(), r.detach(), residual)
        } else {
            let Snapshot { x, r, residual, .. } = best;
            (x.detach(), r.detach(), residual)
        };
        let stats = SolveStats {
            solution,
            iterations: checker.iterations(),
            final_residual,
            reason,
            history,
        };
        Ok(PushState { stats, residual: leftover })
    }
}

impl LinearSolver for BackwardPushSolver {
    fn solve<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        ctx: &mut SolveContext<'_>,
    ) -> Result<SolveStats, SolverError> {
        Ok(self.run(a, b, ctx)?.stats)
    }
}

impl EntrySolver for BackwardPushSolver {
    /// Backward push produces every entry at once; the entry is read off the
    /// pushed estimate.
    fn solve_entry<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        source: usize,
        ctx: &mut SolveContext<'_>,
    ) -> Result<EntryStats, SolverError> {
        if source >= a.nrows() {
            return Err(SolverError::Configuration(format!("source index {source} out of range")));
        }
        let state = self.run(a, b, ctx)?;
        Ok(EntryStats {
            value: state.stats.solution[source],
            iterations: state.stats.iterations,
            residual_mass: state.residual.iter().map(|r| r.abs()).sum(),
        })
    }
}

//! Forward push: row-local evaluation of one entry `x_s`.
//!
//! Maintains a sparse estimate `q` and residual `r` (both row vectors) with
//! the invariant
//!
//! ```text
//! e_sᵀ (I − P)⁻¹ = q + r (I − P)⁻¹
//! ```
//!
//! starting from `q = 0, r = e_s`. Pushing node `v` moves `r_v` into `q_v` and
//! spreads `r_v · P_vj` along row `v`. Once every `|r_v|` is below the
//! threshold, `x_s = e_sᵀ(I − P)⁻¹ c ≈ Σ_v q_v c_v`. Only rows that receive
//! mass are ever read, and diagonals are looked up as rows are visited, so the
//! work is bounded by the threshold rather than by `n`.
//!
//! `‖r‖₁` cannot grow when the rows of `P` sum to less than one. A push whose
//! residual mass keeps growing anyway is stopped and flagged as diverged.

use std::collections::HashMap;

use log::{debug, trace, warn};

use crate::core::traits::{LinearOperator, RowAccess};
use crate::error::SolverError;
use crate::solver::{
    residual_into, BestIterate, EntryStats, EntrySolver, LinearSolver, SolveContext,
};
use crate::utils::convergence::{
    ConvergenceChecker, ConvergenceState, SolveStats, TerminationReason,
};
use crate::utils::vector::vector_norm_inf;

/// Threshold shrink factor between refinement passes of a full solve.
const REFINE_FACTOR: f64 = 0.1;

/// Sparse state of one local push.
#[derive(Debug, Clone, Default)]
pub struct LocalPush {
    pub estimate: HashMap<usize, f64>,
    pub residual: HashMap<usize, f64>,
    diag: HashMap<usize, f64>,
    /// Sweeps over the active set.
    pub rounds: usize,
    pub pushes: usize,
    /// Residual mass kept growing and the push was cut short.
    pub diverged: bool,
}

impl LocalPush {
    /// `Σ_v q_v · rhs(v)`.
    pub fn dot(&self, rhs: impl Fn(usize) -> f64) -> f64 {
        self.estimate.iter().map(|(&v, &q)| q * rhs(v)).sum()
    }

    /// `Σ_v q_v · b_v / m_vv`, i.e. the estimate of `x_s` for `c = D⁻¹b`.
    pub fn value(&self, b: &[f64]) -> f64 {
        self.estimate
            .iter()
            .map(|(&v, &q)| q * b[v] / self.diag.get(&v).copied().unwrap_or(f64::INFINITY))
            .sum()
    }

    /// `‖r‖₁` of what was left unpushed.
    pub fn residual_mass(&self) -> f64 {
        self.residual.values().map(|r| r.abs()).sum()
    }

    pub fn memory_bytes(&self) -> usize {
        (self.estimate.len() + self.residual.len() + self.diag.len())
            * (std::mem::size_of::<usize>() + std::mem::size_of::<f64>())
    }
}

/// Push from `source` until every residual is at most `threshold`,
/// `max_rounds` sweeps have run, or `‖r‖₁` grows past `factor` times its
/// starting value for `patience` sweeps in a row (`divergence`).
pub fn push_from<M: LinearOperator + ?Sized>(
    a: &M,
    source: usize,
    threshold: f64,
    max_rounds: usize,
    divergence: (f64, usize),
) -> Result<LocalPush, SolverError> {
    let mut state = LocalPush::default();
    state.residual.insert(source, 1.0);
    let mut active = vec![source];
    let mut next = Vec::new();
    let mut mass = 1.0;
    let mut growth =
        ConvergenceChecker::new(0.0, usize::MAX).with_divergence(divergence.0, divergence.1);
    growth.observe(mass, None);

    while !active.is_empty() && state.rounds < max_rounds {
        state.rounds += 1;
        for v in active.drain(..) {
            let r_v = match state.residual.get(&v) {
                Some(&r) if r.abs() > threshold => r,
                _ => continue,
            };
            state.residual.remove(&v);
            mass -= r_v.abs();
            let d = match state.diag.get(&v) {
                Some(&d) => d,
                None => {
                    let d = a.diagonal_entry(v);
                    if d == 0.0 {
                        return Err(SolverError::MalformedInput(format!(
                            "zero diagonal entry at row {v}"
                        )));
                    }
                    state.diag.insert(v, d);
                    d
                }
            };
            *state.estimate.entry(v).or_insert(0.0) += r_v;
            state.pushes += 1;
            for (j, a_vj) in a.row_entries(v) {
                if j == v || a_vj == 0.0 {
                    continue;
                }
                let r_j = state.residual.entry(j).or_insert(0.0);
                let before = r_j.abs();
                *r_j += r_v * (-a_vj / d);
                mass += r_j.abs() - before;
                if before <= threshold && r_j.abs() > threshold {
                    next.push(j);
                }
            }
        }
        std::mem::swap(&mut active, &mut next);
        if growth.observe(mass, None) == ConvergenceState::Diverged {
            state.diverged = true;
            break;
        }
    }
    Ok(state)
}

pub struct ForwardPushSolver {
    pub tol: f64,
    pub max_iters: usize,
    divergence: (f64, usize),
}

impl ForwardPushSolver {
    pub fn new(tol: f64, max_iters: usize) -> Self {
        Self { tol, max_iters, divergence: (10.0, 3) }
    }

    pub fn with_divergence(mut self, factor: f64, patience: usize) -> Self {
        self.divergence = (factor, patience);
        self
    }

    /// Push threshold for a single entry against right-hand side `b`.
    fn entry_threshold(&self, b: &[f64]) -> f64 {
        self.tol / vector_norm_inf(b).max(1.0)
    }
}

impl EntrySolver for ForwardPushSolver {
    fn solve_entry<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        source: usize,
        ctx: &mut SolveContext<'_>,
    ) -> Result<EntryStats, SolverError> {
        let threshold = self.entry_threshold(b);
        let state = push_from(a, source, threshold, self.max_iters, self.divergence)?;
        ctx.monitor.track_bytes(state.memory_bytes());
        ctx.monitor.set_iterations(state.rounds);
        if state.diverged {
            warn!(
                "forward-push: residual mass from {source} diverged after {} rounds",
                state.rounds
            );
        }
        debug!(
            "forward-push: entry {source}: {} pushes over {} rounds, {} nodes touched",
            state.pushes,
            state.rounds,
            state.estimate.len()
        );
        Ok(EntryStats {
            value: state.value(b),
            iterations: state.rounds,
            residual_mass: state.residual_mass(),
        })
    }
}

impl LinearSolver for ForwardPushSolver {
    /// One local push per row, refined with a smaller threshold each pass
    /// until the assembled vector meets the residual tolerance. A pass in
    /// which any row's push diverged ends the solve as diverged.
    fn solve<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        ctx: &mut SolveContext<'_>,
    ) -> Result<SolveStats, SolverError> {
        let n = b.len();
        let pool = ctx.pool;
        let mut x = pool.acquire(n)?;
        let mut r = pool.acquire(n)?;
        let mut best = BestIterate::new(pool, n)?;
        let mut threshold = self.entry_threshold(b) / (n.max(1) as f64).sqrt();
        let mut checker = ConvergenceChecker::new(self.tol, self.max_iters)
            .with_divergence(self.divergence.0, self.divergence.1);
        let mut history = Vec::new();
        let mut residual;
        debug!("forward-push: n = {n}, initial threshold {threshold:e}");

        let reason = loop {
            let mut peak_local = 0;
            let mut diverged_rows = 0;
            for (i, xi) in x.iter_mut().enumerate() {
                let state = push_from(a, i, threshold, self.max_iters, self.divergence)?;
                peak_local = peak_local.max(state.memory_bytes());
                diverged_rows += usize::from(state.diverged);
                *xi = state.value(b);
            }
            ctx.monitor.observe_peak(peak_local);
            residual = residual_into(a, &x, b, &mut r);
            history.push(residual);
            best.offer(residual, &x);
            let state = checker.observe(residual, None);
            trace!(
                "forward-push: pass {} threshold {threshold:e} residual {residual:e}",
                checker.iterations()
            );
            if state.is_terminal() {
                break TerminationReason::from(state);
            }
            if diverged_rows > 0 {
                debug!("forward-push: {diverged_rows} local pushes diverged");
                break TerminationReason::Diverged;
            }
            if !ctx.report(checker.iterations(), residual) {
                break TerminationReason::Cancelled;
            }
            threshold *= REFINE_FACTOR;
        };
        if reason == TerminationReason::Diverged {
            warn!("forward-push: diverged after {} passes", checker.iterations());
        }

        let (solution, final_residual) = best.finish(x, residual, reason);
        Ok(SolveStats {
            solution,
            iterations: checker.iterations(),
            final_residual,
            reason,
            history,
        })
    }
}

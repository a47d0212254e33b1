//! Monte Carlo evaluation of `x = Σ_k P^k c` along random paths.
//!
//! A walk from `i` visits `u_0 = i, u_1, …` carrying a weight `W`. At every
//! visited node it scores `W · c_u`. From `u` it continues with probability
//! `q_u = min(S_u, 1 − p_min)` where `S_u = Σ_j |P_uj|`, picks `j` with
//! probability `|P_uj| / S_u` and rescales `W` by `sign(P_uj) · S_u / q_u`,
//! so the expected score of step `k` is exactly `(P^k c)_i`. Walks are cut
//! after a step cap derived from `‖P‖∞` and the tolerance, which bounds the
//! truncation bias by `ε`.
//!
//! # Variance tracking
//!
//! Welford accumulators give the running mean and sample variance of the
//! per-walk score. For an entry estimate with additive error `ε` and failure
//! probability `δ`, `⌈3 ln(2/δ) / ε²⌉` walks suffice.

use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::traits::{LinearOperator, MatShape, RowAccess};
use crate::error::SolverError;
use crate::result::EstimationResult;
use crate::solver::{
    residual_into, BestIterate, EntryStats, EntrySolver, JacobiSplit, LinearSolver, SolveContext,
};
use crate::utils::convergence::{ConvergenceChecker, GrowthRule, SolveStats, TerminationReason};
use crate::utils::vector::vector_norm_inf;

/// Failure probability behind the default walk count.
const DEFAULT_DELTA: f64 = 0.05;

const MAX_DEFAULT_SAMPLES: usize = 1_000_000;

/// Lower bound on the stopping probability at every step.
const MIN_STOP_PROB: f64 = 0.05;

const MAX_WALK_STEPS: usize = 10_000;

/// Walks needed for additive error `epsilon` with probability `1 − δ`.
pub fn default_sample_count(epsilon: f64) -> usize {
    let n = (3.0 * (2.0 / DEFAULT_DELTA).ln() / (epsilon * epsilon)).ceil();
    if n.is_finite() { (n as usize).clamp(1, MAX_DEFAULT_SAMPLES) } else { MAX_DEFAULT_SAMPLES }
}

/// `1 − 2·exp(−n ε² / (2σ²))`, clamped to `[0, 1]`. Zero variance is certain.
pub fn hoeffding_confidence(samples: usize, epsilon: f64, variance: f64) -> f64 {
    if samples == 0 {
        return 0.0;
    }
    if variance <= 0.0 {
        return 1.0;
    }
    let exponent = samples as f64 * epsilon * epsilon / (2.0 * variance);
    (1.0 - 2.0 * (-exponent).exp()).clamp(0.0, 1.0)
}

pub(crate) fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Welford's online mean and variance.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    #[inline]
    pub(crate) fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub(crate) fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (`n − 1` denominator); zero below two samples.
    pub(crate) fn variance(&self) -> f64 {
        if self.count < 2 { 0.0 } else { self.m2 / (self.count - 1) as f64 }
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> u64 {
        self.count
    }
}

/// Step cap such that the dropped tail `ρ^k ‖c‖∞ / (1 − ρ)` is below `tol`.
fn walk_length_cap(rho: f64, tol: f64, c_inf: f64) -> usize {
    if rho <= 0.0 {
        return 1;
    }
    if rho >= 1.0 || !rho.is_finite() {
        return MAX_WALK_STEPS;
    }
    let needed = (tol * (1.0 - rho) / c_inf.max(tol)).ln() / rho.ln();
    (needed.ceil().max(0.0) as usize + 1).clamp(1, MAX_WALK_STEPS)
}

/// Draws walks on one matrix. Reused across rounds and right-hand sides.
pub(crate) struct WalkSampler<'a, M: ?Sized> {
    a: &'a M,
    inv_diag: &'a [f64],
    row_mass: Vec<f64>,
    max_steps: usize,
    rng: StdRng,
}

impl<'a, M: LinearOperator + ?Sized> WalkSampler<'a, M> {
    pub(crate) fn new(a: &'a M, split: &'a JacobiSplit, tol: f64, c_inf: f64, rng: StdRng) -> Self {
        let row_mass: Vec<f64> = (0..a.nrows())
            .map(|u| {
                a.row_entries(u)
                    .filter(|&(j, _)| j != u)
                    .map(|(_, v)| (v * split.inv_diag[u]).abs())
                    .sum()
            })
            .collect();
        let rho = row_mass.iter().copied().fold(0.0, f64::max);
        let max_steps = walk_length_cap(rho, tol, c_inf);
        trace!("random-walk: ‖P‖∞ = {rho:.4}, step cap {max_steps}");
        Self { a, inv_diag: &split.inv_diag, row_mass, max_steps, rng }
    }

    pub(crate) fn memory_bytes(&self) -> usize {
        self.row_mass.len() * std::mem::size_of::<f64>()
    }

    /// One walk from `start`; returns `Σ_k W_k · payoff(u_k)`.
    pub(crate) fn walk(&mut self, start: usize, payoff: impl Fn(usize) -> f64) -> f64 {
        let mut u = start;
        let mut weight = 1.0;
        let mut score = 0.0;
        for _ in 0..self.max_steps {
            score += weight * payoff(u);
            let s = self.row_mass[u];
            if s == 0.0 {
                break;
            }
            let q = s.min(1.0 - MIN_STOP_PROB);
            if self.rng.r#gen::<f64>() >= q {
                break;
            }
            let target = self.rng.r#gen::<f64>() * s;
            let mut acc = 0.0;
            let mut pick = None;
            for (j, v) in self.a.row_entries(u) {
                if j == u || v == 0.0 {
                    continue;
                }
                let p = -v * self.inv_diag[u];
                acc += p.abs();
                pick = Some((j, p));
                if acc > target {
                    break;
                }
            }
            let Some((j, p)) = pick else { break };
            weight *= p.signum() * s / q;
            u = j;
        }
        score
    }
}

pub struct RandomWalkSolver {
    pub tol: f64,
    pub max_iters: usize,
    pub samples: Option<usize>,
    pub seed: Option<u64>,
    divergence: (f64, usize),
}

impl RandomWalkSolver {
    pub fn new(tol: f64, max_iters: usize) -> Self {
        Self { tol, max_iters, samples: None, seed: None, divergence: (10.0, 3) }
    }

    pub fn with_samples(mut self, samples: Option<usize>) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_divergence(mut self, factor: f64, patience: usize) -> Self {
        self.divergence = (factor, patience);
        self
    }

    /// Walks used for one entry estimate.
    pub fn sample_count(&self) -> usize {
        self.samples.unwrap_or_else(|| default_sample_count(self.tol))
    }

    /// Estimate `x_source`, or with `target = Some(t)` the single term
    /// `(M⁻¹)_{source,t} · b_t`.
    pub fn estimate<M: LinearOperator + ?Sized>(
        &self,
        a: &M,
        b: &[f64],
        source: usize,
        target: Option<usize>,
        ctx: &mut SolveContext<'_>,
    ) -> Result<EstimationResult, SolverError> {
        let split = JacobiSplit::new(a, b)?;
        let samples = self.sample_count();
        let c_inf = match target {
            Some(t) => split.c[t].abs(),
            None => vector_norm_inf(&split.c),
        };
        let mut sampler = WalkSampler::new(a, &split, self.tol, c_inf, make_rng(self.seed));
        ctx.monitor.track_bytes(sampler.memory_bytes());
        debug!("random-walk: estimating entry {source} (target {target:?}) with {samples} walks");

        let mut acc = Welford::default();
        for _ in 0..samples {
            let score = match target {
                Some(t) => sampler.walk(source, |u| if u == t { split.c[t] } else { 0.0 }),
                None => sampler.walk(source, |u| split.c[u]),
            };
            acc.update(score);
        }
        ctx.monitor.set_iterations(samples);

        let variance = acc.variance();
        Ok(EstimationResult {
            estimate: acc.mean(),
            variance,
            confidence: hoeffding_confidence(samples, self.tol, variance),
            samples,
            std_error: (variance / samples as f64).sqrt(),
        })
    }

    /// Rounds of one walk per index on `x = Px + rhs`, checked against the
    /// original system `b − M(offset + x)`.
    pub(crate) fn solve_remainder<M: LinearOperator + ?Sized>(
        &self,
        a: &M,
        b: &[f64],
        split: &JacobiSplit,
        rhs: &[f64],
        offset: Option<&[f64]>,
        ctx: &mut SolveContext<'_>,
    ) -> Result<SolveStats, SolverError> {
        let n = b.len();
        let pool = ctx.pool;
        let rng = make_rng(self.seed);
        let mut sampler = WalkSampler::new(a, split, self.tol, vector_norm_inf(rhs), rng);
        let mut acc = vec![Welford::default(); n];
        let acc_bytes = n * std::mem::size_of::<Welford>() + sampler.memory_bytes();
        ctx.monitor.track_bytes(acc_bytes);

        let mut x = pool.acquire(n)?;
        let mut r = pool.acquire(n)?;
        let mut best = BestIterate::new(pool, n)?;
        // Running means jitter between rounds, so growth is judged on level alone.
        let mut checker = ConvergenceChecker::new(self.tol, self.max_iters)
            .with_divergence(self.divergence.0, self.divergence.1)
            .with_growth_rule(GrowthRule::Sustained);
        let mut history = Vec::new();
        let mut residual = f64::INFINITY;

        let reason = loop {
            for (i, a_i) in acc.iter_mut().enumerate() {
                a_i.update(sampler.walk(i, |u| rhs[u]));
            }
            for (i, xi) in x.iter_mut().enumerate() {
                *xi = acc[i].mean() + offset.map_or(0.0, |o| o[i]);
            }
            residual = residual_into(a, &x, b, &mut r);
            history.push(residual);
            best.offer(residual, &x);
            let state = checker.observe(residual, None);
            trace!("random-walk: round {} residual {:e}", checker.iterations(), residual);
            if state.is_terminal() {
                break TerminationReason::from(state);
            }
            if !ctx.report(checker.iterations(), residual) {
                break TerminationReason::Cancelled;
            }
        };
        ctx.monitor.release_bytes(acc_bytes);
        if reason == TerminationReason::Diverged {
            warn!("random-walk: residual diverged after {} rounds", checker.iterations());
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

impl LinearSolver for RandomWalkSolver {
    fn solve<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        ctx: &mut SolveContext<'_>,
    ) -> Result<SolveStats, SolverError> {
        let split = JacobiSplit::new(a, b)?;
        debug!("random-walk: n = {}, tol = {:e}, seed = {:?}", b.len(), self.tol, self.seed);
        self.solve_remainder(a, b, &split, &split.c, None, ctx)
    }
}

impl EntrySolver for RandomWalkSolver {
    fn solve_entry<M: LinearOperator + ?Sized>(
        &mut self,
        a: &M,
        b: &[f64],
        source: usize,
        ctx: &mut SolveContext<'_>,
    ) -> Result<EntryStats, SolverError> {
        let est = self.estimate(a, b, source, None, ctx)?;
        Ok(EntryStats {
            value: est.estimate,
            iterations: est.samples,
            residual_mass: est.std_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DenseMatrix;
    use crate::utils::pool::VectorPool;
    use approx::assert_abs_diff_eq;

    fn tridiag() -> DenseMatrix {
        DenseMatrix::from_rows(&[[4.0, -1.0, 0.0], [-1.0, 4.0, -1.0], [0.0, -1.0, 4.0]]).unwrap()
    }

    #[test]
    fn welford_matches_two_pass() {
        let data = [1.0, 4.0, 2.0, 8.0, 5.0];
        let mut w = Welford::default();
        data.iter().for_each(|&v| w.update(v));
        let mean = data.iter().sum::<f64>() / 5.0;
        let var = data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;
        assert_abs_diff_eq!(w.mean(), mean, epsilon = 1e-12);
        assert_abs_diff_eq!(w.variance(), var, epsilon = 1e-12);
        assert_eq!(w.count(), 5);
    }

    #[test]
    fn sample_count_and_confidence() {
        assert_eq!(default_sample_count(0.1), 1107);
        assert_eq!(default_sample_count(1e-9), MAX_DEFAULT_SAMPLES);
        assert_eq!(hoeffding_confidence(10, 0.1, 0.0), 1.0);
        assert_eq!(hoeffding_confidence(0, 0.1, 1.0), 0.0);
        let low = hoeffding_confidence(100, 0.1, 0.5);
        let high = hoeffding_confidence(1000, 0.1, 0.5);
        assert!(high > low);
        assert!((0.0..=1.0).contains(&low));
    }

    #[test]
    fn cap_grows_with_rho() {
        assert_eq!(walk_length_cap(0.0, 1e-6, 1.0), 1);
        assert_eq!(walk_length_cap(1.5, 1e-6, 1.0), MAX_WALK_STEPS);
        assert!(walk_length_cap(0.9, 1e-6, 1.0) > walk_length_cap(0.5, 1e-6, 1.0));
    }

    #[test]
    fn entry_estimate_is_close() {
        let pool = VectorPool::new();
        let mut ctx = SolveContext::new(&pool);
        let solver = RandomWalkSolver::new(0.02, 100).with_seed(Some(7)).with_samples(Some(20_000));
        let est = solver.estimate(&tridiag(), &[3.0, 2.0, 3.0], 1, None, &mut ctx).unwrap();
        assert_abs_diff_eq!(est.estimate, 1.0, epsilon = 0.03);
        assert!(est.variance > 0.0);
        assert!(est.confidence > 0.9);
        assert_eq!(est.samples, 20_000);
    }

    #[test]
    fn diagonal_system_has_zero_variance() {
        let m = DenseMatrix::from_rows(&[[2.0, 0.0], [0.0, 5.0]]).unwrap();
        let pool = VectorPool::new();
        let mut ctx = SolveContext::new(&pool);
        let solver = RandomWalkSolver::new(0.1, 10).with_seed(Some(1)).with_samples(Some(50));
        let est = solver.estimate(&m, &[4.0, 5.0], 0, None, &mut ctx).unwrap();
        assert_eq!(est.estimate, 2.0);
        assert_eq!(est.variance, 0.0);
        assert_eq!(est.confidence, 1.0);
    }

    #[test]
    fn seeded_full_solve_is_reproducible() {
        let pool = VectorPool::new();
        let b = [3.0, 2.0, 3.0];
        let run = || {
            let mut ctx = SolveContext::new(&pool);
            RandomWalkSolver::new(1e-3, 300)
                .with_seed(Some(42))
                .solve(&tridiag(), &b, &mut ctx)
                .unwrap()
        };
        let (first, second) = (run(), run());
        assert_eq!(first.solution, second.solution);
        assert_eq!(first.iterations, second.iterations);
        for xi in &first.solution {
            assert_abs_diff_eq!(*xi, 1.0, epsilon = 0.15);
        }
        assert_eq!(pool.stats().outstanding, 0);
    }
}

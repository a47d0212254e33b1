//! Entry point that turns `(matrix, b, config)` into a result.
//!
//! The engine validates the request, resolves `Method::Auto` through its
//! [`SelectionPolicy`], dispatches on the [`Matrix`] variant once and hands a
//! concrete operator to the chosen algorithm. The returned residual is always
//! recomputed from the returned solution, whatever the algorithm reported.

use log::{debug, info, warn};

use crate::config::{Method, PageRankConfig, SolverConfig};
use crate::context::selection::{SelectionDecision, SelectionPolicy};
use crate::core::traits::{LinearOperator, MatShape, RowAccess};
use crate::error::SolverError;
use crate::matrix::Matrix;
use crate::result::{EntryResult, EstimationResult, Progress, SolverResult};
use crate::solver::{
    page_rank, residual_into, BackwardPushSolver, BidirectionalSolver, EntrySolver, EntryStats,
    ForwardPushSolver, LinearSolver, NeumannSolver, RandomWalkSolver, SolveContext,
};
use crate::utils::analysis::MatrixProfile;
use crate::utils::convergence::{SolveStats, TerminationReason};
use crate::utils::pool::VectorPool;

/// Binds `$op` to a row operator for whichever variant `$matrix` holds.
/// CSC input is converted to CSR first.
macro_rules! with_operator {
    ($matrix:expr, $op:ident => $body:expr) => {
        match $matrix {
            Matrix::Dense(m) => {
                let $op = m;
                $body
            }
            Matrix::Csr(m) => {
                let $op = m;
                $body
            }
            Matrix::Csc(m) => {
                let csr = m.to_csr();
                let $op = &csr;
                $body
            }
            Matrix::Streaming(m) => {
                let $op = m;
                $body
            }
        }
    };
}

/// Owns the scratch pool and the selection policy. One engine per thread.
#[derive(Default)]
pub struct SolverEngine {
    policy: SelectionPolicy,
    pool: VectorPool,
}

impl SolverEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: SelectionPolicy) -> Self {
        Self { policy, pool: VectorPool::new() }
    }

    /// Use `pool` for scratch vectors, e.g. one with an outstanding limit.
    pub fn with_pool(mut self, pool: VectorPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    pub fn pool(&self) -> &VectorPool {
        &self.pool
    }

    /// What `Method::Auto` would pick for `matrix`.
    pub fn select_method(&self, matrix: &Matrix, single_entry: bool) -> SelectionDecision {
        let profile = with_operator!(matrix, op => MatrixProfile::analyze(op));
        self.policy.select(&profile, single_entry)
    }

    /// Approximate `M⁻¹b`.
    pub fn solve(
        &self,
        matrix: &Matrix,
        b: &[f64],
        config: &SolverConfig,
    ) -> Result<SolverResult, SolverError> {
        self.validate(matrix, b, config)?;
        let mut ctx = SolveContext::new(&self.pool);
        with_operator!(matrix, op => self.solve_operator(op, b, config, &mut ctx))
    }

    /// Like [`solve`](Self::solve), calling `progress` every
    /// `config.progress_interval` iterations. Returning `false` cancels the
    /// solve; the best solution so far comes back with `reason = Cancelled`.
    pub fn solve_with_progress<F>(
        &self,
        matrix: &Matrix,
        b: &[f64],
        config: &SolverConfig,
        mut progress: F,
    ) -> Result<SolverResult, SolverError>
    where
        F: FnMut(&Progress) -> bool,
    {
        self.validate(matrix, b, config)?;
        let mut ctx =
            SolveContext::new(&self.pool).with_progress(&mut progress, config.progress_interval);
        with_operator!(matrix, op => self.solve_operator(op, b, config, &mut ctx))
    }

    /// Value of the single entry `x_s`, `s = config.source_index`.
    pub fn solve_entry(
        &self,
        matrix: &Matrix,
        b: &[f64],
        config: &SolverConfig,
    ) -> Result<EntryResult, SolverError> {
        self.validate(matrix, b, config)?;
        let source = require_source(config)?;
        let mut ctx = SolveContext::new(&self.pool);
        with_operator!(matrix, op => self.entry_operator(op, b, source, config, &mut ctx))
    }

    /// Monte Carlo estimate of `x_s` (or of `(M⁻¹)_{s,t} b_t` when
    /// `config.target_index` is set) with a confidence bound. Always sampled,
    /// whatever `config.method` says. Walks step from a column index to the
    /// row of the same index, so the matrix must be square.
    pub fn estimate_entry(
        &self,
        matrix: &Matrix,
        b: &[f64],
        config: &SolverConfig,
    ) -> Result<EstimationResult, SolverError> {
        self.validate(matrix, b, config)?;
        let source = require_source(config)?;
        let walker = RandomWalkSolver::new(config.epsilon, config.max_iterations)
            .with_samples(config.sample_count)
            .with_seed(config.seed);
        let mut ctx = SolveContext::new(&self.pool);
        let target = config.target_index;
        let est = with_operator!(matrix, op => walker.estimate(op, b, source, target, &mut ctx))?;
        info!(
            "estimate_entry: x[{source}] ≈ {:.6e} ± {:.2e} from {} walks (confidence {:.3})",
            est.estimate, est.std_error, est.samples, est.confidence
        );
        Ok(est)
    }

    /// PageRank of the graph whose row `i` holds the out-edges of node `i`.
    pub fn compute_page_rank(
        &self,
        adjacency: &Matrix,
        config: &PageRankConfig,
    ) -> Result<Vec<f64>, SolverError> {
        let mut ctx = SolveContext::new(&self.pool);
        let rank = with_operator!(adjacency, op => page_rank(op, config, &mut ctx))?;
        info!("pagerank: {} nodes in {:.3} ms", rank.len(), ctx.monitor.elapsed_ms());
        Ok(rank)
    }

    /// Fail-fast checks, config first so nothing touches the matrix on a bad config.
    fn validate(
        &self,
        matrix: &Matrix,
        b: &[f64],
        config: &SolverConfig,
    ) -> Result<(), SolverError> {
        config.validate()?;
        let (rows, cols) = (matrix.nrows(), matrix.ncols());
        if rows != cols {
            return Err(SolverError::Shape(format!("matrix must be square, got {rows}x{cols}")));
        }
        if b.len() != rows {
            return Err(SolverError::Shape(format!(
                "right-hand side has length {}, matrix has {rows} rows",
                b.len()
            )));
        }
        if let Some(i) = b.iter().position(|v| !v.is_finite()) {
            return Err(SolverError::MalformedInput(format!("non-finite value {} at b[{i}]", b[i])));
        }
        config.validate_indices(rows)
    }

    fn resolve<M: LinearOperator + ?Sized>(
        &self,
        op: &M,
        config: &SolverConfig,
        single_entry: bool,
    ) -> (Method, Option<SelectionDecision>) {
        match config.method {
            Method::Auto => {
                let decision = self.policy.select(&MatrixProfile::analyze(op), single_entry);
                (decision.method, Some(decision))
            }
            method => (method, None),
        }
    }

    fn solve_operator<M: LinearOperator + ?Sized>(
        &self,
        op: &M,
        b: &[f64],
        config: &SolverConfig,
        ctx: &mut SolveContext<'_>,
    ) -> Result<SolverResult, SolverError> {
        let n = b.len();
        let (method, selection) = self.resolve(op, config, false);
        debug!("solve: n = {n}, nnz = {}, method = {method}, eps = {:e}", op.nnz(), config.epsilon);

        self.pool.reset_peak();
        let matrix_bytes = op.memory_bytes();
        ctx.monitor.track_bytes(matrix_bytes);

        let (fac, pat) = (config.divergence_factor, config.divergence_patience);
        let (eps, max) = (config.epsilon, config.max_iterations);
        let stats: SolveStats = match method {
            Method::Neumann => NeumannSolver::new(eps, max)
                .with_precision(config.precision)
                .with_divergence(fac, pat)
                .solve(op, b, ctx)?,
            Method::ForwardPush => {
                ForwardPushSolver::new(eps, max).with_divergence(fac, pat).solve(op, b, ctx)?
            }
            Method::BackwardPush => {
                BackwardPushSolver::new(eps, max).with_divergence(fac, pat).solve(op, b, ctx)?
            }
            Method::RandomWalk => RandomWalkSolver::new(eps, max)
                .with_samples(config.sample_count)
                .with_seed(config.seed)
                .with_divergence(fac, pat)
                .solve(op, b, ctx)?,
            Method::Bidirectional => BidirectionalSolver::new(eps, max)
                .with_seed(config.seed)
                .with_divergence(fac, pat)
                .solve(op, b, ctx)?,
            Method::Auto => return Err(unresolved_auto()),
        };

        let residual = {
            let mut r = self.pool.acquire(n)?;
            residual_into(op, &stats.solution, b, &mut r)
        };
        let mut reason = stats.reason;
        if reason == TerminationReason::Converged && (residual.is_nan() || residual >= eps) {
            warn!("{method}: reported convergence but the true residual is {residual:e}");
            reason = TerminationReason::MaxIterations;
        }
        let converged = reason == TerminationReason::Converged && residual < eps;

        ctx.monitor.set_iterations(stats.iterations);
        ctx.monitor.observe_peak(self.pool.stats().peak_bytes);
        let metrics = ctx.monitor.snapshot();
        if converged {
            info!(
                "{method}: converged in {} iterations, residual {residual:e}, {:.3} ms",
                stats.iterations, metrics.elapsed_ms
            );
        } else {
            warn!(
                "{method}: stopped ({reason:?}) after {} iterations, residual {residual:e}",
                stats.iterations
            );
        }

        Ok(SolverResult {
            solution: stats.solution,
            converged,
            iterations: stats.iterations,
            residual,
            elapsed_ms: metrics.elapsed_ms,
            method_used: method,
            reason,
            residual_history: stats.history,
            metrics,
            selection,
        })
    }

    fn entry_operator<M: LinearOperator + ?Sized>(
        &self,
        op: &M,
        b: &[f64],
        source: usize,
        config: &SolverConfig,
        ctx: &mut SolveContext<'_>,
    ) -> Result<EntryResult, SolverError> {
        let (method, _) = self.resolve(op, config, true);
        debug!("solve_entry: x[{source}] of n = {}, method = {method}", b.len());
        ctx.monitor.track_bytes(op.memory_bytes());

        let (fac, pat) = (config.divergence_factor, config.divergence_patience);
        let (eps, max) = (config.epsilon, config.max_iterations);
        let entry: EntryStats = match method {
            Method::Neumann => NeumannSolver::new(eps, max)
                .with_precision(config.precision)
                .with_divergence(fac, pat)
                .solve_entry(op, b, source, ctx)?,
            Method::ForwardPush => ForwardPushSolver::new(eps, max)
                .with_divergence(fac, pat)
                .solve_entry(op, b, source, ctx)?,
            Method::BackwardPush => BackwardPushSolver::new(eps, max)
                .with_divergence(fac, pat)
                .solve_entry(op, b, source, ctx)?,
            Method::RandomWalk => RandomWalkSolver::new(eps, max)
                .with_samples(config.sample_count)
                .with_seed(config.seed)
                .solve_entry(op, b, source, ctx)?,
            Method::Bidirectional => BidirectionalSolver::new(eps, max)
                .with_seed(config.seed)
                .with_divergence(fac, pat)
                .solve_entry(op, b, source, ctx)?,
            Method::Auto => return Err(unresolved_auto()),
        };
        let elapsed_ms = ctx.monitor.elapsed_ms();
        info!("{method}: x[{source}] = {:.6e} in {} iterations", entry.value, entry.iterations);

        Ok(EntryResult {
            index: source,
            value: entry.value,
            method_used: method,
            iterations: entry.iterations,
            elapsed_ms,
            residual_mass: entry.residual_mass,
        })
    }
}

fn require_source(config: &SolverConfig) -> Result<usize, SolverError> {
    config.source_index.ok_or_else(|| {
        SolverError::Configuration("sourceIndex is required for single-entry queries".into())
    })
}

fn unresolved_auto() -> SolverError {
    SolverError::Configuration("method 'auto' was not resolved".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{CsrMatrix, DenseMatrix};
    use approx::assert_abs_diff_eq;

    fn tridiag() -> Matrix {
        DenseMatrix::from_rows(&[[4.0, -1.0, 0.0], [-1.0, 4.0, -1.0], [0.0, -1.0, 4.0]])
            .unwrap()
            .into()
    }

    #[test]
    fn auto_on_small_system_is_neumann() {
        let engine = SolverEngine::new();
        let res = engine.solve(&tridiag(), &[3.0, 2.0, 3.0], &SolverConfig::default()).unwrap();
        assert!(res.converged);
        assert_eq!(res.method_used, Method::Neumann);
        assert_eq!(res.selection.as_ref().map(|d| d.rule), Some("small-system"));
        for xi in &res.solution {
            assert_abs_diff_eq!(*xi, 1.0, epsilon = 1e-5);
        }
        assert!(res.metrics.peak_memory_estimate_bytes > 0);
        assert_eq!(engine.pool().stats().outstanding, 0);
    }

    #[test]
    fn config_is_checked_before_shape() {
        let engine = SolverEngine::new();
        let bad = SolverConfig { epsilon: -1.0, ..Default::default() };
        assert!(matches!(
            engine.solve(&tridiag(), &[1.0], &bad),
            Err(SolverError::Configuration(_))
        ));
        assert!(matches!(
            engine.solve(&tridiag(), &[1.0], &SolverConfig::default()),
            Err(SolverError::Shape(_))
        ));
    }

    #[test]
    fn non_square_and_non_finite_rejected() {
        let engine = SolverEngine::new();
        let rect: Matrix =
            CsrMatrix::from_coo(2, 3, vec![(0, 0, 1.0), (1, 1, 1.0)]).unwrap().into();
        assert!(matches!(
            engine.solve(&rect, &[1.0, 1.0], &SolverConfig::default()),
            Err(SolverError::Shape(_))
        ));
        assert!(matches!(
            engine.solve(&tridiag(), &[1.0, f64::NAN, 1.0], &SolverConfig::default()),
            Err(SolverError::MalformedInput(_))
        ));
    }

    #[test]
    fn entry_query_requires_source() {
        let engine = SolverEngine::new();
        let cfg = SolverConfig::new(Method::ForwardPush, 1e-8, 100);
        assert!(matches!(
            engine.solve_entry(&tridiag(), &[3.0, 2.0, 3.0], &cfg),
            Err(SolverError::Configuration(_))
        ));
        let e = engine.solve_entry(&tridiag(), &[3.0, 2.0, 3.0], &cfg.with_source(1)).unwrap();
        assert_eq!(e.index, 1);
        assert_eq!(e.method_used, Method::ForwardPush);
        assert_abs_diff_eq!(e.value, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn csc_input_is_dispatched_through_csr() {
        let t = vec![
            (0, 0, 4.0),
            (0, 1, -1.0),
            (1, 0, -1.0),
            (1, 1, 4.0),
            (1, 2, -1.0),
            (2, 1, -1.0),
            (2, 2, 4.0),
        ];
        let csr = CsrMatrix::from_coo(3, 3, t).unwrap();
        let csc: Matrix = crate::matrix::CscMatrix::from_csr(&csr).into();
        let res = SolverEngine::new()
            .solve(&csc, &[3.0, 2.0, 3.0], &SolverConfig::new(Method::BackwardPush, 1e-8, 100))
            .unwrap();
        assert!(res.converged);
        assert!(res.selection.is_none());
    }
}

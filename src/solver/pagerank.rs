//! PageRank as a diagonally dominant linear system.
//!
//! With `P` the column-stochastic transition matrix (`P_ji = A_ij / out_i`),
//! the PageRank vector solves `(I − dP) x = p` up to scale. `I − dP` is
//! column dominant with margin `1 − d`, so the Jacobi/Neumann iteration
//! converges. Dangling nodes contribute empty columns; normalising `x` by
//! `‖x‖₁` afterwards is exactly the result of sending their mass along `p`.

use log::{debug, warn};

use crate::config::PageRankConfig;
use crate::core::traits::{MatShape, RowAccess};
use crate::error::SolverError;
use crate::matrix::CsrMatrix;
use crate::solver::{LinearSolver, NeumannSolver, SolveContext};

/// `I − dP` for the graph with weighted out-edges in the rows of `adjacency`.
fn google_system<M: RowAccess + ?Sized>(
    adjacency: &M,
    damping: f64,
) -> Result<CsrMatrix, SolverError> {
    let n = adjacency.nrows();
    let mut triplets = Vec::with_capacity(adjacency.nnz() + n);
    for i in 0..n {
        triplets.push((i, i, 1.0));
        let mut out = 0.0;
        for (j, w) in adjacency.row_entries(i) {
            if w < 0.0 {
                return Err(SolverError::MalformedInput(format!(
                    "negative edge weight {w} on ({i}, {j})"
                )));
            }
            out += w;
        }
        if out == 0.0 {
            continue;
        }
        for (j, w) in adjacency.row_entries(i) {
            if w != 0.0 {
                triplets.push((j, i, -damping * w / out));
            }
        }
    }
    CsrMatrix::from_coo(n, n, triplets)
}

/// PageRank of the graph whose row `i` lists the out-edges of node `i`.
/// Non-negative and summing to one.
pub fn page_rank<M: RowAccess + ?Sized>(
    adjacency: &M,
    config: &PageRankConfig,
    ctx: &mut SolveContext<'_>,
) -> Result<Vec<f64>, SolverError> {
    let n = adjacency.nrows();
    if n != adjacency.ncols() {
        return Err(SolverError::Shape(format!(
            "adjacency must be square, got {n}x{}",
            adjacency.ncols()
        )));
    }
    config.validate(n)?;
    if n == 0 {
        return Ok(Vec::new());
    }

    let teleport: Vec<f64> = match &config.personalization {
        Some(p) => {
            let mass: f64 = p.iter().sum();
            p.iter().map(|v| v / mass).collect()
        }
        None => vec![1.0 / n as f64; n],
    };
    let system = google_system(adjacency, config.damping_factor)?;
    ctx.monitor.track_bytes(system.memory_bytes());
    debug!("pagerank: n = {n}, nnz = {}, damping = {}", system.nnz(), config.damping_factor);

    // ρ(dP) ≤ d < 1: residual bumps are transient, never divergence.
    let mut solver = NeumannSolver::new(config.epsilon, config.max_iterations)
        .with_divergence(f64::INFINITY, usize::MAX);
    let stats = solver.solve(&system, &teleport, ctx)?;
    if !stats.converged() {
        warn!(
            "pagerank: stopped ({:?}) after {} iterations at residual {:e}",
            stats.reason, stats.iterations, stats.final_residual
        );
    }

    let mut rank = stats.solution;
    let total: f64 = rank.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return Ok(teleport);
    }
    rank.iter_mut().for_each(|v| *v /= total);
    Ok(rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DenseMatrix;
    use crate::utils::pool::VectorPool;
    use approx::assert_abs_diff_eq;

    /// Plain power iteration with dangling mass sent along `p`.
    fn power_iteration(adj: &[Vec<f64>], d: f64, p: &[f64]) -> Vec<f64> {
        let n = adj.len();
        let mut x = p.to_vec();
        for _ in 0..500 {
            let mut next: Vec<f64> = p.iter().map(|pi| (1.0 - d) * pi).collect();
            for i in 0..n {
                let out: f64 = adj[i].iter().sum();
                if out == 0.0 {
                    for j in 0..n {
                        next[j] += d * x[i] * p[j];
                    }
                } else {
                    for j in 0..n {
                        next[j] += d * x[i] * adj[i][j] / out;
                    }
                }
            }
            x = next;
        }
        x
    }

    #[test]
    fn cycle_is_uniform() {
        let adj =
            DenseMatrix::from_rows(&[[0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]]).unwrap();
        let pool = VectorPool::new();
        let mut ctx = SolveContext::new(&pool);
        let rank = page_rank(&adj, &PageRankConfig::default(), &mut ctx).unwrap();
        for r in rank {
            assert_abs_diff_eq!(r, 1.0 / 3.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn dangling_node_matches_power_iteration() {
        let rows = vec![vec![0.0, 1.0, 1.0], vec![0.0, 0.0, 1.0], vec![0.0, 0.0, 0.0]];
        let adj = DenseMatrix::from_rows(&rows).unwrap();
        let pool = VectorPool::new();
        let mut ctx = SolveContext::new(&pool);
        let rank = page_rank(&adj, &PageRankConfig::default(), &mut ctx).unwrap();
        let expected = power_iteration(&rows, 0.85, &[1.0 / 3.0; 3]);
        assert_abs_diff_eq!(rank.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        for (r, e) in rank.iter().zip(&expected) {
            assert_abs_diff_eq!(*r, *e, epsilon = 1e-8);
        }
    }

    #[test]
    fn personalization_shifts_mass() {
        let rows = vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 1.0], vec![0.0, 1.0, 0.0]];
        let adj = DenseMatrix::from_rows(&rows).unwrap();
        let p = vec![1.0, 0.0, 0.0];
        let config = PageRankConfig { personalization: Some(p.clone()), ..Default::default() };
        let pool = VectorPool::new();
        let mut ctx = SolveContext::new(&pool);
        let rank = page_rank(&adj, &config, &mut ctx).unwrap();
        let expected = power_iteration(&rows, 0.85, &p);
        for (r, e) in rank.iter().zip(&expected) {
            assert_abs_diff_eq!(*r, *e, epsilon = 1e-8);
        }
        assert!(rank[0] > rank[2]);
    }

    #[test]
    fn rejects_negative_weights() {
        let adj = DenseMatrix::from_rows(&[[0.0, -1.0], [1.0, 0.0]]).unwrap();
        let pool = VectorPool::new();
        let mut ctx = SolveContext::new(&pool);
        assert!(matches!(
            page_rank(&adj, &PageRankConfig::default(), &mut ctx),
            Err(SolverError::MalformedInput(_))
        ));
    }
}

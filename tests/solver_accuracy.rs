//! Accuracy of the solvers against faer direct solves and against each other.
//!
//! Random diagonally dominant systems are built as `M = R + diag(Σ|R_ij| + 1)`
//! with `R` uniform in `[-1, 1]`, so every row has a dominance margin.

use approx::assert_abs_diff_eq;
use faer::Mat;
use faer::linalg::solvers::SolveCore;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use sublin::{
    CsrMatrix, DenseMatrix, Matrix, Method, SolverConfig, SolverEngine, TerminationReason,
};

fn random_dominant(n: usize, rng: &mut StdRng) -> (Mat<f64>, Vec<f64>) {
    let mut data: Vec<f64> = (0..n * n).map(|_| rng.r#gen::<f64>() * 2.0 - 1.0).collect();
    for i in 0..n {
        data[i * n + i] = 0.0;
        let off: f64 = data[i * n..(i + 1) * n].iter().map(|v| v.abs()).sum();
        data[i * n + i] = off + 1.0;
    }
    let a = Mat::from_fn(n, n, |i, j| data[i * n + j]);
    let b: Vec<f64> = (0..n).map(|_| rng.r#gen::<f64>() * 2.0 - 1.0).collect();
    (a, b)
}

fn direct_solve(a: &Mat<f64>, b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x_direct = b.to_vec();
    let lus = faer::linalg::solvers::FullPivLu::new(a.as_ref());
    let x_mat = faer::MatMut::from_column_major_slice_mut(&mut x_direct, n, 1);
    lus.solve_in_place_with_conj(faer::Conj::No, x_mat);
    x_direct
}

fn tridiagonal(n: usize, diag: f64) -> CsrMatrix {
    let mut t = Vec::new();
    for i in 0..n {
        t.push((i, i, diag));
        if i + 1 < n {
            t.push((i, i + 1, -1.0));
            t.push((i + 1, i, -1.0));
        }
    }
    CsrMatrix::from_coo(n, n, t).unwrap()
}

#[test]
fn neumann_matches_direct_3x3() {
    let a = Mat::from_fn(3, 3, |i, j| [[5.0, 1.0, -2.0], [1.0, 6.0, 2.0], [-1.0, 2.0, 7.0]][i][j]);
    let b = vec![1.0, -2.0, 3.0];
    let x_direct = direct_solve(&a, &b);
    let m: Matrix = DenseMatrix::from(a).into();
    let res = SolverEngine::new()
        .solve(&m, &b, &SolverConfig::new(Method::Neumann, 1e-10, 1000))
        .unwrap();
    assert!(res.converged);
    assert!(res.residual < 1e-10);
    for i in 0..3 {
        assert_abs_diff_eq!(res.solution[i], x_direct[i], epsilon = 1e-9);
    }
}

#[test]
fn neumann_matches_direct_on_random_10x10() {
    let mut rng = StdRng::seed_from_u64(17);
    let engine = SolverEngine::new();
    for _ in 0..5 {
        let (a, b) = random_dominant(10, &mut rng);
        let x_direct = direct_solve(&a, &b);
        let m: Matrix = DenseMatrix::from(a).into();
        let res = engine.solve(&m, &b, &SolverConfig::new(Method::Neumann, 1e-10, 2000)).unwrap();
        assert!(res.converged, "stopped with {:?} at {}", res.reason, res.residual);
        for i in 0..10 {
            assert_abs_diff_eq!(res.solution[i], x_direct[i], epsilon = 1e-8);
        }
    }
    assert_eq!(engine.pool().stats().outstanding, 0);
}

#[test]
fn tridiagonal_scenario_with_every_deterministic_method() {
    let m: Matrix = DenseMatrix::from_rows(&[[4.0, -1.0, 0.0], [-1.0, 4.0, -1.0], [0.0, -1.0, 4.0]])
        .unwrap()
        .into();
    let b = [3.0, 2.0, 3.0];
    let engine = SolverEngine::new();
    for method in [Method::Auto, Method::Neumann, Method::ForwardPush, Method::BackwardPush] {
        let res = engine.solve(&m, &b, &SolverConfig::new(method, 1e-6, 1000)).unwrap();
        assert!(res.converged, "{method} did not converge");
        assert!(res.residual < 1e-6);
        for xi in &res.solution {
            assert_abs_diff_eq!(*xi, 1.0, epsilon = 1e-5);
        }
    }
}

#[test]
fn sampling_methods_reach_a_loose_tolerance() {
    let m: Matrix = tridiagonal(3, 4.0).into();
    let b = [3.0, 2.0, 3.0];
    let engine = SolverEngine::new();

    let cfg = SolverConfig::new(Method::RandomWalk, 0.1, 50_000).with_seed(7);
    let res = engine.solve(&m, &b, &cfg).unwrap();
    assert!(res.converged);
    for xi in &res.solution {
        assert_abs_diff_eq!(*xi, 1.0, epsilon = 0.05);
    }

    let cfg = SolverConfig::new(Method::Bidirectional, 1e-4, 5_000).with_seed(7);
    let res = engine.solve(&m, &b, &cfg).unwrap();
    assert_eq!(res.method_used, Method::Bidirectional);
    for xi in &res.solution {
        assert_abs_diff_eq!(*xi, 1.0, epsilon = 1e-2);
    }
}

#[test]
fn neumann_residual_is_monotone_on_symmetric_constant_diagonal() {
    // I − M/d is symmetric with spectral radius < 1, so ‖r‖₂ never grows.
    let m: Matrix = tridiagonal(50, 4.0).into();
    let b: Vec<f64> = (0..50).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
    let res = SolverEngine::new()
        .solve(&m, &b, &SolverConfig::new(Method::Neumann, 1e-12, 500))
        .unwrap();
    assert!(res.converged);
    for w in res.residual_history.windows(2) {
        assert!(w[1] <= w[0] * (1.0 + 1e-12), "{} -> {}", w[0], w[1]);
    }
}

#[test]
fn entry_queries_agree_with_full_solve() {
    let n = 200;
    let m: Matrix = tridiagonal(n, 3.0).into();
    let b: Vec<f64> = (0..n).map(|i| (i % 5) as f64).collect();
    let engine = SolverEngine::new();
    let full = engine.solve(&m, &b, &SolverConfig::new(Method::Neumann, 1e-12, 1000)).unwrap();

    let deterministic =
        [Method::Neumann, Method::ForwardPush, Method::BackwardPush, Method::Bidirectional];
    for method in deterministic {
        let cfg = SolverConfig::new(method, 1e-9, 1000).with_source(120).with_seed(1);
        let e = engine.solve_entry(&m, &b, &cfg).unwrap();
        assert_eq!(e.method_used, method);
        assert_abs_diff_eq!(e.value, full.solution[120], epsilon = 1e-7);
    }

    let cfg = SolverConfig::new(Method::RandomWalk, 0.02, 1000).with_source(120).with_seed(1);
    let e = engine.solve_entry(&m, &b, &cfg).unwrap();
    assert_abs_diff_eq!(e.value, full.solution[120], epsilon = 0.05);
}

#[test]
fn cancellation_stops_at_the_requested_iteration() {
    let m: Matrix = tridiagonal(50, 4.0).into();
    let b = vec![1.0; 50];
    let engine = SolverEngine::new();
    let mut calls = Vec::new();
    let res = engine
        .solve_with_progress(&m, &b, &SolverConfig::new(Method::Neumann, 1e-14, 1000), |p| {
            calls.push(p.iteration);
            p.iteration < 5
        })
        .unwrap();
    assert_eq!(res.reason, TerminationReason::Cancelled);
    assert!(!res.converged);
    assert_eq!(res.iterations, 5);
    assert_eq!(res.residual_history.len(), 5);
    assert_eq!(calls, vec![1, 2, 3, 4, 5]);
    assert_eq!(engine.pool().stats().outstanding, 0);
}

#[test]
fn progress_interval_thins_callbacks() {
    let m: Matrix = tridiagonal(20, 4.0).into();
    let b = vec![1.0; 20];
    let mut calls = 0usize;
    let cfg = SolverConfig::new(Method::Neumann, 1e-10, 1000).with_progress_interval(4);
    let res = SolverEngine::new()
        .solve_with_progress(&m, &b, &cfg, |p| {
            assert_eq!(p.iteration % 4, 0);
            calls += 1;
            true
        })
        .unwrap();
    assert!(res.converged);
    assert_eq!(calls, (res.iterations - 1) / 4);
}

#[test]
fn non_dominant_input_is_a_result_not_a_panic() {
    let m: Matrix = DenseMatrix::from_rows(&[[1.0, 3.0], [3.0, 1.0]]).unwrap().into();
    let res = SolverEngine::new()
        .solve(&m, &[1.0, 1.0], &SolverConfig::new(Method::Neumann, 1e-8, 100))
        .unwrap();
    assert!(!res.converged);
    assert_eq!(res.reason, TerminationReason::Diverged);
    assert!(res.solution.iter().all(|v| v.is_finite()));
}

fn non_dominant_3x3() -> Matrix {
    DenseMatrix::from_rows(&[[1.0, 3.0, 0.0], [3.0, 1.0, 3.0], [0.0, 3.0, 1.0]])
        .unwrap()
        .into()
}

#[test]
fn every_method_returns_its_best_iterate_when_it_fails() {
    let m = non_dominant_3x3();
    let b = [1.0; 3];
    let engine = SolverEngine::new();
    for method in [
        Method::Neumann,
        Method::RandomWalk,
        Method::ForwardPush,
        Method::BackwardPush,
        Method::Bidirectional,
    ] {
        let res = engine.solve(&m, &b, &SolverConfig::new(method, 1e-6, 200).with_seed(1)).unwrap();
        assert!(!res.converged, "{method}");
        assert!(!res.residual_history.is_empty(), "{method}");
        let best = res.residual_history.iter().copied().fold(f64::INFINITY, f64::min);
        // Push residuals are tracked incrementally, hence the slack.
        assert!(
            res.residual <= best * (1.0 + 1e-6),
            "{method}: returned residual {:e}, best seen {best:e}",
            res.residual
        );
        assert!(res.solution.iter().all(|v| v.is_finite()), "{method}");
    }
    assert_eq!(engine.pool().stats().outstanding, 0);
}

#[test]
fn random_walk_on_non_dominant_input_diverges() {
    let cfg = SolverConfig::new(Method::RandomWalk, 1e-6, 500).with_seed(1);
    let res = SolverEngine::new().solve(&non_dominant_3x3(), &[1.0; 3], &cfg).unwrap();
    assert_eq!(res.reason, TerminationReason::Diverged);
    assert!(res.iterations < 500);
}

#[test]
fn forward_push_on_non_dominant_input_stops_early() {
    let cfg = SolverConfig::new(Method::ForwardPush, 1e-6, 200);
    let res = SolverEngine::new().solve(&non_dominant_3x3(), &[1.0; 3], &cfg).unwrap();
    assert_eq!(res.reason, TerminationReason::Diverged);
    assert_eq!(res.iterations, 1);
}

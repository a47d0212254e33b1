use criterion::{black_box, Criterion, criterion_group, criterion_main};
use faer::Mat;
use faer::linalg::solvers::SolveCore;
use sublin::{CsrMatrix, DenseMatrix, Matrix, Method, SolverConfig, SolverEngine};

fn path_system(n: usize) -> (CsrMatrix, Vec<f64>) {
    let mut t = Vec::with_capacity(3 * n);
    for i in 0..n {
        t.push((i, i, 4.0));
        if i + 1 < n {
            t.push((i, i + 1, -1.0));
            t.push((i + 1, i, -1.0));
        }
    }
    let b: Vec<f64> = (0..n).map(|i| (i as f64).cos()).collect();
    (CsrMatrix::from_coo(n, n, t).unwrap(), b)
}

fn bench_full_solves(c: &mut Criterion) {
    let (a, b) = path_system(2_000);
    let m: Matrix = a.into();
    let engine = SolverEngine::new();

    for method in [Method::Neumann, Method::BackwardPush, Method::ForwardPush] {
        let cfg = SolverConfig::new(method, 1e-8, 1_000);
        c.bench_function(&format!("sublin {method} n=2000"), |ben| {
            ben.iter(|| engine.solve(black_box(&m), black_box(&b), &cfg).unwrap())
        });
    }
}

fn bench_single_entry(c: &mut Criterion) {
    let (a, b) = path_system(200_000);
    let m: Matrix = a.into();
    let engine = SolverEngine::new();
    let push = SolverConfig::new(Method::ForwardPush, 1e-6, 1_000).with_source(100_000);
    let walk = SolverConfig::new(Method::RandomWalk, 0.05, 1_000).with_source(100_000).with_seed(1);

    c.bench_function("sublin forward-push entry n=200000", |ben| {
        ben.iter(|| engine.solve_entry(black_box(&m), black_box(&b), &push).unwrap())
    });
    c.bench_function("sublin random-walk estimate n=200000", |ben| {
        ben.iter(|| engine.estimate_entry(black_box(&m), black_box(&b), &walk).unwrap())
    });
}

fn bench_neumann_vs_faer(c: &mut Criterion) {
    let n = 200;
    let data: Vec<f64> = (0..n * n).map(|i| (i as f64).sin() / n as f64).collect();
    let a = Mat::from_fn(n, n, |i, j| if i == j { 2.0 } else { data[j * n + i] });
    let b: Vec<f64> = (0..n).map(|i| (i as f64).cos()).collect();
    let m: Matrix = DenseMatrix::from(a.clone()).into();
    let engine = SolverEngine::new();
    let cfg = SolverConfig::new(Method::Neumann, 1e-10, 1_000);

    c.bench_function("sublin neumann dense n=200", |ben| {
        ben.iter(|| engine.solve(black_box(&m), black_box(&b), &cfg).unwrap())
    });

    c.bench_function("faer raw LU n=200", |ben| {
        ben.iter(|| {
            let factor = faer::linalg::solvers::FullPivLu::new(a.as_ref());
            let mut y = b.clone();
            let n = y.len();
            let y_mat = faer::MatMut::from_column_major_slice_mut(&mut y, n, 1);
            factor.solve_in_place_with_conj(faer::Conj::No, y_mat);
        })
    });
}

criterion_group!(benches, bench_full_solves, bench_single_entry, bench_neumann_vs_faer);
criterion_main!(benches);

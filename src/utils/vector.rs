//! Dense vector kernels used inside the iteration loops.
//!
//! All kernels are generic over `num_traits::Float` and work on slices, so
//! pooled scratch buffers and caller-owned vectors go through the same code.
//! With the `rayon` feature enabled, `vector_dot` and `vector_norm2` reduce in
//! parallel.
//!
//! Length mismatches are caller bugs and panic.

use num_traits::{Float, NumCast};

/// `out = x + y`.
pub fn vector_add<T: Float>(x: &[T], y: &[T], out: &mut [T]) {
    assert_eq!(x.len(), y.len(), "Vectors must have the same length");
    assert_eq!(x.len(), out.len(), "Output vector has incorrect length");
    for ((o, &a), &b) in out.iter_mut().zip(x).zip(y) {
        *o = a + b;
    }
}

/// `out = x - y`.
pub fn vector_sub<T: Float>(x: &[T], y: &[T], out: &mut [T]) {
    assert_eq!(x.len(), y.len(), "Vectors must have the same length");
    assert_eq!(x.len(), out.len(), "Output vector has incorrect length");
    for ((o, &a), &b) in out.iter_mut().zip(x).zip(y) {
        *o = a - b;
    }
}

/// `x ← alpha · x`.
pub fn vector_scale<T: Float>(alpha: T, x: &mut [T]) {
    for xi in x.iter_mut() {
        *xi = *xi * alpha;
    }
}

/// `y ← y + alpha · x`.
pub fn vector_axpy<T: Float>(alpha: T, x: &[T], y: &mut [T]) {
    assert_eq!(x.len(), y.len(), "Vectors must have the same length");
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = *yi + alpha * xi;
    }
}

/// Dot product `xᵀ y`.
pub fn vector_dot<T: Float + Send + Sync>(x: &[T], y: &[T]) -> T {
    assert_eq!(x.len(), y.len(), "Vectors must have the same length");
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        x.par_iter()
            .zip(y.par_iter())
            .map(|(xi, yi)| *xi * *yi)
            .reduce(|| T::zero(), |acc, v| acc + v)
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter()
            .zip(y.iter())
            .map(|(xi, yi)| *xi * *yi)
            .fold(T::zero(), |acc, v| acc + v)
    }
}

/// Euclidean norm `‖x‖₂`.
pub fn vector_norm2<T: Float + Send + Sync>(x: &[T]) -> T {
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        x.par_iter()
            .map(|xi| *xi * *xi)
            .reduce(|| T::zero(), |acc, v| acc + v)
            .sqrt()
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter()
            .map(|xi| *xi * *xi)
            .fold(T::zero(), |acc, v| acc + v)
            .sqrt()
    }
}

/// `‖x‖₁`.
pub fn vector_norm1<T: Float>(x: &[T]) -> T {
    x.iter().fold(T::zero(), |acc, v| acc + v.abs())
}

/// `‖x‖∞`.
pub fn vector_norm_inf<T: Float>(x: &[T]) -> T {
    x.iter().fold(T::zero(), |acc, v| acc.max(v.abs()))
}

/// Rounds every entry through the narrower float type `F` and back, which
/// emulates storing the vector in `F`.
pub fn round_through<F: Float, T: Float>(x: &mut [T]) {
    for xi in x.iter_mut() {
        let narrowed: Option<F> = NumCast::from(*xi);
        if let Some(back) = narrowed.and_then(|v| <T as NumCast>::from(v)) {
            *xi = back;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn add_sub_scale_axpy() {
        let x = [1.0, 2.0, 3.0];
        let y = [4.0, -5.0, 6.0];
        let mut out = [0.0; 3];
        vector_add(&x, &y, &mut out);
        assert_eq!(out, [5.0, -3.0, 9.0]);
        vector_sub(&x, &y, &mut out);
        assert_eq!(out, [-3.0, 7.0, -3.0]);
        vector_scale(2.0, &mut out);
        assert_eq!(out, [-6.0, 14.0, -6.0]);
        vector_axpy(0.5, &x, &mut out);
        assert_eq!(out, [-5.5, 15.0, -4.5]);
    }

    #[test]
    fn dot_and_norms() {
        let x = vec![1.0, 2.0, 3.0];
        let y = vec![4.0, -5.0, 6.0];
        assert_abs_diff_eq!(vector_dot(&x, &y), 12.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vector_norm2(&x), 14.0f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(vector_norm1(&y), 15.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vector_norm_inf(&y), 6.0, epsilon = 1e-12);
        assert_eq!(vector_norm2::<f64>(&[]), 0.0);
    }

    #[test]
    fn rounding_through_f32_loses_low_bits() {
        let mut x = vec![1.0 + 1e-12, 0.1];
        round_through::<f32, f64>(&mut x);
        assert_eq!(x[0], 1.0);
        assert_eq!(x[1], 0.1f32 as f64);
    }

    #[test]
    #[should_panic]
    fn length_mismatch_panics() {
        let mut out = [0.0; 2];
        vector_add(&[1.0, 2.0], &[1.0], &mut out);
    }
}

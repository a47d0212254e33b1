//! Size-bucketed free list for per-solve scratch vectors.
//!
//! [`VectorPool::acquire`] hands out a [`PooledVector`] guard. The guard
//! returns its buffer to the pool when dropped, so early returns and `?`
//! propagation never leak a checked-out vector. [`PooledVector::detach`]
//! keeps the buffer instead (used for the solution that leaves the solver).
//!
//! The pool uses `RefCell` and is therefore `!Sync`: concurrent solves each
//! need their own pool.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use crate::error::SolverError;

const F64_BYTES: usize = std::mem::size_of::<f64>();

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub outstanding: usize,
    pub allocations: usize,
    pub reuses: usize,
    pub outstanding_bytes: usize,
    pub peak_bytes: usize,
}

#[derive(Default)]
struct PoolState {
    // Keyed by capacity bucket (next power of two).
    free: BTreeMap<usize, Vec<Vec<f64>>>,
    stats: PoolStats,
}

#[derive(Default)]
pub struct VectorPool {
    state: RefCell<PoolState>,
    max_outstanding: Option<usize>,
}

impl VectorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool that refuses to hand out more than `limit` buffers at once.
    pub fn with_limit(limit: usize) -> Self {
        Self { state: RefCell::default(), max_outstanding: Some(limit) }
    }

    /// Check out a zero-filled vector of length `len`.
    pub fn acquire(&self, len: usize) -> Result<PooledVector<'_>, SolverError> {
        let mut state = self.state.borrow_mut();
        if let Some(limit) = self.max_outstanding {
            if state.stats.outstanding >= limit {
                return Err(SolverError::PoolExhausted {
                    outstanding: state.stats.outstanding,
                    limit,
                });
            }
        }

        let bucket = len.max(1).next_power_of_two();
        let recycled = state.free.get_mut(&bucket).and_then(Vec::pop);
        let mut buf = match recycled {
            Some(buf) => {
                state.stats.reuses += 1;
                buf
            }
            None => {
                state.stats.allocations += 1;
                Vec::with_capacity(bucket)
            }
        };
        buf.clear();
        buf.resize(len, 0.0);

        let stats = &mut state.stats;
        stats.outstanding += 1;
        stats.outstanding_bytes += buf.capacity() * F64_BYTES;
        stats.peak_bytes = stats.peak_bytes.max(stats.outstanding_bytes);

        Ok(PooledVector { buf, pool: self, detached: false })
    }

    /// Check out a vector initialised from `values`.
    pub fn acquire_from(&self, values: &[f64]) -> Result<PooledVector<'_>, SolverError> {
        let mut v = self.acquire(values.len())?;
        v.copy_from_slice(values);
        Ok(v)
    }

    pub fn stats(&self) -> PoolStats {
        self.state.borrow().stats
    }

    /// Restart peak tracking at the current outstanding footprint.
    pub fn reset_peak(&self) {
        let mut state = self.state.borrow_mut();
        state.stats.peak_bytes = state.stats.outstanding_bytes;
    }

    /// Drop every cached free buffer.
    pub fn clear(&self) {
        self.state.borrow_mut().free.clear();
    }

    fn release(&self, buf: Vec<f64>) {
        let mut state = self.state.borrow_mut();
        let cap = buf.capacity();
        state.stats.outstanding = state.stats.outstanding.saturating_sub(1);
        state.stats.outstanding_bytes =
            state.stats.outstanding_bytes.saturating_sub(cap * F64_BYTES);
        // File under the largest power of two the capacity can serve.
        let bucket = if cap.is_power_of_two() { cap } else { cap.next_power_of_two() / 2 };
        state.free.entry(bucket.max(1)).or_default().push(buf);
    }

    fn detached(&self, capacity: usize) {
        let mut state = self.state.borrow_mut();
        state.stats.outstanding = state.stats.outstanding.saturating_sub(1);
        state.stats.outstanding_bytes =
            state.stats.outstanding_bytes.saturating_sub(capacity * F64_BYTES);
    }
}

/// A checked-out vector. Dereferences to `Vec<f64>`.
pub struct PooledVector<'p> {
    buf: Vec<f64>,
    pool: &'p VectorPool,
    detached: bool,
}

impl PooledVector<'_> {
    /// Take ownership of the buffer; it is not returned to the pool.
    pub fn detach(mut self) -> Vec<f64> {
        self.detached = true;
        let buf = std::mem::take(&mut self.buf);
        self.pool.detached(buf.capacity());
        buf
    }
}

impl Deref for PooledVector<'_> {
    type Target = Vec<f64>;

    fn deref(&self) -> &Vec<f64> {
        &self.buf
    }
}

impl DerefMut for PooledVector<'_> {
    fn deref_mut(&mut self) -> &mut Vec<f64> {
        &mut self.buf
    }
}

impl Drop for PooledVector<'_> {
    fn drop(&mut self) {
        if !self.detached {
            self.pool.release(std::mem::take(&mut self.buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_zeroed_and_reused() {
        let pool = VectorPool::new();
        {
            let mut v = pool.acquire(5).unwrap();
            v[2] = 7.0;
        }
        let v = pool.acquire(5).unwrap();
        assert_eq!(&v[..], &[0.0; 5]);
        let s = pool.stats();
        assert_eq!(s.allocations, 1);
        assert_eq!(s.reuses, 1);
        assert_eq!(s.outstanding, 1);
    }

    #[test]
    fn buckets_serve_smaller_requests() {
        let pool = VectorPool::new();
        drop(pool.acquire(100).unwrap()); // bucket 128
        let v = pool.acquire(70).unwrap(); // also bucket 128
        assert_eq!(v.len(), 70);
        assert_eq!(pool.stats().reuses, 1);
    }

    #[test]
    fn released_on_error_path() {
        fn fallible(pool: &VectorPool) -> Result<f64, SolverError> {
            let a = pool.acquire(8)?;
            let _b = pool.acquire(8)?;
            Err(SolverError::MalformedInput(format!("bad value {}", a[0])))
        }
        let pool = VectorPool::new();
        assert!(fallible(&pool).is_err());
        let s = pool.stats();
        assert_eq!(s.outstanding, 0);
        assert_eq!(s.outstanding_bytes, 0);
    }

    #[test]
    fn limit_is_enforced() {
        let pool = VectorPool::with_limit(2);
        let _a = pool.acquire(4).unwrap();
        let _b = pool.acquire(4).unwrap();
        let err = pool.acquire(4).err().unwrap();
        assert_eq!(err, SolverError::PoolExhausted { outstanding: 2, limit: 2 });
    }

    #[test]
    fn detach_keeps_buffer_and_clears_accounting() {
        let pool = VectorPool::new();
        let v = pool.acquire_from(&[1.0, 2.0]).unwrap();
        let owned = v.detach();
        assert_eq!(owned, vec![1.0, 2.0]);
        let s = pool.stats();
        assert_eq!(s.outstanding, 0);
        assert_eq!(s.outstanding_bytes, 0);
        assert!(s.peak_bytes >= 2 * F64_BYTES);
    }
}

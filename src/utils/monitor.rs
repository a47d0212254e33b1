//! Per-solve performance accounting.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Read-only snapshot attached to every result.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub iterations: usize,
    pub elapsed_ms: f64,
    pub peak_memory_estimate_bytes: usize,
}

/// Accumulates iterations, wall time and a memory estimate across one call.
///
/// Memory is an estimate, not a measurement: the matrix footprint plus
/// whatever the algorithms report through [`track_bytes`](Self::track_bytes).
#[derive(Debug)]
pub struct PerformanceMonitor {
    start: Instant,
    iterations: usize,
    current_bytes: usize,
    peak_bytes: usize,
}

impl PerformanceMonitor {
    pub fn start() -> Self {
        Self { start: Instant::now(), iterations: 0, current_bytes: 0, peak_bytes: 0 }
    }

    pub fn record_iteration(&mut self) {
        self.iterations += 1;
    }

    pub fn set_iterations(&mut self, iterations: usize) {
        self.iterations = iterations;
    }

    pub fn track_bytes(&mut self, bytes: usize) {
        self.current_bytes = self.current_bytes.saturating_add(bytes);
        self.peak_bytes = self.peak_bytes.max(self.current_bytes);
    }

    pub fn release_bytes(&mut self, bytes: usize) {
        self.current_bytes = self.current_bytes.saturating_sub(bytes);
    }

    /// Folds in a peak observed elsewhere (e.g. the vector pool), on top of
    /// what is currently tracked.
    pub fn observe_peak(&mut self, bytes: usize) {
        self.peak_bytes = self.peak_bytes.max(self.current_bytes.saturating_add(bytes));
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1e3
    }

    pub fn snapshot(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            iterations: self.iterations,
            elapsed_ms: self.elapsed_ms(),
            peak_memory_estimate_bytes: self.peak_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_peak_not_current() {
        let mut m = PerformanceMonitor::start();
        m.track_bytes(100);
        m.track_bytes(50);
        m.release_bytes(120);
        m.track_bytes(10);
        m.observe_peak(20);
        m.record_iteration();
        m.record_iteration();
        let s = m.snapshot();
        assert_eq!(s.peak_memory_estimate_bytes, 150);
        assert_eq!(s.iterations, 2);
        assert!(s.elapsed_ms >= 0.0);
    }
}

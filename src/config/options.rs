//! Solver options.
//!
//! [`SolverConfig`] is what callers hand to [`SolverEngine`](crate::context::SolverEngine)
//! alongside the matrix and right-hand side. Every field has a default, so a
//! config can be built with struct-update syntax, the `with_*` builders, or
//! deserialized from the camelCase JSON an RPC layer would send.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SolverError;

/// Solution strategy. `Auto` is resolved to a concrete method once, at the
/// start of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    #[default]
    Auto,
    Neumann,
    ForwardPush,
    BackwardPush,
    RandomWalk,
    Bidirectional,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Auto => "auto",
            Method::Neumann => "neumann",
            Method::ForwardPush => "forward-push",
            Method::BackwardPush => "backward-push",
            Method::RandomWalk => "random-walk",
            Method::Bidirectional => "bidirectional",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Method::Auto),
            "neumann" => Ok(Method::Neumann),
            "forward-push" | "forward_push" => Ok(Method::ForwardPush),
            "backward-push" | "backward_push" => Ok(Method::BackwardPush),
            "random-walk" | "random_walk" => Ok(Method::RandomWalk),
            "bidirectional" => Ok(Method::Bidirectional),
            other => Err(SolverError::Configuration(format!("unknown method '{other}'"))),
        }
    }
}

/// Arithmetic precision of the iterates.
///
/// `Single` rounds every iterate through `f32`; `Adaptive` does so until the
/// residual falls under the `f32` noise floor, then continues in `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precision {
    Single,
    #[default]
    Double,
    Adaptive,
}

impl FromStr for Precision {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Precision::Single),
            "double" => Ok(Precision::Double),
            "adaptive" => Ok(Precision::Adaptive),
            other => Err(SolverError::Configuration(format!("unknown precision '{other}'"))),
        }
    }
}

/// Options for `solve`, `solve_entry` and `estimate_entry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SolverConfig {
    /// Which algorithm to run.
    pub method: Method,
    /// Target precision. Absolute bound on `‖b - Mx‖₂` for solves, additive
    /// half-width for the confidence of entry estimates.
    pub epsilon: f64,
    /// Iteration cap. For sampling methods an iteration is one round of walks.
    pub max_iterations: usize,
    pub precision: Precision,
    /// Row of the solution being queried, for single-entry work.
    pub source_index: Option<usize>,
    /// Restricts an entry estimate to the contribution of `b[target]`.
    pub target_index: Option<usize>,
    /// Walks per estimate. Derived from `epsilon` when unset.
    pub sample_count: Option<usize>,
    /// RNG seed for the sampling methods; entropy-seeded when unset.
    pub seed: Option<u64>,
    /// The progress callback fires every `progress_interval` iterations.
    pub progress_interval: usize,
    /// Residual growth, relative to the first residual, that counts towards divergence.
    pub divergence_factor: f64,
    /// Consecutive growing iterations above `divergence_factor` before giving up.
    pub divergence_patience: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: Method::Auto,
            epsilon: 1e-6,
            max_iterations: 1000,
            precision: Precision::Double,
            source_index: None,
            target_index: None,
            sample_count: None,
            seed: None,
            progress_interval: 1,
            divergence_factor: 10.0,
            divergence_patience: 3,
        }
    }
}

impl SolverConfig {
    pub fn new(method: Method, epsilon: f64, max_iterations: usize) -> Self {
        Self { method, epsilon, max_iterations, ..Self::default() }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_source(mut self, source: usize) -> Self {
        self.source_index = Some(source);
        self
    }

    pub fn with_target(mut self, target: usize) -> Self {
        self.target_index = Some(target);
        self
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.sample_count = Some(samples);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_divergence(mut self, factor: f64, patience: usize) -> Self {
        self.divergence_factor = factor;
        self.divergence_patience = patience;
        self
    }

    /// Checks everything that can be checked without looking at a matrix.
    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(SolverError::Configuration(format!(
                "epsilon must be finite and > 0, got {}",
                self.epsilon
            )));
        }
        if self.max_iterations == 0 {
            return Err(SolverError::Configuration("maxIterations must be > 0".into()));
        }
        if self.progress_interval == 0 {
            return Err(SolverError::Configuration("progressInterval must be > 0".into()));
        }
        if self.sample_count == Some(0) {
            return Err(SolverError::Configuration("sampleCount must be > 0".into()));
        }
        if !(self.divergence_factor > 1.0) {
            return Err(SolverError::Configuration(format!(
                "divergenceFactor must be > 1, got {}",
                self.divergence_factor
            )));
        }
        if self.divergence_patience == 0 {
            return Err(SolverError::Configuration("divergencePatience must be > 0".into()));
        }
        Ok(())
    }

    /// Index checks that need the system dimension.
    pub(crate) fn validate_indices(&self, n: usize) -> Result<(), SolverError> {
        let indices = [("sourceIndex", self.source_index), ("targetIndex", self.target_index)];
        for (name, idx) in indices {
            if let Some(i) = idx {
                if i >= n {
                    return Err(SolverError::Configuration(format!(
                        "{name} {i} out of range for a system of dimension {n}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Options for [`compute_page_rank`](crate::context::SolverEngine::compute_page_rank).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageRankConfig {
    pub damping_factor: f64,
    pub epsilon: f64,
    pub max_iterations: usize,
    /// Teleport distribution; uniform when unset. Dangling nodes follow it too.
    pub personalization: Option<Vec<f64>>,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self { damping_factor: 0.85, epsilon: 1e-10, max_iterations: 1000, personalization: None }
    }
}

impl PageRankConfig {
    pub fn validate(&self, n: usize) -> Result<(), SolverError> {
        if !(self.damping_factor > 0.0 && self.damping_factor < 1.0) {
            return Err(SolverError::Configuration(format!(
                "dampingFactor must lie in (0, 1), got {}",
                self.damping_factor
            )));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(SolverError::Configuration(format!(
                "epsilon must be finite and > 0, got {}",
                self.epsilon
            )));
        }
        if self.max_iterations == 0 {
            return Err(SolverError::Configuration("maxIterations must be > 0".into()));
        }
        if let Some(p) = &self.personalization {
            if p.len() != n {
                return Err(SolverError::Shape(format!(
                    "personalization has length {}, graph has {n} nodes",
                    p.len()
                )));
            }
            if p.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(SolverError::Configuration(
                    "personalization entries must be finite and non-negative".into(),
                ));
            }
            if p.iter().sum::<f64>() <= 0.0 {
                return Err(SolverError::Configuration(
                    "personalization must have positive mass".into(),
                ));
            }
        }
        Ok(())
    }
}

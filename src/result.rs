//! Values returned to callers. All of them serialize to camelCase JSON.

use serde::{Deserialize, Serialize};

use crate::config::Method;
use crate::context::selection::SelectionDecision;
use crate::utils::convergence::TerminationReason;
use crate::utils::monitor::PerformanceMetrics;

/// Handed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub iteration: usize,
    pub residual: f64,
}

/// Outcome of a full solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverResult {
    pub solution: Vec<f64>,
    /// `true` iff `residual < epsilon`.
    pub converged: bool,
    pub iterations: usize,
    /// `‖b − Mx‖₂` of the returned solution.
    pub residual: f64,
    pub elapsed_ms: f64,
    pub method_used: Method,
    pub reason: TerminationReason,
    pub residual_history: Vec<f64>,
    pub metrics: PerformanceMetrics,
    /// Present when the method was chosen automatically.
    #[serde(skip)]
    pub selection: Option<SelectionDecision>,
}

/// Monte Carlo estimate of one solution entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationResult {
    pub estimate: f64,
    /// Sample variance of a single walk's contribution.
    pub variance: f64,
    /// Probability that `|estimate − truth| < epsilon`, from a sub-Gaussian bound.
    pub confidence: f64,
    pub samples: usize,
    pub std_error: f64,
}

/// Value of one solution entry `x_index`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResult {
    pub index: usize,
    pub value: f64,
    pub method_used: Method,
    pub iterations: usize,
    pub elapsed_ms: f64,
    /// Error indicator of the method: residual norm for Neumann, leftover
    /// push mass for the push methods, standard error for random walks.
    pub residual_mass: f64,
}

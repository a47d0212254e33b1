//! Convergence tracking & tolerance checks for iterative solvers.

use serde::{Deserialize, Serialize};

/// Relative-step criterion falls back to an absolute one below this `‖x‖`.
const TINY_NORM: f64 = 1e-300;

/// State of a [`ConvergenceChecker`]. Everything but `Continue` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceState {
    Continue,
    Converged,
    Diverged,
    MaxIterReached,
}

impl ConvergenceState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ConvergenceState::Continue)
    }
}

/// Why an iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    Converged,
    Diverged,
    MaxIterations,
    Cancelled,
}

impl From<ConvergenceState> for TerminationReason {
    fn from(state: ConvergenceState) -> Self {
        match state {
            ConvergenceState::Converged => TerminationReason::Converged,
            ConvergenceState::Diverged => TerminationReason::Diverged,
            // A checker that never reached a terminal state ran out of budget.
            ConvergenceState::MaxIterReached | ConvergenceState::Continue => {
                TerminationReason::MaxIterations
            }
        }
    }
}

/// How growth toward divergence is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrowthRule {
    /// The residual grew since the last observation while above `factor × initial`.
    #[default]
    Increasing,
    /// The residual stayed above `factor × initial`, however it moved in between.
    /// For sampled estimates whose residual is noisy from round to round.
    Sustained,
}

/// Norms of the last update, for the relative-step criterion.
///
/// None of the built-in solvers feed this: their results are judged on the
/// absolute residual, and a small step alone says nothing about `‖b − Mx‖`.
#[derive(Debug, Clone, Copy)]
pub struct StepNorms {
    pub delta: f64,
    pub solution: f64,
}

/// Stopping criteria & divergence detection.
///
/// Each call to [`observe`](Self::observe) counts as one iteration.
#[derive(Debug, Clone)]
pub struct ConvergenceChecker {
    pub tol: f64,
    pub max_iters: usize,
    pub divergence_factor: f64,
    pub divergence_patience: usize,
    pub growth_rule: GrowthRule,
    iteration: usize,
    initial: Option<f64>,
    last: f64,
    growth_streak: usize,
    state: ConvergenceState,
}

impl ConvergenceChecker {
    pub fn new(tol: f64, max_iters: usize) -> Self {
        Self {
            tol,
            max_iters,
            divergence_factor: 10.0,
            divergence_patience: 3,
            growth_rule: GrowthRule::Increasing,
            iteration: 0,
            initial: None,
            last: f64::INFINITY,
            growth_streak: 0,
            state: ConvergenceState::Continue,
        }
    }

    pub fn with_divergence(mut self, factor: f64, patience: usize) -> Self {
        self.divergence_factor = factor;
        self.divergence_patience = patience.max(1);
        self
    }

    pub fn with_growth_rule(mut self, rule: GrowthRule) -> Self {
        self.growth_rule = rule;
        self
    }

    pub fn iterations(&self) -> usize {
        self.iteration
    }

    pub fn state(&self) -> ConvergenceState {
        self.state
    }

    /// Feed one iteration's residual norm (and optionally the step norms).
    pub fn observe(&mut self, residual: f64, step: Option<StepNorms>) -> ConvergenceState {
        if self.state.is_terminal() {
            return self.state;
        }
        self.iteration += 1;

        if !residual.is_finite() {
            self.state = ConvergenceState::Diverged;
            return self.state;
        }

        let step_converged = step.is_some_and(|s| {
            if s.solution > TINY_NORM {
                s.delta / s.solution < self.tol
            } else {
                s.delta < self.tol
            }
        });
        if residual < self.tol || step_converged {
            self.state = ConvergenceState::Converged;
            return self.state;
        }

        let initial = *self.initial.get_or_insert(residual);
        let grew = match self.growth_rule {
            GrowthRule::Increasing => residual > self.last,
            GrowthRule::Sustained => true,
        };
        if grew && residual > self.divergence_factor * initial {
            self.growth_streak += 1;
        } else {
            self.growth_streak = 0;
        }
        self.last = residual;
        if self.growth_streak >= self.divergence_patience {
            self.state = ConvergenceState::Diverged;
            return self.state;
        }

        if self.iteration >= self.max_iters {
            self.state = ConvergenceState::MaxIterReached;
        }
        self.state
    }
}

/// Raw outcome of one algorithm run, before the engine wraps it.
#[derive(Clone, Debug)]
pub struct SolveStats {
    pub solution: Vec<f64>,
    pub iterations: usize,
    pub final_residual: f64,
    pub reason: TerminationReason,
    pub history: Vec<f64>,
}

impl SolveStats {
    pub fn converged(&self) -> bool {
        self.reason == TerminationReason::Converged
    }
}

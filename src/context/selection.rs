//! Automatic method selection.
//!
//! The decision depends only on the [`MatrixProfile`] and on whether a single
//! entry is being asked for, so the same matrix always gets the same method.

use log::debug;

use crate::config::Method;
use crate::utils::analysis::MatrixProfile;

/// Thresholds for [`SelectionPolicy::select`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionPolicy {
    /// Systems with at most this many rows go to Neumann.
    pub small_system: usize,
    /// Matrices at least this dense go to Neumann.
    pub dense_threshold: f64,
    /// Dominance margin above which the local methods are trusted.
    pub margin_threshold: f64,
    /// Systems with at least this many rows go to the bidirectional method.
    pub large_system: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            small_system: 1000,
            dense_threshold: 0.05,
            margin_threshold: 0.05,
            large_system: 100_000,
        }
    }
}

/// What was picked, and by which rule.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionDecision {
    pub method: Method,
    pub rule: &'static str,
    pub profile: MatrixProfile,
}

impl SelectionPolicy {
    pub fn select(&self, profile: &MatrixProfile, single_entry: bool) -> SelectionDecision {
        let (method, rule) = if profile.rows <= self.small_system {
            (Method::Neumann, "small-system")
        } else if profile.density >= self.dense_threshold {
            (Method::Neumann, "dense")
        } else if single_entry && profile.dominance_margin > self.margin_threshold {
            (Method::ForwardPush, "single-entry")
        } else if profile.dominance_margin <= self.margin_threshold {
            (Method::Neumann, "weak-dominance")
        } else if profile.rows >= self.large_system {
            (Method::Bidirectional, "large-system")
        } else {
            (Method::RandomWalk, "sparse-dominant")
        };
        debug!(
            "auto: {method} by rule '{rule}' (n = {}, density {:.3e}, margin {:.3})",
            profile.rows, profile.density, profile.dominance_margin
        );
        SelectionDecision { method, rule, profile: profile.clone() }
    }
}

//! Request handling: validation, method selection and dispatch.
//!
//! - [`engine`]: [`SolverEngine`], the per-thread entry point.
//! - [`selection`]: [`SelectionPolicy`], the deterministic rules behind `Method::Auto`.

pub mod engine;
pub mod selection;

pub use engine::SolverEngine;
pub use selection::{SelectionDecision, SelectionPolicy};

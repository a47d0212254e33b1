use thiserror::Error;

// Unified error type for sublin. Divergence is not an error: it is reported
// through `SolverResult::converged` and `SolverResult::reason`.

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("vector pool exhausted: {outstanding} buffers checked out (limit {limit})")]
    PoolExhausted { outstanding: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, SolverError>;

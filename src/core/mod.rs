//! Core traits shared by every matrix format and solver.

pub mod traits;
pub use traits::{LinearOperator, MatShape, MatTransVec, MatVec, MatrixGet, RowAccess};

//! Foundation layer: shared primitives grouped for the layered architecture.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;

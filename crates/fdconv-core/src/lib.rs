//! fdconv-core: shared error taxonomy for the fdconv workspace.
//!
//! This crate provides the foundational error type used across the
//! partitioned convolution engine and its CPU/GPU back ends.

mod error;

pub use error::*;

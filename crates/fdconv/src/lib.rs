//! fdconv: uniformly partitioned frequency-domain convolution engine.
//!
//! Convolves multichannel signals against long FIR filters, block by block,
//! using overlap-save FFT partitioning. See [`convolution::Engine`] for the
//! entry point.
//!
//! ## Modules
//! - `convolution` - partitioner, framer, FDL, MAC back ends, reconstructor, and the engine driver

#![allow(unexpected_cfgs)]

pub mod convolution;

pub use convolution::{Device, Engine, EngineConfig};
pub use fdconv_core::{ConvolutionError, ConvolutionResult};

/// Trait for all DSP processors in this workspace.
pub trait Processor: Send + Sync {
    /// Reset processor state.
    fn reset(&mut self);

    /// Get latency in samples.
    fn latency(&self) -> usize {
        0
    }
}

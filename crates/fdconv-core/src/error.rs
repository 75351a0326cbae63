//! Shared error taxonomy for the partitioned convolution engine.

use thiserror::Error;

/// Fatal, synchronously-detected error raised by construction or `convolve`.
///
/// Every variant is raised before any state mutation: a rejected call leaves
/// the engine exactly as it was before the call (see the engine driver's
/// ordering guarantee).
#[derive(Error, Debug)]
pub enum ConvolutionError {
    #[error("filter must be C x FL with every channel the same length, got ragged row {index} (expected length {expected}, got {actual})")]
    InvalidFilterShape {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("filter length {filter_length} must be >= block length {block_length}")]
    FilterTooShort {
        filter_length: usize,
        block_length: usize,
    },

    #[error("block length must be >= 1, got {0}")]
    InvalidBlockLength(usize),

    #[error("fft size {fft_size} must be even and >= 2 * block length ({min_fft_size})")]
    InvalidFftSize { fft_size: usize, min_fft_size: usize },

    #[error("num_input_channels must be 1 or {num_filter_channels} (the filter channel count), got {got}")]
    InvalidChannelCount {
        num_filter_channels: usize,
        got: usize,
    },

    #[error("channel count must be >= 1, got {0}")]
    InvalidChannels(usize),

    #[error("convolve() input must have shape {expected_channels} x {expected_block}, got {actual_channels} x {actual_block}")]
    InvalidInputShape {
        expected_channels: usize,
        expected_block: usize,
        actual_channels: usize,
        actual_block: usize,
    },

    #[error("no compatible GPU adapter/device was found: {0}")]
    GpuUnavailable(String),

    #[error("GPU back end error: {0}")]
    GpuBackend(String),

    #[error("FFT primitive rejected a correctly-shaped buffer: {0}")]
    FftFailure(String),
}

/// Result type alias used throughout the engine.
pub type ConvolutionResult<T> = Result<T, ConvolutionError>;

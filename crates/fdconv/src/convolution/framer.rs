//! Sliding-window input framer: turns the last `N` samples per channel into
//! one input spectrum per channel.

use crate::convolution::partitioner::Complex32;
use fdconv_core::{ConvolutionError, ConvolutionResult};
use realfft::RealToComplex;
use std::sync::Arc;

/// Maintains a `Cin x N` sliding window and emits its real-to-complex FFT.
pub struct InputFramer {
    cin: usize,
    n: usize,
    b: usize,
    m: usize,
    win: Vec<f32>,
    r2c: Arc<dyn RealToComplex<f32>>,
    fft_scratch: Vec<Complex32>,
    time_scratch: Vec<f32>,
    spectra: Vec<Vec<Complex32>>,
}

impl InputFramer {
    pub fn new(cin: usize, block_length: usize, fft_size: usize, r2c: Arc<dyn RealToComplex<f32>>) -> Self {
        let m = fft_size / 2 + 1;
        Self {
            cin,
            n: fft_size,
            b: block_length,
            m,
            win: vec![0.0; cin * fft_size],
            fft_scratch: r2c.make_scratch_vec(),
            time_scratch: vec![0.0; fft_size],
            r2c,
            spectra: vec![vec![Complex32::new(0.0, 0.0); m]; cin],
        }
    }

    /// Shift the sliding window by `B` samples, fold `signal` into it, and
    /// return the `Cin` input spectra (each `M` bins).
    ///
    /// `signal` must have length `Cin * B`, or `B` when `Cin == 1`.
    pub fn push(&mut self, signal: &[f32]) -> ConvolutionResult<&[Vec<Complex32>]> {
        let expected = self.cin * self.b;
        if signal.len() != expected && !(self.cin == 1 && signal.len() == self.b) {
            let (actual_channels, actual_block) = if signal.len() % self.cin.max(1) == 0 {
                (self.cin, signal.len() / self.cin.max(1))
            } else {
                (1, signal.len())
            };
            return Err(ConvolutionError::InvalidInputShape {
                expected_channels: self.cin,
                expected_block: self.b,
                actual_channels,
                actual_block,
            });
        }

        for ci in 0..self.cin {
            let win_row = &mut self.win[ci * self.n..(ci + 1) * self.n];
            win_row.copy_within(self.b..self.n, 0);
            let src = &signal[ci * self.b..(ci + 1) * self.b];
            win_row[self.n - self.b..].copy_from_slice(src);

            self.time_scratch.copy_from_slice(win_row);
            self.r2c
                .process_with_scratch(&mut self.time_scratch, &mut self.spectra[ci], &mut self.fft_scratch)
                .map_err(|e| ConvolutionError::FftFailure(e.to_string()))?;
        }

        Ok(&self.spectra)
    }

    /// Reset the sliding window to silence.
    pub fn reset(&mut self) {
        self.win.fill(0.0);
        for spectrum in &mut self.spectra {
            spectrum.fill(Complex32::new(0.0, 0.0));
        }
    }

    pub fn num_bins(&self) -> usize {
        self.m
    }
}

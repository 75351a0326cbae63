//! Output reconstruction: inverse FFT plus overlap-save tail slice.

use crate::convolution::partitioner::Complex32;
use fdconv_core::{ConvolutionError, ConvolutionResult};
use realfft::ComplexToReal;
use std::sync::Arc;

/// Inverse-transforms each channel's output spectrum and keeps only the
/// last `B` samples, the aliasing-free region of overlap-save.
pub struct Reconstructor {
    c: usize,
    b: usize,
    n: usize,
    c2r: Arc<dyn ComplexToReal<f32>>,
    ifft_scratch: Vec<Complex32>,
    time_scratch: Vec<f32>,
    output: Vec<f32>,
}

impl Reconstructor {
    pub fn new(c: usize, block_length: usize, fft_size: usize, c2r: Arc<dyn ComplexToReal<f32>>) -> Self {
        Self {
            c,
            b: block_length,
            n: fft_size,
            ifft_scratch: c2r.make_scratch_vec(),
            time_scratch: vec![0.0; fft_size],
            c2r,
            output: vec![0.0; c * block_length],
        }
    }

    /// Inverse-transform `spectra` (one `M`-length spectrum per channel,
    /// mutated in place by the FFT primitive) and return the `C x B` valid
    /// overlap-save region, borrowed from this reconstructor's own buffer.
    pub fn reconstruct(&mut self, spectra: &mut [Vec<Complex32>]) -> ConvolutionResult<&[f32]> {
        let scale = 1.0 / self.n as f32;
        for (channel, spectrum) in spectra.iter_mut().enumerate().take(self.c) {
            self.c2r
                .process_with_scratch(spectrum, &mut self.time_scratch, &mut self.ifft_scratch)
                .map_err(|e| ConvolutionError::FftFailure(e.to_string()))?;

            let tail = &self.time_scratch[self.n - self.b..];
            let out = &mut self.output[channel * self.b..(channel + 1) * self.b];
            for (o, t) in out.iter_mut().zip(tail) {
                *o = t * scale;
            }
        }
        Ok(&self.output)
    }

    pub fn reset(&mut self) {
        self.output.fill(0.0);
        self.time_scratch.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realfft::RealFftPlanner;

    #[test]
    fn zero_spectrum_reconstructs_to_silence() {
        let mut planner = RealFftPlanner::<f32>::new();
        let c2r = planner.plan_fft_inverse(4);
        let mut reconstructor = Reconstructor::new(1, 2, 4, c2r);
        let mut spectra = vec![vec![Complex32::new(0.0, 0.0); 3]];
        let out = reconstructor.reconstruct(&mut spectra).unwrap();
        assert_eq!(out, &[0.0, 0.0]);
    }
}

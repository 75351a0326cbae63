//! Uniformly partitioned frequency-domain convolution engine.
//!
//! Per-block control flow: framer -> FDL write -> MAC -> FDL advance ->
//! reconstructor. See [`Engine`] for the entry point.

mod config;
mod fdl;
mod framer;
#[cfg(feature = "gpu")]
mod gpu;
mod mac;
mod partitioner;
mod reconstruct;

pub use config::{Device, EngineConfig};
pub use mac::ChannelMode;
pub use partitioner::{Complex32, FilterSpectrumTable};

use fdl::Fdl;
use fdconv_core::{ConvolutionError, ConvolutionResult};
use framer::InputFramer;
use mac::{CpuMacBackend, MacBackend};
use realfft::RealFftPlanner;
use reconstruct::Reconstructor;

use crate::Processor;

/// Convolves a multichannel signal against a long FIR filter, block by
/// block, via overlap-save partitioned FFT convolution.
///
/// Constructed once per filter; `convolve` is then called once per block
/// and maintains all state (sliding window, frequency-domain delay line,
/// ring cursor) between calls.
pub struct Engine {
    c: usize,
    cin: usize,
    b: usize,
    mode: ChannelMode,
    filter: FilterSpectrumTable,
    framer: InputFramer,
    fdl: Fdl,
    backend: Box<dyn MacBackend>,
    spectrum: Vec<Vec<Complex32>>,
    reconstructor: Reconstructor,
}

impl Engine {
    /// Build an engine for `filter_td` (shape `C x FL`) under `config`.
    ///
    /// Validates the whole configuration as a unit before any allocation;
    /// a rejected call never partially constructs an engine.
    pub fn new(filter_td: &[Vec<f32>], config: EngineConfig) -> ConvolutionResult<Self> {
        if config.block_length == 0 {
            return Err(ConvolutionError::InvalidBlockLength(0));
        }
        let fft_size = config.fft_size.unwrap_or(2 * config.block_length);

        let filter = partitioner::build_filter_table(filter_td, config.block_length, fft_size)?;
        let c = filter.c();
        let m = filter.m();
        let k = filter.k();
        let cin = config.num_input_channels;
        if cin != 1 && cin != c {
            return Err(ConvolutionError::InvalidChannelCount {
                num_filter_channels: c,
                got: cin,
            });
        }
        let mode = if cin == 1 {
            ChannelMode::Broadcast
        } else {
            ChannelMode::Matched
        };

        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(fft_size);
        let c2r = planner.plan_fft_inverse(fft_size);

        let framer = InputFramer::new(cin, config.block_length, fft_size, r2c);
        let fdl = Fdl::new(cin, m, k);
        let reconstructor = Reconstructor::new(c, config.block_length, fft_size, c2r);
        let spectrum = vec![vec![Complex32::new(0.0, 0.0); m]; c];

        let (backend, device_used): (Box<dyn MacBackend>, Device) = match config.device {
            Device::Cpu => (Box::new(CpuMacBackend::new()), Device::Cpu),
            Device::Gpu => Self::build_gpu_backend(&filter, cin, mode),
        };

        let footprint_bytes = 8 * k * m * c + 8 * cin * m * k + 4 * cin * fft_size + 8 * c * m;
        log::debug!(
            "fdconv engine: C={c} Cin={cin} B={block} N={fft_size} M={m} K={k} footprint~{footprint_bytes}B",
            block = config.block_length,
        );
        log::info!("fdconv engine constructed, back end = {device_used:?}");

        Ok(Self {
            c,
            cin,
            b: config.block_length,
            mode,
            filter,
            framer,
            fdl,
            backend,
            spectrum,
            reconstructor,
        })
    }

    #[cfg(feature = "gpu")]
    fn build_gpu_backend(
        filter: &FilterSpectrumTable,
        cin: usize,
        mode: ChannelMode,
    ) -> (Box<dyn MacBackend>, Device) {
        match gpu::GpuMacBackend::new(filter, cin, mode) {
            Ok(backend) => (Box::new(backend), Device::Gpu),
            Err(err) => {
                log::warn!("GPU back end unavailable ({err}), falling back to CPU");
                (Box::new(CpuMacBackend::new()), Device::Cpu)
            }
        }
    }

    #[cfg(not(feature = "gpu"))]
    fn build_gpu_backend(
        _filter: &FilterSpectrumTable,
        _cin: usize,
        _mode: ChannelMode,
    ) -> (Box<dyn MacBackend>, Device) {
        log::warn!("GPU back end requested but the `gpu` feature is disabled; falling back to CPU");
        (Box::new(CpuMacBackend::new()), Device::Cpu)
    }

    /// Convolve the next block of input. `signal` is shape `Cin x B`
    /// (row-major), or a flat `&[f32]` of length `B` when `Cin == 1`.
    ///
    /// Returns the next `C x B` output block, borrowed from the engine's
    /// own scratch buffer and valid until the next call. Validation happens
    /// strictly before any state mutation: a rejected call leaves the
    /// framer, FDL, and cursor untouched.
    pub fn convolve(&mut self, signal: &[f32]) -> ConvolutionResult<&[f32]> {
        let spectra = self.framer.push(signal)?;
        self.fdl.write(spectra);
        self.backend
            .compute(&self.filter, &self.fdl, self.mode, &mut self.spectrum)?;
        self.fdl.advance();
        self.reconstructor.reconstruct(&mut self.spectrum)
    }

    /// Number of filter (output) channels.
    pub fn num_channels(&self) -> usize {
        self.c
    }

    /// Number of input channels (`1` or `num_channels()`).
    pub fn num_input_channels(&self) -> usize {
        self.cin
    }

    /// Number of partitions `K`.
    pub fn num_partitions(&self) -> usize {
        self.filter.k()
    }
}

impl Processor for Engine {
    fn reset(&mut self) {
        self.framer.reset();
        self.fdl.reset();
        self.reconstructor.reset();
        for spectrum in &mut self.spectrum {
            spectrum.fill(Complex32::new(0.0, 0.0));
        }
    }

    fn latency(&self) -> usize {
        self.b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            let rel = (x - y).abs() / y.abs().max(1.0);
            assert!(rel <= 1e-4, "{x} !~= {y}");
        }
    }

    #[test]
    fn s1_unit_impulse_single_channel() {
        let filter = vec![vec![1.0, 2.0, 3.0, 4.0]];
        let mut engine = Engine::new(&filter, EngineConfig::new(2)).unwrap();

        approx_eq(engine.convolve(&[1.0, 0.0]).unwrap(), &[1.0, 2.0]);
        approx_eq(engine.convolve(&[0.0, 0.0]).unwrap(), &[3.0, 4.0]);
        approx_eq(engine.convolve(&[0.0, 0.0]).unwrap(), &[0.0, 0.0]);
    }

    #[test]
    fn s2_delay() {
        let filter = vec![vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]];
        let mut engine = Engine::new(&filter, EngineConfig::new(4)).unwrap();

        approx_eq(engine.convolve(&[1.0, 2.0, 3.0, 4.0]).unwrap(), &[0.0, 0.0, 0.0, 0.0]);
        approx_eq(engine.convolve(&[5.0, 6.0, 7.0, 8.0]).unwrap(), &[0.0, 0.0, 0.0, 1.0]);
        approx_eq(engine.convolve(&[0.0, 0.0, 0.0, 0.0]).unwrap(), &[2.0, 3.0, 4.0, 5.0]);
        approx_eq(engine.convolve(&[0.0, 0.0, 0.0, 0.0]).unwrap(), &[6.0, 7.0, 8.0, 0.0]);
    }

    #[test]
    fn s3_broadcast_mono_to_stereo() {
        let filter = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0, 1.0]];
        let config = EngineConfig::new(2).with_input_channels(1);
        let mut engine = Engine::new(&filter, config).unwrap();

        let out = engine.convolve(&[1.0, 2.0]).unwrap().to_vec();
        approx_eq(&out[0..2], &[1.0, 2.0]);
        approx_eq(&out[2..4], &[0.0, 0.0]);

        let out = engine.convolve(&[3.0, 4.0]).unwrap().to_vec();
        approx_eq(&out[0..2], &[3.0, 4.0]);
        approx_eq(&out[2..4], &[0.0, 1.0]);

        let out = engine.convolve(&[0.0, 0.0]).unwrap().to_vec();
        approx_eq(&out[0..2], &[0.0, 0.0]);
        approx_eq(&out[2..4], &[2.0, 3.0]);
    }

    #[test]
    fn s4_matched_stereo() {
        let filter = vec![vec![1.0, 1.0, 1.0], vec![1.0, -1.0, 1.0]];
        let config = EngineConfig::new(3).with_input_channels(2);
        let mut engine = Engine::new(&filter, config).unwrap();

        let out = engine.convolve(&[1.0, 0.0, 0.0, 0.0, 0.0, 1.0]).unwrap().to_vec();
        approx_eq(&out[0..3], &[1.0, 1.0, 1.0]);
        approx_eq(&out[3..6], &[0.0, 0.0, 1.0]);

        let out = engine.convolve(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap().to_vec();
        approx_eq(&out[0..3], &[0.0, 0.0, 0.0]);
        approx_eq(&out[3..6], &[-1.0, 1.0, 0.0]);
    }

    #[test]
    fn rejects_mismatched_input_channel_count() {
        let filter = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let config = EngineConfig::new(2).with_input_channels(3);
        let err = Engine::new(&filter, config).unwrap_err();
        assert!(matches!(err, ConvolutionError::InvalidChannelCount { .. }));
    }

    #[test]
    fn rejected_call_does_not_mutate_state() {
        let filter = vec![vec![1.0, 2.0, 3.0, 4.0]];
        let mut engine = Engine::new(&filter, EngineConfig::new(2)).unwrap();
        engine.convolve(&[1.0, 0.0]).unwrap();
        assert!(engine.convolve(&[1.0]).is_err());
        // the malformed call must not have advanced the cursor or framer window.
        approx_eq(engine.convolve(&[0.0, 0.0]).unwrap(), &[3.0, 4.0]);
    }
}

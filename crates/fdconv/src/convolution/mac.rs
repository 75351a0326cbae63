//! Partition multiply-accumulate: the engine's dominant cost and its only
//! polymorphic seam.

use crate::convolution::fdl::Fdl;
use crate::convolution::partitioner::{Complex32, FilterSpectrumTable};
use fdconv_core::ConvolutionResult;
use rayon::prelude::*;

/// Whether the single input channel is broadcast against every filter
/// channel, or each input channel is matched one-to-one with a filter
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Broadcast,
    Matched,
}

/// The polymorphic seam separating the CPU and GPU realizations of the
/// partition MAC. Neither realization owns cursor advance; that stays with
/// the engine driver.
pub trait MacBackend: Send {
    /// Compute the `C x M` output spectrum from the filter table and the
    /// FDL's current (post-write, pre-advance) state. `output` holds `C`
    /// slots of `M` bins each, overwritten in full.
    fn compute(
        &mut self,
        filter: &FilterSpectrumTable,
        fdl: &Fdl,
        mode: ChannelMode,
        output: &mut [Vec<Complex32>],
    ) -> ConvolutionResult<()>;
}

/// `rayon`-driven reduction across partitions. Each partition's contribution
/// is a contiguous `(m, c)` plane read, vectorizable by the compiler.
#[derive(Default)]
pub struct CpuMacBackend;

impl CpuMacBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MacBackend for CpuMacBackend {
    fn compute(
        &mut self,
        filter: &FilterSpectrumTable,
        fdl: &Fdl,
        mode: ChannelMode,
        output: &mut [Vec<Complex32>],
    ) -> ConvolutionResult<()> {
        let c = filter.c();
        let m = filter.m();
        let k = filter.k();
        let broadcast = mode == ChannelMode::Broadcast;

        let acc = (0..k)
            .into_par_iter()
            .fold(
                || vec![Complex32::new(0.0, 0.0); c * m],
                |mut acc, partition| {
                    let ring_pos = fdl.ring_position(partition);
                    let plane = filter.plane(partition);
                    let slot = fdl.slot(ring_pos);
                    for bin in 0..m {
                        for channel in 0..c {
                            let ci = if broadcast { 0 } else { channel };
                            acc[channel * m + bin] += plane[bin * c + channel] * slot[ci * m + bin];
                        }
                    }
                    acc
                },
            )
            .reduce(
                || vec![Complex32::new(0.0, 0.0); c * m],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            );

        for (channel, out) in output.iter_mut().enumerate().take(c) {
            out.copy_from_slice(&acc[channel * m..(channel + 1) * m]);
        }

        Ok(())
    }
}

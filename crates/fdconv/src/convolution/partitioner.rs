//! One-shot filter partitioning: time domain -> partitioned frequency domain.

use fdconv_core::{ConvolutionError, ConvolutionResult};
use realfft::RealFftPlanner;
use rustfft::num_complex::Complex;

pub type Complex32 = Complex<f32>;

/// Immutable filter spectrum table, indexed `[k, m, c]` with partitions
/// outermost and `(m, c)` contiguous within each partition plane.
///
/// Built once by [`build_filter_table`] and never mutated afterward.
/// Partition `k = 0` corresponds to taps `[0, B)`, `k = 1` to `[B, 2B)`, and
/// so on; the final partition is zero-padded if `K * B > FL`.
pub struct FilterSpectrumTable {
    k: usize,
    m: usize,
    c: usize,
    planes: Vec<Vec<Complex32>>,
}

impl FilterSpectrumTable {
    /// Number of partitions.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of frequency bins.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Number of filter (output) channels.
    pub fn c(&self) -> usize {
        self.c
    }

    /// The `M x C` spectrum plane for partition `k`, `m` outer and `c` inner.
    pub fn plane(&self, k: usize) -> &[Complex32] {
        &self.planes[k]
    }
}

/// Split `filter_td` (shape `C x FL`) into `K` partitions of `block_length`
/// samples, zero-pad each to `fft_size`, and transform to the frequency
/// domain.
///
/// Returns `Err` for any malformed filter or incompatible `(block_length,
/// fft_size)` pair; no partial table is ever returned.
pub fn build_filter_table(
    filter_td: &[Vec<f32>],
    block_length: usize,
    fft_size: usize,
) -> ConvolutionResult<FilterSpectrumTable> {
    let c = filter_td.len();
    if c == 0 {
        return Err(ConvolutionError::InvalidChannels(0));
    }
    if block_length == 0 {
        return Err(ConvolutionError::InvalidBlockLength(0));
    }

    let fl = filter_td[0].len();
    for (index, row) in filter_td.iter().enumerate() {
        if row.len() != fl {
            return Err(ConvolutionError::InvalidFilterShape {
                index,
                expected: fl,
                actual: row.len(),
            });
        }
    }
    if fl < block_length {
        return Err(ConvolutionError::FilterTooShort {
            filter_length: fl,
            block_length,
        });
    }
    if fft_size % 2 != 0 || fft_size < 2 * block_length {
        return Err(ConvolutionError::InvalidFftSize {
            fft_size,
            min_fft_size: 2 * block_length,
        });
    }

    let k = fl.div_ceil(block_length);
    let m = fft_size / 2 + 1;

    let mut planner = RealFftPlanner::<f32>::new();
    let r2c = planner.plan_fft_forward(fft_size);
    let mut scratch = r2c.make_scratch_vec();
    let mut time_block = vec![0.0f32; fft_size];
    let mut freq_block = vec![Complex32::new(0.0, 0.0); m];

    let mut planes = Vec::with_capacity(k);
    for partition in 0..k {
        let start = partition * block_length;
        let end = (start + block_length).min(fl);

        let mut plane = vec![Complex32::new(0.0, 0.0); m * c];
        for (channel, row) in filter_td.iter().enumerate() {
            time_block.fill(0.0);
            if start < end {
                time_block[..end - start].copy_from_slice(&row[start..end]);
            }
            r2c.process_with_scratch(&mut time_block, &mut freq_block, &mut scratch)
                .map_err(|e| ConvolutionError::FftFailure(e.to_string()))?;
            for (bin, value) in freq_block.iter().enumerate() {
                plane[bin * c + channel] = *value;
            }
        }
        planes.push(plane);
    }

    Ok(FilterSpectrumTable { k, m, c, planes })
}

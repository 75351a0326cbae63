//! Constructor-time configuration surface.

/// Back end selector for the partition multiply-accumulate stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    /// `rayon`-driven scoped-thread reduction across partitions.
    #[default]
    Cpu,
    /// `wgpu` compute pipeline. Requires the `gpu` feature.
    Gpu,
}

/// Plain-data configuration for [`super::Engine::new`].
///
/// `block_length` has no sensible default and must be supplied via
/// [`EngineConfig::new`]; everything else defaults to the values documented
/// on each field.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Block length `B`, in samples. Determines algorithmic latency.
    pub block_length: usize,
    /// FFT size `N`. `None` resolves to `2 * block_length` at construction.
    pub fft_size: Option<usize>,
    /// Number of input channels `Cin`. Must resolve to `1` or `C` (the
    /// filter channel count) once the filter is known.
    pub num_input_channels: usize,
    /// Back end used for the partition MAC.
    pub device: Device,
}

impl EngineConfig {
    /// Create a config with the required `block_length` and every other
    /// field at its default (`fft_size: None`, `num_input_channels: 1`,
    /// `device: Device::Cpu`).
    pub fn new(block_length: usize) -> Self {
        Self {
            block_length,
            ..Self::default()
        }
    }

    /// Set the FFT size explicitly. Must be even and `>= 2 * block_length`.
    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = Some(fft_size);
        self
    }

    /// Set the number of input channels.
    pub fn with_input_channels(mut self, num_input_channels: usize) -> Self {
        self.num_input_channels = num_input_channels;
        self
    }

    /// Select the MAC back end.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_length: 0,
            fft_size: None,
            num_input_channels: 1,
            device: Device::Cpu,
        }
    }
}

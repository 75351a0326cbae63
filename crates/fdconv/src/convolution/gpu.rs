//! `wgpu` compute-pipeline realization of the partition MAC.
//!
//! The device buffers (filter table, FDL) are uploaded once at construction
//! and updated incrementally thereafter; the kernel itself is specialized
//! per instance by templating `C`, `M`, `K`, `Cin` and the broadcast/matched
//! mode directly into the WGSL source, matching the instance's shape.

use crate::convolution::fdl::Fdl;
use crate::convolution::mac::{ChannelMode, MacBackend};
use crate::convolution::partitioner::{Complex32, FilterSpectrumTable};
use bytemuck::{Pod, Zeroable};
use fdconv_core::{ConvolutionError, ConvolutionResult};
use std::sync::mpsc;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GpuComplex {
    re: f32,
    im: f32,
}

impl From<Complex32> for GpuComplex {
    fn from(value: Complex32) -> Self {
        Self {
            re: value.re,
            im: value.im,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Params {
    cursor: u32,
    _padding: [u32; 3],
}

struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuContext {
    fn request() -> ConvolutionResult<Self> {
        pollster::block_on(Self::request_async())
            .ok_or_else(|| ConvolutionError::GpuUnavailable("no compatible adapter/device".into()))
    }

    async fn request_async() -> Option<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("fdconv MAC device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .ok()?;
        Some(Self { device, queue })
    }
}

/// `wgpu` compute pipeline realizing the partition MAC on device.
///
/// Not real-time safe: per-call buffer submission and synchronous readback
/// incur driver-dependent latency. Callers selecting this back end accept
/// that trade-off.
pub struct GpuMacBackend {
    context: GpuContext,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    filter_buffer: wgpu::Buffer,
    fdl_buffer: wgpu::Buffer,
    output_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    c: usize,
    m: usize,
    cin: usize,
    output_size: u64,
}

impl GpuMacBackend {
    pub fn new(filter: &FilterSpectrumTable, cin: usize, mode: ChannelMode) -> ConvolutionResult<Self> {
        let context = GpuContext::request()?;
        let c = filter.c();
        let m = filter.m();
        let k = filter.k();

        let shader_source = shader_source(c, m, k, cin, mode);
        let shader = context
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("fdconv MAC shader"),
                source: wgpu::ShaderSource::Wgsl(shader_source.into()),
            });

        let mut filter_flat = Vec::with_capacity(k * m * c);
        for partition in 0..k {
            filter_flat.extend(filter.plane(partition).iter().copied().map(GpuComplex::from));
        }
        let filter_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("fdconv filter table"),
                contents: bytemuck::cast_slice(&filter_flat),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            });

        let fdl_len_bytes = (k * cin * m * std::mem::size_of::<GpuComplex>()) as u64;
        let fdl_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fdconv fdl"),
            size: fdl_len_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let output_size = (c * m * std::mem::size_of::<GpuComplex>()) as u64;
        let output_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fdconv mac output"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fdconv mac readback"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let params_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("fdconv mac params"),
                contents: bytemuck::bytes_of(&Params {
                    cursor: 0,
                    _padding: [0; 3],
                }),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let bind_group_layout =
            context
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("fdconv MAC bind group layout"),
                    entries: &[
                        storage_entry(0, true),
                        storage_entry(1, true),
                        storage_entry(2, false),
                        wgpu::BindGroupLayoutEntry {
                            binding: 3,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

        let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fdconv MAC bind group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: filter_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: fdl_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = context
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("fdconv MAC pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
        let pipeline = context
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("fdconv MAC pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("mac"),
                compilation_options: Default::default(),
                cache: None,
            });

        Ok(Self {
            context,
            pipeline,
            bind_group,
            filter_buffer,
            fdl_buffer,
            output_buffer,
            staging_buffer,
            params_buffer,
            c,
            m,
            cin,
            output_size,
        })
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn shader_source(c: usize, m: usize, k: usize, cin: usize, mode: ChannelMode) -> String {
    let broadcast = matches!(mode, ChannelMode::Broadcast);
    format!(
        r#"
struct Params {{
    cursor: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}}

@group(0) @binding(0) var<storage, read> filter_table: array<vec2<f32>>;
@group(0) @binding(1) var<storage, read> fdl: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read_write> mac_output: array<vec2<f32>>;
@group(0) @binding(3) var<uniform> params: Params;

const C: u32 = {c}u;
const M: u32 = {m}u;
const K: u32 = {k}u;
const CIN: u32 = {cin}u;
const BROADCAST: bool = {broadcast};

fn cmul(a: vec2<f32>, b: vec2<f32>) -> vec2<f32> {{
    return vec2<f32>(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x);
}}

@compute @workgroup_size(64)
fn mac(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let idx = gid.x;
    if (idx >= C * M) {{
        return;
    }}
    let channel = idx / M;
    let bin = idx % M;
    let ci = select(channel, 0u, BROADCAST);

    var acc = vec2<f32>(0.0, 0.0);
    for (var k: u32 = 0u; k < K; k = k + 1u) {{
        let ring_pos = (params.cursor + K - (k % K)) % K;
        let h = filter_table[k * (M * C) + bin * C + channel];
        let x = fdl[ring_pos * (CIN * M) + ci * M + bin];
        acc = acc + cmul(h, x);
    }}
    mac_output[idx] = acc;
}}
"#,
        c = c,
        m = m,
        k = k,
        cin = cin,
        broadcast = broadcast,
    )
}

impl MacBackend for GpuMacBackend {
    fn compute(
        &mut self,
        _filter: &FilterSpectrumTable,
        fdl: &Fdl,
        _mode: ChannelMode,
        output: &mut [Vec<Complex32>],
    ) -> ConvolutionResult<()> {
        let cursor = fdl.cursor();
        let slot: Vec<GpuComplex> = fdl.slot(cursor).iter().copied().map(GpuComplex::from).collect();
        let slot_offset = (cursor * self.cin * self.m * std::mem::size_of::<GpuComplex>()) as u64;
        self.context
            .queue
            .write_buffer(&self.fdl_buffer, slot_offset, bytemuck::cast_slice(&slot));
        self.context.queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::bytes_of(&Params {
                cursor: cursor as u32,
                _padding: [0; 3],
            }),
        );

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fdconv MAC encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("fdconv MAC pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            let total = (self.c * self.m) as u32;
            let workgroups = total.div_ceil(64).max(1);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&self.output_buffer, 0, &self.staging_buffer, 0, self.output_size);
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.staging_buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.context.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| ConvolutionError::GpuBackend("readback channel closed".into()))?
            .map_err(|e| ConvolutionError::GpuBackend(e.to_string()))?;

        {
            let mapped = slice.get_mapped_range();
            let values: &[GpuComplex] = bytemuck::cast_slice(&mapped);
            for (channel, out) in output.iter_mut().enumerate().take(self.c) {
                for (bin, v) in out.iter_mut().enumerate() {
                    let g = values[channel * self.m + bin];
                    *v = Complex32::new(g.re, g.im);
                }
            }
        }
        self.staging_buffer.unmap();

        Ok(())
    }
}

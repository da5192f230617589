use super::{Accelerator, DeviceError};

const PROJECTION_SHADER: &str = include_str!("noise_weighted.wgsl");

/// Compiled projection shader and its bind group layout.
#[derive(Debug)]
pub(crate) struct ProjectionPipeline {
    pub(super) compute_pipeline: wgpu::ComputePipeline,
    pub(super) bind_group_layout: wgpu::BindGroupLayout,
}

/// Binding 0 is the uniform parameter block, 1..=9 are read-only inputs and
/// 10..=11 the per-slot outputs.
const READ_ONLY_BINDINGS: std::ops::RangeInclusive<u32> = 1..=9;
const OUTPUT_BINDINGS: std::ops::RangeInclusive<u32> = 10..=11;

impl ProjectionPipeline {
    pub(crate) fn new(accel: &Accelerator) -> Result<Self, DeviceError> {
        let device = accel.device();

        accel.scoped(|| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("noise_weighted_shader"),
                source: wgpu::ShaderSource::Wgsl(PROJECTION_SHADER.into()),
            });

            let mut entries = vec![wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }];
            entries.extend(READ_ONLY_BINDINGS.map(|binding| storage_entry(binding, true)));
            entries.extend(OUTPUT_BINDINGS.map(|binding| storage_entry(binding, false)));

            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("noise_weighted_bind_group_layout"),
                    entries: &entries,
                });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("noise_weighted_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let compute_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("noise_weighted_pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

            Ok(Self {
                compute_pipeline,
                bind_group_layout,
            })
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

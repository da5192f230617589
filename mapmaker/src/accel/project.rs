//! Phase 1 on the accelerator.
//!
//! Each detector batch gets one dispatch: `x` covers the samples of an
//! interval, `y` the detectors of the batch and `z` the intervals. Every
//! (detector, interval, sample) slot writes its accumulator offset or skip
//! code plus `nnz` weighted values, which are read back, turned into hits in
//! slot order and merged before the next batch runs.

use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::{Accelerator, DeviceError, ProjectionPipeline};
use crate::config::NoiseWeightedConfig;
use crate::dispatch::Merger;
use crate::inputs::CheckedProjection;
use crate::interval::Interval;
use crate::kernel::{Hit, SampleStats, Skip};
use crate::layout::SubmapLayout;

const WORKGROUP_SIZE: u32 = 256;

const SKIP_INVALID_POINTING: i64 = -1;
const SKIP_DET_FLAGGED: i64 = -2;
const SKIP_SHARED_FLAGGED: i64 = -3;
const SKIP_NOT_LOCAL: i64 = -4;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Params {
    n_det: u32,
    n_view: u32,
    n_samp: u32,
    nnz: u32,
    n_pix_submap: u32,
    n_global_submap: u32,
    n_local_submap: u32,
    total_samples: u32,
    det_mask: u32,
    shared_mask: u32,
    det_base: u32,
    _pad: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ViewRange {
    first: u32,
    len: u32,
    /// Position of the interval's first sample among all interval samples.
    offset: u32,
    _pad: u32,
}

/// Device copies of the call inputs, shared by all detector batches.
struct DeviceInputs {
    det_rows: wgpu::Buffer,
    det_scale: wgpu::Buffer,
    global2local: wgpu::Buffer,
    views: wgpu::Buffer,
    pixels: wgpu::Buffer,
    weights: wgpu::Buffer,
    det_data: wgpu::Buffer,
    det_flags: wgpu::Buffer,
    shared_flags: wgpu::Buffer,
}

/// Resolves every sample on the device and merges the hits batch by batch.
///
/// A batch covers as many detectors as fit both the device's binding limit
/// and `config.hit_budget()` slots, but always at least one detector.
pub(crate) fn resolve_on_device(
    accel: &Accelerator,
    checked: &CheckedProjection<'_>,
    layout: &SubmapLayout<'_>,
    intervals: &[Interval],
    config: &NoiseWeightedConfig,
    merger: &mut Merger<'_>,
) -> Result<(), DeviceError> {
    let shape = *checked.shape();
    let nnz = shape.nnz;
    let masks = config.masks();
    let projection = checked.projection();

    let mut views = Vec::with_capacity(intervals.len());
    let mut total = 0usize;
    for interval in intervals {
        views.push(ViewRange {
            first: to_u32("interval start", interval.first())?,
            len: to_u32("interval length", interval.sample_count())?,
            offset: to_u32("samples inside intervals", total)?,
            _pad: 0,
        });
        total += interval.sample_count();
    }

    if shape.n_det == 0 || total == 0 {
        return Ok(());
    }

    let limits = accel.limits();
    let max_groups = limits.max_compute_workgroups_per_dimension;
    let longest = views.iter().map(|v| v.len).max().unwrap_or(0);
    check_limit(
        "workgroups per interval",
        longest.div_ceil(WORKGROUP_SIZE) as u64,
        max_groups as u64,
    )?;
    check_limit("intervals per dispatch", views.len() as u64, max_groups as u64)?;

    let binding_limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    for (what, bytes) in [
        ("pixel buffer", std::mem::size_of_val(projection.pixels)),
        ("weight buffer", std::mem::size_of_val(projection.weights)),
        ("detector data buffer", std::mem::size_of_val(projection.det_data)),
        ("global2local table", std::mem::size_of_val(layout.global2local())),
    ] {
        check_limit(what, bytes as u64, binding_limit)?;
    }

    let per_det_bytes = (total * nnz * std::mem::size_of::<f64>()) as u64;
    let fitting = binding_limit / per_det_bytes;
    if fitting == 0 {
        return Err(DeviceError::Limit {
            what: "result buffer for one detector",
            required: per_det_bytes,
            limit: binding_limit,
        });
    }
    let max_batch = fitting
        .min((config.hit_budget() / total).max(1) as u64)
        .min(max_groups as u64)
        .min(shape.n_det as u64) as usize;

    let base_params = Params {
        n_det: 0,
        n_view: to_u32("interval count", views.len())?,
        n_samp: to_u32("samples per detector", shape.n_samp)?,
        nnz: to_u32("nnz", nnz)?,
        n_pix_submap: to_u32("pixels per submap", layout.n_pix_submap())?,
        n_global_submap: to_u32("global submaps", layout.n_global_submap())?,
        n_local_submap: to_u32("local submaps", layout.n_local_submap())?,
        total_samples: to_u32("samples inside intervals", total)?,
        det_mask: masks.det as u32,
        shared_mask: masks.shared as u32,
        det_base: 0,
        _pad: 0,
    };

    let pipeline = accel.pipeline()?;
    let inputs = accel.scoped(|| Ok(upload_inputs(accel, checked, layout, &views)))?;
    let zmap_len = layout.n_local_submap() * layout.n_pix_submap() * nnz;
    let mut hits = Vec::new();
    let mut values = Vec::new();

    tracing::debug!(
        "Resolving {} detectors in batches of {} on {}",
        shape.n_det,
        max_batch,
        accel.info().name
    );

    for det_base in (0..shape.n_det).step_by(max_batch) {
        let batch_len = max_batch.min(shape.n_det - det_base);
        let params = Params {
            n_det: batch_len as u32,
            det_base: det_base as u32,
            ..base_params
        };
        let groups = [longest.div_ceil(WORKGROUP_SIZE), batch_len as u32, params.n_view];
        let (offsets, slot_values) =
            run_batch(accel, &pipeline, &inputs, params, batch_len * total, nnz, groups)?;

        hits.clear();
        values.clear();
        let mut stats = SampleStats::default();
        for (slot, &code) in offsets.iter().enumerate() {
            let outcome = match code {
                SKIP_INVALID_POINTING => Err(Skip::InvalidPointing),
                SKIP_DET_FLAGGED => Err(Skip::DetectorFlagged),
                SKIP_SHARED_FLAGGED => Err(Skip::SharedFlagged),
                SKIP_NOT_LOCAL => Err(Skip::NotLocal),
                offset if offset >= 0 && offset as usize + nnz <= zmap_len => {
                    hits.push(Hit {
                        offset: offset as usize,
                        scale: 1.0,
                        source: values.len(),
                    });
                    values.extend_from_slice(&slot_values[slot * nnz..(slot + 1) * nnz]);
                    Ok(())
                }
                other => {
                    return Err(DeviceError::Readback(format!(
                        "unexpected result {} in slot {}",
                        other, slot
                    )))
                }
            };
            stats.record(outcome);
        }

        merger.apply(&hits, &values);
        merger.add_stats(stats);
    }

    Ok(())
}

fn upload_inputs(
    accel: &Accelerator,
    checked: &CheckedProjection<'_>,
    layout: &SubmapLayout<'_>,
    views: &[ViewRange],
) -> DeviceInputs {
    let device = accel.device();
    let projection = checked.projection();
    let det_rows: Vec<[i32; 4]> = checked
        .rows()
        .iter()
        .map(|rows| {
            [
                rows.pixel as i32,
                rows.weight as i32,
                rows.flag as i32,
                rows.data as i32,
            ]
        })
        .collect();

    DeviceInputs {
        det_rows: storage_buffer(device, "det_rows", &det_rows),
        det_scale: storage_buffer(device, "det_scale", projection.det_scale),
        global2local: storage_buffer(device, "global2local", layout.global2local()),
        views: storage_buffer(device, "views", views),
        pixels: storage_buffer(device, "pixels", projection.pixels),
        weights: storage_buffer(device, "weights", projection.weights),
        det_data: storage_buffer(device, "det_data", projection.det_data),
        det_flags: storage_buffer(device, "det_flags", &pack_bytes(projection.det_flags)),
        shared_flags: storage_buffer(
            device,
            "shared_flags",
            &pack_bytes(projection.shared_flags),
        ),
    }
}

fn run_batch(
    accel: &Accelerator,
    pipeline: &ProjectionPipeline,
    inputs: &DeviceInputs,
    params: Params,
    slots: usize,
    nnz: usize,
    groups: [u32; 3],
) -> Result<(Vec<i64>, Vec<f64>), DeviceError> {
    let device = accel.device();
    let offset_size = (slots * std::mem::size_of::<i64>()) as u64;
    let value_size = (slots * nnz * std::mem::size_of::<f64>()) as u64;

    let (offset_staging, value_staging) = accel.scoped(|| {
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("noise_weighted_params"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let hit_offset = output_buffer(device, "hit_offset", offset_size);
        let hit_value = output_buffer(device, "hit_value", value_size);
        let offset_staging = staging_buffer(device, "hit_offset_staging", offset_size);
        let value_staging = staging_buffer(device, "hit_value_staging", value_size);

        let resources = [
            &params_buffer,
            &inputs.det_rows,
            &inputs.det_scale,
            &inputs.global2local,
            &inputs.views,
            &inputs.pixels,
            &inputs.weights,
            &inputs.det_data,
            &inputs.det_flags,
            &inputs.shared_flags,
            &hit_offset,
            &hit_value,
        ];
        let entries: Vec<wgpu::BindGroupEntry> = resources
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("noise_weighted_bind_group"),
            layout: &pipeline.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("noise_weighted_encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("noise_weighted_pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&pipeline.compute_pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }
        encoder.copy_buffer_to_buffer(&hit_offset, 0, &offset_staging, 0, offset_size);
        encoder.copy_buffer_to_buffer(&hit_value, 0, &value_staging, 0, value_size);
        accel.queue().submit(std::iter::once(encoder.finish()));

        Ok((offset_staging, value_staging))
    })?;

    let offsets = read_staging::<i64>(accel, &offset_staging)?;
    let values = read_staging::<f64>(accel, &value_staging)?;
    Ok((offsets, values))
}

fn read_staging<T: Pod>(
    accel: &Accelerator,
    staging: &wgpu::Buffer,
) -> Result<Vec<T>, DeviceError> {
    let buffer_slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    accel.wait()?;

    receiver
        .recv()
        .map_err(|e| DeviceError::Readback(e.to_string()))?
        .map_err(|e| DeviceError::Readback(e.to_string()))?;

    let data = buffer_slice.get_mapped_range();
    let values = bytemuck::try_cast_slice::<u8, T>(&data)
        .map_err(|e| DeviceError::Readback(e.to_string()))?
        .to_vec();
    drop(data);
    staging.unmap();

    Ok(values)
}

fn storage_buffer<T: Pod>(device: &wgpu::Device, label: &str, data: &[T]) -> wgpu::Buffer {
    // zero-sized bindings are invalid
    const EMPTY: [u8; 8] = [0; 8];
    let contents: &[u8] = bytemuck::cast_slice(data);

    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: if contents.is_empty() { &EMPTY } else { contents },
        usage: wgpu::BufferUsages::STORAGE,
    })
}

fn output_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

fn staging_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Packs bytes four per little-endian `u32`, zero-padding the last word.
fn pack_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}

fn to_u32(what: &'static str, value: usize) -> Result<u32, DeviceError> {
    u32::try_from(value).map_err(|_| DeviceError::Limit {
        what,
        required: value as u64,
        limit: u32::MAX as u64,
    })
}

fn check_limit(what: &'static str, required: u64, limit: u64) -> Result<(), DeviceError> {
    if required > limit {
        return Err(DeviceError::Limit {
            what,
            required,
            limit,
        });
    }
    Ok(())
}

//! wgpu compute accelerator.
//!
//! The device runs phase 1 of the projection (gate and offset resolution plus
//! the weighted values) and the host applies the results. Any failure here
//! is reported as a [`DeviceError`] and the caller falls back to the host.

mod pipeline;
mod project;

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

pub(crate) use self::pipeline::ProjectionPipeline;
pub(crate) use self::project::resolve_on_device;

/// Storage buffers bound by the projection shader.
pub(crate) const STORAGE_BINDINGS: u32 = 11;

#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("no accelerator is active")]
    Unavailable,

    #[error("failed to find suitable adapter: {0}")]
    NoAdapter(String),

    #[error("adapter lacks required features: {0:?}")]
    MissingFeatures(wgpu::Features),

    #[error("failed to create device: {0}")]
    RequestDevice(String),

    #[error("{what} needs {required}, device limit is {limit}")]
    Limit {
        what: &'static str,
        required: u64,
        limit: u64,
    },

    #[error("device validation error: {0}")]
    Validation(String),

    #[error("device out of memory: {0}")]
    OutOfMemory(String),

    #[error("failed to read back results: {0}")]
    Readback(String),
}

/// A compute device able to run the projection shader.
///
/// Requires 64-bit float and integer shader support.
#[derive(Debug)]
pub struct Accelerator {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
    pipeline: Mutex<Option<Arc<ProjectionPipeline>>>,
}

impl Accelerator {
    /// Picks a high-performance adapter and opens a device on it.
    pub fn new() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| DeviceError::NoAdapter(e.to_string()))?;

        let required_features = wgpu::Features::SHADER_F64 | wgpu::Features::SHADER_INT64;
        let missing = required_features.difference(adapter.features());
        if !missing.is_empty() {
            return Err(DeviceError::MissingFeatures(missing));
        }

        let limits = adapter.limits();
        if limits.max_storage_buffers_per_shader_stage < STORAGE_BINDINGS {
            return Err(DeviceError::Limit {
                what: "storage buffers per shader stage",
                required: STORAGE_BINDINGS as u64,
                limit: limits.max_storage_buffers_per_shader_stage as u64,
            });
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("mapmaker_device"),
            required_features,
            required_limits: limits.clone(),
            ..Default::default()
        }))
        .map_err(|e| DeviceError::RequestDevice(e.to_string()))?;

        let info = adapter.get_info();
        tracing::info!("Accelerator ready: {} ({:?})", info.name, info.backend);

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            info,
            limits,
            pipeline: Mutex::new(None),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    /// Returns the projection pipeline, compiling it on first use.
    pub(crate) fn pipeline(&self) -> Result<Arc<ProjectionPipeline>, DeviceError> {
        let mut cached = self.pipeline.lock();
        if let Some(pipeline) = cached.as_ref() {
            return Ok(Arc::clone(pipeline));
        }
        let pipeline = Arc::new(ProjectionPipeline::new(self)?);
        *cached = Some(Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Blocks until all submitted work has finished.
    pub(crate) fn wait(&self) -> Result<(), DeviceError> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| DeviceError::Readback(e.to_string()))
    }

    /// Runs `f` inside validation and out-of-memory error scopes and turns
    /// any captured device error into a [`DeviceError`].
    pub(crate) fn scoped<T>(
        &self,
        f: impl FnOnce() -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let result = f();

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = validation {
            return Err(DeviceError::Validation(err.to_string()));
        }
        if let Some(err) = out_of_memory {
            return Err(DeviceError::OutOfMemory(err.to_string()));
        }
        result
    }
}

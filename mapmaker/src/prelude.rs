// Configuration
pub use crate::config::{
    DEFAULT_DET_FLAG_MASK, DEFAULT_SHARED_FLAG_MASK, FlagMasks, NoiseWeightedConfig,
};

// Error handling
pub use crate::error::{Error, Result};

// Inputs and layout
pub use crate::inputs::{
    CheckedProjection, DetectorRows, DetectorView, Projection, ProjectionShape,
};
pub use crate::interval::{Interval, total_samples, validate_intervals};
pub use crate::layout::{PixelLocation, SubmapLayout};
pub use crate::zmap::ZMap;

// Kernel
pub use crate::kernel::{Hit, SampleStats, Skip, accumulate_sample, apply_hit, resolve_sample};

// Driver
pub use crate::context::ExecutionContext;
pub use crate::dispatch::{
    Backend, ProjectionReport, build_noise_weighted, build_noise_weighted_serial, select_backend,
};

// Accelerator
#[cfg(feature = "accel")]
pub use crate::accel::{Accelerator, DeviceError};

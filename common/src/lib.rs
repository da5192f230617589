//! Shared utilities for the map-making workspace: dense buffers, parallel
//! iteration helpers, float comparison and logging setup.

pub mod buffer3;
pub mod float_ext;
pub mod log_setup;
pub mod parallel;

pub use buffer3::Buffer3;
pub use float_ext::FloatExt;

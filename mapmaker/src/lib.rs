//! Noise-weighted projection of time-ordered detector samples into a
//! distributed pixel-domain accumulator.
//!
//! One call of [`build_noise_weighted`] adds, for every detector and every
//! valid sample inside the requested intervals, the detector's scaled data
//! times the sample's pointing weights into the local submap that owns the
//! pixel. Work runs on the rayon thread pool or, when requested and
//! available, on a wgpu compute device.

#[cfg(feature = "accel")]
pub mod accel;
mod config;
mod context;
mod dispatch;
mod error;
mod inputs;
mod interval;
mod kernel;
mod layout;
pub mod sim;
mod zmap;

pub mod prelude;

pub use prelude::*;

//! Execution context: owns the optional accelerator.

#[cfg(feature = "accel")]
use crate::accel::Accelerator;

/// Compute resources available to projection calls.
///
/// Creation never fails. When no suitable device exists the context is
/// host-only and every call runs on the rayon thread pool.
#[derive(Debug)]
pub struct ExecutionContext {
    #[cfg(feature = "accel")]
    accelerator: Option<Accelerator>,
}

impl ExecutionContext {
    /// Creates a context, attempting to initialize an accelerator.
    /// Falls back to host-only if none is usable.
    pub fn new() -> Self {
        #[cfg(feature = "accel")]
        {
            match Accelerator::new() {
                Ok(accelerator) => Self::with_accelerator(accelerator),
                Err(e) => {
                    tracing::warn!("Accelerator initialization failed, using host only: {}", e);
                    Self::host_only()
                }
            }
        }
        #[cfg(not(feature = "accel"))]
        {
            Self::host_only()
        }
    }

    pub fn host_only() -> Self {
        Self {
            #[cfg(feature = "accel")]
            accelerator: None,
        }
    }

    #[cfg(feature = "accel")]
    pub fn with_accelerator(accelerator: Accelerator) -> Self {
        Self {
            accelerator: Some(accelerator),
        }
    }

    pub fn has_accelerator(&self) -> bool {
        #[cfg(feature = "accel")]
        {
            self.accelerator.is_some()
        }
        #[cfg(not(feature = "accel"))]
        {
            false
        }
    }

    #[cfg(feature = "accel")]
    pub fn accelerator(&self) -> Option<&Accelerator> {
        self.accelerator.as_ref()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

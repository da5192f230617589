//! Configuration for the noise-weighted projection.

use serde::{Deserialize, Serialize};

/// Detector flag bits rejected by default (the "invalid" bit).
pub const DEFAULT_DET_FLAG_MASK: u8 = 1;

/// Shared flag bits rejected by default (the "invalid" bit).
pub const DEFAULT_SHARED_FLAG_MASK: u8 = 1;

/// Hits resolved before they are merged into the accumulator.
pub const DEFAULT_MAX_HITS_PER_BATCH: usize = 1 << 20;

/// Bits that must be clear for a sample to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagMasks {
    pub det: u8,
    pub shared: u8,
}

/// Configuration for [`build_noise_weighted`](crate::build_noise_weighted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseWeightedConfig {
    /// Detector flag bits that exclude a sample.
    pub det_flag_mask: u8,
    /// Shared (observatory-wide) flag bits that exclude a sample.
    pub shared_flag_mask: u8,
    /// Run on the accelerator when one is active.
    pub use_accel: bool,
    /// Minimum samples per host task. 0 picks a size from the thread count.
    pub min_samples_per_task: usize,
    /// Upper bound on resolved hits held in memory at once. 0 picks
    /// [`DEFAULT_MAX_HITS_PER_BATCH`].
    pub max_hits_per_batch: usize,
}

impl Default for NoiseWeightedConfig {
    fn default() -> Self {
        Self {
            det_flag_mask: DEFAULT_DET_FLAG_MASK,
            shared_flag_mask: DEFAULT_SHARED_FLAG_MASK,
            use_accel: false,
            min_samples_per_task: 0,
            max_hits_per_batch: 0,
        }
    }
}

impl NoiseWeightedConfig {
    /// Parse a configuration from YAML. Missing keys keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(yaml)
    }

    pub fn with_det_flag_mask(mut self, mask: u8) -> Self {
        self.det_flag_mask = mask;
        self
    }

    pub fn with_shared_flag_mask(mut self, mask: u8) -> Self {
        self.shared_flag_mask = mask;
        self
    }

    pub fn with_accel(mut self, use_accel: bool) -> Self {
        self.use_accel = use_accel;
        self
    }

    pub fn with_min_samples_per_task(mut self, min_samples: usize) -> Self {
        self.min_samples_per_task = min_samples;
        self
    }

    pub fn with_max_hits_per_batch(mut self, max_hits: usize) -> Self {
        self.max_hits_per_batch = max_hits;
        self
    }

    /// Effective hit budget, never zero.
    pub fn hit_budget(&self) -> usize {
        match self.max_hits_per_batch {
            0 => DEFAULT_MAX_HITS_PER_BATCH,
            n => n,
        }
    }

    pub fn masks(&self) -> FlagMasks {
        FlagMasks {
            det: self.det_flag_mask,
            shared: self.shared_flag_mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = NoiseWeightedConfig::default();
        assert_eq!(config.det_flag_mask, 1);
        assert_eq!(config.shared_flag_mask, 1);
        assert!(!config.use_accel);
        assert_eq!(config.min_samples_per_task, 0);
        assert_eq!(config.hit_budget(), DEFAULT_MAX_HITS_PER_BATCH);
    }

    #[test]
    fn test_config_builder() {
        let config = NoiseWeightedConfig::default()
            .with_det_flag_mask(0b0101)
            .with_shared_flag_mask(0xff)
            .with_accel(true)
            .with_min_samples_per_task(512)
            .with_max_hits_per_batch(64);

        assert_eq!(
            config.masks(),
            FlagMasks {
                det: 0b0101,
                shared: 0xff
            }
        );
        assert!(config.use_accel);
        assert_eq!(config.min_samples_per_task, 512);
        assert_eq!(config.hit_budget(), 64);
    }

    #[test]
    fn test_config_from_yaml_partial() {
        let config =
            NoiseWeightedConfig::from_yaml("det_flag_mask: 3\nuse_accel: true\n").unwrap();
        assert_eq!(config.det_flag_mask, 3);
        assert_eq!(config.shared_flag_mask, DEFAULT_SHARED_FLAG_MASK);
        assert!(config.use_accel);
    }

    #[test]
    fn test_config_from_yaml_rejects_out_of_range_mask() {
        assert!(NoiseWeightedConfig::from_yaml("det_flag_mask: 300\n").is_err());
    }
}

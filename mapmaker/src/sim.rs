//! Deterministic synthetic scans for tests, benchmarks and the demo binary.
//!
//! Detectors come in pairs that share a pointing row and a flag row but have
//! their own weights and data, as orthogonal polarization-sensitive detectors
//! do. Each pointing row wanders across the sky in small steps so pixels are
//! hit many times. Part of the sky is not owned locally.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::inputs::Projection;
use crate::interval::Interval;
use crate::layout::SubmapLayout;
use crate::zmap::ZMap;

/// Flag bit that the default masks reject.
pub const FLAG_INVALID: u8 = 1;
/// Flag bit set on some samples but not rejected by the default masks.
pub const FLAG_TURNAROUND: u8 = 1 << 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub n_det: usize,
    pub n_samp: usize,
    pub nnz: usize,
    pub n_pix_submap: usize,
    pub n_global_submap: usize,
    /// Fraction of global submaps stored locally. At least one is always owned.
    pub owned_fraction: f64,
    pub n_intervals: usize,
    pub invalid_pointing_rate: f64,
    pub det_flag_rate: f64,
    pub shared_flag_rate: f64,
    pub seed: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            n_det: 8,
            n_samp: 4096,
            nnz: 3,
            n_pix_submap: 64,
            n_global_submap: 48,
            owned_fraction: 0.75,
            n_intervals: 6,
            invalid_pointing_rate: 0.01,
            det_flag_rate: 0.02,
            shared_flag_rate: 0.01,
            seed: 42,
        }
    }
}

impl ScanConfig {
    pub fn with_detectors(mut self, n_det: usize) -> Self {
        self.n_det = n_det;
        self
    }

    pub fn with_samples(mut self, n_samp: usize) -> Self {
        self.n_samp = n_samp;
        self
    }

    pub fn with_nnz(mut self, nnz: usize) -> Self {
        self.nnz = nnz;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_owned_fraction(mut self, owned_fraction: f64) -> Self {
        self.owned_fraction = owned_fraction;
        self
    }
}

/// Owned buffers of a simulated scan.
#[derive(Debug, Clone)]
pub struct SimulatedScan {
    pub config: ScanConfig,
    pub pixel_index: Vec<i32>,
    pub weight_index: Vec<i32>,
    pub flag_index: Vec<i32>,
    pub data_index: Vec<i32>,
    pub pixels: Vec<i64>,
    pub weights: Vec<f64>,
    pub det_data: Vec<f64>,
    pub det_flags: Vec<u8>,
    pub det_scale: Vec<f64>,
    pub shared_flags: Vec<u8>,
    pub global2local: Vec<i64>,
    pub n_local_submap: usize,
    pub intervals: Vec<Interval>,
}

impl SimulatedScan {
    pub fn generate(config: &ScanConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let n_det = config.n_det;
        let n_samp = config.n_samp;
        let nnz = config.nnz;
        let n_pair_rows = n_det.div_ceil(2);
        let n_pix = (config.n_global_submap * config.n_pix_submap) as i64;

        let pixel_index: Vec<i32> = (0..n_det).map(|d| (d / 2) as i32).collect();
        let flag_index = pixel_index.clone();
        let weight_index: Vec<i32> = (0..n_det as i32).collect();
        let data_index = weight_index.clone();

        let mut pixels = Vec::with_capacity(n_pair_rows * n_samp);
        for _ in 0..n_pair_rows {
            let mut pixel = rng.random_range(0..n_pix.max(1));
            for _ in 0..n_samp {
                pixel = (pixel + rng.random_range(-3..=3)).rem_euclid(n_pix.max(1));
                if rng.random_bool(config.invalid_pointing_rate) {
                    pixels.push(-1);
                } else {
                    pixels.push(pixel);
                }
            }
        }

        let mut weights = Vec::with_capacity(n_det * n_samp * nnz);
        for _ in 0..n_det * n_samp {
            let angle = rng.random_range(0.0..std::f64::consts::PI);
            for c in 0..nnz {
                weights.push(match c {
                    0 => 1.0,
                    1 => (2.0 * angle).cos(),
                    2 => (2.0 * angle).sin(),
                    _ => rng.random_range(-1.0..1.0),
                });
            }
        }

        let det_data = (0..n_det * n_samp)
            .map(|_| rng.random_range(-1.0..1.0))
            .collect();
        let det_flags = (0..n_pair_rows * n_samp)
            .map(|_| random_flag(&mut rng, config.det_flag_rate))
            .collect();
        let shared_flags = (0..n_samp)
            .map(|_| random_flag(&mut rng, config.shared_flag_rate))
            .collect();
        let det_scale = (0..n_det).map(|_| rng.random_range(0.5..2.0)).collect();

        let (global2local, n_local_submap) =
            random_ownership(&mut rng, config.n_global_submap, config.owned_fraction);
        let intervals = random_intervals(&mut rng, n_samp, config.n_intervals);

        Self {
            config: config.clone(),
            pixel_index,
            weight_index,
            flag_index,
            data_index,
            pixels,
            weights,
            det_data,
            det_flags,
            det_scale,
            shared_flags,
            global2local,
            n_local_submap,
            intervals,
        }
    }

    pub fn projection(&self) -> Projection<'_> {
        Projection {
            pixel_index: &self.pixel_index,
            weight_index: &self.weight_index,
            flag_index: &self.flag_index,
            data_index: &self.data_index,
            pixels: &self.pixels,
            weights: &self.weights,
            det_data: &self.det_data,
            det_flags: &self.det_flags,
            det_scale: &self.det_scale,
            shared_flags: &self.shared_flags,
            n_samp: self.config.n_samp,
            nnz: self.config.nnz,
        }
    }

    pub fn layout(&self) -> Result<SubmapLayout<'_>> {
        SubmapLayout::new(
            &self.global2local,
            self.config.n_pix_submap,
            self.n_local_submap,
        )
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Zeroed accumulator matching [`layout`](Self::layout).
    pub fn new_zmap(&self) -> Result<ZMap> {
        Ok(ZMap::for_layout(&self.layout()?, self.config.nnz))
    }
}

fn random_flag(rng: &mut StdRng, rate: f64) -> u8 {
    let mut flag = 0;
    if rng.random_bool(rate) {
        flag |= FLAG_INVALID;
    }
    if rng.random_bool(0.05) {
        flag |= FLAG_TURNAROUND;
    }
    flag
}

/// Returns the translation table and the number of owned submaps. Owned
/// submaps get local slots in shuffled order.
fn random_ownership(rng: &mut StdRng, n_global: usize, owned_fraction: f64) -> (Vec<i64>, usize) {
    let mut owned: Vec<usize> = (0..n_global)
        .filter(|_| rng.random_bool(owned_fraction.clamp(0.0, 1.0)))
        .collect();
    if owned.is_empty() && n_global > 0 {
        owned.push(rng.random_range(0..n_global));
    }
    owned.shuffle(rng);

    let mut global2local = vec![-1i64; n_global];
    for (local, &global) in owned.iter().enumerate() {
        global2local[global] = local as i64;
    }
    (global2local, owned.len())
}

/// Splits `0..n_samp` into `count` ordered intervals separated by gaps.
fn random_intervals(rng: &mut StdRng, n_samp: usize, count: usize) -> Vec<Interval> {
    if n_samp == 0 || count == 0 {
        return Vec::new();
    }
    let span = (n_samp / count).max(1);
    (0..count)
        .filter_map(|k| {
            let start = k * span;
            let stop = if k + 1 == count { n_samp } else { (start + span).min(n_samp) };
            let gap = rng.random_range(0..=(stop.saturating_sub(start)) / 8);
            Interval::from_span(start + gap, stop - gap / 2)
        })
        .collect()
}

//! Per-sample accumulation kernel.
//!
//! A sample of detector `d` at time `t` contributes
//! `data[t] * scale[d] * weights[t, c]` to component `c` of the pixel it points
//! at, provided the pointing is valid, neither flag mask matches and the
//! pixel's submap is stored locally.

use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::config::FlagMasks;
use crate::inputs::DetectorView;
use crate::layout::SubmapLayout;

/// An accepted sample, resolved to its place in the accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Flat accumulator offset of component 0.
    pub offset: usize,
    /// Factor applied to every weight component.
    pub scale: f64,
    /// Offset of the `nnz` weight components in the value source.
    pub source: usize,
}

/// Why a sample did not contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Skip {
    /// Negative pixel index.
    InvalidPointing,
    DetectorFlagged,
    SharedFlagged,
    /// Pixel belongs to a submap this process does not store.
    NotLocal,
}

/// Evaluates the gate for sample `isamp` of one detector.
///
/// Pure: reads only its inputs and writes nothing. Conditions are checked in
/// the order pointing, detector flags, shared flags, ownership; the first one
/// that fails is reported.
#[inline]
pub fn resolve_sample(
    view: &DetectorView<'_>,
    layout: &SubmapLayout<'_>,
    shared_flags: &[u8],
    masks: FlagMasks,
    nnz: usize,
    isamp: usize,
) -> Result<Hit, Skip> {
    let pixel = view.pixels[isamp];
    if pixel < 0 {
        return Err(Skip::InvalidPointing);
    }
    if view.flags[isamp] & masks.det != 0 {
        return Err(Skip::DetectorFlagged);
    }
    if shared_flags[isamp] & masks.shared != 0 {
        return Err(Skip::SharedFlagged);
    }
    let location = layout.locate(pixel).ok_or(Skip::NotLocal)?;

    Ok(Hit {
        offset: location.zmap_offset(layout.n_pix_submap(), nnz),
        scale: view.data[isamp] * view.scale,
        source: view.weight_offset + isamp * nnz,
    })
}

/// Adds `scale * weights[c]` to `target[c]` for every component.
#[inline]
pub fn apply_hit(target: &mut [f64], scale: f64, weights: &[f64]) {
    debug_assert_eq!(target.len(), weights.len());
    for (z, &w) in target.iter_mut().zip(weights) {
        *z += scale * w;
    }
}

/// Resolves one sample and, if accepted, adds it into `zmap` (the flat
/// `[n_local_submap, n_pix_submap, nnz]` accumulator).
#[inline]
pub fn accumulate_sample(
    view: &DetectorView<'_>,
    layout: &SubmapLayout<'_>,
    shared_flags: &[u8],
    masks: FlagMasks,
    nnz: usize,
    isamp: usize,
    zmap: &mut [f64],
) -> Result<(), Skip> {
    let hit = resolve_sample(view, layout, shared_flags, masks, nnz, isamp)?;
    let weights = &view.weights[isamp * nnz..(isamp + 1) * nnz];
    apply_hit(&mut zmap[hit.offset..hit.offset + nnz], hit.scale, weights);
    Ok(())
}

// ============================================================================
// Sample statistics
// ============================================================================

/// Per-outcome sample counts of one projection call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SampleStats {
    pub accepted: u64,
    pub invalid_pointing: u64,
    pub detector_flagged: u64,
    pub shared_flagged: u64,
    pub not_local: u64,
}

impl SampleStats {
    /// Samples visited: accepted plus every skip reason.
    pub fn total(&self) -> u64 {
        self.accepted + self.skipped()
    }

    pub fn skipped(&self) -> u64 {
        self.invalid_pointing + self.detector_flagged + self.shared_flagged + self.not_local
    }

    pub fn record(&mut self, outcome: Result<(), Skip>) {
        match outcome {
            Ok(()) => self.accepted += 1,
            Err(Skip::InvalidPointing) => self.invalid_pointing += 1,
            Err(Skip::DetectorFlagged) => self.detector_flagged += 1,
            Err(Skip::SharedFlagged) => self.shared_flagged += 1,
            Err(Skip::NotLocal) => self.not_local += 1,
        }
    }

    pub fn log_summary(&self) {
        let total = self.total();
        if total == 0 {
            tracing::info!("No samples inside the requested intervals");
            return;
        }

        let accepted_percent = 100.0 * self.accepted as f64 / total as f64;
        tracing::info!(
            "Projected {} of {} samples ({:.1}%): {} invalid pointing, {} detector-flagged, {} shared-flagged, {} not local",
            self.accepted,
            total,
            accepted_percent,
            self.invalid_pointing,
            self.detector_flagged,
            self.shared_flagged,
            self.not_local
        );

        if self.not_local > 0 {
            tracing::debug!(
                "{} samples pointed at submaps missing from the local layout",
                self.not_local
            );
        }
    }
}

impl AddAssign for SampleStats {
    fn add_assign(&mut self, other: Self) {
        self.accepted += other.accepted;
        self.invalid_pointing += other.invalid_pointing;
        self.detector_flagged += other.detector_flagged;
        self.shared_flagged += other.shared_flagged;
        self.not_local += other.not_local;
    }
}

/// Thread-safe skip counters filled while resolving samples in parallel.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    invalid_pointing: AtomicU64,
    detector_flagged: AtomicU64,
    shared_flagged: AtomicU64,
    not_local: AtomicU64,
}

impl StatsRecorder {
    #[inline]
    pub(crate) fn record_skip(&self, skip: Skip) {
        let counter = match skip {
            Skip::InvalidPointing => &self.invalid_pointing,
            Skip::DetectorFlagged => &self.detector_flagged,
            Skip::SharedFlagged => &self.shared_flagged,
            Skip::NotLocal => &self.not_local,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn finish(self, accepted: usize) -> SampleStats {
        SampleStats {
            accepted: accepted as u64,
            invalid_pointing: self.invalid_pointing.into_inner(),
            detector_flagged: self.detector_flagged.into_inner(),
            shared_flagged: self.shared_flagged.into_inner(),
            not_local: self.not_local.into_inner(),
        }
    }
}

//! Phase 1 on the host: resolve samples in parallel with rayon.

use common::parallel::auto_chunk_size;
use rayon::prelude::*;

use super::merge::Merger;
use crate::config::NoiseWeightedConfig;
use crate::inputs::CheckedProjection;
use crate::interval::Interval;
use crate::kernel::{resolve_sample, Hit, StatsRecorder};
use crate::layout::SubmapLayout;

/// Resolves all `(detector, interval, sample)` triples and feeds the hits to
/// `merger`.
///
/// Detectors and intervals are walked in order; the samples of each interval
/// are split across the thread pool. At most `config.hit_budget()` hits are
/// held at once: the buffer is merged and reused whenever it fills, so memory
/// does not grow with the number of samples.
pub(crate) fn project(
    checked: &CheckedProjection<'_>,
    layout: &SubmapLayout<'_>,
    intervals: &[Interval],
    config: &NoiseWeightedConfig,
    merger: &mut Merger<'_>,
) {
    let shape = checked.shape();
    let nnz = shape.nnz;
    let masks = config.masks();
    let budget = config.hit_budget();
    let projection = checked.projection();
    let shared_flags = projection.shared_flags;
    let recorder = StatsRecorder::default();
    let mut accepted = 0;
    let mut hits: Vec<Hit> = Vec::new();

    for idet in 0..shape.n_det {
        let view = checked.detector(idet);
        for interval in intervals {
            let min_len = match config.min_samples_per_task {
                0 => auto_chunk_size(interval.sample_count()),
                n => n,
            };
            let mut samples = interval.range();
            while !samples.is_empty() {
                if hits.len() == budget {
                    accepted += hits.len();
                    merger.apply(&hits, projection.weights);
                    hits.clear();
                }

                let end = samples.start + (budget - hits.len()).min(samples.len());
                hits.par_extend(
                    (samples.start..end)
                        .into_par_iter()
                        .with_min_len(min_len)
                        .filter_map(|isamp| {
                            resolve_sample(&view, layout, shared_flags, masks, nnz, isamp)
                                .map_err(|skip| recorder.record_skip(skip))
                                .ok()
                        }),
                );
                samples.start = end;
            }
        }
    }

    accepted += hits.len();
    merger.apply(&hits, projection.weights);
    merger.add_stats(recorder.finish(accepted));
}

//! Phase 2: apply resolved hits to the accumulator.
//!
//! Hits arrive in bounded batches, each in detector/interval/sample order.
//! Inside a batch they are grouped by destination local submap and each
//! submap is updated by exactly one task, keeping the order they were resolved
//! in. Batches are applied one after another, so every accumulator element
//! receives its additions in the same order as a serial
//! detector/interval/sample loop.

use common::parallel::{par_for_each_bucket_mut, Buckets};

use crate::kernel::{apply_hit, Hit, SampleStats};
use crate::zmap::ZMap;

/// Applies hit batches to one accumulator and sums their statistics.
#[derive(Debug)]
pub(crate) struct Merger<'z> {
    zmap: &'z mut ZMap,
    stats: SampleStats,
    batches: usize,
}

impl<'z> Merger<'z> {
    pub fn new(zmap: &'z mut ZMap) -> Self {
        Self {
            zmap,
            stats: SampleStats::default(),
            batches: 0,
        }
    }

    /// Adds `hits` into the accumulator. `values` holds the weight components
    /// addressed by [`Hit::source`].
    pub fn apply(&mut self, hits: &[Hit], values: &[f64]) {
        let nnz = self.zmap.nnz();
        let submap_len = self.zmap.submap_len();
        let n_local_submap = self.zmap.n_local_submap();
        if hits.is_empty() || submap_len == 0 {
            return;
        }
        self.batches += 1;

        let buckets = Buckets::group_by(hits, n_local_submap, |hit| hit.offset / submap_len);
        tracing::trace!(
            "Merging {} hits into {} of {} local submaps",
            buckets.len(),
            buckets.occupied(),
            n_local_submap
        );

        par_for_each_bucket_mut(
            self.zmap.values_mut(),
            submap_len,
            &buckets,
            |submap, target, members| {
                let base = submap * submap_len;
                for &member in members {
                    let hit = &hits[member];
                    let offset = hit.offset - base;
                    apply_hit(
                        &mut target[offset..offset + nnz],
                        hit.scale,
                        &values[hit.source..hit.source + nnz],
                    );
                }
            },
        );
    }

    pub fn add_stats(&mut self, stats: SampleStats) {
        self.stats += stats;
    }

    pub fn finish(self) -> SampleStats {
        tracing::debug!("Merged {} hit batches", self.batches);
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batches_apply_in_order() {
        let mut zmap = ZMap::new(2, 2, 1);
        let values = [1.0, 2.0];
        let mut merger = Merger::new(&mut zmap);

        merger.apply(
            &[
                Hit {
                    offset: 3,
                    scale: 2.0,
                    source: 0,
                },
                Hit {
                    offset: 0,
                    scale: 1.0,
                    source: 1,
                },
            ],
            &values,
        );
        merger.apply(
            &[Hit {
                offset: 3,
                scale: 0.5,
                source: 1,
            }],
            &values,
        );
        merger.apply(&[], &values);
        merger.add_stats(SampleStats {
            accepted: 3,
            ..SampleStats::default()
        });
        let stats = merger.finish();

        assert_eq!(stats.accepted, 3);
        assert_eq!(zmap.values(), &[2.0, 0.0, 0.0, 3.0]);
    }
}

//! Drives the projection over detectors, intervals and samples.
//!
//! Both execution paths run in two phases over bounded batches. Phase 1
//! resolves work items to [`Hit`](crate::kernel::Hit)s or skip reasons without
//! writing anything shared, on the host thread pool or on the accelerator.
//! Phase 2 partitions each batch by local submap and applies it in parallel,
//! one task per submap. Batches are merged in order, so the host result is
//! bit-identical to [`build_noise_weighted_serial`].

mod host;
mod merge;
#[cfg(test)]
mod tests;

use serde::Serialize;

use crate::config::NoiseWeightedConfig;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::inputs::{CheckedProjection, Projection};
use crate::interval::{total_samples, validate_intervals, Interval};
use crate::kernel::{accumulate_sample, SampleStats};
use crate::layout::SubmapLayout;
use crate::zmap::ZMap;

pub(crate) use self::merge::Merger;

/// Where phase 1 ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Backend {
    Host,
    Accelerator,
}

/// Outcome of one projection call. The accumulated values live in the `zmap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectionReport {
    pub backend: Backend,
    pub stats: SampleStats,
}

/// Adds the noise-weighted projection of all valid samples into `zmap`.
///
/// Inputs are validated first; on error `zmap` is left untouched. Invalid,
/// flagged and unowned samples are skipped silently and counted in the
/// report. When `config.use_accel` is set and `ctx` has an accelerator the
/// samples are resolved on the device; if the device fails, `zmap` is
/// restored and the whole call runs on the host.
pub fn build_noise_weighted(
    ctx: &ExecutionContext,
    projection: &Projection<'_>,
    layout: &SubmapLayout<'_>,
    intervals: &[Interval],
    config: &NoiseWeightedConfig,
    zmap: &mut ZMap,
) -> Result<ProjectionReport> {
    let _span = tracing::info_span!(
        "build_noise_weighted",
        n_det = projection.n_det(),
        n_view = intervals.len()
    )
    .entered();

    let checked = prepare(projection, layout, intervals, zmap)?;

    let backend = select_backend(ctx, config);
    tracing::debug!(
        "Resolving {} samples for {} detectors on {:?}",
        total_samples(intervals),
        checked.shape().n_det,
        backend
    );

    let (backend, stats) = match backend {
        #[cfg(feature = "accel")]
        Backend::Accelerator => run_with_fallback(
            zmap,
            |merger| {
                let accel = ctx.accelerator().ok_or(crate::accel::DeviceError::Unavailable)?;
                crate::accel::resolve_on_device(accel, &checked, layout, intervals, config, merger)
            },
            |merger| host::project(&checked, layout, intervals, config, merger),
        ),
        _ => {
            let mut merger = Merger::new(zmap);
            host::project(&checked, layout, intervals, config, &mut merger);
            (Backend::Host, merger.finish())
        }
    };
    stats.log_summary();

    Ok(ProjectionReport { backend, stats })
}

/// Runs `device` and, if it fails, undoes whatever it merged and runs `host`
/// instead.
///
/// The device merges its batches as they arrive, so `zmap` is snapshotted
/// first. The snapshot costs one accumulator, independent of the number of
/// samples.
#[cfg(feature = "accel")]
fn run_with_fallback<D, H>(zmap: &mut ZMap, device: D, host: H) -> (Backend, SampleStats)
where
    D: FnOnce(&mut Merger<'_>) -> std::result::Result<(), crate::accel::DeviceError>,
    H: FnOnce(&mut Merger<'_>),
{
    let snapshot = zmap.clone();
    let mut merger = Merger::new(zmap);
    match device(&mut merger) {
        Ok(()) => (Backend::Accelerator, merger.finish()),
        Err(err) => {
            tracing::warn!("Accelerator projection failed, falling back to host: {}", err);
            *zmap = snapshot;
            let mut merger = Merger::new(zmap);
            host(&mut merger);
            (Backend::Host, merger.finish())
        }
    }
}

/// Single-threaded reference: evaluates the kernel in plain
/// detector/interval/sample loop order, writing straight into `zmap`.
pub fn build_noise_weighted_serial(
    projection: &Projection<'_>,
    layout: &SubmapLayout<'_>,
    intervals: &[Interval],
    config: &NoiseWeightedConfig,
    zmap: &mut ZMap,
) -> Result<ProjectionReport> {
    let checked = prepare(projection, layout, intervals, zmap)?;
    let masks = config.masks();
    let nnz = checked.shape().nnz;
    let shared_flags = projection.shared_flags;
    let values = zmap.values_mut();
    let mut stats = SampleStats::default();

    for idet in 0..checked.shape().n_det {
        let view = checked.detector(idet);
        for interval in intervals {
            for isamp in interval.samples() {
                stats.record(accumulate_sample(
                    &view,
                    layout,
                    shared_flags,
                    masks,
                    nnz,
                    isamp,
                    values,
                ));
            }
        }
    }

    Ok(ProjectionReport {
        backend: Backend::Host,
        stats,
    })
}

/// Picks the backend for one call. Never fails: without an accelerator the
/// host is used even when `use_accel` is set.
pub fn select_backend(ctx: &ExecutionContext, config: &NoiseWeightedConfig) -> Backend {
    match (config.use_accel, ctx.has_accelerator()) {
        (true, true) => Backend::Accelerator,
        (true, false) => {
            tracing::debug!("Accelerator requested but none is active, using host");
            Backend::Host
        }
        (false, _) => Backend::Host,
    }
}

fn prepare<'a>(
    projection: &Projection<'a>,
    layout: &SubmapLayout<'_>,
    intervals: &[Interval],
    zmap: &ZMap,
) -> Result<CheckedProjection<'a>> {
    let checked = projection.validate()?;
    validate_intervals(intervals, checked.shape().n_samp)?;
    zmap.check_layout(layout, checked.shape().nnz)?;
    Ok(checked)
}

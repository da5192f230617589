use super::*;
use crate::config::NoiseWeightedConfig;
use crate::error::Error;
use crate::sim::{ScanConfig, SimulatedScan};

/// Owned inputs for hand-written scenarios. One row per detector unless a
/// test overrides the index tables.
struct Fixture {
    pixel_index: Vec<i32>,
    weight_index: Vec<i32>,
    flag_index: Vec<i32>,
    data_index: Vec<i32>,
    pixels: Vec<i64>,
    weights: Vec<f64>,
    det_data: Vec<f64>,
    det_flags: Vec<u8>,
    det_scale: Vec<f64>,
    shared_flags: Vec<u8>,
    global2local: Vec<i64>,
    n_samp: usize,
    nnz: usize,
    n_pix_submap: usize,
    n_local_submap: usize,
}

impl Fixture {
    /// 1 detector, 4 samples, `n_pix_submap = 10`, two owned submaps.
    fn worked_example() -> Self {
        Self {
            pixel_index: vec![0],
            weight_index: vec![0],
            flag_index: vec![0],
            data_index: vec![0],
            pixels: vec![5, 5, -1, 15],
            weights: vec![1.0; 4],
            det_data: vec![2.0, 3.0, 0.0, 4.0],
            det_flags: vec![0; 4],
            det_scale: vec![1.0],
            shared_flags: vec![0; 4],
            global2local: vec![0, 1],
            n_samp: 4,
            nnz: 1,
            n_pix_submap: 10,
            n_local_submap: 2,
        }
    }

    fn projection(&self) -> Projection<'_> {
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
            n_samp: self.n_samp,
            nnz: self.nnz,
        }
    }

    fn layout(&self) -> SubmapLayout<'_> {
        SubmapLayout::new(&self.global2local, self.n_pix_submap, self.n_local_submap).unwrap()
    }

    fn zmap(&self) -> ZMap {
        ZMap::for_layout(&self.layout(), self.nnz)
    }

    fn all_samples(&self) -> Vec<Interval> {
        vec![Interval::new(0, self.n_samp - 1).unwrap()]
    }

    fn run(
        &self,
        intervals: &[Interval],
        config: &NoiseWeightedConfig,
    ) -> (ZMap, ProjectionReport) {
        let mut zmap = self.zmap();
        let report = build_noise_weighted(
            &ExecutionContext::host_only(),
            &self.projection(),
            &self.layout(),
            intervals,
            config,
            &mut zmap,
        )
        .unwrap();
        (zmap, report)
    }
}

fn run_serial(scan: &SimulatedScan, config: &NoiseWeightedConfig) -> (ZMap, ProjectionReport) {
    let mut zmap = scan.new_zmap().unwrap();
    let report = build_noise_weighted_serial(
        &scan.projection(),
        &scan.layout().unwrap(),
        scan.intervals(),
        config,
        &mut zmap,
    )
    .unwrap();
    (zmap, report)
}

fn run_parallel(
    ctx: &ExecutionContext,
    scan: &SimulatedScan,
    config: &NoiseWeightedConfig,
) -> (ZMap, ProjectionReport) {
    let mut zmap = scan.new_zmap().unwrap();
    let report = build_noise_weighted(
        ctx,
        &scan.projection(),
        &scan.layout().unwrap(),
        scan.intervals(),
        config,
        &mut zmap,
    )
    .unwrap();
    (zmap, report)
}

#[test]
fn test_worked_example() {
    let fixture = Fixture::worked_example();
    let (zmap, report) = fixture.run(&fixture.all_samples(), &NoiseWeightedConfig::default());

    assert_eq!(zmap.get(0, 5, 0), 5.0);
    assert_eq!(zmap.get(1, 5, 0), 4.0);
    assert_eq!(zmap.values().iter().filter(|&&v| v != 0.0).count(), 2);

    assert_eq!(report.backend, Backend::Host);
    assert_eq!(report.stats.accepted, 3);
    assert_eq!(report.stats.invalid_pointing, 1);
    assert_eq!(report.stats.total(), 4);
}

#[test]
fn test_serial_matches_worked_example() {
    let fixture = Fixture::worked_example();
    let mut zmap = fixture.zmap();
    build_noise_weighted_serial(
        &fixture.projection(),
        &fixture.layout(),
        &fixture.all_samples(),
        &NoiseWeightedConfig::default(),
        &mut zmap,
    )
    .unwrap();

    assert_eq!(zmap.get(0, 5, 0), 5.0);
    assert_eq!(zmap.get(1, 5, 0), 4.0);
}

#[test]
fn test_accumulation_uses_scale_and_weights() {
    let mut fixture = Fixture::worked_example();
    fixture.nnz = 3;
    fixture.weights = vec![
        1.0, 0.5, -0.5, //
        1.0, 0.0, 1.0, //
        1.0, 1.0, 1.0, //
        1.0, -1.0, 0.25,
    ];
    fixture.det_scale = vec![0.5];

    let (zmap, _) = fixture.run(&fixture.all_samples(), &NoiseWeightedConfig::default());

    // samples 0 and 1 land in pixel 5 of local submap 0
    assert_eq!(zmap.pixel(0, 5), &[2.5, 0.5, 1.0]);
    assert_eq!(zmap.pixel(1, 5), &[2.0, -2.0, 0.5]);
}

#[test]
fn test_flag_gates() {
    let mut fixture = Fixture::worked_example();
    fixture.det_flags = vec![1, 0, 0, 0b100];
    fixture.shared_flags = vec![0, 0b10, 0, 0];

    let (zmap, report) = fixture.run(&fixture.all_samples(), &NoiseWeightedConfig::default());
    // sample 0 flagged, sample 1 shared flag not masked, sample 3 flag bit not masked
    assert_eq!(zmap.get(0, 5, 0), 3.0);
    assert_eq!(zmap.get(1, 5, 0), 4.0);
    assert_eq!(report.stats.detector_flagged, 1);

    let config = NoiseWeightedConfig::default()
        .with_det_flag_mask(0b101)
        .with_shared_flag_mask(0b10);
    let (zmap, report) = fixture.run(&fixture.all_samples(), &config);
    assert_eq!(zmap.values().iter().sum::<f64>(), 0.0);
    assert_eq!(report.stats.detector_flagged, 2);
    assert_eq!(report.stats.shared_flagged, 1);
    assert_eq!(report.stats.invalid_pointing, 1);
}

#[test]
fn test_interval_restriction() {
    let fixture = Fixture::worked_example();
    let intervals = [Interval::new(1, 1).unwrap(), Interval::new(3, 3).unwrap()];

    let (zmap, report) = fixture.run(&intervals, &NoiseWeightedConfig::default());
    assert_eq!(zmap.get(0, 5, 0), 3.0);
    assert_eq!(zmap.get(1, 5, 0), 4.0);
    assert_eq!(report.stats.total(), 2);
}

#[test]
fn test_no_intervals_is_noop() {
    let fixture = Fixture::worked_example();
    let (zmap, report) = fixture.run(&[], &NoiseWeightedConfig::default());

    assert!(zmap.values().iter().all(|&v| v == 0.0));
    assert_eq!(report.stats, SampleStats::default());
}

#[test]
fn test_submap_translation() {
    let mut fixture = Fixture::worked_example();
    // global 0 unowned, global 1 -> local 0, global 2 -> local 1
    fixture.global2local = vec![-1, 0, 1];
    fixture.pixels = vec![12, 27, 5, 30];

    let (zmap, report) = fixture.run(&fixture.all_samples(), &NoiseWeightedConfig::default());
    assert_eq!(zmap.get(0, 2, 0), 2.0);
    assert_eq!(zmap.get(1, 7, 0), 3.0);
    assert_eq!(report.stats.not_local, 2);
    assert_eq!(report.stats.accepted, 2);
}

#[test]
fn test_unowned_local_slot_is_skipped() {
    let mut fixture = Fixture::worked_example();
    // global 1 maps past the end of the local accumulator
    fixture.global2local = vec![0, 2];

    let (zmap, report) = fixture.run(&fixture.all_samples(), &NoiseWeightedConfig::default());
    assert_eq!(zmap.get(0, 5, 0), 5.0);
    assert!(zmap.submap(1).iter().all(|&v| v == 0.0));
    assert_eq!(report.stats.not_local, 1);
}

#[test]
fn test_aliased_rows_contribute_per_detector() {
    let mut fixture = Fixture::worked_example();
    fixture.pixel_index = vec![0, 0];
    fixture.weight_index = vec![0, 0];
    fixture.flag_index = vec![0, 0];
    fixture.data_index = vec![0, 0];
    fixture.det_scale = vec![1.0, 2.0];

    let (zmap, report) = fixture.run(&fixture.all_samples(), &NoiseWeightedConfig::default());
    assert_eq!(zmap.get(0, 5, 0), 15.0);
    assert_eq!(zmap.get(1, 5, 0), 12.0);
    assert_eq!(report.stats.accepted, 6);
}

#[test]
fn test_adds_to_existing_values() {
    let fixture = Fixture::worked_example();
    let mut zmap = ZMap::from_values(2, 10, 1, vec![1.0; 20]).unwrap();

    build_noise_weighted(
        &ExecutionContext::host_only(),
        &fixture.projection(),
        &fixture.layout(),
        &fixture.all_samples(),
        &NoiseWeightedConfig::default(),
        &mut zmap,
    )
    .unwrap();

    assert_eq!(zmap.get(0, 5, 0), 6.0);
    assert_eq!(zmap.get(1, 5, 0), 5.0);
    assert_eq!(zmap.get(1, 4, 0), 1.0);
}

#[test]
fn test_fully_flagged_scan_is_noop() {
    let mut fixture = Fixture::worked_example();
    fixture.shared_flags = vec![1; 4];
    let mut zmap = ZMap::from_values(2, 10, 1, (0..20).map(|v| v as f64).collect()).unwrap();
    let before = zmap.clone();

    let report = build_noise_weighted(
        &ExecutionContext::host_only(),
        &fixture.projection(),
        &fixture.layout(),
        &fixture.all_samples(),
        &NoiseWeightedConfig::default(),
        &mut zmap,
    )
    .unwrap();

    assert_eq!(zmap, before);
    assert_eq!(report.stats.accepted, 0);
    assert_eq!(report.stats.shared_flagged, 3);
}

#[test]
fn test_validation_errors_leave_zmap_untouched() {
    let fixture = Fixture::worked_example();
    let ctx = ExecutionContext::host_only();
    let config = NoiseWeightedConfig::default();
    let mut zmap = ZMap::from_values(2, 10, 1, vec![3.0; 20]).unwrap();
    let before = zmap.clone();

    let out_of_range = [Interval::new(2, 4).unwrap()];
    let err = build_noise_weighted(
        &ctx,
        &fixture.projection(),
        &fixture.layout(),
        &out_of_range,
        &config,
        &mut zmap,
    )
    .unwrap_err();
    assert!(matches!(err, Error::IntervalOutOfRange { last: 4, .. }));

    let mut bad_rows = Fixture::worked_example();
    bad_rows.pixel_index = vec![1];
    let err = build_noise_weighted(
        &ctx,
        &bad_rows.projection(),
        &bad_rows.layout(),
        &bad_rows.all_samples(),
        &config,
        &mut zmap,
    )
    .unwrap_err();
    assert!(matches!(err, Error::RowOutOfRange { table: "pixel_index", .. }));

    assert_eq!(zmap, before);

    let mut wrong_shape = ZMap::new(2, 10, 3);
    let err = build_noise_weighted_serial(
        &fixture.projection(),
        &fixture.layout(),
        &fixture.all_samples(),
        &config,
        &mut wrong_shape,
    )
    .unwrap_err();
    assert_eq!(
        err,
        Error::ZMapShape {
            expected: [2, 10, 1],
            actual: [2, 10, 3]
        }
    );
}

#[test]
fn test_parallel_matches_serial_bitwise() {
    let ctx = ExecutionContext::host_only();
    for seed in [1, 2, 3] {
        let scan = SimulatedScan::generate(
            &ScanConfig::default()
                .with_detectors(6)
                .with_samples(3000)
                .with_seed(seed),
        );

        for min_samples in [0, 1, 17] {
            let config = NoiseWeightedConfig::default().with_min_samples_per_task(min_samples);
            let (serial, serial_report) = run_serial(&scan, &config);
            let (parallel, parallel_report) = run_parallel(&ctx, &scan, &config);

            assert_eq!(serial_report.stats, parallel_report.stats);
            assert!(
                serial
                    .values()
                    .iter()
                    .zip(parallel.values())
                    .all(|(a, b)| a.to_bits() == b.to_bits()),
                "seed {} min_samples {}: parallel result differs from serial",
                seed,
                min_samples
            );
        }
    }
}

#[test]
fn test_bounded_hit_batches_match_serial_bitwise() {
    let ctx = ExecutionContext::host_only();
    let scan = SimulatedScan::generate(
        &ScanConfig::default()
            .with_detectors(4)
            .with_samples(1500)
            .with_nnz(3)
            .with_seed(11),
    );
    let (serial, serial_report) = run_serial(&scan, &NoiseWeightedConfig::default());

    for max_hits in [1, 7, 250, 1 << 20] {
        let config = NoiseWeightedConfig::default()
            .with_max_hits_per_batch(max_hits)
            .with_min_samples_per_task(5);
        let (batched, report) = run_parallel(&ctx, &scan, &config);

        assert_eq!(report.stats, serial_report.stats, "max_hits {}", max_hits);
        assert!(
            serial
                .values()
                .iter()
                .zip(batched.values())
                .all(|(a, b)| a.to_bits() == b.to_bits()),
            "max_hits {}: batched result differs from serial",
            max_hits
        );
    }
}

#[test]
fn test_detectors_without_samples_is_noop() {
    let fixture = Fixture {
        pixel_index: vec![0, 0, 1],
        weight_index: vec![0, 1, 0],
        flag_index: vec![0, 0, 0],
        data_index: vec![2, 0, 1],
        pixels: vec![],
        weights: vec![],
        det_data: vec![],
        det_flags: vec![],
        det_scale: vec![1.0, 2.0, 3.0],
        shared_flags: vec![],
        n_samp: 0,
        ..Fixture::worked_example()
    };
    let mut zmap = ZMap::from_values(2, 10, 1, vec![0.5; 20]).unwrap();
    let before = zmap.clone();

    let report = build_noise_weighted(
        &ExecutionContext::host_only(),
        &fixture.projection(),
        &fixture.layout(),
        &[],
        &NoiseWeightedConfig::default(),
        &mut zmap,
    )
    .unwrap();

    assert_eq!(zmap, before);
    assert_eq!(report.stats, SampleStats::default());

    build_noise_weighted_serial(
        &fixture.projection(),
        &fixture.layout(),
        &[],
        &NoiseWeightedConfig::default(),
        &mut zmap,
    )
    .unwrap();
    assert_eq!(zmap, before);
}

#[test]
fn test_simulated_scan_counts_every_sample() {
    let scan = SimulatedScan::generate(&ScanConfig::default().with_owned_fraction(0.5));
    let (_, report) = run_serial(&scan, &NoiseWeightedConfig::default());

    let expected = (scan.config.n_det * total_samples(scan.intervals())) as u64;
    assert_eq!(report.stats.total(), expected);
    assert!(report.stats.accepted > 0);
    assert!(report.stats.not_local > 0);
    assert!(report.stats.invalid_pointing > 0);
}

#[test]
fn test_accel_requested_without_device_uses_host() {
    let fixture = Fixture::worked_example();
    let config = NoiseWeightedConfig::default().with_accel(true);
    let (zmap, report) = fixture.run(&fixture.all_samples(), &config);

    assert_eq!(report.backend, Backend::Host);
    assert_eq!(zmap.get(0, 5, 0), 5.0);
    assert_eq!(
        select_backend(&ExecutionContext::host_only(), &config),
        Backend::Host
    );
}

#[cfg(feature = "accel")]
#[test]
fn test_device_failure_restores_zmap_and_runs_host() {
    use crate::accel::DeviceError;
    use crate::kernel::Hit;

    let scan = SimulatedScan::generate(&ScanConfig::default().with_detectors(3).with_seed(5));
    let config = NoiseWeightedConfig::default().with_max_hits_per_batch(64);
    let (serial, serial_report) = run_serial(&scan, &config);

    let projection = scan.projection();
    let layout = scan.layout().unwrap();
    let mut zmap = scan.new_zmap().unwrap();
    let checked = prepare(&projection, &layout, scan.intervals(), &zmap).unwrap();

    let (backend, stats) = run_with_fallback(
        &mut zmap,
        |merger| {
            // part of the work lands before the device gives up
            let hit = Hit {
                offset: 0,
                scale: 1.0e6,
                source: 0,
            };
            merger.apply(&[hit; 4], &[1.0; 8]);
            merger.add_stats(SampleStats {
                accepted: 4,
                ..SampleStats::default()
            });
            Err(DeviceError::Validation("lost device".to_string()))
        },
        |merger| host::project(&checked, &layout, scan.intervals(), &config, merger),
    );

    assert_eq!(backend, Backend::Host);
    assert_eq!(stats, serial_report.stats);
    assert!(
        serial
            .values()
            .iter()
            .zip(zmap.values())
            .all(|(a, b)| a.to_bits() == b.to_bits()),
        "fallback result differs from serial"
    );
}

#[cfg(feature = "accel")]
#[test]
fn test_device_success_skips_host() {
    let fixture = Fixture::worked_example();
    let mut zmap = fixture.zmap();

    let (backend, stats) = run_with_fallback(
        &mut zmap,
        |merger| {
            merger.add_stats(SampleStats {
                accepted: 1,
                ..SampleStats::default()
            });
            Ok(())
        },
        |_| panic!("host path must not run"),
    );

    assert_eq!(backend, Backend::Accelerator);
    assert_eq!(stats.accepted, 1);
    assert!(zmap.values().iter().all(|&v| v == 0.0));
}

#[cfg(feature = "accel")]
#[test]
fn test_accelerator_matches_host() {
    use common::FloatExt;

    let ctx = ExecutionContext::new();
    if !ctx.has_accelerator() {
        eprintln!("No accelerator available, skipping");
        return;
    }

    let scan = SimulatedScan::generate(&ScanConfig::default().with_detectors(5).with_samples(2000));
    let config = NoiseWeightedConfig::default().with_accel(true);
    let (host, host_report) = run_serial(&scan, &config);
    let (device, device_report) = run_parallel(&ctx, &scan, &config);

    assert_eq!(host_report.stats, device_report.stats);
    for (a, b) in host.values().iter().zip(device.values()) {
        assert!(a.approximately_eq(*b, 1e-12), "host {} vs accelerator {}", a, b);
    }

    let fixture = Fixture::worked_example();
    let mut zmap = fixture.zmap();
    build_noise_weighted(
        &ctx,
        &fixture.projection(),
        &fixture.layout(),
        &fixture.all_samples(),
        &config,
        &mut zmap,
    )
    .unwrap();
    assert_eq!(zmap.get(0, 5, 0), 5.0);
    assert_eq!(zmap.get(1, 5, 0), 4.0);
}

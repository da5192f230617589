//! Simulates a scan and projects it into a local map.
//!
//! Runs the serial reference, the parallel host path and, with `--accel`, the
//! accelerator path, then logs timings, sample statistics and the largest
//! difference between the resulting maps.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin project_scan -- [n_det] [n_samp] [--accel] [--config projection.yml]
//! ```
//!
//! The optional YAML file holds a `NoiseWeightedConfig`; missing keys keep
//! their defaults. Set `MAPMAKER_LOG_DIR` to also write daily log files.

use std::env;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use common::float_ext::max_abs_diff;
use common::log_setup::{LogConfig, setup_logging};
use mapmaker::sim::{ScanConfig, SimulatedScan};
use mapmaker::{
    ExecutionContext, NoiseWeightedConfig, ZMap, build_noise_weighted, build_noise_weighted_serial,
};

struct Args {
    n_det: usize,
    n_samp: usize,
    accel: bool,
    config_path: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        n_det: 64,
        n_samp: 100_000,
        accel: false,
        config_path: None,
    };
    let mut positional = 0;
    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--accel" => args.accel = true,
            "--config" => {
                args.config_path = Some(iter.next().context("--config needs a path")?);
            }
            value => {
                let parsed: usize = value
                    .parse()
                    .with_context(|| format!("invalid argument '{}'", value))?;
                match positional {
                    0 => args.n_det = parsed,
                    1 => args.n_samp = parsed,
                    _ => bail!("unexpected argument '{}'", value),
                }
                positional += 1;
            }
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    let mut log_config = LogConfig::default();
    if let Ok(dir) = env::var("MAPMAKER_LOG_DIR") {
        log_config = log_config.with_log_dir(dir);
    }
    setup_logging(&log_config)?;

    let args = parse_args()?;
    let config = match &args.config_path {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path))?;
            NoiseWeightedConfig::from_yaml(&yaml)
                .with_context(|| format!("failed to parse {}", path))?
        }
        None => NoiseWeightedConfig::default(),
    }
    .with_accel(args.accel);

    let start = Instant::now();
    let scan = SimulatedScan::generate(
        &ScanConfig::default()
            .with_detectors(args.n_det)
            .with_samples(args.n_samp),
    );
    tracing::info!(
        n_det = args.n_det,
        n_samp = args.n_samp,
        intervals = scan.intervals().len(),
        local_submaps = scan.n_local_submap,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Simulated scan"
    );

    let projection = scan.projection();
    let layout = scan.layout()?;

    let mut reference = scan.new_zmap()?;
    let start = Instant::now();
    build_noise_weighted_serial(&projection, &layout, scan.intervals(), &config, &mut reference)?;
    tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "Serial projection");

    let ctx = if args.accel {
        ExecutionContext::new()
    } else {
        ExecutionContext::host_only()
    };
    let mut zmap: ZMap = scan.new_zmap()?;
    let start = Instant::now();
    let report = build_noise_weighted(
        &ctx,
        &projection,
        &layout,
        scan.intervals(),
        &config,
        &mut zmap,
    )?;
    tracing::info!(
        backend = ?report.backend,
        elapsed_ms = start.elapsed().as_millis() as u64,
        accepted = report.stats.accepted,
        skipped = report.stats.skipped(),
        "Parallel projection"
    );

    let diff = max_abs_diff(reference.values(), zmap.values());
    tracing::info!("Max abs difference to serial reference: {:e}", diff);
    if diff > 1e-9 {
        bail!("projection differs from serial reference by {}", diff);
    }

    Ok(())
}

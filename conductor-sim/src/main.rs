use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use conductor_core::collective::SingleRank;
use conductor_core::config::Config;
use conductor_core::grid::DenseGrid;
use conductor_core::poisson::JacobiPoissonSolver;
use conductor_core::ConductorCore;

/// Runs the embedded-conductor electrostatic core against an in-memory,
/// single-process grid/solver harness. Useful for exercising the public API
/// end-to-end and for manual experimentation; production runs drive
/// `conductor-core` directly from the surrounding MPI-parallel PIC code.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the YAML configuration document (spec §6).
    #[arg(long)]
    config: PathBuf,

    /// True (non-ghost) grid extent along each axis.
    #[arg(long, num_args = 3, default_values_t = [32usize, 32, 32])]
    grid_size: Vec<usize>,

    /// Number of ghost layers on every side of every axis.
    #[arg(long, default_value_t = 1)]
    ghost_layers: usize,

    /// Number of correction steps to run against a static, uniform phi.
    #[arg(long, default_value_t = 1)]
    steps: usize,
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    if let Err(err) = run() {
        log::error!("[rank 0] {err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_yaml_file(&args.config)
        .with_context(|| format!("loading configuration from '{}'", args.config.display()))?;
    log::info!("loaded configuration: poisson method = {}", config.methods.poisson);

    let true_size = [args.grid_size[0], args.grid_size[1], args.grid_size[2]];
    let grid = DenseGrid::<f64>::new(true_size, args.ghost_layers);
    let object_field = vec![0.0f64; grid.local_len()];

    let solver = JacobiPoissonSolver::default();
    let collective = SingleRank;

    let mut core = ConductorCore::init(&grid, object_field, false, false, &solver, &collective)
        .context("initializing the conductor core")?;
    log::info!(
        "conductor core initialized with {} object(s)",
        core.object_map().num_objects()
    );

    let mut phi = vec![0.0f64; grid.local_len()];
    let mut rho = vec![0.0f64; grid.local_len()];
    for step in 0..args.steps {
        core.correct_step(&phi, &mut rho, &collective)
            .with_context(|| format!("applying equipotential correction at step {step}"))?;
        phi.fill(0.0);
    }

    log::info!("completed {} correction step(s)", args.steps);
    Ok(())
}

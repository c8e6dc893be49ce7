//! SkyTrack simulator CLI
//!
//! Feeds simulated air-threat snapshots through the tracking registry.

use clap::Parser;
use skytrack_env::SystemClock;
use skytrack_sim::{RunExport, Scenario, SimConfig, SimError, SimRunner};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// SkyTrack simulation CLI
#[derive(Parser, Debug)]
#[command(name = "skytrack-sim")]
#[command(about = "Run seeded snapshot simulations against the SkyTrack registry", long_about = None)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Master seed for determinism (0 = random from time)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Scenario to run (mixed, drone_swarm, missile_salvo, region_alerts, all)
    #[arg(short = 'S', long)]
    scenario: Option<String>,

    /// Number of consecutive seeds to run (headless only)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Run length in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Seconds between snapshots
    #[arg(long)]
    snapshot_interval: Option<f64>,

    /// Seconds between dead-reckoning ticks
    #[arg(long)]
    tick_interval: Option<f64>,

    /// Samples kept per trajectory
    #[arg(long)]
    capacity: Option<usize>,

    /// Run on wall-clock time until the duration elapses or Ctrl-C
    #[arg(long)]
    live: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Write the full run export (frames, summary, trajectories) to this file
    #[arg(long)]
    export: Option<PathBuf>,
}

impl Args {
    fn base_config(&self) -> Result<SimConfig, SimError> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)?,
            None => SimConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(duration) = self.duration {
            config.duration_secs = duration;
        }
        if let Some(interval) = self.snapshot_interval {
            config.snapshot_interval_secs = interval;
        }
        if let Some(interval) = self.tick_interval {
            config.tick_interval_secs = interval;
        }
        if let Some(capacity) = self.capacity {
            config.tracking.trajectory_capacity = capacity;
        }
        if config.seed == 0 {
            config.seed = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(42);
        }
        config.validate()?;
        Ok(config)
    }

    fn scenarios(&self, config: &SimConfig) -> Result<Vec<Scenario>, SimError> {
        match self.scenario.as_deref() {
            None => Ok(vec![config.scenario]),
            Some("all") => Ok(Scenario::all()),
            Some(name) => name
                .parse()
                .map(|s| vec![s])
                .map_err(|e: String| SimError::InvalidConfig(format!("{e} (expected mixed, drone_swarm, missile_salvo, region_alerts or all)"))),
        }
    }
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match run(&args) {
        Ok(0) => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

/// Returns the number of failed runs.
fn run(args: &Args) -> Result<usize, SimError> {
    let config = args.base_config()?;
    let scenarios = args.scenarios(&config)?;

    if !args.json {
        info!("SkyTrack simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    if (args.export.is_some() || args.live) && (scenarios.len() > 1 || args.seeds > 1) {
        return Err(SimError::InvalidConfig(
            "--export and --live only support a single scenario and seed".to_string(),
        ));
    }

    let mut exports: Vec<RunExport> = Vec::new();
    for seed_offset in 0..args.seeds.max(1) {
        for scenario in &scenarios {
            let run_config = SimConfig {
                seed: config.seed.wrapping_add(seed_offset as u64),
                scenario: *scenario,
                ..config.clone()
            };
            let runner = SimRunner::new(run_config)?;
            let export = if args.live { run_live(&runner)? } else { runner.run()? };

            if !args.json {
                let s = &export.summary;
                if s.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), s.seed);
                } else {
                    error!("✗ {} (seed={}) FAILED: {}", scenario.name(), s.seed, s.violations.join("; "));
                }
            }
            exports.push(export);
        }
    }

    if let Some(path) = &args.export {
        if let Some(export) = exports.first() {
            export.write_to_file(path)?;
            info!("Exported {} frames to {}", export.frames.len(), path.display());
        }
    }

    let failed = exports.iter().filter(|e| !e.summary.passed).count();
    if args.json {
        let summaries: Vec<_> = exports.iter().map(|e| &e.summary).collect();
        let report = serde_json::json!({
            "total": exports.len(),
            "passed": exports.len() - failed,
            "failed": failed,
            "results": summaries,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if failed == 0 {
        info!("All {} runs passed", exports.len());
    } else {
        error!("{failed}/{} runs failed", exports.len());
    }

    Ok(failed)
}

fn run_live(runner: &SimRunner) -> Result<RunExport, SimError> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, runner.run_live(SystemClock::shared()))
}

//! PathMerge Simulator CLI
//!
//! Run deterministic merge scenarios, export frames, or sweep blend tuning.

use clap::Parser;
use pathmerge_core::MergerConfig;
use pathmerge_sim::{run_sweep_blocking, ScenarioId, ScenarioResult, ScenarioRunner, SweepGrid};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// PathMerge deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "pathmerge-sim")]
#[command(about = "Run deterministic path-merge scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (straight_cruise, curved_road, lane_change, stationary, noisy_planner, replan_jump, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated duration in seconds
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Merger configuration as JSON (missing fields keep their defaults)
    #[arg(short, long)]
    config: Option<String>,

    /// Export frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Sweep smoothing and weight exponent instead of a single run
    #[arg(long)]
    sweep: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("PathMerge Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let config = match &args.config {
        Some(path) => MergerConfig::from_file(path).unwrap_or_else(|e| {
            error!("Failed to load {}: {}", path, e);
            std::process::exit(1);
        }),
        None => MergerConfig::default(),
    };

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: {}, all", scenario_names());
            std::process::exit(1);
        })]
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if args.sweep {
        run_sweep_mode(&args, &config, scenarios, base_seed);
        return;
    }

    if let Some(export_path) = &args.export {
        run_export_mode(&args, &config, scenarios, base_seed, export_path);
        return;
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_config(config.clone());

        for scenario in &scenarios {
            let result = match runner.run(*scenario) {
                Ok(r) => r,
                Err(e) => {
                    error!("✗ {} (seed={}) could not run: {}", scenario.name(), seed, e);
                    std::process::exit(1);
                }
            };

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results,
        });
        print_json(&summary);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario,
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}

fn run_export_mode(args: &Args, config: &MergerConfig, scenarios: Vec<ScenarioId>, seed: u64, export_path: &str) {
    if scenarios.len() > 1 {
        eprintln!("Error: --export only supports a single scenario, not 'all'");
        std::process::exit(1);
    }
    info!("Running with export to: {}", export_path);

    let runner = ScenarioRunner::new(seed)
        .with_duration(args.duration)
        .with_config(config.clone());
    let outcome = runner
        .run_with_export(scenarios[0])
        .and_then(|(result, export)| export.write_to_file(export_path).map(|_| (result, export)));

    match outcome {
        Ok((result, export)) if result.passed => {
            info!(
                "✓ {} (seed={}) PASSED - exported {} frames to {}",
                scenarios[0].name(),
                seed,
                export.frames.len(),
                export_path
            );
        }
        Ok((result, _)) => {
            error!(
                "✗ {} FAILED: {}",
                scenarios[0].name(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("Export failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_sweep_mode(args: &Args, config: &MergerConfig, scenarios: Vec<ScenarioId>, seed: u64) {
    let grid = SweepGrid::default();
    if !args.json {
        info!(
            "Sweeping {} smoothing x {} exponent values over {} scenarios",
            grid.smoothing.len(),
            grid.weight_exponents.len(),
            scenarios.len()
        );
    }

    let points = match run_sweep_blocking(config, &grid, scenarios, seed, args.duration) {
        Ok(p) => p,
        Err(e) => {
            error!("Sweep failed: {}", e);
            std::process::exit(1);
        }
    };

    if args.json {
        print_json(&points);
        return;
    }
    for p in &points {
        info!(
            "λ={:.2} w={:.1} | {}/{} passed | jump={:.3}m heading={:.3}rad lateral={:.3}m | score={:.3}",
            p.smoothing,
            p.weight_exponent,
            p.passed_runs,
            p.total_runs,
            p.worst_splice_jump_m,
            p.worst_heading_step_rad,
            p.mean_lateral_error_m,
            p.score
        );
    }
    if let Some(best) = points.first() {
        info!("Best: smoothing={} weight_exponent={}", best.smoothing, best.weight_exponent);
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => {
            eprintln!("Failed to serialize output: {}", e);
            std::process::exit(1);
        }
    }
}

fn scenario_names() -> String {
    ScenarioId::all().iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
}

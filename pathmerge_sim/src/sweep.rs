//! Parallel parameter sweep over the merger's blend tuning.
//!
//! Every `(smoothing, weight_exponent)` pair is an independent job: it runs
//! the chosen scenarios with its own merger on a blocking worker of a Tokio
//! multi-thread runtime. The scenario list is shared read-only.

use std::sync::Arc;

use pathmerge_core::MergerConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SimError;
use crate::runner::ScenarioRunner;
use crate::scenarios::ScenarioId;

/// Grid of values to try.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepGrid {
    pub smoothing: Vec<f64>,
    pub weight_exponents: Vec<f64>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            smoothing: vec![0.1, 0.3, 0.5, 0.7, 0.9],
            weight_exponents: vec![1.0, 2.0, 3.0, 4.0],
        }
    }
}

impl SweepGrid {
    /// All configurations of the grid, derived from `base`.
    pub fn configs(&self, base: &MergerConfig) -> Vec<MergerConfig> {
        self.smoothing
            .iter()
            .flat_map(|&smoothing| {
                self.weight_exponents.iter().map(move |&weight_exponent| MergerConfig {
                    smoothing,
                    weight_exponent,
                    ..base.clone()
                })
            })
            .collect()
    }
}

/// Aggregate outcome of one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub smoothing: f64,
    pub weight_exponent: f64,
    pub passed_runs: usize,
    pub total_runs: usize,
    pub worst_splice_jump_m: f64,
    pub worst_heading_step_rad: f64,
    pub mean_lateral_error_m: f64,
    /// Lower is better
    pub score: f64,
}

/// Runs the sweep on the current Tokio runtime.
///
/// Results are sorted best first. Grid points whose configuration does not
/// validate are skipped with a warning.
pub async fn run_sweep(
    base: &MergerConfig,
    grid: &SweepGrid,
    scenarios: Vec<ScenarioId>,
    seed: u64,
    duration_secs: f64,
) -> Result<Vec<SweepPoint>, SimError> {
    let scenarios = Arc::new(scenarios);
    let mut handles = Vec::new();

    for config in grid.configs(base) {
        if let Err(e) = config.validate() {
            warn!(smoothing = config.smoothing, weight_exponent = config.weight_exponent, error = %e, "skipping grid point");
            continue;
        }
        let scenarios = Arc::clone(&scenarios);
        handles.push(tokio::task::spawn_blocking(move || {
            evaluate(config, &scenarios, seed, duration_secs)
        }));
    }

    let mut points = Vec::with_capacity(handles.len());
    for handle in handles {
        points.push(handle.await.map_err(SimError::worker)??);
    }
    points.sort_by(|a, b| a.score.total_cmp(&b.score));

    info!("Sweep evaluated {} grid points", points.len());
    Ok(points)
}

/// Builds a multi-thread runtime and runs [`run_sweep`] to completion.
pub fn run_sweep_blocking(
    base: &MergerConfig,
    grid: &SweepGrid,
    scenarios: Vec<ScenarioId>,
    seed: u64,
    duration_secs: f64,
) -> Result<Vec<SweepPoint>, SimError> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run_sweep(base, grid, scenarios, seed, duration_secs))
}

fn evaluate(
    config: MergerConfig,
    scenarios: &[ScenarioId],
    seed: u64,
    duration_secs: f64,
) -> Result<SweepPoint, SimError> {
    let runner = ScenarioRunner::new(seed)
        .with_duration(duration_secs)
        .with_config(config.clone());

    let mut passed_runs = 0;
    let mut worst_jump: f64 = 0.0;
    let mut worst_heading: f64 = 0.0;
    let mut lateral_sum = 0.0;
    let mut failures = 0.0;

    for &scenario in scenarios {
        let result = runner.run(scenario)?;
        if result.passed {
            passed_runs += 1;
        } else {
            failures += 1.0;
        }
        // Jumps are expected where the planner itself jumps
        if !scenario.setup().thresholds.expect_fallbacks {
            worst_jump = worst_jump.max(result.metrics.max_splice_jump_m);
        }
        worst_heading = worst_heading.max(result.metrics.max_heading_step_rad);
        lateral_sum += result.metrics.mean_lateral_error_m;
    }

    let mean_lateral = if scenarios.is_empty() { 0.0 } else { lateral_sum / scenarios.len() as f64 };
    Ok(SweepPoint {
        smoothing: config.smoothing,
        weight_exponent: config.weight_exponent,
        passed_runs,
        total_runs: scenarios.len(),
        worst_splice_jump_m: worst_jump,
        worst_heading_step_rad: worst_heading,
        mean_lateral_error_m: mean_lateral,
        score: failures + worst_jump + worst_heading + mean_lateral,
    })
}

//! Scenario runner - drives the merger with simulated planner output.

use crate::error::SimError;
use crate::exporter::{PoseFrame, SimExport, SimFrame};
use crate::oracle::{distance_to_polyline, Oracle, Road};
use crate::scenarios::ScenarioId;

use nalgebra::Point2;
use pathmerge_core::geometry::max_heading_step;
use pathmerge_core::{MergerConfig, PathMerger, PathTransform};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Extra road beyond the last plan horizon (m).
const ROAD_MARGIN_M: f64 = 10.0;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Planner cycles executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Successful merges
    pub merges: u64,

    /// Cycles whose merge failed; the previous path stayed in force
    pub dropped_frames: u64,

    /// Merges that fell back to a hard splice
    pub fallbacks: u64,

    /// Largest change of the committed path's offset at the vehicle (m)
    pub max_splice_jump_m: f64,

    /// Largest heading change between consecutive committed segments (rad)
    pub max_heading_step_rad: f64,

    /// Largest distance of a committed point from the road (m)
    pub max_lateral_error_m: f64,

    /// Mean distance of committed points from the road (m)
    pub mean_lateral_error_m: f64,
}

/// Runs merge scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Planner rate in Hz
    tick_rate_hz: u32,

    /// Duration in seconds
    max_duration_secs: f64,

    /// Merger configuration under test
    config: MergerConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner with default merger settings.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_rate_hz: 10,
            max_duration_secs: 10.0,
            config: MergerConfig::default(),
        }
    }

    /// Sets the planner rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Sets the merger configuration.
    pub fn with_config(mut self, config: MergerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        self.execute(scenario, None)
    }

    /// Runs a scenario and records every cycle for later inspection.
    pub fn run_with_export(&self, scenario: ScenarioId) -> Result<(ScenarioResult, SimExport), SimError> {
        let mut export = SimExport::new(scenario.name(), self.seed);
        let result = self.execute(scenario, Some(&mut export))?;
        export.finalize(result.passed, Some(result.metrics.clone()));
        Ok((result, export))
    }

    fn execute(&self, scenario: ScenarioId, mut export: Option<&mut SimExport>) -> Result<ScenarioResult, SimError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let setup = scenario.setup();
        let dt = 1.0 / self.tick_rate_hz as f64;
        let ticks = (self.max_duration_secs * self.tick_rate_hz as f64).round().max(0.0) as u64;

        let road_length = setup.planner.speed_mps * self.max_duration_secs
            + setup.planner.horizon_m
            + ROAD_MARGIN_M;
        let road = Road::new(setup.road, road_length);
        let mut oracle = Oracle::new(road, setup.planner.clone(), self.seed);
        let mut merger = PathMerger::new(self.config.clone())?;

        let mut metrics = ScenarioMetrics::default();
        let mut lateral_sum = 0.0;
        let mut lateral_count = 0usize;

        for tick in 0..ticks {
            if tick > 0 {
                oracle.step(dt);
            }
            let now = oracle.vehicle_pose();
            let vehicle = Point2::from(now.translation.vector);
            let candidate = oracle.plan();
            let before = merger.committed_world_path();

            if let Err(e) = merger.merge_with_speed(&candidate, &now, &now, oracle.speed()) {
                metrics.dropped_frames += 1;
                warn!(tick, error = %e, "merge failed, previous path stays in force");
                continue;
            }
            metrics.merges += 1;

            let indices = merger.last_indices();
            if indices.map_or(false, |i| i.fallback) {
                metrics.fallbacks += 1;
            }

            let world = merger.committed_world_path().unwrap_or_default();
            if let Some(old) = &before {
                let jump = (distance_to_polyline(&vehicle, &world) - distance_to_polyline(&vehicle, old)).abs();
                metrics.max_splice_jump_m = metrics.max_splice_jump_m.max(jump);
            }
            metrics.max_heading_step_rad = metrics.max_heading_step_rad.max(max_heading_step(&world));
            for p in &world {
                let e = oracle.road().distance_to(p);
                metrics.max_lateral_error_m = metrics.max_lateral_error_m.max(e);
                lateral_sum += e;
                lateral_count += 1;
            }

            if let Some(export) = export.as_deref_mut() {
                export.add_frame(SimFrame {
                    time_sec: oracle.time(),
                    vehicle: PoseFrame::from(&now),
                    candidate: SimFrame::points(&now.transform_path(&candidate)),
                    committed: SimFrame::points(&world),
                    indices,
                });
            }

            if tick % 10 == 0 {
                debug!(
                    "  t={:.1}s | merges={} | fallbacks={} | jump={:.3}m",
                    oracle.time(),
                    metrics.merges,
                    metrics.fallbacks,
                    metrics.max_splice_jump_m
                );
            }
        }

        if lateral_count > 0 {
            metrics.mean_lateral_error_m = lateral_sum / lateral_count as f64;
        }

        let failure_reason = check_thresholds(scenario, &metrics);
        Ok(ScenarioResult {
            scenario: scenario.name().to_string(),
            seed: self.seed,
            passed: failure_reason.is_none(),
            total_ticks: ticks,
            final_time_secs: oracle.time(),
            failure_reason,
            metrics,
        })
    }
}

/// First violated limit of `scenario`, if any.
fn check_thresholds(scenario: ScenarioId, m: &ScenarioMetrics) -> Option<String> {
    let t = scenario.setup().thresholds;

    if m.merges == 0 {
        return Some("no merge succeeded".to_string());
    }
    if m.dropped_frames > 0 {
        return Some(format!("{} dropped frames", m.dropped_frames));
    }
    if t.expect_fallbacks && m.fallbacks == 0 {
        return Some("expected hard splices but none occurred".to_string());
    }
    if !t.expect_fallbacks && m.fallbacks > 0 {
        return Some(format!("{} unexpected hard splices", m.fallbacks));
    }
    if let Some(limit) = t.max_splice_jump_m {
        if m.max_splice_jump_m > limit {
            return Some(format!("splice jump {:.3}m exceeds {:.3}m", m.max_splice_jump_m, limit));
        }
    }
    if m.max_heading_step_rad > t.max_heading_step_rad {
        return Some(format!(
            "heading step {:.3}rad exceeds {:.3}rad",
            m.max_heading_step_rad, t.max_heading_step_rad
        ));
    }
    if m.max_lateral_error_m > t.max_lateral_error_m {
        return Some(format!(
            "lateral error {:.2}m exceeds {:.2}m",
            m.max_lateral_error_m, t.max_lateral_error_m
        ));
    }
    None
}

//! JSON exporter for offline plotting.
//!
//! Exports one frame per planner cycle: the vehicle pose, the raw candidate
//! and the committed path (both in world coordinates), and the splice
//! indices that produced it.

use nalgebra::Point2;
use pathmerge_core::{Pose2, SpliceIndices};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path as FsPath;

use crate::error::SimError;
use crate::runner::ScenarioMetrics;

/// Vehicle pose in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl From<&Pose2> for PoseFrame {
    fn from(pose: &Pose2) -> Self {
        Self {
            x: pose.translation.vector.x,
            y: pose.translation.vector.y,
            heading: pose.rotation.angle(),
        }
    }
}

/// A single planner cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    pub vehicle: PoseFrame,

    /// Candidate as published by the planner, in world coordinates
    pub candidate: Vec<[f64; 2]>,

    /// Committed path after the merge, in world coordinates
    pub committed: Vec<[f64; 2]>,

    /// Splice indices; absent for the first path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indices: Option<SpliceIndices>,
}

impl SimFrame {
    /// Flattens points to `[x, y]` pairs.
    pub fn points(path: &[Point2<f64>]) -> Vec<[f64; 2]> {
        path.iter().map(|p| [p.x, p.y]).collect()
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ScenarioMetrics>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            metrics: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, metrics: Option<ScenarioMetrics>) {
        self.passed = passed;
        self.metrics = metrics;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<FsPath>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

//! PathMerge Deterministic Simulation Harness
//!
//! Drives a [`PathMerger`](pathmerge_core::PathMerger) with synthetic
//! planner output and scores the committed paths against ground truth.
//!
//! # Core Principle
//!
//! All randomness comes from one 64-bit seed, so a failing run can be
//! replayed exactly:
//! - **Road**: analytic centre line sampled in world coordinates
//! - **Oracle**: vehicle kinematics and noisy candidate paths in the ego frame
//! - **Runner**: one merge per planner cycle, metrics, pass/fail limits
//!
//! # Usage
//!
//! ```ignore
//! use pathmerge_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(10.0)
//!     .run(ScenarioId::LaneChange)?;
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;
pub mod sweep;

pub use error::SimError;
pub use exporter::{PoseFrame, SimExport, SimFrame};
pub use oracle::{distance_to_polyline, Oracle, PlannerConfig, Road, RoadShape};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use sweep::{run_sweep, run_sweep_blocking, SweepGrid, SweepPoint};

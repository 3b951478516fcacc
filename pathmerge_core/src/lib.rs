//! PathMerge Core - Temporal Path Merging for Autonomous Vehicles
//!
//! A motion planner publishes a fresh candidate path every cycle, each in
//! the vehicle's ego frame at the time it was planned. Handing those paths
//! straight to a controller produces jumps in position and heading. This
//! library splices each new path onto the previously committed one:
//! 1. **Frame alignment**: the old path is moved into the new path's frame
//! 2. **Splice selection**: delay-compensated hand-off point plus a blend window
//! 3. **Constrained smoothing**: one B-spline fit with a soft heading constraint

pub mod config;
pub mod constrained;
pub mod correspondence;
pub mod error;
pub mod geometry;
pub mod merger;
pub mod pose;
pub mod splice;
pub mod spline;

// Re-export key types for convenience
pub use config::MergerConfig;
pub use constrained::{fit_spline_with_heading, HeadingConstraint};
pub use error::{MergeError, Result};
pub use geometry::Path;
pub use merger::{CommittedPath, MergeRecord, MergeState, PathMerger};
pub use pose::{pose, PathTransform, Pose2};
pub use splice::{select_splice, SpliceIndices, SpliceParams};
pub use spline::{fit_spline, SplineCurve};

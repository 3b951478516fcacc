//! The MERGE engine - stateful splicing of successive planner paths.
//!
//! A [`PathMerger`] holds the last committed path together with the pose
//! of the frame it is expressed in. Every call to [`PathMerger::merge`]
//! brings that path into the new candidate's frame, picks splice indices,
//! fits one heading-constrained smoothing spline through the old head and
//! the new tail, and commits the re-sampled result.
//!
//! State is replaced in one assignment at the end of a successful call; a
//! failing call leaves the merger exactly as it was.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::config::MergerConfig;
use crate::constrained::{fit_spline_with_heading, HeadingConstraint};
use crate::correspondence::nearest_index;
use crate::error::{MergeError, Result};
use crate::geometry::{self, Path, COINCIDENT_EPS};
use crate::pose::{relative_pose, PathTransform, Pose2};
use crate::spline::fit_spline;
use crate::splice::{points_for_length, select_splice, SpliceIndices, SpliceParams};

/// A committed path and the pose of the frame it is expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedPath {
    /// Points in the ego frame of `pose`
    pub path: Path,
    /// Pose of that ego frame in world coordinates
    pub pose: Pose2,
}

impl CommittedPath {
    /// The path in world coordinates.
    pub fn world_path(&self) -> Path {
        self.pose.transform_path(&self.path)
    }
}

/// Lifecycle of a merger: nothing committed yet, or a committed path.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MergeState {
    #[default]
    Empty,
    Active(CommittedPath),
}

/// Diagnostics for one successful merge call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    /// 1-based count of successful merges at the time of this record
    pub cycle: u64,
    /// Splice indices; `None` for the first path, which is not spliced
    pub indices: Option<SpliceIndices>,
    /// Pose of the candidate's frame
    pub path_pose: Pose2,
    /// Vehicle pose when the merge ran
    pub now_pose: Pose2,
    /// Number of points in the returned path
    pub output_len: usize,
    /// The returned path in world coordinates
    pub world_path: Path,
}

/// Stateful splicer of successive candidate paths.
///
/// Not designed for concurrent callers: `merge` takes `&mut self`, so
/// producers on several threads must serialize through one owner.
#[derive(Debug, Clone)]
pub struct PathMerger {
    config: MergerConfig,
    state: MergeState,
    history: VecDeque<MergeRecord>,
    merge_count: u64,
}

impl PathMerger {
    /// Create a merger after validating `config`.
    pub fn new(config: MergerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            history: VecDeque::with_capacity(config.history_capacity.min(1024)),
            config,
            state: MergeState::Empty,
            merge_count: 0,
        })
    }

    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    pub fn state(&self) -> &MergeState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, MergeState::Active(_))
    }

    /// Number of successful merge calls so far.
    pub fn merge_count(&self) -> u64 {
        self.merge_count
    }

    /// Most recent merge records, oldest first.
    pub fn history(&self) -> &VecDeque<MergeRecord> {
        &self.history
    }

    /// Splice indices of the most recent merge, if it spliced.
    pub fn last_indices(&self) -> Option<SpliceIndices> {
        self.history.back().and_then(|r| r.indices)
    }

    pub fn committed(&self) -> Option<&CommittedPath> {
        match &self.state {
            MergeState::Active(c) => Some(c),
            MergeState::Empty => None,
        }
    }

    /// The committed path in its own ego frame.
    pub fn committed_path(&self) -> Option<&[Point2<f64>]> {
        self.committed().map(|c| c.path.as_slice())
    }

    pub fn committed_pose(&self) -> Option<&Pose2> {
        self.committed().map(|c| &c.pose)
    }

    /// The committed path in world coordinates.
    pub fn committed_world_path(&self) -> Option<Path> {
        self.committed().map(CommittedPath::world_path)
    }

    /// Drop the committed path and history; the next merge starts fresh.
    pub fn reset(&mut self) {
        self.state = MergeState::Empty;
        self.history.clear();
        self.merge_count = 0;
    }

    /// Merge a new candidate at the configured default speed.
    ///
    /// `new_path` is expressed in the frame whose world pose is
    /// `path_pose`; `now_pose` is the vehicle's current world pose. Returns
    /// the committed path in the `path_pose` frame.
    pub fn merge(
        &mut self,
        new_path: &[Point2<f64>],
        path_pose: &Pose2,
        now_pose: &Pose2,
    ) -> Result<Path> {
        let speed = self.config.default_speed_mps;
        self.merge_with_speed(new_path, path_pose, now_pose, speed)
    }

    /// Merge a new candidate with an explicit current speed in m/s.
    pub fn merge_with_speed(
        &mut self,
        new_path: &[Point2<f64>],
        path_pose: &Pose2,
        now_pose: &Pose2,
        speed_mps: f64,
    ) -> Result<Path> {
        if !speed_mps.is_finite() {
            return Err(MergeError::parameter(format!("speed {} is not finite", speed_mps)));
        }
        let candidate = self.prepare_candidate(new_path)?;

        let (output, indices) = match &self.state {
            MergeState::Empty => {
                let curve = fit_spline(
                    &candidate,
                    self.config.spline_degree,
                    self.config.smoothing,
                    true,
                )?;
                (curve.sample(self.config.output_samples), None)
            }
            MergeState::Active(previous) => {
                let (path, idx) =
                    self.splice_onto(previous, &candidate, path_pose, now_pose, speed_mps)?;
                (path, Some(idx))
            }
        };

        self.commit(output.clone(), *path_pose, *now_pose, indices);
        Ok(output)
    }

    // ========== Private Helper Methods ==========

    /// Trim padding, drop coincident points, and densify short candidates.
    fn prepare_candidate(&self, raw: &[Point2<f64>]) -> Result<Path> {
        if raw.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            return Err(MergeError::parameter("candidate path contains non-finite points"));
        }
        let trimmed = geometry::trim_zero_padding(raw, self.config.zero_padding_run);
        let distinct: Path = geometry::dedup_consecutive(trimmed, COINCIDENT_EPS)
            .into_iter()
            .map(|i| trimmed[i])
            .collect();
        if distinct.len() < 2 {
            return Err(MergeError::degenerate(format!(
                "candidate path has {} distinct points",
                distinct.len()
            )));
        }

        // Only densify candidates too short to determine a spline
        let min_points = self.config.spline_degree + 2;
        Ok(match self.config.input_spacing_m {
            Some(spacing) if distinct.len() < min_points => {
                geometry::resample_uniform(&distinct, spacing)
            }
            _ => distinct,
        })
    }

    /// Splice `p2` onto the previously committed path.
    fn splice_onto(
        &self,
        previous: &CommittedPath,
        p2: &[Point2<f64>],
        path_pose: &Pose2,
        now_pose: &Pose2,
        speed_mps: f64,
    ) -> Result<(Path, SpliceIndices)> {
        let cfg = &self.config;

        // Everything below happens in the candidate's ego frame
        let p1 = relative_pose(path_pose, &previous.pose).transform_path(&previous.path);
        let vehicle = Point2::from(relative_pose(path_pose, now_pose).translation.vector);

        let params = SpliceParams {
            delay_s: cfg.system_delay_s,
            speed_mps,
            blend_points: points_for_length(cfg.blend_length_m, geometry::average_spacing(p2)),
            max_overlap_distance: cfg.max_overlap_distance_m,
        };
        let idx = select_splice(&p1, p2, &vehicle, &params);
        if idx.fallback {
            warn!(
                cycle = self.merge_count + 1,
                "no overlap between committed and candidate path, hard splice"
            );
        }

        let mut merged: Path = Vec::with_capacity(idx.i1 + p2.len() - idx.i12);
        merged.extend_from_slice(&p1[..idx.i1]);
        merged.extend_from_slice(&p2[idx.i12..]);
        let weights = blend_weights(idx.i1, idx.i12, idx.i2, p2.len(), cfg.weight_exponent);

        let constraint = splice_heading_constraint(&idx, p2, merged.len(), cfg.heading_weight)?;
        let curve = fit_spline_with_heading(
            &merged,
            cfg.spline_degree,
            cfg.smoothing,
            &constraint,
            Some(&weights),
            true,
        )?;

        let sampled = curve.sample(cfg.output_samples);
        let start = nearest_index(&Point2::origin(), &sampled)
            .unwrap_or(0)
            .min(sampled.len().saturating_sub(2));

        debug!(
            cycle = self.merge_count + 1,
            i0 = idx.i0,
            i1 = idx.i1,
            i12 = idx.i12,
            i2 = idx.i2,
            theta = constraint.theta,
            dropped = start,
            "spliced candidate path"
        );
        Ok((sampled[start..].to_vec(), idx))
    }

    fn commit(
        &mut self,
        path: Path,
        path_pose: Pose2,
        now_pose: Pose2,
        indices: Option<SpliceIndices>,
    ) {
        let committed = CommittedPath { path, pose: path_pose };
        let output_len = committed.path.len();
        let world_path = if self.config.history_capacity > 0 {
            committed.world_path()
        } else {
            Vec::new()
        };
        self.state = MergeState::Active(committed);
        self.merge_count += 1;

        if self.config.history_capacity > 0 {
            while self.history.len() >= self.config.history_capacity {
                self.history.pop_front();
            }
            self.history.push_back(MergeRecord {
                cycle: self.merge_count,
                indices,
                path_pose,
                now_pose,
                output_len,
                world_path,
            });
        }
    }
}

/// Heading constraint for the concatenation `p1[..i1] ++ p2[i12..]`.
///
/// The target is the tangent of `p2` at `i12`, placed where `p2[i12]` lands
/// in the concatenation, which is index `i1`.
pub(crate) fn splice_heading_constraint(
    idx: &SpliceIndices,
    p2: &[Point2<f64>],
    merged_len: usize,
    weight: f64,
) -> Result<HeadingConstraint> {
    if merged_len == 0 {
        return Err(MergeError::degenerate("spliced path is empty"));
    }
    let (_, theta) = geometry::tangent_at(p2, idx.i12, true)?;
    Ok(HeadingConstraint::new(idx.i1.min(merged_len - 1), theta, weight))
}

/// Per-point weights for `p1[..i1] ++ p2[i12..]`.
///
/// Old points keep weight one, the `[i12, i2)` window of the new path ramps
/// from 0 to 1 raised to `exponent`, and the rest of the new path is one.
pub fn blend_weights(i1: usize, i12: usize, i2: usize, len2: usize, exponent: f64) -> Vec<f64> {
    let ramp_len = i2.saturating_sub(i12);
    let tail = len2.saturating_sub(i12 + ramp_len);
    let mut w = Vec::with_capacity(i1 + ramp_len + tail);
    w.extend(std::iter::repeat(1.0).take(i1));
    w.extend((0..ramp_len).map(|j| {
        let t = if ramp_len > 1 { j as f64 / (ramp_len - 1) as f64 } else { 0.0 };
        t.powf(exponent)
    }));
    w.extend(std::iter::repeat(1.0).take(tail));
    w
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::pose;
    use approx::assert_relative_eq;

    fn straight(n: usize, step: f64) -> Path {
        (0..n).map(|i| Point2::new(i as f64 * step, 0.0)).collect()
    }

    fn gentle_curve(length: f64) -> Path {
        let r = 30.0;
        (0..=(length * 10.0) as usize)
            .map(|i| {
                let a = i as f64 * 0.1 / r;
                Point2::new(r * a.sin(), r * (1.0 - a.cos()))
            })
            .collect()
    }

    fn max_gap(a: &[Point2<f64>], b: &[Point2<f64>]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b).map(|(p, q)| (p - q).norm()).fold(0.0, f64::max)
    }

    #[test]
    fn test_first_merge_passes_path_through() {
        let mut merger = PathMerger::new(MergerConfig::default()).unwrap();
        assert!(!merger.is_active());

        let out = merger.merge(&straight(11, 1.0), &Pose2::identity(), &Pose2::identity()).unwrap();
        assert_eq!(out.len(), 101);
        assert_relative_eq!(out[0].x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(out[100].x, 10.0, epsilon = 1e-6);
        assert!(merger.is_active());
        assert_eq!(merger.merge_count(), 1);
        assert_eq!(merger.last_indices(), None);
        assert_eq!(merger.committed_path().unwrap(), out.as_slice());
    }

    #[test]
    fn test_straight_line_merge() {
        let config = MergerConfig {
            system_delay_s: 0.0,
            blend_length_m: 0.1,
            ..MergerConfig::default()
        };
        let mut merger = PathMerger::new(config).unwrap();
        let p = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(2.0, 0.0)];
        let origin = pose(0.0, 0.0, 0.0);

        merger.merge(&p, &origin, &origin).unwrap();
        let out = merger.merge(&p, &origin, &origin).unwrap();

        assert_relative_eq!(out[0].x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(out[0].y, 0.0, epsilon = 1e-6);
        for q in &out {
            assert!(q.y.abs() < 1e-6, "point {:?} left the x-axis", q);
        }
        let idx = merger.last_indices().unwrap();
        assert_eq!(idx.i0, 0);
        assert_eq!(idx.i1, 0);
        assert!(!idx.fallback);
    }

    #[test]
    fn test_empty_overlap_hard_splice() {
        let mut merger = PathMerger::new(MergerConfig::default()).unwrap();
        let origin = Pose2::identity();
        merger.merge(&straight(11, 1.0), &origin, &origin).unwrap();

        let far: Path = (0..11).map(|i| Point2::new(i as f64, 100.0)).collect();
        let out = merger.merge(&far, &origin, &origin).unwrap();

        let idx = merger.last_indices().unwrap();
        assert!(idx.fallback);
        assert_eq!(idx.i1, 0);
        assert_eq!(idx.i12, 0);
        assert_relative_eq!(out[0].x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(out[0].y, 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_stationary_straight_merge_is_fixed_point() {
        let mut merger = PathMerger::new(MergerConfig::default()).unwrap();
        let origin = Pose2::identity();
        let candidate = straight(21, 0.5);

        let first = merger.merge(&candidate, &origin, &origin).unwrap();
        let second = merger.merge(&candidate, &origin, &origin).unwrap();
        let third = merger.merge(&candidate, &origin, &origin).unwrap();

        assert!(max_gap(&first, &second) < 1e-6);
        assert!(max_gap(&second, &third) < 1e-6);
    }

    #[test]
    fn test_stationary_curved_merge_converges() {
        let mut merger = PathMerger::new(MergerConfig::default()).unwrap();
        let origin = Pose2::identity();
        let candidate = gentle_curve(12.0);

        let mut outputs = Vec::new();
        for _ in 0..7 {
            outputs.push(merger.merge(&candidate, &origin, &origin).unwrap());
        }
        let gaps: Vec<f64> = outputs.windows(2).map(|w| max_gap(&w[0], &w[1])).collect();
        let last = gaps[gaps.len() - 1];
        assert!(last < 1e-3, "still drifting by {} m", last);
        assert!(last <= gaps[1] + 1e-9);
    }

    #[test]
    fn test_moving_frame_keeps_path_continuous() {
        let mut merger = PathMerger::new(MergerConfig::default()).unwrap();
        let world_path: Path = straight(201, 0.1);

        let x1 = pose(0.0, 0.0, 0.0);
        merger.merge(&world_path, &x1, &x1).unwrap();

        // One metre later the planner re-plans the same road from the new pose
        let x2 = pose(1.0, 0.0, 0.0);
        let candidate = x2.inverse().transform_path(&world_path[10..]);
        let out = merger.merge(&candidate, &x2, &x2).unwrap();

        let world = merger.committed_world_path().unwrap();
        assert_relative_eq!(out[0].x, 0.0, epsilon = 0.05);
        for q in &world {
            assert!(q.y.abs() < 1e-6);
        }
        assert_relative_eq!(world[world.len() - 1].x, 20.0, epsilon = 1e-6);
    }

    #[test]
    fn test_failed_merge_leaves_state_untouched() {
        let mut merger = PathMerger::new(MergerConfig::default()).unwrap();
        let origin = Pose2::identity();
        merger.merge(&straight(11, 1.0), &origin, &origin).unwrap();

        let before = merger.state().clone();
        let stuck = vec![Point2::new(3.0, 3.0); 10];
        assert!(matches!(
            merger.merge(&stuck, &origin, &origin),
            Err(MergeError::DegenerateInput(_))
        ));
        assert!(merger.merge_with_speed(&straight(11, 1.0), &origin, &origin, f64::NAN).is_err());

        assert_eq!(merger.state(), &before);
        assert_eq!(merger.merge_count(), 1);
        assert_eq!(merger.history().len(), 1);
    }

    #[test]
    fn test_zero_padding_is_trimmed() {
        let config = MergerConfig { input_spacing_m: None, ..MergerConfig::default() };
        let mut merger = PathMerger::new(config).unwrap();
        let mut padded = straight(11, 1.0);
        padded.extend(std::iter::repeat(Point2::origin()).take(20));

        let out = merger.merge(&padded, &Pose2::identity(), &Pose2::identity()).unwrap();
        assert_relative_eq!(out[out.len() - 1].x, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_history_is_bounded() {
        let config = MergerConfig { history_capacity: 3, ..MergerConfig::default() };
        let mut merger = PathMerger::new(config).unwrap();
        let origin = Pose2::identity();
        for _ in 0..5 {
            merger.merge(&straight(11, 1.0), &origin, &origin).unwrap();
        }
        assert_eq!(merger.history().len(), 3);
        assert_eq!(merger.history().front().unwrap().cycle, 3);
        assert_eq!(merger.merge_count(), 5);

        merger.reset();
        assert!(!merger.is_active());
        assert!(merger.history().is_empty());
    }

    #[test]
    fn test_dense_candidate_is_not_resampled() {
        let merger = PathMerger::new(MergerConfig::default()).unwrap();

        // 20 m at 0.2 m spacing already determines the spline
        let dense = straight(101, 0.2);
        assert_eq!(merger.prepare_candidate(&dense).unwrap(), dense);

        // Too few points for a cubic: densified at the configured spacing
        let sparse = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(2.0, 0.0)];
        let out = merger.prepare_candidate(&sparse).unwrap();
        assert_eq!(out.len(), 21);
        assert_relative_eq!(out[20].x, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_heading_constraint_sits_at_splice_point() {
        let p2 = gentle_curve(12.0);
        let idx = SpliceIndices { i0: 1, i1: 4, i12: 7, i2: 30, fallback: false };
        let merged_len = idx.i1 + p2.len() - idx.i12;

        let c = splice_heading_constraint(&idx, &p2, merged_len, 0.5).unwrap();
        assert_eq!(c.index, idx.i1);
        assert_relative_eq!(c.theta, 7.0 * 0.1 / 30.0, epsilon = 1e-9);
        assert_relative_eq!(c.weight, 0.5);

        // Hard splice: the candidate's own start carries the heading
        let hard = SpliceIndices { i0: 3, i1: 0, i12: 0, i2: 30, fallback: true };
        let c = splice_heading_constraint(&hard, &p2, p2.len(), 0.5).unwrap();
        assert_eq!(c.index, 0);
        assert_relative_eq!(c.theta, 0.0, epsilon = 1e-2);

        assert!(splice_heading_constraint(&idx, &p2, 0, 0.5).is_err());
    }

    #[test]
    fn test_history_records_world_path() {
        let mut merger = PathMerger::new(MergerConfig::default()).unwrap();
        let world_path = straight(201, 0.1);
        let x1 = pose(0.0, 0.0, 0.0);
        merger.merge(&world_path, &x1, &x1).unwrap();

        let x2 = pose(1.0, 0.0, 0.2);
        let candidate = x2.inverse().transform_path(&world_path[10..]);
        let out = merger.merge(&candidate, &x2, &x2).unwrap();

        let record = merger.history().back().unwrap();
        assert_eq!(record.output_len, out.len());
        assert_eq!(Some(&record.world_path), merger.committed_world_path().as_ref());
        assert!(record.world_path.iter().all(|q| q.y.abs() < 1e-6));

        let silent = MergerConfig { history_capacity: 0, ..MergerConfig::default() };
        let mut merger = PathMerger::new(silent).unwrap();
        merger.merge(&world_path, &x1, &x1).unwrap();
        assert!(merger.history().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MergerConfig { smoothing: 2.0, ..MergerConfig::default() };
        assert!(matches!(PathMerger::new(config), Err(MergeError::Config(_))));
    }

    #[test]
    fn test_blend_weights_shape() {
        let w = blend_weights(3, 2, 6, 10, 2.0);
        assert_eq!(w.len(), 3 + 10 - 2);
        assert_eq!(&w[..3], &[1.0, 1.0, 1.0]);
        assert_relative_eq!(w[3], 0.0);
        assert_relative_eq!(w[4], 1.0 / 9.0, epsilon = 1e-12);
        assert_relative_eq!(w[6], 1.0);
        assert!(w[7..].iter().all(|&v| v == 1.0));

        assert_eq!(blend_weights(0, 4, 4, 6, 3.0), vec![1.0, 1.0]);
    }
}

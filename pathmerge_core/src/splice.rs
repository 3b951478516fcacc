//! Splice-point selection.
//!
//! Picks where the previously committed path `p1` is cut and where the new
//! candidate `p2` takes over. Both paths must already be expressed in the
//! candidate's ego frame. The selector never fails: out-of-range values are
//! clamped and a missing overlap degrades to a hard splice at the start of
//! `p2`, because the control loop needs some path every cycle.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::correspondence::{nearest_index, project_within};
use crate::geometry::{average_spacing, distance};

/// The four control indices of one splice.
///
/// `i0` and `i1` index the previous path, `i12` and `i2` the new one.
/// Always `i12 <= i2`, and `i0 <= i1` unless the splice fell back, in
/// which case `i1` and `i12` are zero while `i0` still locates the vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpliceIndices {
    /// Point of `p1` nearest to the vehicle now
    pub i0: usize,
    /// Point of `p1` where control hands off, after delay compensation
    pub i1: usize,
    /// Point of `p2` corresponding to `p1[i1]`
    pub i12: usize,
    /// End of the blend region on `p2`
    pub i2: usize,
    /// Set when no overlap was found and a hard splice was used
    pub fallback: bool,
}

/// Inputs that shape the splice besides the two paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpliceParams {
    /// System delay τ₁ between planning and control, seconds
    pub delay_s: f64,
    /// Current vehicle speed, m/s
    pub speed_mps: f64,
    /// Blend length N2 as a point count on `p2`
    pub blend_points: usize,
    /// Pairs farther apart than this do not count as overlap, metres
    pub max_overlap_distance: f64,
}

/// Convert a metric length into a point count for a path sampled at
/// `spacing` metres.
pub fn points_for_length(length_m: f64, spacing: f64) -> usize {
    if spacing <= 0.0 || !length_m.is_finite() || length_m <= 0.0 {
        return 0;
    }
    (length_m / spacing).ceil() as usize
}

/// Choose `{i0, i1, i12, i2}` for splicing `p2` onto `p1`.
///
/// `vehicle` is the vehicle position in the same frame as both paths.
pub fn select_splice(
    p1: &[Point2<f64>],
    p2: &[Point2<f64>],
    vehicle: &Point2<f64>,
    params: &SpliceParams,
) -> SpliceIndices {
    // i0 is reported even when the splice falls back
    let i0 = nearest_index(vehicle, p1).unwrap_or(0);
    let hard_splice = SpliceIndices {
        i0,
        i1: 0,
        i12: 0,
        i2: params.blend_points.min(p2.len().saturating_sub(1)),
        fallback: true,
    };
    if p1.is_empty() || p2.is_empty() {
        return hard_splice;
    }
    if project_within(p1, p2, params.max_overlap_distance).is_empty() {
        return hard_splice;
    }

    let last1 = p1.len() - 1;
    let last2 = p2.len() - 1;

    let travel = (params.speed_mps * params.delay_s).max(0.0);
    let lead = points_for_length(travel, average_spacing(p1));
    let i1 = i0.saturating_add(lead).min(last1);

    let i12 = nearest_index(&p1[i1], p2).unwrap_or(0).min(last2);
    if distance(&p1[i1], &p2[i12]) > params.max_overlap_distance {
        return hard_splice;
    }

    let i2 = i12.saturating_add(params.blend_points).min(last2).max(i12);

    SpliceIndices { i0, i1, i12, i2, fallback: false }
}

//! Nearest-point correspondence between two paths.
//!
//! Two planner paths produced at different times live in different (but
//! nearby) frames. Projecting each onto the other with a two-pass nearest
//! neighbour search approximates the region where they overlap. The
//! mapping is not a bijection; ties resolve to the first occurrence.

use nalgebra::Point2;

use crate::geometry::{distance, Path};

/// Result of projecting two paths onto each other.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Points of `a` selected as nearest to some point of `b`
    pub proj_a: Path,
    /// Points of `b` nearest to each selected point of `a`
    pub proj_b: Path,
    /// Sorted, de-duplicated indices into `a`
    pub idx_a: Vec<usize>,
    /// Indices into `b`, one per entry of `idx_a`
    pub idx_b: Vec<usize>,
}

impl Projection {
    /// True when no overlap was found.
    pub fn is_empty(&self) -> bool {
        self.idx_a.is_empty()
    }
}

/// Index of the point in `path` closest to `point`.
///
/// Returns `None` for an empty path.
pub fn nearest_index(point: &Point2<f64>, path: &[Point2<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in path.iter().enumerate() {
        let d = (p - point).norm_squared();
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((i, d)),
        }
    }
    best.map(|(i, _)| i)
}

/// For every point of `from`, the index of its nearest neighbour in `onto`.
///
/// With `dedup` the result is sorted and de-duplicated.
pub fn projection_indices(from: &[Point2<f64>], onto: &[Point2<f64>], dedup: bool) -> Vec<usize> {
    let mut idx: Vec<usize> = from.iter().filter_map(|p| nearest_index(p, onto)).collect();
    if dedup {
        idx.sort_unstable();
        idx.dedup();
    }
    idx
}

/// Two-pass projection of `path_a` and `path_b` onto each other.
///
/// First every point of `b` picks its nearest point in `a` (`idx_a`, sorted
/// and unique); then every selected point of `a` picks its nearest point in
/// `b` (`idx_b`).
pub fn project(path_a: &[Point2<f64>], path_b: &[Point2<f64>]) -> Projection {
    let idx_a = projection_indices(path_b, path_a, true);
    let proj_a: Path = idx_a.iter().map(|&i| path_a[i]).collect();
    let idx_b = projection_indices(&proj_a, path_b, false);
    let proj_b: Path = idx_b.iter().map(|&i| path_b[i]).collect();

    Projection { proj_a, proj_b, idx_a, idx_b }
}

/// [`project`], keeping only pairs closer than `max_distance`.
///
/// An empty result means the paths do not overlap within tolerance.
pub fn project_within(path_a: &[Point2<f64>], path_b: &[Point2<f64>], max_distance: f64) -> Projection {
    let full = project(path_a, path_b);
    let mut out = Projection {
        proj_a: Vec::new(),
        proj_b: Vec::new(),
        idx_a: Vec::new(),
        idx_b: Vec::new(),
    };
    for k in 0..full.idx_a.len() {
        if distance(&full.proj_a[k], &full.proj_b[k]) <= max_distance {
            out.proj_a.push(full.proj_a[k]);
            out.proj_b.push(full.proj_b[k]);
            out.idx_a.push(full.idx_a[k]);
            out.idx_b.push(full.idx_b[k]);
        }
    }
    out
}

//! Path geometry primitives.
//!
//! Everything here is a pure function over point slices: arc-length
//! parametrization, finite-difference tangents, and the small amount of
//! pre-processing (de-duplication, zero-padding trim, uniform re-sampling)
//! that planner output needs before it can be fitted.

use nalgebra::{Point2, Vector2};
use std::f64::consts::PI;

use crate::error::{MergeError, Result};

/// An ordered sequence of 2D points.
pub type Path = Vec<Point2<f64>>;

/// Two consecutive points closer than this are treated as coincident.
pub const COINCIDENT_EPS: f64 = 1e-9;

/// Euclidean distance between two points.
pub fn distance(a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (b - a).norm()
}

/// Cumulative Euclidean distance from the first point.
///
/// `profile[0] == 0` and `profile[N-1]` is the total path length.
pub fn arc_length_profile(path: &[Point2<f64>]) -> Vec<f64> {
    let mut profile = Vec::with_capacity(path.len());
    let mut total = 0.0;
    for (i, p) in path.iter().enumerate() {
        if i > 0 {
            total += distance(&path[i - 1], p);
        }
        profile.push(total);
    }
    profile
}

/// Total length of the polyline.
pub fn path_length(path: &[Point2<f64>]) -> f64 {
    path.windows(2).map(|w| distance(&w[0], &w[1])).sum()
}

/// Mean distance between consecutive samples (0 for fewer than two points).
pub fn average_spacing(path: &[Point2<f64>]) -> f64 {
    if path.len() < 2 {
        return 0.0;
    }
    path_length(path) / (path.len() - 1) as f64
}

/// Finite-difference tangent at `index`.
///
/// Forward difference at the first point, backward difference at the last,
/// central difference elsewhere. Returns the (optionally normalized) vector
/// and its heading `atan2(dy, dx)`.
pub fn tangent_at(
    path: &[Point2<f64>],
    index: usize,
    normalize: bool,
) -> Result<(Vector2<f64>, f64)> {
    let n = path.len();
    if index >= n || n < 2 {
        return Err(MergeError::InvalidIndex { index, len: n });
    }

    let mut tangent = if index == 0 {
        path[1] - path[0]
    } else if index == n - 1 {
        path[n - 1] - path[n - 2]
    } else {
        (path[index + 1] - path[index - 1]) / 2.0
    };

    if normalize {
        let norm = tangent.norm();
        if norm > 0.0 {
            tangent /= norm;
        }
    }

    let heading = tangent.y.atan2(tangent.x);
    Ok((tangent, heading))
}

/// Indices of the points that survive dropping coincident neighbours.
///
/// The first point is always kept; every following point is kept only if it
/// is farther than `eps` from the previously kept one.
pub fn dedup_consecutive(path: &[Point2<f64>], eps: f64) -> Vec<usize> {
    let mut kept: Vec<usize> = Vec::with_capacity(path.len());
    for (i, p) in path.iter().enumerate() {
        match kept.last() {
            Some(&last) if distance(&path[last], p) <= eps => {}
            _ => kept.push(i),
        }
    }
    kept
}

/// Drop a trailing run of `(0, 0)` samples.
///
/// Planners publish fixed-size buffers and pad the unused tail with zeros.
/// The tail is removed only if it is at least `min_run` samples long, so a
/// path that legitimately ends at the origin is left alone.
pub fn trim_zero_padding(path: &[Point2<f64>], min_run: usize) -> &[Point2<f64>] {
    let trailing = path
        .iter()
        .rev()
        .take_while(|p| p.x == 0.0 && p.y == 0.0)
        .count();
    if trailing > 0 && trailing >= min_run.max(1) {
        &path[..path.len() - trailing]
    } else {
        path
    }
}

/// Linearly re-sample a path at constant arc-length `spacing`.
///
/// Both endpoints are preserved. A remainder shorter than a thousandth of
/// the spacing is merged into the final point.
pub fn resample_uniform(path: &[Point2<f64>], spacing: f64) -> Path {
    if path.len() < 2 || spacing <= 0.0 {
        return path.to_vec();
    }
    let profile = arc_length_profile(path);
    let total = profile[profile.len() - 1];
    if total <= 0.0 {
        return vec![path[0]];
    }

    let steps = (total / spacing).floor() as usize;
    let mut out = Path::with_capacity(steps + 2);
    let mut seg = 0;
    for j in 0..=steps {
        let s = (j as f64 * spacing).min(total);
        while seg + 2 < profile.len() && profile[seg + 1] < s {
            seg += 1;
        }
        let span = profile[seg + 1] - profile[seg];
        let t = if span > 0.0 { (s - profile[seg]) / span } else { 0.0 };
        out.push(path[seg] + (path[seg + 1] - path[seg]) * t.clamp(0.0, 1.0));
    }

    let last = path[path.len() - 1];
    if total - steps as f64 * spacing > spacing * 1e-3 {
        out.push(last);
    } else if let Some(end) = out.last_mut() {
        *end = last;
    }
    out
}

/// Wrap an angle into `(-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// Largest absolute heading change between consecutive segments.
pub fn max_heading_step(path: &[Point2<f64>]) -> f64 {
    let headings: Vec<f64> = path
        .windows(2)
        .filter(|w| distance(&w[0], &w[1]) > COINCIDENT_EPS)
        .map(|w| {
            let d = w[1] - w[0];
            d.y.atan2(d.x)
        })
        .collect();
    headings
        .windows(2)
        .map(|h| wrap_angle(h[1] - h[0]).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line(n: usize, step: f64) -> Path {
        (0..n).map(|i| Point2::new(i as f64 * step, 0.0)).collect()
    }

    #[test]
    fn test_arc_length_profile_starts_at_zero() {
        let path = vec![Point2::new(0.0, 0.0), Point2::new(3.0, 4.0), Point2::new(3.0, 5.0)];
        let profile = arc_length_profile(&path);
        assert_eq!(profile.len(), 3);
        assert_relative_eq!(profile[0], 0.0);
        assert_relative_eq!(profile[1], 5.0);
        assert_relative_eq!(profile[2], 6.0);
    }

    #[test]
    fn test_tangent_differences() {
        let path = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), Point2::new(3.0, 1.0)];

        let (t0, h0) = tangent_at(&path, 0, false).unwrap();
        assert_relative_eq!(t0.x, 1.0);
        assert_relative_eq!(h0, PI / 4.0, epsilon = 1e-12);

        let (t1, _) = tangent_at(&path, 1, false).unwrap();
        assert_relative_eq!(t1.x, 1.5);
        assert_relative_eq!(t1.y, 0.5);

        let (t2, h2) = tangent_at(&path, 2, true).unwrap();
        assert_relative_eq!(t2.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(h2, 0.0);
    }

    #[test]
    fn test_tangent_out_of_range() {
        let path = line(4, 1.0);
        assert_eq!(
            tangent_at(&path, 4, false),
            Err(MergeError::InvalidIndex { index: 4, len: 4 })
        );
        assert!(tangent_at(&path[..1], 0, false).is_err());
    }

    #[test]
    fn test_dedup_drops_coincident_points() {
        let path = vec![
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
        ];
        assert_eq!(dedup_consecutive(&path, COINCIDENT_EPS), vec![0, 2, 4]);
    }

    #[test]
    fn test_trim_zero_padding() {
        let mut path = line(5, 1.0);
        path.extend(std::iter::repeat(Point2::origin()).take(6));
        assert_eq!(trim_zero_padding(&path, 5).len(), 5);

        // A short trailing run is real data
        let short = vec![Point2::new(1.0, 0.0), Point2::origin()];
        assert_eq!(trim_zero_padding(&short, 5).len(), 2);
    }

    #[test]
    fn test_resample_uniform_keeps_endpoints() {
        let path = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(2.0, 0.0)];
        let out = resample_uniform(&path, 0.1);
        assert_eq!(out.len(), 21);
        assert_relative_eq!(out[0].x, 0.0);
        assert_relative_eq!(out[20].x, 2.0);
        assert_relative_eq!(average_spacing(&out), 0.1, epsilon = 1e-12);

        let bent = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(1.0, 0.25)];
        let out = resample_uniform(&bent, 0.5);
        assert_relative_eq!(out[2].x, 1.0);
        assert_relative_eq!(out[2].y, 0.0);
        assert_relative_eq!(out.last().unwrap().y, 0.25);
    }

    #[test]
    fn test_max_heading_step() {
        let path = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(1.0, 1.0)];
        assert_relative_eq!(max_heading_step(&path), PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(max_heading_step(&line(10, 0.5)), 0.0);
    }
}

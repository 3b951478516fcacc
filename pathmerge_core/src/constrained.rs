//! Smoothing spline fit with a soft heading constraint.
//!
//! Extends [`fit_spline`](crate::spline::fit_spline) with a penalty that
//! pulls the curve tangent at one arc-length position onto a target
//! heading θ. The tangent magnitude is left free through an extra unknown
//! `r`, so the penalty only acts on direction:
//!
//! ```text
//! λ2 ‖ d·Cx - r cos θ ‖² + λ2 ‖ d·Cy - r sin θ ‖²
//! ```
//!
//! where `d` is the row of basis derivatives at the constrained parameter.
//! Both axes are solved together in one bordered system of size
//! `2M + 1 + 4`. Per-point weights scale the fidelity rows so the fit can
//! be biased toward one part of the input.

use nalgebra::{DMatrix, Point2};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{MergeError, Result};
use crate::spline::{basis_derivatives, solve_pseudo_inverse, FitBasis, SplineCurve};

/// Target heading for the tangent at one input point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadingConstraint {
    /// Index into the input path whose tangent is constrained
    pub index: usize,

    /// Target heading in radians
    pub theta: f64,

    /// Penalty weight λ2 in `[0, 1]`; 0 disables the constraint
    pub weight: f64,
}

impl HeadingConstraint {
    pub fn new(index: usize, theta: f64, weight: f64) -> Self {
        Self { index, theta, weight }
    }
}

/// Fit a smoothing B-spline whose tangent at `constraint.index` is pulled
/// toward `constraint.theta`.
///
/// `weights`, when given, must have one entry per input point; `None` means
/// uniform weights of one, which makes `constraint.weight == 0` reproduce
/// [`fit_spline`](crate::spline::fit_spline) exactly.
pub fn fit_spline_with_heading(
    path: &[Point2<f64>],
    degree: usize,
    lambda: f64,
    constraint: &HeadingConstraint,
    weights: Option<&[f64]>,
    clamp_endpoints: bool,
) -> Result<SplineCurve> {
    if !(0.0..=1.0).contains(&lambda) {
        return Err(MergeError::parameter(format!("smoothing lambda {} outside [0, 1]", lambda)));
    }
    let lambda2 = constraint.weight;
    if !(0.0..=1.0).contains(&lambda2) {
        return Err(MergeError::parameter(format!("heading weight {} outside [0, 1]", lambda2)));
    }
    if constraint.index >= path.len() {
        return Err(MergeError::InvalidIndex { index: constraint.index, len: path.len() });
    }
    if let Some(w) = weights {
        if w.len() != path.len() {
            return Err(MergeError::parameter(format!(
                "{} weights for {} points",
                w.len(),
                path.len()
            )));
        }
        if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(MergeError::parameter("weights must be finite and non-negative"));
        }
    }

    let fb = FitBasis::build(path, degree)?;
    let m = fb.control_count();
    let n = fb.points.len();

    // Carry weights and the constrained index over to the de-duplicated points
    let w: Vec<f64> = match weights {
        Some(w) => fb.kept.iter().map(|&i| w[i]).collect(),
        None => vec![1.0; n],
    };
    let ci = fb.kept.partition_point(|&k| k <= constraint.index).saturating_sub(1);
    let u = fb.params[ci];
    let d = basis_derivatives(&fb.knots, degree, u);

    let b = &fb.basis;
    let bt = b.transpose();
    let mut wb = b.clone();
    for (row, wi) in w.iter().enumerate() {
        wb.row_mut(row).scale_mut(*wi);
    }
    let wbt = wb.transpose();
    let fidelity = &wbt * &wb;
    let curvature = &bt * &fb.penalty * b;
    let block = (fidelity * (1.0 - lambda) + curvature * lambda) * (1.0 - lambda2);

    let size = 2 * m + 1;
    let mut normal = DMatrix::zeros(size, size);
    normal.view_mut((0, 0), (m, m)).copy_from(&block);
    normal.view_mut((m, m), (m, m)).copy_from(&block);

    let mut heading_rows = DMatrix::zeros(2, size);
    for (j, dj) in d.iter().enumerate() {
        heading_rows[(0, j)] = *dj;
        heading_rows[(1, m + j)] = *dj;
    }
    heading_rows[(0, 2 * m)] = -constraint.theta.cos();
    heading_rows[(1, 2 * m)] = -constraint.theta.sin();
    normal += heading_rows.transpose() * &heading_rows * lambda2;

    let mut lhs = DMatrix::zeros(size + 4, size + 4);
    lhs.view_mut((0, 0), (size, size)).copy_from(&normal);
    let mut rhs = DMatrix::zeros(size + 4, 1);

    let targets = fb.targets();
    let fid_scale = (1.0 - lambda2) * (1.0 - lambda);
    for axis in 0..2 {
        let mut wy = targets.column(axis).clone_owned();
        for (row, wi) in w.iter().enumerate() {
            wy[row] *= *wi;
        }
        let top = (&wbt * wy) * fid_scale;
        rhs.view_mut((axis * m, 0), (m, 1)).copy_from(&top);
    }

    if clamp_endpoints {
        let pins = [
            (0, fb.points[0].x),
            (m - 1, fb.points[n - 1].x),
            (m, fb.points[0].y),
            (2 * m - 1, fb.points[n - 1].y),
        ];
        for (row, (col, value)) in pins.iter().enumerate() {
            lhs[(size + row, *col)] = 1.0;
            lhs[(*col, size + row)] = 1.0;
            rhs[(size + row, 0)] = *value;
        }
    }

    let solution = solve_pseudo_inverse(lhs, &rhs)?;
    let control_points = (0..m)
        .map(|i| Point2::new(solution[(i, 0)], solution[(m + i, 0)]))
        .collect();

    trace!(
        points = n,
        controls = m,
        lambda,
        lambda2,
        index = ci,
        theta = constraint.theta,
        "fitted heading-constrained spline"
    );
    SplineCurve::new(fb.knots, control_points, degree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Path;
    use crate::spline::fit_spline;
    use approx::assert_relative_eq;

    fn wavy(n: usize) -> Path {
        (0..n)
            .map(|i| {
                let x = i as f64 * 0.4;
                Point2::new(x, 0.8 * (0.3 * x).sin() + 0.05 * x * x)
            })
            .collect()
    }

    #[test]
    fn test_zero_heading_weight_matches_unconstrained() {
        let path = wavy(25);
        for &lambda in &[0.0, 0.3, 0.8] {
            let plain = fit_spline(&path, 3, lambda, true).unwrap();
            let constraint = HeadingConstraint::new(12, 1.2, 0.0);
            let constrained = fit_spline_with_heading(&path, 3, lambda, &constraint, None, true).unwrap();

            assert_eq!(plain.knots(), constrained.knots());
            for (a, b) in plain.control_points().iter().zip(constrained.control_points()) {
                assert_relative_eq!(a.x, b.x, epsilon = 1e-6);
                assert_relative_eq!(a.y, b.y, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_heading_is_pulled_toward_target() {
        let path: Path = (0..21).map(|i| Point2::new(i as f64 * 0.5, 0.0)).collect();
        let theta = 0.3;
        let constraint = HeadingConstraint::new(10, theta, 0.9);
        let curve = fit_spline_with_heading(&path, 3, 0.1, &constraint, None, true).unwrap();

        let heading = curve.heading(0.5);
        assert!((heading - theta).abs() < 0.05, "heading {} not near {}", heading, theta);

        let start = curve.evaluate(0.0);
        let end = curve.evaluate(1.0);
        assert_relative_eq!(start.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(end.x, 10.0, epsilon = 1e-6);
        assert_relative_eq!(end.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_weight_ignores_outlier() {
        let mut path: Path = (0..21).map(|i| Point2::new(i as f64 * 0.5, 0.0)).collect();
        path[10].y = 1.0;
        let constraint = HeadingConstraint::new(0, 0.0, 0.0);
        let u = FitBasis::build(&path, 3).unwrap().params[10];

        let even = fit_spline_with_heading(&path, 3, 0.01, &constraint, None, true).unwrap();
        assert!(even.evaluate(u).y > 0.3);

        let mut w = vec![1.0; 21];
        w[10] = 0.0;
        let biased = fit_spline_with_heading(&path, 3, 0.01, &constraint, Some(&w), true).unwrap();
        assert!(biased.evaluate(u).y.abs() < 0.05);
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let path = wavy(10);
        let c = HeadingConstraint::new(10, 0.0, 0.5);
        assert_eq!(
            fit_spline_with_heading(&path, 3, 0.5, &c, None, true),
            Err(MergeError::InvalidIndex { index: 10, len: 10 })
        );

        let c = HeadingConstraint::new(3, 0.0, 1.5);
        assert!(matches!(
            fit_spline_with_heading(&path, 3, 0.5, &c, None, true),
            Err(MergeError::InvalidParameter(_))
        ));

        let c = HeadingConstraint::new(3, 0.0, 0.5);
        let short_weights = vec![1.0; 4];
        assert!(matches!(
            fit_spline_with_heading(&path, 3, 0.5, &c, Some(&short_weights), true),
            Err(MergeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_constrained_index_survives_dedup() {
        let mut path = wavy(12);
        path.insert(4, path[4]);
        path.insert(4, path[4]);
        let c = HeadingConstraint::new(13, 0.4, 0.5);
        let curve = fit_spline_with_heading(&path, 3, 0.2, &c, None, true).unwrap();
        assert_eq!(curve.control_points().len(), 12);
    }
}

//! Smoothing B-spline fitting over arc-length parametrized paths.
//!
//! A path of N points is fitted with a clamped degree-k B-spline with
//! M = N control points. Interior knots follow the path's own arc-length
//! profile, so resolution tracks point density. The fit trades fidelity
//! against a natural-spline curvature penalty:
//!
//! ```text
//! min  (1-λ)‖B C - Y‖² + λ Cᵗ Bᵗ K B C
//! s.t. C_0 = Y_0,  C_{M-1} = Y_{N-1}      (when clamped)
//! ```
//!
//! The equality rows are bordered onto the normal equations and the whole
//! system is solved through an SVD pseudo-inverse. The Gram matrix is
//! rank deficient at λ = 1 and badly conditioned for uneven spacing, so a
//! direct inverse is not an option.

use nalgebra::{DMatrix, Point2, Vector2};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{MergeError, Result};
use crate::geometry::{self, Path, COINCIDENT_EPS};

/// Singular values below `PINV_RCOND * σ_max` are treated as zero.
pub const PINV_RCOND: f64 = 1e-12;

/// A fitted clamped B-spline in the plane.
///
/// Knots live in `[0, 1]` and are clamped with multiplicity `degree + 1`
/// at both ends. Immutable once produced; consumers re-sample it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineCurve {
    knots: Vec<f64>,
    control_points: Vec<Point2<f64>>,
    degree: usize,
}

impl SplineCurve {
    /// Build a curve from raw parts, checking the knot/control-point counts.
    pub fn new(knots: Vec<f64>, control_points: Vec<Point2<f64>>, degree: usize) -> Result<Self> {
        if degree == 0 || control_points.len() < degree + 1 {
            return Err(MergeError::degenerate(format!(
                "{} control points cannot carry a degree-{} spline",
                control_points.len(),
                degree
            )));
        }
        if knots.len() != control_points.len() + degree + 1 {
            return Err(MergeError::parameter(format!(
                "expected {} knots, got {}",
                control_points.len() + degree + 1,
                knots.len()
            )));
        }
        if knots.windows(2).any(|w| w[1] < w[0]) {
            return Err(MergeError::parameter("knot vector is not non-decreasing"));
        }
        Ok(Self { knots, control_points, degree })
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn control_points(&self) -> &[Point2<f64>] {
        &self.control_points
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Point on the curve at parameter `u` (clamped into `[0, 1]`).
    pub fn evaluate(&self, u: f64) -> Point2<f64> {
        let basis = basis_functions(&self.knots, self.degree, u);
        let mut acc = Vector2::zeros();
        for (b, c) in basis.iter().zip(&self.control_points) {
            if *b != 0.0 {
                acc += c.coords * *b;
            }
        }
        Point2::from(acc)
    }

    /// First derivative `dC/du` at parameter `u`.
    pub fn derivative(&self, u: f64) -> Vector2<f64> {
        let d = basis_derivatives(&self.knots, self.degree, u);
        d.iter()
            .zip(&self.control_points)
            .fold(Vector2::zeros(), |acc, (w, c)| acc + c.coords * *w)
    }

    /// Heading of the curve tangent at `u`.
    pub fn heading(&self, u: f64) -> f64 {
        let d = self.derivative(u);
        d.y.atan2(d.x)
    }

    /// Evaluate at `n` parameters evenly spaced over `[0, 1]`.
    pub fn sample(&self, n: usize) -> Path {
        match n {
            0 => Vec::new(),
            1 => vec![self.evaluate(0.0)],
            _ => (0..n)
                .map(|j| self.evaluate(j as f64 / (n - 1) as f64))
                .collect(),
        }
    }
}

// ========== Basis functions ==========

/// Knot span index for parameter `u`.
///
/// Parameters outside the domain are clamped onto it. At the right end of
/// the domain the last non-empty span is returned so the final basis
/// function evaluates to one.
pub fn find_span(knots: &[f64], degree: usize, u: f64) -> usize {
    let n_basis = knots.len() - degree - 1;
    let lo = knots[degree];
    let hi = knots[n_basis];
    let u = u.clamp(lo, hi);

    if u >= hi {
        let mut mu = n_basis - 1;
        while mu > degree && knots[mu] >= knots[mu + 1] {
            mu -= 1;
        }
        return mu;
    }

    let mut mu = degree;
    while mu < n_basis - 1 && u >= knots[mu + 1] {
        mu += 1;
    }
    mu
}

/// Values of all `knots.len() - degree - 1` basis functions at `u`.
///
/// Cox–de Boor recurrence in the triangular form of Piegl & Tiller
/// (Algorithm A2.2). Zero denominators from repeated knots contribute zero.
pub fn basis_functions(knots: &[f64], degree: usize, u: f64) -> Vec<f64> {
    let n_basis = knots.len() - degree - 1;
    let u = u.clamp(knots[degree], knots[n_basis]);
    let mu = find_span(knots, degree, u);

    let mut n = vec![0.0; degree + 1];
    let mut left = vec![0.0; degree + 1];
    let mut right = vec![0.0; degree + 1];
    n[0] = 1.0;

    for d in 1..=degree {
        left[d] = u - knots[mu + 1 - d];
        right[d] = knots[mu + d] - u;
        let mut saved = 0.0;
        for r in 0..d {
            let den = right[r + 1] + left[d - r];
            let temp = if den.abs() > 1e-14 { n[r] / den } else { 0.0 };
            n[r] = saved + right[r + 1] * temp;
            saved = left[d - r] * temp;
        }
        n[d] = saved;
    }

    let mut values = vec![0.0; n_basis];
    let start = mu - degree;
    for (i, v) in n.into_iter().enumerate() {
        values[start + i] = v;
    }
    values
}

/// First derivatives of all basis functions at `u`.
///
/// `N'_{j,k} = k N_{j,k-1} / (t_{j+k} - t_j) - k N_{j+1,k-1} / (t_{j+k+1} - t_{j+1})`,
/// with the lower-degree basis evaluated over the same knot vector.
pub fn basis_derivatives(knots: &[f64], degree: usize, u: f64) -> Vec<f64> {
    let n_basis = knots.len() - degree - 1;
    if degree == 0 {
        return vec![0.0; n_basis];
    }
    let lower = basis_functions(knots, degree - 1, u);
    let k = degree as f64;

    (0..n_basis)
        .map(|j| {
            let den_a = knots[j + degree] - knots[j];
            let den_b = knots[j + degree + 1] - knots[j + 1];
            let a = if den_a > 0.0 { lower[j] / den_a } else { 0.0 };
            let b = if den_b > 0.0 { lower[j + 1] / den_b } else { 0.0 };
            k * (a - b)
        })
        .collect()
}

/// Clamped knot vector whose interior knots sample the parameter profile.
///
/// `params` is the normalized arc-length profile of an N-point path; the
/// result has `N + degree + 1` knots so the spline carries N control points.
pub fn arc_length_knots(params: &[f64], degree: usize) -> Vec<f64> {
    let n = params.len();
    let interior_count = n - degree - 1;
    let inner = &params[1..n - 1];

    let mut knots = Vec::with_capacity(n + degree + 1);
    knots.extend(std::iter::repeat(0.0).take(degree + 1));
    for i in 0..interior_count {
        let pos = ((inner.len() - 1) as f64 * (i + 1) as f64 / (interior_count + 1) as f64).round();
        knots.push(inner[pos as usize]);
    }
    knots.extend(std::iter::repeat(1.0).take(degree + 1));
    knots
}

/// Natural smoothing-spline penalty `K = Q R⁻¹ Qᵗ` for the given abscissae.
///
/// For values `f` sampled at `x`, `fᵗ K f` is the integrated squared second
/// derivative of their natural cubic interpolant. Only the spacing matters.
pub fn second_derivative_penalty(x: &[f64]) -> Result<DMatrix<f64>> {
    let m = x.len();
    if m < 3 {
        return Err(MergeError::degenerate(format!(
            "curvature penalty needs at least 3 abscissae, got {}",
            m
        )));
    }
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    if h.iter().any(|&hi| hi <= 0.0) {
        return Err(MergeError::degenerate("abscissae must be strictly increasing"));
    }

    let mut q = DMatrix::zeros(m, m - 2);
    let mut r = DMatrix::zeros(m - 2, m - 2);
    for i in 0..m - 2 {
        q[(i, i)] = 1.0 / h[i];
        q[(i + 1, i)] = -(1.0 / h[i] + 1.0 / h[i + 1]);
        q[(i + 2, i)] = 1.0 / h[i + 1];
        r[(i, i)] = (h[i] + h[i + 1]) / 3.0;
        if i + 1 < m - 2 {
            r[(i + 1, i)] = h[i + 1] / 6.0;
            r[(i, i + 1)] = h[i + 1] / 6.0;
        }
    }

    let chol = r
        .cholesky()
        .ok_or_else(|| MergeError::Solver("curvature band matrix is not positive definite".into()))?;
    let r_inv_qt = chol.solve(&q.transpose());
    Ok(&q * r_inv_qt)
}

/// Solve `lhs · x = rhs` through the SVD pseudo-inverse.
pub fn solve_pseudo_inverse(lhs: DMatrix<f64>, rhs: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let svd = lhs
        .try_svd(true, true, f64::EPSILON, 0)
        .ok_or_else(|| MergeError::Solver("SVD did not converge".into()))?;
    let sigma_max = svd.singular_values.max();
    svd.solve(rhs, sigma_max * PINV_RCOND)
        .map_err(|e| MergeError::Solver(e.to_string()))
}

// ========== Shared fitting setup ==========

/// Everything about a fit that depends only on the point positions.
#[derive(Debug, Clone)]
pub(crate) struct FitBasis {
    /// Input points with coincident neighbours removed
    pub points: Path,
    /// Index into the input path of each kept point
    pub kept: Vec<usize>,
    /// Normalized arc-length parameter of each kept point
    pub params: Vec<f64>,
    /// Clamped knot vector in `[0, 1]`
    pub knots: Vec<f64>,
    /// Basis matrix B (N×M)
    pub basis: DMatrix<f64>,
    /// Curvature penalty K (N×N)
    pub penalty: DMatrix<f64>,
}

impl FitBasis {
    pub(crate) fn build(path: &[Point2<f64>], degree: usize) -> Result<Self> {
        if degree == 0 {
            return Err(MergeError::parameter("spline degree must be at least 1"));
        }
        let kept = geometry::dedup_consecutive(path, COINCIDENT_EPS);
        let points: Path = kept.iter().map(|&i| path[i]).collect();
        let n = points.len();
        if n < degree + 2 {
            return Err(MergeError::degenerate(format!(
                "{} distinct points cannot fit a degree-{} spline (need {})",
                n,
                degree,
                degree + 2
            )));
        }

        let profile = geometry::arc_length_profile(&points);
        let total = profile[n - 1];
        if total <= 0.0 {
            return Err(MergeError::degenerate("path has zero arc length"));
        }
        let params: Vec<f64> = profile.iter().map(|s| s / total).collect();
        let knots = arc_length_knots(&params, degree);

        let m = knots.len() - degree - 1;
        let mut basis = DMatrix::zeros(n, m);
        for (row, &u) in params.iter().enumerate() {
            for (col, v) in basis_functions(&knots, degree, u).into_iter().enumerate() {
                basis[(row, col)] = v;
            }
        }

        let penalty = second_derivative_penalty(&profile)?;

        Ok(Self { points, kept, params, knots, basis, penalty })
    }

    pub(crate) fn control_count(&self) -> usize {
        self.basis.ncols()
    }

    /// The kept points as an N×2 matrix.
    pub(crate) fn targets(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.points.len(), 2, |i, j| self.points[i][j])
    }
}

/// Fit a smoothing B-spline to `path`.
///
/// `lambda` in `[0, 1]` moves the fit from pure fidelity (0) to pure
/// curvature minimization (1). With `clamp_endpoints` the curve starts and
/// ends exactly on the first and last input points.
pub fn fit_spline(
    path: &[Point2<f64>],
    degree: usize,
    lambda: f64,
    clamp_endpoints: bool,
) -> Result<SplineCurve> {
    if !(0.0..=1.0).contains(&lambda) {
        return Err(MergeError::parameter(format!("smoothing lambda {} outside [0, 1]", lambda)));
    }
    let fb = FitBasis::build(path, degree)?;
    let m = fb.control_count();
    let n = fb.points.len();

    let b = &fb.basis;
    let bt = b.transpose();
    let gram = (&bt * b) * (1.0 - lambda) + (&bt * &fb.penalty * b) * lambda;

    let mut lhs = DMatrix::zeros(m + 2, m + 2);
    lhs.view_mut((0, 0), (m, m)).copy_from(&gram);
    let mut rhs = DMatrix::zeros(m + 2, 2);
    rhs.view_mut((0, 0), (m, 2)).copy_from(&((&bt * fb.targets()) * (1.0 - lambda)));

    if clamp_endpoints {
        lhs[(m, 0)] = 1.0;
        lhs[(0, m)] = 1.0;
        lhs[(m + 1, m - 1)] = 1.0;
        lhs[(m - 1, m + 1)] = 1.0;
        for axis in 0..2 {
            rhs[(m, axis)] = fb.points[0][axis];
            rhs[(m + 1, axis)] = fb.points[n - 1][axis];
        }
    }

    let solution = solve_pseudo_inverse(lhs, &rhs)?;
    let control_points = (0..m)
        .map(|i| Point2::new(solution[(i, 0)], solution[(i, 1)]))
        .collect();

    trace!(points = n, controls = m, lambda, "fitted smoothing spline");
    SplineCurve::new(fb.knots, control_points, degree)
}

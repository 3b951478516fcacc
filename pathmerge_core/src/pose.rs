//! 2D rigid transforms applied to whole paths.
//!
//! Poses are plain `nalgebra::Isometry2<f64>`: composition is `*`,
//! inversion is `inverse()`. This module only adds the path-level glue.

use nalgebra::{Isometry2, Point2, Vector2};

use crate::geometry::Path;

/// Planar pose (x, y, heading).
pub type Pose2 = Isometry2<f64>;

/// Build a pose from position and heading in radians.
pub fn pose(x: f64, y: f64, heading: f64) -> Pose2 {
    Isometry2::new(Vector2::new(x, y), heading)
}

/// Pose of `target` expressed in the frame of `reference`.
pub fn relative_pose(reference: &Pose2, target: &Pose2) -> Pose2 {
    reference.inverse() * target
}

/// Apply a rigid transform to every point of a path.
pub trait PathTransform {
    fn transform_path(&self, path: &[Point2<f64>]) -> Path;
}

impl PathTransform for Pose2 {
    fn transform_path(&self, path: &[Point2<f64>]) -> Path {
        path.iter().map(|p| self.transform_point(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_transform_path_rotates_and_translates() {
        let x = pose(1.0, 2.0, FRAC_PI_2);
        let out = x.transform_path(&[Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)]);
        assert_relative_eq!(out[0].x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(out[0].y, 3.0, epsilon = 1e-12);
        assert_relative_eq!(out[1].x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(out[1].y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_relative_pose_round_trip() {
        let a = pose(3.0, -1.0, 0.4);
        let b = pose(5.0, 2.0, 1.1);
        let rel = relative_pose(&a, &b);
        let back = a * rel;
        assert_relative_eq!(back.translation.vector, b.translation.vector, epsilon = 1e-12);
        assert_relative_eq!(back.rotation.angle(), 1.1, epsilon = 1e-12);
    }
}

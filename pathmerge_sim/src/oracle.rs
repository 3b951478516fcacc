//! Ground truth oracle for simulation.
//!
//! The Oracle owns the "God's eye view" of one drive:
//! - The true road centre line in world coordinates
//! - The vehicle moving along it at constant speed
//! - Candidate paths as a planner would publish them (ego frame, noisy)

use nalgebra::{Point2, Vector2};
use pathmerge_core::geometry::{arc_length_profile, Path};
use pathmerge_core::{pose, PathTransform, Pose2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Sampling step of the ground-truth centre line (metres along x).
const ROAD_STEP_M: f64 = 0.05;

/// Shape of the road centre line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoadShape {
    /// y = 0
    Straight,
    /// y = 9 ((x + 1)^0.4 - 1), a bend that tightens toward the start
    PowerCurve,
    /// 3.5 m lateral shift between x = 30 and x = 60
    LaneChange,
    /// y = 4 sin(2πx / 60)
    SBend,
}

impl RoadShape {
    fn lateral(&self, x: f64) -> f64 {
        match self {
            RoadShape::Straight => 0.0,
            RoadShape::PowerCurve => 9.0 * ((x + 1.0).powf(0.4) - 1.0),
            RoadShape::LaneChange => {
                let s = ((x - 30.0) / 30.0).clamp(0.0, 1.0);
                3.5 * s * s * (3.0 - 2.0 * s)
            }
            RoadShape::SBend => 4.0 * (2.0 * std::f64::consts::PI * x / 60.0).sin(),
        }
    }
}

/// Densely sampled road centre line.
#[derive(Debug, Clone)]
pub struct Road {
    shape: RoadShape,
    points: Path,
    profile: Vec<f64>,
}

impl Road {
    /// Builds a road at least `length_m` long (measured along x).
    pub fn new(shape: RoadShape, length_m: f64) -> Self {
        let n = (length_m.max(1.0) / ROAD_STEP_M).ceil() as usize;
        let points: Path = (0..=n)
            .map(|i| {
                let x = i as f64 * ROAD_STEP_M;
                Point2::new(x, shape.lateral(x))
            })
            .collect();
        let profile = arc_length_profile(&points);
        Self { shape, points, profile }
    }

    pub fn shape(&self) -> RoadShape {
        self.shape
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    /// Total arc length in metres.
    pub fn length(&self) -> f64 {
        self.profile.last().copied().unwrap_or(0.0)
    }

    /// Position and heading at arc length `s`, clamped to the road.
    pub fn sample(&self, s: f64) -> (Point2<f64>, f64) {
        let s = s.clamp(0.0, self.length());
        let i = self
            .profile
            .partition_point(|&v| v <= s)
            .saturating_sub(1)
            .min(self.points.len() - 2);
        let seg = self.profile[i + 1] - self.profile[i];
        let t = if seg > 0.0 { (s - self.profile[i]) / seg } else { 0.0 };
        let d = self.points[i + 1] - self.points[i];
        (self.points[i] + d * t, d.y.atan2(d.x))
    }

    /// Pose of a vehicle on the centre line at arc length `s`.
    pub fn pose_at(&self, s: f64) -> Pose2 {
        let (p, heading) = self.sample(s);
        pose(p.x, p.y, heading)
    }

    /// Distance from `point` to the centre line.
    pub fn distance_to(&self, point: &Point2<f64>) -> f64 {
        distance_to_polyline(point, &self.points)
    }
}

/// Shortest distance from `point` to the segments of `path`.
pub fn distance_to_polyline(point: &Point2<f64>, path: &[Point2<f64>]) -> f64 {
    match path.len() {
        0 => f64::INFINITY,
        1 => (path[0] - point).norm(),
        _ => path
            .windows(2)
            .map(|w| {
                let d = w[1] - w[0];
                let len2 = d.norm_squared();
                let t = if len2 > 0.0 { ((point - w[0]).dot(&d) / len2).clamp(0.0, 1.0) } else { 0.0 };
                (w[0] + d * t - point).norm()
            })
            .fold(f64::INFINITY, f64::min),
    }
}

/// How the simulated planner behaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Vehicle speed along the road (m/s)
    pub speed_mps: f64,

    /// Length of each candidate path (m)
    pub horizon_m: f64,

    /// Point spacing of each candidate path (m)
    pub spacing_m: f64,

    /// Per-point lateral noise standard deviation (m)
    pub lateral_noise_std: f64,

    /// Per-plan lateral bias standard deviation (m)
    pub bias_std: f64,

    /// Every n-th plan is offset sideways by `jump_offset_m`
    pub replan_jump_every: Option<u64>,

    /// Lateral offset of a jumped plan (m)
    pub jump_offset_m: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            speed_mps: 10.0 / 3.6,
            horizon_m: 20.0,
            spacing_m: 0.2,
            lateral_noise_std: 0.0,
            bias_std: 0.0,
            replan_jump_every: None,
            jump_offset_m: 8.0,
        }
    }
}

/// The Oracle - moves the vehicle and produces candidate paths.
pub struct Oracle {
    road: Road,
    planner: PlannerConfig,
    rng: ChaCha8Rng,
    noise: Option<Normal<f64>>,
    bias: Option<Normal<f64>>,
    arc_position: f64,
    current_time: f64,
    plans: u64,
}

impl Oracle {
    /// Creates an Oracle at the start of `road`.
    ///
    /// Zero or invalid standard deviations disable the matching noise source.
    pub fn new(road: Road, planner: PlannerConfig, seed: u64) -> Self {
        let gaussian = |std: f64| (std > 0.0).then(|| Normal::new(0.0, std).ok()).flatten();
        Self {
            noise: gaussian(planner.lateral_noise_std),
            bias: gaussian(planner.bias_std),
            road,
            planner,
            rng: ChaCha8Rng::seed_from_u64(seed),
            arc_position: 0.0,
            current_time: 0.0,
            plans: 0,
        }
    }

    /// Advances the vehicle by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;
        self.arc_position = (self.arc_position + self.planner.speed_mps * dt).min(self.road.length());
    }

    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn speed(&self) -> f64 {
        self.planner.speed_mps
    }

    pub fn road(&self) -> &Road {
        &self.road
    }

    /// Current vehicle pose in world coordinates.
    pub fn vehicle_pose(&self) -> Pose2 {
        self.road.pose_at(self.arc_position)
    }

    /// Produces the next candidate path in the vehicle's ego frame.
    ///
    /// The path follows the road ahead of the vehicle. The per-plan bias
    /// fades in over the first two metres so a normal plan starts at the
    /// vehicle; a replan jump shifts the whole path.
    pub fn plan(&mut self) -> Path {
        self.plans += 1;
        let bias = match &self.bias {
            Some(b) => b.sample(&mut self.rng),
            None => 0.0,
        };
        let jump = match self.planner.replan_jump_every {
            Some(every) if every > 0 && self.plans % every == 0 => self.planner.jump_offset_m,
            _ => 0.0,
        };

        let n = (self.planner.horizon_m / self.planner.spacing_m).ceil() as usize;
        let mut world: Path = Vec::with_capacity(n + 1);
        for k in 0..=n {
            let ahead = k as f64 * self.planner.spacing_m;
            let s = self.arc_position + ahead;
            if s > self.road.length() {
                break;
            }
            let (p, heading) = self.road.sample(s);
            let jitter = match &self.noise {
                Some(d) if k > 0 => d.sample(&mut self.rng),
                _ => 0.0,
            };
            let fade = (ahead / 2.0).min(1.0);
            let normal = Vector2::new(-heading.sin(), heading.cos());
            world.push(p + normal * (bias * fade + jump + jitter));
        }

        self.vehicle_pose().inverse().transform_path(&world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_road_sample_interpolates() {
        let road = Road::new(RoadShape::Straight, 10.0);
        assert!(road.length() >= 10.0 - 1e-9);
        let (p, heading) = road.sample(2.525);
        assert_relative_eq!(p.x, 2.525, epsilon = 1e-9);
        assert_relative_eq!(heading, 0.0);
        let (end, _) = road.sample(1e6);
        let last = road.points()[road.points().len() - 1];
        assert_relative_eq!(end.x, last.x, epsilon = 1e-9);
    }

    #[test]
    fn test_distance_to_polyline() {
        let path = vec![Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)];
        assert_relative_eq!(distance_to_polyline(&Point2::new(5.0, 2.0), &path), 2.0);
        assert_relative_eq!(distance_to_polyline(&Point2::new(-3.0, 4.0), &path), 5.0);
        assert!(distance_to_polyline(&Point2::origin(), &[]).is_infinite());
    }

    #[test]
    fn test_plan_starts_at_vehicle_in_ego_frame() {
        let road = Road::new(RoadShape::SBend, 100.0);
        let planner = PlannerConfig { bias_std: 0.5, lateral_noise_std: 0.1, ..PlannerConfig::default() };
        let mut oracle = Oracle::new(road, planner, 7);
        oracle.step(1.0);

        let plan = oracle.plan();
        assert_relative_eq!(plan[0].x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(plan[0].y, 0.0, epsilon = 1e-9);
        assert!(plan[plan.len() - 1].x > 15.0);
    }

    #[test]
    fn test_same_seed_same_plans() {
        let planner = PlannerConfig { lateral_noise_std: 0.2, ..PlannerConfig::default() };
        let mut a = Oracle::new(Road::new(RoadShape::Straight, 50.0), planner.clone(), 3);
        let mut b = Oracle::new(Road::new(RoadShape::Straight, 50.0), planner, 3);
        assert_eq!(a.plan(), b.plan());
        assert_eq!(a.plan(), b.plan());
    }

    #[test]
    fn test_replan_jump_offsets_every_nth_plan() {
        let planner = PlannerConfig { replan_jump_every: Some(2), ..PlannerConfig::default() };
        let mut oracle = Oracle::new(Road::new(RoadShape::Straight, 50.0), planner, 1);
        let first = oracle.plan();
        let second = oracle.plan();
        assert_relative_eq!(first[first.len() - 1].y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(second[second.len() - 1].y, 8.0, epsilon = 1e-9);
    }

    fn arb_shape() -> impl Strategy<Value = RoadShape> {
        prop_oneof![
            Just(RoadShape::Straight),
            Just(RoadShape::PowerCurve),
            Just(RoadShape::LaneChange),
            Just(RoadShape::SBend),
        ]
    }

    proptest! {
        #[test]
        fn road_samples_lie_on_centre_line(shape in arb_shape(), s in -10.0f64..150.0) {
            let road = Road::new(shape, 100.0);
            let (p, heading) = road.sample(s);
            prop_assert!(road.distance_to(&p) < 1e-9);
            prop_assert!(heading.abs() <= std::f64::consts::FRAC_PI_2);

            let pose = road.pose_at(s);
            prop_assert!((pose.translation.vector - p.coords).norm() < 1e-12);
        }
    }
}

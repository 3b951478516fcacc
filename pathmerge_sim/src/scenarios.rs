//! Driving scenarios for the merge harness.

use crate::oracle::{PlannerConfig, RoadShape};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// SIM-001: clean plans on a straight road
    StraightCruise,

    /// SIM-002: clean plans on a bend that tightens toward the start
    CurvedRoad,

    /// SIM-003: 3.5 m lane change with small planner bias
    LaneChange,

    /// SIM-004: vehicle standing still, identical plans every cycle
    Stationary,

    /// SIM-005: S-bend with per-point noise and per-plan bias
    NoisyPlanner,

    /// SIM-006: every 20th plan jumps 8 m sideways
    ReplanJump,
}

/// Pass/fail limits for one scenario.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Largest allowed change of the path's offset at the vehicle between cycles (m)
    pub max_splice_jump_m: Option<f64>,

    /// Largest allowed heading change between consecutive path segments (rad)
    pub max_heading_step_rad: f64,

    /// Largest allowed distance of any committed point from the road (m)
    pub max_lateral_error_m: f64,

    /// Whether hard splices are expected (`true`) or forbidden (`false`)
    pub expect_fallbacks: bool,
}

/// Everything the runner needs to set up a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioSetup {
    pub road: RoadShape,
    pub planner: PlannerConfig,
    pub thresholds: Thresholds,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::StraightCruise,
            ScenarioId::CurvedRoad,
            ScenarioId::LaneChange,
            ScenarioId::Stationary,
            ScenarioId::NoisyPlanner,
            ScenarioId::ReplanJump,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::StraightCruise => "straight_cruise",
            ScenarioId::CurvedRoad => "curved_road",
            ScenarioId::LaneChange => "lane_change",
            ScenarioId::Stationary => "stationary",
            ScenarioId::NoisyPlanner => "noisy_planner",
            ScenarioId::ReplanJump => "replan_jump",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::StraightCruise => "Clean plans on a straight road at 10 km/h",
            ScenarioId::CurvedRoad => "Clean plans on a y = 9x^0.4 bend",
            ScenarioId::LaneChange => "3.5 m lane change with 5 cm planner bias",
            ScenarioId::Stationary => "Vehicle at rest, identical plans, merge must not drift",
            ScenarioId::NoisyPlanner => "S-bend with 5 cm point noise and 10 cm plan bias",
            ScenarioId::ReplanJump => "Every 20th plan is 8 m off, expect hard splices",
        }
    }

    /// Road, planner, and limits for this scenario.
    pub fn setup(&self) -> ScenarioSetup {
        let clean = Thresholds {
            max_splice_jump_m: Some(0.25),
            max_heading_step_rad: 0.2,
            max_lateral_error_m: 0.3,
            expect_fallbacks: false,
        };
        let planner = PlannerConfig::default();

        match self {
            ScenarioId::StraightCruise => ScenarioSetup {
                road: RoadShape::Straight,
                planner,
                thresholds: clean,
            },
            ScenarioId::CurvedRoad => ScenarioSetup {
                road: RoadShape::PowerCurve,
                planner,
                thresholds: clean,
            },
            ScenarioId::LaneChange => ScenarioSetup {
                road: RoadShape::LaneChange,
                planner: PlannerConfig { bias_std: 0.05, ..planner },
                thresholds: Thresholds { max_lateral_error_m: 0.6, ..clean },
            },
            ScenarioId::Stationary => ScenarioSetup {
                road: RoadShape::SBend,
                planner: PlannerConfig { speed_mps: 0.0, ..planner },
                thresholds: Thresholds { max_splice_jump_m: Some(1e-3), ..clean },
            },
            ScenarioId::NoisyPlanner => ScenarioSetup {
                road: RoadShape::SBend,
                planner: PlannerConfig { lateral_noise_std: 0.05, bias_std: 0.1, ..planner },
                thresholds: Thresholds {
                    max_splice_jump_m: Some(0.5),
                    max_heading_step_rad: 0.35,
                    max_lateral_error_m: 1.0,
                    expect_fallbacks: false,
                },
            },
            ScenarioId::ReplanJump => ScenarioSetup {
                road: RoadShape::Straight,
                planner: PlannerConfig { replan_jump_every: Some(20), ..planner },
                thresholds: Thresholds {
                    max_splice_jump_m: None,
                    max_heading_step_rad: 0.35,
                    max_lateral_error_m: 10.0,
                    expect_fallbacks: true,
                },
            },
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "straight_cruise" | "straight" | "sim-001" => Ok(ScenarioId::StraightCruise),
            "curved_road" | "curved" | "sim-002" => Ok(ScenarioId::CurvedRoad),
            "lane_change" | "lanechange" | "sim-003" => Ok(ScenarioId::LaneChange),
            "stationary" | "sim-004" => Ok(ScenarioId::Stationary),
            "noisy_planner" | "noisy" | "sim-005" => Ok(ScenarioId::NoisyPlanner),
            "replan_jump" | "replanjump" | "sim-006" => Ok(ScenarioId::ReplanJump),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
            assert_eq!(id.to_string(), id.name());
        }
        assert_eq!("SIM-004".parse::<ScenarioId>(), Ok(ScenarioId::Stationary));
        assert!("warp_drive".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_only_replan_jump_expects_fallbacks() {
        for id in ScenarioId::all() {
            let expected = id == ScenarioId::ReplanJump;
            assert_eq!(id.setup().thresholds.expect_fallbacks, expected, "{}", id);
        }
    }
}

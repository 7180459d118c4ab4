//! Minimal planar world for running a swarm from a scenario file
//!
//! Robots are unicycles driven by their wheel speeds. Range and bearing
//! between robots, and to circular obstacles, are computed from positions.

use crate::config::ControllerConfig;
use crate::config_loader::parse_document;
use crate::geometry::{signed_normalize, Vec2};
use crate::motion::{ProximityReading, WheelSpeeds};
use crate::swarm::messages::{IdKind, MoveMode, RobotId, Role, TeamId};
use crate::swarm::node::{Robot, TickOutput};
use crate::swarm::scheduler::Environment;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use tracing::debug;

fn default_comm_range() -> f64 {
    80.0
}

fn default_dt() -> f64 {
    0.1
}

fn default_axle_length() -> f64 {
    5.3
}

fn default_arrival_radius() -> f64 {
    5.0
}

/// Scenario file contents
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Scenario {
    pub robots: Vec<RobotSpec>,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
    /// Maximum range at which packets are heard, cm
    #[serde(default = "default_comm_range")]
    pub comm_range: f64,
    /// Seconds per tick
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Distance between the wheels, cm
    #[serde(default = "default_axle_length")]
    pub axle_length: f64,
    /// A leader moves on to its next waypoint within this distance, cm
    #[serde(default = "default_arrival_radius")]
    pub arrival_radius: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RobotSpec {
    pub id: RobotId,
    #[serde(default)]
    pub team: Option<TeamId>,
    pub x: f64,
    pub y: f64,
    /// Degrees, counter-clockwise from +x
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub waypoints: Vec<[f64; 2]>,
    /// Task signal broadcast by a leader
    #[serde(default)]
    pub task: Option<bool>,
}

impl RobotSpec {
    /// Leaders carry an `L` id; followers without a team start as connectors
    pub fn role(&self) -> Role {
        match (self.id.kind, self.team) {
            (IdKind::Leader, _) => Role::Leader,
            (IdKind::Follower, Some(_)) => Role::Follower,
            (IdKind::Follower, None) => Role::Connector,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Obstacle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl Scenario {
    /// Load and check a YAML or JSON scenario
    pub fn load(path: &Path) -> Result<Self> {
        let scenario: Scenario = parse_document(path)
            .with_context(|| format!("failed to load scenario {}", path.display()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.robots.is_empty() {
            bail!("scenario has no robots");
        }
        if [self.dt, self.comm_range, self.axle_length]
            .iter()
            .any(|v| !v.is_finite() || *v <= 0.0)
        {
            bail!("dt, commRange and axleLength must be positive");
        }
        let mut seen = HashSet::new();
        for spec in &self.robots {
            if !seen.insert(spec.id) {
                bail!("duplicate robot id {}", spec.id);
            }
            if spec.team == Some(255) {
                bail!("robot {}: team 255 is reserved", spec.id);
            }
            if spec.id.kind == IdKind::Leader && spec.team.is_none() {
                bail!("leader {} needs a team", spec.id);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Body {
    position: Vec2,
    /// Radians
    heading: f64,
    waypoints: VecDeque<Vec2>,
    task: Option<bool>,
    leader: bool,
}

/// Final or per-tick summary of one robot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotSummary {
    pub id: RobotId,
    pub role: Role,
    pub move_mode: MoveMode,
    pub team: Option<TeamId>,
    /// Hop count per team
    pub hops: BTreeMap<TeamId, u8>,
    pub performing_task: bool,
    pub x: f64,
    pub y: f64,
}

/// Robot bodies and obstacles
#[derive(Debug, Clone)]
pub struct World {
    bodies: Vec<Body>,
    obstacles: Vec<Obstacle>,
    comm_range: f64,
    dt: f64,
    axle_length: f64,
    arrival_radius: f64,
    proximity_range: f64,
    max_speed: f64,
}

impl World {
    pub fn from_scenario(scenario: &Scenario, config: &ControllerConfig) -> Self {
        let bodies = scenario
            .robots
            .iter()
            .map(|spec| Body {
                position: Vec2::new(spec.x, spec.y),
                heading: spec.heading.to_radians(),
                waypoints: spec
                    .waypoints
                    .iter()
                    .map(|[x, y]| Vec2::new(*x, *y))
                    .collect(),
                task: spec.task,
                leader: spec.role() == Role::Leader,
            })
            .collect();
        Self {
            bodies,
            obstacles: scenario.obstacles.clone(),
            comm_range: scenario.comm_range,
            dt: scenario.dt,
            axle_length: scenario.axle_length,
            arrival_radius: scenario.arrival_radius,
            proximity_range: config.proximity_range,
            max_speed: config.wheel_turning.max_speed,
        }
    }

    pub fn position(&self, robot: usize) -> Vec2 {
        self.bodies[robot].position
    }

    /// Move every body according to its wheel speeds
    pub fn advance(&mut self, outputs: &[TickOutput]) {
        for (body, output) in self.bodies.iter_mut().zip(outputs) {
            let WheelSpeeds { left, right } = output.wheels;
            let v = (left + right) / 2.0;
            let omega = (right - left) / self.axle_length;
            body.heading = signed_normalize(body.heading + omega * self.dt);
            body.position += Vec2::from_polar(v * self.dt, body.heading);

            if let Some(next) = body.waypoints.front() {
                if (*next - body.position).length() <= self.arrival_radius {
                    debug!(x = next.x, y = next.y, "waypoint reached");
                    body.waypoints.pop_front();
                }
            }
        }
    }

    pub fn summaries(&self, robots: &[Robot]) -> Vec<RobotSummary> {
        robots
            .iter()
            .zip(&self.bodies)
            .map(|(robot, body)| {
                let state = robot.state();
                RobotSummary {
                    id: robot.id(),
                    role: state.role,
                    move_mode: state.move_mode,
                    team: state.team,
                    hops: state.hops.iter().map(|(t, h)| (*t, h.count)).collect(),
                    performing_task: state.performing_task,
                    x: body.position.x,
                    y: body.position.y,
                }
            })
            .collect()
    }

    /// Express a world-frame offset in a robot's frame
    fn local(&self, robot: usize, offset: Vec2) -> Vec2 {
        offset.rotated(-self.bodies[robot].heading)
    }
}

impl Environment for World {
    fn link(&self, receiver: usize, sender: usize) -> Option<Vec2> {
        let offset = self.bodies[sender].position - self.bodies[receiver].position;
        if offset.length() > self.comm_range {
            return None;
        }
        Some(self.local(receiver, offset))
    }

    fn proximity(&self, robot: usize) -> Vec<ProximityReading> {
        let position = self.bodies[robot].position;
        self.obstacles
            .iter()
            .filter_map(|o| {
                let offset = Vec2::new(o.x, o.y) - position;
                let distance = (offset.length() - o.radius).max(0.0);
                (distance <= self.proximity_range).then(|| ProximityReading {
                    distance,
                    angle: self.local(robot, offset).angle(),
                })
            })
            .collect()
    }

    fn control(&self, robot: usize) -> Option<Vec2> {
        let body = &self.bodies[robot];
        if !body.leader {
            return None;
        }
        let target = body.waypoints.front()?;
        let offset = *target - body.position;
        Some(self.local(robot, offset).normalized() * self.max_speed)
    }

    fn task(&self, robot: usize) -> Option<bool> {
        self.bodies[robot].task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::node::Indicator;

    const SCENARIO: &str = r#"
robots:
  - { id: L1, team: 1, x: 0, y: 0, heading: 90, waypoints: [[0, 100]], task: true }
  - { id: F2, team: 1, x: 20, y: 0 }
  - { id: F7, x: 200, y: 0 }
obstacles:
  - { x: 0, y: 8, radius: 3 }
commRange: 50
"#;

    fn world() -> (Scenario, World) {
        let scenario: Scenario = serde_yaml::from_str(SCENARIO).unwrap();
        scenario.validate().unwrap();
        let world = World::from_scenario(&scenario, &ControllerConfig::default());
        (scenario, world)
    }

    fn output(left: f64, right: f64) -> TickOutput {
        TickOutput {
            wheels: WheelSpeeds { left, right },
            packet: vec![],
            event: None,
            indicator: Indicator::Off,
        }
    }

    #[test]
    fn test_roles_from_ids() {
        let (scenario, _) = world();
        let roles: Vec<Role> = scenario.robots.iter().map(RobotSpec::role).collect();
        assert_eq!(roles, vec![Role::Leader, Role::Follower, Role::Connector]);
        assert_eq!(scenario.dt, 0.1);
    }

    #[test]
    fn test_link_in_receiver_frame() {
        let (_, world) = world();
        // leader faces +y, follower is at +x in world frame: to its right
        let dir = world.link(0, 1).unwrap();
        assert!((dir.x - 0.0).abs() < 1e-9);
        assert!((dir.y + 20.0).abs() < 1e-9);
        assert!(world.link(0, 2).is_none());
    }

    #[test]
    fn test_obstacle_ahead_of_leader() {
        let (_, world) = world();
        let readings = world.proximity(0);
        assert_eq!(readings.len(), 1);
        assert!((readings[0].distance - 5.0).abs() < 1e-9);
        assert!(readings[0].angle.abs() < 1e-9);
        assert!(world.proximity(2).is_empty());
    }

    #[test]
    fn test_leader_control_points_to_waypoint() {
        let (_, world) = world();
        let control = world.control(0).unwrap();
        assert!((control.x - 10.0).abs() < 1e-9);
        assert!(control.y.abs() < 1e-9);
        assert!(world.control(1).is_none());
        assert_eq!(world.task(0), Some(true));
    }

    #[test]
    fn test_unicycle_motion() {
        let (_, mut world) = world();
        world.advance(&[output(10.0, 10.0), output(0.0, 0.0), output(-5.3, 5.3)]);
        // leader drove 1 cm along +y
        assert!((world.position(0).y - 1.0).abs() < 1e-9);
        assert_eq!(world.position(1), Vec2::new(20.0, 0.0));
        // connector spun in place
        assert_eq!(world.position(2), Vec2::new(200.0, 0.0));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let mut scenario: Scenario = serde_yaml::from_str(SCENARIO).unwrap();
        scenario.robots.push(scenario.robots[1].clone());
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_rejects_teamless_leader() {
        let scenario: Scenario =
            serde_yaml::from_str("robots:\n  - { id: L1, x: 0, y: 0 }\n").unwrap();
        assert!(scenario.validate().is_err());
    }
}

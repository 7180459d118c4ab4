//! Virtual forces combined into the heading vector

use crate::config::{ControllerConfig, FlockingWeights, TeamFlockingParams};
use crate::geometry::Vec2;
use crate::motion::pid::Pid;
use crate::swarm::messages::{Message, TeamId, UNKNOWN_HOPS};
use crate::swarm::perception::Perception;

/// One proximity sensor reading in the robot frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityReading {
    /// Distance to the obstacle surface, cm
    pub distance: f64,
    /// Bearing of the reading, radians
    pub angle: f64,
}

/// The four force terms before weighting
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForceTerms {
    pub leader: Vec2,
    pub team: Vec2,
    pub robot: Vec2,
    pub obstacle: Vec2,
}

impl ForceTerms {
    /// Weighted sum of all terms
    pub fn heading(&self, weights: &FlockingWeights) -> Vec2 {
        self.leader * weights.leader
            + self.team * weights.team
            + self.robot * weights.robot
            + self.obstacle * weights.obstacle
    }
}

/// Generalized Lennard-Jones magnitude along the bearing to another robot.
/// Positive above the target distance (attraction), negative below.
pub fn lennard_jones(params: &TeamFlockingParams, distance: f64) -> f64 {
    let ratio = params.target_distance / distance;
    let attract = ratio.powf(params.exponent);
    -params.gain / distance * (attract * attract - attract)
}

/// Repulsive-only part of [`lennard_jones`]
pub fn lennard_jones_repulsion(params: &TeamFlockingParams, distance: f64) -> f64 {
    let ratio = params.target_distance / distance;
    -params.gain / distance * ratio.powf(2.0 * params.exponent)
}

fn average(sum: Vec2, n: usize) -> Vec2 {
    if n == 0 {
        Vec2::ZERO
    } else {
        sum / n as f64
    }
}

/// PID pull toward the next robot in the chain to the leader.
///
/// The bearing is the own leader when visible, otherwise the mean
/// direction of team members closer (in hops) to the leader.
pub fn leader_follow(
    pid: &mut Pid,
    target_distance: f64,
    max_speed: f64,
    my_hops: u8,
    team: TeamId,
    perception: &Perception,
) -> Vec2 {
    let bearing = match &perception.own_leader {
        Some(leader) => leader.direction,
        None => {
            if my_hops == UNKNOWN_HOPS {
                return Vec2::ZERO;
            }
            let closer: Vec<&Message> = perception
                .team
                .iter()
                .filter(|m| m.hop_count(team) < my_hops)
                .collect();
            if closer.is_empty() {
                return Vec2::ZERO;
            }
            let sum = closer.iter().fold(Vec2::ZERO, |acc, m| acc + m.direction);
            average(sum, closer.len())
        }
    };

    let u = pid.calculate(target_distance, bearing.length());
    Vec2::from_polar(-u, bearing.angle()).clamp_length(max_speed)
}

/// Lattice force toward team members at the locally smallest hop count
pub fn team_lattice(
    params: &TeamFlockingParams,
    max_speed: f64,
    team: TeamId,
    perception: &Perception,
) -> Vec2 {
    let min_hops = perception
        .team
        .iter()
        .map(|m| m.hop_count(team))
        .min()
        .unwrap_or(UNKNOWN_HOPS);

    let mut sum = Vec2::ZERO;
    let mut n = 0;
    for msg in perception.team.iter().filter(|m| m.hop_count(team) == min_hops) {
        let d = msg.range();
        if d <= 0.0 {
            continue;
        }
        sum += Vec2::from_polar(lennard_jones(params, d), msg.direction.angle());
        n += 1;
    }
    average(sum, n).clamp_length(max_speed)
}

/// Repulsion from every sensed robot
pub fn robot_repulsion(params: &TeamFlockingParams, max_speed: f64, perception: &Perception) -> Vec2 {
    let mut sum = Vec2::ZERO;
    let mut n = 0;
    for msg in &perception.messages {
        let d = msg.range();
        if d <= 0.0 {
            continue;
        }
        sum += Vec2::from_polar(lennard_jones_repulsion(params, d), msg.direction.angle());
        n += 1;
    }
    average(sum, n).clamp_length(max_speed)
}

/// Push away from every reading inside the sensing range, stronger the
/// closer the obstacle
pub fn obstacle_repulsion(readings: &[ProximityReading], range: f64, max_speed: f64) -> Vec2 {
    let mut sum = Vec2::ZERO;
    for reading in readings {
        if !(0.0..=range).contains(&reading.distance) {
            continue;
        }
        let strength = max_speed * (range - reading.distance) / range;
        sum -= Vec2::from_polar(strength, reading.angle);
    }
    sum.clamp_length(max_speed)
}

/// Terms for a leader: the host command replaces chain following and the lattice
pub fn leader_terms(
    config: &ControllerConfig,
    command: Vec2,
    perception: &Perception,
    readings: &[ProximityReading],
) -> ForceTerms {
    let max_speed = config.wheel_turning.max_speed;
    ForceTerms {
        leader: command.clamp_length(max_speed),
        team: Vec2::ZERO,
        robot: robot_repulsion(&config.team_flocking, max_speed, perception),
        obstacle: obstacle_repulsion(readings, config.proximity_range, max_speed),
    }
}

/// Terms for a follower or connector
pub fn member_terms(
    config: &ControllerConfig,
    pid: &mut Pid,
    membership: Option<(TeamId, u8)>,
    perception: &Perception,
    readings: &[ProximityReading],
) -> ForceTerms {
    let max_speed = config.wheel_turning.max_speed;
    let (leader, team) = match membership {
        Some((team, hops)) => (
            leader_follow(
                pid,
                config.leader_flocking.target_distance,
                max_speed,
                hops,
                team,
                perception,
            ),
            team_lattice(&config.team_flocking, max_speed, team, perception),
        ),
        None => (Vec2::ZERO, Vec2::ZERO),
    };
    ForceTerms {
        leader,
        team,
        robot: robot_repulsion(&config.team_flocking, max_speed, perception),
        obstacle: obstacle_repulsion(readings, config.proximity_range, max_speed),
    }
}

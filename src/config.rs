//! Controller configuration module

use crate::error::ConfigError;
use serde::Serialize;

/// Resolved and validated controller parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerConfig {
    /// Turning thresholds and wheel speed limits
    pub wheel_turning: WheelTurningParams,
    /// PID gains for following the leader chain
    pub leader_flocking: LeaderFlockingParams,
    /// Lennard-Jones parameters between robots
    pub team_flocking: TeamFlockingParams,
    /// Weight of each force in the heading sum
    pub weights: FlockingWeights,
    /// Connector formation distances
    pub team: TeamParams,
    /// Ticks a follower waits for an accept before giving up
    pub request_timeout: u32,
    /// Proximity readings beyond this range (cm) are ignored
    pub proximity_range: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WheelTurningParams {
    /// Radians
    pub hard_turn_threshold: f64,
    /// Radians, only used in hysteresis mode
    pub soft_turn_threshold: f64,
    /// Radians
    pub no_turn_threshold: f64,
    pub max_speed: f64,
    /// Headings shorter than this produce no motion
    pub deadband: f64,
    pub hysteresis: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderFlockingParams {
    /// Target distance to the next robot in the chain, cm
    pub target_distance: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamFlockingParams {
    /// Target robot-robot distance, cm
    pub target_distance: f64,
    pub gain: f64,
    pub exponent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlockingWeights {
    pub leader: f64,
    pub team: f64,
    pub robot: f64,
    pub obstacle: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamParams {
    pub separation_threshold: f64,
    pub joining_threshold: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            wheel_turning: WheelTurningParams {
                hard_turn_threshold: 90f64.to_radians(),
                soft_turn_threshold: 70f64.to_radians(),
                no_turn_threshold: 10f64.to_radians(),
                max_speed: 10.0,
                deadband: 1.0,
                hysteresis: false,
            },
            leader_flocking: LeaderFlockingParams {
                target_distance: 20.0,
                kp: 1.0,
                ki: 0.0,
                kd: 0.1,
            },
            team_flocking: TeamFlockingParams {
                target_distance: 15.0,
                gain: 100.0,
                exponent: 2.0,
            },
            weights: FlockingWeights {
                leader: 1.0,
                team: 1.0,
                robot: 1.0,
                obstacle: 5.0,
            },
            team: TeamParams {
                separation_threshold: 30.0,
                joining_threshold: 20.0,
            },
            request_timeout: 20,
            proximity_range: 10.0,
        }
    }
}

impl ControllerConfig {
    /// Check ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let wt = &self.wheel_turning;
        let max_angle = std::f64::consts::PI;
        for (field, value) in [
            ("wheelTurning.noTurnAngleThreshold", wt.no_turn_threshold),
            ("wheelTurning.softTurnAngleThreshold", wt.soft_turn_threshold),
            ("wheelTurning.hardTurnAngleThreshold", wt.hard_turn_threshold),
        ] {
            if !(0.0..=max_angle).contains(&value) {
                return Err(ConfigError::invalid(field, "must be within 0..=180 degrees"));
            }
        }
        if wt.no_turn_threshold > wt.soft_turn_threshold
            || wt.soft_turn_threshold > wt.hard_turn_threshold
        {
            return Err(ConfigError::invalid(
                "wheelTurning",
                "thresholds must satisfy noTurn <= softTurn <= hardTurn",
            ));
        }
        if wt.hard_turn_threshold == 0.0 {
            return Err(ConfigError::invalid(
                "wheelTurning.hardTurnAngleThreshold",
                "must be positive",
            ));
        }
        positive("wheelTurning.maxSpeed", wt.max_speed)?;
        non_negative("wheelTurning.deadband", wt.deadband)?;

        positive("leaderFlocking.targetDistance", self.leader_flocking.target_distance)?;
        finite("leaderFlocking.kp", self.leader_flocking.kp)?;
        finite("leaderFlocking.ki", self.leader_flocking.ki)?;
        finite("leaderFlocking.kd", self.leader_flocking.kd)?;

        positive("teamFlocking.targetDistance", self.team_flocking.target_distance)?;
        non_negative("teamFlocking.gain", self.team_flocking.gain)?;
        positive("teamFlocking.exponent", self.team_flocking.exponent)?;

        non_negative("flockingWeights.leader", self.weights.leader)?;
        non_negative("flockingWeights.team", self.weights.team)?;
        non_negative("flockingWeights.robot", self.weights.robot)?;
        non_negative("flockingWeights.obstacle", self.weights.obstacle)?;

        positive("team.separationThreshold", self.team.separation_threshold)?;
        positive("team.joiningThreshold", self.team.joining_threshold)?;

        if self.request_timeout == 0 {
            return Err(ConfigError::invalid("timeout.request", "must be at least 1 tick"));
        }
        positive("proximityRange", self.proximity_range)?;
        Ok(())
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be a finite number"))
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be positive, got {}", value)))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must not be negative, got {}", value)))
    }
}

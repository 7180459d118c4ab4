//! Discrete PID controller

use crate::config::LeaderFlockingParams;

/// Loop interval the gains are tuned for, seconds
pub const PID_DT: f64 = 0.1;
/// Output clamp, both directions
pub const PID_LIMIT: f64 = 80.0;

/// PID controller with persistent integral and previous error
#[derive(Debug, Clone, PartialEq)]
pub struct Pid {
    dt: f64,
    max: f64,
    min: f64,
    kp: f64,
    ki: f64,
    kd: f64,
    integral: f64,
    pre_error: f64,
}

impl Pid {
    pub fn new(dt: f64, max: f64, min: f64, kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            dt,
            max,
            min,
            kp,
            ki,
            kd,
            integral: 0.0,
            pre_error: 0.0,
        }
    }

    /// Controller used for following the leader chain
    pub fn for_leader_flocking(params: &LeaderFlockingParams) -> Self {
        Self::new(
            PID_DT,
            PID_LIMIT,
            -PID_LIMIT,
            params.kp,
            params.ki,
            params.kd,
        )
    }

    /// One control step toward `setpoint` from the measured `pv`
    pub fn calculate(&mut self, setpoint: f64, pv: f64) -> f64 {
        let error = setpoint - pv;

        let p = self.kp * error;

        self.integral += error * self.dt;
        let i = self.ki * self.integral;

        let derivative = (error - self.pre_error) / self.dt;
        let d = self.kd * derivative;

        self.pre_error = error;
        (p + i + d).clamp(self.min, self.max)
    }

    /// Clear integral and derivative memory
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.pre_error = 0.0;
    }

    pub fn previous_error(&self) -> f64 {
        self.pre_error
    }
}

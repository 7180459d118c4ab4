//! Differential-drive steering from a heading vector

use crate::config::WheelTurningParams;
use crate::geometry::{signed_normalize, Vec2};
use serde::Serialize;

/// Turning band selected from the heading angle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TurningBand {
    #[default]
    NoTurn,
    SoftTurn,
    HardTurn,
}

impl TurningBand {
    /// Stateless classification. Boundary angles belong to the lower band.
    pub fn classify(angle: f64, params: &WheelTurningParams) -> Self {
        let a = signed_normalize(angle).abs();
        if a <= params.no_turn_threshold {
            TurningBand::NoTurn
        } else if a <= params.hard_turn_threshold {
            TurningBand::SoftTurn
        } else {
            TurningBand::HardTurn
        }
    }

    /// Classification with hysteresis: once hard turning, keep turning
    /// hard until the angle falls to the soft threshold.
    pub fn next(self, angle: f64, params: &WheelTurningParams) -> Self {
        let a = signed_normalize(angle).abs();
        let mut band = self;
        if band == TurningBand::HardTurn && a <= params.soft_turn_threshold {
            band = TurningBand::SoftTurn;
        }
        if band == TurningBand::SoftTurn {
            if a > params.hard_turn_threshold {
                band = TurningBand::HardTurn;
            } else if a <= params.no_turn_threshold {
                band = TurningBand::NoTurn;
            }
        }
        if band == TurningBand::NoTurn {
            if a > params.hard_turn_threshold {
                band = TurningBand::HardTurn;
            } else if a > params.no_turn_threshold {
                band = TurningBand::SoftTurn;
            }
        }
        band
    }
}

/// Left and right wheel speeds, cm/s
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WheelSpeeds {
    pub left: f64,
    pub right: f64,
}

impl WheelSpeeds {
    pub const ZERO: WheelSpeeds = WheelSpeeds {
        left: 0.0,
        right: 0.0,
    };
}

/// Wheel speeds for `heading` in the given band
pub fn wheel_speeds(heading: Vec2, band: TurningBand, params: &WheelTurningParams) -> WheelSpeeds {
    let angle = signed_normalize(heading.angle());
    let max = params.max_speed;
    let base = heading.length().min(max);

    let (inner, outer) = match band {
        TurningBand::NoTurn => (base, base),
        TurningBand::SoftTurn => {
            let k = (params.hard_turn_threshold - angle.abs()) / params.hard_turn_threshold;
            (base * k, base * (2.0 - k))
        }
        TurningBand::HardTurn => (-max, max),
    };

    let (left, right) = if angle > 0.0 {
        (inner, outer)
    } else {
        (outer, inner)
    };
    WheelSpeeds {
        left: left.clamp(-max, max),
        right: right.clamp(-max, max),
    }
}

//! Planar vector math used by perception and the force field

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// A 2D vector in the robot's local frame (x forward, y left), centimetres
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Build a vector from a length and an angle in radians
    pub fn from_polar(length: f64, angle: f64) -> Self {
        Self {
            x: length * angle.cos(),
            y: length * angle.sin(),
        }
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Angle in radians, in (-π, π]
    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Unit vector in the same direction, or zero for the zero vector
    pub fn normalized(&self) -> Self {
        let len = self.length();
        if len == 0.0 {
            Self::ZERO
        } else {
            *self / len
        }
    }

    /// Scale the vector down so its length does not exceed `max`
    pub fn clamp_length(self, max: f64) -> Self {
        if self.length() > max {
            self.normalized() * max
        } else {
            self
        }
    }

    /// Rotate by `angle` radians counter-clockwise
    pub fn rotated(&self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }
}

/// Wrap an angle into (-π, π]
pub fn signed_normalize(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Mul<Vec2> for f64 {
    type Output = Vec2;
    fn mul(self, rhs: Vec2) -> Vec2 {
        rhs * self
    }
}

impl Div<f64> for Vec2 {
    type Output = Vec2;
    fn div(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_polar_round_trip() {
        let v = Vec2::from_polar(10.0, PI / 3.0);
        assert!(approx(v.length(), 10.0));
        assert!(approx(v.angle(), PI / 3.0));
    }

    #[test]
    fn test_clamp_length() {
        let v = Vec2::new(30.0, 40.0).clamp_length(10.0);
        assert!(approx(v.length(), 10.0));
        assert!(approx(v.angle(), Vec2::new(3.0, 4.0).angle()));

        let short = Vec2::new(1.0, 1.0);
        assert_eq!(short.clamp_length(10.0), short);
    }

    #[test]
    fn test_normalized_zero() {
        assert_eq!(Vec2::ZERO.normalized(), Vec2::ZERO);
    }

    #[test]
    fn test_signed_normalize() {
        assert!(approx(signed_normalize(3.0 * PI / 2.0), -PI / 2.0));
        assert!(approx(signed_normalize(-3.0 * PI / 2.0), PI / 2.0));
        assert!(approx(signed_normalize(PI), PI));
        assert!(approx(signed_normalize(-PI), PI));
        assert!(approx(signed_normalize(0.25), 0.25));
    }

    #[test]
    fn test_rotated() {
        let v = Vec2::new(1.0, 0.0).rotated(PI / 2.0);
        assert!(approx(v.x, 0.0));
        assert!(approx(v.y, 1.0));
    }
}

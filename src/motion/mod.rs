//! Force-field motion control
//!
//! Sensed neighbors and obstacles become weighted virtual forces, whose sum
//! is turned into left/right wheel speeds.

pub mod forces;
pub mod pid;
pub mod steering;

pub use forces::{ForceTerms, ProximityReading};
pub use pid::Pid;
pub use steering::{wheel_speeds, TurningBand, WheelSpeeds};

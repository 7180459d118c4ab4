//! Per-robot coordination core for leader/follower robot swarms
//!
//! Each robot broadcasts a compact packet every tick, classifies what it
//! hears, keeps hop counts toward each team's leader, steers by a weighted
//! force field and switches roles under an injected supervisor. Followers
//! that end up between two teams turn into stationary connectors, forming
//! relay chains between the teams.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod geometry;
pub mod motion;
pub mod sim;
pub mod swarm;

pub use config::ControllerConfig;
pub use error::{ConfigError, DecodeError, SupervisorError};

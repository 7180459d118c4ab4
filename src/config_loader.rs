//! Config file loader with cascading support
//! Supports JSON, YAML, YML formats
//! Priority: --config file > project-dir > home-dir > exe-dir > built-in defaults

use crate::config::{
    ControllerConfig, FlockingWeights, LeaderFlockingParams, TeamFlockingParams, TeamParams,
    WheelTurningParams,
};
use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILENAME: &str = ".swarm-coord.config";
const CONFIG_EXTENSIONS: &[&str] = &[".json", ".yml", ".yaml"];

/// Wheel turning section. Angles are in degrees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WheelTurningOverride {
    #[serde(default)]
    pub hard_turn_angle_threshold: Option<f64>,
    #[serde(default)]
    pub soft_turn_angle_threshold: Option<f64>,
    #[serde(default)]
    pub no_turn_angle_threshold: Option<f64>,
    #[serde(default)]
    pub max_speed: Option<f64>,
    #[serde(default)]
    pub deadband: Option<f64>,
    #[serde(default)]
    pub hysteresis: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LeaderFlockingOverride {
    #[serde(default)]
    pub target_distance: Option<f64>,
    #[serde(default)]
    pub kp: Option<f64>,
    #[serde(default)]
    pub ki: Option<f64>,
    #[serde(default)]
    pub kd: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TeamFlockingOverride {
    #[serde(default)]
    pub target_distance: Option<f64>,
    #[serde(default)]
    pub gain: Option<f64>,
    #[serde(default)]
    pub exponent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WeightsOverride {
    #[serde(default)]
    pub leader: Option<f64>,
    #[serde(default)]
    pub team: Option<f64>,
    #[serde(default)]
    pub robot: Option<f64>,
    #[serde(default)]
    pub obstacle: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TeamOverride {
    #[serde(default)]
    pub separation_threshold: Option<f64>,
    #[serde(default)]
    pub joining_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeoutOverride {
    /// Ticks
    #[serde(default)]
    pub request: Option<u32>,
}

/// Root configuration structure. Every value is optional so that files
/// can be layered on top of each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub wheel_turning: WheelTurningOverride,
    #[serde(default)]
    pub leader_flocking: LeaderFlockingOverride,
    #[serde(default)]
    pub team_flocking: TeamFlockingOverride,
    #[serde(default)]
    pub flocking_weights: WeightsOverride,
    #[serde(default)]
    pub team: TeamOverride,
    #[serde(default)]
    pub timeout: TimeoutOverride,
    #[serde(default)]
    pub proximity_range: Option<f64>,
}

fn take<T>(dst: &mut Option<T>, src: Option<T>) {
    if src.is_some() {
        *dst = src;
    }
}

fn require<T>(value: Option<T>, field: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::Missing(field))
}

impl ConfigFile {
    /// Layer holding every built-in default
    pub fn builtin() -> Self {
        Self::from(&ControllerConfig::default())
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: ConfigFile) {
        let wt = other.wheel_turning;
        take(
            &mut self.wheel_turning.hard_turn_angle_threshold,
            wt.hard_turn_angle_threshold,
        );
        take(
            &mut self.wheel_turning.soft_turn_angle_threshold,
            wt.soft_turn_angle_threshold,
        );
        take(
            &mut self.wheel_turning.no_turn_angle_threshold,
            wt.no_turn_angle_threshold,
        );
        take(&mut self.wheel_turning.max_speed, wt.max_speed);
        take(&mut self.wheel_turning.deadband, wt.deadband);
        take(&mut self.wheel_turning.hysteresis, wt.hysteresis);

        let lf = other.leader_flocking;
        take(&mut self.leader_flocking.target_distance, lf.target_distance);
        take(&mut self.leader_flocking.kp, lf.kp);
        take(&mut self.leader_flocking.ki, lf.ki);
        take(&mut self.leader_flocking.kd, lf.kd);

        let tf = other.team_flocking;
        take(&mut self.team_flocking.target_distance, tf.target_distance);
        take(&mut self.team_flocking.gain, tf.gain);
        take(&mut self.team_flocking.exponent, tf.exponent);

        let w = other.flocking_weights;
        take(&mut self.flocking_weights.leader, w.leader);
        take(&mut self.flocking_weights.team, w.team);
        take(&mut self.flocking_weights.robot, w.robot);
        take(&mut self.flocking_weights.obstacle, w.obstacle);

        take(
            &mut self.team.separation_threshold,
            other.team.separation_threshold,
        );
        take(&mut self.team.joining_threshold, other.team.joining_threshold);
        take(&mut self.timeout.request, other.timeout.request);
        take(&mut self.proximity_range, other.proximity_range);
    }

    /// Turn the merged layers into a validated configuration
    pub fn resolve(self) -> Result<ControllerConfig, ConfigError> {
        let wt = self.wheel_turning;
        let lf = self.leader_flocking;
        let tf = self.team_flocking;
        let w = self.flocking_weights;

        let config = ControllerConfig {
            wheel_turning: WheelTurningParams {
                hard_turn_threshold: require(
                    wt.hard_turn_angle_threshold,
                    "wheelTurning.hardTurnAngleThreshold",
                )?
                .to_radians(),
                soft_turn_threshold: require(
                    wt.soft_turn_angle_threshold,
                    "wheelTurning.softTurnAngleThreshold",
                )?
                .to_radians(),
                no_turn_threshold: require(
                    wt.no_turn_angle_threshold,
                    "wheelTurning.noTurnAngleThreshold",
                )?
                .to_radians(),
                max_speed: require(wt.max_speed, "wheelTurning.maxSpeed")?,
                deadband: require(wt.deadband, "wheelTurning.deadband")?,
                hysteresis: require(wt.hysteresis, "wheelTurning.hysteresis")?,
            },
            leader_flocking: LeaderFlockingParams {
                target_distance: require(lf.target_distance, "leaderFlocking.targetDistance")?,
                kp: require(lf.kp, "leaderFlocking.kp")?,
                ki: require(lf.ki, "leaderFlocking.ki")?,
                kd: require(lf.kd, "leaderFlocking.kd")?,
            },
            team_flocking: TeamFlockingParams {
                target_distance: require(tf.target_distance, "teamFlocking.targetDistance")?,
                gain: require(tf.gain, "teamFlocking.gain")?,
                exponent: require(tf.exponent, "teamFlocking.exponent")?,
            },
            weights: FlockingWeights {
                leader: require(w.leader, "flockingWeights.leader")?,
                team: require(w.team, "flockingWeights.team")?,
                robot: require(w.robot, "flockingWeights.robot")?,
                obstacle: require(w.obstacle, "flockingWeights.obstacle")?,
            },
            team: TeamParams {
                separation_threshold: require(
                    self.team.separation_threshold,
                    "team.separationThreshold",
                )?,
                joining_threshold: require(self.team.joining_threshold, "team.joiningThreshold")?,
            },
            request_timeout: require(self.timeout.request, "timeout.request")?,
            proximity_range: require(self.proximity_range, "proximityRange")?,
        };
        config.validate()?;
        Ok(config)
    }
}

impl From<&ControllerConfig> for ConfigFile {
    fn from(c: &ControllerConfig) -> Self {
        let wt = &c.wheel_turning;
        Self {
            wheel_turning: WheelTurningOverride {
                hard_turn_angle_threshold: Some(wt.hard_turn_threshold.to_degrees()),
                soft_turn_angle_threshold: Some(wt.soft_turn_threshold.to_degrees()),
                no_turn_angle_threshold: Some(wt.no_turn_threshold.to_degrees()),
                max_speed: Some(wt.max_speed),
                deadband: Some(wt.deadband),
                hysteresis: Some(wt.hysteresis),
            },
            leader_flocking: LeaderFlockingOverride {
                target_distance: Some(c.leader_flocking.target_distance),
                kp: Some(c.leader_flocking.kp),
                ki: Some(c.leader_flocking.ki),
                kd: Some(c.leader_flocking.kd),
            },
            team_flocking: TeamFlockingOverride {
                target_distance: Some(c.team_flocking.target_distance),
                gain: Some(c.team_flocking.gain),
                exponent: Some(c.team_flocking.exponent),
            },
            flocking_weights: WeightsOverride {
                leader: Some(c.weights.leader),
                team: Some(c.weights.team),
                robot: Some(c.weights.robot),
                obstacle: Some(c.weights.obstacle),
            },
            team: TeamOverride {
                separation_threshold: Some(c.team.separation_threshold),
                joining_threshold: Some(c.team.joining_threshold),
            },
            timeout: TimeoutOverride {
                request: Some(c.request_timeout),
            },
            proximity_range: Some(c.proximity_range),
        }
    }
}

/// Find config file in a directory (checks all supported extensions)
fn find_config_in_dir(dir: &Path) -> Option<PathBuf> {
    for ext in CONFIG_EXTENSIONS {
        let filepath = dir.join(format!("{}{}", CONFIG_FILENAME, ext));
        if filepath.exists() {
            return Some(filepath);
        }
    }
    None
}

/// Parse a JSON or YAML document based on its extension
pub fn parse_document<T: DeserializeOwned>(filepath: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(filepath)?;
    let ext = filepath
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    let parse_err = |message: String| ConfigError::Parse {
        path: filepath.display().to_string(),
        message,
    };

    match ext {
        "json" => serde_json::from_str(&content)
            .map_err(|e| parse_err(format!("JSON parse error: {}", e))),
        "yml" | "yaml" => serde_yaml::from_str(&content)
            .map_err(|e| parse_err(format!("YAML parse error: {}", e))),
        _ => Err(parse_err(format!("unsupported file extension: '{}'", ext))),
    }
}

/// Load config from a directory if it exists
fn load_config_from_dir(dir: &Path) -> Result<ConfigFile, ConfigError> {
    match find_config_in_dir(dir) {
        Some(filepath) => {
            let config = parse_document(&filepath)?;
            debug!("Loaded config from: {:?}", filepath);
            Ok(config)
        }
        None => Ok(ConfigFile::default()),
    }
}

/// Directories searched for config files, lowest priority first
fn search_dirs() -> Vec<PathBuf> {
    let mut dirs_found = Vec::new();
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs_found.push(exe_dir.to_path_buf());
        }
    }
    if let Some(home_dir) = dirs::home_dir() {
        dirs_found.push(home_dir);
    }
    if let Ok(cwd) = std::env::current_dir() {
        dirs_found.push(cwd);
    }
    dirs_found
}

/// Merge the layers found in `dirs` and an optional explicit file.
/// With `strict` the built-in defaults are left out, so every value has
/// to come from a file.
pub fn load_layers(
    dirs: &[PathBuf],
    explicit: Option<&Path>,
    strict: bool,
) -> Result<ConfigFile, ConfigError> {
    let mut merged = if strict {
        ConfigFile::default()
    } else {
        ConfigFile::builtin()
    };

    for dir in dirs {
        merged.merge(load_config_from_dir(dir)?);
    }

    if let Some(path) = explicit {
        let config = parse_document(path)?;
        debug!("Loaded config from: {:?}", path);
        merged.merge(config);
    }

    Ok(merged)
}

/// Load configs from cascading locations, merge and validate them
pub fn load_cascading_config(
    explicit: Option<&Path>,
    strict: bool,
) -> Result<ControllerConfig, ConfigError> {
    load_layers(&search_dirs(), explicit, strict)?.resolve()
}

/// Get all possible config file paths (for debugging/user info)
pub fn get_config_paths() -> Vec<PathBuf> {
    search_dirs()
        .into_iter()
        .flat_map(|dir| {
            CONFIG_EXTENSIONS
                .iter()
                .map(move |ext| dir.join(format!("{}{}", CONFIG_FILENAME, ext)))
        })
        .collect()
}

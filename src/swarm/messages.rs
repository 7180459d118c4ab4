//! Message types for robot-to-robot broadcasts

use crate::geometry::Vec2;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Team identifier. 255 is reserved on the wire for "no team".
pub type TeamId = u8;

/// Hop count meaning "unknown / unreachable"
pub const UNKNOWN_HOPS: u8 = 255;

/// Maximum number of connection entries carried by one packet
pub const MAX_CONNECTIONS: usize = 30;

/// Maximum number of teams a connector bridges (accept and hop slots)
pub const MAX_BRIDGED_TEAMS: usize = 2;

/// Role of a robot in the swarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Leader,
    Follower,
    Connector,
}

impl Role {
    /// Wire value
    pub fn to_byte(self) -> u8 {
        match self {
            Role::Leader => 0,
            Role::Follower => 1,
            Role::Connector => 2,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Role::Leader),
            1 => Some(Role::Follower),
            2 => Some(Role::Connector),
            _ => None,
        }
    }

    /// Id kind carried by robots in this role
    pub fn id_kind(self) -> IdKind {
        match self {
            Role::Leader => IdKind::Leader,
            Role::Follower | Role::Connector => IdKind::Follower,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Leader => "leader",
            Role::Follower => "follower",
            Role::Connector => "connector",
        };
        f.write_str(s)
    }
}

/// Whether the force field output is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveMode {
    Stop,
    Flock,
}

/// The letter part of a robot id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdKind {
    /// `L`
    Leader,
    /// `F`, also kept by connectors
    Follower,
}

impl IdKind {
    pub fn to_byte(self) -> u8 {
        match self {
            IdKind::Leader => b'L',
            IdKind::Follower => b'F',
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'L' => Some(IdKind::Leader),
            b'F' => Some(IdKind::Follower),
            _ => None,
        }
    }
}

static ROBOT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([LF])(\d{1,3})$").expect("robot id pattern is valid"));

/// Two-byte robot identifier, rendered as `L1`, `F12`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RobotId {
    pub kind: IdKind,
    pub number: u8,
}

impl RobotId {
    pub fn leader(number: u8) -> Self {
        Self {
            kind: IdKind::Leader,
            number,
        }
    }

    pub fn follower(number: u8) -> Self {
        Self {
            kind: IdKind::Follower,
            number,
        }
    }
}

impl fmt::Display for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.to_byte() as char, self.number)
    }
}

impl FromStr for RobotId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = ROBOT_ID_RE
            .captures(s.trim())
            .ok_or_else(|| format!("invalid robot id '{}': expected L<n> or F<n>", s))?;
        let kind = if &caps[1] == "L" {
            IdKind::Leader
        } else {
            IdKind::Follower
        };
        let number: u16 = caps[2]
            .parse()
            .map_err(|e| format!("invalid robot id '{}': {}", s, e))?;
        if number > 254 {
            return Err(format!("invalid robot id '{}': number must be 0..=254", s));
        }
        Ok(Self {
            kind,
            number: number as u8,
        })
    }
}

impl TryFrom<String> for RobotId {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RobotId> for String {
    fn from(id: RobotId) -> String {
        id.to_string()
    }
}

/// Best known route to a team's leader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    /// 0 for the leader itself, 255 when unknown
    pub count: u8,
    /// Neighbor the count was learned from
    pub via: Option<RobotId>,
}

impl Hop {
    pub const LEADER: Hop = Hop { count: 0, via: None };
    pub const UNKNOWN: Hop = Hop {
        count: UNKNOWN_HOPS,
        via: None,
    };

    pub fn new(count: u8, via: Option<RobotId>) -> Self {
        Self { count, via }
    }

    pub fn is_known(&self) -> bool {
        self.count != UNKNOWN_HOPS
    }
}

impl Default for Hop {
    fn default() -> Self {
        Hop::UNKNOWN
    }
}

/// Hop information per team, keys unique and ordered
pub type HopTable = BTreeMap<TeamId, Hop>;

/// Proximity of the closest non-team agent as seen by a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosestInfo {
    /// Role of the non-team agent
    pub role: Role,
    /// Observer's range to it, whole centimetres (254 max)
    pub distance: u8,
    /// Number of the team member that observed it
    pub id: u8,
    /// Local tick at which this was recorded. Not transmitted.
    pub timestamp: u64,
}

impl ClosestInfo {
    /// Convert a measured range into the wire distance
    pub fn quantize(range: f64) -> u8 {
        if !range.is_finite() || range < 0.0 {
            return 254;
        }
        range.round().min(254.0) as u8
    }
}

/// Role-dependent part of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Leader {
        /// Task token, 255 when no task signal is given
        task: u8,
    },
    Follower {
        /// Connector (or leader) this follower asks to join through
        request: Option<RobotId>,
        /// Hop to its own team's leader
        hop: Hop,
    },
    Connector {
        /// Followers whose requests were accepted
        accepts: Vec<RobotId>,
        /// Hop to each bridged team
        hops: HopTable,
    },
}

/// Task token values carried by leaders
pub mod task {
    pub const IDLE: u8 = 0;
    pub const WORKING: u8 = 1;
    pub const NONE: u8 = 255;
}

/// One robot's broadcast for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Range/bearing vector to the sender, measured by the receiver
    pub direction: Vec2,
    /// Sender id number; the id kind follows from the payload role
    pub sender: u8,
    /// Sender's team, None for connectors
    pub team: Option<TeamId>,
    pub payload: Payload,
    pub closest: Option<ClosestInfo>,
    /// Robots the sender sensed directly last tick
    pub connections: Vec<RobotId>,
}

impl Message {
    pub fn role(&self) -> Role {
        match self.payload {
            Payload::Leader { .. } => Role::Leader,
            Payload::Follower { .. } => Role::Follower,
            Payload::Connector { .. } => Role::Connector,
        }
    }

    /// Full id of the sender
    pub fn sender_id(&self) -> RobotId {
        RobotId {
            kind: self.role().id_kind(),
            number: self.sender,
        }
    }

    /// Hop information advertised by the sender
    pub fn hops(&self) -> HopTable {
        let mut table = HopTable::new();
        match &self.payload {
            Payload::Leader { .. } => {
                if let Some(team) = self.team {
                    table.insert(team, Hop::LEADER);
                }
            }
            Payload::Follower { hop, .. } => {
                if let Some(team) = self.team {
                    table.insert(team, *hop);
                }
            }
            Payload::Connector { hops, .. } => {
                table.extend(hops.iter().map(|(t, h)| (*t, *h)));
            }
        }
        table
    }

    /// Hop count advertised for one team, 255 when absent
    pub fn hop_count(&self, team: TeamId) -> u8 {
        match &self.payload {
            Payload::Leader { .. } if self.team == Some(team) => 0,
            Payload::Follower { hop, .. } if self.team == Some(team) => hop.count,
            Payload::Connector { hops, .. } => hops.get(&team).map_or(UNKNOWN_HOPS, |h| h.count),
            _ => UNKNOWN_HOPS,
        }
    }

    /// Identifiers carried in the signal block
    pub fn signal_contents(&self) -> Vec<RobotId> {
        match &self.payload {
            Payload::Leader { .. } => Vec::new(),
            Payload::Follower { request, .. } => request.iter().copied().collect(),
            Payload::Connector { accepts, .. } => accepts.clone(),
        }
    }

    /// Range to the sender
    pub fn range(&self) -> f64 {
        self.direction.length()
    }

    /// Attach the locally measured direction
    pub fn with_direction(mut self, direction: Vec2) -> Self {
        self.direction = direction;
        self
    }
}

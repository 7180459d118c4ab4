//! Role state machine: guards, events and their transitions

use crate::config::ControllerConfig;
use crate::motion::{Pid, TurningBand};
use crate::swarm::messages::{
    task, Hop, HopTable, Message, MoveMode, Payload, RobotId, Role, TeamId, UNKNOWN_HOPS,
};
use crate::swarm::perception::{Observer, Perception};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Boolean predicates over the current perception, handed to the acceptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Guard {
    LeaderVisible,
    LeaderNotVisible,
    BelowSeparation,
    NotBelowSeparation,
    AboveJoining,
    NotAboveJoining,
    ClosestToNonTeam,
    NotClosestToNonTeam,
    ConnectorNearby,
    NoConnectorNearby,
    ConnectorCandidate,
    ReceiveRequest,
    ReceiveAccept,
    AcceptTimeout,
    TaskSignal,
    NoTaskSignal,
}

impl Guard {
    pub const ALL: [Guard; 16] = [
        Guard::LeaderVisible,
        Guard::LeaderNotVisible,
        Guard::BelowSeparation,
        Guard::NotBelowSeparation,
        Guard::AboveJoining,
        Guard::NotAboveJoining,
        Guard::ClosestToNonTeam,
        Guard::NotClosestToNonTeam,
        Guard::ConnectorNearby,
        Guard::NoConnectorNearby,
        Guard::ConnectorCandidate,
        Guard::ReceiveRequest,
        Guard::ReceiveAccept,
        Guard::AcceptTimeout,
        Guard::TaskSignal,
        Guard::NoTaskSignal,
    ];

    /// Name used in supervisor tables
    pub fn name(self) -> &'static str {
        match self {
            Guard::LeaderVisible => "leaderVisible",
            Guard::LeaderNotVisible => "leaderNotVisible",
            Guard::BelowSeparation => "belowSeparation",
            Guard::NotBelowSeparation => "notBelowSeparation",
            Guard::AboveJoining => "aboveJoining",
            Guard::NotAboveJoining => "notAboveJoining",
            Guard::ClosestToNonTeam => "closestToNonTeam",
            Guard::NotClosestToNonTeam => "notClosestToNonTeam",
            Guard::ConnectorNearby => "connectorNearby",
            Guard::NoConnectorNearby => "noConnectorNearby",
            Guard::ConnectorCandidate => "connectorCandidate",
            Guard::ReceiveRequest => "receiveRequest",
            Guard::ReceiveAccept => "receiveAccept",
            Guard::AcceptTimeout => "acceptTimeout",
            Guard::TaskSignal => "taskSignal",
            Guard::NoTaskSignal => "noTaskSignal",
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Guard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Guard::ALL
            .iter()
            .copied()
            .find(|g| g.name() == s)
            .ok_or_else(|| format!("unknown guard '{}'", s))
    }
}

/// Guards that hold this tick
pub type GuardSet = BTreeSet<Guard>;

/// Controllable events the acceptor may return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Event {
    SetConnector,
    SetFollower,
    SendAccept,
    SendRequest,
    MoveStop,
    MoveFlock,
    TaskBegin,
    TaskEnd,
}

impl Event {
    /// Default priority order when several events are enabled
    pub const ALL: [Event; 8] = [
        Event::SetConnector,
        Event::SetFollower,
        Event::SendAccept,
        Event::SendRequest,
        Event::MoveStop,
        Event::MoveFlock,
        Event::TaskBegin,
        Event::TaskEnd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Event::SetConnector => "setConnector",
            Event::SetFollower => "setFollower",
            Event::SendAccept => "sendAccept",
            Event::SendRequest => "sendRequest",
            Event::MoveStop => "moveStop",
            Event::MoveFlock => "moveFlock",
            Event::TaskBegin => "taskBegin",
            Event::TaskEnd => "taskEnd",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Event {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Event::ALL
            .iter()
            .copied()
            .find(|e| e.name() == s)
            .ok_or_else(|| format!("unknown event '{}'", s))
    }
}

/// A request waiting for an accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingRequest {
    pub target: RobotId,
    pub ticks_left: u32,
}

/// Everything a robot carries from one tick to the next
#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    /// Own id number; the letter follows from the role
    pub number: u8,
    pub role: Role,
    pub move_mode: MoveMode,
    pub team: Option<TeamId>,
    pub hops: HopTable,
    pub performing_task: bool,
    pub pending_request: Option<PendingRequest>,
    /// Leader-follow controller memory
    pub pid: Pid,
    /// Last turning band, used in hysteresis mode
    pub turning: TurningBand,
    pub tick: u64,
}

impl RobotState {
    pub fn new(number: u8, role: Role, team: Option<TeamId>, config: &ControllerConfig) -> Self {
        let mut hops = HopTable::new();
        match (role, team) {
            (Role::Leader, Some(t)) => {
                hops.insert(t, Hop::LEADER);
            }
            (Role::Follower, Some(t)) => {
                hops.insert(t, Hop::UNKNOWN);
            }
            _ => {}
        }
        Self {
            number,
            role,
            move_mode: MoveMode::Flock,
            team,
            hops,
            performing_task: false,
            pending_request: None,
            pid: Pid::for_leader_flocking(&config.leader_flocking),
            turning: TurningBand::NoTurn,
            tick: 0,
        }
    }

    pub fn id(&self) -> RobotId {
        RobotId {
            kind: self.role.id_kind(),
            number: self.number,
        }
    }

    pub fn observer(&self) -> Observer {
        Observer {
            id: self.id(),
            role: self.role,
            team: self.team,
            tick: self.tick,
        }
    }

    /// Hop count to the own team's leader, 255 when unknown or teamless
    pub fn own_hop_count(&self) -> u8 {
        self.team
            .and_then(|t| self.hops.get(&t))
            .map_or(UNKNOWN_HOPS, |h| h.count)
    }
}

/// Outcome of the pending request this tick
#[derive(Debug, Clone, PartialEq)]
pub enum RequestStatus {
    Idle,
    Waiting,
    /// The connector that accepted us
    Accepted(Message),
    TimedOut,
}

/// Advance the request timer and look for an accept naming us.
/// An accepted or expired request is cleared.
pub fn update_request(state: &mut RobotState, perception: &Perception) -> RequestStatus {
    let Some(mut pending) = state.pending_request else {
        return RequestStatus::Idle;
    };

    if let Some(msg) = perception
        .addressed_connectors
        .iter()
        .find(|m| m.sender_id() == pending.target)
    {
        state.pending_request = None;
        return RequestStatus::Accepted(msg.clone());
    }

    pending.ticks_left = pending.ticks_left.saturating_sub(1);
    if pending.ticks_left == 0 {
        debug!(target_id = %pending.target, "request expired");
        state.pending_request = None;
        RequestStatus::TimedOut
    } else {
        state.pending_request = Some(pending);
        RequestStatus::Waiting
    }
}

fn pair(set: &mut GuardSet, value: bool, yes: Guard, no: Guard) {
    set.insert(if value { yes } else { no });
}

/// Evaluate every guard relevant to the robot's role
pub fn evaluate_guards(
    state: &RobotState,
    perception: &Perception,
    request: &RequestStatus,
    config: &ControllerConfig,
) -> GuardSet {
    let mut set = GuardSet::new();
    pair(
        &mut set,
        !perception.connectors.is_empty(),
        Guard::ConnectorNearby,
        Guard::NoConnectorNearby,
    );
    // only connectors answer requests
    if state.role == Role::Connector && !perception.requests.is_empty() {
        set.insert(Guard::ReceiveRequest);
    }
    if state.role == Role::Leader {
        return set;
    }

    // Range to the nearest non-team agent. Connectors have no team, so
    // anyone sensed counts.
    let range = match state.role {
        Role::Connector => perception
            .messages
            .iter()
            .map(Message::range)
            .min_by(|a, b| a.total_cmp(b)),
        _ => perception.candidate_range(),
    };
    let below = range.map_or(false, |d| d < config.team.separation_threshold);
    let above = range.map_or(true, |d| d > config.team.joining_threshold);
    pair(&mut set, below, Guard::BelowSeparation, Guard::NotBelowSeparation);
    pair(&mut set, above, Guard::AboveJoining, Guard::NotAboveJoining);

    if state.role == Role::Connector {
        return set;
    }

    let leader_visible = perception.own_leader.is_some();
    let closest = perception.is_closest_to_non_team(&state.observer());
    pair(
        &mut set,
        leader_visible,
        Guard::LeaderVisible,
        Guard::LeaderNotVisible,
    );
    pair(
        &mut set,
        closest,
        Guard::ClosestToNonTeam,
        Guard::NotClosestToNonTeam,
    );
    if !leader_visible && below && closest {
        set.insert(Guard::ConnectorCandidate);
    }

    match request {
        RequestStatus::Accepted(_) => {
            set.insert(Guard::ReceiveAccept);
        }
        RequestStatus::TimedOut => {
            set.insert(Guard::AcceptTimeout);
        }
        RequestStatus::Idle | RequestStatus::Waiting => {}
    }

    if let Some(Payload::Leader { task: token }) = perception.own_leader.as_ref().map(|m| &m.payload)
    {
        match *token {
            task::WORKING => {
                set.insert(Guard::TaskSignal);
            }
            task::IDLE => {
                set.insert(Guard::NoTaskSignal);
            }
            _ => {}
        }
    }
    set
}

/// Inputs a transition may read besides the state itself
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub perception: &'a Perception,
    pub request: &'a RequestStatus,
    pub config: &'a ControllerConfig,
}

/// Signals a transition queues for the next outgoing message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outbox {
    pub accepts: Vec<RobotId>,
}

/// Apply `event` to `state`. Returns None when the event does not apply
/// to the current role; the caller keeps the old state.
pub fn transition(
    event: Event,
    state: &RobotState,
    ctx: &TransitionContext<'_>,
) -> Option<(RobotState, Outbox)> {
    let mut next = state.clone();
    let mut outbox = Outbox::default();

    match event {
        Event::MoveFlock => {
            next.move_mode = MoveMode::Flock;
            next.pending_request = None;
        }
        Event::MoveStop => {
            next.move_mode = MoveMode::Stop;
        }
        Event::TaskBegin => next.performing_task = true,
        Event::TaskEnd => next.performing_task = false,
        Event::SetConnector => {
            let (Role::Follower, Some(old_team)) = (state.role, state.team) else {
                return None;
            };
            let source = match ctx.request {
                RequestStatus::Accepted(msg) => msg,
                _ => ctx.perception.candidate.as_ref()?,
            };

            let mut hops = HopTable::new();
            hops.insert(old_team, Hop::new(1, None));
            match source.role() {
                Role::Connector => {
                    for (team, hop) in source.hops() {
                        if team != old_team && hop.is_known() {
                            hops.insert(
                                team,
                                Hop::new(hop.count.saturating_add(1), Some(source.sender_id())),
                            );
                        }
                    }
                }
                Role::Leader | Role::Follower => {
                    if let Some(team) = source.team.filter(|t| *t != old_team) {
                        hops.insert(team, Hop::new(1, None));
                    }
                    outbox.accepts.push(source.sender_id());
                }
            }

            next.role = Role::Connector;
            next.team = None;
            next.hops = hops;
            next.pending_request = None;
            next.pid.reset();
        }
        Event::SetFollower => {
            if state.role != Role::Connector {
                return None;
            }
            let (team, hop) = state
                .hops
                .iter()
                .filter(|(_, h)| h.is_known())
                .min_by_key(|(team, h)| (h.count, **team))
                .map(|(t, h)| (*t, *h))?;
            next.role = Role::Follower;
            next.team = Some(team);
            next.hops = HopTable::from([(team, hop)]);
        }
        Event::SendRequest => {
            if state.role != Role::Follower {
                return None;
            }
            let candidate = ctx.perception.candidate.as_ref()?;
            next.pending_request = Some(PendingRequest {
                target: candidate.sender_id(),
                ticks_left: ctx.config.request_timeout,
            });
        }
        Event::SendAccept => {
            if state.role != Role::Connector {
                return None;
            }
            // Smallest requester per team, and only for teams this connector
            // is still directly attached to
            let mut chosen: std::collections::BTreeMap<TeamId, RobotId> = Default::default();
            for msg in &ctx.perception.requests {
                let Some(team) = msg.team else { continue };
                if state.hops.get(&team).map(|h| h.count) != Some(1) {
                    debug!(team, requester = %msg.sender_id(), "team already has a fixed connector");
                    continue;
                }
                let id = msg.sender_id();
                chosen
                    .entry(team)
                    .and_modify(|best| {
                        if id < *best {
                            *best = id;
                        }
                    })
                    .or_insert(id);
            }
            for (team, requester) in chosen {
                next.hops.insert(team, Hop::new(2, Some(requester)));
                outbox.accepts.push(requester);
            }
        }
    }

    Some((next, outbox))
}

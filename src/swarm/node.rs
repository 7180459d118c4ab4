//! Robot node - runs one control tick from sensor input to actuator output

use crate::config::ControllerConfig;
use crate::geometry::Vec2;
use crate::motion::forces::{self, ProximityReading};
use crate::motion::{wheel_speeds, TurningBand, WheelSpeeds};
use crate::swarm::codec;
use crate::swarm::coordinator::{
    evaluate_guards, transition, update_request, Event, GuardSet, Outbox, RobotState,
    TransitionContext,
};
use crate::swarm::hops;
use crate::swarm::messages::{
    task, Hop, Message, MoveMode, Payload, RobotId, Role, TeamId,
};
use crate::swarm::perception::{aggregate, Perception};
use crate::swarm::supervisor::SupervisoryAcceptor;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

/// A packet heard this tick with the range/bearing measured on receipt
#[derive(Debug, Clone, PartialEq)]
pub struct Reception {
    pub bytes: Vec<u8>,
    pub direction: Vec2,
}

/// Everything the host hands a robot for one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickInput {
    pub received: Vec<Reception>,
    pub proximity: Vec<ProximityReading>,
    /// Leaders only: desired motion in the robot frame
    pub control: Option<Vec2>,
    /// Leaders only: task signal to broadcast
    pub task: Option<bool>,
}

/// Indicator light colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Indicator {
    /// Team colour, used by leaders and followers
    Team(TeamId),
    /// Connectors show a fixed colour
    Connector,
    Off,
}

/// Everything a robot produces in one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub wheels: WheelSpeeds,
    pub packet: Vec<u8>,
    pub event: Option<Event>,
    pub indicator: Indicator,
}

/// One robot: its state, the shared configuration and its acceptor
pub struct Robot {
    state: RobotState,
    config: Arc<ControllerConfig>,
    acceptor: Box<dyn SupervisoryAcceptor>,
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Robot {
    pub fn new(
        number: u8,
        role: Role,
        team: Option<TeamId>,
        config: Arc<ControllerConfig>,
        acceptor: Box<dyn SupervisoryAcceptor>,
    ) -> Self {
        Self {
            state: RobotState::new(number, role, team, &config),
            config,
            acceptor,
        }
    }

    pub fn id(&self) -> RobotId {
        self.state.id()
    }

    pub fn state(&self) -> &RobotState {
        &self.state
    }

    /// Run one control tick. Never fails: bad packets are dropped and
    /// inapplicable events are ignored.
    pub fn step(&mut self, input: &TickInput) -> TickOutput {
        self.state.tick += 1;
        let span = info_span!("robot", id = %self.id(), tick = self.state.tick);
        let _enter = span.enter();

        let messages = self.decode_all(&input.received);
        let perception = aggregate(&self.state.observer(), messages);
        self.state.hops = hops::relax(&self.state.observer(), &self.state.hops, &perception);

        let request = update_request(&mut self.state, &perception);
        let guards = evaluate_guards(&self.state, &perception, &request, &self.config);
        let event = self.acceptor.choose_event(&guards);

        let mut outbox = Outbox::default();
        if let Some(event) = event {
            let ctx = TransitionContext {
                perception: &perception,
                request: &request,
                config: &self.config,
            };
            match transition(event, &self.state, &ctx) {
                Some((next, queued)) => {
                    info!(event = %event, role = %next.role, "event executed");
                    self.state = next;
                    outbox = queued;
                }
                None => {
                    warn!(event = %event, role = %self.state.role, "event does not apply, ignored");
                }
            }
        } else {
            log_guards(&guards);
        }

        let wheels = self.drive(&perception, input);
        let packet = codec::encode(&self.outgoing(&perception, &outbox, input));

        TickOutput {
            wheels,
            packet,
            event,
            indicator: self.indicator(),
        }
    }

    fn decode_all(&self, received: &[Reception]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(received.len());
        for reception in received {
            match codec::decode(&reception.bytes) {
                Ok(msg) => messages.push(msg.with_direction(reception.direction)),
                Err(e) => debug!(error = %e, "dropping packet"),
            }
        }
        messages
    }

    fn drive(&mut self, perception: &Perception, input: &TickInput) -> WheelSpeeds {
        if self.state.move_mode == MoveMode::Stop {
            return WheelSpeeds::ZERO;
        }

        let config = &self.config;
        let terms = match self.state.role {
            Role::Leader => forces::leader_terms(
                config,
                input.control.unwrap_or(Vec2::ZERO),
                perception,
                &input.proximity,
            ),
            Role::Follower | Role::Connector => {
                let membership = self.state.team.map(|t| (t, self.state.own_hop_count()));
                forces::member_terms(
                    config,
                    &mut self.state.pid,
                    membership,
                    perception,
                    &input.proximity,
                )
            }
        };

        let heading = terms.heading(&config.weights);
        let params = &config.wheel_turning;
        if heading.length() < params.deadband {
            return WheelSpeeds::ZERO;
        }

        let band = if params.hysteresis {
            self.state.turning.next(heading.angle(), params)
        } else {
            TurningBand::classify(heading.angle(), params)
        };
        self.state.turning = band;
        wheel_speeds(heading, band, params)
    }

    fn outgoing(&self, perception: &Perception, outbox: &Outbox, input: &TickInput) -> Message {
        let state = &self.state;
        let payload = match state.role {
            Role::Leader => Payload::Leader {
                task: match input.task {
                    Some(true) => task::WORKING,
                    Some(false) => task::IDLE,
                    None => task::NONE,
                },
            },
            Role::Follower => Payload::Follower {
                request: state.pending_request.map(|p| p.target),
                hop: state
                    .team
                    .and_then(|t| state.hops.get(&t).copied())
                    .unwrap_or(Hop::UNKNOWN),
            },
            Role::Connector => Payload::Connector {
                accepts: outbox.accepts.clone(),
                hops: state.hops.clone(),
            },
        };
        let closest = match state.role {
            Role::Follower => perception.observed,
            Role::Leader | Role::Connector => None,
        };

        Message {
            direction: Vec2::ZERO,
            sender: state.number,
            team: state.team,
            payload,
            closest,
            connections: perception.connections(),
        }
    }

    fn indicator(&self) -> Indicator {
        match (self.state.role, self.state.team) {
            (Role::Connector, _) => Indicator::Connector,
            (_, Some(team)) => Indicator::Team(team),
            (_, None) => Indicator::Off,
        }
    }
}

fn log_guards(guards: &GuardSet) {
    if tracing::enabled!(tracing::Level::DEBUG) {
        let names: Vec<&str> = guards.iter().map(|g| g.name()).collect();
        debug!(guards = ?names, "no event chosen");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::coordinator::Guard;
    use crate::swarm::messages::HopTable;

    fn config() -> Arc<ControllerConfig> {
        Arc::new(ControllerConfig::default())
    }

    fn never() -> Box<dyn SupervisoryAcceptor> {
        Box::new(|_: &GuardSet| -> Option<Event> { None })
    }

    fn packet(msg: &Message) -> Vec<u8> {
        codec::encode(msg)
    }

    fn follower_msg(n: u8, team: TeamId, hop: u8) -> Message {
        Message {
            direction: Vec2::ZERO,
            sender: n,
            team: Some(team),
            payload: Payload::Follower {
                request: None,
                hop: Hop::new(hop, None),
            },
            closest: None,
            connections: vec![],
        }
    }

    #[test]
    fn test_stop_means_zero_speed() {
        let stop_once = {
            let mut fired = false;
            move |_: &GuardSet| {
                if fired {
                    None
                } else {
                    fired = true;
                    Some(Event::MoveStop)
                }
            }
        };
        let mut robot = Robot::new(3, Role::Follower, Some(1), config(), Box::new(stop_once));
        let input = TickInput {
            received: vec![Reception {
                bytes: packet(&follower_msg(4, 1, 1)),
                direction: Vec2::new(60.0, 5.0),
            }],
            proximity: vec![ProximityReading {
                distance: 1.0,
                angle: 0.0,
            }],
            ..Default::default()
        };
        let out = robot.step(&input);
        assert_eq!(out.event, Some(Event::MoveStop));
        assert_eq!(out.wheels, WheelSpeeds::ZERO);
        let out = robot.step(&input);
        assert_eq!(out.wheels, WheelSpeeds::ZERO);
    }

    #[test]
    fn test_leader_reports_zero_hops() {
        let mut robot = Robot::new(1, Role::Leader, Some(1), config(), never());
        let out = robot.step(&TickInput {
            task: Some(true),
            ..Default::default()
        });
        let msg = codec::decode(&out.packet).unwrap();
        assert_eq!(msg.role(), Role::Leader);
        assert_eq!(msg.hop_count(1), 0);
        assert_eq!(msg.payload, Payload::Leader { task: task::WORKING });
        assert_eq!(robot.state().hops[&1], Hop::LEADER);
        assert_eq!(out.indicator, Indicator::Team(1));
    }

    #[test]
    fn test_leader_follows_command() {
        let mut robot = Robot::new(1, Role::Leader, Some(1), config(), never());
        let out = robot.step(&TickInput {
            control: Some(Vec2::new(10.0, 0.0)),
            ..Default::default()
        });
        assert!(out.wheels.left > 0.0);
        assert_eq!(out.wheels.left, out.wheels.right);
    }

    #[test]
    fn test_bad_packets_are_dropped() {
        let mut robot = Robot::new(3, Role::Follower, Some(1), config(), never());
        let input = TickInput {
            received: vec![
                Reception {
                    bytes: vec![1, 2],
                    direction: Vec2::new(5.0, 0.0),
                },
                Reception {
                    bytes: packet(&follower_msg(4, 1, 1)),
                    direction: Vec2::new(20.0, 0.0),
                },
            ],
            ..Default::default()
        };
        robot.step(&input);
        assert_eq!(robot.state().hops[&1], Hop::new(2, Some(RobotId::follower(4))));
    }

    #[test]
    fn test_becomes_connector_and_queues_accept() {
        let acceptor = |g: &GuardSet| {
            g.contains(&Guard::ConnectorCandidate)
                .then_some(Event::SetConnector)
        };
        let mut robot = Robot::new(3, Role::Follower, Some(1), config(), Box::new(acceptor));
        let input = TickInput {
            received: vec![Reception {
                bytes: packet(&follower_msg(10, 2, 1)),
                direction: Vec2::new(12.0, 0.0),
            }],
            ..Default::default()
        };
        let out = robot.step(&input);
        assert_eq!(out.event, Some(Event::SetConnector));
        assert_eq!(robot.state().role, Role::Connector);
        assert_eq!(out.indicator, Indicator::Connector);

        let msg = codec::decode(&out.packet).unwrap();
        assert_eq!(msg.role(), Role::Connector);
        assert_eq!(msg.sender_id(), RobotId::follower(3));
        assert_eq!(msg.signal_contents(), vec![RobotId::follower(10)]);
        let mut expected = HopTable::new();
        expected.insert(1, Hop::new(1, None));
        expected.insert(2, Hop::new(1, None));
        assert_eq!(msg.hops(), expected);
    }

    #[test]
    fn test_inapplicable_event_keeps_state() {
        let acceptor = |_: &GuardSet| Some(Event::SetFollower);
        let mut robot = Robot::new(3, Role::Follower, Some(1), config(), Box::new(acceptor));
        let before = robot.state().clone();
        let out = robot.step(&TickInput::default());
        assert_eq!(out.event, Some(Event::SetFollower));
        assert_eq!(robot.state().role, before.role);
        assert_eq!(robot.state().team, before.team);
    }

    fn heard(msg: &Message, direction: Vec2) -> Reception {
        Reception {
            bytes: packet(msg),
            direction,
        }
    }

    #[test]
    fn test_lost_sighting_does_not_linger() {
        use std::sync::Mutex;

        let last_guards = Arc::new(Mutex::new(GuardSet::new()));
        let recorder = {
            let last_guards = last_guards.clone();
            move |g: &GuardSet| -> Option<Event> {
                *last_guards.lock().unwrap() = g.clone();
                None
            }
        };
        let mut f3 = Robot::new(3, Role::Follower, Some(1), config(), never());
        let mut f4 = Robot::new(4, Role::Follower, Some(1), config(), Box::new(recorder));

        // F3 glimpses F10 once. F4 only hears F3 until F11 shows up.
        let mut from_f3: Option<Vec<u8>> = None;
        let mut from_f4: Option<Vec<u8>> = None;
        let mut f4_out = None;
        for tick in 0..200 {
            let mut f3_in = TickInput::default();
            if tick == 0 {
                f3_in
                    .received
                    .push(heard(&follower_msg(10, 2, 1), Vec2::new(10.0, 0.0)));
            }
            if let Some(bytes) = &from_f4 {
                f3_in.received.push(Reception {
                    bytes: bytes.clone(),
                    direction: Vec2::new(-15.0, 0.0),
                });
            }

            let mut f4_in = TickInput::default();
            if let Some(bytes) = &from_f3 {
                f4_in.received.push(Reception {
                    bytes: bytes.clone(),
                    direction: Vec2::new(15.0, 0.0),
                });
            }
            if tick >= 150 {
                f4_in
                    .received
                    .push(heard(&follower_msg(11, 2, 1), Vec2::new(25.0, 0.0)));
            }

            from_f3 = Some(f3.step(&f3_in).packet);
            let out = f4.step(&f4_in);
            from_f4 = Some(out.packet.clone());
            f4_out = Some(out);
        }

        let msg = codec::decode(&f4_out.unwrap().packet).unwrap();
        let closest = msg.closest.unwrap();
        assert_eq!((closest.id, closest.distance), (4, 25));
        let guards = last_guards.lock().unwrap().clone();
        assert!(guards.contains(&Guard::ClosestToNonTeam));
        assert!(guards.contains(&Guard::ConnectorCandidate));
    }

    #[test]
    fn test_new_connector_stays_reachable_for_old_team() {
        let acceptor = |g: &GuardSet| {
            g.contains(&Guard::ConnectorCandidate)
                .then_some(Event::SetConnector)
        };
        let mut f3 = Robot::new(3, Role::Follower, Some(1), config(), Box::new(acceptor));
        let input = TickInput {
            received: vec![
                heard(&follower_msg(2, 1, 2), Vec2::new(-18.0, 0.0)),
                heard(&follower_msg(10, 2, 1), Vec2::new(12.0, 0.0)),
            ],
            ..Default::default()
        };
        assert_eq!(f3.step(&input).event, Some(Event::SetConnector));

        let mut expected = HopTable::new();
        expected.insert(1, Hop::new(1, None));
        expected.insert(2, Hop::new(1, None));
        for _ in 0..3 {
            let out = f3.step(&input);
            let msg = codec::decode(&out.packet).unwrap();
            assert_eq!(msg.hops(), expected);

            // a team-1 follower 10 cm away can still join through F3
            let f5 = RobotState::new(5, Role::Follower, Some(1), &config());
            let p = aggregate(&f5.observer(), vec![msg.with_direction(Vec2::new(10.0, 0.0))]);
            assert_eq!(
                p.candidate.as_ref().map(Message::sender_id),
                Some(RobotId::follower(3))
            );
        }
    }
}

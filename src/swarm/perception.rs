//! Classify one tick's decoded messages into role buckets

use crate::swarm::messages::{ClosestInfo, Message, RobotId, Role, TeamId, MAX_CONNECTIONS};
use tracing::debug;

/// Who is looking: the parts of the robot state perception depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observer {
    pub id: RobotId,
    pub role: Role,
    pub team: Option<TeamId>,
    pub tick: u64,
}

/// Per-tick view of the neighborhood. Rebuilt from scratch every tick.
#[derive(Debug, Clone, Default)]
pub struct Perception {
    /// Every accepted message, in arrival order
    pub messages: Vec<Message>,
    /// Leader of the observer's team, if in range
    pub own_leader: Option<Message>,
    /// Followers of the observer's team
    pub team: Vec<Message>,
    /// Leaders of other teams
    pub other_leaders: Vec<Message>,
    /// Followers of other teams
    pub other_team: Vec<Message>,
    /// All connectors
    pub connectors: Vec<Message>,
    /// Connectors whose accept list names the observer
    pub addressed_connectors: Vec<Message>,
    /// Followers requesting to join through the observer
    pub requests: Vec<Message>,
    /// Closest non-team agent known to the observer's team
    pub closest: Option<ClosestInfo>,
    /// The observer's own sighting of its candidate. This is what a
    /// follower broadcasts in its closest block.
    pub observed: Option<ClosestInfo>,
    /// The non-team agent the observer itself sees closest
    pub candidate: Option<Message>,
}

impl Perception {
    /// Ids of every robot heard this tick, without duplicates
    pub fn connections(&self) -> Vec<RobotId> {
        let mut ids: Vec<RobotId> = Vec::new();
        for msg in &self.messages {
            let id = msg.sender_id();
            if !ids.contains(&id) {
                ids.push(id);
            }
            if ids.len() == MAX_CONNECTIONS {
                break;
            }
        }
        ids
    }

    /// Whether the observer is the closest team member to a non-team agent
    pub fn is_closest_to_non_team(&self, observer: &Observer) -> bool {
        match (&self.closest, &self.candidate) {
            (Some(closest), Some(_)) => closest.id == observer.id.number,
            _ => false,
        }
    }

    /// Range to the observer's own candidate, if any
    pub fn candidate_range(&self) -> Option<f64> {
        self.candidate.as_ref().map(Message::range)
    }
}

/// Sort the tick's messages into buckets and derive the closest
/// non-team agent.
pub fn aggregate(observer: &Observer, messages: Vec<Message>) -> Perception {
    let mut p = Perception::default();

    for msg in messages {
        if msg.sender_id() == observer.id {
            debug!("ignoring own echo");
            continue;
        }
        let same_team = observer.team.is_some() && msg.team == observer.team;
        match msg.role() {
            Role::Leader if same_team => {
                if p.own_leader.is_none() {
                    p.own_leader = Some(msg.clone());
                } else {
                    debug!(sender = %msg.sender_id(), "second leader for own team ignored");
                }
            }
            Role::Leader => p.other_leaders.push(msg.clone()),
            Role::Follower if same_team => p.team.push(msg.clone()),
            Role::Follower => p.other_team.push(msg.clone()),
            Role::Connector => {
                if msg.signal_contents().contains(&observer.id) {
                    p.addressed_connectors.push(msg.clone());
                }
                p.connectors.push(msg.clone());
            }
        }
        if msg.role() == Role::Follower && msg.signal_contents().contains(&observer.id) {
            p.requests.push(msg.clone());
        }
        p.messages.push(msg);
    }

    // Only followers can become connectors, so only they look for one
    if let (Role::Follower, Some(team)) = (observer.role, observer.team) {
        find_closest(observer, team, &mut p);
    }
    p
}

/// Direct observation first, then what team mates saw themselves last
/// tick, in arrival order. A later entry only wins with a strictly
/// smaller distance.
///
/// A relayed entry is only taken from the follower that made the
/// observation, so nothing older than one tick is ever used and no entry
/// circulates between team mates.
fn find_closest(observer: &Observer, team: TeamId, p: &mut Perception) {
    let direct: Vec<&Message> = if p.connectors.is_empty() {
        p.other_team.iter().collect()
    } else {
        p.connectors
            .iter()
            .filter(|c| c.hop_count(team) == 1)
            .collect()
    };

    let mut best: Option<ClosestInfo> = None;
    let mut candidate: Option<Message> = None;
    for msg in direct {
        let distance = ClosestInfo::quantize(msg.range());
        if best.map_or(true, |b| distance < b.distance) {
            best = Some(ClosestInfo {
                role: msg.role(),
                distance,
                id: observer.id.number,
                timestamp: observer.tick,
            });
            candidate = Some(msg.clone());
        }
    }

    let observed = best;

    let relayed = p
        .team
        .iter()
        .filter_map(|m| m.closest.filter(|info| info.id == m.sender))
        .filter(|info| info.id != observer.id.number);
    for info in relayed {
        if best.map_or(true, |b| info.distance < b.distance) {
            best = Some(ClosestInfo {
                timestamp: observer.tick.saturating_sub(1),
                ..info
            });
        }
    }

    p.closest = best;
    p.observed = observed;
    p.candidate = candidate;
}

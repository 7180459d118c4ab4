//! Hop-count routing toward each team's leader
//!
//! Leaders and followers recompute their count from scratch every tick
//! from what neighbors advertise, so a vanished route decays to unknown
//! within one tick and no count-to-infinity loop can form through stale
//! state.
//!
//! A connector counts connector links instead: an entry it is directly
//! attached to (no `via`) stays at 1, and an entry learned through another
//! connector follows that connector's count plus one.

use crate::swarm::messages::{Hop, HopTable, Message, Role, TeamId};
use crate::swarm::perception::{Observer, Perception};

/// Best hop to `team` through the eligible neighbors, or unknown.
/// Ties keep the earliest neighbor in arrival order.
fn best_hop<'a, I>(team: TeamId, neighbors: I) -> Hop
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut best = Hop::UNKNOWN;
    for msg in neighbors {
        let count = msg.hop_count(team);
        if count == Hop::UNKNOWN.count {
            continue;
        }
        let offered = count.saturating_add(1);
        if offered < best.count {
            best = Hop::new(offered, Some(msg.sender_id()));
        }
    }
    best
}

/// A connector's entry for `team`. Entries learned through a connector
/// that is not heard this tick keep their last count.
fn through_connector(team: TeamId, hop: Hop, perception: &Perception) -> Hop {
    let Some(via) = hop.via else {
        return hop;
    };
    match perception.connectors.iter().find(|m| m.sender_id() == via) {
        Some(msg) => Hop::new(msg.hop_count(team).saturating_add(1), Some(via)),
        None => hop,
    }
}

/// Relax the observer's hop table against this tick's neighbors
pub fn relax(observer: &Observer, current: &HopTable, perception: &Perception) -> HopTable {
    let mut table = HopTable::new();
    match observer.role {
        Role::Leader => {
            if let Some(team) = observer.team {
                table.insert(team, Hop::LEADER);
            }
        }
        Role::Follower => {
            if let Some(team) = observer.team {
                let neighbors = perception.own_leader.iter().chain(perception.team.iter());
                table.insert(team, best_hop(team, neighbors));
            }
        }
        Role::Connector => {
            for (team, hop) in current {
                table.insert(*team, through_connector(*team, *hop, perception));
            }
        }
    }
    table
}

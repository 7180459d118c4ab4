//! Binary encoding of the broadcast packet
//!
//! Layout (all fields one byte unless noted):
//!
//! ```text
//! | role | sender | team | signal | hops | closest (3) | connections (2 x k) | 255 |
//!
//! signal   Leader: task token            Follower: request id (2)
//!          Connector: n, 2 x id slot (2)
//! hops     Leader: none                  Follower: count, via id (2)
//!          Connector: n, 2 x (team, count, via id (2))
//! ```
//!
//! Unused id slots and absent values are filled with 255. A packet may be
//! followed by 255 padding up to the radio frame size.

use crate::error::DecodeError;
use crate::swarm::messages::{
    ClosestInfo, Hop, HopTable, IdKind, Message, Payload, Role, RobotId, MAX_BRIDGED_TEAMS,
    MAX_CONNECTIONS,
};
use crate::geometry::Vec2;
use tracing::debug;

/// Byte value for "absent" and the packet terminator
pub const NONE: u8 = 255;

/// Length of the fixed header (role, sender, team)
pub const HEADER_LEN: usize = 3;

const CONNECTOR_SIGNAL_LEN: usize = 1 + MAX_BRIDGED_TEAMS * 2;
const CONNECTOR_HOPS_LEN: usize = 1 + MAX_BRIDGED_TEAMS * 4;
const CLOSEST_LEN: usize = 3;

/// Largest packet `encode` produces
pub const MAX_PACKET_LEN: usize =
    HEADER_LEN + CONNECTOR_SIGNAL_LEN + CONNECTOR_HOPS_LEN + CLOSEST_LEN + MAX_CONNECTIONS * 2 + 1;

/// Serialize a message. Lists longer than the protocol allows are truncated.
pub fn encode(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_PACKET_LEN);

    buf.push(msg.role().to_byte());
    buf.push(msg.sender);
    buf.push(msg.team.unwrap_or(NONE));

    match &msg.payload {
        Payload::Leader { task } => {
            buf.push(*task);
        }
        Payload::Follower { request, hop } => {
            put_id(&mut buf, *request);
            buf.push(hop.count);
            put_id(&mut buf, hop.via);
        }
        Payload::Connector { accepts, hops } => {
            if accepts.len() > MAX_BRIDGED_TEAMS || hops.len() > MAX_BRIDGED_TEAMS {
                debug!(
                    "Truncating connector lists ({} accepts, {} hops) to {} slots",
                    accepts.len(),
                    hops.len(),
                    MAX_BRIDGED_TEAMS
                );
            }

            let accepts = &accepts[..accepts.len().min(MAX_BRIDGED_TEAMS)];
            buf.push(accepts.len() as u8);
            for slot in 0..MAX_BRIDGED_TEAMS {
                put_id(&mut buf, accepts.get(slot).copied());
            }

            let used = hops.len().min(MAX_BRIDGED_TEAMS);
            buf.push(used as u8);
            for (team, hop) in hops.iter().take(used) {
                buf.push(*team);
                buf.push(hop.count);
                put_id(&mut buf, hop.via);
            }
            for _ in used..MAX_BRIDGED_TEAMS {
                buf.extend_from_slice(&[NONE; 4]);
            }
        }
    }

    match &msg.closest {
        Some(c) => {
            buf.push(c.role.to_byte());
            buf.push(c.distance);
            buf.push(c.id);
        }
        None => buf.extend_from_slice(&[NONE; CLOSEST_LEN]),
    }

    if msg.connections.len() > MAX_CONNECTIONS {
        debug!(
            "Truncating {} connections to {}",
            msg.connections.len(),
            MAX_CONNECTIONS
        );
    }
    for id in msg.connections.iter().take(MAX_CONNECTIONS) {
        put_id(&mut buf, Some(*id));
    }

    buf.push(NONE);
    buf
}

/// Parse a packet. The returned message has a zero direction; the receiver
/// attaches the measured one.
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let mut r = Reader::new(bytes);

    let header = r.take("header", HEADER_LEN)?;
    let role = Role::from_byte(header[0]).ok_or(DecodeError::InvalidField {
        field: "role",
        value: header[0],
    })?;
    let sender = header[1];
    let team = (header[2] != NONE).then_some(header[2]);

    let payload = match role {
        Role::Leader => {
            let signal = r.take("leader signal", 1)?;
            Payload::Leader { task: signal[0] }
        }
        Role::Follower => {
            let signal = r.take("follower signal", 2)?;
            let request = read_id(signal, "request kind")?;
            let hop = r.take("follower hops", 3)?;
            Payload::Follower {
                request,
                hop: Hop::new(hop[0], read_id(&hop[1..], "via kind")?),
            }
        }
        Role::Connector => {
            let signal = r.take("connector signal", CONNECTOR_SIGNAL_LEN)?;
            let n = slot_count(signal[0], "accept count")?;
            let mut accepts = Vec::with_capacity(n);
            for slot in 0..n {
                let at = 1 + slot * 2;
                if let Some(id) = read_id(&signal[at..at + 2], "accept kind")? {
                    accepts.push(id);
                }
            }

            let block = r.take("connector hops", CONNECTOR_HOPS_LEN)?;
            let n = slot_count(block[0], "hop count")?;
            let mut hops = HopTable::new();
            for slot in 0..n {
                let at = 1 + slot * 4;
                let via = read_id(&block[at + 2..at + 4], "via kind")?;
                hops.insert(block[at], Hop::new(block[at + 1], via));
            }
            Payload::Connector { accepts, hops }
        }
    };

    let closest = r.take("closest", CLOSEST_LEN)?;
    let closest = if closest[0] == NONE {
        None
    } else {
        let role = Role::from_byte(closest[0]).ok_or(DecodeError::InvalidField {
            field: "closest role",
            value: closest[0],
        })?;
        Some(ClosestInfo {
            role,
            distance: closest[1],
            id: closest[2],
            timestamp: 0,
        })
    };

    let mut connections = Vec::new();
    loop {
        match r.peek() {
            None => return Err(DecodeError::BadSentinel { offset: r.pos }),
            Some(NONE) => {
                r.pos += 1;
                break;
            }
            Some(_) if connections.len() == MAX_CONNECTIONS => {
                return Err(DecodeError::BadSentinel { offset: r.pos });
            }
            Some(_) => {
                let entry = r.take("connection", 2)?;
                if let Some(id) = read_id(entry, "connection kind")? {
                    connections.push(id);
                }
            }
        }
    }

    // Only padding may follow the terminator
    if let Some(offset) = r.rest().iter().position(|b| *b != NONE) {
        return Err(DecodeError::BadSentinel {
            offset: r.pos + offset,
        });
    }

    Ok(Message {
        direction: Vec2::ZERO,
        sender,
        team,
        payload,
        closest,
        connections,
    })
}

fn put_id(buf: &mut Vec<u8>, id: Option<RobotId>) {
    match id {
        Some(id) => {
            buf.push(id.kind.to_byte());
            buf.push(id.number);
        }
        None => buf.extend_from_slice(&[NONE, NONE]),
    }
}

fn read_id(bytes: &[u8], field: &'static str) -> Result<Option<RobotId>, DecodeError> {
    if bytes[0] == NONE {
        return Ok(None);
    }
    let kind = IdKind::from_byte(bytes[0]).ok_or(DecodeError::InvalidField {
        field,
        value: bytes[0],
    })?;
    Ok(Some(RobotId {
        kind,
        number: bytes[1],
    }))
}

fn slot_count(b: u8, field: &'static str) -> Result<usize, DecodeError> {
    if b as usize > MAX_BRIDGED_TEAMS {
        return Err(DecodeError::InvalidField { field, value: b });
    }
    Ok(b as usize)
}

/// Bounds-checked cursor over a packet
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, field: &'static str, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.bytes.len() - self.pos;
        if remaining < n {
            return Err(DecodeError::Truncated {
                field,
                needed: n,
                remaining,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

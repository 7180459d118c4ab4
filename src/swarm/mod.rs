//! Swarm coordination: wire messages, perception, routing and roles

pub mod codec;
pub mod coordinator;
pub mod hops;
pub mod messages;
pub mod node;
pub mod perception;
pub mod scheduler;
pub mod supervisor;

pub use coordinator::{Event, Guard, GuardSet, RobotState};
pub use messages::{Hop, HopTable, Message, MoveMode, Payload, RobotId, Role, TeamId};
pub use node::{Indicator, Reception, Robot, TickInput, TickOutput};
pub use scheduler::{Environment, Scheduler};
pub use supervisor::{AutomatonAcceptor, SupervisoryAcceptor};

//! Tick scheduler for a group of robots sharing one broadcast medium
//!
//! Broadcasts are double-buffered: packets produced during tick t are
//! published only after every robot finished tick t, so they are heard
//! at tick t+1 regardless of execution order.

use crate::geometry::Vec2;
use crate::motion::ProximityReading;
use crate::swarm::node::{Reception, Robot, TickInput, TickOutput};
use futures::future::join_all;
use tracing::{debug, error};

/// What the host world tells the scheduler about each robot
pub trait Environment {
    /// Direction from `receiver` to `sender` in the receiver's frame,
    /// or None when out of communication range
    fn link(&self, receiver: usize, sender: usize) -> Option<Vec2>;

    /// Proximity readings for one robot
    fn proximity(&self, robot: usize) -> Vec<ProximityReading>;

    /// Leader motion command, if any
    fn control(&self, _robot: usize) -> Option<Vec2> {
        None
    }

    /// Leader task signal, if any
    fn task(&self, _robot: usize) -> Option<bool> {
        None
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    robots: Vec<Robot>,
    /// Packets published at the end of the previous tick
    published: Vec<Option<Vec<u8>>>,
    tick: u64,
}

impl Scheduler {
    pub fn new(robots: Vec<Robot>) -> Self {
        let published = vec![None; robots.len()];
        Self {
            robots,
            published,
            tick: 0,
        }
    }

    pub fn robots(&self) -> &[Robot] {
        &self.robots
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    fn inputs(&self, env: &dyn Environment) -> Vec<TickInput> {
        (0..self.robots.len())
            .map(|receiver| {
                let received = self
                    .published
                    .iter()
                    .enumerate()
                    .filter(|(sender, _)| *sender != receiver)
                    .filter_map(|(sender, packet)| {
                        let bytes = packet.as_ref()?;
                        let direction = env.link(receiver, sender)?;
                        Some(Reception {
                            bytes: bytes.clone(),
                            direction,
                        })
                    })
                    .collect();
                TickInput {
                    received,
                    proximity: env.proximity(receiver),
                    control: env.control(receiver),
                    task: env.task(receiver),
                }
            })
            .collect()
    }

    fn publish(&mut self, outputs: &[TickOutput]) {
        self.published = outputs.iter().map(|o| Some(o.packet.clone())).collect();
        self.tick += 1;
        debug!(tick = self.tick, robots = outputs.len(), "tick published");
    }

    /// Run one tick with robots stepped one after another. Do not call
    /// this on a poisoned scheduler.
    pub fn tick(&mut self, env: &dyn Environment) -> Vec<TickOutput> {
        let inputs = self.inputs(env);
        let outputs: Vec<TickOutput> = self
            .robots
            .iter_mut()
            .zip(inputs.iter())
            .map(|(robot, input)| robot.step(input))
            .collect();
        self.publish(&outputs);
        outputs
    }

    /// True once a parallel tick lost a robot. A poisoned scheduler
    /// refuses further parallel ticks.
    pub fn is_poisoned(&self) -> bool {
        self.robots.len() != self.published.len()
    }

    /// Run one tick with every robot on its own blocking task.
    /// Produces the same outputs as [`Scheduler::tick`].
    ///
    /// Every task is joined before any robot is put back. If a task fails,
    /// the surviving robots are kept in order, the failed one is gone and
    /// the scheduler is poisoned.
    pub async fn tick_parallel(&mut self, env: &dyn Environment) -> anyhow::Result<Vec<TickOutput>> {
        if self.is_poisoned() {
            anyhow::bail!(
                "scheduler lost {} robot(s) in an earlier tick",
                self.published.len() - self.robots.len()
            );
        }

        let inputs = self.inputs(env);
        let robots = std::mem::take(&mut self.robots);

        let handles = robots.into_iter().zip(inputs).map(|(mut robot, input)| {
            tokio::task::spawn_blocking(move || {
                let output = robot.step(&input);
                (robot, output)
            })
        });
        let joined = join_all(handles).await;

        let mut outputs = Vec::with_capacity(joined.len());
        let mut failure = None;
        for (index, result) in joined.into_iter().enumerate() {
            match result {
                Ok((robot, output)) => {
                    self.robots.push(robot);
                    outputs.push(output);
                }
                Err(e) => {
                    error!(robot = index, error = %e, "robot task failed");
                    failure.get_or_insert((index, e));
                }
            }
        }

        if let Some((index, e)) = failure {
            return Err(anyhow::Error::new(e)
                .context(format!("robot {} failed during tick {}", index, self.tick + 1)));
        }
        self.publish(&outputs);
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::swarm::codec;
    use crate::swarm::coordinator::{Event, GuardSet};
    use crate::swarm::messages::{Hop, Role};
    use crate::swarm::supervisor::SupervisoryAcceptor;
    use std::sync::Arc;

    /// Robots on a line, 10 cm apart, each hearing only direct neighbors
    struct Line;

    impl Environment for Line {
        fn link(&self, receiver: usize, sender: usize) -> Option<Vec2> {
            let offset = sender as f64 - receiver as f64;
            (offset.abs() <= 1.0).then(|| Vec2::new(offset * 10.0, 0.0))
        }

        fn proximity(&self, _robot: usize) -> Vec<ProximityReading> {
            Vec::new()
        }
    }

    fn idle() -> Box<dyn SupervisoryAcceptor> {
        Box::new(|_: &GuardSet| -> Option<Event> { None })
    }

    fn chain(n: u8) -> Scheduler {
        let config = Arc::new(ControllerConfig::default());
        let mut robots = vec![Robot::new(1, Role::Leader, Some(1), config.clone(), idle())];
        for i in 2..=n {
            robots.push(Robot::new(i, Role::Follower, Some(1), config.clone(), idle()));
        }
        Scheduler::new(robots)
    }

    fn hop_counts(s: &Scheduler) -> Vec<u8> {
        s.robots()
            .iter()
            .map(|r| r.state().own_hop_count())
            .collect()
    }

    #[test]
    fn test_broadcast_visible_next_tick_only() {
        let mut s = chain(3);
        s.tick(&Line);
        // nothing was published before the first tick
        assert_eq!(hop_counts(&s), vec![0, 255, 255]);
        s.tick(&Line);
        assert_eq!(hop_counts(&s), vec![0, 1, 255]);
        s.tick(&Line);
        assert_eq!(hop_counts(&s), vec![0, 1, 2]);
        assert_eq!(s.tick_count(), 3);
    }

    #[test]
    fn test_outputs_carry_packets() {
        let mut s = chain(2);
        let outputs = s.tick(&Line);
        assert_eq!(outputs.len(), 2);
        let msg = codec::decode(&outputs[1].packet).unwrap();
        assert_eq!(msg.role(), Role::Follower);
        assert_eq!(msg.hops().get(&1), Some(&Hop::UNKNOWN));
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let mut seq = chain(5);
        let mut par = chain(5);
        for _ in 0..6 {
            let a = seq.tick(&Line);
            let b = par.tick_parallel(&Line).await.unwrap();
            assert_eq!(a, b);
        }
        assert_eq!(hop_counts(&par), vec![0, 1, 2, 3, 4]);
        assert_eq!(hop_counts(&seq), hop_counts(&par));
    }

    #[tokio::test]
    async fn test_failed_task_keeps_other_robots() {
        let config = Arc::new(ControllerConfig::default());
        let broken: Box<dyn SupervisoryAcceptor> =
            Box::new(|_: &GuardSet| -> Option<Event> { panic!("acceptor stalled") });
        let robots = vec![
            Robot::new(1, Role::Leader, Some(1), config.clone(), idle()),
            Robot::new(2, Role::Follower, Some(1), config.clone(), broken),
            Robot::new(3, Role::Follower, Some(1), config.clone(), idle()),
        ];
        let mut s = Scheduler::new(robots);

        let err = s.tick_parallel(&Line).await.unwrap_err();
        assert!(err.to_string().contains("robot 1 failed during tick 1"));
        let ids: Vec<String> = s.robots().iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["L1", "F3"]);
        assert!(s.is_poisoned());
        assert_eq!(s.tick_count(), 0);

        assert!(s.tick_parallel(&Line).await.is_err());
    }
}

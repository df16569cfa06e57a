//! 随机 token 博弈：每步从可激发迁移中均匀随机选一个发射；
//! 遇到死锁则回到 `M0` 重新开始。固定种子的 `StdRng` 下结果可复现。
//!
//! 与覆盖图不同，这里跳过没有任何弧的孤立迁移，避免空转。

use std::fmt;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::Serialize;

use crate::net::core::{FireError, Net};
use crate::net::ids::TransitionId;
use crate::net::structure::Marking;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SimulationEvent {
    Fired {
        step: usize,
        transition: TransitionId,
        marking: Marking,
    },
    /// The marking before this step was dead; the game resumed from `M0`.
    Restarted { step: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct Simulation {
    pub events: Vec<SimulationEvent>,
    pub final_marking: Marking,
}

impl Simulation {
    pub fn firings(&self) -> impl Iterator<Item = (TransitionId, &Marking)> {
        self.events.iter().filter_map(|event| match event {
            SimulationEvent::Fired {
                transition, marking, ..
            } => Some((*transition, marking)),
            SimulationEvent::Restarted { .. } => None,
        })
    }

    pub fn restarts(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, SimulationEvent::Restarted { .. }))
            .count()
    }
}

impl fmt::Display for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.events {
            match event {
                SimulationEvent::Fired {
                    step,
                    transition,
                    marking,
                } => writeln!(f, "{step:>4}: fire {transition} -> {marking}")?,
                SimulationEvent::Restarted { step } => {
                    writeln!(f, "{step:>4}: deadlock, restart from M0")?
                }
            }
        }
        write!(f, "final marking: {}", self.final_marking)
    }
}

pub struct Simulator<'a> {
    net: &'a Net,
}

impl<'a> Simulator<'a> {
    pub fn new(net: &'a Net) -> Self {
        Self { net }
    }

    fn candidates(&self, marking: &Marking) -> Vec<TransitionId> {
        self.net
            .enabled_transitions(marking)
            .into_iter()
            .filter(|&t| self.net.has_arcs(t))
            .collect()
    }

    /// Plays `steps` rounds of the token game starting at `M0`.
    ///
    /// A round either fires one transition or, on a dead marking, restarts.
    pub fn run<R: Rng + ?Sized>(&self, steps: usize, rng: &mut R) -> Result<Simulation, FireError> {
        let initial = self.net.initial_marking();
        let mut marking = initial.clone();
        let mut events = Vec::with_capacity(steps);

        for step in 1..=steps {
            let candidates = self.candidates(&marking);
            let Some(&transition) = candidates.choose(rng) else {
                log::debug!("simulation step {step}: deadlock at {marking}, restarting");
                marking = initial.clone();
                events.push(SimulationEvent::Restarted { step });
                continue;
            };
            marking = self.net.fire(&marking, transition)?;
            log::debug!("simulation step {step}: {transition} -> {marking}");
            events.push(SimulationEvent::Fired {
                step,
                transition,
                marking: marking.clone(),
            });
        }

        Ok(Simulation {
            events,
            final_marking: marking,
        })
    }
}

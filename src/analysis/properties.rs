//! 基于覆盖图的性质判定：有界性、安全性与活性的必要条件。
//!
//! 预算耗尽时覆盖图只是欠近似：找到的反例（ω、多于 1 个 token、死锁）
//! 依然成立，但“有界 / 安全 / 所有迁移可达”只能报告为不确定。

use std::fmt;

use serde::Serialize;

use crate::analysis::coverability::{CoverabilityGraph, unbounded_places};
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::Idx;
use crate::net::structure::Weight;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Holds,
    Violated,
    /// No counterexample in a graph cut short by the step budget.
    Inconclusive,
}

impl Verdict {
    fn from_search(violated: bool, exhausted: bool) -> Self {
        match (violated, exhausted) {
            (true, _) => Verdict::Violated,
            (false, false) => Verdict::Holds,
            (false, true) => Verdict::Inconclusive,
        }
    }

    pub fn holds(self) -> bool {
        self == Verdict::Holds
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Holds => "yes",
            Verdict::Violated => "no",
            Verdict::Inconclusive => "inconclusive (step budget exhausted)",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Liveness {
    /// Some transitions never fire in the complete graph.
    NotLive { unreachable: Vec<TransitionId> },
    /// Every transition fires somewhere; full liveness is not decided.
    NecessaryConditionMet,
    /// Some transitions were not seen, but exploration was cut short.
    Inconclusive { unreachable: Vec<TransitionId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub bounded: Verdict,
    pub safe: Verdict,
    /// Largest finite token count seen in any place of any marking.
    pub max_tokens: Weight,
    pub unbounded_places: Vec<PlaceId>,
    pub reachable_transitions: Vec<TransitionId>,
    pub unreachable_transitions: Vec<TransitionId>,
    pub liveness: Liveness,
    /// Node ids whose marking enables no transition.
    pub deadlocks: Vec<usize>,
    pub exhausted: bool,
}

impl Classification {
    pub fn is_bounded(&self) -> bool {
        self.bounded.holds()
    }

    pub fn is_safe(&self) -> bool {
        self.safe.holds()
    }

    pub fn unreachable_indices(&self) -> Vec<usize> {
        self.unreachable_transitions.iter().map(|t| t.index()).collect()
    }
}

pub fn classify(graph: &CoverabilityGraph) -> Classification {
    let exhausted = graph.exhausted();

    let mut has_omega = false;
    let mut over_one = false;
    let mut max_tokens = 0;
    for node in &graph.nodes {
        has_omega |= node.marking.has_omega();
        let largest = node.marking.max_finite();
        over_one |= largest > 1;
        max_tokens = max_tokens.max(largest);
    }

    let mut fired = vec![false; graph.transition_count];
    for edge in &graph.edges {
        fired[edge.transition.index()] = true;
    }
    let (reachable_transitions, unreachable_transitions): (Vec<_>, Vec<_>) = (0..graph
        .transition_count)
        .map(TransitionId::from_usize)
        .partition(|t| fired[t.index()]);

    let liveness = match (unreachable_transitions.is_empty(), exhausted) {
        (true, _) => Liveness::NecessaryConditionMet,
        (false, false) => Liveness::NotLive {
            unreachable: unreachable_transitions.clone(),
        },
        (false, true) => Liveness::Inconclusive {
            unreachable: unreachable_transitions.clone(),
        },
    };

    let classification = Classification {
        bounded: Verdict::from_search(has_omega, exhausted),
        safe: Verdict::from_search(has_omega || over_one, exhausted),
        max_tokens,
        unbounded_places: unbounded_places(graph),
        reachable_transitions,
        unreachable_transitions,
        liveness,
        deadlocks: graph.deadlocks().map(|node| node.index).collect(),
        exhausted,
    };
    log::info!(
        "bounded: {}, safe: {}, max tokens: {}, unreachable: {:?}",
        classification.bounded,
        classification.safe,
        classification.max_tokens,
        classification.unreachable_transitions
    );
    classification
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::coverability::{CoverabilityExplorer, ExplorerConfig};
    use crate::net::core::Net;

    fn classify_net(f: &[Vec<i64>], h: &[Vec<i64>], m0: &[i64], budget: usize) -> Classification {
        let net = Net::from_matrices(f, h, m0).unwrap();
        let config = ExplorerConfig {
            step_budget: budget,
            ..ExplorerConfig::default()
        };
        classify(&CoverabilityExplorer::new(&net, config).explore())
    }

    #[test]
    fn dead_initial_marking() {
        // 两个迁移都需要 p0 中的 token
        let result = classify_net(&[vec![1, 2]], &[vec![0], vec![0]], &[0], 50);
        assert_eq!(result.deadlocks, vec![0]);
        assert_eq!(result.unreachable_indices(), vec![0, 1]);
        assert_eq!(
            result.liveness,
            Liveness::NotLive {
                unreachable: vec![TransitionId::new(0), TransitionId::new(1)]
            }
        );
        assert!(result.is_bounded());
        assert!(result.is_safe());
        assert_eq!(result.max_tokens, 0);
    }

    #[test]
    fn two_tokens_are_bounded_but_unsafe() {
        // t0: p0 -> p1 各一个，p0 初始两个 token
        let result = classify_net(&[vec![1], vec![0]], &[vec![0, 1]], &[2, 0], 50);
        assert_eq!(result.bounded, Verdict::Holds);
        assert_eq!(result.safe, Verdict::Violated);
        assert_eq!(result.max_tokens, 2);
        assert_eq!(result.liveness, Liveness::NecessaryConditionMet);
        assert_eq!(result.deadlocks.len(), 1);
    }

    #[test]
    fn omega_is_unbounded_even_when_exhausted() {
        // 源迁移不断向 p0 放入 token；第 11 次展开时 11 > 10 被加宽为 ω
        let cut_short = classify_net(&[vec![0]], &[vec![1]], &[0], 5);
        assert!(cut_short.exhausted);
        assert_eq!(cut_short.bounded, Verdict::Inconclusive);
        assert_eq!(cut_short.safe, Verdict::Violated);

        let complete = classify_net(&[vec![0]], &[vec![1]], &[0], 50);
        assert!(!complete.exhausted);
        assert_eq!(complete.bounded, Verdict::Violated);
        assert_eq!(complete.unbounded_places, vec![PlaceId::new(0)]);
        assert_eq!(complete.max_tokens, 10);
    }

    #[test]
    fn unseen_transitions_are_inconclusive_under_budget() {
        // t0 生产，t1 需要 20 个 token 才能发射
        let result = classify_net(&[vec![0, 20]], &[vec![1], vec![0]], &[0], 3);
        assert_eq!(
            result.liveness,
            Liveness::Inconclusive {
                unreachable: vec![TransitionId::new(1)]
            }
        );
        assert_eq!(result.reachable_transitions, vec![TransitionId::new(0)]);
    }
}

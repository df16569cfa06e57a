//! 覆盖图构建
//!
//! 从 `M0` 出发按广度优先展开可达标识，精确去重，并以父标识为参照做 ω 加宽：
//! 若某库所相对父标识严格增长且超过阈值（默认 10），则置为 ω。
//!
//! 注意：加宽只与直接父节点比较，而非经典 Karp–Miller 的整条祖先路径，
//! 因此可能漏报经由更长增长序列才显现的无界性（不会误报）。
//! 展开步数受预算约束（默认 50），预算耗尽与自然终止分开报告。

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexSet;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::net::core::{FireError, Net, escape_label};
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::structure::{Marking, Tokens, Weight};

pub const DEFAULT_STEP_BUDGET: usize = 50;
pub const DEFAULT_WIDENING_THRESHOLD: Weight = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExplorerConfig {
    /// 最多展开的节点数（出队次数）
    pub step_budget: usize,
    /// 严格增长且超过该值的库所被加宽为 ω
    pub widening_threshold: Weight,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            step_budget: DEFAULT_STEP_BUDGET,
            widening_threshold: DEFAULT_WIDENING_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NodeStatus {
    /// Discovered but never expanded (only left over when the budget ran out).
    Pending,
    Expanded { enabled: Vec<TransitionId> },
    /// No transition is enabled.
    Deadlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverabilityNode {
    pub index: usize,
    pub marking: Marking,
    pub status: NodeStatus,
}

impl CoverabilityNode {
    pub fn visited(&self) -> bool {
        !matches!(self.status, NodeStatus::Pending)
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self.status, NodeStatus::Deadlock)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeEdge {
    pub source: usize,
    pub target: usize,
    pub transition: TransitionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// The worklist emptied.
    Converged,
    /// The step budget ran out with nodes still pending; the graph is a
    /// safe under-approximation.
    BudgetExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Successor {
    pub transition: TransitionId,
    pub target: usize,
    /// `false` when the firing landed on an already discovered marking.
    pub fresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepOutcome {
    Deadlock,
    Expanded { successors: Vec<Successor> },
}

/// One expansion step, kept for the step-by-step report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    pub step: usize,
    pub node: usize,
    pub outcome: StepOutcome,
}

/// A firing that failed although the transition was enabled (token overflow).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiringFailure {
    pub source: usize,
    pub transition: TransitionId,
    pub error: FireError,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverabilityGraph {
    pub nodes: Vec<CoverabilityNode>,
    pub edges: Vec<TreeEdge>,
    pub termination: Termination,
    pub steps: usize,
    pub transition_count: usize,
    pub trace: Vec<TraceStep>,
    pub failures: Vec<FiringFailure>,
}

impl CoverabilityGraph {
    pub fn exhausted(&self) -> bool {
        self.termination == Termination::BudgetExhausted
    }

    pub fn find(&self, marking: &Marking) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| &node.marking == marking)
    }

    pub fn deadlocks(&self) -> impl Iterator<Item = &CoverabilityNode> {
        self.nodes.iter().filter(|node| node.is_deadlock())
    }

    pub fn to_petgraph(&self) -> DiGraph<String, String> {
        let mut graph = DiGraph::new();
        let indices: Vec<NodeIndex> = self
            .nodes
            .iter()
            .map(|node| graph.add_node(format!("M{}: {}", node.index, node.marking)))
            .collect();
        for edge in &self.edges {
            graph.add_edge(
                indices[edge.source],
                indices[edge.target],
                edge.transition.label(),
            );
        }
        graph
    }

    pub fn to_dot(&self) -> String {
        let graph = self.to_petgraph();
        format!(
            "{:?}",
            Dot::with_attr_getters(
                &graph,
                &[Config::EdgeNoLabel, Config::NodeNoLabel],
                &|_, edge| format!("label=\"{}\"", escape_label(edge.weight())),
                &|_, (idx, label)| {
                    let node = &self.nodes[idx.index()];
                    let fill = if node.is_deadlock() {
                        "#ffcdd2"
                    } else if node.marking.has_omega() {
                        "#fff9c4"
                    } else {
                        "#e3f2fd"
                    };
                    format!(
                        "label=\"{}\", style=filled, fillcolor=\"{}\"",
                        escape_label(label),
                        fill
                    )
                },
            )
        )
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_dot())
    }
}

impl fmt::Display for CoverabilityGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.trace {
            let node = &self.nodes[step.node];
            writeln!(f, "Step {}: expanding M{}: {}", step.step, step.node, node.marking)?;
            match &step.outcome {
                StepOutcome::Deadlock => writeln!(f, "  -> deadlock marking")?,
                StepOutcome::Expanded { successors } => {
                    let enabled: Vec<String> =
                        successors.iter().map(|s| s.transition.label()).collect();
                    writeln!(f, "  -> enabled: {}", enabled.join(", "))?;
                    for successor in successors {
                        let target = &self.nodes[successor.target];
                        if successor.fresh {
                            writeln!(
                                f,
                                "    {} -> M{}: {}",
                                successor.transition, successor.target, target.marking
                            )?;
                        } else {
                            writeln!(
                                f,
                                "    {} -> M{} (existing)",
                                successor.transition, successor.target
                            )?;
                        }
                    }
                }
            }
        }
        if self.exhausted() {
            writeln!(
                f,
                "Stopped after {} steps with {} marking(s) unexpanded",
                self.steps,
                self.nodes.iter().filter(|node| !node.visited()).count()
            )?;
        }
        Ok(())
    }
}

/// Applies the parent-relative widening rule to a freshly fired marking.
pub fn widen(parent: &Marking, candidate: &mut Marking, threshold: Weight) {
    for (place, tokens) in parent.iter() {
        let Tokens::Finite(before) = tokens else {
            continue;
        };
        if let Tokens::Finite(after) = candidate.tokens(place) {
            if after > before && after > threshold {
                *candidate.tokens_mut(place) = Tokens::Omega;
            }
        }
    }
}

pub struct CoverabilityExplorer<'a> {
    net: &'a Net,
    config: ExplorerConfig,
}

impl<'a> CoverabilityExplorer<'a> {
    pub fn new(net: &'a Net, config: ExplorerConfig) -> Self {
        Self { net, config }
    }

    pub fn explore(&self) -> CoverabilityGraph {
        self.explore_from(self.net.initial_marking())
    }

    pub fn explore_from(&self, initial: Marking) -> CoverabilityGraph {
        // IndexSet 的插入序即节点编号，查重为 O(1)
        let mut discovered: IndexSet<Marking> = IndexSet::new();
        discovered.insert(initial);
        let mut statuses = vec![NodeStatus::Pending];
        let mut edges = Vec::new();
        let mut trace = Vec::new();
        let mut failures = Vec::new();
        let mut queue = VecDeque::from([0usize]);
        let mut steps = 0;

        while steps < self.config.step_budget {
            let Some(current) = queue.pop_front() else {
                break;
            };
            steps += 1;

            let marking = discovered[current].clone();
            log::debug!("step {steps}: expanding M{current}: {marking}");

            let enabled = self.net.enabled_transitions(&marking);
            if enabled.is_empty() {
                log::debug!("  M{current} is a deadlock");
                statuses[current] = NodeStatus::Deadlock;
                trace.push(TraceStep {
                    step: steps,
                    node: current,
                    outcome: StepOutcome::Deadlock,
                });
                continue;
            }

            let mut successors = Vec::with_capacity(enabled.len());
            for &transition in &enabled {
                let mut candidate = match self.net.fire(&marking, transition) {
                    Ok(next) => next,
                    Err(error) => {
                        log::warn!("firing {transition} from M{current} failed: {error}");
                        failures.push(FiringFailure {
                            source: current,
                            transition,
                            error,
                        });
                        continue;
                    }
                };
                widen(&marking, &mut candidate, self.config.widening_threshold);

                let (target, fresh) = discovered.insert_full(candidate);
                if fresh {
                    statuses.push(NodeStatus::Pending);
                    queue.push_back(target);
                    log::debug!("  {transition} -> M{target}: {}", discovered[target]);
                } else {
                    log::debug!("  {transition} -> M{target} (existing)");
                }
                edges.push(TreeEdge {
                    source: current,
                    target,
                    transition,
                });
                successors.push(Successor {
                    transition,
                    target,
                    fresh,
                });
            }

            statuses[current] = NodeStatus::Expanded { enabled };
            trace.push(TraceStep {
                step: steps,
                node: current,
                outcome: StepOutcome::Expanded { successors },
            });
        }

        let termination = if queue.is_empty() {
            Termination::Converged
        } else {
            log::warn!(
                "step budget of {} exhausted with {} marking(s) pending",
                self.config.step_budget,
                queue.len()
            );
            Termination::BudgetExhausted
        };

        let nodes: Vec<CoverabilityNode> = discovered
            .into_iter()
            .zip(statuses)
            .enumerate()
            .map(|(index, (marking, status))| CoverabilityNode {
                index,
                marking,
                status,
            })
            .collect();

        log::info!(
            "coverability graph: {} marking(s), {} edge(s), {} step(s), {:?}",
            nodes.len(),
            edges.len(),
            steps,
            termination
        );

        CoverabilityGraph {
            nodes,
            edges,
            termination,
            steps,
            transition_count: self.net.transitions_len(),
            trace,
            failures,
        }
    }
}

/// Places that hold ω in some node.
pub fn unbounded_places(graph: &CoverabilityGraph) -> Vec<PlaceId> {
    let mut places: Vec<PlaceId> = graph
        .nodes
        .iter()
        .flat_map(|node| node.marking.omega_places())
        .collect();
    places.sort();
    places.dedup();
    places
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explore(f: &[Vec<i64>], h: &[Vec<i64>], m0: &[i64]) -> CoverabilityGraph {
        let net = Net::from_matrices(f, h, m0).unwrap();
        CoverabilityExplorer::new(&net, ExplorerConfig::default()).explore()
    }

    #[test]
    fn widening_compares_against_the_parent_only() {
        let parent = Marking::from_counts(&[10, 3, 12]);
        let mut candidate = Marking::from_counts(&[11, 20, 12]);
        widen(&parent, &mut candidate, 10);
        // p0、p1 增长且超过阈值；p2 未增长
        assert_eq!(candidate.tokens(PlaceId::new(0)), Tokens::Omega);
        assert_eq!(candidate.tokens(PlaceId::new(1)), Tokens::Omega);
        assert_eq!(candidate.tokens(PlaceId::new(2)), Tokens::Finite(12));

        let mut small = Marking::from_counts(&[9, 4, 1]);
        widen(&Marking::from_counts(&[8, 3, 0]), &mut small, 10);
        assert!(!small.has_omega());
    }

    #[test]
    fn self_loop_with_gain_reaches_omega() {
        // t0 从 p0 取 1 个放回 2 个
        let graph = explore(&[vec![1]], &[vec![2]], &[1]);
        assert_eq!(graph.termination, Termination::Converged);
        // 1..=10 十个有限标识加一个 ω 标识
        assert_eq!(graph.nodes.len(), 11);
        let omega = graph.nodes.last().unwrap();
        assert_eq!(omega.marking.tokens(PlaceId::new(0)), Tokens::Omega);
        // ω 节点发射后回到自身
        assert!(graph.edges.contains(&TreeEdge {
            source: omega.index,
            target: omega.index,
            transition: TransitionId::new(0)
        }));
        assert_eq!(unbounded_places(&graph), vec![PlaceId::new(0)]);
    }

    #[test]
    fn shared_states_reuse_the_first_index() {
        // t0: p0 -> p1, t1: p1 -> p0：两个标识互相可达
        let graph = explore(&[vec![1, 0], vec![0, 1]], &[vec![0, 1], vec![1, 0]], &[1, 0]);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(
            graph.edges,
            vec![
                TreeEdge {
                    source: 0,
                    target: 1,
                    transition: TransitionId::new(0)
                },
                TreeEdge {
                    source: 1,
                    target: 0,
                    transition: TransitionId::new(1)
                },
            ]
        );
        let StepOutcome::Expanded { successors } = &graph.trace[1].outcome else {
            panic!("M1 should have been expanded");
        };
        assert!(!successors[0].fresh);
    }

    #[test]
    fn diamond_merges_into_one_node() {
        // t0: p0 -> p2, t1: p1 -> p3；两种发射顺序汇合于同一标识
        let graph = explore(
            &[vec![1, 0], vec![0, 1], vec![0, 0], vec![0, 0]],
            &[vec![0, 0, 1, 0], vec![0, 0, 0, 1]],
            &[1, 1, 0, 0],
        );
        assert_eq!(graph.nodes.len(), 4);
        let sink = graph.find(&Marking::from_counts(&[0, 0, 1, 1])).unwrap();
        assert_eq!(graph.edges.iter().filter(|e| e.target == sink).count(), 2);
        assert_eq!(graph.deadlocks().map(|n| n.index).collect::<Vec<_>>(), vec![sink]);
    }

    #[test]
    fn budget_exhaustion_is_reported() {
        let net = Net::from_matrices(&[vec![0]], &[vec![1]], &[0]).unwrap();
        let config = ExplorerConfig {
            step_budget: 3,
            widening_threshold: 100,
        };
        let graph = CoverabilityExplorer::new(&net, config).explore();
        assert!(graph.exhausted());
        assert_eq!(graph.steps, 3);
        assert_eq!(graph.nodes.len(), 4);
        assert!(!graph.nodes[3].visited());
        assert!(graph.to_string().contains("Stopped after 3 steps"));
    }

    #[test]
    fn zero_budget_expands_nothing() {
        let net = Net::from_matrices(&[vec![1]], &[vec![0]], &[1]).unwrap();
        let config = ExplorerConfig {
            step_budget: 0,
            ..ExplorerConfig::default()
        };
        let graph = CoverabilityExplorer::new(&net, config).explore();
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.exhausted());
        assert!(!graph.nodes[0].visited());
    }

    #[test]
    fn dot_labels_markings_and_transitions() {
        let graph = explore(&[vec![1]], &[vec![0]], &[1]);
        let dot = graph.to_dot();
        assert!(dot.contains("M0: [1]"));
        assert!(dot.contains("M1: [0]"));
        assert!(dot.contains("label=\"T1\""));
        assert!(dot.contains("#ffcdd2"));
    }
}

//! 端到端场景：守恒环、无界增长、无不变量的无环网，以及覆盖图的通用性质。

use pn_analyzer::analysis::coverability::{CoverabilityExplorer, ExplorerConfig};
use pn_analyzer::analysis::invariants::{Invariant, InvariantAnalyzer};
use pn_analyzer::analysis::properties::{Liveness, Verdict, classify};
use pn_analyzer::net::io::{parse_layout, read_net};
use pn_analyzer::net::{Marking, Net, PlaceId, Tokens, TransitionId};
use pn_analyzer::{AnalysisConfig, AnalysisEngine, analyze_invariants, build_coverability_graph};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn cycle_matrices(n: usize) -> (Vec<Vec<i64>>, Vec<Vec<i64>>, Vec<i64>) {
    let f = (0..n)
        .map(|p| (0..n).map(|t| i64::from(t == p)).collect())
        .collect();
    let h = (0..n)
        .map(|t| (0..n).map(|p| i64::from(p == (t + 1) % n)).collect())
        .collect();
    let mut m0 = vec![0; n];
    m0[0] = 1;
    (f, h, m0)
}

// 两个进程争用一个互斥锁：idle1, crit1, idle2, crit2, mutex
fn mutex_net() -> Net {
    let f = vec![
        vec![1, 0, 0, 0],
        vec![0, 1, 0, 0],
        vec![0, 0, 1, 0],
        vec![0, 0, 0, 1],
        vec![1, 0, 1, 0],
    ];
    let h = vec![
        vec![0, 1, 0, 0, 0],
        vec![1, 0, 0, 0, 1],
        vec![0, 0, 0, 1, 0],
        vec![0, 0, 1, 0, 1],
    ];
    Net::from_matrices(&f, &h, &[1, 0, 1, 0, 1]).unwrap()
}

fn random_net(rng: &mut StdRng) -> Net {
    let places = rng.random_range(1..=4);
    let transitions = rng.random_range(1..=4);
    let f: Vec<Vec<i64>> = (0..places)
        .map(|_| (0..transitions).map(|_| rng.random_range(0..=2)).collect())
        .collect();
    let h: Vec<Vec<i64>> = (0..transitions)
        .map(|_| (0..places).map(|_| rng.random_range(0..=2)).collect())
        .collect();
    let m0: Vec<i64> = (0..places).map(|_| rng.random_range(0..=2)).collect();
    Net::from_matrices(&f, &h, &m0).unwrap()
}

fn finite_edges(net: &Net) -> Vec<(Marking, Marking)> {
    let graph = CoverabilityExplorer::new(net, ExplorerConfig::default()).explore();
    graph
        .edges
        .iter()
        .map(|edge| {
            (
                graph.nodes[edge.source].marking.clone(),
                graph.nodes[edge.target].marking.clone(),
            )
        })
        .filter(|(from, to)| !from.has_omega() && !to.has_omega())
        .collect()
}

fn assert_conserved(invariant: &Invariant, edges: &[(Marking, Marking)]) {
    for (from, to) in edges {
        let before = invariant.weighted_sum(from).unwrap();
        let after = invariant.weighted_sum(to).unwrap();
        assert!(
            (before - after).abs() < 1e-9,
            "{invariant} not conserved between {from} and {to}"
        );
    }
}

#[test]
fn scenario_a_conservative_six_cycle() {
    let (f, h, m0) = cycle_matrices(6);
    let engine = AnalysisEngine::from_matrices(&f, &h, &m0, AnalysisConfig::default()).unwrap();
    let report = engine.analyze();

    let graph = report.coverability.as_ref().unwrap();
    assert!(!graph.exhausted());
    assert_eq!(graph.nodes.len(), 6);
    for node in &graph.nodes {
        let tokens: Vec<Tokens> = node.marking.iter().map(|(_, tokens)| tokens).collect();
        assert_eq!(tokens.iter().filter(|&&t| t == Tokens::Finite(1)).count(), 1);
        assert_eq!(tokens.iter().filter(|&&t| t == Tokens::Finite(0)).count(), 5);
    }

    let properties = report.properties.as_ref().unwrap();
    assert_eq!(properties.bounded, Verdict::Holds);
    assert_eq!(properties.safe, Verdict::Holds);
    assert_eq!(properties.max_tokens, 1);
    assert!(properties.unreachable_transitions.is_empty());
    assert!(properties.deadlocks.is_empty());
    assert_eq!(properties.liveness, Liveness::NecessaryConditionMet);

    let invariants = report.invariants.as_ref().unwrap();
    assert_eq!(invariants.p_invariants.len(), 1);
    assert_eq!(invariants.t_invariants.len(), 1);
    for invariant in invariants.p_invariants.iter().chain(&invariants.t_invariants) {
        assert!(invariant.is_full());
        let first = invariant.weights[0];
        assert!(invariant.weights.iter().all(|w| (w - first).abs() < 1e-9));
    }
    #[cfg(feature = "exact-invariants")]
    {
        let ones: Vec<num::BigInt> = vec![num::BigInt::from(1); 6];
        assert_eq!(invariants.exact.place, vec![ones.clone()]);
        assert_eq!(invariants.exact.transition, vec![ones]);
    }
}

#[test]
fn scenario_a_from_text_layout() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/nets/cycle6.txt");
    let from_file = read_net(path).unwrap();
    let (f, h, m0) = cycle_matrices(6);
    let layout = parse_layout(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(layout.f, f);
    assert_eq!(layout.h, h);
    assert_eq!(layout.m0, m0);
    assert_eq!(from_file.c_matrix(), Net::from_matrices(&f, &h, &m0).unwrap().c_matrix());
}

#[test]
fn scenario_b_unbounded_growth() {
    // t0 从 p0 取 1 个、放回 2 个
    let graph = build_coverability_graph(&[vec![1]], &[vec![2]], &[1]).unwrap();
    assert!(graph.nodes.iter().any(|node| node.marking.tokens(PlaceId::new(0)).is_omega()));

    let properties = classify(&graph);
    assert_eq!(properties.bounded, Verdict::Violated);
    assert!(!properties.is_bounded());
    assert_eq!(properties.safe, Verdict::Violated);
    assert_eq!(properties.unbounded_places, vec![PlaceId::new(0)]);
}

#[test]
fn scenario_c_single_transition_chain() {
    // p0 -> t0 -> p1：C = [[-1], [1]]，列满秩，故无 T-不变量；
    // token 总数守恒，P-不变量 [1, 1] 存在且为满的
    let analysis = analyze_invariants(&[vec![1], vec![0]], &[vec![0, 1]]).unwrap();
    assert!(analysis.errors.is_empty());
    assert!(analysis.t_invariants.is_empty());
    assert_eq!(analysis.p_invariants.len(), 1);
    assert!(analysis.p_invariants[0].is_full());
}

#[test]
fn scenario_c_nonsingular_incidence_has_no_invariants() {
    // t0: p0 -> p1, t1: p1 -> (sink)；C = [[-1, 0], [1, -1]] 可逆
    let f = vec![vec![1, 0], vec![0, 1]];
    let h = vec![vec![0, 1], vec![0, 0]];
    let analysis = analyze_invariants(&f, &h).unwrap();
    assert!(analysis.errors.is_empty());
    assert!(analysis.p_invariants.is_empty());
    assert!(analysis.t_invariants.is_empty());
    #[cfg(feature = "exact-invariants")]
    {
        assert!(analysis.exact.place.is_empty());
        assert!(analysis.exact.transition.is_empty());
    }
}

#[test]
fn p_invariants_are_conserved_by_every_firing() {
    let net = mutex_net();
    let analysis = InvariantAnalyzer::default().analyze(&net.c_matrix());
    // idle1+crit1、idle2+crit2、crit1+crit2+mutex 张成三维零空间
    assert_eq!(analysis.p_invariants.len(), 3);

    let edges = finite_edges(&net);
    assert_eq!(edges.len(), 4);
    for invariant in &analysis.p_invariants {
        assert_conserved(invariant, &edges);
    }

    #[cfg(feature = "exact-invariants")]
    {
        use num::BigInt;
        assert_eq!(analysis.exact.place.len(), 3);
        for y in &analysis.exact.place {
            for (from, to) in &edges {
                let dot = |m: &Marking| -> BigInt {
                    y.iter()
                        .zip(m.iter())
                        .map(|(w, (_, tokens))| w * BigInt::from(tokens.finite().unwrap()))
                        .sum()
                };
                assert_eq!(dot(from), dot(to));
            }
        }
    }
}

#[test]
fn conservation_holds_on_random_nets() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let net = random_net(&mut rng);
        let analysis = InvariantAnalyzer::default().analyze(&net.c_matrix());
        let edges = finite_edges(&net);
        for invariant in &analysis.p_invariants {
            assert_conserved(invariant, &edges);
        }
    }
}

#[test]
fn dedup_never_duplicates_markings() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..100 {
        let net = random_net(&mut rng);
        let graph = CoverabilityExplorer::new(&net, ExplorerConfig::default()).explore();
        for (idx, node) in graph.nodes.iter().enumerate() {
            assert_eq!(node.index, idx);
            assert_eq!(graph.find(&node.marking), Some(idx));
        }
        for edge in &graph.edges {
            assert!(edge.target < graph.nodes.len());
            assert!(edge.source < graph.nodes.len());
        }

        // 重新探索得到同一张图
        let again = CoverabilityExplorer::new(&net, ExplorerConfig::default()).explore();
        assert_eq!(again.nodes, graph.nodes);
        assert_eq!(again.edges, graph.edges);
    }
}

#[test]
fn dead_initial_marking_yields_single_deadlock_node() {
    let graph = build_coverability_graph(&[vec![1, 1], vec![0, 2]], &[vec![0, 0], vec![1, 0]], &[0, 1])
        .unwrap();
    assert_eq!(graph.nodes.len(), 1);
    assert!(graph.nodes[0].is_deadlock());
    assert!(graph.edges.is_empty());

    let properties = classify(&graph);
    assert_eq!(properties.deadlocks, vec![0]);
    assert_eq!(
        properties.unreachable_transitions,
        vec![TransitionId::new(0), TransitionId::new(1)]
    );
}

#[test]
fn exhausted_budget_makes_verdicts_inconclusive() {
    let (f, h, m0) = cycle_matrices(6);
    let config = AnalysisConfig {
        step_budget: 2,
        ..AnalysisConfig::default()
    };
    let engine = AnalysisEngine::from_matrices(&f, &h, &m0, config).unwrap();
    let graph = engine.build_coverability_graph();
    assert!(graph.exhausted());
    assert_eq!(graph.steps, 2);

    let properties = engine.classify(&graph);
    assert_eq!(properties.bounded, Verdict::Inconclusive);
    assert_eq!(properties.safe, Verdict::Inconclusive);
    assert!(matches!(properties.liveness, Liveness::Inconclusive { .. }));
    assert!(properties.deadlocks.is_empty());
}

#[test]
fn enabled_is_monotonic_in_the_marking() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..100 {
        let net = random_net(&mut rng);
        let base: Vec<u64> = (0..net.places_len()).map(|_| rng.random_range(0..=3)).collect();
        let marking = Marking::from_counts(&base);
        let mut larger = Marking::from_counts(
            &base.iter().map(|c| c + rng.random_range(0..=2)).collect::<Vec<_>>(),
        );
        if rng.random_bool(0.5) {
            *larger.tokens_mut(PlaceId::new(0)) = Tokens::Omega;
        }
        for t in 0..net.transitions_len() {
            let t = TransitionId::new(t as u32);
            if net.is_enabled(&marking, t) {
                assert!(net.is_enabled(&larger, t));
            }
        }
    }
}

#[test]
fn c_equals_h_transposed_minus_f() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..50 {
        let net = random_net(&mut rng);
        let c = net.c_matrix();
        let f = net.input_table();
        let h = net.output_table();
        for p in 0..net.places_len() {
            for t in 0..net.transitions_len() {
                let expected = h[t][p] as i64 - f[p][t] as i64;
                assert_eq!(c.get(PlaceId::new(p as u32), TransitionId::new(t as u32)), expected);
            }
        }
    }
}

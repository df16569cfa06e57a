//! 运行时：输入校验、可发生集与发生语义。
//!
//! `Net` 一经构造即不可变；所有分析都只借用它。
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::incidence::Incidence;
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::{Marking, Place, Tokens, Transition, Weight};

/// Which input table a validation problem was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatrixKind {
    /// Input arcs, `P × T`.
    F,
    /// Output arcs, `T × P`.
    H,
    /// Initial marking, length `P`.
    M0,
}

impl fmt::Display for MatrixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatrixKind::F => "F",
            MatrixKind::H => "H",
            MatrixKind::M0 => "M0",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ValidationError {
    #[error("row {row} of matrix {matrix} has {found} entries, expected {expected}")]
    RowLength {
        matrix: MatrixKind,
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("initial marking has {found} entries, expected {expected}")]
    MarkingLength { expected: usize, found: usize },
    #[error("negative value {value} at {matrix}[{row}][{col}]")]
    NegativeWeight {
        matrix: MatrixKind,
        row: usize,
        col: usize,
        value: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum FireError {
    #[error("transition {0:?} is out of bounds")]
    OutOfBounds(TransitionId),
    #[error("marking has {found} places, net has {expected}")]
    MarkingSize { expected: usize, found: usize },
    #[error("transition {0:?} is not enabled under the supplied marking")]
    NotEnabled(TransitionId),
    #[error("token count overflow at place {place:?} when firing {transition:?}")]
    Overflow {
        place: PlaceId,
        transition: TransitionId,
    },
}

/// Petri 网连通性诊断报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticReport {
    /// 孤立库所（无任何连接的弧）
    pub isolated_places: Vec<PlaceId>,
    /// 孤立变迁（无任何连接的弧）
    pub isolated_transitions: Vec<TransitionId>,
    /// 无输入库所的变迁，在任何标识下都可发生
    pub source_transitions: Vec<TransitionId>,
}

impl DiagnosticReport {
    pub fn has_issues(&self) -> bool {
        !self.isolated_places.is_empty()
            || !self.isolated_transitions.is_empty()
            || !self.source_transitions.is_empty()
    }
}

/// Validated place/transition net: input arcs `pre` (`F`), output arcs
/// `post` (`Hᵗ`, stored per place) and the initial marking.
#[derive(Clone, Serialize)]
pub struct Net {
    places: IndexVec<PlaceId, Place>,
    transitions: IndexVec<TransitionId, Transition>,
    pre: Incidence<Weight>,
    post: Incidence<Weight>,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("pre", &self.pre)
            .field("post", &self.post)
            .finish()
    }
}

impl Net {
    /// Builds a net from the tabular form: `f` is `P × T`, `h` is `T × P`,
    /// `m0` has `P` entries. The place count is taken from `f`, the transition
    /// count from `h`.
    pub fn from_matrices(f: &[Vec<i64>], h: &[Vec<i64>], m0: &[i64]) -> Result<Self, ValidationError> {
        let places = f.len();
        let transitions = h.len();

        check_table(MatrixKind::F, f, transitions)?;
        check_table(MatrixKind::H, h, places)?;
        if m0.len() != places {
            return Err(ValidationError::MarkingLength {
                expected: places,
                found: m0.len(),
            });
        }

        let mut builder = NetBuilder::new();
        for (idx, &tokens) in m0.iter().enumerate() {
            let tokens = non_negative(MatrixKind::M0, 0, idx, tokens)?;
            builder.add_place(Place::new(PlaceId::from_usize(idx).label(), tokens));
        }
        for idx in 0..transitions {
            builder.add_transition(Transition::new(TransitionId::from_usize(idx).label()));
        }
        for (p, row) in f.iter().enumerate() {
            for (t, &weight) in row.iter().enumerate() {
                let weight = non_negative(MatrixKind::F, p, t, weight)?;
                builder.set_input_weight(PlaceId::from_usize(p), TransitionId::from_usize(t), weight);
            }
        }
        for (t, row) in h.iter().enumerate() {
            for (p, &weight) in row.iter().enumerate() {
                let weight = non_negative(MatrixKind::H, t, p, weight)?;
                builder.set_output_weight(PlaceId::from_usize(p), TransitionId::from_usize(t), weight);
            }
        }
        Ok(builder.build())
    }

    pub fn places(&self) -> &IndexVec<PlaceId, Place> {
        &self.places
    }

    pub fn transitions(&self) -> &IndexVec<TransitionId, Transition> {
        &self.transitions
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    /// `F[p][t]`
    pub fn input_weight(&self, place: PlaceId, transition: TransitionId) -> Weight {
        self.pre.get(place, transition)
    }

    /// `H[t][p]`
    pub fn output_weight(&self, place: PlaceId, transition: TransitionId) -> Weight {
        self.post.get(place, transition)
    }

    pub fn initial_marking(&self) -> Marking {
        Marking::new(self.places.iter().map(|p| Tokens::Finite(p.tokens)).collect())
    }

    pub fn incidence(&self) -> (&Incidence<Weight>, &Incidence<Weight>) {
        (&self.pre, &self.post)
    }

    /// `C = Hᵗ - F`, one row per place.
    pub fn c_matrix(&self) -> Incidence<i64> {
        self.post.difference(&self.pre)
    }

    /// `F` as `P × T` rows.
    pub fn input_table(&self) -> Vec<Vec<Weight>> {
        self.pre.rows().iter().map(|row| row.to_vec()).collect()
    }

    /// `H` as `T × P` rows.
    pub fn output_table(&self) -> Vec<Vec<Weight>> {
        self.transitions
            .indices()
            .map(|t| self.post.column(t).map(|(_, weight)| weight).collect())
            .collect()
    }

    /// A transition is enabled iff every finite place holds at least its input
    /// weight; ω places never block.
    pub fn is_enabled(&self, marking: &Marking, transition: TransitionId) -> bool {
        if transition.index() >= self.transitions_len() || marking.len() != self.places_len() {
            return false;
        }
        self.pre
            .column(transition)
            .all(|(place, weight)| marking.tokens(place).satisfies(weight))
    }

    /// Enabled transitions in ascending index order.
    pub fn enabled_transitions(&self, marking: &Marking) -> Vec<TransitionId> {
        self.transitions
            .indices()
            .filter(|&transition| self.is_enabled(marking, transition))
            .collect()
    }

    pub fn fire(&self, marking: &Marking, transition: TransitionId) -> Result<Marking, FireError> {
        if transition.index() >= self.transitions_len() {
            return Err(FireError::OutOfBounds(transition));
        }
        if marking.len() != self.places_len() {
            return Err(FireError::MarkingSize {
                expected: self.places_len(),
                found: marking.len(),
            });
        }
        if !self.is_enabled(marking, transition) {
            return Err(FireError::NotEnabled(transition));
        }

        let mut next = marking.clone();
        for place in self.places.indices() {
            let Tokens::Finite(count) = marking.tokens(place) else {
                continue;
            };
            // enabled 已保证 count >= F[p][t]
            let after = (count - self.pre.get(place, transition))
                .checked_add(self.post.get(place, transition))
                .ok_or(FireError::Overflow { place, transition })?;
            *next.tokens_mut(place) = Tokens::Finite(after);
        }
        Ok(next)
    }

    pub fn has_arcs(&self, transition: TransitionId) -> bool {
        self.pre.column(transition).any(|(_, w)| w > 0)
            || self.post.column(transition).any(|(_, w)| w > 0)
    }

    /// 诊断信息：孤立节点与无前置库所的迁移
    pub fn diagnose_connectivity(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport::default();

        for place in self.places.indices() {
            let connected = self.pre.row(place).iter().any(|w| *w > 0)
                || self.post.row(place).iter().any(|w| *w > 0);
            if !connected {
                report.isolated_places.push(place);
            }
        }

        for transition in self.transitions.indices() {
            if !self.has_arcs(transition) {
                report.isolated_transitions.push(transition);
            } else if self.pre.column(transition).all(|(_, w)| w == 0) {
                report.source_transitions.push(transition);
            }
        }

        report
    }

    pub fn log_diagnostics(&self) {
        let report = self.diagnose_connectivity();
        if !report.has_issues() {
            log::info!("net connectivity check passed");
            return;
        }
        for place in &report.isolated_places {
            log::warn!("place {place} has no arcs");
        }
        for transition in &report.isolated_transitions {
            log::warn!("transition {transition} has no arcs");
        }
        for transition in &report.source_transitions {
            log::warn!("transition {transition} has no input places and is always enabled");
        }
    }

    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(&mut dot, "digraph PetriNet {{");
        let _ = writeln!(&mut dot, "    rankdir=LR;");
        let _ = writeln!(&mut dot, "    node [fontname=\"Helvetica\"];");

        for (place_id, place) in self.places.iter_enumerated() {
            let _ = writeln!(
                &mut dot,
                "    place_{} [label=\"{}\\n{}\", shape=circle, style=filled, fillcolor=\"#e3f2fd\"];",
                place_id.index(),
                escape_label(&place.name),
                place.tokens
            );
        }

        for (transition_id, transition) in self.transitions.iter_enumerated() {
            let _ = writeln!(
                &mut dot,
                "    trans_{} [label=\"{}\", shape=box, style=filled, fillcolor=\"#ffe0b2\"];",
                transition_id.index(),
                escape_label(&transition.name)
            );
        }

        for (matrix, outgoing) in [(&self.pre, true), (&self.post, false)] {
            for (place_id, row) in matrix.rows().iter_enumerated() {
                for (idx, weight) in row.iter().enumerate() {
                    if *weight == 0 {
                        continue;
                    }
                    let place_node = format!("place_{}", place_id.index());
                    let transition_node = format!("trans_{idx}");
                    let (from, to) = if outgoing {
                        (place_node, transition_node)
                    } else {
                        (transition_node, place_node)
                    };
                    if *weight == 1 {
                        let _ = writeln!(&mut dot, "    {from} -> {to};");
                    } else {
                        let _ = writeln!(&mut dot, "    {from} -> {to} [label=\"{weight}\"];");
                    }
                }
            }
        }

        let _ = writeln!(&mut dot, "}}");
        dot
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_dot())
    }
}

fn check_table(matrix: MatrixKind, rows: &[Vec<i64>], expected_cols: usize) -> Result<(), ValidationError> {
    for (row, values) in rows.iter().enumerate() {
        if values.len() != expected_cols {
            return Err(ValidationError::RowLength {
                matrix,
                row,
                expected: expected_cols,
                found: values.len(),
            });
        }
    }
    Ok(())
}

fn non_negative(matrix: MatrixKind, row: usize, col: usize, value: i64) -> Result<Weight, ValidationError> {
    Weight::try_from(value).map_err(|_| ValidationError::NegativeWeight {
        matrix,
        row,
        col,
        value,
    })
}

pub(crate) fn escape_label(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Incremental construction for programmatic callers; [`NetBuilder::build`]
/// freezes the result.
#[derive(Debug, Clone)]
pub struct NetBuilder {
    places: IndexVec<PlaceId, Place>,
    transitions: IndexVec<TransitionId, Transition>,
    inputs: Vec<(PlaceId, TransitionId, Weight)>,
    outputs: Vec<(PlaceId, TransitionId, Weight)>,
}

impl Default for NetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NetBuilder {
    pub fn new() -> Self {
        Self {
            places: IndexVec::new(),
            transitions: IndexVec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_place(&mut self, place: Place) -> PlaceId {
        self.places.push(place)
    }

    pub fn add_transition(&mut self, transition: Transition) -> TransitionId {
        self.transitions.push(transition)
    }

    /// 输入弧: place -> transition
    pub fn set_input_weight(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.inputs.push((place, transition, weight));
    }

    /// 输出弧: transition -> place
    pub fn set_output_weight(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.outputs.push((place, transition, weight));
    }

    /// # Panics
    /// If an arc refers to a place or transition that was never added.
    pub fn build(self) -> Net {
        let mut pre = Incidence::new(self.places.len(), self.transitions.len(), 0);
        let mut post = Incidence::new(self.places.len(), self.transitions.len(), 0);
        for (place, transition, weight) in self.inputs {
            pre.set(place, transition, weight);
        }
        for (place, transition, weight) in self.outputs {
            post.set(place, transition, weight);
        }
        Net {
            places: self.places,
            transitions: self.transitions,
            pre,
            post,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn six_cycle() -> Net {
        let n = 6;
        let f = (0..n)
            .map(|p| (0..n).map(|t| i64::from(t == p)).collect())
            .collect::<Vec<Vec<i64>>>();
        let h = (0..n)
            .map(|t| (0..n).map(|p| i64::from(p == (t + 1) % n)).collect())
            .collect::<Vec<Vec<i64>>>();
        Net::from_matrices(&f, &h, &[1, 0, 0, 0, 0, 0]).unwrap()
    }

    #[test]
    fn builder_sets_weights() {
        let mut builder = NetBuilder::new();
        let p = builder.add_place(Place::new("p", 1));
        let t = builder.add_transition(Transition::new("t"));
        builder.set_input_weight(p, t, 1);
        builder.set_output_weight(p, t, 2);
        let net = builder.build();

        assert_eq!(net.places_len(), 1);
        assert_eq!(net.transitions_len(), 1);
        assert_eq!(net.input_weight(p, t), 1);
        assert_eq!(net.output_weight(p, t), 2);
        assert_eq!(net.c_matrix().get(p, t), 1);
    }

    #[test]
    fn c_matrix_is_h_transposed_minus_f() {
        let f = vec![vec![2, 0], vec![0, 1], vec![1, 1]];
        let h = vec![vec![0, 3, 0], vec![1, 0, 4]];
        let net = Net::from_matrices(&f, &h, &[0, 0, 0]).unwrap();
        let c = net.c_matrix();
        for p in 0..3 {
            for t in 0..2 {
                assert_eq!(
                    c.get(PlaceId::from_usize(p), TransitionId::from_usize(t)),
                    h[t][p] - f[p][t]
                );
            }
        }
        assert_eq!(net.input_table(), vec![vec![2, 0], vec![0, 1], vec![1, 1]]);
        assert_eq!(net.output_table(), vec![vec![0, 3, 0], vec![1, 0, 4]]);
    }

    #[test]
    fn validation_reports_shape_and_sign_errors() {
        let err = Net::from_matrices(&[vec![1, 0]], &[vec![1]], &[1]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::RowLength {
                matrix: MatrixKind::F,
                row: 0,
                expected: 1,
                found: 2
            }
        );

        let err = Net::from_matrices(&[vec![1]], &[vec![1, 1]], &[1]).unwrap_err();
        assert!(matches!(err, ValidationError::RowLength { matrix: MatrixKind::H, .. }));

        let err = Net::from_matrices(&[vec![1]], &[vec![1]], &[1, 0]).unwrap_err();
        assert_eq!(err, ValidationError::MarkingLength { expected: 1, found: 2 });

        let err = Net::from_matrices(&[vec![-1]], &[vec![1]], &[1]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NegativeWeight {
                matrix: MatrixKind::F,
                row: 0,
                col: 0,
                value: -1
            }
        );

        let err = Net::from_matrices(&[vec![0]], &[vec![0]], &[-3]).unwrap_err();
        assert!(matches!(err, ValidationError::NegativeWeight { matrix: MatrixKind::M0, .. }));
    }

    #[test]
    fn firing_moves_the_token_around_the_cycle() {
        let net = six_cycle();
        let m0 = net.initial_marking();
        assert_eq!(net.enabled_transitions(&m0), vec![TransitionId::new(0)]);

        let m1 = net.fire(&m0, TransitionId::new(0)).unwrap();
        assert_eq!(m1, Marking::from_counts(&[0, 1, 0, 0, 0, 0]));
        assert_eq!(net.enabled_transitions(&m1), vec![TransitionId::new(1)]);
    }

    #[test]
    fn firing_a_disabled_transition_is_rejected() {
        let net = six_cycle();
        let m0 = net.initial_marking();
        assert_eq!(
            net.fire(&m0, TransitionId::new(3)),
            Err(FireError::NotEnabled(TransitionId::new(3)))
        );
        assert_eq!(
            net.fire(&m0, TransitionId::new(9)),
            Err(FireError::OutOfBounds(TransitionId::new(9)))
        );
        assert!(matches!(
            net.fire(&Marking::from_counts(&[1]), TransitionId::new(0)),
            Err(FireError::MarkingSize { expected: 6, found: 1 })
        ));
    }

    #[test]
    fn omega_places_never_block_and_stay_omega() {
        let net = Net::from_matrices(&[vec![5], vec![0]], &[vec![0, 1]], &[0, 0]).unwrap();
        let t = TransitionId::new(0);
        let mut marking = net.initial_marking();
        assert!(!net.is_enabled(&marking, t));

        *marking.tokens_mut(PlaceId::new(0)) = Tokens::Omega;
        assert!(net.is_enabled(&marking, t));
        let next = net.fire(&marking, t).unwrap();
        assert_eq!(next.tokens(PlaceId::new(0)), Tokens::Omega);
        assert_eq!(next.tokens(PlaceId::new(1)), Tokens::Finite(1));
    }

    #[test]
    fn enabledness_is_monotonic() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let places = rng.random_range(1..5);
            let transitions = rng.random_range(1..5);
            let f = (0..places)
                .map(|_| (0..transitions).map(|_| rng.random_range(0..3)).collect())
                .collect::<Vec<Vec<i64>>>();
            let h = vec![vec![0; places]; transitions];
            let m0 = (0..places).map(|_| rng.random_range(0..3)).collect::<Vec<i64>>();
            let net = Net::from_matrices(&f, &h, &m0).unwrap();

            let low = net.initial_marking();
            let mut high = low.clone();
            for place in net.places().indices() {
                *high.tokens_mut(place) = match rng.random_range(0..3) {
                    0 => low.tokens(place),
                    1 => Tokens::Finite(low.tokens(place).finite().unwrap() + 1),
                    _ => Tokens::Omega,
                };
            }
            assert!(high >= low);
            for t in net.transitions().indices() {
                if net.is_enabled(&low, t) {
                    assert!(net.is_enabled(&high, t));
                }
            }
        }
    }

    #[test]
    fn diagnostics_flag_isolated_and_source_nodes() {
        let net = Net::from_matrices(
            &[vec![0, 0, 0], vec![1, 0, 0]],
            &[vec![0, 0], vec![0, 1], vec![0, 0]],
            &[0, 0],
        )
        .unwrap();
        let report = net.diagnose_connectivity();
        assert_eq!(report.isolated_places, vec![PlaceId::new(0)]);
        assert_eq!(report.isolated_transitions, vec![TransitionId::new(2)]);
        assert_eq!(report.source_transitions, vec![TransitionId::new(1)]);
        assert!(report.has_issues());
    }

    #[test]
    fn dot_lists_places_transitions_and_weighted_arcs() {
        let net = Net::from_matrices(&[vec![2]], &[vec![1]], &[3]).unwrap();
        let dot = net.to_dot();
        assert!(dot.contains("place_0 [label=\"P1\\n3\""));
        assert!(dot.contains("trans_0 [label=\"T1\""));
        assert!(dot.contains("place_0 -> trans_0 [label=\"2\"];"));
        assert!(dot.contains("trans_0 -> place_0;"));
    }
}

//! 分析报告：文本与 JSON 两种输出。
//!
//! 校验与数值问题以结构化诊断附在报告末尾，不会中断其他分析。
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use itertools::Itertools;
use serde::Serialize;

use crate::analysis::coverability::CoverabilityGraph;
use crate::analysis::invariants::{Invariant, InvariantAnalysis, InvariantKind};
use crate::analysis::properties::{Classification, Liveness};
use crate::analysis::simulation::Simulation;
use crate::net::core::Net;
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::Idx;
use crate::net::structure::{Marking, Weight};

#[derive(Debug, Clone, Serialize)]
pub struct NetSummary {
    pub places: usize,
    pub transitions: usize,
    pub input: Vec<Vec<Weight>>,
    pub output: Vec<Vec<Weight>>,
    pub incidence: Vec<Vec<i64>>,
    pub initial_marking: Marking,
    pub enabled_at_initial: Vec<TransitionId>,
}

impl NetSummary {
    pub fn new(net: &Net) -> Self {
        let initial_marking = net.initial_marking();
        Self {
            places: net.places_len(),
            transitions: net.transitions_len(),
            input: net.input_table(),
            output: net.output_table(),
            incidence: net.c_matrix().rows().iter().map(|row| row.to_vec()).collect(),
            enabled_at_initial: net.enabled_transitions(&initial_marking),
            initial_marking,
        }
    }
}

/// Integer bases of both invariant families, rendered as decimal strings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegerInvariants {
    pub place: Vec<Vec<String>>,
    pub transition: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    IsolatedPlace { place: PlaceId },
    IsolatedTransition { transition: TransitionId },
    SourceTransition { transition: TransitionId },
    Numerical { family: InvariantKind, message: String },
    Firing {
        node: usize,
        transition: TransitionId,
        message: String,
    },
    BudgetExhausted { steps: usize, pending: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::IsolatedPlace { place } => write!(f, "place {place} has no arcs"),
            Diagnostic::IsolatedTransition { transition } => {
                write!(f, "transition {transition} has no arcs")
            }
            Diagnostic::SourceTransition { transition } => {
                write!(f, "transition {transition} has no input places and is always enabled")
            }
            Diagnostic::Numerical { family, message } => {
                write!(f, "{family} computation failed: {message}")
            }
            Diagnostic::Firing {
                node,
                transition,
                message,
            } => write!(f, "firing {transition} from M{node} failed: {message}"),
            Diagnostic::BudgetExhausted { steps, pending } => write!(
                f,
                "exploration stopped after {steps} steps with {pending} marking(s) unexpanded; \
                 results are an under-approximation"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub tool_name: String,
    pub analysis_time: Duration,
    pub net: NetSummary,
    pub invariants: Option<InvariantAnalysis>,
    pub integer_invariants: Option<IntegerInvariants>,
    pub coverability: Option<CoverabilityGraph>,
    pub properties: Option<Classification>,
    pub simulation: Option<Simulation>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisReport {
    /// An empty report for `net`, carrying its connectivity diagnostics.
    pub fn new(net: &Net) -> Self {
        let connectivity = net.diagnose_connectivity();
        let diagnostics = connectivity
            .isolated_places
            .iter()
            .map(|&place| Diagnostic::IsolatedPlace { place })
            .chain(
                connectivity
                    .isolated_transitions
                    .iter()
                    .map(|&transition| Diagnostic::IsolatedTransition { transition }),
            )
            .chain(
                connectivity
                    .source_transitions
                    .iter()
                    .map(|&transition| Diagnostic::SourceTransition { transition }),
            )
            .collect();

        Self {
            tool_name: env!("CARGO_PKG_NAME").to_string(),
            analysis_time: Duration::default(),
            net: NetSummary::new(net),
            invariants: None,
            integer_invariants: None,
            coverability: None,
            properties: None,
            simulation: None,
            diagnostics,
        }
    }

    pub fn set_invariants(&mut self, analysis: InvariantAnalysis) {
        self.diagnostics
            .extend(analysis.errors.iter().map(|failure| Diagnostic::Numerical {
                family: failure.kind,
                message: failure.error.to_string(),
            }));
        #[cfg(feature = "exact-invariants")]
        {
            let render = |basis: &[Vec<num::BigInt>]| -> Vec<Vec<String>> {
                basis
                    .iter()
                    .map(|vector| vector.iter().map(|v| v.to_string()).collect())
                    .collect()
            };
            self.integer_invariants = Some(IntegerInvariants {
                place: render(&analysis.exact.place),
                transition: render(&analysis.exact.transition),
            });
        }
        self.invariants = Some(analysis);
    }

    pub fn set_coverability(&mut self, graph: CoverabilityGraph) {
        self.diagnostics
            .extend(graph.failures.iter().map(|failure| Diagnostic::Firing {
                node: failure.source,
                transition: failure.transition,
                message: failure.error.to_string(),
            }));
        if graph.exhausted() {
            self.diagnostics.push(Diagnostic::BudgetExhausted {
                steps: graph.steps,
                pending: graph.nodes.iter().filter(|node| !node.visited()).count(),
            });
        }
        self.coverability = Some(graph);
    }

    pub fn set_properties(&mut self, properties: Classification) {
        self.properties = Some(properties);
    }

    pub fn set_simulation(&mut self, simulation: Simulation) {
        self.simulation = Some(simulation);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes the text report to `path` and the JSON form next to it.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        writeln!(file, "{}", self)?;

        let json = self.to_json().map_err(std::io::Error::other)?;
        fs::write(json_twin_path(path), json)
    }
}

/// `r.txt` -> `r.json`; a path already ending in `.json` gets `r.report.json`.
fn json_twin_path(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "json") {
        path.with_extension("report.json")
    } else {
        path.with_extension("json")
    }
}

fn write_table<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    row_label: impl Fn(usize) -> String,
    col_label: impl Fn(usize) -> String,
    rows: &[Vec<T>],
) -> fmt::Result {
    writeln!(f, "{title}")?;
    let cols = rows.first().map_or(0, |row| row.len());
    writeln!(f, "{:>6}{}", "", (0..cols).map(|c| format!("{:>5}", col_label(c))).join(""))?;
    for (r, row) in rows.iter().enumerate() {
        writeln!(
            f,
            "{:>6}{}",
            row_label(r),
            row.iter().map(|v| format!("{v:>5}")).join("")
        )?;
    }
    Ok(())
}

fn place_label(idx: usize) -> String {
    PlaceId::from_usize(idx).label()
}

fn transition_label(idx: usize) -> String {
    TransitionId::from_usize(idx).label()
}

fn write_family(
    f: &mut fmt::Formatter<'_>,
    kind: InvariantKind,
    analysis: &InvariantAnalysis,
    invariants: &[Invariant],
    integer: Option<&Vec<Vec<String>>>,
) -> fmt::Result {
    writeln!(f, "{kind}s:")?;
    if let Some(error) = analysis.failed(kind) {
        writeln!(f, "  computation failed: {error}")?;
    } else if invariants.is_empty() {
        writeln!(f, "  none found")?;
    } else {
        for (idx, invariant) in invariants.iter().enumerate() {
            let coverage = if invariant.is_full() { "full" } else { "partial" };
            writeln!(f, "  #{} {} ({})", idx + 1, invariant, coverage)?;
        }
    }
    if let Some(basis) = integer.filter(|basis| !basis.is_empty()) {
        writeln!(f, "  integer basis:")?;
        for vector in basis {
            writeln!(f, "    [{}]", vector.iter().join(", "))?;
        }
    }
    Ok(())
}

fn transition_list(transitions: &[TransitionId]) -> String {
    if transitions.is_empty() {
        "none".to_string()
    } else {
        transitions.iter().map(|t| t.label()).join(", ")
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Petri net analysis report")?;
        writeln!(f, "tool: {}", self.tool_name)?;
        writeln!(f, "analysis time: {:?}", self.analysis_time)?;
        writeln!(
            f,
            "places: {}, transitions: {}",
            self.net.places, self.net.transitions
        )?;

        writeln!(f)?;
        write_table(f, "Input matrix F (P x T):", place_label, transition_label, &self.net.input)?;
        write_table(f, "Output matrix H (T x P):", transition_label, place_label, &self.net.output)?;
        write_table(
            f,
            "Incidence matrix C = H^T - F:",
            place_label,
            transition_label,
            &self.net.incidence,
        )?;
        writeln!(f, "Initial marking M0: {}", self.net.initial_marking)?;
        writeln!(
            f,
            "Enabled at M0: {}",
            transition_list(&self.net.enabled_at_initial)
        )?;

        if let Some(analysis) = &self.invariants {
            writeln!(f)?;
            let integer = self.integer_invariants.as_ref();
            write_family(
                f,
                InvariantKind::Place,
                analysis,
                &analysis.p_invariants,
                integer.map(|i| &i.place),
            )?;
            write_family(
                f,
                InvariantKind::Transition,
                analysis,
                &analysis.t_invariants,
                integer.map(|i| &i.transition),
            )?;
        }

        if let Some(graph) = &self.coverability {
            writeln!(f, "\nCoverability graph:")?;
            write!(f, "{graph}")?;
            writeln!(
                f,
                "{} marking(s), {} edge(s), {}",
                graph.nodes.len(),
                graph.edges.len(),
                if graph.exhausted() {
                    "step budget exhausted"
                } else {
                    "converged"
                }
            )?;
        }

        if let Some(properties) = &self.properties {
            writeln!(f, "\nProperties:")?;
            writeln!(f, "  bounded: {}", properties.bounded)?;
            if !properties.unbounded_places.is_empty() {
                writeln!(
                    f,
                    "  unbounded places: {}",
                    properties.unbounded_places.iter().map(|p| p.label()).join(", ")
                )?;
            }
            writeln!(f, "  safe: {}", properties.safe)?;
            writeln!(f, "  max tokens: {}", properties.max_tokens)?;
            writeln!(
                f,
                "  deadlocks: {}",
                if properties.deadlocks.is_empty() {
                    "none".to_string()
                } else {
                    properties.deadlocks.iter().map(|n| format!("M{n}")).join(", ")
                }
            )?;
            writeln!(
                f,
                "  reachable transitions: {}",
                transition_list(&properties.reachable_transitions)
            )?;
            writeln!(
                f,
                "  unreachable transitions: {}",
                transition_list(&properties.unreachable_transitions)
            )?;
            let liveness = match &properties.liveness {
                Liveness::NotLive { .. } => "not live".to_string(),
                Liveness::NecessaryConditionMet => {
                    "necessary condition met (every transition fires)".to_string()
                }
                Liveness::Inconclusive { unreachable } => format!(
                    "inconclusive ({} not seen before the step budget ran out)",
                    transition_list(unreachable)
                ),
            };
            writeln!(f, "  liveness: {liveness}")?;
        }

        if let Some(simulation) = &self.simulation {
            writeln!(f, "\nSimulation:")?;
            writeln!(f, "{simulation}")?;
        }

        if !self.diagnostics.is_empty() {
            writeln!(f, "\nDiagnostics:")?;
            for diagnostic in &self.diagnostics {
                writeln!(f, "  - {diagnostic}")?;
            }
        }

        Ok(())
    }
}

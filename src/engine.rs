//! 分析引擎：持有一个已校验的网与分析配置，对外提供全部分析操作。
//!
//! 引擎本身不可变；每次分析各自拥有工作表与结果，调用之间互不影响。

use std::time::Instant;

use rand::Rng;

use crate::analysis::coverability::{CoverabilityExplorer, CoverabilityGraph};
use crate::analysis::invariants::{InvariantAnalysis, InvariantAnalyzer};
use crate::analysis::properties::{self, Classification};
use crate::analysis::simulation::{Simulation, Simulator};
use crate::config::AnalysisConfig;
use crate::net::core::{FireError, Net, ValidationError};
use crate::net::ids::TransitionId;
use crate::net::structure::Marking;
use crate::report::AnalysisReport;

#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    net: Net,
    config: AnalysisConfig,
}

impl AnalysisEngine {
    pub fn new(net: Net, config: AnalysisConfig) -> Self {
        Self { net, config }
    }

    pub fn from_matrices(
        f: &[Vec<i64>],
        h: &[Vec<i64>],
        m0: &[i64],
        config: AnalysisConfig,
    ) -> Result<Self, ValidationError> {
        Ok(Self::new(Net::from_matrices(f, h, m0)?, config))
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn enabled_transitions(&self, marking: &Marking) -> Vec<TransitionId> {
        self.net.enabled_transitions(marking)
    }

    pub fn fire(&self, marking: &Marking, transition: TransitionId) -> Result<Marking, FireError> {
        self.net.fire(marking, transition)
    }

    pub fn analyze_invariants(&self) -> InvariantAnalysis {
        InvariantAnalyzer::new(self.config.invariants()).analyze(&self.net.c_matrix())
    }

    pub fn build_coverability_graph(&self) -> CoverabilityGraph {
        CoverabilityExplorer::new(&self.net, self.config.explorer()).explore()
    }

    pub fn classify(&self, graph: &CoverabilityGraph) -> Classification {
        properties::classify(graph)
    }

    pub fn simulate<R: Rng + ?Sized>(&self, steps: usize, rng: &mut R) -> Result<Simulation, FireError> {
        Simulator::new(&self.net).run(steps, rng)
    }

    /// Runs the invariant analysis and the coverability exploration, then
    /// classifies the graph. The two analyses do not share any state.
    pub fn analyze(&self) -> AnalysisReport {
        let start = Instant::now();
        self.net.log_diagnostics();

        let mut report = AnalysisReport::new(&self.net);
        report.set_invariants(self.analyze_invariants());
        let graph = self.build_coverability_graph();
        report.set_properties(self.classify(&graph));
        report.set_coverability(graph);
        report.analysis_time = start.elapsed();
        report
    }
}

/// Structural invariants of the net given by `f` and `h`.
pub fn analyze_invariants(f: &[Vec<i64>], h: &[Vec<i64>]) -> Result<InvariantAnalysis, ValidationError> {
    let m0 = vec![0; f.len()];
    let engine = AnalysisEngine::from_matrices(f, h, &m0, AnalysisConfig::default())?;
    Ok(engine.analyze_invariants())
}

/// Coverability graph of the net given by `f`, `h` and `m0`, with the
/// default step budget and widening threshold.
pub fn build_coverability_graph(
    f: &[Vec<i64>],
    h: &[Vec<i64>],
    m0: &[i64],
) -> Result<CoverabilityGraph, ValidationError> {
    let engine = AnalysisEngine::from_matrices(f, h, m0, AnalysisConfig::default())?;
    Ok(engine.build_coverability_graph())
}

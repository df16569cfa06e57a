//! # pn-analyzer
//!
//! 位置/迁移 Petri 网分析：
//!
//! * 由关联矩阵 `C = Hᵗ - F` 的零空间求 P-/T-不变量；
//! * 构建带 ω 加宽与步数预算的覆盖图；
//! * 在覆盖图上判定有界性、安全性、死锁与活性的必要条件；
//! * 随机 token 博弈模拟。
//!
//! ```rust
//! use pn_analyzer::{AnalysisConfig, AnalysisEngine};
//!
//! // p0 -> t0 -> p1 -> t1 -> p0
//! let f = vec![vec![1, 0], vec![0, 1]];
//! let h = vec![vec![0, 1], vec![1, 0]];
//! let engine = AnalysisEngine::from_matrices(&f, &h, &[1, 0], AnalysisConfig::default()).unwrap();
//!
//! let report = engine.analyze();
//! let properties = report.properties.as_ref().unwrap();
//! assert!(properties.is_bounded());
//! assert!(properties.is_safe());
//! ```

pub mod analysis;
pub mod config;
pub mod engine;
pub mod net;
pub mod options;
pub mod report;

pub use analysis::{Classification, CoverabilityGraph, InvariantAnalysis, Verdict};
pub use config::AnalysisConfig;
pub use engine::{AnalysisEngine, analyze_invariants, build_coverability_graph};
pub use net::{Marking, Net, Tokens};
pub use report::AnalysisReport;

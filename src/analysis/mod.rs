//! # Petri 网分析
//!
//! * [`invariants`]：由关联矩阵的零空间求 P-/T-不变量；
//! * [`coverability`]：带 ω 加宽与步数预算的覆盖图；
//! * [`properties`]：在覆盖图上判定有界、安全、死锁与迁移可达；
//! * [`simulation`]：随机 token 博弈。
//!
//! 不变量分析只依赖网结构，覆盖图分析只依赖网与初始标识，两者互不影响。

pub mod coverability;
pub mod invariants;
pub mod properties;
pub mod simulation;

pub use coverability::{
    CoverabilityExplorer, CoverabilityGraph, CoverabilityNode, ExplorerConfig, NodeStatus,
    Termination, TreeEdge,
};
pub use invariants::{
    Coverage, Invariant, InvariantAnalysis, InvariantAnalyzer, InvariantConfig, InvariantKind,
    NumericalFailure,
};
pub use properties::{Classification, Liveness, Verdict, classify};
pub use simulation::{Simulation, SimulationEvent, Simulator};

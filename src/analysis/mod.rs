//! Analysis passes for polyhedral optimization.

pub mod dependence;

pub use dependence::{
    compute_dependences, Dependence, DependenceAnalysis, DependenceKind, DependenceRelation,
    DependenceSet, DependenceSummary, Direction, DistanceBound,
};

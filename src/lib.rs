//! # PolySched - Polyhedral Dependence and Scheduling Engine
//!
//! An exact polyhedral core for affine loop regions, including:
//! - Model construction from iteration domains and access relations
//! - Dependence analysis (RAW, WAW, WAR) with last-write filtering
//! - Legality-checked schedule synthesis (tiling, fusion, parallel marking)
//! - Schedule tree construction
//!
//! ## Architecture
//!
//! ```text
//! RegionDescriptor → PolyProgram → DependenceSet → Schedule → ScheduleTree
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use polysched::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let program = RegionDescriptor::new("init_accumulate")
//!     .statement(
//!         StatementDecl::new("S0", "{ S0[i, j] : 0 <= i < 4 and 0 <= j < 4 }")
//!             .write("C", "{ S0[i, j] -> C[i, j] }"),
//!     )
//!     .statement(
//!         StatementDecl::new("S1", "{ S1[i, j] : 0 <= i < 4 and 0 <= j < 4 }")
//!             .read("C", "{ S1[i, j] -> C[i, j] }")
//!             .read("A", "{ S1[i, j] -> A[i, j] }")
//!             .write("C", "{ S1[i, j] -> C[i, j] }"),
//!     )
//!     .build()?;
//!
//! let config = OptimizationConfig { tile_sizes: vec![2, 2], ..Default::default() };
//! let optimized = polysched::optimize(&program, &config)?;
//! println!("{}", optimized.tree);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod polyhedral;
pub mod frontend;
pub mod ir;
pub mod analysis;
pub mod transform;
pub mod tree;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::analysis::{
        compute_dependences, Dependence, DependenceAnalysis, DependenceKind, DependenceSet,
        DependenceSummary, Direction, DistanceBound,
    };
    pub use crate::ir::pir::*;
    pub use crate::polyhedral::{AffineExpr, AffineMap, Constraint, IntegerSet, QuasiAffine, Space, UnionSet};
    pub use crate::transform::{
        is_legal, synthesize, DefaultPolicy, DimRole, Fusion, Schedule, Scheduler, SearchPolicy,
        Tiling, Transform,
    };
    pub use crate::tree::{build as build_tree, BandNode, ScheduleNode, ScheduleTree};
    pub use crate::utils::errors::*;
    pub use crate::{optimize, optimize_region, OptimizationConfig, OptimizedRegion};
}

use anyhow::{Context, Result};
use log::info;
use serde::{Serialize, Deserialize};

/// Configuration for the optimization pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Enable loop tiling
    pub enable_tiling: bool,
    /// Tile sizes (if tiling enabled), outermost band dimension first
    pub tile_sizes: Vec<i64>,
    /// Enable loop fusion
    pub enable_fusion: bool,
    /// Mark parallel band dimensions
    pub mark_parallel: bool,
    /// Bound on candidate transformations tried per region
    pub max_attempts: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            enable_tiling: true,
            tile_sizes: vec![32, 32, 32],
            enable_fusion: true,
            mark_parallel: true,
            max_attempts: transform::scheduler::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Result of optimizing one region.
#[derive(Debug, Clone)]
pub struct OptimizedRegion {
    /// Dependences of the original program
    pub dependences: analysis::DependenceSet,
    /// The synthesized, legality-checked schedule
    pub schedule: transform::Schedule,
    /// The schedule in tree form
    pub tree: tree::ScheduleTree,
}

impl OptimizedRegion {
    /// Per-dependence records for the lowering stage.
    pub fn summaries(&self) -> Vec<analysis::DependenceSummary> {
        self.dependences.summaries()
    }

    /// Human-readable report of the program, its dependences, the schedule
    /// and the tree.
    pub fn report(&self, program: &ir::PolyProgram) -> String {
        let mut printer = utils::PolyPrinter::new();
        printer.print_program(program);
        printer.print_dependences(&self.dependences);
        let mut out = utils::pretty::CodeFormatter::default_indent();
        out.write(&printer.take_output());
        out.section("Schedule:", |f| f.writeln(self.schedule.to_string().trim_end()));
        out.section("Tree:", |f| f.writeln(&self.tree.to_string()));
        out.finish()
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the full pipeline on a built program: dependences, schedule, tree.
pub fn optimize(program: &ir::PolyProgram, config: &OptimizationConfig) -> Result<OptimizedRegion> {
    info!("optimizing {}", program.name);
    let dependences = analysis::compute_dependences(program).context("dependence analysis")?;
    info!("{}: {} dependences", program.name, dependences.len());
    let schedule = transform::Scheduler::from_config(config).schedule(program, &dependences, None);
    let tree = tree::build(&schedule, program).context("schedule tree construction")?;
    info!("{}: tree with {} bands", program.name, tree.bands().len());
    Ok(OptimizedRegion { dependences, schedule, tree })
}

/// Build the program of a region descriptor, then optimize it.
pub fn optimize_region(
    descriptor: &ir::RegionDescriptor,
    config: &OptimizationConfig,
) -> Result<(ir::PolyProgram, OptimizedRegion)> {
    let program = descriptor.build().context("model construction")?;
    let optimized = optimize(&program, config)?;
    Ok((program, optimized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = OptimizationConfig::default();
        assert!(config.enable_tiling);
        assert_eq!(config.tile_sizes, vec![32, 32, 32]);
        assert_eq!(config.max_attempts, transform::scheduler::DEFAULT_MAX_ATTEMPTS);
    }
}

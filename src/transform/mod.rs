//! Schedule transformations for polyhedral optimization.
//!
//! Transformations rewrite a [`Schedule`] and never touch the program or its
//! dependences. Every candidate is validated against the original
//! dependence set before it replaces the current schedule.

pub mod schedule;
pub mod legality;
pub mod tiling;
pub mod fusion;
pub mod scheduler;

pub use fusion::Fusion;
pub use legality::{is_legal, violations, Violation};
pub use schedule::{BandMark, DimRole, Layout, Schedule, SplitMark, StmtSchedule};
pub use scheduler::{synthesize, DefaultPolicy, Scheduler, SearchPolicy};
pub use tiling::Tiling;

use crate::analysis::DependenceSet;
use std::fmt::Debug;

/// Schedule transformation trait.
pub trait Transform: Debug {
    /// Apply the transformation, or `None` when it does not fit the schedule.
    fn apply(&self, schedule: &Schedule) -> Option<Schedule>;

    /// Check a transformed schedule against the dependences.
    fn is_legal(&self, transformed: &Schedule, deps: &DependenceSet) -> bool {
        legality::is_legal(transformed, deps)
    }

    /// Get transformation name.
    fn name(&self) -> &str;

    /// One-line description including the transformation's arguments.
    fn describe(&self) -> String {
        self.name().to_string()
    }
}

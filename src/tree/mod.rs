//! Schedule trees.
//!
//! A flat [`Schedule`](crate::transform::Schedule) is turned into the nested
//! form consumed by the lowering stage: bands with parallel flags, ordered
//! or unordered groups of statements, and one leaf per statement.

pub mod node;
pub mod builder;

pub use builder::build;
pub use node::{BandMember, BandNode, ScheduleNode, ScheduleTree, StatementDomain};

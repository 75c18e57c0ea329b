//! Polyhedral model of an affine region.
//!
//! The model is built once from a [`RegionDescriptor`] and then read by the
//! dependence analysis, the scheduler and the tree builder.

pub mod pir;

pub use pir::*;

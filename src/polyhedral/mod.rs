//! Polyhedral data structures and operations.
//!
//! This module provides the mathematical foundation of the engine:
//! - Affine and quasi-affine expressions, constraints
//! - Integer sets (polyhedra) and finite unions of them
//! - Affine maps (access functions)
//! - The exact integer solver and the operations built on it

pub mod space;
pub mod expr;
pub mod constraint;
pub mod set;
pub mod map;
pub mod omega;
pub mod operations;

pub use space::Space;
pub use expr::{AffineExpr, QuasiAffine};
pub use constraint::{Constraint, ConstraintKind, ConstraintSystem};
pub use set::{IntegerSet, UnionSet};
pub use map::AffineMap;
pub use omega::{Extremum, LinearSystem, Stride};

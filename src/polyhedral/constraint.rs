//! Linear constraints for polyhedral representation.
//!
//! A constraint is a linear inequality, an equality or a congruence:
//! - Inequality: expr >= 0
//! - Equality: expr = 0
//! - Stride: expr = 0 (mod m)

use crate::polyhedral::expr::AffineExpr;
use num_integer::Integer;
use serde::{Serialize, Deserialize};
use std::fmt;

/// A linear constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    /// The affine expression (constraint is: expr >= 0 or expr = 0)
    pub expr: AffineExpr,
    /// Kind of constraint
    pub kind: ConstraintKind,
}

/// Kind of constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Greater than or equal: expr >= 0
    Inequality,
    /// Equal: expr = 0
    Equality,
    /// Multiple of a positive modulus: expr = 0 (mod m)
    Stride(i64),
}

impl Constraint {
    /// Create a new constraint.
    pub fn new(expr: AffineExpr, kind: ConstraintKind) -> Self {
        Self { expr, kind }
    }

    /// Create an inequality constraint: expr >= 0
    pub fn ge_zero(expr: AffineExpr) -> Self {
        Self::new(expr, ConstraintKind::Inequality)
    }

    /// Create an equality constraint: expr = 0
    pub fn eq_zero(expr: AffineExpr) -> Self {
        Self::new(expr, ConstraintKind::Equality)
    }

    /// Create a congruence: expr is a multiple of `modulus`
    pub fn stride(expr: AffineExpr, modulus: i64) -> Self {
        Self::new(expr, ConstraintKind::Stride(modulus.abs()))
    }

    /// Create a constraint: lhs >= rhs
    pub fn ge(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::ge_zero(lhs - rhs)
    }

    /// Create a constraint: lhs <= rhs
    pub fn le(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::ge_zero(rhs - lhs)
    }

    /// Create a constraint: lhs < rhs, i.e. rhs - lhs - 1 >= 0
    pub fn lt(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        let mut expr = rhs - lhs;
        expr.constant -= 1;
        Self::ge_zero(expr)
    }

    /// Create a constraint: lhs = rhs
    pub fn eq(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::eq_zero(lhs - rhs)
    }

    /// Create a lower bound constraint: var >= lower
    pub fn lower_bound(dim: usize, lower: i64, n_dim: usize, n_param: usize) -> Self {
        let mut expr = AffineExpr::var(dim, n_dim, n_param);
        expr.constant = -lower;
        Self::ge_zero(expr)
    }

    /// Create an upper bound constraint: var <= upper
    pub fn upper_bound(dim: usize, upper: i64, n_dim: usize, n_param: usize) -> Self {
        let mut expr = -AffineExpr::var(dim, n_dim, n_param);
        expr.constant = upper;
        Self::ge_zero(expr)
    }

    /// Create a strict upper bound constraint: var < upper
    pub fn strict_upper_bound(dim: usize, upper: i64, n_dim: usize, n_param: usize) -> Self {
        Self::upper_bound(dim, upper - 1, n_dim, n_param)
    }

    /// Check if this is an equality constraint.
    pub fn is_equality(&self) -> bool {
        matches!(self.kind, ConstraintKind::Equality)
    }

    /// Check if this is an inequality constraint.
    pub fn is_inequality(&self) -> bool {
        matches!(self.kind, ConstraintKind::Inequality)
    }

    /// Check if this constraint is satisfied by the given point.
    pub fn is_satisfied(&self, dim_values: &[i64], param_values: &[i64]) -> bool {
        let value = self.expr.evaluate(dim_values, param_values);
        match self.kind {
            ConstraintKind::Inequality => value >= 0,
            ConstraintKind::Equality => value == 0,
            ConstraintKind::Stride(m) => m != 0 && value.mod_floor(&m) == 0,
        }
    }

    /// The integer complement of the constraint, as a disjunction.
    ///
    /// `e >= 0` becomes `-e - 1 >= 0`; `e = 0` becomes `e - 1 >= 0 or -e - 1 >= 0`;
    /// `e = 0 (mod m)` becomes one congruence `e - r = 0 (mod m)` per residue `r > 0`.
    pub fn negate(&self) -> Vec<Constraint> {
        let mut below = -self.expr.clone();
        below.constant -= 1;
        match self.kind {
            ConstraintKind::Inequality => vec![Self::ge_zero(below)],
            ConstraintKind::Equality => {
                let mut above = self.expr.clone();
                above.constant -= 1;
                vec![Self::ge_zero(above), Self::ge_zero(below)]
            }
            ConstraintKind::Stride(m) => (1..m)
                .map(|r| {
                    let mut shifted = self.expr.clone();
                    shifted.constant -= r;
                    Self::stride(shifted, m)
                })
                .collect(),
        }
    }

    /// Re-embed the constraint's dimensions at `offset` in an `n_dim` space.
    pub fn embed(&self, offset: usize, n_dim: usize) -> Self {
        Self::new(self.expr.embed(offset, n_dim), self.kind)
    }

    /// Get the number of dimensions.
    pub fn n_dim(&self) -> usize {
        self.expr.n_dim()
    }

    /// Get the number of parameters.
    pub fn n_param(&self) -> usize {
        self.expr.n_param()
    }

    /// Convert to string with given names.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let expr_str = self.expr.to_string_with_names(dim_names, param_names);
        match self.kind {
            ConstraintKind::Inequality => format!("{} >= 0", expr_str),
            ConstraintKind::Equality => format!("{} = 0", expr_str),
            ConstraintKind::Stride(m) => format!("({}) mod {} = 0", expr_str, m),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[], &[]))
    }
}

/// A conjunction of constraints over a fixed number of dims and params.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSystem {
    /// All constraints in the system
    pub constraints: Vec<Constraint>,
    /// Number of dimensions
    pub n_dim: usize,
    /// Number of parameters
    pub n_param: usize,
}

impl ConstraintSystem {
    /// Create an empty constraint system.
    pub fn new(n_dim: usize, n_param: usize) -> Self {
        Self {
            constraints: Vec::new(),
            n_dim,
            n_param,
        }
    }

    /// Add a constraint, padding its coefficient vectors to the system's shape.
    pub fn add(&mut self, mut constraint: Constraint) {
        constraint.expr.coeffs.resize(self.n_dim, 0);
        constraint.expr.param_coeffs.resize(self.n_param, 0);
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
    }

    /// Get all equality constraints.
    pub fn equalities(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.is_equality())
    }

    /// Get all inequality constraints.
    pub fn inequalities(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.is_inequality())
    }

    /// Check if a point satisfies all constraints.
    pub fn is_satisfied(&self, dim_values: &[i64], param_values: &[i64]) -> bool {
        self.constraints.iter().all(|c| c.is_satisfied(dim_values, param_values))
    }

    /// Check if the system has no constraints.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Get the number of constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let lo = Constraint::lower_bound(0, 0, 2, 0);
        assert!(lo.is_satisfied(&[0, 0], &[]));
        assert!(!lo.is_satisfied(&[-1, 0], &[]));

        let hi = Constraint::upper_bound(0, 10, 2, 0);
        assert!(hi.is_satisfied(&[10, 0], &[]));
        assert!(!hi.is_satisfied(&[11, 0], &[]));
    }

    #[test]
    fn test_negate_inequality() {
        // i >= 3 negates to i <= 2
        let c = Constraint::lower_bound(0, 3, 1, 0);
        let neg = c.negate();
        assert_eq!(neg.len(), 1);
        assert!(neg[0].is_satisfied(&[2], &[]));
        assert!(!neg[0].is_satisfied(&[3], &[]));
    }

    #[test]
    fn test_negate_equality() {
        // i = 5 negates to i >= 6 or i <= 4
        let mut expr = AffineExpr::var(0, 1, 0);
        expr.constant = -5;
        let neg = Constraint::eq_zero(expr).negate();
        assert_eq!(neg.len(), 2);
        assert!(neg[0].is_satisfied(&[6], &[]) && !neg[0].is_satisfied(&[5], &[]));
        assert!(neg[1].is_satisfied(&[4], &[]) && !neg[1].is_satisfied(&[5], &[]));
    }

    #[test]
    fn test_negate_stride() {
        // i = 0 (mod 3) negates to i = 1 or i = 2 (mod 3)
        let c = Constraint::stride(AffineExpr::var(0, 1, 0), 3);
        assert!(c.is_satisfied(&[-3], &[]) && !c.is_satisfied(&[4], &[]));
        let neg = c.negate();
        assert_eq!(neg.len(), 2);
        for i in -4..8 {
            let covered = neg.iter().filter(|n| n.is_satisfied(&[i], &[])).count();
            assert_eq!(covered, usize::from(i % 3 != 0));
        }
        assert_eq!(c.to_string_with_names(&["i".to_string()], &[]), "(i) mod 3 = 0");
    }

    #[test]
    fn test_constraint_system() {
        let mut sys = ConstraintSystem::new(2, 0);
        sys.add(Constraint::lower_bound(0, 0, 2, 0));
        sys.add(Constraint::strict_upper_bound(0, 10, 2, 0));
        sys.add(Constraint::lower_bound(1, 0, 2, 0));
        sys.add(Constraint::strict_upper_bound(1, 10, 2, 0));
        sys.add(Constraint::lower_bound(1, 0, 2, 0));

        assert_eq!(sys.len(), 4);
        assert!(sys.is_satisfied(&[9, 9], &[]));
        assert!(!sys.is_satisfied(&[10, 0], &[]));
    }
}

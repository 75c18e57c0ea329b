//! Integer sets: convex polyhedra and finite unions of them.
//!
//! Iteration domains, dependence relations and violation sets are all
//! represented as sets over an ordered list of variables: the set dimensions
//! followed by the parameters. Congruence constraints add one existential
//! local each, after the parameters.

use crate::polyhedral::space::Space;
use crate::polyhedral::constraint::{Constraint, ConstraintSystem, ConstraintKind};
use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::omega::{LinearSystem, Row, Stride};
use crate::polyhedral::operations;
use serde::{Serialize, Deserialize};
use std::fmt;

/// A convex integer set defined by a conjunction of affine constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerSet {
    /// Dimensions, parameters and names
    pub space: Space,
    /// The conjunction defining the set
    pub constraints: ConstraintSystem,
}

impl IntegerSet {
    /// The empty set over a space.
    pub fn empty(space: Space) -> Self {
        let mut set = Self::universe(space);
        let mut expr = AffineExpr::zero(set.dim(), set.n_param());
        expr.constant = -1;
        set.add_constraint(Constraint::ge_zero(expr));
        set
    }

    /// The unconstrained set over a space.
    pub fn universe(space: Space) -> Self {
        let constraints = ConstraintSystem::new(space.n_dim, space.n_param);
        Self { space, constraints }
    }

    /// A set from a space and a list of constraints.
    pub fn from_constraints(space: Space, constraints: impl IntoIterator<Item = Constraint>) -> Self {
        let mut set = Self::universe(space);
        for c in constraints {
            set.add_constraint(c);
        }
        set
    }

    /// The box `0 <= x_k < bounds[k]`.
    pub fn rectangular(bounds: &[i64]) -> Self {
        let n_dim = bounds.len();
        let mut set = Self::universe(Space::set(n_dim));
        for (i, &bound) in bounds.iter().enumerate() {
            set.add_constraint(Constraint::lower_bound(i, 0, n_dim, 0));
            set.add_constraint(Constraint::strict_upper_bound(i, bound, n_dim, 0));
        }
        set
    }

    /// Number of set dimensions.
    pub fn dim(&self) -> usize { self.space.n_dim }

    /// Number of parameters.
    pub fn n_param(&self) -> usize { self.space.n_param }

    /// Add a constraint.
    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.add(constraint);
    }

    /// Check membership of a concrete point.
    pub fn contains(&self, point: &[i64], params: &[i64]) -> bool {
        self.constraints.is_satisfied(point, params)
    }

    /// Cheap syntactic emptiness check (a violated constant constraint).
    pub fn is_obviously_empty(&self) -> bool {
        self.constraints.constraints.iter().any(|c| match (c.expr.as_constant(), c.kind) {
            (Some(v), ConstraintKind::Inequality) => v < 0,
            (Some(v), ConstraintKind::Equality) => v != 0,
            (Some(v), ConstraintKind::Stride(m)) => m != 0 && v % m != 0,
            _ => false,
        })
    }

    /// Exact emptiness test over the integers.
    ///
    /// Parameters are existentially quantified: the set is empty only if it
    /// has no point for any parameter value.
    pub fn is_empty(&self) -> bool {
        self.is_obviously_empty() || !self.to_system().is_feasible()
    }

    /// Intersection with a set over a compatible space.
    pub fn intersect(&self, other: &IntegerSet) -> IntegerSet {
        let mut result = self.clone();
        for c in &other.constraints.constraints {
            result.add_constraint(c.clone());
        }
        result
    }

    /// Set difference, as a union of disjoint convex pieces.
    pub fn subtract(&self, other: &IntegerSet) -> UnionSet {
        UnionSet::from_pieces(self.space.clone(), operations::subtract(self, other))
    }

    /// The linear system over `dims ++ params`, followed by one local per
    /// congruence.
    pub fn to_system(&self) -> LinearSystem {
        let (mut sys, strides) = self.affine_system();
        for stride in strides {
            sys.add_stride(stride);
        }
        sys
    }

    /// The affine constraints as a system over `dims ++ params`, and the
    /// congruences as rows over the same variables.
    pub fn affine_system(&self) -> (LinearSystem, Vec<Stride>) {
        let (n_dim, n_param) = (self.dim(), self.n_param());
        let mut sys = LinearSystem::new(n_dim + n_param);
        let mut strides = Vec::new();
        for c in &self.constraints.constraints {
            let row = expr_row(&c.expr, n_dim, n_param);
            match c.kind {
                ConstraintKind::Inequality => sys.add_ge(row),
                ConstraintKind::Equality => sys.add_eq(row),
                ConstraintKind::Stride(m) => strides.push(Stride::new(row, m as i128)),
            }
        }
        (sys, strides)
    }

    /// Rebuild a set from a system over `dims ++ params` of `space` and
    /// congruences over the same variables.
    ///
    /// Returns `None` if the system has other variables or a coefficient
    /// does not fit in `i64`.
    pub fn from_system(space: Space, sys: &LinearSystem, strides: &[Stride]) -> Option<IntegerSet> {
        let (n_dim, n_param) = (space.n_dim, space.n_param);
        if sys.n_var() != n_dim + n_param {
            return None;
        }
        let mut set = IntegerSet::universe(space);
        for row in sys.equalities() {
            set.add_constraint(Constraint::eq_zero(row_expr(row, n_dim, n_param)?));
        }
        for row in sys.inequalities() {
            set.add_constraint(Constraint::ge_zero(row_expr(row, n_dim, n_param)?));
        }
        for stride in strides {
            let modulus = i64::try_from(stride.modulus).ok()?;
            set.add_constraint(Constraint::stride(row_expr(&stride.row, n_dim, n_param)?, modulus));
        }
        Some(set)
    }

    /// Normalized form: tightened, deduplicated rows, or the canonical empty set.
    pub fn simplify(&self) -> IntegerSet {
        if self.is_empty() {
            return IntegerSet::empty(self.space.clone());
        }
        let (sys, strides) = self.affine_system();
        match sys.normalized() {
            Some(sys) => IntegerSet::from_system(self.space.clone(), &sys, &strides).unwrap_or_else(|| self.clone()),
            None => IntegerSet::empty(self.space.clone()),
        }
    }

    /// Bind the parameters to concrete values.
    pub fn fix_params(&self, params: &[i64]) -> IntegerSet {
        let mut set = self.clone();
        for (j, &value) in params.iter().enumerate().take(self.n_param()) {
            let mut expr = AffineExpr::param(j, self.dim(), self.n_param());
            expr.constant = -value;
            set.add_constraint(Constraint::eq_zero(expr));
        }
        set
    }

    /// Lexicographic minimum of the dimensions for fixed parameters.
    pub fn lexmin(&self, params: &[i64]) -> Option<Vec<i64>> {
        operations::lexmin(self, params)
    }

    /// All integer points for fixed parameters, in lexicographic order.
    ///
    /// Returns `None` if the set is unbounded or has more than `limit` points.
    pub fn points(&self, params: &[i64], limit: usize) -> Option<Vec<Vec<i64>>> {
        operations::enumerate(self, params, limit)
    }

    /// All dimension names, with defaults.
    pub fn dim_names(&self) -> Vec<String> { self.space.all_dim_names() }

    /// All parameter names, with defaults.
    pub fn param_names(&self) -> Vec<String> { self.space.all_param_names() }

    /// Replace dimension names.
    pub fn with_dim_names(mut self, names: Vec<String>) -> Self {
        self.space = self.space.with_dim_names(names);
        self
    }

    /// Replace parameter names.
    pub fn with_param_names(mut self, names: Vec<String>) -> Self {
        self.space = self.space.with_param_names(names);
        self
    }

    fn fmt_body(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim_names = self.dim_names();
        let param_names = self.param_names();
        write!(
            f,
            "{}[{}]",
            self.space.tuple_name.as_deref().unwrap_or(""),
            dim_names.join(", ")
        )?;
        if !self.constraints.is_empty() {
            let parts: Vec<String> = self
                .constraints
                .constraints
                .iter()
                .map(|c| c.to_string_with_names(&dim_names, &param_names))
                .collect();
            write!(f, " : {}", parts.join(" and "))?;
        }
        Ok(())
    }
}

/// Row over `dims ++ params` for an expression of the given shape.
pub(crate) fn expr_row(expr: &AffineExpr, n_dim: usize, n_param: usize) -> Row {
    let mut row = vec![0i128; 1 + n_dim + n_param];
    row[0] = expr.constant as i128;
    for (k, &c) in expr.coeffs.iter().enumerate().take(n_dim) {
        row[1 + k] = c as i128;
    }
    for (j, &c) in expr.param_coeffs.iter().enumerate().take(n_param) {
        row[1 + n_dim + j] = c as i128;
    }
    row
}

fn row_expr(row: &Row, n_dim: usize, n_param: usize) -> Option<AffineExpr> {
    let narrow = |v: i128| i64::try_from(v).ok();
    let mut expr = AffineExpr::zero(n_dim, n_param);
    expr.constant = narrow(*row.first()?)?;
    for k in 0..n_dim {
        expr.coeffs[k] = narrow(row.get(1 + k).copied().unwrap_or(0))?;
    }
    for j in 0..n_param {
        expr.param_coeffs[j] = narrow(row.get(1 + n_dim + j).copied().unwrap_or(0))?;
    }
    Some(expr)
}

impl fmt::Display for IntegerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.n_param() > 0 {
            write!(f, "[{}] -> ", self.param_names().join(", "))?;
        }
        write!(f, "{{ ")?;
        self.fmt_body(f)?;
        write!(f, " }}")
    }
}

/// A finite union of convex integer sets over one space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionSet {
    /// Shared space of every piece
    pub space: Space,
    pieces: Vec<IntegerSet>,
}

impl UnionSet {
    /// The empty union.
    pub fn empty(space: Space) -> Self {
        Self { space, pieces: Vec::new() }
    }

    /// A union of the given pieces.
    pub fn from_pieces(space: Space, pieces: Vec<IntegerSet>) -> Self {
        Self { space, pieces }
    }

    /// The convex pieces.
    pub fn pieces(&self) -> &[IntegerSet] {
        &self.pieces
    }

    /// Add a piece.
    pub fn push(&mut self, piece: IntegerSet) {
        self.pieces.push(piece);
    }

    /// Number of set dimensions.
    pub fn dim(&self) -> usize { self.space.n_dim }

    /// Number of parameters.
    pub fn n_param(&self) -> usize { self.space.n_param }

    /// Exact emptiness test.
    pub fn is_empty(&self) -> bool {
        self.pieces.iter().all(|p| p.is_empty())
    }

    /// Check membership of a concrete point.
    pub fn contains(&self, point: &[i64], params: &[i64]) -> bool {
        self.pieces.iter().any(|p| p.contains(point, params))
    }

    /// Union with another set over the same space.
    pub fn union(&self, other: &UnionSet) -> UnionSet {
        let mut pieces = self.pieces.clone();
        pieces.extend(other.pieces.iter().cloned());
        UnionSet::from_pieces(self.space.clone(), pieces)
    }

    /// Intersection, piecewise.
    pub fn intersect(&self, other: &UnionSet) -> UnionSet {
        let pieces = self
            .pieces
            .iter()
            .flat_map(|a| other.pieces.iter().map(move |b| a.intersect(b)))
            .filter(|p| !p.is_empty())
            .collect();
        UnionSet::from_pieces(self.space.clone(), pieces)
    }

    /// Intersection of every piece with one convex set.
    pub fn intersect_set(&self, other: &IntegerSet) -> UnionSet {
        self.intersect(&UnionSet::from(other.clone()))
    }

    /// Set difference.
    pub fn subtract(&self, other: &UnionSet) -> UnionSet {
        let mut current: Vec<IntegerSet> = self.pieces.clone();
        for b in &other.pieces {
            current = current
                .iter()
                .flat_map(|a| operations::subtract(a, b))
                .collect();
        }
        UnionSet::from_pieces(self.space.clone(), current)
    }

    /// Exact inclusion test.
    pub fn is_subset(&self, other: &UnionSet) -> bool {
        self.subtract(other).is_empty()
    }

    /// Exact equality of point sets.
    pub fn is_equal(&self, other: &UnionSet) -> bool {
        self.is_subset(other) && other.is_subset(self)
    }

    /// Drop empty pieces and normalize the rest.
    pub fn simplify(&self) -> UnionSet {
        let pieces = self
            .pieces
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.simplify())
            .collect();
        UnionSet::from_pieces(self.space.clone(), pieces)
    }

    /// Bind the parameters to concrete values.
    pub fn fix_params(&self, params: &[i64]) -> UnionSet {
        let pieces = self.pieces.iter().map(|p| p.fix_params(params)).collect();
        UnionSet::from_pieces(self.space.clone(), pieces)
    }

    /// All distinct integer points for fixed parameters, in lexicographic order.
    pub fn points(&self, params: &[i64], limit: usize) -> Option<Vec<Vec<i64>>> {
        let mut all = std::collections::BTreeSet::new();
        for piece in &self.pieces {
            all.extend(piece.points(params, limit)?);
            if all.len() > limit {
                return None;
            }
        }
        Some(all.into_iter().collect())
    }
}

impl From<IntegerSet> for UnionSet {
    fn from(set: IntegerSet) -> Self {
        UnionSet {
            space: set.space.clone(),
            pieces: vec![set],
        }
    }
}

impl fmt::Display for UnionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.n_param() > 0 {
            write!(f, "[{}] -> ", self.space.all_param_names().join(", "))?;
        }
        if self.pieces.is_empty() {
            return write!(f, "{{  }}");
        }
        write!(f, "{{ ")?;
        for (i, piece) in self.pieces.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            piece.fmt_body(f)?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(lo: i64, hi: i64) -> IntegerSet {
        let mut s = IntegerSet::universe(Space::set(1));
        s.add_constraint(Constraint::lower_bound(0, lo, 1, 0));
        s.add_constraint(Constraint::upper_bound(0, hi, 1, 0));
        s
    }

    #[test]
    fn test_rectangular() {
        let set = IntegerSet::rectangular(&[10, 20]);
        assert!(set.contains(&[0, 0], &[]));
        assert!(set.contains(&[9, 19], &[]));
        assert!(!set.contains(&[10, 0], &[]));
        assert!(!set.is_empty());
    }

    #[test]
    fn test_exact_emptiness() {
        let mut s = IntegerSet::universe(Space::set(1));
        // 2i = 1
        let mut e = AffineExpr::var(0, 1, 0).scale(2);
        e.constant = -1;
        s.add_constraint(Constraint::eq_zero(e));
        assert!(!s.is_obviously_empty());
        assert!(s.is_empty());
    }

    #[test]
    fn test_subtract_interval() {
        let diff = interval(0, 9).subtract(&interval(3, 5));
        let pts = UnionSet::from(interval(0, 9)).subtract(&UnionSet::from(interval(3, 5)));
        assert_eq!(diff.points(&[], 100), pts.points(&[], 100));
        let pts = diff.points(&[], 100).unwrap();
        assert_eq!(pts, vec![vec![0], vec![1], vec![2], vec![6], vec![7], vec![8], vec![9]]);
    }

    #[test]
    fn test_union_subset_and_equality() {
        let a = UnionSet::from(interval(0, 4)).union(&UnionSet::from(interval(5, 9)));
        let b = UnionSet::from(interval(0, 9));
        assert!(a.is_subset(&b));
        assert!(a.is_equal(&b));
        assert!(!UnionSet::from(interval(0, 10)).is_subset(&b));
    }

    #[test]
    fn test_stride_set() {
        // even points of 0..=9, and their complement
        let mut even = interval(0, 9);
        even.add_constraint(Constraint::stride(AffineExpr::var(0, 1, 0), 2));
        assert!(even.contains(&[4], &[]) && !even.contains(&[5], &[]));
        assert_eq!(even.points(&[], 100).unwrap().len(), 5);
        assert_eq!(even.simplify().points(&[], 100), even.points(&[], 100));

        let odd = interval(0, 9).subtract(&even);
        let pts = odd.points(&[], 100).unwrap();
        assert_eq!(pts, vec![vec![1], vec![3], vec![5], vec![7], vec![9]]);

        let mut none = interval(0, 0);
        let mut shifted = AffineExpr::var(0, 1, 0);
        shifted.constant = 1;
        none.add_constraint(Constraint::stride(shifted, 2));
        assert!(none.is_empty());
    }

    #[test]
    fn test_parametric_display() {
        let space = Space::set_with_params(1, 1)
            .with_tuple_name("S")
            .with_dim_names(vec!["i".to_string()])
            .with_param_names(vec!["N".to_string()]);
        let mut s = IntegerSet::universe(space);
        s.add_constraint(Constraint::lower_bound(0, 0, 1, 1));
        assert_eq!(s.to_string(), "[N] -> { S[i] : i >= 0 }");
    }
}

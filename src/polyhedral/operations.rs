//! Polyhedral operations: subtraction, projection, lexicographic order,
//! lexicographic minimum and point enumeration.
//!
//! Everything here is exact. A projection that leaves a stride keeps it as
//! a congruence constraint.

use crate::polyhedral::constraint::Constraint;
use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::set::{IntegerSet, UnionSet};
use crate::polyhedral::space::Space;
use crate::polyhedral::omega::{Extremum, LinearSystem, Row};

/// `a \ b` as a list of pairwise disjoint convex pieces.
///
/// With `b = c1 and ... and cn`, piece `i` is `a and c1 .. c(i-1) and not ci`.
pub fn subtract(a: &IntegerSet, b: &IntegerSet) -> Vec<IntegerSet> {
    let mut pieces = Vec::new();
    if a.is_empty() {
        return pieces;
    }
    let mut prefix = a.clone();
    for c in &b.constraints.constraints {
        for negated in c.negate() {
            let mut piece = prefix.clone();
            piece.add_constraint(negated);
            if !piece.is_empty() {
                pieces.push(piece);
            }
        }
        prefix.add_constraint(c.clone());
        if prefix.is_empty() {
            break;
        }
    }
    pieces
}

/// Exact projection of set dimensions `first .. first + n` onto the rest.
pub fn project_out(set: &IntegerSet, first: usize, n: usize) -> UnionSet {
    let vars: Vec<usize> = (first..first + n).filter(|&v| v < set.dim()).collect();
    let names: Vec<String> = set
        .dim_names()
        .into_iter()
        .enumerate()
        .filter(|(k, _)| !vars.contains(k))
        .map(|(_, name)| name)
        .collect();
    let space = Space::set_with_params(set.dim() - vars.len(), set.n_param())
        .with_dim_names(names)
        .with_param_names(set.space.param_names.clone());
    let (sys, strides) = set.affine_system();
    let mut projected = UnionSet::empty(space.clone());
    for (piece, kept) in sys.project_exact(&vars, &strides) {
        // a piece whose coefficients overflow `i64` is dropped
        if let Some(piece) = IntegerSet::from_system(space.clone(), &piece, &kept) {
            projected.push(piece);
        }
    }
    projected
}

/// Lexicographic minimum of the dimensions of `set` for fixed parameters.
pub fn lexmin(set: &IntegerSet, params: &[i64]) -> Option<Vec<i64>> {
    let sys = set.fix_params(params).to_system();
    let point = sys.lexmin()?;
    point.into_iter().take(set.dim()).map(|v| i64::try_from(v).ok()).collect()
}

/// Lexicographic maximum of the dimensions of `set` for fixed parameters.
pub fn lexmax(set: &IntegerSet, params: &[i64]) -> Option<Vec<i64>> {
    let mut sys = set.fix_params(params).to_system();
    let mut point = Vec::with_capacity(set.dim());
    for k in 0..set.dim() {
        let mut objective = sys.zero_row();
        objective[k + 1] = 1;
        let Extremum::Value(x) = sys.maximum(&objective) else { return None };
        let mut fix = sys.zero_row();
        fix[0] = -x;
        fix[k + 1] = 1;
        sys.add_eq(fix);
        point.push(i64::try_from(x).ok()?);
    }
    Some(point)
}

/// Enumerate the points of `set` for fixed parameters in lexicographic order.
///
/// Returns `None` if some coordinate is unbounded or there are more than
/// `limit` points.
pub fn enumerate(set: &IntegerSet, params: &[i64], limit: usize) -> Option<Vec<Vec<i64>>> {
    let sys = set.fix_params(params).to_system();
    let mut out = Vec::new();
    let mut prefix = Vec::with_capacity(set.dim());
    if walk(&sys, 0, set.dim(), &mut prefix, &mut out, limit) {
        Some(out)
    } else {
        None
    }
}

fn walk(
    sys: &LinearSystem,
    k: usize,
    n_dim: usize,
    prefix: &mut Vec<i64>,
    out: &mut Vec<Vec<i64>>,
    limit: usize,
) -> bool {
    if k == n_dim {
        if !sys.is_feasible() {
            return true;
        }
        out.push(prefix.clone());
        return out.len() <= limit;
    }
    let mut objective = sys.zero_row();
    objective[k + 1] = 1;
    let (lo, hi) = match (sys.minimum(&objective), sys.maximum(&objective)) {
        (Extremum::Empty, _) | (_, Extremum::Empty) => return true,
        (Extremum::Value(lo), Extremum::Value(hi)) => (lo, hi),
        _ => return false,
    };
    for v in lo..=hi {
        let Ok(value) = i64::try_from(v) else { return false };
        let mut fixed = sys.clone();
        let mut fix = fixed.zero_row();
        fix[0] = -v;
        fix[k + 1] = 1;
        fixed.add_eq(fix);
        prefix.push(value);
        let ok = walk(&fixed, k + 1, n_dim, prefix, out, limit);
        prefix.pop();
        if !ok {
            return false;
        }
    }
    true
}

/// `a - b`, zero-padding the shorter row.
pub fn row_sub(a: &Row, b: &Row) -> Row {
    (0..a.len().max(b.len()))
        .map(|i| a.get(i).copied().unwrap_or(0) - b.get(i).copied().unwrap_or(0))
        .collect()
}

/// Pieces of `base` on which the vector `lhs` strictly precedes `rhs`,
/// tagged with the first differing position.
///
/// Positions where both sides are the same constant are skipped, and a
/// constant difference decides the order without a constraint.
pub fn lex_precedes(base: &IntegerSet, lhs: &[AffineExpr], rhs: &[AffineExpr]) -> Vec<(usize, IntegerSet)> {
    let mut pieces = Vec::new();
    let mut prefix = base.clone();
    for (p, (a, b)) in lhs.iter().zip(rhs).enumerate() {
        match (b.clone() - a.clone()).as_constant() {
            Some(d) if d > 0 => {
                pieces.push((p, prefix));
                return pieces;
            }
            Some(d) if d < 0 => return pieces,
            Some(_) => continue,
            None => {
                let mut piece = prefix.clone();
                piece.add_constraint(Constraint::lt(a.clone(), b.clone()));
                pieces.push((p, piece));
                prefix.add_constraint(Constraint::eq(a.clone(), b.clone()));
            }
        }
    }
    pieces
}

/// Row for `expr` in a system of `n_var` variables, with the expression's
/// dimensions starting at `dim_offset` and its parameters at `param_offset`.
pub fn place_expr(expr: &AffineExpr, dim_offset: usize, param_offset: usize, n_var: usize) -> Row {
    let mut row = vec![0i128; n_var + 1];
    row[0] = expr.constant as i128;
    for (k, &c) in expr.coeffs.iter().enumerate() {
        if let Some(slot) = row.get_mut(1 + dim_offset + k) {
            *slot += c as i128;
        }
    }
    for (j, &c) in expr.param_coeffs.iter().enumerate() {
        if let Some(slot) = row.get_mut(1 + param_offset + j) {
            *slot += c as i128;
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> IntegerSet {
        // { [i, j] : 0 <= i < N and 0 <= j <= i }
        let mut s = IntegerSet::universe(Space::set_with_params(2, 1));
        s.add_constraint(Constraint::lower_bound(0, 0, 2, 1));
        s.add_constraint(Constraint::lt(AffineExpr::var(0, 2, 1), AffineExpr::param(0, 2, 1)));
        s.add_constraint(Constraint::lower_bound(1, 0, 2, 1));
        s.add_constraint(Constraint::le(AffineExpr::var(1, 2, 1), AffineExpr::var(0, 2, 1)));
        s
    }

    #[test]
    fn test_enumerate_triangle() {
        let pts = enumerate(&triangle(), &[3], 100).unwrap();
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[0], vec![0, 0]);
        assert_eq!(pts[5], vec![2, 2]);
        assert!(enumerate(&triangle(), &[100], 10).is_none());
    }

    #[test]
    fn test_lexmin_lexmax() {
        assert_eq!(lexmin(&triangle(), &[5]), Some(vec![0, 0]));
        assert_eq!(lexmax(&triangle(), &[5]), Some(vec![4, 4]));
        assert_eq!(lexmin(&triangle(), &[0]), None);
    }

    #[test]
    fn test_project_out_inner() {
        let p = project_out(&triangle(), 1, 1);
        assert_eq!(p.dim(), 1);
        assert_eq!(p.pieces().len(), 1);
        assert!(p.contains(&[0], &[3]) && p.contains(&[2], &[3]));
        assert!(!p.contains(&[3], &[3]));
    }

    #[test]
    fn test_project_out_strided_image() {
        // { [i, x] : 0 <= i < 5 and x = 2i + 1 } onto x
        let mut s = IntegerSet::rectangular(&[5, 100]);
        let mut image = AffineExpr::var(0, 2, 0).scale(2);
        image.constant = 1;
        s.add_constraint(Constraint::eq(AffineExpr::var(1, 2, 0), image));
        let p = project_out(&s, 0, 1);
        let pts: Vec<i64> = p.points(&[], 100).unwrap().into_iter().map(|v| v[0]).collect();
        assert_eq!(pts, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_subtract_is_disjoint_cover() {
        let a = IntegerSet::rectangular(&[4, 4]);
        let b = IntegerSet::rectangular(&[2, 2]);
        let pieces = subtract(&a, &b);
        let mut seen = std::collections::BTreeSet::new();
        for piece in &pieces {
            for p in enumerate(piece, &[], 100).unwrap() {
                assert!(seen.insert(p), "pieces overlap");
            }
        }
        assert_eq!(seen.len(), 12);
    }

    #[test]
    fn test_lex_precedes_constant_positions() {
        // (0, i, 0) before (0, j, 1) over [i, j]
        let base = IntegerSet::rectangular(&[3, 3]);
        let lhs = vec![AffineExpr::constant(0, 2, 0), AffineExpr::var(0, 2, 0), AffineExpr::constant(0, 2, 0)];
        let rhs = vec![AffineExpr::constant(0, 2, 0), AffineExpr::var(1, 2, 0), AffineExpr::constant(1, 2, 0)];
        let pieces = lex_precedes(&base, &lhs, &rhs);
        let levels: Vec<usize> = pieces.iter().map(|(p, _)| *p).collect();
        assert_eq!(levels, vec![1, 2]);
        assert_eq!(enumerate(&pieces[0].1, &[], 100).unwrap().len(), 3);
        assert_eq!(enumerate(&pieces[1].1, &[], 100).unwrap().len(), 3);
    }

    #[test]
    fn test_place_expr() {
        let mut e = AffineExpr::var(1, 2, 1) + AffineExpr::param(0, 2, 1);
        e.constant = 4;
        assert_eq!(place_expr(&e, 3, 0, 5), vec![4, 1, 0, 0, 0, 1]);
    }
}

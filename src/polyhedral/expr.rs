//! Affine and quasi-affine expressions.
//!
//! An affine expression is a linear combination of dimensions and parameters
//! plus a constant: `aff(x, p) = c0 + c1*x1 + ... + cn*xn + d1*p1 + ...`.
//!
//! Schedules additionally need `floor(e / T)` and `e mod T` for tiling, which
//! [`QuasiAffine`] provides on top of [`AffineExpr`].

use num_integer::Integer;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::{Add, Sub, Neg};

/// An affine expression: constant + sum(coeff[i] * dim[i]) + sum(param_coeff[j] * param[j])
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AffineExpr {
    /// Constant term
    pub constant: i64,
    /// Coefficients for each dimension (index = dimension index)
    pub coeffs: Vec<i64>,
    /// Coefficients for parameters (index = parameter index)
    pub param_coeffs: Vec<i64>,
}

impl AffineExpr {
    /// Create a zero expression.
    pub fn zero(n_dim: usize, n_param: usize) -> Self {
        Self::constant(0, n_dim, n_param)
    }

    /// Create a constant expression.
    pub fn constant(value: i64, n_dim: usize, n_param: usize) -> Self {
        Self {
            constant: value,
            coeffs: vec![0; n_dim],
            param_coeffs: vec![0; n_param],
        }
    }

    /// Create an expression for a single dimension variable.
    pub fn var(dim: usize, n_dim: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_dim, n_param);
        expr.set_coeff(dim, 1);
        expr
    }

    /// Create an expression for a parameter.
    pub fn param(param_idx: usize, n_dim: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_dim, n_param);
        expr.set_param_coeff(param_idx, 1);
        expr
    }

    /// Check if this is a constant expression.
    pub fn is_constant(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0) && self.param_coeffs.iter().all(|&c| c == 0)
    }

    /// Get the constant value if this is a constant expression.
    pub fn as_constant(&self) -> Option<i64> {
        if self.is_constant() { Some(self.constant) } else { None }
    }

    /// True if no dimension has a non-zero coefficient.
    pub fn is_dim_free(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0)
    }

    /// Get the number of dimensions.
    pub fn n_dim(&self) -> usize {
        self.coeffs.len()
    }

    /// Get the number of parameters.
    pub fn n_param(&self) -> usize {
        self.param_coeffs.len()
    }

    /// Get coefficient for a dimension.
    pub fn coeff(&self, dim: usize) -> i64 {
        self.coeffs.get(dim).copied().unwrap_or(0)
    }

    /// Get coefficient for a parameter.
    pub fn param_coeff(&self, idx: usize) -> i64 {
        self.param_coeffs.get(idx).copied().unwrap_or(0)
    }

    /// Set coefficient for a dimension.
    pub fn set_coeff(&mut self, dim: usize, value: i64) {
        if let Some(c) = self.coeffs.get_mut(dim) {
            *c = value;
        }
    }

    /// Set coefficient for a parameter.
    pub fn set_param_coeff(&mut self, idx: usize, value: i64) {
        if let Some(c) = self.param_coeffs.get_mut(idx) {
            *c = value;
        }
    }

    /// Evaluate the expression given concrete values.
    pub fn evaluate(&self, dim_values: &[i64], param_values: &[i64]) -> i64 {
        let dims = self.coeffs.iter().zip(dim_values).map(|(&c, &v)| c * v);
        let params = self.param_coeffs.iter().zip(param_values).map(|(&c, &v)| c * v);
        self.constant + dims.sum::<i64>() + params.sum::<i64>()
    }

    /// Scale the expression by a constant.
    pub fn scale(&self, factor: i64) -> Self {
        Self {
            constant: self.constant * factor,
            coeffs: self.coeffs.iter().map(|&c| c * factor).collect(),
            param_coeffs: self.param_coeffs.iter().map(|&c| c * factor).collect(),
        }
    }

    /// Scale by a constant; `None` on `i64` overflow.
    pub fn checked_scale(&self, factor: i64) -> Option<Self> {
        let scale = |c: &i64| c.checked_mul(factor);
        Some(Self {
            constant: self.constant.checked_mul(factor)?,
            coeffs: self.coeffs.iter().map(scale).collect::<Option<_>>()?,
            param_coeffs: self.param_coeffs.iter().map(scale).collect::<Option<_>>()?,
        })
    }

    /// Sum of two expressions; `None` on `i64` overflow.
    pub fn checked_add(&self, other: &AffineExpr) -> Option<Self> {
        Some(Self {
            constant: self.constant.checked_add(other.constant)?,
            coeffs: checked_zip(&self.coeffs, &other.coeffs)?,
            param_coeffs: checked_zip(&self.param_coeffs, &other.param_coeffs)?,
        })
    }

    /// Difference of two expressions; `None` on `i64` overflow.
    pub fn checked_sub(&self, other: &AffineExpr) -> Option<Self> {
        self.checked_add(&other.checked_scale(-1)?)
    }

    /// Re-embed the expression in a space with `n_dim` dimensions, moving
    /// dimension `k` to `k + offset`.
    pub fn embed(&self, offset: usize, n_dim: usize) -> Self {
        let mut coeffs = vec![0; n_dim];
        for (k, &c) in self.coeffs.iter().enumerate() {
            if let Some(slot) = coeffs.get_mut(k + offset) {
                *slot = c;
            }
        }
        Self {
            constant: self.constant,
            coeffs,
            param_coeffs: self.param_coeffs.clone(),
        }
    }

    /// Substitute every dimension by an expression over another space.
    ///
    /// `subst[k]` replaces dimension `k`. All substitutes must share one space.
    pub fn substitute(&self, subst: &[AffineExpr]) -> Option<Self> {
        let first = subst.first()?;
        let mut result = AffineExpr::zero(first.n_dim(), first.n_param());
        result.constant = self.constant;
        for (j, &c) in self.param_coeffs.iter().enumerate() {
            if let Some(slot) = result.param_coeffs.get_mut(j) {
                *slot += c;
            }
        }
        for (k, &c) in self.coeffs.iter().enumerate() {
            if c != 0 {
                result = result + subst.get(k)?.scale(c);
            }
        }
        Some(result)
    }

    /// Get GCD of all coefficients and the constant.
    pub fn gcd(&self) -> i64 {
        let g = self
            .coeffs
            .iter()
            .chain(&self.param_coeffs)
            .fold(self.constant.abs(), |g, &c| g.gcd(&c.abs()));
        if g == 0 { 1 } else { g }
    }

    /// Convert to string with given dimension and parameter names.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let mut out = String::new();
        let terms = self
            .coeffs
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, dim_names.get(i).cloned().unwrap_or_else(|| format!("d{}", i))))
            .chain(self.param_coeffs.iter().enumerate().map(|(i, &c)| {
                (c, param_names.get(i).cloned().unwrap_or_else(|| format!("p{}", i)))
            }))
            .filter(|(c, _)| *c != 0);

        for (c, name) in terms {
            let sign = if c < 0 { "-" } else { "+" };
            let mag = c.abs();
            let term = if mag == 1 { name } else { format!("{}{}", mag, name) };
            if out.is_empty() {
                if c < 0 {
                    out.push('-');
                }
                out.push_str(&term);
            } else {
                out.push_str(&format!(" {} {}", sign, term));
            }
        }

        if out.is_empty() {
            return self.constant.to_string();
        }
        match self.constant.cmp(&0) {
            std::cmp::Ordering::Greater => out.push_str(&format!(" + {}", self.constant)),
            std::cmp::Ordering::Less => out.push_str(&format!(" - {}", -self.constant)),
            std::cmp::Ordering::Equal => {}
        }
        out
    }
}

fn zip_with(a: &[i64], b: &[i64], f: impl Fn(i64, i64) -> i64) -> Vec<i64> {
    (0..a.len().max(b.len()))
        .map(|i| f(a.get(i).copied().unwrap_or(0), b.get(i).copied().unwrap_or(0)))
        .collect()
}

fn checked_zip(a: &[i64], b: &[i64]) -> Option<Vec<i64>> {
    (0..a.len().max(b.len()))
        .map(|i| a.get(i).copied().unwrap_or(0).checked_add(b.get(i).copied().unwrap_or(0)))
        .collect()
}

impl Add for AffineExpr {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            constant: self.constant + other.constant,
            coeffs: zip_with(&self.coeffs, &other.coeffs, |a, b| a + b),
            param_coeffs: zip_with(&self.param_coeffs, &other.param_coeffs, |a, b| a + b),
        }
    }
}

impl Sub for AffineExpr {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

impl Neg for AffineExpr {
    type Output = Self;

    fn neg(self) -> Self {
        self.scale(-1)
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[], &[]))
    }
}

/// A quasi-affine expression: affine, or nested integer division and modulo
/// by positive constants.
///
/// Schedules are built from these. Tiling a timestamp coordinate `t` by `T`
/// yields `FloorDiv(t, T)` for the tile coordinate and `Mod(t, T)` for the
/// point coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuasiAffine {
    /// A plain affine expression
    Affine(AffineExpr),
    /// `floor(e / d)` for a positive divisor `d`
    FloorDiv(Box<QuasiAffine>, i64),
    /// `e mod d` (non-negative remainder) for a positive divisor `d`
    Mod(Box<QuasiAffine>, i64),
}

impl QuasiAffine {
    /// A constant expression.
    pub fn constant(value: i64, n_dim: usize, n_param: usize) -> Self {
        QuasiAffine::Affine(AffineExpr::constant(value, n_dim, n_param))
    }

    /// `floor(self / divisor)`, folding constants and the identity divisor.
    pub fn floor_div(self, divisor: i64) -> Self {
        if divisor == 1 {
            return self;
        }
        match self.as_constant() {
            Some(c) => self.with_constant(c.div_floor(&divisor)),
            None => QuasiAffine::FloorDiv(Box::new(self), divisor),
        }
    }

    /// `self mod divisor`, folding constants.
    pub fn modulo(self, divisor: i64) -> Self {
        match self.as_constant() {
            Some(c) => self.with_constant(c.mod_floor(&divisor)),
            None if divisor == 1 => self.with_constant(0),
            None => QuasiAffine::Mod(Box::new(self), divisor),
        }
    }

    fn with_constant(&self, value: i64) -> Self {
        let base = self.base();
        QuasiAffine::constant(value, base.n_dim(), base.n_param())
    }

    /// The innermost affine expression.
    pub fn base(&self) -> &AffineExpr {
        match self {
            QuasiAffine::Affine(e) => e,
            QuasiAffine::FloorDiv(inner, _) | QuasiAffine::Mod(inner, _) => inner.base(),
        }
    }

    /// The constant value, if the expression does not depend on dims or params.
    pub fn as_constant(&self) -> Option<i64> {
        match self {
            QuasiAffine::Affine(e) => e.as_constant(),
            QuasiAffine::FloorDiv(inner, d) => inner.as_constant().map(|c| c.div_floor(d)),
            QuasiAffine::Mod(inner, d) => inner.as_constant().map(|c| c.mod_floor(d)),
        }
    }

    /// True if the expression does not depend on any dimension.
    pub fn is_dim_free(&self) -> bool {
        self.base().is_dim_free()
    }

    /// Evaluate at a point.
    pub fn evaluate(&self, dim_values: &[i64], param_values: &[i64]) -> i64 {
        match self {
            QuasiAffine::Affine(e) => e.evaluate(dim_values, param_values),
            QuasiAffine::FloorDiv(inner, d) => inner.evaluate(dim_values, param_values).div_floor(d),
            QuasiAffine::Mod(inner, d) => inner.evaluate(dim_values, param_values).mod_floor(d),
        }
    }

    /// Convert to string with given dimension and parameter names.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        match self {
            QuasiAffine::Affine(e) => e.to_string_with_names(dim_names, param_names),
            QuasiAffine::FloorDiv(inner, d) => {
                format!("floor(({})/{})", inner.to_string_with_names(dim_names, param_names), d)
            }
            QuasiAffine::Mod(inner, d) => {
                format!("({}) mod {}", inner.to_string_with_names(dim_names, param_names), d)
            }
        }
    }
}

impl From<AffineExpr> for QuasiAffine {
    fn from(expr: AffineExpr) -> Self {
        QuasiAffine::Affine(expr)
    }
}

impl fmt::Display for QuasiAffine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[], &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_arithmetic() {
        let big = AffineExpr::constant(i64::MAX / 2 + 1, 1, 0);
        assert!(big.checked_scale(2).is_none());
        assert!(big.checked_add(&big).is_none());
        assert!(AffineExpr::constant(i64::MIN, 1, 0).checked_sub(&AffineExpr::constant(1, 1, 0)).is_none());
        let sum = AffineExpr::var(0, 1, 0).checked_add(&AffineExpr::constant(3, 1, 0)).unwrap();
        assert_eq!(sum.checked_scale(2).unwrap().evaluate(&[1], &[]), 8);
    }

    #[test]
    fn test_constant() {
        let expr = AffineExpr::constant(5, 2, 1);
        assert!(expr.is_constant());
        assert_eq!(expr.evaluate(&[1, 2], &[3]), 5);
    }

    #[test]
    fn test_add_sub() {
        let e1 = AffineExpr::var(0, 2, 0);
        let e2 = AffineExpr::var(1, 2, 0);
        assert_eq!((e1.clone() + e2.clone()).evaluate(&[3, 4], &[]), 7);
        assert_eq!((e1 - e2).evaluate(&[3, 4], &[]), -1);
    }

    #[test]
    fn test_embed_and_substitute() {
        // i + 2 in a 1-d space, moved to position 1 of a 3-d space
        let mut e = AffineExpr::var(0, 1, 0);
        e.constant = 2;
        let moved = e.embed(1, 3);
        assert_eq!(moved.coeffs, vec![0, 1, 0]);

        // substitute i := 2*j over a 1-d space
        let subst = vec![AffineExpr::var(0, 1, 0).scale(2)];
        let s = e.substitute(&subst).unwrap();
        assert_eq!(s.evaluate(&[3], &[]), 8);
    }

    #[test]
    fn test_display() {
        let mut expr = AffineExpr::zero(2, 1);
        expr.constant = -1;
        expr.coeffs = vec![2, -1];
        expr.param_coeffs = vec![1];
        let s = expr.to_string_with_names(&["i".to_string(), "j".to_string()], &["N".to_string()]);
        assert_eq!(s, "2i - j + N - 1");
    }

    #[test]
    fn test_quasi_affine_floor_mod() {
        let i = QuasiAffine::from(AffineExpr::var(0, 1, 0));
        let tile = i.clone().floor_div(4);
        let point = i.modulo(4);
        assert_eq!(tile.evaluate(&[-1], &[]), -1);
        assert_eq!(point.evaluate(&[-1], &[]), 3);
        assert_eq!(tile.evaluate(&[9], &[]), 2);
        assert_eq!(point.evaluate(&[9], &[]), 1);
    }

    #[test]
    fn test_quasi_affine_folding() {
        let c = QuasiAffine::constant(7, 1, 0);
        assert_eq!(c.clone().floor_div(2).as_constant(), Some(3));
        assert_eq!(c.modulo(2).as_constant(), Some(1));

        let i = QuasiAffine::from(AffineExpr::var(0, 1, 0));
        assert_eq!(i.clone().floor_div(1), i);
        assert_eq!(i.modulo(1).as_constant(), Some(0));
    }
}

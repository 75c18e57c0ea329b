//! Affine maps for access relations.
//!
//! An access relation maps a statement instance to the array element it
//! touches: `{ S[i, j] -> A[i, j + 1] }`. Each output is an affine expression
//! over the input dimensions and the parameters.

use crate::polyhedral::space::Space;
use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::constraint::Constraint;
use serde::{Serialize, Deserialize};
use std::fmt;

/// An affine map from one space to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffineMap {
    /// Map space: input dims, output dims, parameters
    pub space: Space,
    /// Output expressions (one per output dimension), over inputs and params
    pub outputs: Vec<AffineExpr>,
}

impl AffineMap {
    /// Identity map of given dimension.
    pub fn identity(n_dim: usize, n_param: usize) -> Self {
        let outputs = (0..n_dim).map(|i| AffineExpr::var(i, n_dim, n_param)).collect();
        Self::from_outputs(n_dim, n_param, outputs)
    }

    /// Create from output expressions.
    pub fn from_outputs(n_in: usize, n_param: usize, outputs: Vec<AffineExpr>) -> Self {
        let n_out = outputs.len();
        Self {
            space: Space::map_with_params(n_in, n_out, n_param),
            outputs,
        }
    }

    /// Replace the space, keeping the outputs.
    pub fn with_space(mut self, space: Space) -> Self {
        self.space = space;
        self
    }

    /// Get input dimensions.
    pub fn n_in(&self) -> usize { self.space.n_in }

    /// Get output dimensions.
    pub fn n_out(&self) -> usize { self.space.n_dim }

    /// Get number of parameters.
    pub fn n_param(&self) -> usize { self.space.n_param }

    /// Name of the target tuple, e.g. the array name.
    pub fn range_name(&self) -> Option<&str> {
        self.space.tuple_name.as_deref()
    }

    /// Apply the map to a point.
    pub fn apply(&self, input: &[i64], params: &[i64]) -> Vec<i64> {
        self.outputs.iter().map(|expr| expr.evaluate(input, params)).collect()
    }

    /// Compose two maps: `self` after `other`.
    pub fn compose(&self, other: &AffineMap) -> Option<AffineMap> {
        if self.n_in() != other.n_out() {
            return None;
        }
        let outputs = self
            .outputs
            .iter()
            .map(|out| out.substitute(&other.outputs))
            .collect::<Option<Vec<_>>>()?;
        Some(AffineMap::from_outputs(other.n_in(), self.n_param(), outputs))
    }

    /// Output expressions re-embedded over a pair space, where this map's
    /// inputs occupy dimensions `offset ..` of `n_dim` total.
    pub fn embedded_outputs(&self, offset: usize, n_dim: usize) -> Vec<AffineExpr> {
        self.outputs.iter().map(|e| e.embed(offset, n_dim)).collect()
    }

    /// Constraints `self(x) = other(y)` over a pair space with `x` at
    /// dimension 0 and `y` at `self.n_in()`. Returns `None` on rank mismatch.
    pub fn same_element(&self, other: &AffineMap) -> Option<Vec<Constraint>> {
        if self.n_out() != other.n_out() {
            return None;
        }
        let n_dim = self.n_in() + other.n_in();
        let lhs = self.embedded_outputs(0, n_dim);
        let rhs = other.embedded_outputs(self.n_in(), n_dim);
        Some(lhs.into_iter().zip(rhs).map(|(a, b)| Constraint::eq(a, b)).collect())
    }

    /// Check if this is the identity map.
    pub fn is_identity(&self) -> bool {
        self.n_in() == self.n_out()
            && self.outputs.iter().enumerate().all(|(i, e)| {
                e.constant == 0
                    && e.param_coeffs.iter().all(|&c| c == 0)
                    && e.coeffs.iter().enumerate().all(|(j, &c)| c == i64::from(i == j))
            })
    }
}

impl fmt::Display for AffineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_names = self.space.all_in_names();
        let param_names = self.space.all_param_names();
        if self.n_param() > 0 {
            write!(f, "[{}] -> ", param_names.join(", "))?;
        }
        let outs: Vec<String> = self
            .outputs
            .iter()
            .map(|e| e.to_string_with_names(&in_names, &param_names))
            .collect();
        write!(
            f,
            "{{ {}[{}] -> {}[{}] }}",
            self.space.in_tuple_name.as_deref().unwrap_or(""),
            in_names.join(", "),
            self.space.tuple_name.as_deref().unwrap_or(""),
            outs.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let m = AffineMap::identity(2, 0);
        assert!(m.is_identity());
        assert_eq!(m.apply(&[3, 4], &[]), vec![3, 4]);
    }

    #[test]
    fn test_compose() {
        // shift: i -> i + 1, then double: i -> 2i
        let mut shift = AffineExpr::var(0, 1, 0);
        shift.constant = 1;
        let shift = AffineMap::from_outputs(1, 0, vec![shift]);
        let double = AffineMap::from_outputs(1, 0, vec![AffineExpr::var(0, 1, 0).scale(2)]);
        let composed = double.compose(&shift).unwrap();
        assert_eq!(composed.apply(&[3], &[]), vec![8]);
        assert!(!composed.is_identity());
    }

    #[test]
    fn test_same_element() {
        // A[i] and A[j - 1]
        let a = AffineMap::identity(1, 0);
        let mut e = AffineExpr::var(0, 1, 0);
        e.constant = -1;
        let b = AffineMap::from_outputs(1, 0, vec![e]);
        let eqs = a.same_element(&b).unwrap();
        assert_eq!(eqs.len(), 1);
        assert!(eqs[0].is_satisfied(&[2, 3], &[]));
        assert!(!eqs[0].is_satisfied(&[2, 2], &[]));
    }

    #[test]
    fn test_display() {
        let space = Space::map_with_params(2, 2, 0)
            .with_in_tuple_name("S0")
            .with_in_names(vec!["i".to_string(), "j".to_string()])
            .with_tuple_name("C");
        let m = AffineMap::identity(2, 0).with_space(space);
        assert_eq!(m.to_string(), "{ S0[i, j] -> C[i, j] }");
    }
}

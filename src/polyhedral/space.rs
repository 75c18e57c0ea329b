//! Polyhedral spaces describe the dimensions of sets and maps.
//!
//! A space records:
//! - the tuple name (`S0` in `{ S0[i, j] }`, `C` in `{ S0[i, j] -> C[i, j] }`)
//! - input dimensions (maps only) and output/set dimensions
//! - parameter dimensions shared by every set of a model

use serde::{Serialize, Deserialize};
use std::fmt;

/// A polyhedral space describes the dimensionality and naming of a set or map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    /// Number of set/output dimensions
    pub n_dim: usize,
    /// Number of parameter dimensions
    pub n_param: usize,
    /// Number of input dimensions (for maps only)
    pub n_in: usize,
    /// Name of the set tuple, or of the map's range tuple
    pub tuple_name: Option<String>,
    /// Name of the map's domain tuple
    pub in_tuple_name: Option<String>,
    /// Names of input dimensions (maps only)
    pub in_names: Vec<String>,
    /// Names of set/output dimensions
    pub dim_names: Vec<String>,
    /// Names of parameters
    pub param_names: Vec<String>,
}

impl Space {
    /// Create a new set space with the given dimensions.
    pub fn set(n_dim: usize) -> Self {
        Self::set_with_params(n_dim, 0)
    }

    /// Create a new set space with parameters.
    pub fn set_with_params(n_dim: usize, n_param: usize) -> Self {
        Self {
            n_dim,
            n_param,
            n_in: 0,
            tuple_name: None,
            in_tuple_name: None,
            in_names: Vec::new(),
            dim_names: Vec::new(),
            param_names: Vec::new(),
        }
    }

    /// Create a new map space with parameters.
    pub fn map_with_params(n_in: usize, n_out: usize, n_param: usize) -> Self {
        Self {
            n_in,
            ..Self::set_with_params(n_out, n_param)
        }
    }

    /// Space of the parameters alone (a zero-dimensional set).
    pub fn params(param_names: Vec<String>) -> Self {
        Self::set_with_params(0, param_names.len()).with_param_names(param_names)
    }

    /// Check if this is a map space.
    pub fn is_map(&self) -> bool {
        self.n_in > 0 || self.in_tuple_name.is_some()
    }

    /// Get the number of output/set dimensions.
    pub fn dim(&self) -> usize {
        self.n_dim
    }

    /// Number of variables of a set over this space: dims followed by params.
    pub fn total_dim(&self) -> usize {
        self.n_in + self.n_dim + self.n_param
    }

    /// Set the tuple name.
    pub fn with_tuple_name(mut self, name: impl Into<String>) -> Self {
        self.tuple_name = Some(name.into());
        self
    }

    /// Set the domain tuple name of a map space.
    pub fn with_in_tuple_name(mut self, name: impl Into<String>) -> Self {
        self.in_tuple_name = Some(name.into());
        self
    }

    /// Set the input dimension names of a map space.
    pub fn with_in_names(mut self, names: Vec<String>) -> Self {
        self.in_names = names;
        self
    }

    /// Set dimension names.
    pub fn with_dim_names(mut self, names: Vec<String>) -> Self {
        self.dim_names = names;
        self
    }

    /// Set parameter names.
    pub fn with_param_names(mut self, names: Vec<String>) -> Self {
        self.param_names = names;
        self
    }

    /// Get all dimension names, filling gaps with `d{i}`.
    pub fn all_dim_names(&self) -> Vec<String> {
        fill_names(&self.dim_names, self.n_dim, "d")
    }

    /// Get all input dimension names, filling gaps with `i{i}`.
    pub fn all_in_names(&self) -> Vec<String> {
        fill_names(&self.in_names, self.n_in, "i")
    }

    /// Get all parameter names, filling gaps with `p{i}`.
    pub fn all_param_names(&self) -> Vec<String> {
        fill_names(&self.param_names, self.n_param, "p")
    }

    /// The set space of a map's domain.
    pub fn domain(&self) -> Space {
        let mut space = Space::set_with_params(self.n_in, self.n_param)
            .with_dim_names(self.in_names.clone())
            .with_param_names(self.param_names.clone());
        space.tuple_name = self.in_tuple_name.clone();
        space
    }

    /// The set space of a map's range.
    pub fn range(&self) -> Space {
        let mut space = Space::set_with_params(self.n_dim, self.n_param)
            .with_dim_names(self.dim_names.clone())
            .with_param_names(self.param_names.clone());
        space.tuple_name = self.tuple_name.clone();
        space
    }

    /// Set space over the concatenated dimensions of two set spaces.
    ///
    /// Used for pair relations such as dependences, `{ [s..., t...] }`.
    /// Parameters are taken from `self`.
    pub fn product(&self, other: &Space) -> Space {
        let mut names = self.all_dim_names();
        names.extend(other.all_dim_names().into_iter().map(|n| {
            if self.dim_names.contains(&n) { format!("{}'", n) } else { n }
        }));
        Space::set_with_params(self.n_dim + other.n_dim, self.n_param)
            .with_dim_names(names)
            .with_param_names(self.param_names.clone())
    }
}

fn fill_names(names: &[String], n: usize, prefix: &str) -> Vec<String> {
    (0..n)
        .map(|i| names.get(i).cloned().unwrap_or_else(|| format!("{}{}", prefix, i)))
        .collect()
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.n_param > 0 {
            write!(f, "[{}] -> ", self.all_param_names().join(", "))?;
        }
        if self.is_map() {
            write!(
                f,
                "{}[{}] -> ",
                self.in_tuple_name.as_deref().unwrap_or(""),
                self.all_in_names().join(", ")
            )?;
        }
        write!(
            f,
            "{}[{}]",
            self.tuple_name.as_deref().unwrap_or(""),
            self.all_dim_names().join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_space() {
        let space = Space::set(3);
        assert!(!space.is_map());
        assert_eq!(space.dim(), 3);
        assert_eq!(space.total_dim(), 3);
    }

    #[test]
    fn test_map_space() {
        let space = Space::map_with_params(2, 3, 1);
        assert!(space.is_map());
        assert_eq!(space.n_in, 2);
        assert_eq!(space.domain().dim(), 2);
        assert_eq!(space.range().dim(), 3);
        assert_eq!(space.range().n_param, 1);
    }

    #[test]
    fn test_display_with_names() {
        let space = Space::set_with_params(2, 1)
            .with_tuple_name("S0")
            .with_dim_names(vec!["i".to_string(), "j".to_string()])
            .with_param_names(vec!["N".to_string()]);
        assert_eq!(space.to_string(), "[N] -> S0[i, j]");
    }

    #[test]
    fn test_product_renames_clashes() {
        let s = Space::set(1).with_dim_names(vec!["i".to_string()]);
        let pair = s.product(&s);
        assert_eq!(pair.dim(), 2);
        assert_eq!(pair.all_dim_names(), vec!["i".to_string(), "i'".to_string()]);
    }
}

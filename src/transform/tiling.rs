//! Loop tiling transformation.
//!
//! Tiling (also called blocking) splits a band of loop dimensions into
//! tile coordinates and point coordinates so that each tile's working set
//! stays small.
//!
//! Example, tiling both loops by 2:
//! ```text
//! [0, i, 0, j, 0]
//! ```
//! becomes:
//! ```text
//! [0, floor(i/2), floor(j/2), i mod 2, 0, j mod 2, 0]
//! ```
//! Statements outside the band get constant-zero tile coordinates and keep
//! their own roles.

use crate::ir::pir::StmtId;
use crate::polyhedral::expr::QuasiAffine;
use crate::transform::schedule::{DimRole, Schedule};
use crate::transform::Transform;

/// Tile size used when none is configured.
pub const DEFAULT_TILE_SIZE: i64 = 32;

/// Loop tiling transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tiling {
    /// Statements of the band
    pub members: Vec<StmtId>,
    /// Timestamp dimensions to tile, strictly increasing
    pub dims: Vec<usize>,
    /// One size per tiled dimension
    pub sizes: Vec<i64>,
}

impl Tiling {
    /// Create a new tiling transformation.
    pub fn new(members: Vec<StmtId>, dims: Vec<usize>, sizes: Vec<i64>) -> Self {
        Self { members, dims, sizes }
    }

    /// Tile `dims` with one uniform size.
    pub fn with_default_size(members: Vec<StmtId>, dims: Vec<usize>, size: i64) -> Self {
        let sizes = vec![size; dims.len()];
        Self { members, dims, sizes }
    }

    /// Sizes for a band of `n` dimensions taken from a configured list.
    /// The last size repeats when the list is short.
    pub fn sizes_for(configured: &[i64], n: usize) -> Vec<i64> {
        (0..n)
            .map(|k| {
                configured
                    .get(k)
                    .or_else(|| configured.last())
                    .copied()
                    .unwrap_or(DEFAULT_TILE_SIZE)
            })
            .collect()
    }

    fn is_applicable(&self, schedule: &Schedule) -> bool {
        !self.dims.is_empty()
            && self.dims.len() == self.sizes.len()
            && self.sizes.iter().all(|&t| t > 0)
            && self.dims.windows(2).all(|w| w[0] < w[1])
            && self.dims.iter().all(|&d| d < schedule.len())
            && schedule.is_rectangular()
    }
}

impl Transform for Tiling {
    fn apply(&self, schedule: &Schedule) -> Option<Schedule> {
        if !self.is_applicable(schedule) {
            return None;
        }
        let start = self.dims[0];
        let k = self.dims.len();
        let n_param = schedule.param_names.len();

        let mut tiled = schedule.clone();
        tiled.clear_marks();
        tiled.width += k;
        for entry in tiled.statements.iter_mut() {
            let depth = entry.iterators.len();
            let old = std::mem::take(&mut entry.dims);
            let old_roles = std::mem::take(&mut entry.roles);
            let old_sizes = std::mem::take(&mut entry.tile_sizes);
            let mut rest = old[start..].to_vec();
            let mut rest_roles = old_roles[start..].to_vec();
            let mut rest_sizes = old_sizes[start..].to_vec();

            entry.dims = old[..start].to_vec();
            entry.roles = old_roles[..start].to_vec();
            entry.tile_sizes = old_sizes[..start].to_vec();
            if self.members.contains(&entry.stmt) {
                for (&d, &t) in self.dims.iter().zip(&self.sizes) {
                    entry.dims.push(old[d].clone().floor_div(t));
                    rest[d - start] = rest[d - start].clone().modulo(t);
                    rest_roles[d - start] = DimRole::Point;
                    rest_sizes[d - start] = Some(t);
                }
                entry.roles.extend(vec![DimRole::Tile; k]);
                entry.tile_sizes.extend(self.sizes.iter().map(|&t| Some(t)));
            } else {
                entry.dims.extend(vec![QuasiAffine::constant(0, depth, n_param); k]);
                entry.roles.extend(vec![DimRole::Sequence; k]);
                entry.tile_sizes.extend(vec![None; k]);
            }
            entry.dims.extend(rest);
            entry.roles.extend(rest_roles);
            entry.tile_sizes.extend(rest_sizes);
        }
        tiled.history.push(self.describe());
        Some(tiled)
    }

    fn name(&self) -> &str {
        "tiling"
    }

    fn describe(&self) -> String {
        let members: Vec<String> = self.members.iter().map(|m| m.to_string()).collect();
        format!("tile {{{}}} dims {:?} by {:?}", members.join(", "), self.dims, self.sizes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pir::{RegionDescriptor, StatementDecl};

    fn schedule() -> Schedule {
        let program = RegionDescriptor::new("init")
            .statement(
                StatementDecl::new("S0", "{ S0[i, j] : 0 <= i < 4 and 0 <= j < 4 }")
                    .write("C", "{ S0[i, j] -> C[i, j] }"),
            )
            .statement(StatementDecl::new("S1", "{ S1[i] : 0 <= i < 4 }").write("B", "{ S1[i] -> B[i] }").at(vec![1, 0]))
            .build()
            .unwrap();
        Schedule::identity(&program)
    }

    #[test]
    fn test_tile_two_dims() {
        let tiling = Tiling::with_default_size(vec![StmtId(0)], vec![1, 3], 2);
        let tiled = tiling.apply(&schedule()).unwrap();
        assert_eq!(tiled.len(), 7);
        assert_eq!(
            tiled.statement(StmtId(0)).unwrap().roles,
            vec![
                DimRole::Sequence,
                DimRole::Tile,
                DimRole::Tile,
                DimRole::Point,
                DimRole::Sequence,
                DimRole::Point,
                DimRole::Sequence,
            ]
        );
        assert_eq!(tiled.timestamp(StmtId(0), &[3, 2], &[]), Some(vec![0, 1, 1, 1, 0, 0, 0]));
        // outside the band: constant tile coordinates, untouched roles
        assert_eq!(tiled.timestamp(StmtId(1), &[3], &[]), Some(vec![1, 0, 0, 3, 0, 0, 0]));
        assert_eq!(tiled.role(StmtId(1), 3), Some(DimRole::Loop));
        assert_eq!(tiled.tile_size(StmtId(1), 3), None);
        assert_eq!(tiled.tile_size(StmtId(0), 1), Some(2));
        assert_eq!(tiled.tile_size(StmtId(0), 3), Some(2));
        assert!(tiled.is_rectangular());
        assert_eq!(tiled.history.len(), 1);
    }

    #[test]
    fn test_non_positive_size_is_inapplicable() {
        let tiling = Tiling::new(vec![StmtId(0)], vec![1], vec![0]);
        assert!(tiling.apply(&schedule()).is_none());
        let tiling = Tiling::new(vec![StmtId(0)], vec![3, 1], vec![2, 2]);
        assert!(tiling.apply(&schedule()).is_none());
    }

    #[test]
    fn test_unit_tiles_fold_points() {
        let tiled = Tiling::with_default_size(vec![StmtId(0)], vec![1, 3], 1)
            .apply(&schedule())
            .unwrap();
        let entry = tiled.statement(StmtId(0)).unwrap();
        assert_eq!(entry.dims[3].as_constant(), Some(0));
        assert_eq!(entry.dims[5].as_constant(), Some(0));
    }

    #[test]
    fn test_sizes_for() {
        assert_eq!(Tiling::sizes_for(&[2, 4], 3), vec![2, 4, 4]);
        assert_eq!(Tiling::sizes_for(&[], 2), vec![DEFAULT_TILE_SIZE, DEFAULT_TILE_SIZE]);
    }
}

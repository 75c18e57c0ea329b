//! Loop fusion transformation.
//!
//! Two sibling loop nests ordered by a sequence dimension `k` are merged by
//! giving the later nest the earlier nest's position at `k`. The later
//! nest's position at the next sequence dimension `k + 2` is shifted past
//! the earlier nest's, so inside the fused loop the earlier body still runs
//! first.

use crate::ir::pir::StmtId;
use crate::polyhedral::expr::QuasiAffine;
use crate::transform::schedule::{DimRole, Schedule};
use crate::transform::Transform;

/// Loop fusion transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fusion {
    /// Statements of the earlier nest
    pub first: Vec<StmtId>,
    /// Statements of the later nest
    pub second: Vec<StmtId>,
    /// Sequence dimension separating the two nests
    pub dim: usize,
}

impl Fusion {
    /// Fuse the nest of `second` into the nest of `first` at sequence dimension `dim`.
    pub fn new(first: Vec<StmtId>, second: Vec<StmtId>, dim: usize) -> Self {
        Self { first, second, dim }
    }

    fn constants(schedule: &Schedule, members: &[StmtId], dim: usize) -> Option<Vec<i64>> {
        members
            .iter()
            .map(|&m| schedule.statement(m)?.dims.get(dim)?.as_constant())
            .collect()
    }

    fn is_loop_for_all(schedule: &Schedule, members: &[StmtId], dim: usize) -> bool {
        members.iter().all(|&m| {
            schedule.role(m, dim) == Some(DimRole::Loop)
                && schedule
                    .statement(m)
                    .and_then(|s| s.dims.get(dim))
                    .is_some_and(|e| e.as_constant().is_none())
        })
    }
}

impl Transform for Fusion {
    fn apply(&self, schedule: &Schedule) -> Option<Schedule> {
        let (k, inner) = (self.dim, self.dim + 2);
        if self.first.is_empty() || self.second.is_empty() || inner >= schedule.len() {
            return None;
        }
        let at_first = Self::constants(schedule, &self.first, k)?;
        let at_second = Self::constants(schedule, &self.second, k)?;
        let position = at_first[0];
        if at_first.iter().any(|&c| c != position) || at_second.iter().any(|&c| c <= position) {
            return None;
        }
        let all: Vec<StmtId> = self.first.iter().chain(&self.second).copied().collect();
        if !Self::is_loop_for_all(schedule, &all, k + 1) {
            return None;
        }
        let first_inner = Self::constants(schedule, &self.first, inner)?;
        let second_inner = Self::constants(schedule, &self.second, inner)?;
        let shift = first_inner.iter().max()? + 1 - second_inner.iter().min()?;

        let n_param = schedule.param_names.len();
        let mut fused = schedule.clone();
        fused.clear_marks();
        for (&m, &old) in self.second.iter().zip(&second_inner) {
            let entry = fused.statement_mut(m)?;
            let depth = entry.iterators.len();
            entry.dims[k] = QuasiAffine::constant(position, depth, n_param);
            entry.dims[inner] = QuasiAffine::constant(old + shift, depth, n_param);
        }
        fused.history.push(self.describe());
        Some(fused)
    }

    fn name(&self) -> &str {
        "fusion"
    }

    fn describe(&self) -> String {
        let names = |ids: &[StmtId]| ids.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(", ");
        format!("fuse {{{}}} with {{{}}} at dim {}", names(self.first.as_slice()), names(self.second.as_slice()), self.dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pir::{PolyProgram, RegionDescriptor, StatementDecl};

    fn separate_nests() -> PolyProgram {
        RegionDescriptor::new("producer_consumer")
            .param("N")
            .statement(
                StatementDecl::new("S0", "[N] -> { S0[i] : 0 <= i < N }")
                    .write("A", "[N] -> { S0[i] -> A[i] }")
                    .at(vec![0, 0]),
            )
            .statement(
                StatementDecl::new("S1", "[N] -> { S1[i] : 0 <= i < N }")
                    .read("A", "[N] -> { S1[i] -> A[i] }")
                    .write("B", "[N] -> { S1[i] -> B[i] }")
                    .at(vec![1, 0]),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_fuse_adjacent_nests() {
        let schedule = Schedule::identity(&separate_nests());
        let fused = Fusion::new(vec![StmtId(0)], vec![StmtId(1)], 0).apply(&schedule).unwrap();
        assert_eq!(fused.timestamp(StmtId(0), &[3], &[8]), Some(vec![0, 3, 0]));
        assert_eq!(fused.timestamp(StmtId(1), &[3], &[8]), Some(vec![0, 3, 1]));
        assert_eq!(fused.history, vec!["fuse {S0} with {S1} at dim 0".to_string()]);
    }

    #[test]
    fn test_fusion_needs_ordered_nests() {
        let schedule = Schedule::identity(&separate_nests());
        assert!(Fusion::new(vec![StmtId(1)], vec![StmtId(0)], 0).apply(&schedule).is_none());
        assert!(Fusion::new(vec![StmtId(0)], vec![StmtId(1)], 1).apply(&schedule).is_none());
    }
}

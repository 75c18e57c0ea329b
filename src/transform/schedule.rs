//! Flat multi-dimensional schedules.
//!
//! A schedule maps every statement instance to a timestamp vector of common
//! length. Each statement's timestamp dimensions carry a [`DimRole`] telling
//! whether they sequence statements, run a loop, or were produced by tiling.

use crate::ir::pir::{PolyProgram, StmtId};
use crate::polyhedral::expr::QuasiAffine;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a timestamp dimension stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DimRole {
    /// A textual-position constant (β)
    Sequence,
    /// An untiled loop
    Loop,
    /// Tile coordinate `floor(t / T)`
    Tile,
    /// Point coordinate `t mod T`
    Point,
}

impl DimRole {
    /// Short lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            DimRole::Sequence => "sequence",
            DimRole::Loop => "loop",
            DimRole::Tile => "tile",
            DimRole::Point => "point",
        }
    }
}

impl fmt::Display for DimRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Timestamp expressions of one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StmtSchedule {
    /// Statement
    pub stmt: StmtId,
    /// Statement name
    pub name: String,
    /// Iterator names, used for printing
    pub iterators: Vec<String>,
    /// One expression per timestamp dimension, over the statement's dims and
    /// the program parameters
    pub dims: Vec<QuasiAffine>,
    /// Role per timestamp dimension
    pub roles: Vec<DimRole>,
    /// Tile size per dimension, for tile and point dimensions
    pub tile_sizes: Vec<Option<i64>>,
}

impl StmtSchedule {
    /// Number of statement dimensions the expressions range over.
    pub fn depth(&self) -> usize {
        self.iterators.len()
    }

    /// Timestamp of one instance.
    pub fn timestamp(&self, point: &[i64], params: &[i64]) -> Vec<i64> {
        self.dims.iter().map(|e| e.evaluate(point, params)).collect()
    }

    /// Whether dims, roles and sizes all have `len` entries.
    fn has_len(&self, len: usize) -> bool {
        self.dims.len() == len && self.roles.len() == len && self.tile_sizes.len() == len
    }
}

/// Parallelism annotation of one band of the layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandMark {
    /// Statements the band spans
    pub members: Vec<StmtId>,
    /// Timestamp dimensions of the band
    pub dims: Vec<usize>,
    /// Parallel flag per band dimension
    pub parallel: Vec<bool>,
}

/// Independence annotation of one split of the layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitMark {
    /// Statements below the split
    pub members: Vec<StmtId>,
    /// Dimension at which the groups differ
    pub dim: usize,
    /// Whether no dependence connects different groups
    pub independent: bool,
}

/// Nested structure of a schedule, derived from its dimensions.
///
/// Dimensions that are one constant across a subtree are elided. Differing
/// constants split the subtree, and maximal runs of same-role dimensions
/// form bands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// A run of dimensions scheduled together
    Band {
        /// Timestamp dimensions of the band, increasing
        dims: Vec<usize>,
        /// Common role of the dimensions
        role: DimRole,
        /// Statements below the band, in statement order
        members: Vec<StmtId>,
        /// Rest of the subtree
        child: Box<Layout>,
    },
    /// Groups ordered by the constant value of one dimension
    Split {
        /// The splitting dimension; the schedule length when the groups
        /// have identical timestamps
        dim: usize,
        /// One layout per group, in increasing constant order
        children: Vec<Layout>,
    },
    /// A single statement
    Leaf(StmtId),
}

impl Layout {
    /// Statements below this node, in layout order.
    pub fn members(&self) -> Vec<StmtId> {
        match self {
            Layout::Band { members, .. } => members.clone(),
            Layout::Split { children, .. } => children.iter().flat_map(|c| c.members()).collect(),
            Layout::Leaf(id) => vec![*id],
        }
    }
}

/// A complete schedule for a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Per-statement timestamps, in statement order
    pub statements: Vec<StmtSchedule>,
    /// Number of timestamp dimensions
    pub width: usize,
    /// Parameter names, used for printing
    pub param_names: Vec<String>,
    /// Band annotations, filled in once the schedule is final
    pub bands: Vec<BandMark>,
    /// Split annotations, filled in once the schedule is final
    pub splits: Vec<SplitMark>,
    /// Descriptions of the transformations applied so far
    pub history: Vec<String>,
}

impl Schedule {
    /// Build a schedule from explicit per-statement dimensions.
    pub fn new(statements: Vec<StmtSchedule>, width: usize, param_names: Vec<String>) -> Self {
        Self {
            statements,
            width,
            param_names,
            bands: Vec::new(),
            splits: Vec::new(),
            history: Vec::new(),
        }
    }

    /// The original 2d+1 schedule: textual positions interleaved with the
    /// iterators, zero-padded to a common length.
    pub fn identity(program: &PolyProgram) -> Self {
        let len = program.schedule_len();
        let n_param = program.n_param();
        let statements = program
            .statements
            .iter()
            .map(|stmt| StmtSchedule {
                stmt: stmt.id,
                name: stmt.name.clone(),
                iterators: stmt.iterators.clone(),
                dims: stmt
                    .original_schedule(len, n_param)
                    .into_iter()
                    .map(QuasiAffine::from)
                    .collect(),
                roles: (0..len)
                    .map(|d| if d % 2 == 0 { DimRole::Sequence } else { DimRole::Loop })
                    .collect(),
                tile_sizes: vec![None; len],
            })
            .collect();
        Self::new(statements, len, program.param_names())
    }

    /// Number of timestamp dimensions.
    pub fn len(&self) -> usize {
        self.width
    }

    /// True if the schedule has no dimension.
    pub fn is_empty(&self) -> bool {
        self.width == 0
    }

    /// Role of dimension `dim` for `stmt`.
    pub fn role(&self, stmt: StmtId, dim: usize) -> Option<DimRole> {
        self.statement(stmt)?.roles.get(dim).copied()
    }

    /// Tile size of dimension `dim` for `stmt`, if it was tiled.
    pub fn tile_size(&self, stmt: StmtId, dim: usize) -> Option<i64> {
        self.statement(stmt)?.tile_sizes.get(dim).copied().flatten()
    }

    /// The role every member has at `dim`, if they agree.
    fn common_role(&self, members: &[StmtId], dim: usize) -> Option<DimRole> {
        let mut roles = members.iter().map(|&m| self.role(m, dim));
        let first = roles.next()??;
        roles.all(|r| r == Some(first)).then_some(first)
    }

    /// Timestamps of a statement.
    pub fn statement(&self, id: StmtId) -> Option<&StmtSchedule> {
        self.statements.iter().find(|s| s.stmt == id)
    }

    pub(crate) fn statement_mut(&mut self, id: StmtId) -> Option<&mut StmtSchedule> {
        self.statements.iter_mut().find(|s| s.stmt == id)
    }

    /// Statement ids in schedule order.
    pub fn statement_ids(&self) -> Vec<StmtId> {
        self.statements.iter().map(|s| s.stmt).collect()
    }

    /// Whether the schedule is well formed for `program`: exactly one entry
    /// per statement, every entry of the common length, every expression
    /// over the statement's dimensions and the program parameters.
    pub fn covers(&self, program: &PolyProgram) -> bool {
        if self.statements.len() != program.statements.len() {
            return false;
        }
        program.statements.iter().all(|stmt| {
            let mut entries = self.statements.iter().filter(|s| s.stmt == stmt.id);
            let (Some(entry), None) = (entries.next(), entries.next()) else {
                return false;
            };
            entry.has_len(self.len())
                && entry.depth() == stmt.depth()
                && entry.dims.iter().all(|e| {
                    e.base().n_dim() == stmt.depth() && e.base().n_param() == program.n_param()
                })
        })
    }

    /// Whether every entry has dims, roles and sizes of the common length.
    pub fn is_rectangular(&self) -> bool {
        self.statements.iter().all(|s| s.has_len(self.len()))
    }

    /// Timestamp of one instance of `stmt`.
    pub fn timestamp(&self, stmt: StmtId, point: &[i64], params: &[i64]) -> Option<Vec<i64>> {
        self.statement(stmt).map(|s| s.timestamp(point, params))
    }

    /// Every instance of the program for fixed parameters, in execution
    /// order. Ties on the timestamp are broken by statement order.
    ///
    /// Returns `None` if some domain has more than `limit` points.
    pub fn execution_order(
        &self,
        program: &PolyProgram,
        params: &[i64],
        limit: usize,
    ) -> Option<Vec<(StmtId, Vec<i64>)>> {
        let mut instances = Vec::new();
        for (rank, stmt) in program.statements.iter().enumerate() {
            let entry = self.statement(stmt.id)?;
            for point in program.bounded_domain(stmt).points(params, limit)? {
                instances.push((entry.timestamp(&point, params), rank, stmt.id, point));
            }
        }
        instances.sort();
        Some(instances.into_iter().map(|(_, _, id, point)| (id, point)).collect())
    }

    fn constants_at(&self, members: &[StmtId], dim: usize) -> Option<Vec<i64>> {
        members
            .iter()
            .map(|&m| self.statement(m).and_then(|s| s.dims.get(dim)).and_then(QuasiAffine::as_constant))
            .collect()
    }

    fn uniform_constant(&self, members: &[StmtId], dim: usize) -> Option<bool> {
        self.constants_at(members, dim)
            .map(|values| values.windows(2).all(|w| w[0] == w[1]))
    }

    /// Nested structure of the whole schedule.
    pub fn layout(&self) -> Layout {
        self.layout_from(self.statement_ids(), 0)
    }

    fn layout_from(&self, members: Vec<StmtId>, start: usize) -> Layout {
        let len = self.len();
        let mut d = start;
        while d < len {
            match self.constants_at(&members, d) {
                Some(values) if values.windows(2).all(|w| w[0] == w[1]) => d += 1,
                Some(values) => return self.split(members, &values, d),
                None => break,
            }
        }
        if d == len {
            return match members.as_slice() {
                [single] => Layout::Leaf(*single),
                _ => Layout::Split {
                    dim: len,
                    children: members.iter().map(|&m| Layout::Leaf(m)).collect(),
                },
            };
        }

        // Members disagreeing on the role share a plain loop band.
        let role = self.common_role(&members, d).unwrap_or(DimRole::Loop);
        let mut dims = vec![d];
        let mut next = d + 1;
        while next < len {
            match self.uniform_constant(&members, next) {
                Some(true) => next += 1,
                Some(false) => break,
                None if self.common_role(&members, next) == Some(role) => {
                    dims.push(next);
                    next += 1;
                }
                None => break,
            }
        }
        let child = self.layout_from(members.clone(), next);
        Layout::Band { dims, role, members, child: Box::new(child) }
    }

    fn split(&self, members: Vec<StmtId>, values: &[i64], dim: usize) -> Layout {
        let mut groups: BTreeMap<i64, Vec<StmtId>> = BTreeMap::new();
        for (&m, &v) in members.iter().zip(values) {
            groups.entry(v).or_default().push(m);
        }
        let children = groups
            .into_values()
            .map(|group| self.layout_from(group, dim + 1))
            .collect();
        Layout::Split { dim, children }
    }

    /// Band annotation covering exactly `dims` for `members`.
    pub fn band_mark(&self, members: &[StmtId], dims: &[usize]) -> Option<&BandMark> {
        self.bands.iter().find(|b| b.members == members && b.dims == dims)
    }

    /// Split annotation at `dim` for `members`.
    pub fn split_mark(&self, members: &[StmtId], dim: usize) -> Option<&SplitMark> {
        self.splits.iter().find(|s| s.members == members && s.dim == dim)
    }

    /// Parallel flag per timestamp dimension. A dimension is parallel when
    /// it belongs to some band and every band containing it marks it so.
    pub fn parallel_dims(&self) -> Vec<bool> {
        (0..self.len())
            .map(|d| {
                let flags: Vec<bool> = self
                    .bands
                    .iter()
                    .filter_map(|b| b.dims.iter().position(|&x| x == d).map(|k| b.parallel[k]))
                    .collect();
                !flags.is_empty() && flags.iter().all(|&p| p)
            })
            .collect()
    }

    /// Whether timestamp dimension `dim` is marked parallel.
    pub fn is_parallel(&self, dim: usize) -> bool {
        self.parallel_dims().get(dim).copied().unwrap_or(false)
    }

    /// Drop band and split annotations.
    pub fn clear_marks(&mut self) {
        self.bands.clear();
        self.splits.clear();
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.statements {
            let dims: Vec<String> = s
                .dims
                .iter()
                .map(|e| e.to_string_with_names(&s.iterators, &self.param_names))
                .collect();
            writeln!(f, "{}[{}] -> [{}]", s.name, s.iterators.join(", "), dims.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pir::{RegionDescriptor, StatementDecl};

    fn two_nests() -> PolyProgram {
        RegionDescriptor::new("two")
            .statement(
                StatementDecl::new("S0", "{ S0[i, j] : 0 <= i < 4 and 0 <= j < 4 }")
                    .write("C", "{ S0[i, j] -> C[i, j] }"),
            )
            .statement(
                StatementDecl::new("S1", "{ S1[i, j] : 0 <= i < 4 and 0 <= j < 4 }")
                    .read("C", "{ S1[i, j] -> C[i, j] }")
                    .read("A", "{ S1[i, j] -> A[i, j] }")
                    .write("C", "{ S1[i, j] -> C[i, j] }"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_identity_roles() {
        let program = two_nests();
        let schedule = Schedule::identity(&program);
        assert_eq!(schedule.len(), 5);
        assert_eq!(
            schedule.statements[1].roles,
            vec![DimRole::Sequence, DimRole::Loop, DimRole::Sequence, DimRole::Loop, DimRole::Sequence]
        );
        assert_eq!(schedule.role(StmtId(0), 3), Some(DimRole::Loop));
        assert_eq!(schedule.tile_size(StmtId(0), 3), None);
        assert!(schedule.covers(&program));
        assert_eq!(schedule.timestamp(StmtId(1), &[2, 3], &[]), Some(vec![0, 2, 0, 3, 1]));
    }

    #[test]
    fn test_layout_shares_loops() {
        let schedule = Schedule::identity(&two_nests());
        let Layout::Band { dims, role, child, .. } = schedule.layout() else {
            panic!("expected a band");
        };
        assert_eq!(dims, vec![1, 3]);
        assert_eq!(role, DimRole::Loop);
        let Layout::Split { dim, children } = *child else {
            panic!("expected a split");
        };
        assert_eq!(dim, 4);
        assert_eq!(children, vec![Layout::Leaf(StmtId(0)), Layout::Leaf(StmtId(1))]);
    }

    #[test]
    fn test_execution_order() {
        let program = two_nests();
        let order = Schedule::identity(&program).execution_order(&program, &[], 100).unwrap();
        assert_eq!(order.len(), 32);
        assert_eq!(order[0], (StmtId(0), vec![0, 0]));
        assert_eq!(order[1], (StmtId(1), vec![0, 0]));
        assert_eq!(order[2], (StmtId(0), vec![0, 1]));
    }

    #[test]
    fn test_covers_rejects_missing_statement() {
        let program = two_nests();
        let mut schedule = Schedule::identity(&program);
        schedule.statements.pop();
        assert!(!schedule.covers(&program));
    }

    #[test]
    fn test_display() {
        let text = Schedule::identity(&two_nests()).to_string();
        assert!(text.contains("S0[i, j] -> [0, i, 0, j, 0]"));
    }
}

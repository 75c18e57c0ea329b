//! Exact legality, parallelism and tilability tests for schedules.
//!
//! Every test lowers a dependence piece together with the source and target
//! timestamps into one integer system over `(source dims, target dims,
//! params, locals)`. Floor and mod terms become integer locals `q` with
//! `T*q <= e <= T*q + T - 1`.

use crate::analysis::dependence::{Dependence, DependenceKind, DependenceSet};
use crate::ir::pir::StmtId;
use crate::polyhedral::expr::QuasiAffine;
use crate::polyhedral::omega::{LinearSystem, Row};
use crate::polyhedral::operations::{place_expr, row_sub};
use crate::polyhedral::set::IntegerSet;
use crate::transform::schedule::{BandMark, Layout, Schedule, SplitMark};
use log::debug;
use std::collections::BTreeMap;
use std::fmt;

/// A dependence the schedule does not respect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Source statement
    pub source: StmtId,
    /// Target statement
    pub target: StmtId,
    /// Kind of the violated dependence
    pub kind: DependenceKind,
    /// Array of the violated dependence
    pub array: String,
    /// First timestamp dimension where some source runs after its target;
    /// `None` when they share a timestamp
    pub dim: Option<usize>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} [{}] on {}", self.source, self.target, self.kind.short_name(), self.array)?;
        match self.dim {
            Some(d) => write!(f, " reversed at dim {}", d),
            None => write!(f, " at equal timestamps"),
        }
    }
}

/// One dependence piece with both timestamps lowered to rows.
struct Lowered {
    sys: LinearSystem,
    src: Vec<Row>,
    tgt: Vec<Row>,
}

impl Lowered {
    fn new(piece: &IntegerSet, src_dim: usize, src: &[QuasiAffine], tgt: &[QuasiAffine]) -> Self {
        let n_dim = piece.dim();
        let mut sys = piece.to_system();
        let src = src.iter().map(|e| lower(&mut sys, e, 0, n_dim)).collect();
        let tgt = tgt.iter().map(|e| lower(&mut sys, e, src_dim, n_dim)).collect();
        Self { sys, src, tgt }
    }

    /// The system restricted to equal timestamps on dims `..upto`, or
    /// `None` when a constant difference already rules that out.
    fn equal_prefix(&self, upto: usize) -> Option<LinearSystem> {
        let mut sys = self.sys.clone();
        for (a, b) in self.src.iter().zip(&self.tgt).take(upto) {
            let diff = row_sub(a, b);
            match constant_row(&diff) {
                Some(0) => {}
                Some(_) => return None,
                None => sys.add_eq(diff),
            }
        }
        Some(sys)
    }

    /// Whether `tgt[dim] - src[dim]` can take a value in the half-line
    /// `>= 1` (`positive`) or `<= -1` on `sys`.
    fn can_differ(sys: &LinearSystem, src: &Row, tgt: &Row, positive: bool) -> bool {
        let mut diff = if positive { row_sub(tgt, src) } else { row_sub(src, tgt) };
        if let Some(c) = constant_row(&diff) {
            return c >= 1 && sys.is_feasible();
        }
        diff[0] -= 1;
        let mut ahead = sys.clone();
        ahead.add_ge(diff);
        ahead.is_feasible()
    }
}

/// Lower `expr` into a row of `sys`, adding locals for floor and mod.
fn lower(sys: &mut LinearSystem, expr: &QuasiAffine, dim_offset: usize, param_offset: usize) -> Row {
    match expr {
        QuasiAffine::Affine(e) => place_expr(e, dim_offset, param_offset, sys.n_var()),
        QuasiAffine::FloorDiv(inner, d) => {
            let e = lower(sys, inner, dim_offset, param_offset);
            quotient(sys, e, *d)
        }
        QuasiAffine::Mod(inner, d) => {
            let e = lower(sys, inner, dim_offset, param_offset);
            let q = quotient(sys, e.clone(), *d);
            let scaled: Row = q.iter().map(|c| c * *d as i128).collect();
            let mut row = row_sub(&e, &scaled);
            row.resize(sys.n_var() + 1, 0);
            row
        }
    }
}

/// Fresh local `q = floor(e / d)`, returned as a row.
fn quotient(sys: &mut LinearSystem, mut e: Row, d: i64) -> Row {
    let d = d as i128;
    let q = sys.add_var();
    e.resize(sys.n_var() + 1, 0);
    // e - d*q >= 0
    let mut lower = e.clone();
    lower[q + 1] -= d;
    // d*q + d - 1 - e >= 0
    let mut upper: Row = e.iter().map(|c| -c).collect();
    upper[q + 1] += d;
    upper[0] += d - 1;
    sys.add_ge(lower);
    sys.add_ge(upper);
    let mut row = sys.zero_row();
    row[q + 1] = 1;
    row
}

fn constant_row(row: &Row) -> Option<i128> {
    row.iter().skip(1).all(|&c| c == 0).then(|| row.first().copied().unwrap_or(0))
}

/// Pieces of `base` where `lhs` is lexicographically later than or equal to
/// `rhs`, tagged with the first later dimension (`None` for all-equal).
fn later_or_equal(base: &LinearSystem, lhs: &[Row], rhs: &[Row]) -> Vec<(Option<usize>, LinearSystem)> {
    let mut pieces = Vec::new();
    let mut prefix = base.clone();
    for (k, (a, b)) in lhs.iter().zip(rhs).enumerate() {
        let diff = row_sub(a, b);
        match constant_row(&diff) {
            Some(c) if c > 0 => {
                pieces.push((Some(k), prefix));
                return pieces;
            }
            Some(c) if c < 0 => return pieces,
            Some(_) => continue,
            None => {
                let mut piece = prefix.clone();
                let mut strict = diff.clone();
                strict[0] -= 1;
                piece.add_ge(strict);
                pieces.push((Some(k), piece));
                prefix.add_eq(diff);
            }
        }
    }
    pieces.push((None, prefix));
    pieces
}

fn violation(dep: &Dependence, dim: Option<usize>) -> Violation {
    Violation {
        source: dep.source,
        target: dep.target,
        kind: dep.kind,
        array: dep.array.clone(),
        dim,
    }
}

fn scan(schedule: &Schedule, deps: &DependenceSet, first_only: bool) -> Vec<Violation> {
    let mut found = Vec::new();
    for dep in deps.iter() {
        let (Some(src), Some(tgt)) = (schedule.statement(dep.source), schedule.statement(dep.target)) else {
            found.push(violation(dep, None));
            if first_only {
                return found;
            }
            continue;
        };
        // Dependence relations never hold same-instance pairs, so the
        // all-equal piece is a violation whenever it is non-empty.
        let reversed = dep.relation.pieces().iter().find_map(|piece| {
            let lowered = Lowered::new(piece, dep.relation.src_dim, &src.dims, &tgt.dims);
            later_or_equal(&lowered.sys, &lowered.src, &lowered.tgt)
                .into_iter()
                .find(|(_, sys)| sys.is_feasible())
                .map(|(dim, _)| dim)
        });
        if let Some(dim) = reversed {
            found.push(violation(dep, dim));
            if first_only {
                return found;
            }
        }
    }
    found
}

/// Every dependence not respected by `schedule`, one entry per dependence.
pub fn violations(schedule: &Schedule, deps: &DependenceSet) -> Vec<Violation> {
    scan(schedule, deps, false)
}

/// Whether every dependence source runs strictly before its target.
pub fn is_legal(schedule: &Schedule, deps: &DependenceSet) -> bool {
    match scan(schedule, deps, true).first() {
        Some(v) => {
            debug!("schedule violates {}", v);
            false
        }
        None => true,
    }
}

fn within<'a>(deps: &'a DependenceSet, members: &'a [StmtId]) -> impl Iterator<Item = &'a Dependence> {
    deps.iter()
        .filter(move |d| members.contains(&d.source) && members.contains(&d.target))
}

/// Whether dimension `dim` is parallel for `members`: no dependence between
/// them has equal timestamps on all outer dimensions and different values
/// on `dim`.
pub fn is_parallel(schedule: &Schedule, deps: &DependenceSet, members: &[StmtId], dim: usize) -> bool {
    for dep in within(deps, members) {
        let (Some(src), Some(tgt)) = (schedule.statement(dep.source), schedule.statement(dep.target)) else {
            return false;
        };
        for piece in dep.relation.pieces() {
            let lowered = Lowered::new(piece, dep.relation.src_dim, &src.dims, &tgt.dims);
            let Some(sys) = lowered.equal_prefix(dim) else { continue };
            let (s, t) = (&lowered.src[dim], &lowered.tgt[dim]);
            if Lowered::can_differ(&sys, s, t, true) || Lowered::can_differ(&sys, s, t, false) {
                return false;
            }
        }
    }
    true
}

/// Whether the groups below a split at `dim` are mutually independent: no
/// dependence connects two different groups with equal timestamps on the
/// dimensions before `dim`.
pub fn groups_independent(schedule: &Schedule, deps: &DependenceSet, groups: &[Vec<StmtId>], dim: usize) -> bool {
    let group_of: BTreeMap<StmtId, usize> = groups
        .iter()
        .enumerate()
        .flat_map(|(g, members)| members.iter().map(move |&m| (m, g)))
        .collect();
    for dep in deps.iter() {
        let (Some(a), Some(b)) = (group_of.get(&dep.source), group_of.get(&dep.target)) else {
            continue;
        };
        if a == b {
            continue;
        }
        let (Some(src), Some(tgt)) = (schedule.statement(dep.source), schedule.statement(dep.target)) else {
            return false;
        };
        for piece in dep.relation.pieces() {
            let lowered = Lowered::new(piece, dep.relation.src_dim, &src.dims, &tgt.dims);
            if lowered.equal_prefix(dim).is_some_and(|sys| sys.is_feasible()) {
                return false;
            }
        }
    }
    true
}

/// Tilability flag per dimension of a band starting at `dims[0]`.
///
/// A dimension is tilable when no dependence between `members` left
/// uncarried by the dimensions before the band has a negative component on
/// it. The leading run of `true` flags may be tiled together.
pub fn tilable_dims(schedule: &Schedule, deps: &DependenceSet, members: &[StmtId], dims: &[usize]) -> Vec<bool> {
    let mut flags = vec![true; dims.len()];
    let Some(&start) = dims.first() else { return flags };
    for dep in within(deps, members) {
        let (Some(src), Some(tgt)) = (schedule.statement(dep.source), schedule.statement(dep.target)) else {
            return vec![false; dims.len()];
        };
        for piece in dep.relation.pieces() {
            let lowered = Lowered::new(piece, dep.relation.src_dim, &src.dims, &tgt.dims);
            let Some(sys) = lowered.equal_prefix(start) else { continue };
            for (flag, &d) in flags.iter_mut().zip(dims) {
                if *flag && Lowered::can_differ(&sys, &lowered.src[d], &lowered.tgt[d], false) {
                    *flag = false;
                }
            }
        }
    }
    flags
}

/// Fill in the band and split annotations of a final schedule.
pub fn annotate(schedule: &mut Schedule, deps: &DependenceSet, mark_parallel: bool) {
    let mut bands = Vec::new();
    let mut splits = Vec::new();
    collect_marks(schedule, deps, mark_parallel, &schedule.layout(), &mut bands, &mut splits);
    schedule.bands = bands;
    schedule.splits = splits;
}

fn collect_marks(
    schedule: &Schedule,
    deps: &DependenceSet,
    mark_parallel: bool,
    node: &Layout,
    bands: &mut Vec<BandMark>,
    splits: &mut Vec<SplitMark>,
) {
    match node {
        Layout::Band { dims, members, child, .. } => {
            let parallel = dims
                .iter()
                .map(|&d| mark_parallel && is_parallel(schedule, deps, members, d))
                .collect();
            bands.push(BandMark { members: members.clone(), dims: dims.clone(), parallel });
            collect_marks(schedule, deps, mark_parallel, child, bands, splits);
        }
        Layout::Split { dim, children } => {
            let groups: Vec<Vec<StmtId>> = children.iter().map(Layout::members).collect();
            splits.push(SplitMark {
                members: groups.concat(),
                dim: *dim,
                independent: groups_independent(schedule, deps, &groups, *dim),
            });
            for child in children {
                collect_marks(schedule, deps, mark_parallel, child, bands, splits);
            }
        }
        Layout::Leaf(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dependence::compute_dependences;
    use crate::ir::pir::{PolyProgram, RegionDescriptor, StatementDecl};
    use crate::polyhedral::expr::AffineExpr;

    fn recurrence() -> PolyProgram {
        RegionDescriptor::new("prefix_sum")
            .statement(
                StatementDecl::new("S", "{ S[i] : 0 < i < 10 }")
                    .read("A", "{ S[i] -> A[i - 1] }")
                    .write("A", "{ S[i] -> A[i] }"),
            )
            .build()
            .unwrap()
    }

    fn independent_pair() -> PolyProgram {
        RegionDescriptor::new("pair")
            .statement(StatementDecl::new("S0", "{ S0[i] : 0 <= i < 8 }").write("A", "{ S0[i] -> A[i] }"))
            .statement(StatementDecl::new("S1", "{ S1[i] : 0 <= i < 8 }").write("B", "{ S1[i] -> B[i] }"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_identity_is_legal() {
        let program = recurrence();
        let deps = compute_dependences(&program).unwrap();
        assert!(is_legal(&Schedule::identity(&program), &deps));
    }

    #[test]
    fn test_reversal_is_illegal() {
        let program = recurrence();
        let deps = compute_dependences(&program).unwrap();
        let mut schedule = Schedule::identity(&program);
        schedule.statements[0].dims[1] = QuasiAffine::from(-AffineExpr::var(0, 1, 0));
        let found = violations(&schedule, &deps);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dim, Some(1));
        assert!(!is_legal(&schedule, &deps));
    }

    #[test]
    fn test_collapsed_loop_is_illegal() {
        let program = recurrence();
        let deps = compute_dependences(&program).unwrap();
        let mut schedule = Schedule::identity(&program);
        schedule.statements[0].dims[1] = QuasiAffine::constant(0, 1, 0);
        let found = violations(&schedule, &deps);
        assert_eq!(found[0].dim, None);
    }

    #[test]
    fn test_floor_lowering() {
        let program = recurrence();
        let deps = compute_dependences(&program).unwrap();
        let mut schedule = Schedule::identity(&program);
        // floor(i/2) alone merges i = 2k and 2k+1 into one timestamp
        schedule.statements[0].dims[1] = QuasiAffine::from(AffineExpr::var(0, 1, 0)).floor_div(2);
        assert!(!is_legal(&schedule, &deps));
        schedule.statements[0].dims[2] = QuasiAffine::from(AffineExpr::var(0, 1, 0)).modulo(2);
        assert!(is_legal(&schedule, &deps));
    }

    #[test]
    fn test_recurrence_not_parallel() {
        let program = recurrence();
        let deps = compute_dependences(&program).unwrap();
        let schedule = Schedule::identity(&program);
        assert!(!is_parallel(&schedule, &deps, &[StmtId(0)], 1));
        assert_eq!(tilable_dims(&schedule, &deps, &[StmtId(0)], &[1]), vec![true]);
    }

    #[test]
    fn test_independent_statements() {
        let program = independent_pair();
        let deps = compute_dependences(&program).unwrap();
        assert!(deps.is_empty());
        let mut schedule = Schedule::identity(&program);
        assert!(is_parallel(&schedule, &deps, &[StmtId(0), StmtId(1)], 1));
        annotate(&mut schedule, &deps, true);
        assert_eq!(schedule.splits.len(), 1);
        assert!(schedule.splits[0].independent);
        assert_eq!(schedule.parallel_dims(), vec![false, true, false]);
    }

    #[test]
    fn test_annotate_without_parallel_marking() {
        let program = independent_pair();
        let deps = compute_dependences(&program).unwrap();
        let mut schedule = Schedule::identity(&program);
        annotate(&mut schedule, &deps, false);
        assert!(schedule.bands.iter().all(|b| b.parallel.iter().all(|&p| !p)));
    }
}

//! Dependence analysis for polyhedral programs.
//!
//! Dependences are computed exactly over the integers:
//! - Candidate pairs: both instances in their domains, the same array
//!   element, the source strictly before the target in the original schedule
//! - Last-write / next-write filtering: a pair is dropped when another write
//!   to the element executes strictly between source and target
//! - Distance bounds and direction vectors over the common loops
//! - RAW/WAR/WAW classification

use crate::ir::pir::{AccessKind, AccessRelation, PolyProgram, PolyStmt, StmtId};
use crate::polyhedral::constraint::Constraint;
use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::omega::Extremum;
use crate::polyhedral::operations::{self, lex_precedes};
use crate::polyhedral::set::{IntegerSet, UnionSet};
use crate::polyhedral::space::Space;
use crate::utils::errors::DependenceError;
use log::debug;
use serde::{Serialize, Deserialize};
use std::collections::BTreeSet;
use std::fmt;

/// A data dependence between two statements.
#[derive(Debug, Clone)]
pub struct Dependence {
    /// Source statement
    pub source: StmtId,
    /// Target statement
    pub target: StmtId,
    /// Kind of dependence
    pub kind: DependenceKind,
    /// Array involved in this dependence
    pub array: String,
    /// Dependence polyhedra (pairs of iterations with dependence)
    pub relation: DependenceRelation,
    /// Distance bounds per common loop
    pub bounds: Vec<DistanceBound>,
    /// Distance vector (if uniform)
    pub distance: Option<Vec<i64>>,
    /// Direction vector
    pub direction: Vec<Direction>,
    /// Outermost loop (by depth) that carries some pair
    pub level: Option<usize>,
    /// Whether every pair is ordered by textual position alone
    pub is_loop_independent: bool,
}

impl Dependence {
    /// Check a specific (source, target) pair.
    pub fn contains(&self, src_point: &[i64], tgt_point: &[i64], params: &[i64]) -> bool {
        self.relation.contains(src_point, tgt_point, params)
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        let dir_str: String = self.direction.iter().map(|d| d.to_char()).collect();
        format!(
            "{} -> {} [{}] on {} dir=<{}>",
            self.source,
            self.target,
            self.kind.short_name(),
            self.array,
            dir_str
        )
    }

    /// Serializable record for downstream consumers.
    pub fn summary(&self) -> DependenceSummary {
        DependenceSummary {
            kind: self.kind,
            source: self.source,
            target: self.target,
            array: self.array.clone(),
            level: self.level,
            is_loop_independent: self.is_loop_independent,
            distance: self.distance.clone(),
            direction: self.direction.clone(),
            bounds: self.bounds.clone(),
        }
    }
}

/// Kind of data dependence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DependenceKind {
    /// Read-after-write (true/flow dependence)
    Flow,
    /// Write-after-read (anti dependence)
    Anti,
    /// Write-after-write (output dependence)
    Output,
}

impl DependenceKind {
    /// Kind of the dependence from `src` to `tgt`, if any.
    pub fn classify(src: &AccessRelation, tgt: &AccessRelation) -> Option<DependenceKind> {
        match (src.kind, tgt.kind) {
            (AccessKind::Write, AccessKind::Read) => Some(DependenceKind::Flow),
            (AccessKind::Read, AccessKind::Write) => Some(DependenceKind::Anti),
            (AccessKind::Write, AccessKind::Write) => Some(DependenceKind::Output),
            (AccessKind::Read, AccessKind::Read) => None,
        }
    }

    /// Get short name for the dependence kind.
    pub fn short_name(&self) -> &'static str {
        match self {
            DependenceKind::Flow => "RAW",
            DependenceKind::Anti => "WAR",
            DependenceKind::Output => "WAW",
        }
    }
}

impl fmt::Display for DependenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Direction of a dependence in one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// < (forward dependence, positive distance)
    Lt,
    /// = (same iteration, zero distance)
    Eq,
    /// > (backward dependence, negative distance)
    Gt,
    /// <= (forward or same)
    Le,
    /// >= (backward or same)
    Ge,
    /// * (unknown/any direction)
    Star,
}

impl Direction {
    /// Get the character representation.
    pub fn to_char(&self) -> char {
        match self {
            Direction::Lt => '<',
            Direction::Eq => '=',
            Direction::Gt => '>',
            Direction::Le => '≤',
            Direction::Ge => '≥',
            Direction::Star => '*',
        }
    }

    /// Combine two directions (union).
    pub fn union(&self, other: &Direction) -> Direction {
        if self == other {
            return *self;
        }
        match (self, other) {
            (Direction::Lt, Direction::Eq) | (Direction::Eq, Direction::Lt) => Direction::Le,
            (Direction::Gt, Direction::Eq) | (Direction::Eq, Direction::Gt) => Direction::Ge,
            (Direction::Le, Direction::Lt | Direction::Eq) | (Direction::Lt | Direction::Eq, Direction::Le) => {
                Direction::Le
            }
            (Direction::Ge, Direction::Gt | Direction::Eq) | (Direction::Gt | Direction::Eq, Direction::Ge) => {
                Direction::Ge
            }
            _ => Direction::Star,
        }
    }

    /// Compute direction from a distance value.
    pub fn from_distance(dist: i64) -> Direction {
        match dist.cmp(&0) {
            std::cmp::Ordering::Less => Direction::Gt,
            std::cmp::Ordering::Equal => Direction::Eq,
            std::cmp::Ordering::Greater => Direction::Lt,
        }
    }

    /// Direction implied by distance bounds.
    pub fn from_bound(bound: &DistanceBound) -> Direction {
        match (bound.min, bound.max) {
            (Some(0), Some(0)) => Direction::Eq,
            (Some(lo), _) if lo > 0 => Direction::Lt,
            (_, Some(hi)) if hi < 0 => Direction::Gt,
            (Some(0), _) => Direction::Le,
            (_, Some(0)) => Direction::Ge,
            _ => Direction::Star,
        }
    }
}

/// Exact bounds of `target - source` along one loop; `None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceBound {
    /// Smallest distance
    pub min: Option<i64>,
    /// Largest distance
    pub max: Option<i64>,
}

impl DistanceBound {
    /// The distance, if it is the same for every pair.
    pub fn as_constant(&self) -> Option<i64> {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) if lo == hi => Some(lo),
            _ => None,
        }
    }
}

/// A dependence relation between iterations.
///
/// The pairs are a union of convex sets over `(source dims, target dims)`
/// and the model parameters.
#[derive(Debug, Clone)]
pub struct DependenceRelation {
    /// Number of source dimensions
    pub src_dim: usize,
    /// Number of target dimensions
    pub tgt_dim: usize,
    /// Number of parameters
    pub n_param: usize,
    /// The set of (source_iter, target_iter) pairs where dependence exists
    pub pairs: UnionSet,
}

impl DependenceRelation {
    /// Create an empty dependence relation.
    pub fn empty(space: Space, src_dim: usize) -> Self {
        Self {
            src_dim,
            tgt_dim: space.n_dim - src_dim,
            n_param: space.n_param,
            pairs: UnionSet::empty(space),
        }
    }

    /// Check if the relation is empty (no dependence).
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Convex pieces over `(source dims, target dims)`.
    pub fn pieces(&self) -> &[IntegerSet] {
        self.pairs.pieces()
    }

    /// Check if a specific (source, target) pair is in the relation.
    pub fn contains(&self, src_point: &[i64], tgt_point: &[i64], params: &[i64]) -> bool {
        let mut combined = src_point.to_vec();
        combined.extend_from_slice(tgt_point);
        self.pairs.contains(&combined, params)
    }

    /// All distinct pairs for fixed parameters, ordered by source then target.
    ///
    /// Returns `None` if there are more than `limit` pairs.
    pub fn points(&self, params: &[i64], limit: usize) -> Option<Vec<(Vec<i64>, Vec<i64>)>> {
        let points = self.pairs.points(params, limit)?;
        Some(
            points
                .into_iter()
                .map(|mut p| {
                    let tgt = p.split_off(self.src_dim);
                    (p, tgt)
                })
                .collect(),
        )
    }

    /// Source instances with some dependent target.
    pub fn sources(&self) -> UnionSet {
        self.project(self.src_dim, self.tgt_dim, self.src_dim)
    }

    /// Target instances with some source.
    pub fn targets(&self) -> UnionSet {
        self.project(0, self.src_dim, self.tgt_dim)
    }

    fn project(&self, first: usize, n: usize, remaining: usize) -> UnionSet {
        let space = Space::set_with_params(remaining, self.n_param)
            .with_param_names(self.pairs.space.param_names.clone());
        let mut projected = UnionSet::empty(space);
        for piece in self.pieces() {
            for p in operations::project_out(piece, first, n).pieces() {
                projected.push(p.clone());
            }
        }
        projected
    }

    /// Bounds of `target[tgt_k] - source[src_k]` over all pairs.
    pub fn distance_bound(&self, src_k: usize, tgt_k: usize) -> DistanceBound {
        let mut min: Option<i64> = None;
        let mut max: Option<i64> = None;
        let mut unbounded_below = false;
        let mut unbounded_above = false;
        for piece in self.pieces() {
            let sys = piece.to_system();
            let mut objective = sys.zero_row();
            objective[1 + self.src_dim + tgt_k] += 1;
            objective[1 + src_k] -= 1;
            match sys.minimum(&objective) {
                Extremum::Empty => continue,
                Extremum::Unbounded => unbounded_below = true,
                Extremum::Value(v) => match i64::try_from(v) {
                    Ok(v) => min = Some(min.map_or(v, |m| m.min(v))),
                    Err(_) => unbounded_below = true,
                },
            }
            match sys.maximum(&objective) {
                Extremum::Empty => {}
                Extremum::Unbounded => unbounded_above = true,
                Extremum::Value(v) => match i64::try_from(v) {
                    Ok(v) => max = Some(max.map_or(v, |m| m.max(v))),
                    Err(_) => unbounded_above = true,
                },
            }
        }
        DistanceBound {
            min: if unbounded_below { None } else { min },
            max: if unbounded_above { None } else { max },
        }
    }
}

/// Serializable per-dependence record for the lowering stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependenceSummary {
    /// Kind of dependence
    pub kind: DependenceKind,
    /// Source statement
    pub source: StmtId,
    /// Target statement
    pub target: StmtId,
    /// Array involved
    pub array: String,
    /// Outermost carrying loop
    pub level: Option<usize>,
    /// Whether the dependence is carried by no loop
    pub is_loop_independent: bool,
    /// Constant distance vector, if uniform
    pub distance: Option<Vec<i64>>,
    /// Direction per common loop
    pub direction: Vec<Direction>,
    /// Distance bounds per common loop
    pub bounds: Vec<DistanceBound>,
}

/// All dependences of a program.
#[derive(Debug, Clone, Default)]
pub struct DependenceSet {
    deps: Vec<Dependence>,
}

impl DependenceSet {
    /// A set of already computed dependences.
    pub fn new(deps: Vec<Dependence>) -> Self {
        Self { deps }
    }

    /// Every dependence, in discovery order.
    pub fn all(&self) -> &[Dependence] {
        &self.deps
    }

    /// Iterate over the dependences.
    pub fn iter(&self) -> impl Iterator<Item = &Dependence> {
        self.deps.iter()
    }

    /// Number of dependences.
    pub fn len(&self) -> usize {
        self.deps.len()
    }

    /// Whether there is no dependence.
    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Dependences of one kind.
    pub fn of_kind(&self, kind: DependenceKind) -> Vec<&Dependence> {
        self.deps.iter().filter(|d| d.kind == kind).collect()
    }

    /// Read-after-write dependences.
    pub fn raw(&self) -> Vec<&Dependence> {
        self.of_kind(DependenceKind::Flow)
    }

    /// Write-after-write dependences.
    pub fn waw(&self) -> Vec<&Dependence> {
        self.of_kind(DependenceKind::Output)
    }

    /// Write-after-read dependences.
    pub fn war(&self) -> Vec<&Dependence> {
        self.of_kind(DependenceKind::Anti)
    }

    /// Dependences from `source` to `target`.
    pub fn between(&self, source: StmtId, target: StmtId) -> Vec<&Dependence> {
        self.deps
            .iter()
            .filter(|d| d.source == source && d.target == target)
            .collect()
    }

    /// Serializable records of every dependence.
    pub fn summaries(&self) -> Vec<DependenceSummary> {
        self.deps.iter().map(|d| d.summary()).collect()
    }
}

impl fmt::Display for DependenceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dependences ({}):", self.deps.len())?;
        for dep in &self.deps {
            writeln!(f, "  {}", dep.description())?;
        }
        Ok(())
    }
}

/// Dependence pieces collected for one (kind, source, target, array).
struct Collected {
    source: StmtId,
    target: StmtId,
    kind: DependenceKind,
    array: String,
    pieces: Vec<IntegerSet>,
    /// Original timestamp positions at which pieces are ordered
    positions: BTreeSet<usize>,
}

/// Dependence analyzer.
#[derive(Debug, Clone)]
pub struct DependenceAnalysis {
    /// Apply last-write / next-write filtering
    pub filter_kills: bool,
}

impl Default for DependenceAnalysis {
    fn default() -> Self { Self::new() }
}

impl DependenceAnalysis {
    /// Create a new dependence analyzer.
    pub fn new() -> Self {
        Self { filter_kills: true }
    }

    /// Keep every ordered pair on the same element instead of only the
    /// nearest ones (memory-based dependences).
    pub fn with_kill_filtering(mut self, enabled: bool) -> Self {
        self.filter_kills = enabled;
        self
    }

    /// Analyze all dependences in a program.
    pub fn analyze(&self, program: &PolyProgram) -> Result<DependenceSet, DependenceError> {
        check_bounded(program)?;
        let len = program.schedule_len();
        let mut collected: Vec<Collected> = Vec::new();

        for src in &program.statements {
            for tgt in &program.statements {
                for src_access in &src.accesses {
                    for tgt_access in &tgt.accesses {
                        if src_access.array != tgt_access.array {
                            continue;
                        }
                        let Some(kind) = DependenceKind::classify(src_access, tgt_access) else {
                            continue;
                        };
                        let pieces = self.pair_pieces(program, src, tgt, src_access, tgt_access, len);
                        if pieces.is_empty() {
                            continue;
                        }
                        let entry = match collected.iter().position(|c| {
                            c.kind == kind && c.source == src.id && c.target == tgt.id && c.array == src_access.array
                        }) {
                            Some(idx) => &mut collected[idx],
                            None => {
                                collected.push(Collected {
                                    source: src.id,
                                    target: tgt.id,
                                    kind,
                                    array: src_access.array.clone(),
                                    pieces: Vec::new(),
                                    positions: BTreeSet::new(),
                                });
                                let last = collected.len() - 1;
                                &mut collected[last]
                            }
                        };
                        for (position, piece) in pieces {
                            entry.positions.insert(position);
                            entry.pieces.push(piece);
                        }
                    }
                }
            }
        }

        let deps: Vec<Dependence> = collected
            .into_iter()
            .filter_map(|c| finish(program, c))
            .collect();
        let set = DependenceSet::new(deps);
        debug!(
            "{} dependences ({} RAW, {} WAW, {} WAR)",
            set.len(),
            set.raw().len(),
            set.waw().len(),
            set.war().len()
        );
        Ok(set)
    }

    /// Non-empty dependence pieces for one access pair, tagged with the
    /// original timestamp position that orders them.
    fn pair_pieces(
        &self,
        program: &PolyProgram,
        src: &PolyStmt,
        tgt: &PolyStmt,
        src_access: &AccessRelation,
        tgt_access: &AccessRelation,
        len: usize,
    ) -> Vec<(usize, IntegerSet)> {
        let (ds, dt, np) = (src.depth(), tgt.depth(), program.n_param());
        let n = ds + dt;
        let space = src.domain.space.product(&tgt.domain.space);
        let Some(same_element) = src_access.relation.same_element(&tgt_access.relation) else {
            return Vec::new();
        };
        let theta_s = embed_all(&src.original_schedule(len, np), 0, n);
        let theta_t = embed_all(&tgt.original_schedule(len, np), ds, n);

        let mut result = Vec::new();
        for sp in src.domain.pieces() {
            for tp in tgt.domain.pieces() {
                let mut base = IntegerSet::universe(space.clone());
                for c in &sp.constraints.constraints {
                    base.add_constraint(c.embed(0, n));
                }
                for c in &tp.constraints.constraints {
                    base.add_constraint(c.embed(ds, n));
                }
                for c in same_element.iter().cloned().chain(program.context_constraints(n)) {
                    base.add_constraint(c);
                }
                if base.is_empty() {
                    continue;
                }
                for (position, candidate) in lex_precedes(&base, &theta_s, &theta_t) {
                    if candidate.is_empty() {
                        continue;
                    }
                    let remaining = if self.filter_kills {
                        let kills = kill_pieces(program, &candidate, src, tgt, src_access, tgt_access, len);
                        UnionSet::from(candidate).subtract(&UnionSet::from_pieces(space.clone(), kills))
                    } else {
                        UnionSet::from(candidate)
                    };
                    for piece in remaining.simplify().pieces() {
                        result.push((position, piece.clone()));
                    }
                }
            }
        }
        result
    }
}

/// Pairs of `candidate` with a write to the target's element strictly
/// between source and target.
///
/// A read happens before the writes of its own instance, so for an anti
/// dependence the source instance's own write to the element is a kill too.
fn kill_pieces(
    program: &PolyProgram,
    candidate: &IntegerSet,
    src: &PolyStmt,
    tgt: &PolyStmt,
    src_access: &AccessRelation,
    tgt_access: &AccessRelation,
    len: usize,
) -> Vec<IntegerSet> {
    let (ds, np) = (src.depth(), program.n_param());
    let n = candidate.dim();
    let mut kills = Vec::new();

    if !src_access.is_write() && tgt_access.is_write() {
        let element = embed_all(&tgt_access.relation.outputs, ds, n);
        for write in src.writes().filter(|w| w.array == tgt_access.array) {
            let mut own = candidate.clone();
            for (a, b) in embed_all(&write.relation.outputs, 0, n).iter().zip(&element) {
                own.add_constraint(Constraint::eq(a.clone(), b.clone()));
            }
            if !own.is_empty() {
                kills.push(own);
            }
        }
    }

    for writer in &program.statements {
        let du = writer.depth();
        let total = n + du;
        let space = candidate.space.product(&writer.domain.space);
        let theta_s = embed_all(&src.original_schedule(len, np), 0, total);
        let theta_t = embed_all(&tgt.original_schedule(len, np), ds, total);
        let theta_w = embed_all(&writer.original_schedule(len, np), n, total);
        let element = embed_all(&tgt_access.relation.outputs, ds, total);

        for write in writer.writes().filter(|w| w.array == tgt_access.array) {
            let written = embed_all(&write.relation.outputs, n, total);
            for wp in writer.domain.pieces() {
                let mut base = IntegerSet::universe(space.clone());
                for c in &candidate.constraints.constraints {
                    base.add_constraint(c.embed(0, total));
                }
                for c in &wp.constraints.constraints {
                    base.add_constraint(c.embed(n, total));
                }
                for (a, b) in written.iter().zip(&element) {
                    base.add_constraint(Constraint::eq(a.clone(), b.clone()));
                }
                if base.is_empty() {
                    continue;
                }
                for (_, after_source) in lex_precedes(&base, &theta_s, &theta_w) {
                    for (_, between) in lex_precedes(&after_source, &theta_w, &theta_t) {
                        if between.is_empty() {
                            continue;
                        }
                        let kill = operations::project_out(&between, n, du);
                        kills.extend(kill.pieces().iter().cloned());
                    }
                }
            }
        }
    }
    kills
}

fn embed_all(exprs: &[AffineExpr], offset: usize, n_dim: usize) -> Vec<AffineExpr> {
    exprs.iter().map(|e| e.embed(offset, n_dim)).collect()
}

/// Number of loops enclosing both statements.
fn common_loops(src: &PolyStmt, tgt: &PolyStmt) -> usize {
    let max = src.depth().min(tgt.depth());
    (0..max)
        .take_while(|&k| src.position.get(k) == tgt.position.get(k))
        .count()
}

fn finish(program: &PolyProgram, collected: Collected) -> Option<Dependence> {
    let src = program.get_stmt(collected.source)?;
    let tgt = program.get_stmt(collected.target)?;
    let space = src.domain.space.product(&tgt.domain.space);
    let relation = DependenceRelation {
        src_dim: src.depth(),
        tgt_dim: tgt.depth(),
        n_param: program.n_param(),
        pairs: UnionSet::from_pieces(space, collected.pieces),
    };

    let bounds: Vec<DistanceBound> = (0..common_loops(src, tgt))
        .map(|k| relation.distance_bound(k, k))
        .collect();
    let distance = bounds.iter().map(|b| b.as_constant()).collect::<Option<Vec<_>>>();
    let direction = bounds.iter().map(Direction::from_bound).collect();

    // Odd timestamp positions are loop iterators, even ones textual positions.
    let level = collected.positions.iter().find(|p| *p % 2 == 1).map(|p| (p - 1) / 2);

    Some(Dependence {
        source: collected.source,
        target: collected.target,
        kind: collected.kind,
        array: collected.array,
        relation,
        bounds,
        distance,
        direction,
        level,
        is_loop_independent: level.is_none(),
    })
}

/// Reject accessing statements whose domain is unbounded in some iterator.
fn check_bounded(program: &PolyProgram) -> Result<(), DependenceError> {
    for stmt in program.statements.iter().filter(|s| !s.accesses.is_empty()) {
        let domain = program.bounded_domain(stmt);
        for piece in domain.pieces().iter().filter(|p| !p.is_empty()) {
            let sys = piece.to_system();
            for v in 0..stmt.depth() {
                let others: Vec<usize> = (0..stmt.depth()).filter(|&o| o != v).collect();
                if !sys.is_bounded(v, &others) {
                    return Err(DependenceError::UnboundedDomain {
                        statement: stmt.name.clone(),
                        iterator: stmt.iterators.get(v).cloned().unwrap_or_else(|| format!("d{}", v)),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Analyze all dependences of a program with last-write filtering.
pub fn compute_dependences(program: &PolyProgram) -> Result<DependenceSet, DependenceError> {
    DependenceAnalysis::new().analyze(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pir::{RegionDescriptor, StatementDecl};
    use std::collections::BTreeMap;

    fn init_accumulate() -> PolyProgram {
        RegionDescriptor::new("init_accumulate")
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

    fn reduction() -> PolyProgram {
        RegionDescriptor::new("row_sum")
            .statement(StatementDecl::new("S0", "{ S0[i] : 0 <= i < 4 }").write("C", "{ S0[i] -> C[i] }"))
            .statement(
                StatementDecl::new("S1", "{ S1[i, k] : 0 <= i < 4 and 0 <= k < 3 }")
                    .read("C", "{ S1[i, k] -> C[i] }")
                    .read("A", "{ S1[i, k] -> A[i, k] }")
                    .write("C", "{ S1[i, k] -> C[i] }"),
            )
            .build()
            .unwrap()
    }

    fn matmul() -> PolyProgram {
        RegionDescriptor::new("matmul")
            .param("N")
            .statement(
                StatementDecl::new("S0", "[N] -> { S0[i, j] : 0 <= i < N and 0 <= j < N }")
                    .write("C", "[N] -> { S0[i, j] -> C[i, j] }")
                    .at(vec![0, 0, 0]),
            )
            .statement(
                StatementDecl::new("S1", "[N] -> { S1[i, j, k] : 0 <= i < N and 0 <= j < N and 0 <= k < N }")
                    .read("C", "[N] -> { S1[i, j, k] -> C[i, j] }")
                    .read("A", "[N] -> { S1[i, j, k] -> A[i, k] }")
                    .read("B", "[N] -> { S1[i, j, k] -> B[k, j] }")
                    .write("C", "[N] -> { S1[i, j, k] -> C[i, j] }")
                    .at(vec![0, 0, 1, 0]),
            )
            .build()
            .unwrap()
    }

    fn scalar_sum() -> PolyProgram {
        RegionDescriptor::new("scalar_sum")
            .statement(
                StatementDecl::new("S0", "{ S0[i] : 0 <= i < 6 }")
                    .read("Acc", "{ S0[i] -> Acc[0] }")
                    .read("A", "{ S0[i] -> A[i] }")
                    .write("Acc", "{ S0[i] -> Acc[0] }")
                    .at(vec![0, 0]),
            )
            .statement(
                StatementDecl::new("S1", "{ S1[i] : 0 <= i < 1 }")
                    .read("Acc", "{ S1[i] -> Acc[0] }")
                    .write("Out", "{ S1[i] -> Out[i] }")
                    .at(vec![1, 0]),
            )
            .build()
            .unwrap()
    }

    fn strided_overwrite() -> PolyProgram {
        RegionDescriptor::new("strided_overwrite")
            .statement(StatementDecl::new("S0", "{ S0[i] : 0 <= i < 10 }").write("A", "{ S0[i] -> A[i] }").at(vec![0, 0]))
            .statement(StatementDecl::new("S1", "{ S1[i] : 0 <= i < 10 }").read("A", "{ S1[i] -> A[i] }").at(vec![1, 0]))
            .statement(StatementDecl::new("S2", "{ S2[i] : 0 <= i < 5 }").write("A", "{ S2[i] -> A[2 * i] }").at(vec![2, 0]))
            .statement(StatementDecl::new("S3", "{ S3[i] : 0 <= i < 10 }").read("A", "{ S3[i] -> A[i] }").at(vec![3, 0]))
            .build()
            .unwrap()
    }

    fn split_stencil() -> PolyProgram {
        RegionDescriptor::new("split_stencil")
            .statement(
                StatementDecl::new("S0", "{ S0[i] : 0 <= i < 3 or 6 <= i < 9 }")
                    .write("A", "{ S0[i] -> A[i] }")
                    .at(vec![0, 0]),
            )
            .statement(
                StatementDecl::new("S1", "{ S1[i] : 1 <= i < 8 }")
                    .read("A", "{ S1[i] -> A[i - 1] }")
                    .read("A", "{ S1[i] -> A[i + 1] }")
                    .write("A", "{ S1[i] -> A[i] }")
                    .at(vec![1, 0]),
            )
            .build()
            .unwrap()
    }

    fn triangular() -> PolyProgram {
        RegionDescriptor::new("triangular")
            .statement(
                StatementDecl::new("S", "{ S[i, j] : 0 <= i < 5 and 0 <= j <= i }")
                    .read("A", "{ S[i, j] -> A[j] }")
                    .write("A", "{ S[i, j] -> A[i - j] }"),
            )
            .build()
            .unwrap()
    }

    type Instance = (StmtId, Vec<i64>);
    type Pair = (DependenceKind, Instance, Instance);

    /// Run the program in its original order, each instance reading before
    /// it writes, and record the nearest conflicting pair on every element.
    fn replay(program: &PolyProgram, params: &[i64]) -> BTreeSet<Pair> {
        let len = program.schedule_len();
        let mut order = Vec::new();
        for stmt in &program.statements {
            let schedule = stmt.original_schedule(len, program.n_param());
            for point in stmt.domain.points(params, 10_000).unwrap() {
                let stamp: Vec<i64> = schedule.iter().map(|e| e.evaluate(&point, params)).collect();
                order.push((stamp, stmt.id, point));
            }
        }
        order.sort();

        let mut last_write: BTreeMap<(String, Vec<i64>), Instance> = BTreeMap::new();
        let mut readers: BTreeMap<(String, Vec<i64>), Vec<Instance>> = BTreeMap::new();
        let mut pairs = BTreeSet::new();
        for (_, id, point) in order {
            let stmt = program.get_stmt(id).unwrap();
            let me = (id, point.clone());
            for read in stmt.reads() {
                let element = (read.array.clone(), read.relation.apply(&point, params));
                if let Some(writer) = last_write.get(&element) {
                    pairs.insert((DependenceKind::Flow, writer.clone(), me.clone()));
                }
                let seen = readers.entry(element).or_default();
                if !seen.contains(&me) {
                    seen.push(me.clone());
                }
            }
            for write in stmt.writes() {
                let element = (write.array.clone(), write.relation.apply(&point, params));
                if let Some(writer) = last_write.get(&element).filter(|w| **w != me) {
                    pairs.insert((DependenceKind::Output, writer.clone(), me.clone()));
                }
                for reader in readers.remove(&element).unwrap_or_default() {
                    if reader != me {
                        pairs.insert((DependenceKind::Anti, reader, me.clone()));
                    }
                }
                last_write.insert(element, me.clone());
            }
        }
        pairs
    }

    fn analyzed(program: &PolyProgram, params: &[i64]) -> BTreeSet<Pair> {
        let deps = compute_dependences(program).unwrap();
        let mut pairs = BTreeSet::new();
        for dep in deps.iter() {
            for (s, t) in dep.relation.points(params, 100_000).unwrap() {
                pairs.insert((dep.kind, (dep.source, s), (dep.target, t)));
            }
        }
        pairs
    }

    fn pair_count(deps: &[&Dependence]) -> usize {
        deps.iter().map(|d| d.relation.points(&[], 10_000).unwrap().len()).sum()
    }

    #[test]
    fn test_direction_from_distance() {
        assert_eq!(Direction::from_distance(1), Direction::Lt);
        assert_eq!(Direction::from_distance(0), Direction::Eq);
        assert_eq!(Direction::from_distance(-1), Direction::Gt);
    }

    #[test]
    fn test_direction_union() {
        assert_eq!(Direction::Lt.union(&Direction::Eq), Direction::Le);
        assert_eq!(Direction::Le.union(&Direction::Lt), Direction::Le);
        assert_eq!(Direction::Lt.union(&Direction::Gt), Direction::Star);
    }

    #[test]
    fn test_direction_from_bound() {
        let b = |min, max| DistanceBound { min, max };
        assert_eq!(Direction::from_bound(&b(Some(1), None)), Direction::Lt);
        assert_eq!(Direction::from_bound(&b(Some(0), Some(3))), Direction::Le);
        assert_eq!(Direction::from_bound(&b(None, Some(-2))), Direction::Gt);
        assert_eq!(Direction::from_bound(&b(Some(-1), Some(1))), Direction::Star);
    }

    #[test]
    fn test_dependence_kind() {
        assert_eq!(DependenceKind::Flow.short_name(), "RAW");
        assert_eq!(DependenceKind::Anti.short_name(), "WAR");
        assert_eq!(DependenceKind::Output.to_string(), "WAW");
    }

    #[test]
    fn test_init_accumulate() {
        let program = init_accumulate();
        let deps = compute_dependences(&program).unwrap();
        let raw = deps.raw();
        assert_eq!(raw.len(), 1);
        assert_eq!(pair_count(&raw), 16);
        let dep = raw[0];
        assert_eq!((dep.source, dep.target), (StmtId(0), StmtId(1)));
        for (s, t) in dep.relation.points(&[], 100).unwrap() {
            assert_eq!(s, t);
        }
        assert_eq!(dep.distance, Some(vec![0, 0]));
        assert_eq!(dep.direction, vec![Direction::Eq, Direction::Eq]);
        assert!(dep.is_loop_independent);
        assert_eq!(dep.level, None);

        assert_eq!(pair_count(&deps.waw()), 16);
        assert!(deps.war().is_empty());
    }

    #[test]
    fn test_recurrence() {
        let program = recurrence();
        let deps = compute_dependences(&program).unwrap();
        let raw = deps.raw();
        assert_eq!(raw.len(), 1);
        assert_eq!(pair_count(&raw), 8);
        assert!(raw[0].contains(&[1], &[2], &[]));
        assert!(!raw[0].contains(&[1], &[3], &[]));
        assert_eq!(raw[0].distance, Some(vec![1]));
        assert_eq!(raw[0].direction, vec![Direction::Lt]);
        assert_eq!(raw[0].level, Some(0));
        assert!(deps.waw().is_empty());
        assert!(deps.war().is_empty());
    }

    #[test]
    fn test_last_write_filtering() {
        let program = reduction();
        let deps = compute_dependences(&program).unwrap();
        let raw = deps.raw();
        assert_eq!(pair_count(&raw), 12);

        // Exactly one last write per read instance.
        let mut targets = BTreeSet::new();
        for dep in &raw {
            for (_, t) in dep.relation.points(&[], 100).unwrap() {
                assert!(targets.insert((dep.target, t)), "read has two last writes");
            }
        }
        let from_init = deps.between(StmtId(0), StmtId(1));
        let init_raw: Vec<_> = from_init.iter().filter(|d| d.kind == DependenceKind::Flow).collect();
        assert_eq!(init_raw.len(), 1);
        assert!(init_raw[0].contains(&[2], &[2, 0], &[]));
        assert!(!init_raw[0].contains(&[2], &[2, 1], &[]));

        let all_pairs = DependenceAnalysis::new()
            .with_kill_filtering(false)
            .analyze(&program)
            .unwrap();
        assert_eq!(pair_count(&all_pairs.raw()), 24);
        assert_eq!(pair_count(&deps.waw()), 12);
    }

    #[test]
    fn test_unbounded_domain() {
        let program = RegionDescriptor::new("open")
            .statement(StatementDecl::new("S", "{ S[i] : i >= 0 }").write("A", "{ S[i] -> A[i] }"))
            .build()
            .unwrap();
        let err = compute_dependences(&program).unwrap_err();
        assert_eq!(
            err,
            DependenceError::UnboundedDomain {
                statement: "S".to_string(),
                iterator: "i".to_string()
            }
        );
    }

    #[test]
    fn test_parametric_relation() {
        let program = RegionDescriptor::new("shift")
            .param("N")
            .statement(
                StatementDecl::new("S", "[N] -> { S[i] : 0 <= i < N }")
                    .read("A", "[N] -> { S[i] -> A[i + 2] }")
                    .write("A", "[N] -> { S[i] -> A[i] }"),
            )
            .build()
            .unwrap();
        let deps = compute_dependences(&program).unwrap();
        let war = deps.war();
        assert_eq!(war.len(), 1);
        assert!(war[0].contains(&[0], &[2], &[10]));
        assert!(!war[0].contains(&[8], &[10], &[10]));
        assert_eq!(war[0].distance, Some(vec![2]));
        assert_eq!(war[0].relation.points(&[10], 100).unwrap().len(), 8);

        let sources = war[0].relation.sources();
        assert!(sources.contains(&[7], &[10]));
        assert!(!sources.contains(&[8], &[10]));
        assert!(deps.raw().is_empty());
    }

    #[test]
    fn test_summaries() {
        let deps = compute_dependences(&recurrence()).unwrap();
        let summaries = deps.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].kind, DependenceKind::Flow);
        assert_eq!(summaries[0].bounds, vec![DistanceBound { min: Some(1), max: Some(1) }]);
        assert!(deps.to_string().contains("S0 -> S0 [RAW] on A dir=<<>"));
    }

    #[test]
    fn test_pairs_match_replayed_execution() {
        let cases = [
            (matmul(), vec![3]),
            (scalar_sum(), vec![]),
            (strided_overwrite(), vec![]),
            (split_stencil(), vec![]),
            (triangular(), vec![]),
            (reduction(), vec![]),
        ];
        for (program, params) in cases {
            let expected = replay(&program, &params);
            let actual = analyzed(&program, &params);
            let missing: Vec<_> = expected.difference(&actual).collect();
            let extra: Vec<_> = actual.difference(&expected).collect();
            assert!(
                missing.is_empty() && extra.is_empty(),
                "{}: missing {:?}, extra {:?}",
                program.name,
                missing,
                extra
            );
        }
    }

    #[test]
    fn test_read_is_killed_by_own_write() {
        let deps = compute_dependences(&reduction()).unwrap();
        assert!(deps.war().is_empty());

        let deps = compute_dependences(&scalar_sum()).unwrap();
        assert!(deps.war().is_empty());
        assert_eq!(pair_count(&deps.waw()), 5);
    }

    #[test]
    fn test_strided_write_kills_even_elements() {
        let deps = compute_dependences(&strided_overwrite()).unwrap();
        let flow = deps.between(StmtId(0), StmtId(3));
        let flow: Vec<_> = flow.iter().filter(|d| d.kind == DependenceKind::Flow).collect();
        assert_eq!(flow.len(), 1);
        let targets: BTreeSet<i64> = flow[0].relation.points(&[], 100).unwrap().into_iter().map(|(_, t)| t[0]).collect();
        assert_eq!(targets, BTreeSet::from([1, 3, 5, 7, 9]));
        assert!(flow[0].contains(&[3], &[3], &[]));
        assert!(!flow[0].contains(&[4], &[4], &[]));
    }
}

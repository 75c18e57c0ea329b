//! Polyhedral Intermediate Representation (PIR).
//!
//! The PIR represents one affine region in polyhedral form:
//! - Statements with iteration domains
//! - Access relations for memory references
//! - Textual positions (the β vectors of the 2d+1 original schedule)
//! - Parameters with optional known bounds
//!
//! A [`PolyProgram`] is built once from a [`RegionDescriptor`] and is
//! immutable afterwards.

use crate::frontend::parser::{parse_map, parse_set};
use crate::polyhedral::{AffineExpr, AffineMap, Constraint, IntegerSet, Space, UnionSet};
use crate::utils::errors::{ModelError, ParseError};
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet};

/// A unique identifier for PIR statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StmtId(pub u64);

impl StmtId {
    /// Identifier with the given index.
    pub fn new(id: u64) -> Self { Self(id) }

    /// Position of the statement in the program.
    pub fn index(&self) -> usize { self.0 as usize }
}

impl std::fmt::Display for StmtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// A symbolic integer constant of the region, with optional known bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Known lower bound (inclusive)
    #[serde(default)]
    pub lower: Option<i64>,
    /// Known upper bound (inclusive)
    #[serde(default)]
    pub upper: Option<i64>,
}

impl Parameter {
    /// Unbounded parameter.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), lower: None, upper: None }
    }

    /// Set the inclusive lower bound.
    pub fn at_least(mut self, lower: i64) -> Self {
        self.lower = Some(lower);
        self
    }

    /// Set the inclusive upper bound.
    pub fn at_most(mut self, upper: i64) -> Self {
        self.upper = Some(upper);
        self
    }
}

/// A complete polyhedral program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyProgram {
    /// Name of the region
    pub name: String,
    /// Symbolic parameters (N, M, K, etc.)
    pub parameters: Vec<Parameter>,
    /// Statements in textual order
    pub statements: Vec<PolyStmt>,
    /// Arrays used in the program
    pub arrays: Vec<ArrayInfo>,
    /// Context constraints from the parameter bounds, over zero dimensions
    pub context: IntegerSet,
}

impl PolyProgram {
    /// Number of parameters.
    pub fn n_param(&self) -> usize {
        self.parameters.len()
    }

    /// Parameter names in declaration order.
    pub fn param_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Get a statement by ID.
    pub fn get_stmt(&self, id: StmtId) -> Option<&PolyStmt> {
        self.statements.iter().find(|s| s.id == id)
    }

    /// Get a statement by name.
    pub fn stmt_by_name(&self, name: &str) -> Option<&PolyStmt> {
        self.statements.iter().find(|s| s.name == name)
    }

    /// Deepest loop nest of the region.
    pub fn max_depth(&self) -> usize {
        self.statements.iter().map(|s| s.depth()).max().unwrap_or(0)
    }

    /// Length of the original 2d+1 timestamp shared by every statement.
    pub fn schedule_len(&self) -> usize {
        2 * self.max_depth() + 1
    }

    /// Context constraints re-embedded over `n_dim` leading dimensions.
    pub fn context_constraints(&self, n_dim: usize) -> Vec<Constraint> {
        self.context
            .constraints
            .constraints
            .iter()
            .map(|c| c.embed(0, n_dim))
            .collect()
    }

    /// Domain of a statement intersected with the parameter context.
    pub fn bounded_domain(&self, stmt: &PolyStmt) -> UnionSet {
        let mut context = IntegerSet::universe(stmt.domain.space.clone());
        for c in self.context_constraints(stmt.depth()) {
            context.add_constraint(c);
        }
        stmt.domain.intersect_set(&context)
    }
}

/// Information about an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayInfo {
    /// Array name
    pub name: String,
    /// Number of dimensions, as implied by the access relations
    pub rank: usize,
}

/// A polyhedral statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyStmt {
    /// Unique identifier
    pub id: StmtId,
    /// Human-readable name
    pub name: String,
    /// Loop iterator names, outermost first
    pub iterators: Vec<String>,
    /// Iteration domain: { S[i,j,...] : constraints }
    pub domain: UnionSet,
    /// Memory accesses in textual order
    pub accesses: Vec<AccessRelation>,
    /// Textual position β, of length depth + 1
    pub position: Vec<i64>,
}

impl PolyStmt {
    /// Get the dimensionality of the iteration space.
    pub fn depth(&self) -> usize {
        self.domain.dim()
    }

    /// Read accesses.
    pub fn reads(&self) -> impl Iterator<Item = &AccessRelation> {
        self.accesses.iter().filter(|a| a.kind == AccessKind::Read)
    }

    /// Write accesses.
    pub fn writes(&self) -> impl Iterator<Item = &AccessRelation> {
        self.accesses.iter().filter(|a| a.kind == AccessKind::Write)
    }

    /// Check if this statement has any writes to the given array.
    pub fn writes_to(&self, array: &str) -> bool {
        self.writes().any(|a| a.array == array)
    }

    /// The original 2d+1 timestamp `(β0, i0, β1, i1, .., βd)`, zero-padded to `len`.
    ///
    /// Expressions range over the statement's dimensions and `n_param` parameters.
    pub fn original_schedule(&self, len: usize, n_param: usize) -> Vec<AffineExpr> {
        let d = self.depth();
        let mut dims = Vec::with_capacity(len.max(2 * d + 1));
        for k in 0..=d {
            dims.push(AffineExpr::constant(self.position.get(k).copied().unwrap_or(0), d, n_param));
            if k < d {
                dims.push(AffineExpr::var(k, d, n_param));
            }
        }
        while dims.len() < len {
            dims.push(AffineExpr::zero(d, n_param));
        }
        dims
    }
}

/// An access relation maps iteration points to memory locations.
/// { S[i,j] -> A[i, j+1] } means at iteration (i,j), we access A[i,j+1].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRelation {
    /// Array being accessed
    pub array: String,
    /// The access map: domain -> array indices
    pub relation: AffineMap,
    /// Access type (read or write)
    pub kind: AccessKind,
}

impl AccessRelation {
    /// Create a new access relation.
    pub fn new(array: String, relation: AffineMap, kind: AccessKind) -> Self {
        Self { array, relation, kind }
    }

    /// Whether this access writes memory.
    pub fn is_write(&self) -> bool {
        self.kind == AccessKind::Write
    }
}

/// Kind of memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    /// Load from memory
    Read,
    /// Store to memory
    Write,
}

/// One memory reference of a statement, in notation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecl {
    /// Array identifier
    pub array: String,
    /// Access relation, e.g. `[N] -> { S[i] -> A[i - 1] }`
    pub relation: String,
    /// Read or write
    pub kind: AccessKind,
}

/// One statement of a region descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementDecl {
    /// Unique statement name
    pub name: String,
    /// Declared nesting depth; checked against the domain tuple
    #[serde(default)]
    pub depth: Option<usize>,
    /// Iteration domain, e.g. `[N] -> { S[i] : 0 <= i < N }`
    pub domain: String,
    /// Memory references in textual order
    #[serde(default)]
    pub accesses: Vec<AccessDecl>,
    /// Explicit textual position; derived from statement order when absent
    #[serde(default)]
    pub position: Option<Vec<i64>>,
}

impl StatementDecl {
    /// Statement over `domain` with no accesses and a derived position.
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depth: None,
            domain: domain.into(),
            accesses: Vec::new(),
            position: None,
        }
    }

    /// Append a read access.
    pub fn read(self, array: impl Into<String>, relation: impl Into<String>) -> Self {
        self.access(array, relation, AccessKind::Read)
    }

    /// Append a write access.
    pub fn write(self, array: impl Into<String>, relation: impl Into<String>) -> Self {
        self.access(array, relation, AccessKind::Write)
    }

    /// Append an access of the given kind.
    pub fn access(mut self, array: impl Into<String>, relation: impl Into<String>, kind: AccessKind) -> Self {
        self.accesses.push(AccessDecl {
            array: array.into(),
            relation: relation.into(),
            kind,
        });
        self
    }

    /// Declare the nesting depth.
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Place the statement at an explicit textual position.
    pub fn at(mut self, position: Vec<i64>) -> Self {
        self.position = Some(position);
        self
    }
}

/// A region as handed over by the region detection stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    /// Region name
    pub name: String,
    /// Parameters with optional bounds
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Statements in textual order
    pub statements: Vec<StatementDecl>,
}

impl RegionDescriptor {
    /// Empty region.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an unbounded parameter.
    pub fn param(self, name: impl Into<String>) -> Self {
        self.parameter(Parameter::new(name))
    }

    /// Add a parameter, possibly bounded.
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Append a statement in textual order.
    pub fn statement(mut self, statement: StatementDecl) -> Self {
        self.statements.push(statement);
        self
    }

    /// Validate the descriptor and freeze it into a model.
    pub fn build(&self) -> Result<PolyProgram, ModelError> {
        let param_names: Vec<String> = self.parameters.iter().map(|p| p.name.clone()).collect();
        let n_param = param_names.len();

        let mut seen = BTreeSet::new();
        let mut ranks: BTreeMap<String, usize> = BTreeMap::new();
        let mut statements: Vec<PolyStmt> = Vec::with_capacity(self.statements.len());

        for (index, decl) in self.statements.iter().enumerate() {
            if !seen.insert(decl.name.clone()) {
                return Err(ModelError::DuplicateStatement(decl.name.clone()));
            }

            let domain = parse_set(&decl.domain, &param_names)
                .map_err(|e| notation_error(&decl.name, "domain", e))?;
            if domain.n_param() != n_param {
                return Err(ModelError::NonAffineDomain {
                    statement: decl.name.clone(),
                    reason: "domain refers to undeclared parameters".to_string(),
                });
            }
            let depth = domain.dim();
            if let Some(declared) = decl.depth {
                if declared != depth {
                    return Err(ModelError::DimensionMismatch {
                        statement: decl.name.clone(),
                        what: "domain".to_string(),
                        expected: declared,
                        found: depth,
                    });
                }
            }

            let mut accesses = Vec::with_capacity(decl.accesses.len());
            for access in &decl.accesses {
                let what = format!("access to {}", access.array);
                let relation = parse_map(&access.relation, &param_names)
                    .map_err(|e| notation_error(&decl.name, &what, e))?;
                if relation.n_in() != depth {
                    return Err(ModelError::DimensionMismatch {
                        statement: decl.name.clone(),
                        what,
                        expected: depth,
                        found: relation.n_in(),
                    });
                }
                if relation.n_param() != n_param {
                    return Err(ModelError::NonAffineDomain {
                        statement: decl.name.clone(),
                        reason: format!("{} refers to undeclared parameters", what),
                    });
                }
                let rank = *ranks.entry(access.array.clone()).or_insert(relation.n_out());
                if rank != relation.n_out() {
                    return Err(ModelError::ArrayRankMismatch {
                        array: access.array.clone(),
                        expected: rank,
                        found: relation.n_out(),
                    });
                }
                accesses.push(AccessRelation::new(access.array.clone(), relation, access.kind));
            }

            let position = match &decl.position {
                Some(position) if position.len() != depth + 1 => {
                    return Err(ModelError::InvalidPosition {
                        statement: decl.name.clone(),
                        expected: depth + 1,
                        found: position.len(),
                    });
                }
                Some(position) => position.clone(),
                None => default_position(statements.last(), depth),
            };

            statements.push(PolyStmt {
                id: StmtId(index as u64),
                name: decl.name.clone(),
                iterators: domain.space.all_dim_names(),
                domain,
                accesses,
                position,
            });
        }

        let context = parameter_context(&self.parameters, &param_names);
        let arrays = ranks.into_iter().map(|(name, rank)| ArrayInfo { name, rank }).collect();

        Ok(PolyProgram {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            statements,
            arrays,
            context,
        })
    }
}

fn notation_error(statement: &str, what: &str, error: ParseError) -> ModelError {
    if error.is_non_affine() {
        ModelError::NonAffineDomain {
            statement: statement.to_string(),
            reason: format!("{}: {}", what, error.message),
        }
    } else {
        ModelError::Parse {
            statement: statement.to_string(),
            source: error,
        }
    }
}

/// Position after `prev`: share as many loops as both depths allow, then
/// step to the next slot at the first unshared level.
fn default_position(prev: Option<&PolyStmt>, depth: usize) -> Vec<i64> {
    let mut position = vec![0; depth + 1];
    if let Some(prev) = prev {
        let shared = depth.min(prev.depth());
        position[..shared].copy_from_slice(&prev.position[..shared]);
        position[shared] = prev.position.get(shared).copied().unwrap_or(0) + 1;
    }
    position
}

fn parameter_context(parameters: &[Parameter], names: &[String]) -> IntegerSet {
    let n_param = parameters.len();
    let space = Space::set_with_params(0, n_param).with_param_names(names.to_vec());
    let mut context = IntegerSet::universe(space);
    for (j, p) in parameters.iter().enumerate() {
        if let Some(lower) = p.lower {
            let mut expr = AffineExpr::param(j, 0, n_param);
            expr.constant = -lower;
            context.add_constraint(Constraint::ge_zero(expr));
        }
        if let Some(upper) = p.upper {
            let mut expr = -AffineExpr::param(j, 0, n_param);
            expr.constant = upper;
            context.add_constraint(Constraint::ge_zero(expr));
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matmul_init() -> RegionDescriptor {
        RegionDescriptor::new("init")
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
    }

    #[test]
    fn test_stmt_id() {
        assert_eq!(StmtId::new(0).to_string(), "S0");
        assert_eq!(StmtId::new(3).index(), 3);
    }

    #[test]
    fn test_build_program() {
        let program = matmul_init().build().unwrap();
        assert_eq!(program.statements.len(), 2);
        assert_eq!(program.statements[0].position, vec![0, 0, 0]);
        assert_eq!(program.statements[1].position, vec![0, 0, 1]);
        assert_eq!(program.arrays.len(), 2);
        assert_eq!(program.schedule_len(), 5);
        let s1 = program.stmt_by_name("S1").unwrap();
        assert_eq!(s1.reads().count(), 2);
        assert!(s1.writes_to("C"));
        assert!(!s1.writes_to("A"));
    }

    #[test]
    fn test_original_schedule() {
        let program = matmul_init().build().unwrap();
        let sched = program.statements[1].original_schedule(5, 0);
        let values: Vec<i64> = sched.iter().map(|e| e.evaluate(&[2, 3], &[])).collect();
        assert_eq!(values, vec![0, 2, 0, 3, 1]);
    }

    #[test]
    fn test_default_position_mixed_depth() {
        let program = RegionDescriptor::new("mixed")
            .statement(StatementDecl::new("A", "{ A[i] : 0 <= i < 4 }"))
            .statement(StatementDecl::new("B", "{ B[i, j] : 0 <= i < 4 and 0 <= j < 4 }"))
            .statement(StatementDecl::new("C", "{ C[] }"))
            .build()
            .unwrap();
        assert_eq!(program.statements[0].position, vec![0, 0]);
        assert_eq!(program.statements[1].position, vec![0, 1, 0]);
        assert_eq!(program.statements[2].position, vec![1]);
    }

    #[test]
    fn test_non_affine_domain() {
        let err = RegionDescriptor::new("bad")
            .param("N")
            .statement(StatementDecl::new("S", "[N] -> { S[i] : 0 <= i < N * N }"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::NonAffineDomain { .. }));
    }

    #[test]
    fn test_undeclared_parameter() {
        let err = RegionDescriptor::new("bad")
            .statement(StatementDecl::new("S", "[N] -> { S[i] : 0 <= i < N }"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::NonAffineDomain { .. }));
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = RegionDescriptor::new("bad")
            .statement(
                StatementDecl::new("S", "{ S[i, j] : 0 <= i < 4 and 0 <= j < 4 }")
                    .write("A", "{ S[i] -> A[i] }"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::DimensionMismatch { expected: 2, found: 1, .. }
        ));

        let err = RegionDescriptor::new("bad")
            .statement(StatementDecl::new("S", "{ S[i] : 0 <= i < 4 }").depth(2))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_rank_mismatch_and_duplicates() {
        let err = RegionDescriptor::new("bad")
            .statement(
                StatementDecl::new("S", "{ S[i] : 0 <= i < 4 }")
                    .write("A", "{ S[i] -> A[i] }")
                    .read("A", "{ S[i] -> A[i, i] }"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::ArrayRankMismatch { .. }));

        let err = RegionDescriptor::new("bad")
            .statement(StatementDecl::new("S", "{ S[i] : 0 <= i < 4 }"))
            .statement(StatementDecl::new("S", "{ S[i] : 0 <= i < 4 }"))
            .build()
            .unwrap_err();
        assert_eq!(err, ModelError::DuplicateStatement("S".to_string()));
    }

    #[test]
    fn test_invalid_position_and_parse_error() {
        let err = RegionDescriptor::new("bad")
            .statement(StatementDecl::new("S", "{ S[i] : 0 <= i < 4 }").at(vec![0]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidPosition { expected: 2, found: 1, .. }));

        let err = RegionDescriptor::new("bad")
            .statement(StatementDecl::new("S", "{ S[i] : 0 <= i < 4"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Parse { .. }));

        let err = RegionDescriptor::new("huge")
            .statement(StatementDecl::new("S", "{ S[i] : 0 <= i < 4611686018427387904 * 4 }"))
            .build()
            .unwrap_err();
        let ModelError::Parse { statement, source } = err else {
            panic!("expected a parse error, got {:?}", err);
        };
        assert_eq!(statement, "S");
        assert_eq!(source.kind, crate::utils::errors::ParseErrorKind::Overflow);
    }

    #[test]
    fn test_parameter_context() {
        let program = RegionDescriptor::new("ctx")
            .parameter(Parameter::new("N").at_least(1).at_most(100))
            .statement(StatementDecl::new("S", "[N] -> { S[i] : i >= 0 }"))
            .build()
            .unwrap();
        assert!(program.context.contains(&[], &[1]));
        assert!(!program.context.contains(&[], &[0]));
        assert!(!program.context.contains(&[], &[101]));
        let bounded = program.bounded_domain(&program.statements[0]);
        assert!(bounded.contains(&[500], &[50]));
        assert!(!bounded.contains(&[5], &[0]));
    }
}

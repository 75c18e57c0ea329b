//! Schedule tree nodes.
//!
//! The tree is an owned sum type traversed top-down only:
//! - `Domain` is the root and holds every statement's iteration domain
//! - `Band` schedules one or more timestamp dimensions together
//! - `Sequence` runs its filtered children in order, `Set` in any order
//! - `Filter` restricts the instances reaching its subtree
//! - `Leaf` executes one statement

use crate::ir::pir::StmtId;
use crate::polyhedral::expr::QuasiAffine;
use crate::polyhedral::set::UnionSet;
use crate::transform::schedule::DimRole;
use crate::utils::pretty::{format_list, format_list_with, nested, PrettyPrint};
use pretty::RcDoc;
use std::collections::BTreeMap;
use std::fmt;

/// Instances of one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDomain {
    /// Statement
    pub stmt: StmtId,
    /// Statement name
    pub name: String,
    /// Instance set
    pub domain: UnionSet,
}

/// Partial schedule of one statement within a band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandMember {
    /// Statement
    pub stmt: StmtId,
    /// Statement name
    pub name: String,
    /// Iterator names, used for printing
    pub iterators: Vec<String>,
    /// One expression per band dimension
    pub schedule: Vec<QuasiAffine>,
}

/// A band node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandNode {
    /// Timestamp dimensions of the flat schedule covered by the band
    pub dims: Vec<usize>,
    /// Role shared by the band's dimensions
    pub role: DimRole,
    /// Partial schedules, in statement order
    pub members: Vec<BandMember>,
    /// Whether each dimension is parallel
    pub parallel: Vec<bool>,
    /// Tile sizes (if tiled)
    pub tile_sizes: Vec<Option<i64>>,
    /// Whether the dimensions may be freely interchanged
    pub permutable: bool,
    /// Child
    pub child: Box<ScheduleNode>,
}

impl BandNode {
    /// Number of band dimensions.
    pub fn width(&self) -> usize {
        self.dims.len()
    }

    /// Partial schedule of one statement.
    pub fn member(&self, stmt: StmtId) -> Option<&BandMember> {
        self.members.iter().find(|m| m.stmt == stmt)
    }
}

/// Schedule tree node types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleNode {
    /// Root: all iteration domains
    Domain {
        /// One entry per statement
        domains: Vec<StatementDomain>,
        /// Child
        child: Box<ScheduleNode>,
    },
    /// Loop band (one or more dimensions)
    Band(BandNode),
    /// Sequential execution of filter children
    Sequence(Vec<ScheduleNode>),
    /// Unordered execution of filter children
    Set(Vec<ScheduleNode>),
    /// Filter (subset of the instances)
    Filter {
        /// Instances let through, per statement
        statements: Vec<StatementDomain>,
        /// Child
        child: Box<ScheduleNode>,
    },
    /// Leaf (statement execution)
    Leaf {
        /// Statement
        stmt: StmtId,
        /// Statement name
        name: String,
    },
}

impl ScheduleNode {
    /// Direct children.
    pub fn children(&self) -> Vec<&ScheduleNode> {
        match self {
            ScheduleNode::Domain { child, .. } | ScheduleNode::Filter { child, .. } => vec![child.as_ref()],
            ScheduleNode::Band(band) => vec![band.child.as_ref()],
            ScheduleNode::Sequence(children) | ScheduleNode::Set(children) => children.iter().collect(),
            ScheduleNode::Leaf { .. } => Vec::new(),
        }
    }

    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ScheduleNode)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    fn band_depth(&self) -> usize {
        let below = self.children().into_iter().map(|c| c.band_depth()).max().unwrap_or(0);
        match self {
            ScheduleNode::Band(_) => below + 1,
            _ => below,
        }
    }

    fn collect_instances(
        &self,
        reaching: &BTreeMap<StmtId, UnionSet>,
        out: &mut Vec<(StmtId, Option<UnionSet>)>,
    ) {
        match self {
            ScheduleNode::Domain { domains, child } => {
                let all: BTreeMap<StmtId, UnionSet> = domains.iter().map(|d| (d.stmt, d.domain.clone())).collect();
                child.collect_instances(&all, out);
            }
            ScheduleNode::Filter { statements, child } => {
                let kept: BTreeMap<StmtId, UnionSet> = statements
                    .iter()
                    .filter_map(|f| reaching.get(&f.stmt).map(|set| (f.stmt, set.intersect(&f.domain))))
                    .collect();
                child.collect_instances(&kept, out);
            }
            ScheduleNode::Leaf { stmt, .. } => out.push((*stmt, reaching.get(stmt).cloned())),
            _ => {
                for child in self.children() {
                    child.collect_instances(reaching, out);
                }
            }
        }
    }

    fn doc<'a>(&'a self, params: &'a [String]) -> RcDoc<'a, ()> {
        let children = || self.children().into_iter().map(|c| c.doc(params)).collect::<Vec<_>>();
        let header = match self {
            ScheduleNode::Domain { domains, .. } => {
                format!("domain {}", format_list_with(domains, "; ", |d| d.domain.to_string()))
            }
            ScheduleNode::Band(band) => {
                let members = format_list_with(&band.members, "; ", |m| {
                    let exprs = format_list_with(&m.schedule, ", ", |e| e.to_string_with_names(&m.iterators, params));
                    format!("{} -> [{}]", m.name, exprs)
                });
                let flags = format_list_with(&band.parallel, ", ", |&p| (if p { "parallel" } else { "serial" }).to_string());
                let mut header = format!("band[{}] {} ({})", band.role, members, flags);
                if band.tile_sizes.iter().any(Option::is_some) {
                    let sizes: Vec<i64> = band.tile_sizes.iter().flatten().copied().collect();
                    header.push_str(&format!(" sizes [{}]", format_list(&sizes, ", ")));
                }
                if band.permutable {
                    header.push_str(" permutable");
                }
                header
            }
            ScheduleNode::Sequence(_) => "sequence".to_string(),
            ScheduleNode::Set(_) => "set".to_string(),
            ScheduleNode::Filter { statements, .. } => {
                format!("filter {{{}}}", format_list_with(statements, ", ", |s| s.name.clone()))
            }
            ScheduleNode::Leaf { name, .. } => format!("leaf {}", name),
        };
        nested(RcDoc::text(header), children(), 2)
    }
}

/// A schedule tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTree {
    /// Root node, always a domain node
    pub root: ScheduleNode,
    /// Parameter names, used for printing
    pub param_names: Vec<String>,
}

impl ScheduleTree {
    /// Statements of the leaves, in tree order.
    pub fn leaves(&self) -> Vec<StmtId> {
        let mut leaves = Vec::new();
        self.root.walk(&mut |node| {
            if let ScheduleNode::Leaf { stmt, .. } = node {
                leaves.push(*stmt);
            }
        });
        leaves
    }

    /// Statement names of the leaves, in tree order.
    pub fn statement_order(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.root.walk(&mut |node| {
            if let ScheduleNode::Leaf { name, .. } = node {
                names.push(name.clone());
            }
        });
        names
    }

    /// Band nodes, outermost first.
    pub fn bands(&self) -> Vec<&BandNode> {
        let mut bands = Vec::new();
        self.root.walk(&mut |node| {
            if let ScheduleNode::Band(band) = node {
                bands.push(band);
            }
        });
        bands
    }

    /// Maximum number of nested bands on a root-to-leaf path.
    pub fn depth(&self) -> usize {
        self.root.band_depth()
    }

    /// Instances reaching each leaf: the domain restricted by every filter
    /// on the path. `None` when the leaf's statement is filtered out.
    pub fn leaf_instances(&self) -> Vec<(StmtId, Option<UnionSet>)> {
        let mut out = Vec::new();
        self.root.collect_instances(&BTreeMap::new(), &mut out);
        out
    }
}

impl PrettyPrint for ScheduleTree {
    fn to_doc(&self) -> RcDoc<'_, ()> {
        self.root.doc(&self.param_names)
    }
}

impl fmt::Display for ScheduleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty())
    }
}

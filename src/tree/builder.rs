//! Construction of schedule trees from flat schedules.

use crate::ir::pir::{PolyProgram, StmtId};
use crate::transform::schedule::{DimRole, Layout, Schedule};
use crate::tree::node::{BandMember, BandNode, ScheduleNode, ScheduleTree, StatementDomain};
use crate::utils::errors::TreeError;
use log::debug;

/// Build the schedule tree of `schedule` for `program`.
///
/// Bands, sequences and sets follow the schedule's layout. A split becomes
/// a `Set` only where the schedule's annotations prove the groups
/// independent. Fails with [`TreeError::Incomplete`] when the leaves do not
/// cover every statement instance exactly once.
pub fn build(schedule: &Schedule, program: &PolyProgram) -> Result<ScheduleTree, TreeError> {
    let domains = program
        .statements
        .iter()
        .map(|s| StatementDomain { stmt: s.id, name: s.name.clone(), domain: s.domain.clone() })
        .collect();
    let child = node_for(schedule, program, &schedule.layout())?;
    let tree = ScheduleTree {
        root: ScheduleNode::Domain { domains, child: Box::new(child) },
        param_names: program.param_names(),
    };
    check_complete(&tree, program)?;
    debug!("schedule tree for {}: {} bands, depth {}", program.name, tree.bands().len(), tree.depth());
    Ok(tree)
}

fn incomplete(statement: impl ToString, reason: impl Into<String>) -> TreeError {
    TreeError::Incomplete { statement: statement.to_string(), reason: reason.into() }
}

fn statement_domains(program: &PolyProgram, members: &[StmtId]) -> Result<Vec<StatementDomain>, TreeError> {
    members
        .iter()
        .map(|&m| {
            let stmt = program.get_stmt(m).ok_or_else(|| incomplete(m, "not a statement of the program"))?;
            Ok(StatementDomain { stmt: m, name: stmt.name.clone(), domain: stmt.domain.clone() })
        })
        .collect()
}

fn node_for(schedule: &Schedule, program: &PolyProgram, layout: &Layout) -> Result<ScheduleNode, TreeError> {
    match layout {
        Layout::Band { dims, role, members, child } => {
            let band_members = members
                .iter()
                .map(|&m| {
                    let entry = schedule.statement(m).ok_or_else(|| incomplete(m, "no schedule entry"))?;
                    let partial = dims
                        .iter()
                        .map(|&d| entry.dims.get(d).cloned())
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| incomplete(m, "schedule entry too short"))?;
                    Ok(BandMember {
                        stmt: m,
                        name: entry.name.clone(),
                        iterators: entry.iterators.clone(),
                        schedule: partial,
                    })
                })
                .collect::<Result<Vec<_>, TreeError>>()?;
            let parallel = schedule
                .band_mark(members, dims)
                .map(|mark| mark.parallel.clone())
                .unwrap_or_else(|| vec![false; dims.len()]);
            let tile_sizes = dims
                .iter()
                .map(|&d| members.iter().find_map(|&m| schedule.tile_size(m, d)))
                .collect();
            Ok(ScheduleNode::Band(BandNode {
                dims: dims.clone(),
                role: *role,
                members: band_members,
                parallel,
                tile_sizes,
                permutable: matches!(role, DimRole::Tile | DimRole::Point),
                child: Box::new(node_for(schedule, program, child)?),
            }))
        }
        Layout::Split { dim, children } => {
            let all = layout.members();
            let independent = schedule.split_mark(&all, *dim).is_some_and(|mark| mark.independent);
            let filters = children
                .iter()
                .map(|child| {
                    Ok(ScheduleNode::Filter {
                        statements: statement_domains(program, &child.members())?,
                        child: Box::new(node_for(schedule, program, child)?),
                    })
                })
                .collect::<Result<Vec<_>, TreeError>>()?;
            Ok(if independent { ScheduleNode::Set(filters) } else { ScheduleNode::Sequence(filters) })
        }
        Layout::Leaf(id) => {
            let stmt = program.get_stmt(*id).ok_or_else(|| incomplete(id, "not a statement of the program"))?;
            Ok(ScheduleNode::Leaf { stmt: *id, name: stmt.name.clone() })
        }
    }
}

/// Every statement reaches exactly one leaf, with exactly its domain.
fn check_complete(tree: &ScheduleTree, program: &PolyProgram) -> Result<(), TreeError> {
    let leaves = tree.leaf_instances();
    if let Some((id, _)) = leaves.iter().find(|(id, _)| program.get_stmt(*id).is_none()) {
        return Err(incomplete(id, "leaf for an unknown statement"));
    }
    for stmt in &program.statements {
        let reaching: Vec<_> = leaves.iter().filter(|(id, _)| *id == stmt.id).collect();
        match reaching.as_slice() {
            [] => return Err(incomplete(&stmt.name, "no leaf")),
            [(_, None)] => return Err(incomplete(&stmt.name, "leaf unreachable from the domain")),
            [(_, Some(instances))] => {
                if !instances.is_equal(&stmt.domain) {
                    return Err(incomplete(&stmt.name, "leaf instances differ from the domain"));
                }
            }
            many => return Err(incomplete(&stmt.name, format!("{} leaves", many.len()))),
        }
    }
    Ok(())
}

//! Printing of polyhedral programs and dependence sets.
//!
//! Produces the human-readable report attached to an optimized region.

use crate::analysis::dependence::DependenceSet;
use crate::ir::pir::{AccessKind, PolyProgram, PolyStmt};
use crate::polyhedral::map::AffineMap;
use crate::polyhedral::set::UnionSet;
use crate::utils::pretty::{format_list, format_list_with, CodeFormatter};

/// Pretty printer for polyhedral objects.
pub struct PolyPrinter {
    out: CodeFormatter,
}

impl PolyPrinter {
    /// Create a new printer.
    pub fn new() -> Self {
        Self { out: CodeFormatter::default_indent() }
    }

    /// Get the output.
    pub fn output(&self) -> &str {
        self.out.output()
    }

    /// Take the output.
    pub fn take_output(self) -> String {
        self.out.finish()
    }

    /// Print a statement with its domain and accesses.
    pub fn print_stmt(&mut self, stmt: &PolyStmt) {
        self.out.section(&format!("Statement {}:", stmt.name), |f| {
            f.writeln(&format!("Domain: {}", stmt.domain));
            f.writeln(&format!("Position: [{}]", format_list(&stmt.position, ", ")));
            for access in &stmt.accesses {
                let kind = match access.kind {
                    AccessKind::Read => "read",
                    AccessKind::Write => "write",
                };
                f.writeln(&format!("{} {}: {}", kind, access.array, access.relation));
            }
        });
    }

    /// Print a polyhedral program.
    pub fn print_program(&mut self, program: &PolyProgram) {
        self.out.writeln(&format!("Region: {}", program.name));
        let params = format_list_with(&program.parameters, ", ", |p| match (p.lower, p.upper) {
            (Some(lo), Some(hi)) => format!("{} in {}..={}", p.name, lo, hi),
            (Some(lo), None) => format!("{} >= {}", p.name, lo),
            (None, Some(hi)) => format!("{} <= {}", p.name, hi),
            (None, None) => p.name.clone(),
        });
        self.out.writeln(&format!("Parameters: [{}]", params));
        let arrays = format_list_with(&program.arrays, ", ", |a| format!("{}({}D)", a.name, a.rank));
        self.out.writeln(&format!("Arrays: [{}]", arrays));
        for stmt in &program.statements {
            self.print_stmt(stmt);
        }
    }

    /// Print every dependence, one per line.
    pub fn print_dependences(&mut self, deps: &DependenceSet) {
        self.out.section(&format!("Dependences ({}):", deps.len()), |f| {
            for dep in deps.iter() {
                f.writeln(&dep.description());
            }
        });
    }
}

impl Default for PolyPrinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Print a domain to a string.
pub fn print_domain(set: &UnionSet) -> String {
    set.to_string()
}

/// Print a map to a string.
pub fn print_map(map: &AffineMap) -> String {
    map.to_string()
}

/// Print a polyhedral program to a string.
pub fn print_program(program: &PolyProgram) -> String {
    let mut printer = PolyPrinter::new();
    printer.print_program(program);
    printer.take_output()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::compute_dependences;
    use crate::ir::pir::{Parameter, RegionDescriptor, StatementDecl};

    fn program() -> PolyProgram {
        RegionDescriptor::new("scale")
            .parameter(Parameter::new("N").at_least(1))
            .statement(
                StatementDecl::new("S", "[N] -> { S[i] : 0 <= i < N }")
                    .read("A", "[N] -> { S[i] -> A[i] }")
                    .write("A", "[N] -> { S[i] -> A[i] }"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_print_program() {
        let text = print_program(&program());
        assert!(text.starts_with("Region: scale\n"));
        assert!(text.contains("Parameters: [N >= 1]"));
        assert!(text.contains("Arrays: [A(1D)]"));
        assert!(text.contains("Statement S:\n  Domain: "));
        assert!(text.contains("  write A: "));
    }

    #[test]
    fn test_print_dependences() {
        let program = program();
        let deps = compute_dependences(&program).unwrap();
        let mut printer = PolyPrinter::new();
        printer.print_dependences(&deps);
        assert!(printer.output().starts_with(&format!("Dependences ({}):", deps.len())));
    }
}

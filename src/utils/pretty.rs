//! Pretty printing utilities for schedules and reports.
//!
//! Tree-shaped values implement [`PrettyPrint`] on top of the `pretty`
//! document combinators. Flat, line-oriented reports use [`CodeFormatter`].

use pretty::RcDoc;
use std::fmt;

/// Default line width for pretty printing.
pub const DEFAULT_WIDTH: usize = 80;

/// A pretty-printable value.
pub trait PrettyPrint {
    /// Convert to a pretty document.
    fn to_doc(&self) -> RcDoc<'_, ()>;

    /// Pretty print to a string with the given width.
    fn pretty_print(&self, width: usize) -> String {
        let mut output = String::new();
        // Writing into a String cannot fail.
        let _ = self.to_doc().render_fmt(width, &mut output);
        output
    }

    /// Pretty print with default width.
    fn pretty(&self) -> String {
        self.pretty_print(DEFAULT_WIDTH)
    }
}

/// `header` followed by `children`, each on its own line and indented by
/// `offset` columns.
pub fn nested<'a>(header: RcDoc<'a, ()>, children: Vec<RcDoc<'a, ()>>, offset: isize) -> RcDoc<'a, ()> {
    children
        .into_iter()
        .fold(header, |doc, child| doc.append(RcDoc::hardline().append(child).nest(offset)))
}

/// A simple line formatter for indented text reports.
#[derive(Debug)]
pub struct CodeFormatter {
    output: String,
    indent_level: usize,
    indent_str: String,
    at_line_start: bool,
}

impl CodeFormatter {
    /// Create a new formatter with the given indent string.
    pub fn new(indent_str: &str) -> Self {
        Self {
            output: String::new(),
            indent_level: 0,
            indent_str: indent_str.to_string(),
            at_line_start: true,
        }
    }

    /// Create a formatter with default settings (2 spaces).
    pub fn default_indent() -> Self {
        Self::new("  ")
    }

    /// Increase indentation level.
    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    /// Decrease indentation level.
    pub fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    /// Write text.
    pub fn write(&mut self, s: &str) {
        for c in s.chars() {
            if c == '\n' {
                self.output.push('\n');
                self.at_line_start = true;
            } else {
                if self.at_line_start {
                    for _ in 0..self.indent_level {
                        self.output.push_str(&self.indent_str);
                    }
                    self.at_line_start = false;
                }
                self.output.push(c);
            }
        }
    }

    /// Write a line.
    pub fn writeln(&mut self, s: &str) {
        self.write(s);
        self.write("\n");
    }

    /// Write a header line followed by an indented section.
    pub fn section<F: FnOnce(&mut Self)>(&mut self, header: &str, f: F) {
        self.writeln(header);
        self.indent();
        f(self);
        self.dedent();
    }

    /// Get the formatted output.
    pub fn finish(self) -> String {
        self.output
    }

    /// Get a reference to the current output.
    pub fn output(&self) -> &str {
        &self.output
    }
}

impl fmt::Write for CodeFormatter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s);
        Ok(())
    }
}

/// Format a list with separators.
pub fn format_list<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Format a list with separators using a custom formatter.
pub fn format_list_with<T, F: Fn(&T) -> String>(items: &[T], sep: &str, f: F) -> String {
    items
        .iter()
        .map(f)
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Outline(&'static str, Vec<Outline>);

    impl PrettyPrint for Outline {
        fn to_doc(&self) -> RcDoc<'_, ()> {
            nested(RcDoc::text(self.0), self.1.iter().map(|c| c.to_doc()).collect(), 2)
        }
    }

    #[test]
    fn test_nested_docs() {
        let tree = Outline("band", vec![Outline("leaf S0", vec![]), Outline("leaf S1", vec![])]);
        assert_eq!(tree.pretty(), "band\n  leaf S0\n  leaf S1");
    }

    #[test]
    fn test_code_formatter() {
        let mut fmt = CodeFormatter::default_indent();
        fmt.section("Statement S0:", |f| {
            f.writeln("Domain: { S0[i] : 0 <= i < 4 }");
        });
        fmt.writeln("done");

        let output = fmt.finish();
        assert!(output.contains("  Domain"));
        assert!(output.ends_with("done\n"));
    }

    #[test]
    fn test_format_list() {
        assert_eq!(format_list(&[1, 2, 3], ", "), "1, 2, 3");
        assert_eq!(format_list_with(&[true, false], " ", |b| if *b { "y".into() } else { "n".into() }), "y n");
    }
}

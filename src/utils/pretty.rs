//! Text rendering helpers for program trees.

use std::fmt;

/// An indentation-aware line writer used to render trees as pseudo-code.
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

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    /// Write text, indenting every new line.
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

    pub fn writeln(&mut self, s: &str) {
        self.write(s);
        self.write("\n");
    }

    /// Write `header {`, the indented body, then `}`.
    pub fn block<F: FnOnce(&mut Self)>(&mut self, header: &str, f: F) {
        self.write(header);
        self.writeln(" {");
        self.indent();
        f(self);
        self.dedent();
        self.writeln("}");
    }

    pub fn finish(self) -> String {
        self.output
    }

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

//! Indented text output.

use std::fmt::Write;

const INDENT: &str = "    ";

/// Accumulates lines of source text at a tracked nesting depth.
#[derive(Debug, Default)]
pub(crate) struct CodeWriter {
    text: String,
    depth: usize,
}

impl CodeWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Writes text at the current depth, indenting every line of it. Empty lines carry no
    /// indentation.
    pub(crate) fn line(&mut self, text: impl AsRef<str>) {
        for line in text.as_ref().split('\n') {
            if line.is_empty() {
                self.text.push('\n');
            } else {
                let _ = writeln!(self.text, "{}{line}", INDENT.repeat(self.depth));
            }
        }
    }

    /// Separates two members with an empty line, unless a block was just opened.
    pub(crate) fn separate(&mut self) {
        if self.text.is_empty() || self.text.ends_with("{\n") || self.text.ends_with("\n\n") {
            return;
        }
        self.text.push('\n');
    }

    /// Writes `header` and opens a block below it.
    pub(crate) fn open(&mut self, header: impl AsRef<str>) {
        self.line(header);
        self.line("{");
        self.depth += 1;
    }

    /// Closes the innermost block.
    pub(crate) fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    /// Writes a `///` documentation element, split over several lines when the text has
    /// line breaks.
    pub(crate) fn doc(&mut self, tag: &str, attributes: &str, text: &str) {
        let text = escape_xml(text.trim());
        if text.contains('\n') {
            self.line(format!("/// <{tag}{attributes}>"));
            for line in text.lines() {
                self.line(format!("/// {}", line.trim_end()).trim_end());
            }
            self.line(format!("/// </{tag}>"));
        } else {
            self.line(format!("/// <{tag}{attributes}>{text}</{tag}>"));
        }
    }

    pub(crate) fn finish(self) -> String {
        self.text
    }
}

/// Escapes text for use inside XML documentation comments.
pub(crate) fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\r', "")
}

/// Escapes text for use inside a string literal.
pub(crate) fn escape_string(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
}

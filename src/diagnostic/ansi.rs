use std::fmt::Write;

use super::{Diagnostic, Label, Severity};
use crate::script::SourceMap;

/// Human-readable renderer in the style of rustc's output.
pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color { format!("\x1b[{code}m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }

    fn bold_red(&self, s: &str) -> String {
        self.paint("1;31", s)
    }

    fn bold_yellow(&self, s: &str) -> String {
        self.paint("1;33", s)
    }

    fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = String::new();

        let severity = match (&d.severity, d.code) {
            (Severity::Error, Some(code)) => self.bold_red(&format!("error[{code}]")),
            (Severity::Error, None) => self.bold_red("error"),
            (Severity::Warning, Some(code)) => self.bold_yellow(&format!("warning[{code}]")),
            (Severity::Warning, None) => self.bold_yellow("warning"),
        };
        let _ = writeln!(out, "{severity}: {}", self.bold(&d.message));

        if let Some(source) = &d.source {
            let map = SourceMap::new(source);
            if let Some(primary) = d.labels.iter().find(|l| l.is_primary) {
                let (line, col) = map.lookup(primary.span.start);
                let _ = writeln!(out, "  {} {line}:{col}", self.cyan("-->"));
            }
            // Gutter wide enough for the largest line number shown.
            let gutter = d
                .labels
                .iter()
                .map(|l| map.lookup(l.span.start).0.to_string().len())
                .max()
                .unwrap_or(1);
            if !d.labels.is_empty() {
                let _ = writeln!(out, "{} {}", " ".repeat(gutter), self.cyan("|"));
            }
            for label in &d.labels {
                self.snippet(&mut out, &map, source, label, gutter);
            }
        } else {
            for label in d.labels.iter().filter(|l| !l.message.is_empty()) {
                let _ = writeln!(out, "  {} {} (bytes {}..{})", self.dim("="), label.message, label.span.start, label.span.end);
            }
        }

        for note in &d.notes {
            let _ = writeln!(out, "  {} note: {note}", self.dim("="));
        }
        if let Some(suggestion) = &d.suggestion {
            let _ = writeln!(out, "  {} help: {suggestion}", self.dim("="));
        }

        out
    }

    fn snippet(&self, out: &mut String, map: &SourceMap, source: &str, label: &Label, gutter: usize) {
        let (line, col) = map.lookup(label.span.start);
        let text = map.line_text(source, line);
        let pipe = self.cyan("|");
        let pad = " ".repeat(gutter);

        let _ = writeln!(out, "{} {pipe} {text}", self.cyan(&format!("{line:>gutter$}")));

        // Carets stop at the end of the line for spans crossing it.
        let start = col - 1;
        let len = label.span.end.saturating_sub(label.span.start).max(1).min(text.len().saturating_sub(start).max(1));
        let (marker, message) = if label.is_primary {
            (self.bold_red(&"^".repeat(len)), self.bold_red(&label.message))
        } else {
            (self.cyan(&"-".repeat(len)), self.cyan(&label.message))
        };
        let indent = " ".repeat(start);
        if label.message.is_empty() {
            let _ = writeln!(out, "{pad} {pipe} {indent}{marker}");
        } else {
            let _ = writeln!(out, "{pad} {pipe} {indent}{marker} {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompileType;
    use crate::script::{Span, run};

    const SOURCE: &str = "begin Main\nstr \"a\"\nnr 1\nop +\nend";

    fn script_diag() -> Diagnostic {
        let err = run(SOURCE, CompileType::Normal).unwrap_err();
        Diagnostic::from(&err).with_source(SOURCE)
    }

    #[test]
    fn header_carries_code() {
        let out = AnsiRenderer { use_color: false }.render(&script_diag());
        assert!(out.starts_with("error[ISN-T001]: wrong argument type for +\n"), "{out}");
    }

    #[test]
    fn location_and_source_line() {
        let out = AnsiRenderer { use_color: false }.render(&script_diag());
        assert!(out.contains("--> 4:1"), "{out}");
        assert!(out.contains("4 | op +"), "{out}");
        assert!(out.contains("  | ^^^^ here"), "{out}");
    }

    #[test]
    fn note_and_help() {
        let d = Diagnostic::error("cannot use \"is\" with number")
            .with_note("in function 'Main'")
            .with_suggestion("compare values with '==' instead");
        let out = AnsiRenderer { use_color: false }.render(&d);
        assert!(out.contains("= note: in function 'Main'"), "{out}");
        assert!(out.contains("= help: compare values with '==' instead"), "{out}");
    }

    #[test]
    fn no_source_lists_spans() {
        let d = Diagnostic::error("something bad").with_span(Span { start: 3, end: 7 }, "here");
        let out = AnsiRenderer { use_color: false }.render(&d);
        assert!(out.starts_with("error: something bad\n"), "{out}");
        assert!(!out.contains("-->"));
        assert!(out.contains("here (bytes 3..7)"), "{out}");
    }

    #[test]
    fn secondary_label_uses_dashes() {
        let d = Diagnostic::error("bad")
            .with_span(Span { start: 19, end: 23 }, "used here")
            .with_secondary_span(Span { start: 11, end: 18 }, "pushed here")
            .with_source(SOURCE);
        let out = AnsiRenderer { use_color: false }.render(&d);
        assert!(out.contains("2 | str \"a\""), "{out}");
        assert!(out.contains("  | ------- pushed here"), "{out}");
        assert!(out.contains("3 | nr 1"), "{out}");
    }

    #[test]
    fn caret_clipped_to_line() {
        let d = Diagnostic::error("unclosed").with_span(Span { start: 0, end: SOURCE.len() }, "").with_source(SOURCE);
        let out = AnsiRenderer { use_color: false }.render(&d);
        assert!(out.contains("  | ^^^^^^^^^^\n"), "{out}");
    }

    #[test]
    fn color_only_when_enabled() {
        let colored = AnsiRenderer { use_color: true }.render(&script_diag());
        let plain = AnsiRenderer { use_color: false }.render(&script_diag());
        assert!(colored.contains("\x1b["));
        assert!(!plain.contains("\x1b["));
    }
}

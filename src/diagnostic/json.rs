use serde::Serialize;

use super::{Diagnostic, Label, Severity};
use crate::script::SourceMap;

#[derive(Serialize)]
struct JsonLabel<'a> {
    start: usize,
    end: usize,
    message: &'a str,
    primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    col: Option<usize>,
}

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    severity: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    message: &'a str,
    labels: Vec<JsonLabel<'a>>,
    notes: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

fn label<'a>(l: &'a Label, map: Option<&SourceMap>) -> JsonLabel<'a> {
    let pos = map.map(|m| m.lookup(l.span.start));
    JsonLabel {
        start: l.span.start,
        end: l.span.end,
        message: &l.message,
        primary: l.is_primary,
        line: pos.map(|(line, _)| line),
        col: pos.map(|(_, col)| col),
    }
}

/// One diagnostic as a single-line JSON object. Labels get `line`/`col`
/// only when the diagnostic carries its source.
pub fn render(d: &Diagnostic) -> String {
    let map = d.source.as_deref().map(SourceMap::new);
    let out = JsonDiagnostic {
        severity: match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        },
        code: d.code,
        message: &d.message,
        labels: d.labels.iter().map(|l| label(l, map.as_ref())).collect(),
        notes: &d.notes,
        suggestion: d.suggestion.as_deref(),
    };

    serde_json::to_string(&out)
        .unwrap_or_else(|_| r#"{"severity":"error","message":"internal error serializing diagnostic"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompileType;
    use crate::script::{Span, run};

    fn parse_json(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("valid JSON")
    }

    #[test]
    fn render_basic_error() {
        let v = parse_json(&render(&Diagnostic::error("type mismatch")));
        assert_eq!(v["severity"], "error");
        assert_eq!(v["message"], "type mismatch");
        assert!(v["labels"].as_array().unwrap().is_empty());
        assert!(v.get("code").is_none());
        assert!(v.get("suggestion").is_none());
    }

    #[test]
    fn render_script_error() {
        let source = "begin Main\nstr \"a\"\nnr 1\nop +\nend";
        let err = run(source, CompileType::Normal).unwrap_err();
        let d = Diagnostic::from(&err).with_source(source);
        let v = parse_json(&render(&d));
        assert_eq!(v["code"], "ISN-T001");
        assert_eq!(v["message"], "wrong argument type for +");
        assert_eq!(v["labels"][0]["line"], 4);
        assert_eq!(v["labels"][0]["col"], 1);
        assert_eq!(v["labels"][0]["primary"], true);
        assert_eq!(v["notes"][0], "in function 'Main'");
    }

    #[test]
    fn render_lex_error_has_suggestion() {
        let source = "begin Main\nnr 1 # one\nend";
        let err = run(source, CompileType::Normal).unwrap_err();
        let v = parse_json(&render(&Diagnostic::from(&err).with_source(source)));
        assert_eq!(v["code"], "ISN-S001");
        assert_eq!(v["labels"][0]["line"], 2);
        assert_eq!(v["labels"][0]["col"], 6);
        assert!(v["suggestion"].as_str().unwrap().contains("--"));
    }

    #[test]
    fn label_without_source_has_no_position() {
        let d = Diagnostic::error("bad").with_span(Span { start: 5, end: 8 }, "here");
        let v = parse_json(&render(&d));
        let label = &v["labels"][0];
        assert_eq!(label["start"], 5);
        assert_eq!(label["end"], 8);
        assert!(label.get("line").is_none());
        assert!(label.get("col").is_none());
    }

    #[test]
    fn secondary_labels_and_warnings() {
        let mut d = Diagnostic::error("unreachable instruction")
            .with_span(Span { start: 0, end: 5 }, "primary")
            .with_secondary_span(Span { start: 11, end: 15 }, "secondary")
            .with_source("begin Main\nnr 1\nend");
        d.severity = Severity::Warning;
        let v = parse_json(&render(&d));
        assert_eq!(v["severity"], "warning");
        assert_eq!(v["labels"][1]["primary"], false);
        assert_eq!(v["labels"][1]["line"], 2);
    }
}

pub mod ansi;
pub mod json;
pub mod registry;

use crate::error::GenError;
use crate::script::{ScriptError, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    #[allow(dead_code)] // nothing emits warnings yet
    Warning,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: true });
        self
    }

    #[allow(dead_code)]
    pub fn with_secondary_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: false });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A hint for the errors that have an obvious fix.
fn hint(e: &GenError) -> Option<String> {
    match e {
        GenError::CannotUseIsWith { op, .. } => {
            let eq = if *op == "is" { "==" } else { "!=" };
            Some(format!("compare values with '{eq}' instead"))
        }
        GenError::ConstantNotSupported { .. } => Some("push jobs and channels with 'job' or 'channel'".to_string()),
        _ => None,
    }
}

impl From<&GenError> for Diagnostic {
    fn from(e: &GenError) -> Self {
        let mut d = Diagnostic::error(e.to_string()).with_code(e.code());
        if let Some(h) = hint(e) {
            d = d.with_suggestion(h);
        }
        d
    }
}

impl From<&ScriptError> for Diagnostic {
    fn from(e: &ScriptError) -> Self {
        match e {
            ScriptError::Gen { err, span, func } => Diagnostic::from(err)
                .with_span(*span, "here")
                .with_note(format!("in function '{func}'")),
            ScriptError::Lex(lex) => {
                let mut d = Diagnostic::error(e.to_string()).with_code(e.code()).with_span(lex.span, "here");
                if !lex.suggestion.is_empty() {
                    d = d.with_suggestion(lex.suggestion.clone());
                }
                d
            }
            _ => Diagnostic::error(e.to_string()).with_code(e.code()).with_span(e.span(), "here"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::lexer::LexError;
    use crate::types::VarType;

    #[test]
    fn diagnostic_error_builder() {
        let d = Diagnostic::error("something went wrong");
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "something went wrong");
        assert!(d.code.is_none());
        assert!(d.labels.is_empty());
        assert!(d.notes.is_empty());
        assert!(d.suggestion.is_none());
    }

    #[test]
    fn diagnostic_with_span() {
        let d = Diagnostic::error("bad token").with_span(Span { start: 5, end: 8 }, "here");
        assert_eq!(d.labels.len(), 1);
        assert_eq!(d.labels[0].span, Span { start: 5, end: 8 });
        assert!(d.labels[0].is_primary);
    }

    #[test]
    fn from_gen_error_carries_code() {
        let d = Diagnostic::from(&GenError::WrongArgumentTypeForPlus);
        assert_eq!(d.code, Some("ISN-T001"));
        assert_eq!(d.message, "wrong argument type for +");
        assert!(d.labels.is_empty());
    }

    #[test]
    fn is_on_numbers_suggests_equality() {
        let d = Diagnostic::from(&GenError::CannotUseIsWith { op: "isnot", ty: VarType::Number });
        assert_eq!(d.suggestion.as_deref(), Some("compare values with '!=' instead"));
    }

    #[test]
    fn from_script_gen_error() {
        let e = ScriptError::Gen {
            err: GenError::CallToFailedFunction { name: "Broken".to_string() },
            span: Span { start: 32, end: 45 },
            func: "Main".to_string(),
        };
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("ISN-C001"));
        assert!(d.message.contains("Broken"));
        assert_eq!(d.labels[0].span, Span { start: 32, end: 45 });
        assert_eq!(d.notes, vec!["in function 'Main'"]);
    }

    #[test]
    fn from_lex_error() {
        let e = ScriptError::Lex(LexError {
            span: Span { start: 5, end: 6 },
            snippet: "#".to_string(),
            suggestion: "Comments start with '--'".to_string(),
        });
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("ISN-S001"));
        assert_eq!(d.labels[0].span.start, 5);
        assert!(d.suggestion.as_deref().is_some_and(|s| s.contains("--")));
    }

    #[test]
    fn from_syntax_error() {
        let e = ScriptError::syntax("expected a number", Span { start: 10, end: 12 });
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("ISN-S002"));
        assert_eq!(d.message, "expected a number");
        assert_eq!(d.labels[0].span, Span { start: 10, end: 12 });
    }

    #[test]
    fn every_code_is_registered() {
        let errs = [
            Diagnostic::from(&GenError::UnknownBuiltin { idx: 99 }),
            Diagnostic::from(&ScriptError::UndefinedLabel { name: "x".to_string(), span: Span::default() }),
        ];
        for d in errs {
            let code = d.code.unwrap();
            assert!(registry::lookup(code).is_some(), "{code} not in registry");
        }
    }
}

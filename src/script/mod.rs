//! Generator scripts: a line-oriented language that drives the emitters,
//! one directive per line.
//!
//! ```text
//! func Add(number, ?number): number
//! begin Main
//!   nr 5
//!   store local 0 decl
//!   load local 0 number
//!   nr 2
//!   op +
//!   echo 1
//! end
//! ```

pub mod driver;
pub mod lexer;
pub mod parser;
pub mod source_map;

use serde::Serialize;

use crate::error::GenError;

pub use driver::{CompiledFunc, run};
pub use source_map::SourceMap;

/// Byte range in a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn to(self, other: Span) -> Span {
        Span { start: self.start, end: other.end }
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(r: std::ops::Range<usize>) -> Self {
        Span { start: r.start, end: r.end }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error(transparent)]
    Lex(#[from] lexer::LexError),
    #[error("{message}")]
    Syntax { message: String, span: Span },
    #[error("{err}")]
    Gen { err: GenError, span: Span, func: String },
    #[error("undefined function: {name}")]
    UndefinedFunction { name: String, span: Span },
    #[error("{what}")]
    Unbalanced { what: String, span: Span },
    #[error("undefined label: {name}")]
    UndefinedLabel { name: String, span: Span },
    #[error("invalid pattern: {message}")]
    BadPattern { message: String, span: Span },
    #[error("stack underflow: needs {need} value(s), the stack holds {have}")]
    StackUnderflow { need: usize, have: usize, span: Span },
}

impl ScriptError {
    pub fn span(&self) -> Span {
        match self {
            ScriptError::Lex(e) => e.span,
            ScriptError::Syntax { span, .. }
            | ScriptError::Gen { span, .. }
            | ScriptError::UndefinedFunction { span, .. }
            | ScriptError::Unbalanced { span, .. }
            | ScriptError::UndefinedLabel { span, .. }
            | ScriptError::BadPattern { span, .. }
            | ScriptError::StackUnderflow { span, .. } => *span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ScriptError::Lex(_) => "ISN-S001",
            ScriptError::Syntax { .. } => "ISN-S002",
            ScriptError::UndefinedFunction { .. } => "ISN-S003",
            ScriptError::Unbalanced { .. } => "ISN-S004",
            ScriptError::UndefinedLabel { .. } => "ISN-S005",
            ScriptError::BadPattern { .. } => "ISN-S006",
            ScriptError::StackUnderflow { .. } => "ISN-S007",
            ScriptError::Gen { err, .. } => err.code(),
        }
    }

    pub(crate) fn syntax(message: impl Into<String>, span: Span) -> Self {
        ScriptError::Syntax { message: message.into(), span }
    }
}

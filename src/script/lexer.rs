use logos::Logos;

use super::Span;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip(r"--[^\n]*", allow_greedy = true))]
pub enum Token {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,
    #[token("...")]
    Ellipsis,
    #[token(";")]
    Semicolon,

    // Operators, also used as type brackets
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("=~")]
    MatchOp,
    #[token("!~")]
    NoMatchOp,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,

    // Literals
    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""[^"\n]*""#, |lex| {
        let s = lex.slice();
        Some(s[1..s.len()-1].to_string())
    })]
    Str(String),

    // Directives, type names and variable names such as g:count, $HOME, @a, &l:sw
    #[regex(r"[A-Za-z_$@&][A-Za-z0-9_:#@]*", |lex| lex.slice().to_string())]
    Word(String),

    // Newlines end a directive
    #[token("\n")]
    Newline,
}

impl Token {
    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Word(w) => format!("'{w}'"),
            Token::Int(n) => format!("number {n}"),
            Token::Float(f) => format!("float {f}"),
            Token::Str(s) => format!("string \"{s}\""),
            Token::Newline => "end of line".to_string(),
            other => format!("{other:?}"),
        }
    }
}

/// Lex a generator script into tokens with their byte spans.
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = Span::from(lexer.span());
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let snippet = source[lexer.span()].to_string();
                return Err(LexError { suggestion: suggest_fix(&snippet), snippet, span });
            }
        }
    }

    Ok(tokens)
}

fn suggest_fix(bad: &str) -> String {
    if bad.starts_with('"') {
        "Strings must be closed on the same line".to_string()
    } else if bad.starts_with('#') {
        "Comments start with '--'".to_string()
    } else {
        format!("Unexpected character(s): '{bad}'")
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unexpected character(s) '{snippet}'")]
pub struct LexError {
    pub span: Span,
    pub snippet: String,
    pub suggestion: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lex_directive_line() {
        assert_eq!(
            tokens("nr -5\nop +"),
            vec![
                Token::Word("nr".into()),
                Token::Int(-5),
                Token::Newline,
                Token::Word("op".into()),
                Token::Plus,
            ]
        );
    }

    #[test]
    fn lex_signature() {
        assert_eq!(
            tokens("func F(?number, ...list<string>): bool"),
            vec![
                Token::Word("func".into()),
                Token::Word("F".into()),
                Token::LParen,
                Token::Question,
                Token::Word("number".into()),
                Token::Comma,
                Token::Ellipsis,
                Token::Word("list".into()),
                Token::Lt,
                Token::Word("string".into()),
                Token::Gt,
                Token::RParen,
                Token::Colon,
                Token::Word("bool".into()),
            ]
        );
    }

    #[test]
    fn lex_variable_names() {
        assert_eq!(
            tokens("store g:dir#var $HOME @@ &l:sw"),
            vec![
                Token::Word("store".into()),
                Token::Word("g:dir#var".into()),
                Token::Word("$HOME".into()),
                Token::Word("@@".into()),
                Token::Word("&l:sw".into()),
            ]
        );
    }

    #[test]
    fn lex_literals_and_comments() {
        assert_eq!(
            tokens("float 2.5 -- trailing comment\nstr \"a b\""),
            vec![
                Token::Word("float".into()),
                Token::Float(2.5),
                Token::Newline,
                Token::Word("str".into()),
                Token::Str("a b".into()),
            ]
        );
    }

    #[test]
    fn comment_runs_to_end_of_line_only() {
        assert_eq!(
            tokens("-- whole line -- nested\nnr 1 -- x\n--"),
            vec![Token::Newline, Token::Word("nr".into()), Token::Int(1), Token::Newline]
        );
    }

    #[test]
    fn lex_error_has_span() {
        let err = lex("nr 1\n# nope").unwrap_err();
        assert_eq!(err.span.start, 5);
        assert_eq!(err.snippet, "#");
        assert!(err.suggestion.contains("--"));
    }
}

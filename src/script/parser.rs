use super::lexer::{Token, lex};
use super::{ScriptError, Span};
use crate::context::Skip;
use crate::generate::ArithOp;
use crate::instr::{CMOD_NAMES, ExprOp, JumpWhen, MultKind, SPLIT_NAMES, Special};
use crate::types::{FuncType, Type};

// ── Directives ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: Type,
    pub optional: bool,
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<Type>,
    pub legacy: bool,
    pub closure: bool,
    /// Compiling this function fails.
    pub broken: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadTarget {
    Local(usize),
    Outer { idx: usize, depth: usize },
    Script { name: String, idx: usize },
    /// Anything addressed by name: `g:x`, `$ENV`, `@r`, `&opt`, `v:count`.
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreTarget {
    Local(usize),
    Outer { idx: usize, depth: usize },
    Script { name: String, idx: usize },
    Named(String),
}

/// Command modifiers as written; the filter pattern is compiled later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModSpec {
    pub flags: u32,
    pub split: u32,
    pub tab: i32,
    pub verbose: Option<i32>,
    pub filter: Option<(String, bool)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Func(FuncDecl),
    Begin(String),
    End,
    Line(u32),
    Skip(Skip),
    While,
    EndWhile,
    For(usize),
    EndFor,
    Block,
    EndBlock,
    If,
    EndIf,
    Label(String),
    Jump(JumpWhen, String),

    Nr(i64),
    Bool(bool),
    Special(Special),
    Float(f64),
    Str(Option<String>),
    Blob(Vec<u8>),
    Job(Option<String>),
    Channel(Option<u32>),
    PushFunc(Option<String>),
    Autoload(String),

    Op(ArithOp),
    Cmp(ExprOp, bool),
    ToString { offset: i32, tolerant: bool },
    ToBool { offset: i32, invert: bool },
    Cond2Bool,
    Load(LoadTarget, Option<Type>),
    Store { target: StoreTarget, decl: bool },
    List(usize),
    Dict(usize),
    ListAppend,
    BlobAppend,
    GetItem { index: i64, with_op: bool },
    Member(String),
    CheckLen { min_len: usize, more_ok: bool },
    Slice(usize),
    TypeCheck(Type, i32),
    SetType(Type),

    Call(String, usize),
    UCall(String, usize),
    PCall { argcount: usize, name: String, ty: Type, ref_below_args: bool },
    BCall { name: String, argcount: usize, method: bool },
    Funcref(String),
    NewFunc { lambda: String, global: Option<String> },
    Def(Option<String>),

    Echo { with_white: bool, count: usize },
    Mult(MultKind, usize),
    Exec(String),
    ExecConcat(usize),
    Legacy(String),
    Range(String),
    Unpack { count: usize, semicolon: bool },
    Put { regname: char, lnum: i64 },
    Unlet(String, bool),
    LockConst,
    Mod(ModSpec),
    EndMod,
    Sub(String),
    EndSub,
    InstrBlock,
    EndInstr,

    Try,
    Catch,
    Finally,
    EndTry,
    Throw,
    Return,
    ReturnVoid,
    Drop,
    Debug,
    Profile,
}

impl Directive {
    /// Directives that build up an expression value. Any other directive
    /// ends a statement.
    pub fn is_expr(&self) -> bool {
        matches!(
            self,
            Directive::Nr(_)
                | Directive::Bool(_)
                | Directive::Special(_)
                | Directive::Float(_)
                | Directive::Str(_)
                | Directive::Blob(_)
                | Directive::Job(_)
                | Directive::Channel(_)
                | Directive::PushFunc(_)
                | Directive::Autoload(_)
                | Directive::Op(_)
                | Directive::Cmp(..)
                | Directive::ToString { .. }
                | Directive::ToBool { .. }
                | Directive::Cond2Bool
                | Directive::Load(..)
                | Directive::List(_)
                | Directive::Dict(_)
                | Directive::ListAppend
                | Directive::BlobAppend
                | Directive::GetItem { .. }
                | Directive::Member(_)
                | Directive::CheckLen { .. }
                | Directive::Slice(_)
                | Directive::TypeCheck(..)
                | Directive::SetType(_)
                | Directive::Call(..)
                | Directive::UCall(..)
                | Directive::PCall { .. }
                | Directive::BCall { .. }
                | Directive::Funcref(_)
                | Directive::Legacy(_)
                | Directive::Range(_)
        )
    }

    /// Number of values the directive consumes or inspects on the stack.
    pub fn operands(&self) -> usize {
        let at = |offset: i32| offset.unsigned_abs() as usize;
        match self {
            Directive::Op(_) | Directive::Cmp(..) | Directive::ListAppend | Directive::BlobAppend => 2,
            Directive::ToString { offset, .. } | Directive::ToBool { offset, .. } => at(*offset),
            Directive::TypeCheck(_, offset) => at(*offset),
            Directive::GetItem { with_op, .. } => 1 + usize::from(*with_op),
            Directive::Jump(when, _) => usize::from(*when != JumpWhen::Always),
            Directive::List(n) => *n,
            Directive::Dict(n) => 2 * n,
            Directive::Call(_, n) | Directive::UCall(_, n) | Directive::BCall { argcount: n, .. } => *n,
            Directive::PCall { argcount, .. } => argcount + 1,
            Directive::Echo { count, .. } | Directive::Mult(_, count) | Directive::ExecConcat(count) => *count,
            Directive::Cond2Bool
            | Directive::Member(_)
            | Directive::CheckLen { .. }
            | Directive::Slice(_)
            | Directive::SetType(_)
            | Directive::Store { .. }
            | Directive::Unpack { .. }
            | Directive::For(_)
            | Directive::EndFor
            | Directive::Throw
            | Directive::Return
            | Directive::Drop => 1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub directive: Directive,
    pub span: Span,
}

// ── Parser ──────────────────────────────────────────────────────────

/// Parse a whole script into directives.
pub fn parse(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = lex(source)?;
    let mut stmts = Vec::new();
    for line in tokens.split(|(t, _)| *t == Token::Newline) {
        if line.is_empty() {
            continue;
        }
        let mut cur = Cursor { tokens: line, pos: 0 };
        let directive = cur.directive()?;
        cur.expect_end()?;
        let span = line[0].1.to(line[line.len() - 1].1);
        stmts.push(Stmt { directive, span });
    }
    Ok(stmts)
}

struct Cursor<'a> {
    tokens: &'a [(Token, Span)],
    pos: usize,
}

type PResult<T> = Result<T, ScriptError>;

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    /// Span of the current token, or just past the last one.
    fn span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, s)) => *s,
            None => {
                let end = self.tokens.last().map(|(_, s)| s.end).unwrap_or(0);
                Span { start: end, end }
            }
        }
    }

    fn next(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos).map(|(t, _)| t);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn error<T>(&self, expected: &str) -> PResult<T> {
        let found = self.peek().map(Token::describe).unwrap_or_else(|| "end of line".to_string());
        Err(ScriptError::syntax(format!("expected {expected}, found {found}"), self.span()))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn expect_end(&self) -> PResult<()> {
        if self.at_end() { Ok(()) } else { self.error("end of line") }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Word(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> PResult<()> {
        if self.eat(&token) { Ok(()) } else { self.error(what) }
    }

    fn word(&mut self, what: &str) -> PResult<String> {
        match self.peek() {
            Some(Token::Word(w)) => {
                self.pos += 1;
                Ok(w.clone())
            }
            _ => self.error(what),
        }
    }

    fn opt_word(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Word(w)) => {
                self.pos += 1;
                Some(w.clone())
            }
            _ => None,
        }
    }

    fn int(&mut self, what: &str) -> PResult<i64> {
        match self.peek() {
            Some(Token::Int(n)) => {
                self.pos += 1;
                Ok(*n)
            }
            _ => self.error(what),
        }
    }

    fn opt_int(&mut self) -> Option<i64> {
        match self.peek() {
            Some(Token::Int(n)) => {
                self.pos += 1;
                Some(*n)
            }
            _ => None,
        }
    }

    fn count(&mut self, what: &str) -> PResult<usize> {
        let span = self.span();
        let n = self.int(what)?;
        usize::try_from(n).map_err(|_| ScriptError::syntax(format!("{what} must not be negative"), span))
    }

    fn offset(&mut self) -> PResult<i32> {
        let span = self.span();
        match self.opt_int() {
            None => Ok(-1),
            Some(n) if (i64::from(i32::MIN)..0).contains(&n) => Ok(n as i32),
            Some(_) => Err(ScriptError::syntax("stack offset must be negative", span)),
        }
    }

    fn string(&mut self, what: &str) -> PResult<String> {
        match self.peek() {
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(s.clone())
            }
            _ => self.error(what),
        }
    }

    fn opt_string(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Str(s)) => {
                self.pos += 1;
                Some(s.clone())
            }
            _ => None,
        }
    }

    // ── Types ───────────────────────────────────────────────────────

    fn ty(&mut self) -> PResult<Type> {
        let span = self.span();
        let name = self.word("a type")?;
        let ty = match name.as_str() {
            "any" => Type::Any,
            "unknown" => Type::Unknown,
            "void" => Type::Void,
            "special" => Type::Special,
            "bool" => Type::Bool,
            "number" => Type::Number,
            "float" => Type::Float,
            "string" => Type::String,
            "blob" => Type::Blob,
            "job" => Type::Job,
            "channel" => Type::Channel,
            "instr" => Type::Instr,
            "list" | "dict" => {
                let member = if self.eat(&Token::Lt) {
                    let m = self.ty()?;
                    self.expect(Token::Gt, "'>'")?;
                    m
                } else {
                    Type::Any
                };
                if name == "list" { Type::list(member) } else { Type::dict(member) }
            }
            "func" | "partial" => {
                let ft = if self.peek() == Some(&Token::LParen) {
                    let params = self.params()?;
                    let ret = if self.eat(&Token::Colon) { self.ty()? } else { Type::Void };
                    func_type(&params, ret)
                } else {
                    FuncType::unknown_args(Type::Any)
                };
                if name == "func" { Type::Func(Box::new(ft)) } else { Type::Partial(Box::new(ft)) }
            }
            other => return Err(ScriptError::syntax(format!("unknown type '{other}'"), span)),
        };
        Ok(ty)
    }

    /// `( [?]type, ..., ...list<type> )`
    fn params(&mut self) -> PResult<Vec<Param>> {
        self.expect(Token::LParen, "'('")?;
        let mut params = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(params);
        }
        loop {
            let span = self.span();
            let variadic = self.eat(&Token::Ellipsis);
            let optional = !variadic && self.eat(&Token::Question);
            let ty = self.ty()?;
            if variadic && !matches!(ty, Type::List(_)) {
                return Err(ScriptError::syntax("variadic argument must be a list", span));
            }
            if params.iter().any(|p: &Param| p.variadic) {
                return Err(ScriptError::syntax("variadic argument must be last", span));
            }
            if !optional && !variadic && params.iter().any(|p: &Param| p.optional) {
                return Err(ScriptError::syntax("argument without default after optional one", span));
            }
            params.push(Param { ty, optional, variadic });
            if self.eat(&Token::RParen) {
                return Ok(params);
            }
            self.expect(Token::Comma, "',' or ')'")?;
        }
    }

    // ── Directives ──────────────────────────────────────────────────

    fn directive(&mut self) -> PResult<Directive> {
        let span = self.span();
        let name = self.word("a directive")?;
        let d = match name.as_str() {
            "func" => self.func_decl()?,
            "begin" => Directive::Begin(self.word("a function name")?),
            "end" => Directive::End,
            "line" => {
                let span = self.span();
                let n = self.int("a line number")?;
                let n = u32::try_from(n)
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| ScriptError::syntax("line numbers start at 1", span))?;
                Directive::Line(n)
            }
            "skip" => match self.word("on, off or unknown")?.as_str() {
                "on" => Directive::Skip(Skip::Yes),
                "off" => Directive::Skip(Skip::No),
                "unknown" => Directive::Skip(Skip::Unknown),
                _ => return Err(ScriptError::syntax("expected on, off or unknown", span)),
            },
            "while" => Directive::While,
            "endwhile" => Directive::EndWhile,
            "for" => Directive::For(self.count("a loop variable index")?),
            "endfor" => Directive::EndFor,
            "block" => Directive::Block,
            "endblock" => Directive::EndBlock,
            "if" => Directive::If,
            "endif" => Directive::EndIf,
            "label" => Directive::Label(self.word("a label name")?),
            "jump" => {
                let when = match self.word("always, false or true")?.as_str() {
                    "always" => JumpWhen::Always,
                    "false" => JumpWhen::IfFalse,
                    "true" => JumpWhen::IfTrue,
                    _ => return Err(ScriptError::syntax("expected always, false or true", span)),
                };
                Directive::Jump(when, self.word("a label name")?)
            }

            "nr" => Directive::Nr(self.int("a number")?),
            "bool" => match self.word("true or false")?.as_str() {
                "true" => Directive::Bool(true),
                "false" => Directive::Bool(false),
                _ => return Err(ScriptError::syntax("expected true or false", span)),
            },
            "special" => match self.word("none or null")?.as_str() {
                "none" => Directive::Special(Special::None),
                "null" => Directive::Special(Special::Null),
                _ => return Err(ScriptError::syntax("expected none or null", span)),
            },
            "float" => match self.next() {
                Some(Token::Float(f)) => Directive::Float(*f),
                Some(Token::Int(n)) => Directive::Float(*n as f64),
                _ => return Err(ScriptError::syntax("expected a float", span)),
            },
            "str" => Directive::Str(self.opt_string()),
            "blob" => Directive::Blob(self.opt_string().unwrap_or_default().into_bytes()),
            "job" => Directive::Job(self.opt_string()),
            "channel" => {
                let span = self.span();
                match self.opt_int() {
                    None => Directive::Channel(None),
                    Some(n) => Directive::Channel(Some(
                        u32::try_from(n).map_err(|_| ScriptError::syntax("bad channel id", span))?,
                    )),
                }
            }
            "pushfunc" => Directive::PushFunc(self.opt_word()),
            "autoload" => Directive::Autoload(self.word("an autoload name")?),

            "op" => {
                let op = match self.next() {
                    Some(Token::Plus) => ArithOp::Add,
                    Some(Token::Minus) => ArithOp::Sub,
                    Some(Token::Star) => ArithOp::Mul,
                    Some(Token::Slash) => ArithOp::Div,
                    Some(Token::Percent) => ArithOp::Rem,
                    _ => return Err(ScriptError::syntax("expected one of + - * / %", span)),
                };
                Directive::Op(op)
            }
            "cmp" => {
                let op = match self.next() {
                    Some(Token::EqEq) => ExprOp::Equal,
                    Some(Token::NotEq) => ExprOp::NEqual,
                    Some(Token::Gt) => ExprOp::Greater,
                    Some(Token::Ge) => ExprOp::GEqual,
                    Some(Token::Lt) => ExprOp::Smaller,
                    Some(Token::Le) => ExprOp::SEqual,
                    Some(Token::MatchOp) => ExprOp::Match,
                    Some(Token::NoMatchOp) => ExprOp::NoMatch,
                    Some(Token::Word(w)) if w == "is" => ExprOp::Is,
                    Some(Token::Word(w)) if w == "isnot" => ExprOp::IsNot,
                    _ => return Err(ScriptError::syntax("expected a comparison operator", span)),
                };
                Directive::Cmp(op, self.eat_word("ic"))
            }
            "tostring" => {
                let offset = self.offset()?;
                Directive::ToString { offset, tolerant: self.eat_word("tolerant") }
            }
            "tobool" => {
                let offset = self.offset()?;
                Directive::ToBool { offset, invert: self.eat_word("invert") }
            }
            "cond2bool" => Directive::Cond2Bool,
            "load" => self.load()?,
            "store" => self.store()?,
            "list" => Directive::List(self.count("an item count")?),
            "dict" => Directive::Dict(self.count("an entry count")?),
            "listappend" => Directive::ListAppend,
            "blobappend" => Directive::BlobAppend,
            "getitem" => {
                let index = self.int("an index")?;
                Directive::GetItem { index, with_op: self.eat_word("withop") }
            }
            "member" => Directive::Member(self.word("a key")?),
            "checklen" => {
                let min_len = self.count("a length")?;
                Directive::CheckLen { min_len, more_ok: self.eat_word("more") }
            }
            "slice" => Directive::Slice(self.count("an item count")?),
            "typecheck" => {
                let ty = self.ty()?;
                Directive::TypeCheck(ty, self.offset()?)
            }
            "settype" => Directive::SetType(self.ty()?),

            "call" => {
                let name = self.word("a function name")?;
                Directive::Call(name, self.count("an argument count")?)
            }
            "ucall" => {
                let name = self.word("a function name")?;
                Directive::UCall(name, self.count("an argument count")?)
            }
            "pcall" => {
                let argcount = self.count("an argument count")?;
                let name = self.word("a reference name")?;
                let ty = self.ty()?;
                Directive::PCall { argcount, name, ty, ref_below_args: self.eat_word("below") }
            }
            "bcall" | "method" => {
                let fname = self.word("a builtin name")?;
                let argcount = self.count("an argument count")?;
                Directive::BCall { name: fname, argcount, method: name == "method" }
            }
            "funcref" => Directive::Funcref(self.word("a function name")?),
            "newfunc" => {
                let lambda = self.word("a lambda name")?;
                Directive::NewFunc { lambda, global: self.opt_word() }
            }
            "def" => Directive::Def(self.opt_word()),

            "echo" => Directive::Echo { with_white: true, count: self.count("a value count")? },
            "echon" => Directive::Echo { with_white: false, count: self.count("a value count")? },
            "execute" => Directive::Mult(MultKind::Execute, self.count("a value count")?),
            "echomsg" => Directive::Mult(MultKind::EchoMsg, self.count("a value count")?),
            "echoerr" => Directive::Mult(MultKind::EchoErr, self.count("a value count")?),
            "echoconsole" => Directive::Mult(MultKind::EchoConsole, self.count("a value count")?),
            "exec" => Directive::Exec(self.string("a command string")?),
            "execconcat" => Directive::ExecConcat(self.count("a value count")?),
            "legacy" => Directive::Legacy(self.string("an expression string")?),
            "range" => Directive::Range(self.string("a range string")?),
            "unpack" => {
                let count = self.count("a variable count")?;
                Directive::Unpack { count, semicolon: self.eat(&Token::Semicolon) }
            }
            "put" => {
                let reg = self.word("a register")?;
                let regname = reg.chars().last().unwrap_or('"');
                Directive::Put { regname, lnum: self.opt_int().unwrap_or(0) }
            }
            "unlet" => {
                let name = self.word("a variable name")?;
                Directive::Unlet(name, self.eat(&Token::Bang))
            }
            "lockconst" => Directive::LockConst,
            "mod" => self.modifiers()?,
            "endmod" => Directive::EndMod,
            "sub" => Directive::Sub(self.string("a substitute command")?),
            "endsub" => Directive::EndSub,
            "instr" => Directive::InstrBlock,
            "endinstr" => Directive::EndInstr,

            "try" => Directive::Try,
            "catch" => Directive::Catch,
            "finally" => Directive::Finally,
            "endtry" => Directive::EndTry,
            "throw" => Directive::Throw,
            "return" => {
                if self.eat_word("void") {
                    Directive::ReturnVoid
                } else {
                    Directive::Return
                }
            }
            "drop" => Directive::Drop,
            "debug" => Directive::Debug,
            "profile" => Directive::Profile,
            other => return Err(ScriptError::syntax(format!("unknown directive '{other}'"), span)),
        };
        Ok(d)
    }

    fn func_decl(&mut self) -> PResult<Directive> {
        let name = self.word("a function name")?;
        let params = if self.peek() == Some(&Token::LParen) { self.params()? } else { Vec::new() };
        let ret = if self.eat(&Token::Colon) { Some(self.ty()?) } else { None };
        let mut decl = FuncDecl { name, params, ret, legacy: false, closure: false, broken: false };
        while !self.at_end() {
            let span = self.span();
            match self.word("a function flag")?.as_str() {
                "legacy" => decl.legacy = true,
                "closure" => decl.closure = true,
                "broken" => decl.broken = true,
                other => return Err(ScriptError::syntax(format!("unknown function flag '{other}'"), span)),
            }
        }
        Ok(Directive::Func(decl))
    }

    fn load(&mut self) -> PResult<Directive> {
        let target = if self.eat_word("local") {
            LoadTarget::Local(self.count("a local index")?)
        } else if self.eat_word("outer") {
            let idx = self.count("a local index")?;
            LoadTarget::Outer { idx, depth: self.count("a nesting depth")? }
        } else if self.eat_word("script") {
            let name = self.word("a script variable name")?;
            LoadTarget::Script { name, idx: self.count("a script variable index")? }
        } else {
            LoadTarget::Named(self.word("a variable")?)
        };
        let ty = if self.at_end() { None } else { Some(self.ty()?) };
        Ok(Directive::Load(target, ty))
    }

    fn store(&mut self) -> PResult<Directive> {
        let target = if self.eat_word("local") {
            StoreTarget::Local(self.count("a local index")?)
        } else if self.eat_word("outer") {
            let idx = self.count("a local index")?;
            StoreTarget::Outer { idx, depth: self.count("a nesting depth")? }
        } else if self.eat_word("script") {
            let name = self.word("a script variable name")?;
            StoreTarget::Script { name, idx: self.count("a script variable index")? }
        } else {
            StoreTarget::Named(self.word("a variable")?)
        };
        Ok(Directive::Store { target, decl: self.eat_word("decl") })
    }

    fn modifiers(&mut self) -> PResult<Directive> {
        let mut spec = ModSpec::default();
        while !self.at_end() {
            let span = self.span();
            let word = self.word("a command modifier")?;
            match word.as_str() {
                "filter" => {
                    let force = self.eat(&Token::Bang);
                    spec.filter = Some((self.string("a pattern")?, force));
                }
                "verbose" => spec.verbose = Some(self.opt_int().unwrap_or(1) as i32),
                "tab" => spec.tab = self.opt_int().unwrap_or(0) as i32 + 1,
                "silent" if self.eat(&Token::Bang) => spec.flags |= lookup_flag(CMOD_NAMES, "silent!").unwrap_or(0),
                w => {
                    if let Some(flag) = lookup_flag(CMOD_NAMES, w) {
                        spec.flags |= flag;
                    } else if let Some(flag) = lookup_flag(SPLIT_NAMES, w) {
                        spec.split |= flag;
                    } else {
                        return Err(ScriptError::syntax(format!("unknown command modifier '{w}'"), span));
                    }
                }
            }
        }
        Ok(Directive::Mod(spec))
    }
}

fn lookup_flag(table: &[(&str, u32)], name: &str) -> Option<u32> {
    table.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
}

/// Function type for a parameter list.
pub fn func_type(params: &[Param], ret: Type) -> FuncType {
    let required = params.iter().filter(|p| !p.optional && !p.variadic).count();
    FuncType {
        ret,
        argcount: params.len() as i32,
        min_argcount: required as i32,
        args: Some(params.iter().map(|p| p.ty.clone()).collect()),
        varargs: params.last().is_some_and(|p| p.variadic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(source: &str) -> Directive {
        let mut stmts = parse(source).unwrap();
        assert_eq!(stmts.len(), 1, "{stmts:?}");
        stmts.remove(0).directive
    }

    #[test]
    fn parse_func_decl() {
        let d = one("func Add(number, ?number, ...list<string>): bool closure");
        let Directive::Func(decl) = d else { panic!("expected func, got {d:?}") };
        assert_eq!(decl.name, "Add");
        assert_eq!(decl.params.len(), 3);
        assert!(decl.params[1].optional);
        assert!(decl.params[2].variadic);
        assert_eq!(decl.ret, Some(Type::Bool));
        assert!(decl.closure);
        assert!(!decl.legacy);
    }

    #[test]
    fn parse_types() {
        assert_eq!(
            one("typecheck dict<list<number>> -2"),
            Directive::TypeCheck(Type::dict(Type::list(Type::Number)), -2)
        );
        let d = one("pcall 1 Ref func(number): string below");
        let Directive::PCall { ty, ref_below_args, .. } = d else { panic!() };
        assert_eq!(ty.to_string(), "func(number): string");
        assert!(ref_below_args);
    }

    #[test]
    fn parse_loads_and_stores() {
        assert_eq!(one("load local 2 string"), Directive::Load(LoadTarget::Local(2), Some(Type::String)));
        assert_eq!(one("load g:count"), Directive::Load(LoadTarget::Named("g:count".into()), None));
        assert_eq!(
            one("store local 0 decl"),
            Directive::Store { target: StoreTarget::Local(0), decl: true }
        );
        assert_eq!(
            one("store outer 1 2"),
            Directive::Store { target: StoreTarget::Outer { idx: 1, depth: 2 }, decl: false }
        );
    }

    #[test]
    fn parse_modifiers() {
        let d = one("mod silent! vertical filter! \"^x\" verbose 2");
        let Directive::Mod(spec) = d else { panic!() };
        assert_ne!(spec.flags, 0);
        assert_ne!(spec.split, 0);
        assert_eq!(spec.verbose, Some(2));
        assert_eq!(spec.filter, Some(("^x".to_string(), true)));
    }

    #[test]
    fn blank_lines_and_comments_skipped() {
        let stmts = parse("\n-- comment\nnr 1\n\n  op +  -- add\n").unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1].directive, Directive::Op(ArithOp::Add));
    }

    #[test]
    fn statement_spans() {
        let src = "nr 1\ncmp == ic";
        let stmts = parse(src).unwrap();
        assert_eq!(stmts[1].span, Span { start: 5, end: src.len() });
        assert_eq!(stmts[1].directive, Directive::Cmp(ExprOp::Equal, true));
    }

    #[test]
    fn syntax_errors() {
        let err = parse("frobnicate 3").unwrap_err();
        assert_eq!(err.to_string(), "unknown directive 'frobnicate'");
        assert_eq!(err.span(), Span { start: 0, end: 10 });

        let err = parse("nr 1 2").unwrap_err();
        assert_eq!(err.span(), Span { start: 5, end: 6 });
        assert!(err.to_string().contains("expected end of line"));

        assert!(parse("tostring 3").is_err());
        assert!(parse("func F(...number)").is_err());
        assert!(parse("func F(?number, number)").is_err());
        assert!(parse("load local 0 frob").is_err());
    }

    #[test]
    fn expression_directives() {
        assert!(Directive::Nr(1).is_expr());
        assert!(Directive::Call("F".into(), 0).is_expr());
        assert!(!Directive::Echo { with_white: true, count: 1 }.is_expr());
        assert!(!Directive::Store { target: StoreTarget::Local(0), decl: false }.is_expr());
    }
}

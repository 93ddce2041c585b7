use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::parser::{Directive, FuncDecl, LoadTarget, ModSpec, Stmt, StoreTarget, parse};
use super::{ScriptError, SourceMap, Span};
use crate::builtins;
use crate::context::{CompileCtx, CompileType, ScopeKind, Skip};
use crate::error::GenError;
use crate::func::{DefStatus, FuncHandle, FunctionCompiler, UserFunc};
use crate::generate::{LhsDest, Lhs, LocalVar, StoreDest, VarRef, find_vim_var};
use crate::instr::{
    Channel, CmdFilter, CmdMod, ExecKind, Handle, Job, JumpWhen, Namespace, Op, OuterRef, ScriptName, ScriptRef,
    TryPart, UnletKind,
};
use crate::store::InstrStore;
use crate::types::Type;

/// Script id given to script variables of the generator script.
const SCRIPT_SID: u32 = 1;
const OPT_GLOBAL: u32 = 0x01;
const OPT_LOCAL: u32 = 0x02;

/// Options whose value is a function.
const FUNC_OPTIONS: &[&str] = &["completefunc", "omnifunc", "operatorfunc", "opfunc", "tagfunc", "thesaurusfunc"];

/// One function's generated instructions.
#[derive(Debug, Serialize)]
pub struct CompiledFunc {
    pub name: String,
    pub dfunc_idx: Option<usize>,
    pub compile_type: CompileType,
    pub closure: bool,
    pub instrs: InstrStore,
}

/// Generate every function body in `source`. Functions called before their
/// body is reached are compiled on demand, so the result is in completion
/// order.
pub fn run(source: &str, compile_type: CompileType) -> Result<Vec<CompiledFunc>, ScriptError> {
    let stmts = parse(source)?;
    let mut driver = Driver::new(source, compile_type);
    let order = driver.collect(&stmts)?;
    for name in order {
        let func = driver.funcs[&name].clone();
        if func.borrow().needs_compiling(compile_type) {
            driver.compile_func(&func)?;
        }
    }
    Ok(driver.done)
}

struct Body<'a> {
    begin: Span,
    end: Span,
    stmts: &'a [Stmt],
}

struct Driver<'a> {
    map: SourceMap,
    compile_type: CompileType,
    funcs: HashMap<String, FuncHandle>,
    decls: HashMap<String, Span>,
    broken: HashSet<String>,
    bodies: HashMap<String, Body<'a>>,
    done: Vec<CompiledFunc>,
    /// Error of a function compiled on demand, reported instead of the
    /// failed call.
    failure: Option<ScriptError>,
    next_job: u32,
}

enum Fail {
    Gen(GenError),
    Script(ScriptError),
}

impl From<GenError> for Fail {
    fn from(e: GenError) -> Self {
        Fail::Gen(e)
    }
}

impl From<ScriptError> for Fail {
    fn from(e: ScriptError) -> Self {
        Fail::Script(e)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum OpenKind {
    Scope(ScopeKind),
    Sub(String),
    InstrBlock,
    Mod,
}

impl OpenKind {
    fn describe(&self) -> &'static str {
        match self {
            OpenKind::Scope(ScopeKind::Block) => "block",
            OpenKind::Scope(ScopeKind::If) => "if",
            OpenKind::Scope(ScopeKind::While) => "while",
            OpenKind::Scope(ScopeKind::For) => "for",
            OpenKind::Scope(ScopeKind::Try) => "try",
            OpenKind::Sub(_) => "sub",
            OpenKind::InstrBlock => "instr",
            OpenKind::Mod => "mod",
        }
    }
}

/// A construct opened in a body and not closed yet.
struct Open {
    kind: OpenKind,
    /// Instruction the construct starts at: loop start, FOR or TRY.
    at: Option<usize>,
    span: Span,
}

/// Compilation state of one body.
struct BodyState {
    ctx: CompileCtx,
    name: String,
    labels: HashMap<String, usize>,
    pending: Vec<(usize, String, Span)>,
    open: Vec<Open>,
    expr_mark: Option<usize>,
    explicit_lines: bool,
    profiling: bool,
}

impl<'a> Driver<'a> {
    fn new(source: &str, compile_type: CompileType) -> Self {
        Driver {
            map: SourceMap::new(source),
            compile_type,
            funcs: HashMap::new(),
            decls: HashMap::new(),
            broken: HashSet::new(),
            bodies: HashMap::new(),
            done: Vec::new(),
            failure: None,
            next_job: 1,
        }
    }

    // ── Declarations ────────────────────────────────────────────────

    /// Declare functions and split out their bodies. Returns the names of
    /// the bodies in source order.
    fn collect(&mut self, stmts: &'a [Stmt]) -> Result<Vec<String>, ScriptError> {
        let mut order = Vec::new();
        let mut current: Option<(String, usize, Span)> = None;
        for (i, stmt) in stmts.iter().enumerate() {
            match (&stmt.directive, &current) {
                (Directive::Func(decl), None) => self.declare(decl, stmt.span)?,
                (Directive::Begin(name), None) => {
                    if self.bodies.contains_key(name) {
                        return Err(ScriptError::syntax(format!("function {name} already has a body"), stmt.span));
                    }
                    if !self.funcs.contains_key(name) {
                        self.declare_implicit(name, stmt.span);
                    }
                    if self.funcs[name].borrow().is_legacy() {
                        return Err(ScriptError::syntax(format!("legacy function {name} can't have a body"), stmt.span));
                    }
                    current = Some((name.clone(), i, stmt.span));
                }
                (Directive::End, Some((name, start, begin))) => {
                    self.bodies.insert(name.clone(), Body { begin: *begin, end: stmt.span, stmts: &stmts[start + 1..i] });
                    order.push(name.clone());
                    current = None;
                }
                (Directive::Begin(_), Some((name, ..))) => {
                    return Err(ScriptError::Unbalanced { what: format!("begin inside body of {name}"), span: stmt.span });
                }
                (Directive::Func(_), Some(_)) => {
                    return Err(ScriptError::syntax("func declarations must be outside of bodies", stmt.span));
                }
                (Directive::End, None) => {
                    return Err(ScriptError::Unbalanced { what: "end without begin".to_string(), span: stmt.span });
                }
                (_, None) => return Err(ScriptError::syntax("directive outside of a function body", stmt.span)),
                (_, Some(_)) => {}
            }
        }
        if let Some((name, _, span)) = current {
            return Err(ScriptError::Unbalanced { what: format!("missing end for {name}"), span });
        }
        Ok(order)
    }

    fn next_dfunc_idx(&self) -> usize {
        self.funcs.values().filter(|f| f.borrow().dfunc_idx.is_some()).count()
    }

    fn declare(&mut self, decl: &FuncDecl, span: Span) -> Result<(), ScriptError> {
        if self.funcs.contains_key(&decl.name) {
            return Err(ScriptError::syntax(format!("function {} is declared twice", decl.name), span));
        }
        let mut f = UserFunc::new(&decl.name);
        let regular: Vec<_> = decl.params.iter().filter(|p| !p.variadic).collect();
        f.args = regular.len();
        f.def_args = regular.iter().filter(|p| p.optional).count();
        f.arg_types = Some(regular.iter().map(|p| p.ty.clone()).collect());
        f.va_type = decl.params.iter().find(|p| p.variadic).map(|p| p.ty.clone());
        f.closure = decl.closure;
        if decl.legacy {
            f.status = DefStatus::Legacy;
            f.ret_type = decl.ret.clone().unwrap_or(Type::Any);
        } else {
            f.ret_type = decl.ret.clone().unwrap_or(Type::Void);
            f.dfunc_idx = Some(self.next_dfunc_idx());
        }
        if decl.broken {
            self.broken.insert(decl.name.clone());
        }
        self.decls.insert(decl.name.clone(), span);
        self.funcs.insert(decl.name.clone(), FuncHandle::new(f));
        Ok(())
    }

    /// A body without a declaration: untyped, returning any.
    fn declare_implicit(&mut self, name: &str, span: Span) {
        let mut f = UserFunc::new(name);
        f.dfunc_idx = Some(self.next_dfunc_idx());
        self.decls.insert(name.to_string(), span);
        self.funcs.insert(name.to_string(), FuncHandle::new(f));
    }

    fn lookup(&self, name: &str, span: Span) -> Result<FuncHandle, ScriptError> {
        self.funcs
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::UndefinedFunction { name: name.to_string(), span })
    }

    // ── Functions ───────────────────────────────────────────────────

    fn compile_func(&mut self, func: &FuncHandle) -> Result<(), ScriptError> {
        let name = func.name();
        if self.broken.contains(&name) {
            func.borrow_mut().status = DefStatus::CompileError;
            let span = self.decls.get(&name).copied().unwrap_or_default();
            return Err(ScriptError::Gen { err: GenError::CallToFailedFunction { name: name.clone() }, span, func: name });
        }
        let Some(body) = self.bodies.get(&name) else {
            tracing::debug!(func = %name, "declared without a body, nothing to generate");
            let mut f = func.borrow_mut();
            f.status = DefStatus::Compiled;
            f.compiled_for.push(self.compile_type);
            return Ok(());
        };
        let (begin, end, stmts) = (body.begin, body.end, body.stmts);

        tracing::debug!(func = %name, compile_type = ?self.compile_type, "compiling");
        func.borrow_mut().status = DefStatus::Compiling;
        let result = self.compile_body(func, begin, end, stmts);
        let mut f = func.borrow_mut();
        match result {
            Ok(instrs) => {
                f.status = DefStatus::Compiled;
                f.compiled_for.push(self.compile_type);
                self.done.push(CompiledFunc {
                    name,
                    dfunc_idx: f.dfunc_idx,
                    compile_type: self.compile_type,
                    closure: f.closure,
                    instrs,
                });
                Ok(())
            }
            Err(e) => {
                f.status = DefStatus::CompileError;
                Err(e)
            }
        }
    }

    fn compile_body(&mut self, func: &FuncHandle, begin: Span, end: Span, stmts: &[Stmt]) -> Result<InstrStore, ScriptError> {
        let mut b = BodyState {
            ctx: CompileCtx::new(func.clone(), self.compile_type),
            name: func.name(),
            labels: HashMap::new(),
            pending: Vec::new(),
            open: Vec::new(),
            expr_mark: None,
            explicit_lines: false,
            profiling: false,
        };
        self.follow_line(&mut b, begin);
        for stmt in stmts {
            self.follow_line(&mut b, stmt.span);
            match self.apply(&mut b, stmt) {
                Ok(()) => {}
                Err(Fail::Script(e)) => return Err(e),
                Err(Fail::Gen(err)) => {
                    return Err(self.failure.take().unwrap_or(ScriptError::Gen { err, span: stmt.span, func: b.name }));
                }
            }
        }
        self.follow_line(&mut b, end);
        self.finish(b, end)
    }

    /// Tag instructions with the script line unless `line` took over.
    fn follow_line(&self, b: &mut BodyState, span: Span) {
        if b.explicit_lines {
            return;
        }
        let lnum = self.map.line_index(span.start) as u32;
        if lnum != b.ctx.lnum {
            b.ctx.set_line(lnum);
        }
    }

    fn finish(&mut self, mut b: BodyState, end: Span) -> Result<InstrStore, ScriptError> {
        if let Some(open) = b.open.pop() {
            return Err(ScriptError::Unbalanced {
                what: format!("missing end{} in {}", open.kind.describe(), b.name),
                span: open.span,
            });
        }
        for (at, label, span) in std::mem::take(&mut b.pending) {
            let Some(&target) = b.labels.get(&label) else {
                return Err(ScriptError::UndefinedLabel { name: label, span });
            };
            b.ctx.instr.patch_jump(at, target);
        }
        b.ctx.skip = Skip::No;
        let at_end = |err| ScriptError::Gen { err, span: end, func: b.name.clone() };
        if b.profiling {
            b.ctx.may_emit_prof_end().map_err(at_end)?;
        }
        if !matches!(b.ctx.instrs().last().map(|i| &i.op), Some(Op::Return | Op::ReturnVoid)) {
            b.ctx.emit_return_void().map_err(at_end)?;
        }
        Ok(b.ctx.into_instrs())
    }

    // ── Directives ──────────────────────────────────────────────────

    fn apply(&mut self, b: &mut BodyState, stmt: &Stmt) -> Result<(), Fail> {
        let span = stmt.span;
        // skipped emitters leave the type stack alone
        let (need, have) = (stmt.directive.operands(), b.ctx.type_stack.len());
        if need > have && !b.ctx.is_skipping() {
            return Err(ScriptError::StackUnderflow { need, have, span }.into());
        }
        // a store right after an expression may fuse with it
        let mark = if stmt.directive.is_expr() {
            b.expr_mark.get_or_insert(b.ctx.mark());
            0
        } else {
            b.expr_mark.take().unwrap_or(b.ctx.mark())
        };
        let ctx = &mut b.ctx;

        match &stmt.directive {
            Directive::Func(_) | Directive::Begin(_) | Directive::End => {
                return Err(ScriptError::syntax("unexpected declaration in body", span).into());
            }
            Directive::Line(n) => {
                b.explicit_lines = true;
                ctx.set_line(n - 1);
            }
            Directive::Skip(skip) => ctx.skip = *skip,

            Directive::While => {
                let start = ctx.instrs().len();
                ctx.push_scope(ScopeKind::While);
                b.open.push(Open { kind: OpenKind::Scope(ScopeKind::While), at: Some(start), span });
            }
            Directive::EndWhile => {
                let open = close(&mut b.open, &OpenKind::Scope(ScopeKind::While), "endwhile", span)?;
                b.ctx.pop_scope();
                b.ctx.emit_jump(JumpWhen::Always, open.at);
            }
            Directive::For(loop_idx) => {
                let at = ctx.emit_for(*loop_idx);
                ctx.push_scope(ScopeKind::For);
                b.open.push(Open { kind: OpenKind::Scope(ScopeKind::For), at, span });
            }
            Directive::EndFor => {
                let open = close(&mut b.open, &OpenKind::Scope(ScopeKind::For), "endfor", span)?;
                let ctx = &mut b.ctx;
                ctx.pop_scope();
                ctx.emit_jump(JumpWhen::Always, open.at);
                if let Some(at) = open.at {
                    let end = ctx.instrs().len();
                    ctx.instr.patch_jump(at, end);
                }
                // the list being iterated
                ctx.emit_drop()?;
            }
            Directive::Block | Directive::If => {
                let kind = if stmt.directive == Directive::Block { ScopeKind::Block } else { ScopeKind::If };
                ctx.push_scope(kind);
                b.open.push(Open { kind: OpenKind::Scope(kind), at: None, span });
            }
            Directive::EndBlock | Directive::EndIf => {
                let (kind, word) = if stmt.directive == Directive::EndBlock {
                    (ScopeKind::Block, "endblock")
                } else {
                    (ScopeKind::If, "endif")
                };
                close(&mut b.open, &OpenKind::Scope(kind), word, span)?;
                b.ctx.pop_scope();
            }
            Directive::Label(name) => {
                if b.labels.insert(name.clone(), ctx.instrs().len()).is_some() {
                    return Err(ScriptError::syntax(format!("label {name} defined twice"), span).into());
                }
            }
            Directive::Jump(when, label) => {
                let target = b.labels.get(label).copied();
                if let Some(at) = ctx.emit_jump(*when, target)
                    && target.is_none()
                {
                    b.pending.push((at, label.clone(), span));
                }
            }

            Directive::Nr(n) => ctx.emit_push_nr(*n)?,
            Directive::Bool(v) => ctx.emit_push_bool(*v)?,
            Directive::Special(s) => ctx.emit_push_special(*s)?,
            Directive::Float(f) => ctx.emit_push_float(*f)?,
            Directive::Str(s) => ctx.emit_push_s(s.clone())?,
            Directive::Blob(bytes) => ctx.emit_push_blob(Handle::new(bytes.clone()))?,
            Directive::Job(cmd) => {
                let job = cmd.as_ref().map(|cmd| {
                    self.next_job += 1;
                    Handle::new(Job { id: self.next_job - 1, cmd: cmd.clone() })
                });
                ctx.emit_push_job(job)?;
            }
            Directive::Channel(id) => ctx.emit_push_channel(id.map(|id| Handle::new(Channel { id })))?,
            Directive::PushFunc(name) => {
                let ty = match name.as_deref().and_then(|n| self.funcs.get(n)) {
                    Some(f) => f.borrow().func_type(),
                    None => Type::func_any(),
                };
                ctx.emit_push_func(name.as_deref(), ty)?;
            }
            Directive::Autoload(name) => ctx.emit_autoload(name, Type::Any)?,

            Directive::Op(op) => ctx.emit_two_op(*op)?,
            Directive::Cmp(op, ic) => ctx.emit_compare(*op, *ic)?,
            Directive::ToString { offset, tolerant } => ctx.may_emit_2string(*offset, *tolerant)?,
            Directive::ToBool { offset, invert } => ctx.emit_2bool(*invert, *offset)?,
            Directive::Cond2Bool => ctx.emit_cond2bool()?,
            Directive::Load(target, ty) => load(ctx, target, ty.clone(), span)?,
            Directive::Store { target, decl } => {
                let dest = match target {
                    StoreTarget::Local(idx) => {
                        if *decl {
                            ctx.add_local(format!("${idx}"));
                        }
                        LhsDest::Local(LocalVar { idx: *idx, from_outer: 0 })
                    }
                    StoreTarget::Outer { idx, depth } => LhsDest::Local(LocalVar { idx: *idx, from_outer: *depth }),
                    StoreTarget::Script { name, idx } => LhsDest::Var(StoreDest::Script {
                        name: name.clone(),
                        sid: SCRIPT_SID,
                        idx: Some(*idx),
                        seq: 1,
                        ty: Type::Any,
                    }),
                    StoreTarget::Named(name) => LhsDest::Var(store_dest(name, span)?),
                };
                ctx.emit_store_lhs(&Lhs { dest, ty: Type::Any }, mark, *decl)?;
            }
            Directive::List(n) => ctx.emit_newlist(*n)?,
            Directive::Dict(n) => ctx.emit_newdict(*n)?,
            Directive::ListAppend => ctx.emit_listappend()?,
            Directive::BlobAppend => ctx.emit_blobappend()?,
            Directive::GetItem { index, with_op } => ctx.emit_getitem(*index, *with_op)?,
            Directive::Member(name) => ctx.emit_stringmember(name)?,
            Directive::CheckLen { min_len, more_ok } => ctx.emit_checklen(*min_len, *more_ok)?,
            Directive::Slice(count) => ctx.emit_slice(*count)?,
            Directive::TypeCheck(ty, offset) => ctx.emit_typecheck(ty.clone(), *offset, 0)?,
            Directive::SetType(ty) => ctx.emit_settype(ty.clone())?,

            Directive::Call(name, argcount) => {
                let func = self.lookup(name, span)?;
                b.ctx.emit_call(&func, *argcount, self)?;
            }
            Directive::UCall(name, argcount) => ctx.emit_ucall(name, *argcount)?,
            Directive::PCall { argcount, name, ty, ref_below_args } => {
                ctx.emit_pcall(*argcount, name, ty, *ref_below_args)?;
            }
            Directive::BCall { name, argcount, method } => {
                let idx = builtins::find(name)
                    .ok_or_else(|| ScriptError::UndefinedFunction { name: name.clone(), span })?;
                ctx.emit_bcall(idx, *argcount, *method)?;
            }
            Directive::Funcref(name) => {
                let func = self.lookup(name, span)?;
                ctx.emit_funcref(&func)?;
            }
            Directive::NewFunc { lambda, global } => ctx.emit_newfunc(lambda.clone(), global.clone())?,
            Directive::Def(name) => ctx.emit_def(name.as_deref())?,

            Directive::Echo { with_white, count } => ctx.emit_echo(*with_white, *count)?,
            Directive::Mult(kind, count) => ctx.emit_mult_expr(*kind, *count)?,
            Directive::Exec(line) => ctx.emit_exec(exec_kind(line), line.clone())?,
            Directive::ExecConcat(count) => ctx.emit_execconcat(*count)?,
            Directive::Legacy(line) => ctx.emit_legacy_eval(line)?,
            Directive::Range(range) => ctx.emit_range(range.clone())?,
            Directive::Unpack { count, semicolon } => ctx.emit_unpack(*count, *semicolon)?,
            Directive::Put { regname, lnum } => ctx.emit_put(*regname, *lnum)?,
            Directive::Unlet(name, force) => {
                let kind = if name.starts_with('$') { UnletKind::Env } else { UnletKind::Var };
                ctx.emit_unlet(kind, name, *force)?;
            }
            Directive::LockConst => ctx.emit_lockconst()?,
            Directive::Mod(spec) => {
                ctx.emit_cmdmods(cmd_mod(spec, span)?)?;
                b.open.push(Open { kind: OpenKind::Mod, at: None, span });
            }
            Directive::EndMod => {
                close(&mut b.open, &OpenKind::Mod, "endmod", span)?;
                b.ctx.emit_undo_cmdmods()?;
            }
            Directive::Sub(cmd) => {
                ctx.begin_nested();
                b.open.push(Open { kind: OpenKind::Sub(cmd.clone()), at: None, span });
            }
            Directive::EndSub => {
                let open = close_nested(&mut b.open, "endsub", span)?;
                let OpenKind::Sub(cmd) = open.kind else {
                    return Err(unbalanced("endsub", "sub", span).into());
                };
                let instrs = b.ctx.end_nested();
                b.ctx.emit_substitute(cmd, instrs)?;
            }
            Directive::InstrBlock => {
                ctx.begin_nested();
                b.open.push(Open { kind: OpenKind::InstrBlock, at: None, span });
            }
            Directive::EndInstr => {
                let open = close_nested(&mut b.open, "endinstr", span)?;
                if open.kind != OpenKind::InstrBlock {
                    return Err(unbalanced("endinstr", "instr", span).into());
                }
                let instrs = b.ctx.end_nested();
                b.ctx.emit_instr_block(instrs)?;
            }

            Directive::Try => {
                let at = ctx.emit_try();
                ctx.push_scope(ScopeKind::Try);
                b.open.push(Open { kind: OpenKind::Scope(ScopeKind::Try), at, span });
            }
            Directive::Catch | Directive::Finally => {
                let (part, word) = if stmt.directive == Directive::Catch {
                    (TryPart::Catch, "catch")
                } else {
                    (TryPart::Finally, "finally")
                };
                let at = match b.open.last() {
                    Some(Open { kind: OpenKind::Scope(ScopeKind::Try), at, .. }) => *at,
                    _ => return Err(unbalanced(word, "try", span).into()),
                };
                let ctx = &mut b.ctx;
                if let Some(at) = at
                    && !ctx.is_skipping()
                {
                    let here = ctx.instrs().len();
                    ctx.instr.patch_try(at, part, here);
                }
                match part {
                    TryPart::Catch => ctx.emit_catch()?,
                    _ => ctx.emit_finally()?,
                }
            }
            Directive::EndTry => {
                let open = close(&mut b.open, &OpenKind::Scope(ScopeKind::Try), "endtry", span)?;
                let ctx = &mut b.ctx;
                ctx.pop_scope();
                if let Some(at) = open.at
                    && !ctx.is_skipping()
                {
                    let here = ctx.instrs().len();
                    ctx.instr.patch_try(at, TryPart::EndTry, here);
                }
                ctx.emit_endtry()?;
            }
            Directive::Throw => ctx.emit_throw()?,
            Directive::Return => ctx.emit_return()?,
            Directive::ReturnVoid => ctx.emit_return_void()?,
            Directive::Drop => ctx.emit_drop()?,
            Directive::Debug => ctx.may_emit_debug()?,
            Directive::Profile => {
                let first = !b.profiling;
                b.profiling = true;
                b.ctx.may_emit_prof_start(first)?;
            }
        }
        Ok(())
    }
}

impl FunctionCompiler for Driver<'_> {
    fn compile(&mut self, func: &FuncHandle, compile_type: CompileType) -> Result<(), GenError> {
        debug_assert_eq!(compile_type, self.compile_type);
        let name = func.name();
        if let Err(e) = self.compile_func(func) {
            if !self.broken.contains(&name) {
                self.failure.get_or_insert(e);
            }
            return Err(GenError::CallToFailedFunction { name });
        }
        Ok(())
    }
}

fn unbalanced(closing: &str, opening: &str, span: Span) -> ScriptError {
    ScriptError::Unbalanced { what: format!("{closing} without {opening}"), span }
}

fn close(open: &mut Vec<Open>, kind: &OpenKind, word: &str, span: Span) -> Result<Open, ScriptError> {
    match open.last() {
        Some(top) if top.kind == *kind => open.pop().ok_or_else(|| unbalanced(word, kind.describe(), span)),
        _ => Err(unbalanced(word, kind.describe(), span)),
    }
}

fn close_nested(open: &mut Vec<Open>, word: &str, span: Span) -> Result<Open, ScriptError> {
    match open.last() {
        Some(Open { kind: OpenKind::Sub(_) | OpenKind::InstrBlock, .. }) => {
            open.pop().ok_or_else(|| unbalanced(word, "sub or instr", span))
        }
        _ => Err(unbalanced(word, "sub or instr", span)),
    }
}

/// A command with a range runs as EXEC_RANGE, one with a bar as EXEC_SPLIT.
fn exec_kind(line: &str) -> ExecKind {
    if line.starts_with(|c: char| c.is_ascii_digit() || c == '%' || c == '.' || c == ',') {
        ExecKind::ExecRange
    } else if line.contains('|') {
        ExecKind::ExecSplit
    } else {
        ExecKind::Exec
    }
}

fn cmd_mod(spec: &ModSpec, span: Span) -> Result<CmdMod, ScriptError> {
    let filter = match &spec.filter {
        Some((pattern, force)) => {
            let regex = regex::Regex::new(pattern)
                .map_err(|e| ScriptError::BadPattern { message: e.to_string(), span })?;
            Some(CmdFilter { regex, force: *force })
        }
        None => None,
    };
    Ok(CmdMod { flags: spec.flags, split: spec.split, tab: spec.tab, verbose: spec.verbose, filter })
}

/// Split a namespaced name such as `g:count` or `$HOME`.
fn namespace(name: &str) -> Option<(Namespace, &str)> {
    if let Some(rest) = name.strip_prefix('$') {
        return Some((Namespace::Env, rest));
    }
    if let Some(rest) = name.strip_prefix('&') {
        return Some((Namespace::Option, rest));
    }
    let (ns, rest) = name.split_at_checked(2)?;
    let ns = match ns {
        "g:" if rest.contains('#') => Namespace::Autoload,
        "g:" => Namespace::Global,
        "b:" => Namespace::Buffer,
        "w:" => Namespace::Window,
        "t:" => Namespace::Tab,
        _ => return None,
    };
    Some((ns, rest))
}

fn load(ctx: &mut CompileCtx, target: &LoadTarget, ty: Option<Type>, span: Span) -> Result<(), Fail> {
    let var = match target {
        LoadTarget::Local(idx) => VarRef::Local(*idx),
        LoadTarget::Outer { idx, depth } => VarRef::Outer(OuterRef { idx: *idx, depth: *depth }),
        LoadTarget::Script { idx, .. } => VarRef::Script(ScriptRef {
            sid: SCRIPT_SID,
            idx: *idx,
            seq: 1,
            ty: ty.clone().unwrap_or(Type::Any),
        }),
        LoadTarget::Named(name) => {
            if let Some(v) = name.strip_prefix("v:") {
                ctx.emit_loadv(v)?;
                if let Some(ty) = ty {
                    ctx.emit_settype(ty)?;
                }
                return Ok(());
            }
            if let Some(reg) = name.strip_prefix('@') {
                let c = match reg.chars().next() {
                    Some('@') | None => '"',
                    Some(c) => c,
                };
                ctx.emit_load(VarRef::Register(c), Some(ty.unwrap_or(Type::String)))?;
                return Ok(());
            }
            if let Some(s) = name.strip_prefix("s:") {
                VarRef::OldScript(ScriptName { name: s.to_string(), sid: SCRIPT_SID })
            } else if let Some((ns, rest)) = namespace(name) {
                let ty = match ns {
                    Namespace::Env => Some(ty.unwrap_or(Type::String)),
                    _ => ty,
                };
                ctx.emit_load(VarRef::Named { ns, name: rest.to_string() }, ty)?;
                return Ok(());
            } else {
                return Err(ScriptError::syntax(format!("variable {name} needs a namespace"), span).into());
            }
        }
    };
    ctx.emit_load(var, ty)?;
    Ok(())
}

fn store_dest(name: &str, span: Span) -> Result<StoreDest, Fail> {
    if let Some(v) = name.strip_prefix("v:") {
        let idx = find_vim_var(v).ok_or_else(|| GenError::UnknownVimVar { name: v.to_string() })?;
        return Ok(StoreDest::Vim(idx));
    }
    if name.starts_with('@') {
        return Ok(StoreDest::Register(name.to_string()));
    }
    if let Some(s) = name.strip_prefix("s:") {
        return Ok(StoreDest::Script { name: s.to_string(), sid: SCRIPT_SID, idx: None, seq: 0, ty: Type::Any });
    }
    if let Some(opt) = name.strip_prefix('&') {
        let flags = if opt.starts_with("l:") {
            OPT_LOCAL
        } else if opt.starts_with("g:") {
            OPT_GLOBAL
        } else {
            0
        };
        let bare = opt.strip_prefix("l:").or_else(|| opt.strip_prefix("g:")).unwrap_or(opt);
        return Ok(if FUNC_OPTIONS.contains(&bare) {
            StoreDest::FuncOption { name: name.to_string(), flags }
        } else {
            StoreDest::Option { name: name.to_string(), flags }
        });
    }
    let dest = match namespace(name) {
        Some((Namespace::Env, _)) => StoreDest::Env(name.to_string()),
        Some((Namespace::Global | Namespace::Autoload, _)) => StoreDest::Global(name.to_string()),
        Some((Namespace::Buffer, _)) => StoreDest::Buffer(name.to_string()),
        Some((Namespace::Window, _)) => StoreDest::Window(name.to_string()),
        Some((Namespace::Tab, _)) => StoreDest::Tab(name.to_string()),
        _ => return Err(ScriptError::syntax(format!("variable {name} needs a namespace"), span).into()),
    };
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(source: &str) -> Vec<(String, Vec<&'static str>)> {
        run(source, CompileType::Normal)
            .unwrap()
            .iter()
            .map(|f| (f.name.clone(), f.instrs.instrs().iter().map(|i| i.op.name()).collect()))
            .collect()
    }

    fn only(source: &str) -> Vec<&'static str> {
        let mut funcs = names(source);
        assert_eq!(funcs.len(), 1);
        funcs.remove(0).1
    }

    #[test]
    fn body_gets_trailing_return() {
        assert_eq!(only("begin Main\nnr 5\necho 1\nend"), ["PUSHNR", "ECHO", "RETURN_VOID"]);
        assert_eq!(only("begin Main\nnr 5\nreturn\nend"), ["PUSHNR", "RETURN"]);
    }

    #[test]
    fn store_after_constant_fuses() {
        assert_eq!(only("begin Main\nnr 5\nstore local 0 decl\nend"), ["STORENR", "RETURN_VOID"]);
        assert_eq!(only("begin Main\nnr 0\nstore local 0 decl\nend"), ["RETURN_VOID"]);
        assert_eq!(
            only("begin Main\nwhile\nnr 0\nstore local 0 decl\nendwhile\nend"),
            ["STORENR", "JUMP", "RETURN_VOID"]
        );
    }

    #[test]
    fn store_without_expression_does_not_fuse() {
        // the values pushed by UNPACK are stored one by one
        let src = "begin Main\nnr 1\nnr 2\nlist 2\nunpack 2\nstore local 0\nstore local 1\nend";
        assert_eq!(only(src), ["PUSHNR", "PUSHNR", "NEWLIST", "UNPACK", "STORE", "STORE", "RETURN_VOID"]);
    }

    #[test]
    fn forward_jump_to_label() {
        let funcs = run("begin Main\nbool true\njump false done\nnr 1\necho 1\nlabel done\nend", CompileType::Normal).unwrap();
        let instrs = funcs[0].instrs.instrs();
        assert!(matches!(instrs[1].op, Op::Jump { when: JumpWhen::IfFalse, target: Some(4) }));
    }

    #[test]
    fn undefined_label() {
        let err = run("begin Main\njump always nowhere\nend", CompileType::Normal).unwrap_err();
        assert!(matches!(err, ScriptError::UndefinedLabel { ref name, .. } if name == "nowhere"));
    }

    #[test]
    fn for_loop_is_patched() {
        let src = "begin Main\nnr 1\nlist 1\nfor 0\nstore local 0\nendfor\nend";
        let funcs = run(src, CompileType::Normal).unwrap();
        let instrs = funcs[0].instrs.instrs();
        assert!(matches!(instrs[2].op, Op::For { loop_idx: 0, end: Some(5) }));
        assert!(matches!(instrs[4].op, Op::Jump { when: JumpWhen::Always, target: Some(2) }));
        assert!(matches!(instrs[5].op, Op::Drop));
    }

    #[test]
    fn try_targets() {
        let src = "begin Main\ntry\nnr 1\nthrow\ncatch\nfinally\nendtry\nend";
        let funcs = run(src, CompileType::Normal).unwrap();
        let Op::Try(ref t) = funcs[0].instrs.instrs()[0].op else { panic!("expected TRY") };
        assert_eq!((t.catch, t.finally, t.endtry), (Some(3), Some(4), Some(5)));
    }

    #[test]
    fn callee_compiled_on_demand() {
        let src = "func Add(number, number): number\nbegin Main\nnr 1\nnr 2\ncall Add 2\ndrop\nend\nbegin Add\nload local 0 number\nload local 1 number\nop +\nreturn\nend";
        let funcs = names(src);
        assert_eq!(funcs[0].0, "Add");
        assert_eq!(funcs[1].0, "Main");
        assert_eq!(funcs[1].1, ["PUSHNR", "PUSHNR", "DCALL", "DROP", "RETURN_VOID"]);
        assert_eq!(funcs.len(), 2);
    }

    #[test]
    fn call_to_broken_function() {
        let src = "func Broken() broken\nbegin Main\ncall Broken 0\nend";
        let err = run(src, CompileType::Normal).unwrap_err();
        assert_eq!(err.code(), "ISN-C001");
        assert_eq!(err.span(), Span { start: 32, end: 45 });
    }

    #[test]
    fn error_in_callee_is_reported() {
        let src = "func F()\nbegin Main\ncall F 0\nend\nbegin F\nstr \"a\"\nnr 1\nop -\nend";
        let err = run(src, CompileType::Normal).unwrap_err();
        let ScriptError::Gen { err, func, .. } = err else { panic!("expected a generator error") };
        assert_eq!(func, "F");
        assert!(matches!(err, GenError::RequiresNumberOrFloat { op: '-' }));
    }

    #[test]
    fn recursive_call_uses_dcall() {
        let src = "func Loop(number)\nbegin Loop\nload local 0 number\ncall Loop 1\nend";
        let funcs = names(src);
        assert_eq!(funcs[0].1, ["LOAD", "DCALL", "RETURN_VOID"]);
    }

    #[test]
    fn unbalanced_scopes() {
        assert!(matches!(
            run("begin Main\nwhile\nend", CompileType::Normal),
            Err(ScriptError::Unbalanced { .. })
        ));
        assert!(matches!(
            run("begin Main\nendfor\nend", CompileType::Normal),
            Err(ScriptError::Unbalanced { .. })
        ));
        assert!(matches!(run("begin Main\nnr 1", CompileType::Normal), Err(ScriptError::Unbalanced { .. })));
        assert!(matches!(run("nr 1", CompileType::Normal), Err(ScriptError::Syntax { .. })));
    }

    #[test]
    fn bad_filter_pattern() {
        let err = run("begin Main\nmod filter \"(\"\nexec \"ls\"\nendmod\nend", CompileType::Normal).unwrap_err();
        assert_eq!(err.code(), "ISN-S006");
    }

    #[test]
    fn substitute_and_instr_blocks_nest() {
        let src = "begin Main\nsub \"s/x/\\=y/\"\nload g:y\ntostring\nendsub\ninstr\nnr 1\nendinstr\ndrop\nend";
        let funcs = run(src, CompileType::Normal).unwrap();
        let instrs = funcs[0].instrs.instrs();
        let Op::Substitute(ref sub) = instrs[0].op else { panic!("expected SUBSTITUTE") };
        let inner: Vec<_> = sub.instrs.iter().map(|i| i.op.name()).collect();
        assert_eq!(inner, ["LOADG", "2STRING_ANY", "FINISH"]);
        assert!(matches!(instrs[1].op, Op::InstrBlock(_)));
        assert!(matches!(instrs[2].op, Op::Drop));
    }

    #[test]
    fn lines_follow_script_unless_set() {
        let funcs = run("begin Main\nnr 1\n\necho 1\nend", CompileType::Normal).unwrap();
        let lnums: Vec<_> = funcs[0].instrs.instrs().iter().map(|i| i.lnum).collect();
        assert_eq!(lnums, [2, 4, 5]);

        let funcs = run("begin Main\nline 10\nnr 1\necho 1\nend", CompileType::Normal).unwrap();
        let lnums: Vec<_> = funcs[0].instrs.instrs().iter().map(|i| i.lnum).collect();
        assert_eq!(lnums, [10, 10, 10]);
    }

    #[test]
    fn profile_wraps_body() {
        let funcs = run("begin Main\nprofile\nnr 1\necho 1\nprofile\nend", CompileType::Profile).unwrap();
        let ops: Vec<_> = funcs[0].instrs.instrs().iter().map(|i| i.op.name()).collect();
        assert_eq!(ops, ["PROFILE START", "PUSHNR", "ECHO", "PROFILE END", "PROFILE START", "PROFILE END", "RETURN_VOID"]);
    }

    #[test]
    fn underflow_is_reported_not_panicked() {
        let cases: &[(&str, usize, usize)] = &[
            ("op +", 2, 0),
            ("cmp ==", 2, 1),
            ("echo 1", 1, 0),
            ("echo 3", 3, 1),
            ("drop", 1, 0),
            ("store local 0", 1, 0),
            ("store g:x", 1, 0),
            ("jump false done\nlabel done", 1, 0),
            ("pcall 1 F any", 2, 1),
            ("call F 1", 1, 0),
            ("list 2", 2, 1),
            ("dict 1", 2, 1),
            ("listappend", 2, 1),
            ("tostring -2", 2, 1),
            ("return", 1, 0),
            ("throw", 1, 0),
            ("unpack 2", 1, 0),
        ];
        for &(body, need, have) in cases {
            let pushes = "nr 1\n".repeat(have);
            let src = format!("func F(number)\nbegin Main\n{pushes}{body}\nend\nbegin F\nend");
            let err = run(&src, CompileType::Normal).unwrap_err();
            let ScriptError::StackUnderflow { need: n, have: h, span } = &err else {
                panic!("{body}: expected an underflow, got {err:?}");
            };
            assert_eq!((*n, *h), (need, have), "{body}");
            let line = &src[span.start..span.end];
            assert_eq!(line, body.lines().next().unwrap_or_default(), "{body}");
            assert_eq!(err.code(), "ISN-S007");
        }
    }

    #[test]
    fn underflow_is_not_checked_while_skipping() {
        assert_eq!(only("begin Main\nskip on\nop +\necho 2\nskip off\nend"), ["RETURN_VOID"]);
    }

    #[test]
    fn skipped_code_emits_nothing() {
        assert_eq!(only("begin Main\nskip on\nstr \"dead\"\necho 1\nskip off\nend"), ["RETURN_VOID"]);
    }

    #[test]
    fn named_stores() {
        let src = "begin Main\nnr 2\nstore &l:sw\nstr \"x\"\nstore $HOME\nnr 1\nstore g:auto#var\nstr \"f\"\nstore &opfunc\nend";
        assert_eq!(only(src), [
            "PUSHNR", "STOREOPT", "PUSHS", "STOREENV", "PUSHNR", "STOREAUTO", "PUSHS", "STOREFUNCOPT", "RETURN_VOID"
        ]);
        assert!(run("begin Main\nnr 1\nstore count\nend", CompileType::Normal).is_err());
    }
}

use crate::context::CompileCtx;
use crate::error::{GenError, GenResult};
use crate::instr::{Namespace, Op, OuterRef, ScriptName, ScriptRef, StoreOpt, UnletKind};
use crate::types::Type;

/// Predefined `v:` variables with their types, indexed by LOADV/STOREV.
pub static VIM_VARS: &[(&str, Type)] = &[
    ("count", Type::Number),
    ("count1", Type::Number),
    ("errmsg", Type::String),
    ("shell_error", Type::Number),
    ("this_session", Type::String),
    ("version", Type::Number),
    ("lnum", Type::Number),
    ("false", Type::Bool),
    ("true", Type::Bool),
    ("none", Type::Special),
    ("null", Type::Special),
    ("key", Type::Any),
    ("val", Type::Any),
    ("exception", Type::String),
    ("throwpoint", Type::String),
    ("register", Type::String),
];

pub fn find_vim_var(name: &str) -> Option<usize> {
    VIM_VARS.iter().position(|(n, _)| *n == name)
}

/// Variable read or written by name, index or slot.
#[derive(Debug, Clone, PartialEq)]
pub enum VarRef {
    Local(usize),
    Outer(OuterRef),
    Vim(usize),
    Register(char),
    Named { ns: Namespace, name: String },
    /// Script variable of an old-style script.
    OldScript(ScriptName),
    Script(ScriptRef),
}

/// Destination of an assignment other than a local variable.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreDest {
    /// `&name`, `&l:name` or `&g:name`.
    Option { name: String, flags: u32 },
    /// Option holding a function, such as `&operatorfunc`.
    FuncOption { name: String, flags: u32 },
    Global(String),
    Buffer(String),
    Window(String),
    Tab(String),
    /// `$NAME`.
    Env(String),
    /// `@r`, where `@@` is the unnamed register.
    Register(String),
    Vim(usize),
    Script { name: String, sid: u32, idx: Option<usize>, seq: u32, ty: Type },
}

/// Local variable slot, possibly in an enclosing function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVar {
    pub idx: usize,
    /// Nesting depth of the function that owns the slot, 0 for this one.
    pub from_outer: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LhsDest {
    Local(LocalVar),
    Var(StoreDest),
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Lhs {
    pub dest: LhsDest,
    pub ty: Type,
}

fn skip_option_env_lead(name: &str) -> &str {
    let name = name.strip_prefix('&').unwrap_or(name);
    name.strip_prefix("l:").or_else(|| name.strip_prefix("g:")).unwrap_or(name)
}

fn strip_ns(name: &str) -> &str {
    match name.as_bytes() {
        [b'g' | b'b' | b'w' | b't', b':', ..] => &name[2..],
        _ => name,
    }
}

impl CompileCtx {
    /// Push the value of `var`. `ty` is its static type, any when unknown.
    pub fn emit_load(&mut self, var: VarRef, ty: Option<Type>) -> GenResult<()> {
        return_ok_if_skip!(self);
        let ty = ty.unwrap_or(Type::Any);
        match var {
            VarRef::Local(idx) => {
                self.emit_instr_type2(Op::Load(idx), ty.clone(), ty);
            }
            VarRef::Outer(outer) => {
                self.emit_instr_type2(Op::LoadOuter(outer), ty.clone(), ty);
            }
            VarRef::Vim(idx) => {
                self.emit_instr_type(Op::LoadV(idx), ty);
            }
            VarRef::Register(c) => {
                self.emit_instr_type(Op::LoadReg(c), ty);
            }
            VarRef::Named { ns, name } => {
                self.emit_instr_type(Op::LoadNs { ns, name }, ty);
            }
            VarRef::OldScript(s) => {
                self.emit_instr_type(Op::LoadS(s), ty);
            }
            VarRef::Script(s) => {
                self.emit_instr_type(Op::LoadScript(Box::new(s)), ty);
            }
        }
        Ok(())
    }

    /// Push `v:name`.
    pub fn emit_loadv(&mut self, name: &str) -> GenResult<()> {
        return_ok_if_skip!(self);
        let idx = find_vim_var(name).ok_or_else(|| GenError::UnknownVimVar { name: name.to_string() })?;
        let ty = VIM_VARS[idx].1.clone();
        self.emit_instr_type(Op::LoadV(idx), ty);
        Ok(())
    }

    /// Pop the top value into local slot `idx`.
    pub fn emit_store_local(&mut self, idx: usize) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_drop(Op::Store(idx), 1);
        Ok(())
    }

    /// Pop the top value into slot `idx` of the function `depth` levels out.
    pub fn emit_store_outer(&mut self, idx: usize, depth: usize) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_drop(Op::StoreOuter(OuterRef { idx, depth }), 1);
        Ok(())
    }

    /// Store the constant `val` in local slot `idx` without using the stack.
    pub fn emit_storenr(&mut self, idx: usize, val: i64) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::StoreNr { idx, val });
        Ok(())
    }

    /// Pop the top value into a non-local destination.
    pub fn emit_store_var(&mut self, dest: &StoreDest) -> GenResult<()> {
        return_ok_if_skip!(self);
        let op = match dest {
            StoreDest::Option { name, flags } => {
                Op::StoreOpt(StoreOpt { name: skip_option_env_lead(name).to_string(), flags: *flags })
            }
            StoreDest::FuncOption { name, flags } => {
                Op::StoreFuncOpt(StoreOpt { name: skip_option_env_lead(name).to_string(), flags: *flags })
            }
            StoreDest::Global(name) => {
                let name = strip_ns(name);
                let ns = if name.contains('#') { Namespace::Autoload } else { Namespace::Global };
                Op::StoreNs { ns, name: name.to_string() }
            }
            StoreDest::Buffer(name) => Op::StoreNs { ns: Namespace::Buffer, name: strip_ns(name).to_string() },
            StoreDest::Window(name) => Op::StoreNs { ns: Namespace::Window, name: strip_ns(name).to_string() },
            StoreDest::Tab(name) => Op::StoreNs { ns: Namespace::Tab, name: strip_ns(name).to_string() },
            StoreDest::Env(name) => {
                Op::StoreNs { ns: Namespace::Env, name: name.strip_prefix('$').unwrap_or(name).to_string() }
            }
            StoreDest::Register(name) => {
                let reg = match name.chars().nth(1) {
                    Some('@') | None => '"',
                    Some(c) => c,
                };
                Op::StoreReg(reg)
            }
            StoreDest::Vim(idx) => Op::StoreV(*idx),
            StoreDest::Script { name, sid, idx: None, .. } => {
                Op::StoreS(ScriptName { name: name.clone(), sid: *sid })
            }
            StoreDest::Script { sid, idx: Some(idx), seq, ty, .. } => {
                Op::StoreScript(Box::new(ScriptRef { sid: *sid, idx: *idx, seq: *seq, ty: ty.clone() }))
            }
        };
        self.emit_instr_drop(op, 1);
        Ok(())
    }

    /// Store the value of an assignment's right-hand side, compiled after
    /// `mark` was taken, into `lhs`.
    ///
    /// When the right-hand side was a single number constant going into a
    /// local of this function, the push is rewritten to STORENR. A
    /// declaration initializing to zero outside of a loop is dropped
    /// altogether, locals start out as zero.
    pub fn emit_store_lhs(&mut self, lhs: &Lhs, mark: usize, is_decl: bool) -> GenResult<()> {
        return_ok_if_skip!(self);
        let lvar = match &lhs.dest {
            LhsDest::Var(dest) => return self.emit_store_var(dest),
            LhsDest::Local(lvar) => *lvar,
        };
        let sole_nr = match self.instr.sole_since(mark).map(|i| &i.op) {
            Some(Op::PushNr(val)) if lvar.from_outer == 0 => Some(*val),
            _ => None,
        };
        if let Some(val) = sole_nr {
            if val == 0 && is_decl && !self.inside_loop_scope() {
                self.instr.retract_sole(mark);
                tracing::debug!(idx = lvar.idx, "dropped zero initialization");
            } else {
                self.instr.rewrite_sole(mark, Op::StoreNr { idx: lvar.idx, val });
            }
            if !self.type_stack.is_empty() {
                self.type_stack.pop(1);
            }
            return Ok(());
        }
        if lvar.from_outer > 0 {
            self.emit_store_outer(lvar.idx, lvar.from_outer)
        } else {
            self.emit_store_local(lvar.idx)
        }
    }

    /// `:unlet name` or `:unlet $NAME`.
    pub fn emit_unlet(&mut self, kind: UnletKind, name: &str, forceit: bool) -> GenResult<()> {
        return_ok_if_skip!(self);
        let name = match kind {
            UnletKind::Env => name.strip_prefix('$').unwrap_or(name),
            UnletKind::Var => name,
        };
        self.emit_instr(Op::Unlet { kind, name: name.to_string(), forceit });
        Ok(())
    }

    /// Make the value just stored constant.
    pub fn emit_lockconst(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::LockConst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ScopeKind, Skip};
    use crate::generate::test_util::*;

    fn local(idx: usize) -> Lhs {
        Lhs { dest: LhsDest::Local(LocalVar { idx, from_outer: 0 }), ty: Type::Number }
    }

    #[test]
    fn load_kinds() {
        let mut c = ctx();
        c.emit_load(VarRef::Local(2), Some(Type::String)).unwrap();
        c.emit_load(VarRef::Named { ns: Namespace::Buffer, name: "x".into() }, None).unwrap();
        c.emit_loadv("count").unwrap();
        assert_eq!(names(&c), ["LOAD", "LOADB", "LOADV"]);
        assert_eq!(c.type_stack().peek_entry(2).decl, Type::String);
        assert_eq!(c.type_stack().peek(1), &Type::Any);
        assert_eq!(c.type_stack().peek(0), &Type::Number);
        assert!(matches!(c.emit_loadv("nope"), Err(GenError::UnknownVimVar { .. })));
    }

    #[test]
    fn store_constant_fuses() {
        let mut c = ctx();
        let mark = c.mark();
        c.emit_push_nr(5).unwrap();
        c.emit_store_lhs(&local(1), mark, true).unwrap();
        assert!(matches!(ops(&c)[..], [Op::StoreNr { idx: 1, val: 5 }]));
        assert!(c.type_stack().is_empty());
    }

    #[test]
    fn zero_declaration_elided() {
        let mut c = ctx();
        let mark = c.mark();
        c.emit_push_nr(0).unwrap();
        c.emit_store_lhs(&local(0), mark, true).unwrap();
        assert!(c.instrs().is_empty());
        assert!(c.type_stack().is_empty());
    }

    #[test]
    fn zero_store_kept_in_loop_or_assignment() {
        let mut c = ctx();
        c.push_scope(ScopeKind::While);
        let mark = c.mark();
        c.emit_push_nr(0).unwrap();
        c.emit_store_lhs(&local(0), mark, true).unwrap();
        assert!(matches!(ops(&c)[..], [Op::StoreNr { idx: 0, val: 0 }]));

        let mut c = ctx();
        let mark = c.mark();
        c.emit_push_nr(0).unwrap();
        c.emit_store_lhs(&local(0), mark, false).unwrap();
        assert!(matches!(ops(&c)[..], [Op::StoreNr { idx: 0, val: 0 }]));
    }

    #[test]
    fn expression_store_not_fused() {
        let mut c = ctx();
        let mark = c.mark();
        c.emit_push_nr(2).unwrap();
        c.emit_push_nr(3).unwrap();
        c.emit_two_op(crate::generate::ArithOp::Add).unwrap();
        c.emit_store_lhs(&local(0), mark, true).unwrap();
        assert_eq!(names(&c), ["PUSHNR", "PUSHNR", "OPNR", "STORE"]);
        assert!(c.type_stack().is_empty());
    }

    #[test]
    fn outer_store_not_fused() {
        let mut c = ctx();
        let mark = c.mark();
        c.emit_push_nr(4).unwrap();
        let lhs = Lhs { dest: LhsDest::Local(LocalVar { idx: 3, from_outer: 1 }), ty: Type::Number };
        c.emit_store_lhs(&lhs, mark, false).unwrap();
        assert!(matches!(ops(&c)[..], [Op::PushNr(4), Op::StoreOuter(OuterRef { idx: 3, depth: 1 })]));
    }

    #[test]
    fn store_destinations() {
        let mut c = ctx_with(&vec![Type::Any; 8]);
        c.emit_store_var(&StoreDest::Option { name: "&l:shiftwidth".into(), flags: 4 }).unwrap();
        c.emit_store_var(&StoreDest::Global("g:dir#var".into())).unwrap();
        c.emit_store_var(&StoreDest::Global("g:plain".into())).unwrap();
        c.emit_store_var(&StoreDest::Env("$HOME".into())).unwrap();
        c.emit_store_var(&StoreDest::Register("@@".into())).unwrap();
        c.emit_store_var(&StoreDest::Register("@a".into())).unwrap();
        c.emit_store_var(&StoreDest::Script { name: "s:x".into(), sid: 3, idx: None, seq: 0, ty: Type::Any })
            .unwrap();
        c.emit_store_var(&StoreDest::Script {
            name: "x".into(),
            sid: 3,
            idx: Some(1),
            seq: 2,
            ty: Type::Number,
        })
        .unwrap();
        assert!(c.type_stack().is_empty());
        let ops = ops(&c);
        assert!(matches!(ops[0], Op::StoreOpt(StoreOpt { name, flags: 4 }) if name == "shiftwidth"));
        assert!(matches!(ops[1], Op::StoreNs { ns: Namespace::Autoload, name } if name == "dir#var"));
        assert!(matches!(ops[2], Op::StoreNs { ns: Namespace::Global, name } if name == "plain"));
        assert!(matches!(ops[3], Op::StoreNs { ns: Namespace::Env, name } if name == "HOME"));
        assert!(matches!(ops[4], Op::StoreReg('"')));
        assert!(matches!(ops[5], Op::StoreReg('a')));
        assert!(matches!(ops[6], Op::StoreS(ScriptName { sid: 3, .. })));
        assert!(matches!(ops[7], Op::StoreScript(s) if s.idx == 1 && s.seq == 2));
    }

    #[test]
    fn unlet_env_strips_dollar() {
        let mut c = ctx();
        c.emit_unlet(UnletKind::Env, "$FOO", true).unwrap();
        assert!(matches!(ops(&c)[..], [Op::Unlet { kind: UnletKind::Env, name, forceit: true }] if name == "FOO"));
    }

    #[test]
    fn skipped_store_does_nothing() {
        let mut c = ctx_with(&[Type::Number]);
        c.skip = Skip::Yes;
        let mark = c.mark();
        c.emit_store_lhs(&local(0), mark, true).unwrap();
        c.emit_store_var(&StoreDest::Vim(0)).unwrap();
        assert!(c.instrs().is_empty());
        assert_eq!(c.type_stack().len(), 1);
    }
}

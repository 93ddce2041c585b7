use crate::context::{CompileCtx, CompileType};
use crate::error::GenResult;
use crate::instr::{CmdMod, ExecKind, Instr, JumpWhen, MultKind, Op, Substitute, TryRef};
use crate::types::Type;

impl CompileCtx {
    // ── Control flow ────────────────────────────────────────────────

    /// Jump to `target`, or to a target patched in later when `None`. A
    /// conditional jump pops the condition. Returns the jump's index.
    pub fn emit_jump(&mut self, when: JumpWhen, target: Option<usize>) -> Option<usize> {
        if self.is_skipping() {
            return None;
        }
        if when != JumpWhen::Always {
            self.type_stack.pop(1);
        }
        self.emit_instr(Op::Jump { when, target })
    }

    /// Jump when argument `arg_off` was passed, skipping its default value.
    pub fn emit_jump_if_arg_set(&mut self, arg_off: i32) -> Option<usize> {
        self.emit_instr(Op::JumpIfArgSet { arg_off, target: None })
    }

    /// Start of a `:for` loop over the value on top of the stack. Pushes a
    /// slot for the loop variable, typed any until it is known.
    pub fn emit_for(&mut self, loop_idx: usize) -> Option<usize> {
        self.emit_instr_type(Op::For { loop_idx, end: None }, Type::Any)
    }

    /// `:continue` or `:break` out of `levels` try blocks, then jump to
    /// `target`.
    pub fn emit_trycont(&mut self, levels: usize, target: usize) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::TryCont { levels, target });
        Ok(())
    }

    pub fn emit_try(&mut self) -> Option<usize> {
        self.emit_instr(Op::Try(Box::new(TryRef::default())))
    }

    pub fn emit_catch(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::Catch);
        Ok(())
    }

    pub fn emit_finally(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::Finally);
        Ok(())
    }

    pub fn emit_endtry(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::EndTry);
        Ok(())
    }

    /// Throw the value on top of the stack.
    pub fn emit_throw(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_drop(Op::Throw, 1);
        Ok(())
    }

    /// Return the value on top of the stack.
    pub fn emit_return(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_drop(Op::Return, 1);
        Ok(())
    }

    pub fn emit_return_void(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::ReturnVoid);
        Ok(())
    }

    /// Discard the value on top of the stack.
    pub fn emit_drop(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_drop(Op::Drop, 1);
        Ok(())
    }

    // ── Commands ────────────────────────────────────────────────────

    /// `:echo` or `:echon` of the top `count` values.
    pub fn emit_echo(&mut self, with_white: bool, count: usize) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_drop(Op::Echo { with_white, count }, count);
        Ok(())
    }

    /// `:execute`, `:echomsg`, `:echoerr` or `:echoconsole` of the top
    /// `count` values.
    pub fn emit_mult_expr(&mut self, kind: MultKind, count: usize) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_drop(Op::MultExpr { kind, count }, count);
        Ok(())
    }

    /// `:put` from register `regname` below line `lnum`.
    pub fn emit_put(&mut self, regname: char, lnum: i64) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::Put { regname, lnum });
        Ok(())
    }

    /// Run an Ex command line, taking ownership of it.
    pub fn emit_exec(&mut self, kind: ExecKind, line: String) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::Exec { kind, line });
        Ok(())
    }

    /// Run an Ex command line borrowed from the caller.
    pub fn emit_exec_copy(&mut self, kind: ExecKind, line: &str) -> GenResult<()> {
        self.emit_exec(kind, line.to_string())
    }

    /// Evaluate `line` with legacy script semantics, pushing the result.
    pub fn emit_legacy_eval(&mut self, line: &str) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_type(Op::LegacyEval(line.to_string()), Type::Any);
        Ok(())
    }

    /// Concatenate the top `count` strings and run them as a command.
    pub fn emit_execconcat(&mut self, count: usize) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_drop(Op::ExecConcat(count), count);
        Ok(())
    }

    /// Evaluate a line range, pushing the line number.
    pub fn emit_range(&mut self, range: String) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_type(Op::Range(range), Type::Number);
        Ok(())
    }

    /// Split the list on top of the stack into `count` values. With
    /// `semicolon` the last one gets the remaining items.
    pub fn emit_unpack(&mut self, count: usize, semicolon: bool) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_drop(Op::Unpack { count, semicolon }, 1);
        for _ in 0..count {
            self.type_stack.push_type(Type::Any);
        }
        Ok(())
    }

    /// Apply command modifiers for the next command. The modifier, with its
    /// filter pattern, moves into the instruction.
    pub fn emit_cmdmods(&mut self, cmod: CmdMod) -> GenResult<()> {
        return_ok_if_skip!(self);
        if !cmod.is_set() {
            return Ok(());
        }
        self.emit_instr(Op::CmdMod(Box::new(cmod)));
        self.has_cmdmod = true;
        Ok(())
    }

    /// Undo command modifiers applied by [`emit_cmdmods`](CompileCtx::emit_cmdmods).
    pub fn emit_undo_cmdmods(&mut self) -> GenResult<()> {
        if self.has_cmdmod {
            self.emit_instr(Op::CmdModRev);
        }
        self.has_cmdmod = false;
        Ok(())
    }

    /// `:s` with an expression compiled into `instrs`, see
    /// [`begin_nested`](CompileCtx::begin_nested).
    pub fn emit_substitute(&mut self, cmd: String, instrs: Vec<Instr>) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::Substitute(Box::new(Substitute { cmd, instrs })));
        Ok(())
    }

    /// Push an expression compiled into `instrs`, evaluated by whoever
    /// receives it.
    pub fn emit_instr_block(&mut self, instrs: Vec<Instr>) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_type(Op::InstrBlock(instrs), Type::Instr);
        Ok(())
    }

    // ── Debugging and profiling ─────────────────────────────────────

    /// Breakpoint check before a statement, when compiling for debugging.
    pub fn may_emit_debug(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        if self.compile_type == CompileType::Debug {
            let var_count = self.local_names().len();
            let break_lnum = self.prev_lnum + 1;
            self.emit_instr(Op::Debug { var_count, break_lnum });
        }
        Ok(())
    }

    /// Start timing a line, ending the previous one, when profiling.
    pub fn may_emit_prof_start(&mut self, first_line: bool) -> GenResult<()> {
        return_ok_if_skip!(self);
        if self.compile_type == CompileType::Profile {
            if !first_line {
                self.emit_instr(Op::ProfEnd);
            }
            self.emit_instr(Op::ProfStart);
        }
        Ok(())
    }

    pub fn may_emit_prof_end(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        if self.compile_type == CompileType::Profile {
            self.emit_instr(Op::ProfEnd);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::context::{CompileCtx, CompileType, Skip};
    use crate::func::{FuncHandle, UserFunc};
    use crate::generate::test_util::*;
    use crate::instr::{CMOD_SILENT, CmdFilter, CmdMod, ExecKind, JumpWhen, MultKind, Op, TryPart};
    use crate::types::Type;

    #[test]
    fn conditional_jump_pops() {
        let mut c = ctx_with(&[Type::Bool]);
        let j = c.emit_jump(JumpWhen::IfFalse, None).unwrap();
        assert!(c.type_stack().is_empty());
        c.emit_jump(JumpWhen::Always, Some(0));
        c.instr.patch_jump(j, 2);
        assert!(matches!(ops(&c)[..], [Op::Jump { target: Some(2), .. }, Op::Jump { when: JumpWhen::Always, .. }]));
    }

    #[test]
    fn for_pushes_loop_var() {
        let mut c = ctx_with(&[Type::list(Type::Number)]);
        let at = c.emit_for(0).unwrap();
        assert_eq!(c.type_stack().len(), 2);
        assert_eq!(c.type_stack().peek(0), &Type::Any);
        c.instr.patch_jump(at, 5);
        assert!(matches!(ops(&c)[..], [Op::For { end: Some(5), .. }]));
    }

    #[test]
    fn try_block_patching() {
        let mut c = ctx();
        let at = c.emit_try().unwrap();
        c.emit_catch().unwrap();
        c.instr.patch_try(at, TryPart::Catch, 1);
        c.emit_endtry().unwrap();
        c.instr.patch_try(at, TryPart::EndTry, 2);
        assert_eq!(names(&c), ["TRY", "CATCH", "ENDTRY"]);
    }

    #[test]
    fn echo_and_exec_pop() {
        let mut c = ctx_with(&[Type::String, Type::Number, Type::String]);
        c.emit_echo(true, 2).unwrap();
        c.emit_mult_expr(MultKind::EchoMsg, 1).unwrap();
        assert!(c.type_stack().is_empty());
        c.emit_exec_copy(ExecKind::Exec, "set nu").unwrap();
        c.emit_legacy_eval("g:x").unwrap();
        c.emit_range("1,$".into()).unwrap();
        assert_eq!(names(&c), ["ECHO", "ECHOMSG", "EXEC", "LEGACY_EVAL", "RANGE"]);
        assert_eq!(c.type_stack().peek(0), &Type::Number);
        assert_eq!(c.type_stack().peek(1), &Type::Any);
    }

    #[test]
    fn unpack_replaces_list_with_items() {
        let mut c = ctx_with(&[Type::list(Type::Number)]);
        c.emit_unpack(3, true).unwrap();
        assert_eq!(c.type_stack().len(), 3);
    }

    #[test]
    fn cmdmod_pairs_with_undo() {
        let mut c = ctx();
        c.emit_cmdmods(CmdMod::default()).unwrap();
        c.emit_undo_cmdmods().unwrap();
        assert!(c.instrs().is_empty());

        let filter = CmdFilter { regex: regex::Regex::new("^foo").unwrap(), force: false };
        c.emit_cmdmods(CmdMod { flags: CMOD_SILENT, filter: Some(filter), ..Default::default() }).unwrap();
        assert!(c.has_cmdmod);
        c.emit_exec_copy(ExecKind::Exec, "ls").unwrap();
        c.emit_undo_cmdmods().unwrap();
        assert!(!c.has_cmdmod);
        assert_eq!(names(&c), ["CMDMOD", "EXEC", "CMDMOD_REV"]);
        assert_eq!(c.instrs().owned().patterns, 1);
    }

    #[test]
    fn substitute_with_nested_expr() {
        let mut c = ctx();
        c.begin_nested();
        c.emit_push_s(Some("x".into())).unwrap();
        let nested = c.end_nested();
        c.emit_substitute("s/a/\\=expr/".into(), nested).unwrap();
        assert_eq!(names(&c), ["SUBSTITUTE"]);
        assert!(c.type_stack().is_empty());
        assert_eq!(c.instrs().owned().nested, 1);
    }

    #[test]
    fn debug_and_profile_only_for_their_compile_type() {
        let mut c = ctx();
        c.may_emit_debug().unwrap();
        c.may_emit_prof_start(true).unwrap();
        assert!(c.instrs().is_empty());

        let mut c = CompileCtx::new(FuncHandle::new(UserFunc::new("P")), CompileType::Profile);
        c.may_emit_prof_start(true).unwrap();
        c.may_emit_prof_start(false).unwrap();
        c.may_emit_prof_end().unwrap();
        assert_eq!(names(&c), ["PROFILE START", "PROFILE END", "PROFILE START", "PROFILE END"]);

        let mut c = CompileCtx::new(FuncHandle::new(UserFunc::new("D")), CompileType::Debug);
        c.add_local("x");
        c.set_line(3);
        c.set_line(4);
        c.may_emit_debug().unwrap();
        assert!(matches!(ops(&c)[..], [Op::Debug { var_count: 1, break_lnum: 4 }]));
    }

    #[test]
    fn skipping_commands() {
        let mut c = ctx_with(&[Type::Bool]);
        c.skip = Skip::Yes;
        assert_eq!(c.emit_jump(JumpWhen::IfTrue, None), None);
        assert_eq!(c.emit_for(0), None);
        c.emit_echo(false, 1).unwrap();
        c.emit_exec(ExecKind::ExecSplit, "owned".into()).unwrap();
        c.emit_cmdmods(CmdMod { flags: CMOD_SILENT, ..Default::default() }).unwrap();
        assert!(!c.has_cmdmod);
        assert!(c.instrs().is_empty());
        assert_eq!(c.type_stack().len(), 1);
    }
}

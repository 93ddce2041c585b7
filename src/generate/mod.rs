//! Emitters. Every emitter appends zero or more instructions and keeps the
//! type stack in step with what the instructions do to the runtime stack.
//!
//! While code is skipped nothing is emitted, the type stack is untouched and
//! owned inputs are dropped.

/// Return `Ok(())` from an emitter when code is being skipped.
macro_rules! return_ok_if_skip {
    ($ctx:expr) => {
        if $ctx.is_skipping() {
            return Ok(());
        }
    };
}
pub(crate) use return_ok_if_skip;

mod call;
mod cmd;
mod expr;
mod push;
mod var;

pub use call::*;
pub use cmd::*;
pub use expr::*;
pub use push::*;
pub use var::*;

use crate::context::CompileCtx;
use crate::instr::{Instr, Op};
use crate::types::Type;

impl CompileCtx {
    /// Append `op` tagged with the current line. Returns its index, or
    /// `None` when skipping.
    pub fn emit_instr(&mut self, op: Op) -> Option<usize> {
        if self.is_skipping() {
            return None;
        }
        let lnum = self.lnum + 1;
        tracing::trace!(idx = self.instr.len(), op = op.name(), lnum, "emit");
        Some(self.instr.push(Instr { op, lnum }))
    }

    /// Append `op` after popping `drop` values.
    pub fn emit_instr_drop(&mut self, op: Op, drop: usize) -> Option<usize> {
        if self.is_skipping() {
            return None;
        }
        self.type_stack.pop(drop);
        self.emit_instr(op)
    }

    /// Append `op` which pushes a value of type `ty`, declared as any.
    pub fn emit_instr_type(&mut self, op: Op, ty: Type) -> Option<usize> {
        self.emit_instr_type2(op, ty, Type::Any)
    }

    pub fn emit_instr_type2(&mut self, op: Op, ty: Type, decl: Type) -> Option<usize> {
        if self.is_skipping() {
            return None;
        }
        let idx = self.emit_instr(op);
        self.type_stack.push(ty, decl);
        idx
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use crate::context::Skip;
    use crate::instr::Op;
    use crate::types::Type;

    #[test]
    fn emit_tags_line() {
        let mut c = ctx();
        c.lnum = 6;
        assert_eq!(c.emit_instr(Op::Drop), Some(0));
        assert_eq!(c.instrs().instrs()[0].lnum, 7);
    }

    #[test]
    fn skipping_emits_nothing() {
        let mut c = ctx_with(&[Type::Number]);
        c.skip = Skip::Yes;
        assert_eq!(c.emit_instr_drop(Op::Drop, 1), None);
        assert_eq!(c.emit_instr_type(Op::PushNr(3), Type::Number), None);
        assert!(c.instrs().is_empty());
        assert_eq!(c.type_stack().len(), 1);
    }

    #[test]
    fn unknown_skip_still_emits() {
        let mut c = ctx();
        c.skip = Skip::Unknown;
        assert!(c.emit_instr(Op::Drop).is_some());
    }
}

use serde::Serialize;

use crate::func::FuncHandle;
use crate::instr::Instr;
use crate::store::InstrStore;
use crate::type_stack::TypeStack;

/// Variant of a compiled function. Profiling and debugging variants carry
/// extra instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompileType {
    #[default]
    Normal,
    Profile,
    Debug,
}

/// Whether code is currently being skipped, e.g. inside `if false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Skip {
    #[default]
    No,
    Yes,
    /// Condition not known at compile time; code is generated.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeKind {
    Block,
    If,
    While,
    For,
    Try,
}

impl ScopeKind {
    pub fn is_loop(self) -> bool {
        matches!(self, ScopeKind::While | ScopeKind::For)
    }
}

/// Nested instruction list being compiled, with the outer state to restore.
#[derive(Debug)]
struct Nested {
    outer: InstrStore,
    stack_len: usize,
}

/// State of one function being compiled.
#[derive(Debug)]
pub struct CompileCtx {
    pub ufunc: FuncHandle,
    /// Current source line, 0-based. Instructions are tagged with `lnum + 1`.
    pub lnum: u32,
    /// Line of the previous statement, used as the break line of DEBUG.
    pub prev_lnum: u32,
    pub skip: Skip,
    pub compile_type: CompileType,
    pub has_closure: bool,
    /// A CMDMOD was emitted and must be undone after the command.
    pub has_cmdmod: bool,
    pub(crate) instr: InstrStore,
    pub(crate) type_stack: TypeStack,
    scopes: Vec<ScopeKind>,
    local_names: Vec<String>,
    nested: Vec<Nested>,
}

impl CompileCtx {
    pub fn new(ufunc: FuncHandle, compile_type: CompileType) -> Self {
        CompileCtx {
            ufunc,
            lnum: 0,
            prev_lnum: 0,
            skip: Skip::No,
            compile_type,
            has_closure: false,
            has_cmdmod: false,
            instr: InstrStore::new(),
            type_stack: TypeStack::new(),
            scopes: Vec::new(),
            local_names: Vec::new(),
            nested: Vec::new(),
        }
    }

    pub fn is_skipping(&self) -> bool {
        self.skip == Skip::Yes
    }

    pub fn instrs(&self) -> &InstrStore {
        &self.instr
    }

    pub fn type_stack(&self) -> &TypeStack {
        &self.type_stack
    }

    /// Mark taken before compiling an expression, see [`InstrStore::mark`].
    pub fn mark(&self) -> usize {
        self.instr.mark()
    }

    /// Move to source line `lnum` (0-based).
    pub fn set_line(&mut self, lnum: u32) {
        self.prev_lnum = self.lnum;
        self.lnum = lnum;
    }

    pub fn push_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(kind);
    }

    pub fn pop_scope(&mut self) -> Option<ScopeKind> {
        self.scopes.pop()
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Whether the current statement may run more than once because it is
    /// in a loop.
    pub fn inside_loop_scope(&self) -> bool {
        self.scopes.iter().any(|s| s.is_loop())
    }

    /// Declare a local variable and return its slot.
    pub fn add_local(&mut self, name: impl Into<String>) -> usize {
        self.local_names.push(name.into());
        self.local_names.len() - 1
    }

    pub fn local_names(&self) -> &[String] {
        &self.local_names
    }

    /// Start compiling into a fresh instruction list. The type stack depth
    /// is restored by [`end_nested`](CompileCtx::end_nested).
    pub fn begin_nested(&mut self) {
        let outer = std::mem::take(&mut self.instr);
        self.nested.push(Nested { outer, stack_len: self.type_stack.len() });
    }

    /// Finish the nested list started by [`begin_nested`](CompileCtx::begin_nested),
    /// terminating it with FINISH, and switch back to the outer list.
    pub fn end_nested(&mut self) -> Vec<Instr> {
        let Some(nested) = self.nested.pop() else {
            panic!("end_nested without begin_nested");
        };
        self.emit_instr(crate::instr::Op::Finish);
        let inner = std::mem::replace(&mut self.instr, nested.outer);
        assert!(self.type_stack.len() >= nested.stack_len, "nested expression popped outer values");
        self.type_stack.truncate(nested.stack_len);
        inner.into_vec()
    }

    /// Finish compiling and hand over the instructions.
    pub fn into_instrs(self) -> InstrStore {
        self.instr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::UserFunc;
    use crate::instr::Op;
    use crate::types::Type;

    fn ctx() -> CompileCtx {
        CompileCtx::new(FuncHandle::new(UserFunc::new("Test")), CompileType::Normal)
    }

    #[test]
    fn loop_scope_detection() {
        let mut c = ctx();
        c.push_scope(ScopeKind::If);
        assert!(!c.inside_loop_scope());
        c.push_scope(ScopeKind::While);
        c.push_scope(ScopeKind::Block);
        assert!(c.inside_loop_scope());
        c.pop_scope();
        c.pop_scope();
        assert!(!c.inside_loop_scope());
    }

    #[test]
    fn nested_list_is_separate() {
        let mut c = ctx();
        c.emit_push_nr(5).unwrap();
        c.begin_nested();
        c.emit_push_s(Some("x".into())).unwrap();
        let inner = c.end_nested();
        assert_eq!(inner.len(), 2);
        assert!(matches!(inner[1].op, Op::Finish));
        assert_eq!(c.instrs().len(), 1);
        assert_eq!(c.type_stack().len(), 1);
        assert_eq!(c.type_stack().peek(0), &Type::Number);
    }

    #[test]
    fn set_line_tracks_previous() {
        let mut c = ctx();
        c.set_line(4);
        c.set_line(9);
        assert_eq!(c.prev_lnum, 4);
        c.emit_push_nr(2).unwrap();
        assert_eq!(c.instrs().last().map(|i| i.lnum), Some(10));
    }
}

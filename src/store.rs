use serde::Serialize;

use crate::instr::{Instr, Op, Owned, TryPart};

/// Append-only instruction list of the function being compiled.
///
/// Emitters only ever append. The exceptions are jump patching, which fills
/// in a target once it is known, and the store peephole, which may rewrite
/// or retract the one instruction emitted since the caller took a [`mark`].
///
/// [`mark`]: InstrStore::mark
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct InstrStore {
    instrs: Vec<Instr>,
}

impl InstrStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn get(&self, idx: usize) -> Option<&Instr> {
        self.instrs.get(idx)
    }

    pub fn last(&self) -> Option<&Instr> {
        self.instrs.last()
    }

    pub fn push(&mut self, instr: Instr) -> usize {
        self.instrs.push(instr);
        self.instrs.len() - 1
    }

    /// Position to compare against later when deciding whether a single
    /// instruction was emitted for an expression.
    pub fn mark(&self) -> usize {
        self.instrs.len()
    }

    /// The instruction emitted since `mark`, if exactly one was.
    pub fn sole_since(&self, mark: usize) -> Option<&Instr> {
        if self.instrs.len() == mark + 1 { self.instrs.last() } else { None }
    }

    /// Rewrite the sole instruction emitted since `mark`, keeping its line.
    pub fn rewrite_sole(&mut self, mark: usize, op: Op) -> bool {
        if self.instrs.len() != mark + 1 {
            return false;
        }
        if let Some(last) = self.instrs.last_mut() {
            last.op = op;
            return true;
        }
        false
    }

    /// Remove the sole instruction emitted since `mark`.
    pub fn retract_sole(&mut self, mark: usize) -> Option<Instr> {
        if self.instrs.len() != mark + 1 {
            return None;
        }
        self.instrs.pop()
    }

    /// Point the jump at `at` to `target`. Anything but a jump at `at` is a
    /// bug in the caller.
    pub fn patch_jump(&mut self, at: usize, target: usize) {
        match self.instrs.get_mut(at).map(|i| &mut i.op) {
            Some(Op::Jump { target: t, .. }) | Some(Op::JumpIfArgSet { target: t, .. }) => *t = Some(target),
            Some(Op::For { end, .. }) => *end = Some(target),
            other => panic!("patch_jump: no jump at {at}: {other:?}"),
        }
    }

    pub fn patch_try(&mut self, at: usize, part: TryPart, target: usize) {
        match self.instrs.get_mut(at).map(|i| &mut i.op) {
            Some(Op::Try(t)) => match part {
                TryPart::Catch => t.catch = Some(target),
                TryPart::Finally => t.finally = Some(target),
                TryPart::EndTry => t.endtry = Some(target),
            },
            other => panic!("patch_try: no TRY at {at}: {other:?}"),
        }
    }

    /// Take the instructions out, leaving the store empty.
    pub fn take(&mut self) -> Vec<Instr> {
        std::mem::take(&mut self.instrs)
    }

    pub fn into_vec(self) -> Vec<Instr> {
        self.instrs
    }

    /// Resources owned by all instructions in the store.
    pub fn owned(&self) -> Owned {
        let mut o = Owned::default();
        for instr in &self.instrs {
            o += instr.owned();
        }
        o
    }

    /// Drop every instruction and report what was released.
    pub fn clear(&mut self) -> Owned {
        let released = self.owned();
        tracing::debug!(count = self.instrs.len(), ?released, "clearing instructions");
        self.instrs.clear();
        released
    }
}

impl From<Vec<Instr>> for InstrStore {
    fn from(instrs: Vec<Instr>) -> Self {
        InstrStore { instrs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{JumpWhen, TryRef};

    fn at(op: Op) -> Instr {
        Instr { op, lnum: 3 }
    }

    #[test]
    fn sole_since_mark() {
        let mut store = InstrStore::new();
        store.push(at(Op::Drop));
        let mark = store.mark();
        assert!(store.sole_since(mark).is_none());
        store.push(at(Op::PushNr(7)));
        assert!(matches!(store.sole_since(mark).map(|i| &i.op), Some(Op::PushNr(7))));
        assert!(store.rewrite_sole(mark, Op::StoreNr { idx: 0, val: 7 }));
        assert_eq!(store.last().map(|i| i.lnum), Some(3));
        store.push(at(Op::Drop));
        assert!(store.retract_sole(mark).is_none());
    }

    #[test]
    fn patch_jump_sets_target() {
        let mut store = InstrStore::new();
        let j = store.push(at(Op::Jump { when: JumpWhen::IfFalse, target: None }));
        store.push(at(Op::Drop));
        store.patch_jump(j, 2);
        assert!(matches!(store.instrs()[j].op, Op::Jump { target: Some(2), .. }));
    }

    #[test]
    #[should_panic(expected = "no jump")]
    fn patch_jump_rejects_non_jump() {
        let mut store = InstrStore::new();
        store.push(at(Op::Drop));
        store.patch_jump(0, 1);
    }

    #[test]
    fn patch_try_parts() {
        let mut store = InstrStore::new();
        store.push(at(Op::Try(Box::new(TryRef::default()))));
        store.patch_try(0, TryPart::Catch, 4);
        store.patch_try(0, TryPart::EndTry, 9);
        match &store.instrs()[0].op {
            Op::Try(t) => assert_eq!(**t, TryRef { catch: Some(4), finally: None, endtry: Some(9) }),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clear_reports_released() {
        let mut store = InstrStore::new();
        store.push(at(Op::PushS(Some("a".into()))));
        store.push(at(Op::UCall { name: "F".into(), argcount: 0 }));
        store.push(at(Op::PushNr(1)));
        let released = store.clear();
        assert_eq!(released.strings, 2);
        assert!(store.is_empty());
    }
}

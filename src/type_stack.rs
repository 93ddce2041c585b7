use serde::Serialize;

use crate::types::{Type, common_type};

/// One slot of the compile-time stack: the type the value currently has and
/// the type it was declared with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeEntry {
    pub curr: Type,
    pub decl: Type,
}

/// Compile-time mirror of the runtime value stack. Depth 0 is the top.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TypeStack {
    entries: Vec<TypeEntry>,
}

impl TypeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, curr: Type, decl: Type) {
        self.entries.push(TypeEntry { curr, decl });
    }

    /// Push a value whose declared type is any.
    pub fn push_type(&mut self, curr: Type) {
        self.push(curr, Type::Any);
    }

    /// Drop `n` entries. Popping more than the stack holds means an emitter
    /// is out of sync with the runtime stack.
    pub fn pop(&mut self, n: usize) {
        assert!(n <= self.entries.len(), "type stack underflow: popping {n} of {}", self.entries.len());
        self.entries.truncate(self.entries.len() - n);
    }

    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    pub fn peek(&self, depth: usize) -> &Type {
        &self.peek_entry(depth).curr
    }

    pub fn peek_entry(&self, depth: usize) -> &TypeEntry {
        let len = self.entries.len();
        assert!(depth < len, "type stack underflow: depth {depth} of {len}");
        &self.entries[len - 1 - depth]
    }

    /// Replace the current type at `depth`, keeping the declared type.
    pub fn set(&mut self, depth: usize, ty: Type) {
        let len = self.entries.len();
        assert!(depth < len, "type stack underflow: depth {depth} of {len}");
        self.entries[len - 1 - depth].curr = ty;
    }

    /// The top `n` entries, deepest first.
    pub fn top(&self, n: usize) -> &[TypeEntry] {
        assert!(n <= self.entries.len(), "type stack underflow: {n} of {}", self.entries.len());
        &self.entries[self.entries.len() - n..]
    }

    /// Member type for a list or dict literal built from the top `count`
    /// values, where every `skip`th slot holds a value (1 for lists, 2 for
    /// dicts with key/value pairs). Returns the current and declared member.
    pub fn member_type(&self, count: usize, skip: usize) -> (Type, Type) {
        if count == 0 {
            return (Type::Unknown, Type::Unknown);
        }
        let slots = self.top(count * skip);
        let mut values = slots.iter().skip(skip - 1).step_by(skip);
        let Some(first) = values.next() else {
            return (Type::Unknown, Type::Unknown);
        };
        let (mut curr, mut decl) = (first.curr.clone(), first.decl.clone());
        let mut curr_done = curr == Type::Any;
        let mut decl_done = decl == Type::Any;
        for entry in values {
            if !curr_done {
                curr = common_type(&curr, &entry.curr);
                curr_done = curr == Type::Any;
            }
            if !decl_done {
                decl = common_type(&decl, &entry.decl);
                decl_done = decl == Type::Any;
            }
            if curr_done && decl_done {
                break;
            }
        }
        (curr, decl)
    }
}

/// Depth on the type stack of a value at runtime stack `offset` (-1 is top).
pub fn depth_of(offset: i32) -> usize {
    debug_assert!(offset < 0, "runtime stack offset must be negative, got {offset}");
    (-1 - offset) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_peek_set() {
        let mut ts = TypeStack::new();
        ts.push_type(Type::Number);
        ts.push(Type::String, Type::String);
        assert_eq!(ts.peek(0), &Type::String);
        assert_eq!(ts.peek(1), &Type::Number);
        ts.set(1, Type::Float);
        assert_eq!(ts.peek_entry(1).curr, Type::Float);
        assert_eq!(ts.peek_entry(1).decl, Type::Any);
        ts.pop(2);
        assert!(ts.is_empty());
    }

    #[test]
    #[should_panic(expected = "type stack underflow")]
    fn pop_underflow_panics() {
        let mut ts = TypeStack::new();
        ts.push_type(Type::Number);
        ts.pop(2);
    }

    #[test]
    fn member_type_of_list_values() {
        let mut ts = TypeStack::new();
        ts.push_type(Type::Number);
        ts.push_type(Type::NumberBool);
        assert_eq!(ts.member_type(2, 1).0, Type::Number);
        ts.push_type(Type::String);
        assert_eq!(ts.member_type(3, 1).0, Type::Any);
        assert_eq!(ts.member_type(0, 1), (Type::Unknown, Type::Unknown));
    }

    #[test]
    fn member_type_of_dict_skips_keys() {
        let mut ts = TypeStack::new();
        ts.push_type(Type::String);
        ts.push_type(Type::Float);
        ts.push_type(Type::String);
        ts.push_type(Type::Float);
        assert_eq!(ts.member_type(2, 2).0, Type::Float);
    }

    #[test]
    fn offsets_map_to_depths() {
        assert_eq!(depth_of(-1), 0);
        assert_eq!(depth_of(-3), 2);
    }
}

use crate::context::CompileCtx;
use crate::error::{GenError, GenResult};
use crate::instr::{CheckType, CompareKind, ExprOp, Op};
use crate::type_stack::depth_of;
use crate::types::{Type, TypeMatch, VarType, check_type, equal_type};

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub fn from_char(c: char) -> Option<ArithOp> {
        Some(match c {
            '+' => ArithOp::Add,
            '-' => ArithOp::Sub,
            '*' => ArithOp::Mul,
            '/' => ArithOp::Div,
            '%' => ArithOp::Rem,
            _ => return None,
        })
    }

    pub fn symbol(self) -> char {
        match self {
            ArithOp::Add => '+',
            ArithOp::Sub => '-',
            ArithOp::Mul => '*',
            ArithOp::Div => '/',
            ArithOp::Rem => '%',
        }
    }

    fn expr_op(self) -> ExprOp {
        match self {
            ArithOp::Add => ExprOp::Add,
            ArithOp::Sub => ExprOp::Sub,
            ArithOp::Mul => ExprOp::Mult,
            ArithOp::Div => ExprOp::Div,
            ArithOp::Rem => ExprOp::Rem,
        }
    }
}

/// Operand kind to specialize a binary operator for: number, list, float or
/// blob when both sides have that kind, any otherwise.
pub fn operator_type(t1: &Type, t2: &Type) -> VarType {
    let (v1, v2) = (t1.var_type(), t2.var_type());
    if v1 == v2 && matches!(v1, VarType::Number | VarType::List | VarType::Float | VarType::Blob) {
        v1
    } else if matches!((v1, v2), (VarType::Number, VarType::Float) | (VarType::Float, VarType::Number)) {
        VarType::Float
    } else {
        VarType::Any
    }
}

fn check_number_or_float(v1: VarType, v2: VarType, op: char) -> GenResult<()> {
    let numeric = |v: VarType| matches!(v, VarType::Number | VarType::Float) || v.is_any_or_unknown();
    if numeric(v1) && numeric(v2) {
        Ok(())
    } else if op == '+' {
        Err(GenError::WrongArgumentTypeForPlus)
    } else {
        Err(GenError::RequiresNumberOrFloat { op })
    }
}

/// Comparison instruction kind for operands of kinds `t1` and `t2`.
pub fn compare_kind(op: ExprOp, t1: VarType, t2: VarType) -> GenResult<CompareKind> {
    let t1 = if t1 == VarType::Unknown { VarType::Any } else { t1 };
    let t2 = if t2 == VarType::Unknown { VarType::Any } else { t2 };

    let kind = if t1 == t2 {
        match t1 {
            VarType::Bool => CompareKind::Bool,
            VarType::Special => CompareKind::Special,
            VarType::Number => CompareKind::Nr,
            VarType::Float => CompareKind::Float,
            VarType::String => CompareKind::String,
            VarType::Blob => CompareKind::Blob,
            VarType::List => CompareKind::List,
            VarType::Dict => CompareKind::Dict,
            VarType::Func => CompareKind::Func,
            _ => CompareKind::Any,
        }
    } else if t1 == VarType::Any
        || t2 == VarType::Any
        || (matches!(t1, VarType::Number | VarType::Float) && matches!(t2, VarType::Number | VarType::Float))
    {
        CompareKind::Any
    } else {
        return Err(GenError::CannotCompare { left: t1, right: t2 });
    };

    if op.is_identity()
        && matches!(kind, CompareKind::Bool | CompareKind::Special | CompareKind::Nr | CompareKind::Float)
    {
        return Err(GenError::CannotUseIsWith { op: op.symbol(), ty: t1 });
    }
    if !op.is_equality()
        && (matches!(t1, VarType::Bool | VarType::Special) || matches!(t2, VarType::Bool | VarType::Special))
    {
        return Err(GenError::CannotCompare { left: t1, right: t2 });
    }
    if !op.is_equality()
        && !op.is_identity()
        && (matches!(t1, VarType::Blob | VarType::List) || matches!(t2, VarType::Blob | VarType::List))
    {
        return Err(GenError::CannotCompare { left: t1, right: t2 });
    }
    Ok(kind)
}

impl CompileCtx {
    /// Addition of the two values on top of the stack, already known to be
    /// of kind `vartype`. `list_op` is [`ExprOp::Copy`] for `+` and
    /// [`ExprOp::Append`] for `+=`.
    pub fn emit_add_instr(&mut self, vartype: VarType, t1: &Type, t2: &Type, list_op: ExprOp) -> GenResult<()> {
        return_ok_if_skip!(self);
        if !matches!(vartype, VarType::List | VarType::Blob) && !t1.is_any_or_unknown() && !t2.is_any_or_unknown() {
            check_number_or_float(t1.var_type(), t2.var_type(), '+')?;
        }
        let op = match vartype {
            VarType::Number => Op::OpNr(ExprOp::Add),
            VarType::Float => Op::OpFloat(ExprOp::Add),
            VarType::List => Op::AddList(list_op),
            VarType::Blob => Op::AddBlob,
            _ => Op::OpAny(ExprOp::Add),
        };
        self.emit_instr_drop(op, 1);

        // list<number> + list<string> gives list<any>
        if let (Type::List(m1), Type::List(m2)) = (t1, t2)
            && vartype == VarType::List
            && !equal_type(m1, m2)
        {
            self.type_stack.set(0, Type::list_any());
        }
        Ok(())
    }

    /// Binary arithmetic on the two values on top of the stack.
    pub fn emit_two_op(&mut self, op: ArithOp) -> GenResult<()> {
        return_ok_if_skip!(self);
        let t1 = self.type_stack.peek(1).clone();
        let t2 = self.type_stack.peek(0).clone();
        let vartype = operator_type(&t1, &t2);
        tracing::debug!(op = %op.symbol(), left = %t1, right = %t2, ?vartype, "two_op");

        match op {
            ArithOp::Add => self.emit_add_instr(vartype, &t1, &t2, ExprOp::Copy)?,
            ArithOp::Sub | ArithOp::Mul | ArithOp::Div => {
                check_number_or_float(t1.var_type(), t2.var_type(), op.symbol())?;
                let isn = match vartype {
                    VarType::Number => Op::OpNr(op.expr_op()),
                    VarType::Float => Op::OpFloat(op.expr_op()),
                    _ => Op::OpAny(op.expr_op()),
                };
                self.emit_instr_drop(isn, 1);
            }
            ArithOp::Rem => {
                let ok = |v: VarType| v == VarType::Number || v.is_any_or_unknown();
                if !ok(t1.var_type()) || !ok(t2.var_type()) {
                    return Err(GenError::PercentRequiresNumber);
                }
                let isn = if vartype == VarType::Number { Op::OpNr(ExprOp::Rem) } else { Op::OpAny(ExprOp::Rem) };
                self.emit_instr_drop(isn, 1);
            }
        }

        match vartype {
            VarType::Any => self.type_stack.set(0, Type::Any),
            // the result of 1 + 0 is not a bool constant
            VarType::Number => self.type_stack.set(0, Type::Number),
            VarType::Float => self.type_stack.set(0, Type::Float),
            _ => {}
        }
        Ok(())
    }

    /// Comparison of the two values on top of the stack, producing a bool.
    pub fn emit_compare(&mut self, op: ExprOp, ic: bool) -> GenResult<()> {
        return_ok_if_skip!(self);
        let kind = compare_kind(op, self.type_stack.peek(1).var_type(), self.type_stack.peek(0).var_type())?;
        self.emit_instr(Op::Compare { kind, op, ic });
        self.type_stack.pop(1);
        self.type_stack.set(0, Type::Bool);
        Ok(())
    }

    /// Convert the value at `offset` to a bool, inverting it if `invert`.
    pub fn emit_2bool(&mut self, invert: bool, offset: i32) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::ToBool { invert, offset });
        self.type_stack.set(depth_of(offset), Type::Bool);
        Ok(())
    }

    /// Convert the value on top of the stack to a bool for a condition.
    pub fn emit_cond2bool(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::CondToBool);
        self.type_stack.set(0, Type::Bool);
        Ok(())
    }

    /// Convert the value at `offset` to a string unless it already is one.
    /// With `tolerant` a list is accepted too.
    pub fn may_emit_2string(&mut self, offset: i32, tolerant: bool) -> GenResult<()> {
        return_ok_if_skip!(self);
        let depth = depth_of(offset);
        let vt = self.type_stack.peek(depth).var_type();
        let op = match vt {
            VarType::String => return Ok(()),
            VarType::Special | VarType::Bool | VarType::Number | VarType::Float => Op::ToString { offset, tolerant },
            VarType::Any | VarType::Unknown => Op::ToStringAny { offset, tolerant },
            VarType::List if tolerant => Op::ToStringAny { offset, tolerant },
            _ => return Err(GenError::CannotConvertToString { ty: vt }),
        };
        self.type_stack.set(depth, Type::String);
        self.emit_instr(op);
        Ok(())
    }

    /// Runtime check that the value at `offset` has type `expected`.
    /// `arg_idx` is the 1-based argument the value is passed as, or 0.
    pub fn emit_typecheck(&mut self, expected: Type, offset: i32, arg_idx: i32) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.type_stack.set(depth_of(offset), expected.clone());
        self.emit_instr(Op::CheckType(Box::new(CheckType { ty: expected, offset, arg_idx })));
        Ok(())
    }

    /// Set the type of the value on top of the stack at runtime.
    pub fn emit_settype(&mut self, expected: Type) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::SetType(Box::new(expected)));
        Ok(())
    }

    /// Require a value of type `actual` at `offset` to be usable as
    /// `expected`. Emits a runtime check when that can't be decided now.
    pub fn need_type(&mut self, actual: &Type, expected: &Type, offset: i32, arg_idx: usize) -> GenResult<()> {
        match check_type(expected, actual) {
            TypeMatch::Yes => Ok(()),
            TypeMatch::Maybe => self.emit_typecheck(expected.clone(), offset, arg_idx as i32),
            TypeMatch::No => Err(type_mismatch(expected, actual, arg_idx)),
        }
    }

    /// Item `index` of the list at the top of the stack, or below the top
    /// with `with_op`. The list stays on the stack.
    pub fn emit_getitem(&mut self, index: i64, with_op: bool) -> GenResult<()> {
        return_ok_if_skip!(self);
        let ty = self.type_stack.peek(usize::from(with_op));
        let Type::List(member) = ty else {
            return Err(GenError::ListRequired { ty: ty.clone() });
        };
        let member = match member.as_ref() {
            Type::Unknown => Type::Any,
            m => m.clone(),
        };
        self.emit_instr_type(Op::GetItem { index, with_op }, member);
        Ok(())
    }

    /// Check the list on top of the stack has at least `min_len` items, or
    /// exactly that many unless `more_ok`.
    pub fn emit_checklen(&mut self, min_len: usize, more_ok: bool) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::CheckLen { min_len, more_ok });
        Ok(())
    }

    /// Drop the first `count` items of the list on top of the stack, for the
    /// rest variable of `[a, b; rest] = list`.
    pub fn emit_slice(&mut self, count: usize) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::Slice(count));
        Ok(())
    }

    /// `dict.name` on the value on top of the stack.
    pub fn emit_stringmember(&mut self, name: &str) -> GenResult<()> {
        return_ok_if_skip!(self);
        let ty = self.type_stack.peek(0).clone();
        let result = match &ty {
            Type::Dict(m) if matches!(**m, Type::Unknown) => Type::Any,
            Type::Dict(m) => (**m).clone(),
            t if t.is_any_or_unknown() => Type::Any,
            _ => return Err(GenError::DictRequired { key: name.to_string(), ty }),
        };
        self.emit_instr(Op::StringMember(name.to_string()));
        self.type_stack.set(0, result);
        Ok(())
    }

    /// Build a list from the top `count` values.
    pub fn emit_newlist(&mut self, count: usize) -> GenResult<()> {
        return_ok_if_skip!(self);
        let (member, decl) = self.type_stack.member_type(count, 1);
        self.emit_instr(Op::NewList(count));
        self.type_stack.pop(count);
        self.type_stack.push(Type::list(member), Type::list(decl));
        Ok(())
    }

    /// Build a dict from the top `count` key/value pairs.
    pub fn emit_newdict(&mut self, count: usize) -> GenResult<()> {
        return_ok_if_skip!(self);
        let (member, decl) = self.type_stack.member_type(count, 2);
        self.emit_instr(Op::NewDict(count));
        self.type_stack.pop(2 * count);
        self.type_stack.push(Type::dict(member), Type::dict(decl));
        Ok(())
    }

    /// Append the value on top of the stack to the list below it.
    pub fn emit_listappend(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        let list_type = self.type_stack.peek(1).clone();
        let item_type = self.type_stack.peek(0).clone();
        let expected = match &list_type {
            Type::List(m) => (**m).clone(),
            t if t.is_any_or_unknown() => Type::Any,
            _ => return Err(GenError::ListRequired { ty: list_type }),
        };
        self.need_type(&item_type, &expected, -1, 0)?;
        self.emit_instr_drop(Op::ListAppend, 1);
        Ok(())
    }

    /// Append the number on top of the stack to the blob below it.
    pub fn emit_blobappend(&mut self) -> GenResult<()> {
        return_ok_if_skip!(self);
        let item_type = self.type_stack.peek(0).clone();
        self.need_type(&item_type, &Type::Number, -1, 0)?;
        self.emit_instr_drop(Op::BlobAppend, 1);
        Ok(())
    }
}

pub(crate) fn type_mismatch(expected: &Type, actual: &Type, arg_idx: usize) -> GenError {
    if arg_idx > 0 {
        GenError::ArgTypeMismatch { arg: arg_idx, expected: expected.clone(), actual: actual.clone() }
    } else {
        GenError::TypeMismatch { expected: expected.clone(), actual: actual.clone() }
    }
}

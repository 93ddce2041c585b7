use serde::Serialize;

/// Coarse runtime kind of a value. Opcode selection works on this tag only;
/// the full [`Type`] is kept for member types and function signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    Unknown,
    Any,
    Void,
    Special,
    Bool,
    Number,
    Float,
    String,
    Blob,
    Func,
    Partial,
    List,
    Dict,
    Job,
    Channel,
    Instr,
}

impl VarType {
    pub fn name(self) -> &'static str {
        match self {
            VarType::Unknown => "unknown",
            VarType::Any => "any",
            VarType::Void => "void",
            VarType::Special => "special",
            VarType::Bool => "bool",
            VarType::Number => "number",
            VarType::Float => "float",
            VarType::String => "string",
            VarType::Blob => "blob",
            VarType::Func => "func",
            VarType::Partial => "partial",
            VarType::List => "list",
            VarType::Dict => "dict",
            VarType::Job => "job",
            VarType::Channel => "channel",
            VarType::Instr => "instr",
        }
    }

    pub fn is_any_or_unknown(self) -> bool {
        matches!(self, VarType::Any | VarType::Unknown)
    }
}

impl std::fmt::Display for VarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Signature of a function or partial type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuncType {
    pub ret: Type,
    /// Number of declared arguments including a variadic one, -1 when unknown.
    pub argcount: i32,
    pub min_argcount: i32,
    /// Argument types, when known. The variadic argument, if any, is last and
    /// is a list type.
    pub args: Option<Vec<Type>>,
    pub varargs: bool,
}

impl FuncType {
    /// Signature with unknown arguments returning `ret`.
    pub fn unknown_args(ret: Type) -> Self {
        FuncType { ret, argcount: -1, min_argcount: -1, args: None, varargs: false }
    }
}

/// Static type of a value as tracked at compile time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    Unknown,
    Any,
    Void,
    Special,
    Bool,
    Number,
    /// A number constant 0 or 1, which can also be used where a bool is
    /// expected without a conversion.
    NumberBool,
    Float,
    String,
    Blob,
    List(Box<Type>),
    Dict(Box<Type>),
    Func(Box<FuncType>),
    Partial(Box<FuncType>),
    Job,
    Channel,
    Instr,
}

impl Type {
    /// `list<member>`. A 0/1 constant member is stored as plain number.
    pub fn list(member: Type) -> Type {
        Type::List(Box::new(member.declared()))
    }

    pub fn dict(member: Type) -> Type {
        Type::Dict(Box::new(member.declared()))
    }

    pub fn list_any() -> Type {
        Type::list(Type::Any)
    }

    pub fn dict_any() -> Type {
        Type::dict(Type::Any)
    }

    pub fn func(ft: FuncType) -> Type {
        Type::Func(Box::new(ft))
    }

    /// `func` with unknown arguments and any return type.
    pub fn func_any() -> Type {
        Type::func(FuncType::unknown_args(Type::Any))
    }

    /// The type without constant-only refinements.
    pub fn declared(self) -> Type {
        match self {
            Type::NumberBool => Type::Number,
            other => other,
        }
    }

    pub fn var_type(&self) -> VarType {
        match self {
            Type::Unknown => VarType::Unknown,
            Type::Any => VarType::Any,
            Type::Void => VarType::Void,
            Type::Special => VarType::Special,
            Type::Bool => VarType::Bool,
            Type::Number | Type::NumberBool => VarType::Number,
            Type::Float => VarType::Float,
            Type::String => VarType::String,
            Type::Blob => VarType::Blob,
            Type::List(_) => VarType::List,
            Type::Dict(_) => VarType::Dict,
            Type::Func(_) => VarType::Func,
            Type::Partial(_) => VarType::Partial,
            Type::Job => VarType::Job,
            Type::Channel => VarType::Channel,
            Type::Instr => VarType::Instr,
        }
    }

    /// Member type of a list or dict.
    pub fn member(&self) -> Option<&Type> {
        match self {
            Type::List(m) | Type::Dict(m) => Some(m),
            _ => None,
        }
    }

    pub fn func_type(&self) -> Option<&FuncType> {
        match self {
            Type::Func(ft) | Type::Partial(ft) => Some(ft),
            _ => None,
        }
    }

    pub fn is_any_or_unknown(&self) -> bool {
        self.var_type().is_any_or_unknown()
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::List(m) => write!(f, "list<{m}>"),
            Type::Dict(m) => write!(f, "dict<{m}>"),
            Type::Func(ft) => fmt_func(f, "func", ft),
            Type::Partial(ft) => fmt_func(f, "partial", ft),
            other => f.write_str(other.var_type().name()),
        }
    }
}

fn fmt_func(f: &mut std::fmt::Formatter<'_>, kw: &str, ft: &FuncType) -> std::fmt::Result {
    if ft.argcount < 0 {
        return if ft.ret.is_any_or_unknown() {
            f.write_str(kw)
        } else {
            write!(f, "{kw}(...): {}", ft.ret)
        };
    }
    write!(f, "{kw}(")?;
    if let Some(args) = &ft.args {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if ft.varargs && i + 1 == args.len() {
                write!(f, "...{arg}")?;
            } else if (i as i32) >= ft.min_argcount {
                write!(f, "?{arg}")?;
            } else {
                write!(f, "{arg}")?;
            }
        }
    }
    f.write_str(")")?;
    if ft.ret != Type::Void {
        write!(f, ": {}", ft.ret)?;
    }
    Ok(())
}

/// Structural equality, ignoring constant-only refinements.
pub fn equal_type(a: &Type, b: &Type) -> bool {
    if a.var_type() != b.var_type() {
        return false;
    }
    match (a, b) {
        (Type::List(x), Type::List(y)) | (Type::Dict(x), Type::Dict(y)) => equal_type(x, y),
        (Type::Func(x), Type::Func(y)) | (Type::Partial(x), Type::Partial(y)) => {
            x.argcount == y.argcount
                && equal_type(&x.ret, &y.ret)
                && match (&x.args, &y.args) {
                    (Some(xa), Some(ya)) => xa.iter().zip(ya).all(|(p, q)| equal_type(p, q)),
                    (None, None) => true,
                    _ => false,
                }
        }
        _ => true,
    }
}

/// Type that both `a` and `b` fit in. Unknown yields the other type, lists
/// and dicts unify their members, anything else that differs becomes any.
pub fn common_type(a: &Type, b: &Type) -> Type {
    if matches!(a, Type::Unknown) {
        return b.clone();
    }
    if matches!(b, Type::Unknown) {
        return a.clone();
    }
    if matches!(a, Type::Any) || matches!(b, Type::Any) {
        return Type::Any;
    }
    if equal_type(a, b) {
        return a.clone();
    }
    match (a, b) {
        (Type::List(x), Type::List(y)) => Type::list(common_type(x, y)),
        (Type::Dict(x), Type::Dict(y)) => Type::dict(common_type(x, y)),
        (Type::Func(x), Type::Func(y)) => Type::func(common_func_type(x, y)),
        _ => Type::Any,
    }
}

fn common_func_type(x: &FuncType, y: &FuncType) -> FuncType {
    let ret = common_type(&x.ret, &y.ret);
    let min_argcount = x.min_argcount.min(y.min_argcount);
    if x.argcount == y.argcount && x.argcount >= 0 {
        let args = match (&x.args, &y.args) {
            (Some(xa), Some(ya)) => Some(xa.iter().zip(ya).map(|(p, q)| common_type(p, q)).collect()),
            _ => None,
        };
        FuncType { ret, argcount: x.argcount, min_argcount, args, varargs: x.varargs && y.varargs }
    } else {
        FuncType { ret, argcount: -1, min_argcount, args: None, varargs: false }
    }
}

/// Outcome of checking an actual type against an expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeMatch {
    Yes,
    /// Can only be decided at runtime, a type check instruction is needed.
    Maybe,
    No,
}

/// Check whether a value of type `actual` can be used where `expected` is
/// required.
pub fn check_type(expected: &Type, actual: &Type) -> TypeMatch {
    if expected.is_any_or_unknown() {
        return TypeMatch::Yes;
    }
    if actual.is_any_or_unknown() {
        return TypeMatch::Maybe;
    }
    match (expected, actual) {
        (Type::Bool, Type::NumberBool) => TypeMatch::Yes,
        (Type::Float, Type::Number | Type::NumberBool) => TypeMatch::Yes,
        (Type::List(e), Type::List(a)) | (Type::Dict(e), Type::Dict(a)) => {
            if matches!(**a, Type::Unknown) {
                // empty list or dict literal
                TypeMatch::Yes
            } else {
                check_type(e, a)
            }
        }
        (Type::Func(e) | Type::Partial(e), Type::Func(a) | Type::Partial(a)) => check_func_type(e, a),
        _ if expected.var_type() == actual.var_type() => TypeMatch::Yes,
        _ => TypeMatch::No,
    }
}

fn check_func_type(expected: &FuncType, actual: &FuncType) -> TypeMatch {
    let mut result = match (&expected.ret, &actual.ret) {
        (Type::Void, Type::Void) => TypeMatch::Yes,
        (e, Type::Unknown) if !matches!(e, Type::Void) => TypeMatch::Yes,
        (e, a) => check_type(e, a),
    };
    if result == TypeMatch::No || expected.argcount < 0 || actual.argcount < 0 {
        return result;
    }
    if expected.argcount != actual.argcount && !actual.varargs {
        return TypeMatch::No;
    }
    if let (Some(ea), Some(aa)) = (&expected.args, &actual.args) {
        for (e, a) in ea.iter().zip(aa) {
            // argument types are checked the other way around
            match check_type(a, e) {
                TypeMatch::No => return TypeMatch::No,
                TypeMatch::Maybe => result = TypeMatch::Maybe,
                TypeMatch::Yes => {}
            }
        }
    }
    result
}

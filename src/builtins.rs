//! Builtin function table: arity, argument checks and return types used
//! when generating BCALL.

use crate::error::{GenError, GenResult};
use crate::type_stack::TypeEntry;
use crate::types::{Type, TypeMatch, VarType, check_type};

/// Check applied to one builtin argument at compile time. Arguments of type
/// any or unknown always pass and are checked when the builtin runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgCheck {
    Any,
    Bool,
    Number,
    NumberOrFloat,
    String,
    StringOrNumber,
    List,
    Dict,
    Job,
    ListOrDict,
    ListOrBlob,
    ListOrDictOrBlob,
    StringOrList,
    /// Anything with a length.
    Sized,
    /// Must fit the member type of the first argument.
    ItemOfFirst,
}

impl ArgCheck {
    fn description(self) -> &'static str {
        match self {
            ArgCheck::Any | ArgCheck::ItemOfFirst => "any",
            ArgCheck::Bool => "Bool",
            ArgCheck::Number => "Number",
            ArgCheck::NumberOrFloat => "Number or Float",
            ArgCheck::String => "String",
            ArgCheck::StringOrNumber => "String or Number",
            ArgCheck::List => "List",
            ArgCheck::Dict => "Dictionary",
            ArgCheck::Job => "Job",
            ArgCheck::ListOrDict => "List or Dictionary",
            ArgCheck::ListOrBlob => "List or Blob",
            ArgCheck::ListOrDictOrBlob => "List, Dictionary or Blob",
            ArgCheck::StringOrList => "String or List",
            ArgCheck::Sized => "String, Number, List, Dictionary or Blob",
        }
    }

    fn accepts(self, ty: &Type) -> bool {
        use VarType as V;
        let vt = ty.var_type();
        match self {
            ArgCheck::Any | ArgCheck::ItemOfFirst => true,
            ArgCheck::Bool => matches!(ty, Type::Bool | Type::NumberBool),
            ArgCheck::Number => vt == V::Number,
            ArgCheck::NumberOrFloat => matches!(vt, V::Number | V::Float),
            ArgCheck::String => vt == V::String,
            ArgCheck::StringOrNumber => matches!(vt, V::String | V::Number),
            ArgCheck::List => vt == V::List,
            ArgCheck::Dict => vt == V::Dict,
            ArgCheck::Job => vt == V::Job,
            ArgCheck::ListOrDict => matches!(vt, V::List | V::Dict),
            ArgCheck::ListOrBlob => matches!(vt, V::List | V::Blob),
            ArgCheck::ListOrDictOrBlob => matches!(vt, V::List | V::Dict | V::Blob),
            ArgCheck::StringOrList => matches!(vt, V::String | V::List),
            ArgCheck::Sized => matches!(vt, V::String | V::Number | V::List | V::Dict | V::Blob),
        }
    }
}

/// How the return type of a builtin is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetRule {
    Any,
    Void,
    Bool,
    Number,
    Float,
    String,
    Job,
    Channel,
    FuncAny,
    ListAny,
    ListNumber,
    ListString,
    /// Same type as the first argument.
    FirstArg,
    /// Number when the first argument is a number, float for a float.
    NumberLike,
    /// List of the first argument's member type.
    ListOfMember,
    /// Container of the same kind as the first argument, member unknown.
    Map,
}

#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    /// 1-based argument position that receives the base of a method call.
    pub method_arg: usize,
    pub args: &'static [ArgCheck],
    pub ret: RetRule,
    /// Applies a function to every item, which may change the item type.
    pub is_map: bool,
}

const fn f(
    name: &'static str,
    min_args: usize,
    max_args: usize,
    method_arg: usize,
    args: &'static [ArgCheck],
    ret: RetRule,
) -> Builtin {
    Builtin { name, min_args, max_args, method_arg, args, ret, is_map: false }
}

use ArgCheck as A;

pub static BUILTINS: &[Builtin] = &[
    f("abs", 1, 1, 1, &[A::NumberOrFloat], RetRule::NumberLike),
    f("add", 2, 2, 1, &[A::ListOrBlob, A::ItemOfFirst], RetRule::FirstArg),
    f("copy", 1, 1, 1, &[A::Any], RetRule::FirstArg),
    f("count", 2, 4, 1, &[A::Sized, A::Any, A::Bool, A::Number], RetRule::Number),
    f("empty", 1, 1, 1, &[A::Any], RetRule::Bool),
    f("extend", 2, 3, 1, &[A::ListOrDict, A::ListOrDict, A::Any], RetRule::FirstArg),
    f("filter", 2, 2, 1, &[A::ListOrDictOrBlob, A::Any], RetRule::FirstArg),
    f("float2nr", 1, 1, 1, &[A::NumberOrFloat], RetRule::Number),
    f("function", 1, 3, 1, &[A::String, A::List, A::Dict], RetRule::FuncAny),
    f("get", 2, 3, 1, &[A::ListOrDictOrBlob, A::Any, A::Any], RetRule::Any),
    f("has_key", 2, 2, 1, &[A::Dict, A::StringOrNumber], RetRule::Bool),
    f("index", 2, 4, 1, &[A::ListOrBlob, A::Any, A::Number, A::Bool], RetRule::Number),
    f("insert", 2, 3, 1, &[A::ListOrBlob, A::ItemOfFirst, A::Number], RetRule::FirstArg),
    f("job_getchannel", 1, 1, 1, &[A::Job], RetRule::Channel),
    f("job_start", 1, 2, 1, &[A::StringOrList, A::Dict], RetRule::Job),
    f("join", 1, 2, 1, &[A::List, A::String], RetRule::String),
    f("keys", 1, 1, 1, &[A::Dict], RetRule::ListString),
    f("len", 1, 1, 1, &[A::Sized], RetRule::Number),
    f("libcall", 3, 3, 3, &[A::String, A::String, A::StringOrNumber], RetRule::String),
    Builtin {
        name: "map",
        min_args: 2,
        max_args: 2,
        method_arg: 1,
        args: &[A::ListOrDictOrBlob, A::Any],
        ret: RetRule::Map,
        is_map: true,
    },
    f("max", 1, 1, 1, &[A::ListOrDict], RetRule::Number),
    f("min", 1, 1, 1, &[A::ListOrDict], RetRule::Number),
    f("printf", 1, 19, 2, &[A::String], RetRule::String),
    f("range", 1, 3, 1, &[A::Number, A::Number, A::Number], RetRule::ListNumber),
    f("remove", 2, 3, 1, &[A::ListOrDictOrBlob, A::Any, A::Number], RetRule::Any),
    f("reverse", 1, 1, 1, &[A::ListOrBlob], RetRule::FirstArg),
    f("sort", 1, 3, 1, &[A::List, A::Any, A::Dict], RetRule::FirstArg),
    f("split", 1, 3, 1, &[A::String, A::String, A::Bool], RetRule::ListString),
    f("sqrt", 1, 1, 1, &[A::NumberOrFloat], RetRule::Float),
    f("string", 1, 1, 1, &[A::Any], RetRule::String),
    f("tolower", 1, 1, 1, &[A::String], RetRule::String),
    f("toupper", 1, 1, 1, &[A::String], RetRule::String),
    f("type", 1, 1, 1, &[A::Any], RetRule::Number),
    f("values", 1, 1, 1, &[A::Dict], RetRule::ListOfMember),
    f("writefile", 2, 3, 1, &[A::ListOrBlob, A::String, A::String], RetRule::Void),
    f("cursor", 1, 3, 1, &[A::Any, A::Number, A::Number], RetRule::Number),
    f("getline", 1, 2, 1, &[A::Any, A::Any], RetRule::Any),
    f("mode", 0, 1, 1, &[A::Bool], RetRule::String),
    f("reltime", 0, 2, 1, &[A::List, A::List], RetRule::ListAny),
];

/// Index of the builtin called `name`.
pub fn find(name: &str) -> Option<usize> {
    BUILTINS.iter().position(|b| b.name == name)
}

pub fn get(idx: usize) -> GenResult<&'static Builtin> {
    BUILTINS.get(idx).ok_or(GenError::UnknownBuiltin { idx })
}

impl Builtin {
    /// Check the argument count and return the argument position a method
    /// base goes to.
    pub fn check_arity(&self, argcount: usize) -> GenResult<usize> {
        if argcount < self.min_args {
            return Err(GenError::NotEnoughArguments { name: self.name.to_string() });
        }
        if argcount > self.max_args {
            return Err(GenError::TooManyArguments { name: self.name.to_string() });
        }
        Ok(self.method_arg)
    }

    /// Check argument types, given in call order.
    pub fn check_arg_types(&self, argtypes: &[TypeEntry]) -> GenResult<()> {
        for (i, entry) in argtypes.iter().enumerate() {
            let Some(&check) = self.args.get(i) else { break };
            let ty = &entry.curr;
            if ty.is_any_or_unknown() {
                continue;
            }
            if check == ArgCheck::ItemOfFirst {
                if let Some(member) = argtypes.first().and_then(|first| match &first.curr {
                    Type::List(m) => Some(m.as_ref()),
                    _ => None,
                }) && check_type(member, ty) == TypeMatch::No
                {
                    return Err(GenError::ArgTypeMismatch { arg: i + 1, expected: member.clone(), actual: ty.clone() });
                }
                continue;
            }
            if !check.accepts(ty) {
                return Err(GenError::BuiltinArgType { arg: i + 1, expected: check.description(), actual: ty.clone() });
            }
        }
        Ok(())
    }

    /// Return type for a call with the given argument types.
    pub fn ret_type(&self, argtypes: &[TypeEntry]) -> Type {
        let first = argtypes.first().map(|e| &e.curr);
        match self.ret {
            RetRule::Any => Type::Any,
            RetRule::Void => Type::Void,
            RetRule::Bool => Type::Bool,
            RetRule::Number => Type::Number,
            RetRule::Float => Type::Float,
            RetRule::String => Type::String,
            RetRule::Job => Type::Job,
            RetRule::Channel => Type::Channel,
            RetRule::FuncAny => Type::func_any(),
            RetRule::ListAny => Type::list_any(),
            RetRule::ListNumber => Type::list(Type::Number),
            RetRule::ListString => Type::list(Type::String),
            RetRule::FirstArg => first.cloned().map(Type::declared).unwrap_or(Type::Any),
            RetRule::NumberLike => match first.map(Type::var_type) {
                Some(VarType::Number) => Type::Number,
                Some(VarType::Float) => Type::Float,
                _ => Type::Any,
            },
            RetRule::ListOfMember => match first.and_then(Type::member) {
                Some(m) if !matches!(m, Type::Unknown) => Type::list(m.clone()),
                _ => Type::list_any(),
            },
            RetRule::Map => match first.map(Type::var_type) {
                Some(VarType::List) => Type::list_any(),
                Some(VarType::Dict) => Type::dict_any(),
                Some(VarType::Blob) => Type::Blob,
                _ => Type::Any,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(types: &[Type]) -> Vec<TypeEntry> {
        types.iter().map(|t| TypeEntry { curr: t.clone(), decl: Type::Any }).collect()
    }

    #[test]
    fn names_are_unique() {
        for (i, b) in BUILTINS.iter().enumerate() {
            assert_eq!(find(b.name), Some(i), "duplicate builtin {}", b.name);
            assert!(b.min_args <= b.max_args, "{}", b.name);
            assert!(b.method_arg >= 1, "{}", b.name);
        }
    }

    #[test]
    fn arity() {
        let len = get(find("len").unwrap()).unwrap();
        assert_eq!(len.check_arity(1), Ok(1));
        assert!(matches!(len.check_arity(0), Err(GenError::NotEnoughArguments { .. })));
        assert!(matches!(len.check_arity(2), Err(GenError::TooManyArguments { .. })));
        let printf = get(find("printf").unwrap()).unwrap();
        assert_eq!(printf.check_arity(2), Ok(2));
    }

    #[test]
    fn unknown_index() {
        assert!(matches!(get(10_000), Err(GenError::UnknownBuiltin { idx: 10_000 })));
    }

    #[test]
    fn arg_checks() {
        let keys = get(find("keys").unwrap()).unwrap();
        assert!(keys.check_arg_types(&entries(&[Type::dict(Type::Number)])).is_ok());
        assert!(keys.check_arg_types(&entries(&[Type::Any])).is_ok());
        let err = keys.check_arg_types(&entries(&[Type::String])).unwrap_err();
        assert_eq!(err.to_string(), "Dictionary required for argument 1, got string");

        let add = get(find("add").unwrap()).unwrap();
        assert!(add.check_arg_types(&entries(&[Type::list(Type::Number), Type::Number])).is_ok());
        assert!(matches!(
            add.check_arg_types(&entries(&[Type::list(Type::Number), Type::String])),
            Err(GenError::ArgTypeMismatch { arg: 2, .. })
        ));
    }

    #[test]
    fn return_types() {
        let abs = get(find("abs").unwrap()).unwrap();
        assert_eq!(abs.ret_type(&entries(&[Type::Float])), Type::Float);
        let values = get(find("values").unwrap()).unwrap();
        assert_eq!(values.ret_type(&entries(&[Type::dict(Type::String)])), Type::list(Type::String));
        let map = get(find("map").unwrap()).unwrap();
        assert!(map.is_map);
        assert_eq!(map.ret_type(&entries(&[Type::list(Type::Number), Type::Any])), Type::list_any());
    }
}

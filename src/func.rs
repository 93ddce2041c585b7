use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use serde::{Serialize, Serializer};

use crate::context::CompileType;
use crate::error::GenResult;
use crate::types::{FuncType, Type};

/// Compilation state of a user function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DefStatus {
    /// Legacy function, always called by name.
    Legacy,
    ToBeCompiled,
    /// Being compiled right now; calls to it from its own body don't
    /// trigger another compilation.
    Compiling,
    Compiled,
    CompileError,
}

/// A user-defined function as seen by the generator.
#[derive(Debug)]
pub struct UserFunc {
    pub name: String,
    /// Declared types of the regular arguments, `None` when untyped.
    pub arg_types: Option<Vec<Type>>,
    /// Number of regular (non-variadic) arguments.
    pub args: usize,
    /// How many trailing regular arguments have a default value.
    pub def_args: usize,
    /// Type of the variadic argument, always a list type.
    pub va_type: Option<Type>,
    pub ret_type: Type,
    pub status: DefStatus,
    /// Slot in the compiled-function table, assigned when the function is
    /// defined.
    pub dfunc_idx: Option<usize>,
    /// Compile types this function has instructions for.
    pub compiled_for: Vec<CompileType>,
    /// Refers to variables of an enclosing function.
    pub closure: bool,
}

impl UserFunc {
    pub fn new(name: impl Into<String>) -> Self {
        UserFunc {
            name: name.into(),
            arg_types: None,
            args: 0,
            def_args: 0,
            va_type: None,
            ret_type: Type::Any,
            status: DefStatus::ToBeCompiled,
            dfunc_idx: None,
            compiled_for: Vec::new(),
            closure: false,
        }
    }

    pub fn has_varargs(&self) -> bool {
        self.va_type.is_some()
    }

    pub fn is_legacy(&self) -> bool {
        self.status == DefStatus::Legacy
    }

    /// Whether a call has to compile the function first.
    pub fn needs_compiling(&self, compile_type: CompileType) -> bool {
        match self.status {
            DefStatus::ToBeCompiled => true,
            DefStatus::Compiled => !self.compiled_for.contains(&compile_type),
            DefStatus::Legacy | DefStatus::Compiling | DefStatus::CompileError => false,
        }
    }

    /// Type of a reference to this function.
    pub fn func_type(&self) -> Type {
        let Some(arg_types) = &self.arg_types else {
            return Type::func(FuncType::unknown_args(self.ret_type.clone()));
        };
        let mut args = arg_types.clone();
        if let Some(va) = &self.va_type {
            args.push(va.clone());
        }
        Type::func(FuncType {
            ret: self.ret_type.clone(),
            argcount: args.len() as i32,
            min_argcount: self.args.saturating_sub(self.def_args) as i32,
            args: Some(args),
            varargs: self.va_type.is_some(),
        })
    }
}

/// Shared handle to a user function. Instructions that call or reference a
/// compiled function hold one, keeping it alive.
#[derive(Clone)]
pub struct FuncHandle(Rc<RefCell<UserFunc>>);

impl FuncHandle {
    pub fn new(func: UserFunc) -> Self {
        FuncHandle(Rc::new(RefCell::new(func)))
    }

    pub fn borrow(&self) -> Ref<'_, UserFunc> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, UserFunc> {
        self.0.borrow_mut()
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn ptr_eq(&self, other: &FuncHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl std::fmt::Debug for FuncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.try_borrow() {
            Ok(func) => write!(f, "FuncHandle({:?})", func.name),
            Err(_) => f.write_str("FuncHandle(<borrowed>)"),
        }
    }
}

impl Serialize for FuncHandle {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.0.try_borrow() {
            Ok(func) => s.serialize_str(&func.name),
            Err(_) => s.serialize_none(),
        }
    }
}

/// Compiles a function on demand when a call needs it compiled first.
pub trait FunctionCompiler {
    /// Compile `func` for `compile_type`. On success the function's status
    /// is [`DefStatus::Compiled`]; on failure it is
    /// [`DefStatus::CompileError`].
    fn compile(&mut self, func: &FuncHandle, compile_type: CompileType) -> GenResult<()>;
}

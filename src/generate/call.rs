use crate::builtins;
use crate::context::CompileCtx;
use crate::error::{GenError, GenResult};
use crate::func::{DefStatus, FuncHandle, FunctionCompiler};
use crate::generate::expr::type_mismatch;
use crate::instr::{FuncrefTarget, Op};
use crate::type_stack::{TypeEntry, depth_of};
use crate::types::{Type, TypeMatch, check_type};

/// Runtime type checks an argument needs: expected type, stack offset and
/// 1-based argument number.
type ArgChecks = Vec<(Type, i32, usize)>;

impl CompileCtx {
    /// Call builtin `idx` with `argcount` arguments on the stack. For a
    /// method call the base is the first of them and is moved to the
    /// argument position the builtin takes it at.
    pub fn emit_bcall(&mut self, idx: usize, argcount: usize, method_call: bool) -> GenResult<()> {
        return_ok_if_skip!(self);
        let builtin = builtins::get(idx)?;
        let argoff = builtin.check_arity(argcount)?;
        let shuffle = method_call && argoff > 1;
        if shuffle && argoff > argcount {
            return Err(GenError::NotEnoughArguments { name: builtin.name.to_string() });
        }

        let mut argtypes: Vec<TypeEntry> = self.type_stack.top(argcount).to_vec();
        if shuffle {
            // the base moves from position 0 to argoff - 1
            let base = argtypes.remove(0);
            argtypes.insert(argoff - 1, base);
        }
        builtin.check_arg_types(&argtypes)?;
        let ret = builtin.ret_type(&argtypes);
        tracing::debug!(name = builtin.name, argcount, method_call, ret = %ret, "bcall");

        if shuffle {
            self.emit_instr(Op::Shuffle { item: argcount, up: argoff - 1 });
        }
        self.emit_instr(Op::BCall { idx, argcount });
        self.type_stack.pop(argcount);
        self.type_stack.push_type(ret);

        // check the mapped items still have the declared member type
        if builtin.is_map
            && let Some(first) = argtypes.first()
            && let Some(member) = first.curr.member()
            && !member.is_any_or_unknown()
        {
            self.emit_typecheck(first.curr.clone(), -1, 1)?;
        }
        Ok(())
    }

    /// Call user function `ufunc` with `argcount` arguments on the stack.
    /// A function that was not compiled yet is compiled through `compiler`
    /// first.
    pub fn emit_call(
        &mut self,
        ufunc: &FuncHandle,
        argcount: usize,
        compiler: &mut dyn FunctionCompiler,
    ) -> GenResult<()> {
        return_ok_if_skip!(self);
        let checks = self.check_call_args(ufunc, argcount)?;

        let needs_compiling = ufunc.borrow().needs_compiling(self.compile_type);
        if needs_compiling {
            tracing::debug!(func = %ufunc.name(), compile_type = ?self.compile_type, "compiling callee first");
            compiler.compile(ufunc, self.compile_type)?;
        }

        let (op, ret) = {
            let f = ufunc.borrow();
            if f.status == DefStatus::CompileError {
                return Err(GenError::CallToFailedFunction { name: f.name.clone() });
            }
            let op = match f.dfunc_idx {
                Some(dfunc_idx) if !f.is_legacy() => Op::DCall { func: ufunc.clone(), dfunc_idx, argcount },
                _ => Op::UCall { name: f.name.clone(), argcount },
            };
            (op, f.ret_type.clone())
        };
        for (expected, offset, arg) in checks {
            self.emit_typecheck(expected, offset, arg as i32)?;
        }
        self.emit_instr(op);
        self.type_stack.pop(argcount);
        self.type_stack.push_type(ret);
        Ok(())
    }

    fn check_call_args(&self, ufunc: &FuncHandle, argcount: usize) -> GenResult<ArgChecks> {
        let f = ufunc.borrow();
        let min_args = f.args.saturating_sub(f.def_args);
        if argcount > f.args && !f.has_varargs() {
            return Err(GenError::TooManyArguments { name: f.name.clone() });
        }
        if argcount < min_args {
            return Err(GenError::NotEnoughArguments { name: f.name.clone() });
        }

        let mut checks = Vec::new();
        if matches!(f.status, DefStatus::Legacy | DefStatus::CompileError) {
            return Ok(checks);
        }
        for i in 0..argcount {
            let offset = i as i32 - argcount as i32;
            let actual = self.type_stack.peek(depth_of(offset));
            // v:none passed for an argument with a default
            if i >= min_args && matches!(actual, Type::Special) {
                continue;
            }
            let expected = if i < f.args {
                match &f.arg_types {
                    Some(types) => types.get(i).cloned().unwrap_or(Type::Any),
                    None => continue,
                }
            } else {
                match &f.va_type {
                    Some(Type::List(member)) => (**member).clone(),
                    _ => Type::Any,
                }
            };
            match check_type(&expected, actual) {
                TypeMatch::Yes => {}
                TypeMatch::Maybe => checks.push((expected, offset, i + 1)),
                TypeMatch::No => return Err(type_mismatch(&expected, actual, i + 1)),
            }
        }
        Ok(checks)
    }

    /// Call a function that can't be resolved now, by name.
    pub fn emit_ucall(&mut self, name: &str, argcount: usize) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::UCall { name: name.to_string(), argcount });
        self.type_stack.pop(argcount);
        self.type_stack.push_type(Type::Any);
        Ok(())
    }

    /// Call through a function reference of type `ty` named `name`. With
    /// `ref_below_args` the reference was pushed before the arguments,
    /// otherwise it is on top of them.
    pub fn emit_pcall(&mut self, argcount: usize, name: &str, ty: &Type, ref_below_args: bool) -> GenResult<()> {
        return_ok_if_skip!(self);
        let mut checks = ArgChecks::new();
        let ret = match ty {
            Type::Any | Type::Unknown => Type::Any,
            Type::Func(ft) | Type::Partial(ft) => {
                if ft.argcount != -1 {
                    let argc = argcount as i32;
                    let varargs = i32::from(ft.varargs);
                    if argc < ft.min_argcount - varargs {
                        return Err(GenError::NotEnoughArguments { name: name.to_string() });
                    }
                    if !ft.varargs && argc > ft.argcount {
                        return Err(GenError::TooManyArguments { name: name.to_string() });
                    }
                    if let Some(args) = &ft.args {
                        for i in 0..argcount {
                            let offset = i as i32 - argc - i32::from(!ref_below_args);
                            let actual = self.type_stack.peek(depth_of(offset));
                            let expected = if ft.varargs && i as i32 >= ft.argcount - 1 {
                                args.last().and_then(Type::member).cloned().unwrap_or(Type::Any)
                            } else if i as i32 >= ft.min_argcount && matches!(actual, Type::Special) {
                                Type::Any
                            } else {
                                args.get(i).cloned().unwrap_or(Type::Any)
                            };
                            match check_type(&expected, actual) {
                                TypeMatch::Yes => {}
                                TypeMatch::Maybe => checks.push((expected, offset, i + 1)),
                                TypeMatch::No => return Err(type_mismatch(&expected, actual, i + 1)),
                            }
                        }
                    }
                }
                match &ft.ret {
                    Type::Unknown => Type::Any,
                    ret => ret.clone(),
                }
            }
            _ => return Err(GenError::NotCallable { name: name.to_string() }),
        };

        for (expected, offset, arg) in checks {
            self.emit_typecheck(expected, offset, arg as i32)?;
        }
        self.emit_instr(Op::PCall { argcount, ref_below_args });
        self.type_stack.pop(argcount + 1);
        self.type_stack.push_type(ret);
        if ref_below_args {
            self.emit_instr(Op::PCallEnd);
        }
        Ok(())
    }

    /// Push a reference to `ufunc`.
    pub fn emit_funcref(&mut self, ufunc: &FuncHandle) -> GenResult<()> {
        return_ok_if_skip!(self);
        let (target, ty, is_closure) = {
            let f = ufunc.borrow();
            let target = match f.dfunc_idx {
                Some(dfunc_idx) if !f.is_legacy() => FuncrefTarget::Compiled { dfunc_idx, func: ufunc.clone() },
                _ => FuncrefTarget::ByName(f.name.clone()),
            };
            (target, f.func_type(), f.closure)
        };
        self.emit_instr_type(Op::Funcref(target), ty);
        self.has_closure = true;
        // a reference to a closure makes this function a closure too
        if is_closure {
            self.ufunc.borrow_mut().closure = true;
        }
        Ok(())
    }

    /// Create the closure `lambda`, or define it as the global function
    /// `global`.
    pub fn emit_newfunc(&mut self, lambda: String, global: Option<String>) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::NewFunc { lambda, global });
        Ok(())
    }

    /// `:def` listing functions, or one function with `name`.
    pub fn emit_def(&mut self, name: Option<&str>) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr(Op::Def(name.map(str::to_string)));
        Ok(())
    }
}

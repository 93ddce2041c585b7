use crate::context::CompileCtx;
use crate::error::{GenError, GenResult};
use crate::instr::{BlobHandle, ChannelHandle, JobHandle, Op, Special};
use crate::types::{Type, VarType};

/// Constant value that can be pushed with [`CompileCtx::emit_tv_push`].
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Bool(bool),
    Special(Special),
    Number(i64),
    Float(f64),
    String(Option<String>),
    Blob(BlobHandle),
    Job(JobHandle),
    Channel(ChannelHandle),
}

impl Constant {
    pub fn var_type(&self) -> VarType {
        match self {
            Constant::Bool(_) => VarType::Bool,
            Constant::Special(_) => VarType::Special,
            Constant::Number(_) => VarType::Number,
            Constant::Float(_) => VarType::Float,
            Constant::String(_) => VarType::String,
            Constant::Blob(_) => VarType::Blob,
            Constant::Job(_) => VarType::Job,
            Constant::Channel(_) => VarType::Channel,
        }
    }
}

/// Name a PUSHFUNC resolves at runtime: script-local and autoload names are
/// kept, anything else is a global function.
pub fn push_func_name(name: &str) -> String {
    if name.starts_with("<SNR>") || name.contains('#') {
        name.to_string()
    } else {
        format!("g:{name}")
    }
}

impl CompileCtx {
    /// Push a constant. Ownership of a string or handle moves to the
    /// instruction, or is dropped when skipping.
    pub fn emit_tv_push(&mut self, value: Constant) -> GenResult<()> {
        return_ok_if_skip!(self);
        match value {
            Constant::Bool(b) => self.emit_push_bool(b),
            Constant::Special(s) => self.emit_push_special(s),
            Constant::Number(n) => self.emit_push_nr(n),
            Constant::Float(f) => self.emit_push_float(f),
            Constant::String(s) => self.emit_push_s(s),
            Constant::Blob(b) => self.emit_push_blob(b),
            other => Err(GenError::ConstantNotSupported { ty: other.var_type() }),
        }
    }

    /// Push a number. 0 and 1 are typed so they can also be used as a bool.
    pub fn emit_push_nr(&mut self, n: i64) -> GenResult<()> {
        return_ok_if_skip!(self);
        let ty = if n == 0 || n == 1 { Type::NumberBool } else { Type::Number };
        self.emit_instr_type(Op::PushNr(n), ty);
        Ok(())
    }

    pub fn emit_push_bool(&mut self, b: bool) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_type(Op::PushBool(b), Type::Bool);
        Ok(())
    }

    pub fn emit_push_special(&mut self, s: Special) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_type(Op::PushSpecial(s), Type::Special);
        Ok(())
    }

    pub fn emit_push_float(&mut self, f: f64) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_type(Op::PushF(f), Type::Float);
        Ok(())
    }

    pub fn emit_push_s(&mut self, s: Option<String>) -> GenResult<()> {
        if self.is_skipping() {
            tracing::trace!("skipping, dropping string constant");
            return Ok(());
        }
        self.emit_instr_type(Op::PushS(s), Type::String);
        Ok(())
    }

    pub fn emit_push_blob(&mut self, blob: BlobHandle) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_type(Op::PushBlob(blob), Type::Blob);
        Ok(())
    }

    pub fn emit_push_job(&mut self, job: Option<JobHandle>) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_type(Op::PushJob(job), Type::Job);
        Ok(())
    }

    pub fn emit_push_channel(&mut self, channel: Option<ChannelHandle>) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_type(Op::PushChannel(channel), Type::Channel);
        Ok(())
    }

    /// Push a reference to the function `name`, or a null function.
    pub fn emit_push_func(&mut self, name: Option<&str>, ty: Type) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_type(Op::PushFunc(name.map(push_func_name)), ty);
        Ok(())
    }

    /// Load the autoload script that defines `name`, then push `name`.
    pub fn emit_autoload(&mut self, name: &str, ty: Type) -> GenResult<()> {
        return_ok_if_skip!(self);
        self.emit_instr_type(Op::Autoload(name.to_string()), ty);
        Ok(())
    }
}

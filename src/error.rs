use crate::types::{Type, VarType};

/// Errors reported while generating instructions. When an emitter returns
/// one of these, nothing has been appended to the instruction store and the
/// type stack is left as it was.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenError {
    #[error("wrong argument type for +")]
    WrongArgumentTypeForPlus,
    #[error("{op} requires number or float arguments")]
    RequiresNumberOrFloat { op: char },
    #[error("% requires number arguments")]
    PercentRequiresNumber,
    #[error("cannot use \"{op}\" with {ty}")]
    CannotUseIsWith { op: &'static str, ty: VarType },
    #[error("cannot compare {left} with {right}")]
    CannotCompare { left: VarType, right: VarType },
    #[error("cannot convert {ty} to string")]
    CannotConvertToString { ty: VarType },
    #[error("argument {arg}: type mismatch, expected {expected} but got {actual}")]
    ArgTypeMismatch { arg: usize, expected: Type, actual: Type },
    #[error("type mismatch, expected {expected} but got {actual}")]
    TypeMismatch { expected: Type, actual: Type },
    #[error("{expected} required for argument {arg}, got {actual}")]
    BuiltinArgType { arg: usize, expected: &'static str, actual: Type },
    #[error("dictionary required for key \"{key}\", got {ty}")]
    DictRequired { key: String, ty: Type },
    #[error("list required, got {ty}")]
    ListRequired { ty: Type },
    #[error("{name} is not callable")]
    NotCallable { name: String },
    #[error("too many arguments for function: {name}")]
    TooManyArguments { name: String },
    #[error("not enough arguments for function: {name}")]
    NotEnoughArguments { name: String },
    #[error("call to function that failed to compile: {name}")]
    CallToFailedFunction { name: String },
    #[error("unknown builtin function index: {idx}")]
    UnknownBuiltin { idx: usize },
    #[error("unknown vim variable: v:{name}")]
    UnknownVimVar { name: String },
    #[error("constant type not supported: {ty}")]
    ConstantNotSupported { ty: VarType },
}

pub type GenResult<T> = Result<T, GenError>;

impl GenError {
    /// Stable code used by `--explain` and JSON diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            GenError::WrongArgumentTypeForPlus => "ISN-T001",
            GenError::RequiresNumberOrFloat { .. } => "ISN-T002",
            GenError::PercentRequiresNumber => "ISN-T003",
            GenError::CannotUseIsWith { .. } => "ISN-T004",
            GenError::CannotCompare { .. } => "ISN-T005",
            GenError::CannotConvertToString { .. } => "ISN-T006",
            GenError::ArgTypeMismatch { .. } => "ISN-T007",
            GenError::TypeMismatch { .. } => "ISN-T008",
            GenError::DictRequired { .. } => "ISN-T009",
            GenError::ListRequired { .. } => "ISN-T010",
            GenError::NotCallable { .. } => "ISN-T011",
            GenError::BuiltinArgType { .. } => "ISN-T012",
            GenError::TooManyArguments { .. } => "ISN-A001",
            GenError::NotEnoughArguments { .. } => "ISN-A002",
            GenError::CallToFailedFunction { .. } => "ISN-C001",
            GenError::UnknownBuiltin { .. } => "ISN-C002",
            GenError::UnknownVimVar { .. } => "ISN-C003",
            GenError::ConstantNotSupported { .. } => "ISN-C004",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_types() {
        let err = GenError::ArgTypeMismatch { arg: 2, expected: Type::Number, actual: Type::String };
        assert_eq!(err.to_string(), "argument 2: type mismatch, expected number but got string");
        let err = GenError::CannotCompare { left: VarType::List, right: VarType::Number };
        assert_eq!(err.to_string(), "cannot compare list with number");
        assert_eq!(
            GenError::CannotUseIsWith { op: "is", ty: VarType::Float }.to_string(),
            "cannot use \"is\" with float"
        );
    }

    #[test]
    fn every_code_is_registered() {
        let samples = [
            GenError::WrongArgumentTypeForPlus,
            GenError::PercentRequiresNumber,
            GenError::TooManyArguments { name: "f".into() },
            GenError::CallToFailedFunction { name: "f".into() },
            GenError::ConstantNotSupported { ty: VarType::Job },
        ];
        for err in samples {
            assert!(crate::diagnostic::registry::lookup(err.code()).is_some(), "{} missing", err.code());
        }
    }
}

//! Single-pass, type-directed instruction generator for a typed stack VM.
//!
//! A [`CompileCtx`] holds the instruction list and the compile-time type
//! stack of the function being compiled. The emitters in [`generate`] pick
//! opcodes from the types on that stack, reject ill-typed operations before
//! anything is appended, and keep the stack in step with the instructions.
//! The [`script`] module drives the emitters from a small line-oriented
//! language, which is what the `isngen` binary compiles.

pub mod builtins;
pub mod context;
pub mod diagnostic;
pub mod disasm;
pub mod error;
pub mod func;
pub mod generate;
pub mod instr;
pub mod script;
pub mod store;
pub mod type_stack;
pub mod types;

pub use context::{CompileCtx, CompileType};
pub use error::{GenError, GenResult};
pub use script::{CompiledFunc, ScriptError, run};

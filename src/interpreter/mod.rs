//! Script interpreter for block-built programs.
//!
//! The block editor's code generator emits S-expressions; this module parses
//! them, validates them into a typed IR, and steps them one bounded unit at a
//! time against an [`InterpreterHost`] that provides the native game API.

/// Abstract syntax tree definitions for the script language.
pub mod ast;
/// Builders that translate parsed programs into the IR.
pub mod builder;
/// Typed intermediate representation structures.
pub mod ir;
/// Parser for the script language.
pub mod parser;
/// Tick-driven runtime that executes programs against a host.
pub mod runtime;

pub use ast::{Expr, Program};
pub use builder::build_ir;
pub use ir::{BranchArm, Condition, Instruction, NativeCall, NativeOp, Procedure, ProgramIr};
pub use parser::parse_program;
pub use runtime::{InterpreterHost, InterpreterRuntime, RuntimeError, RuntimeEvent};

use thiserror::Error;

/// Convenience result alias for interpreter operations.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Errors surfaced by the parser/builder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// Parsing failed due to invalid syntax.
    #[error("invalid script syntax: {0}")]
    Syntax(String),

    /// Semantic validation failed (unknown statement, missing block id, etc.).
    #[error("script validation failed: {0}")]
    Validation(String),
}

/// Parse and build a script in one step.
pub fn compile(source: &str) -> Result<ProgramIr> {
    let program = parse_program(source)?;
    build_ir(&program)
}

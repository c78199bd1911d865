//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and composable:
//! - `ast` defines the tree handed over by an external parser.
//! - `semantic` type-checks it against a `symbols` table and collects
//!   `diagnostic`s instead of stopping at the first problem.
//! - `codegen` lowers a diagnostic-free tree into ARM11 assembly.
//! - `error` holds the fatal errors shared by the other modules.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod escape;
pub mod semantic;
pub mod symbols;
pub mod ty;

pub use ast::Program;
pub use codegen::generate;
pub use config::CompilerConfig;
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use error::{CompileError, CompileResult};
pub use semantic::{Analysis, analyze};
pub use symbols::SymbolTable;
pub use ty::Type;

/// Check and compile a program with the default configuration.
pub fn compile(program: &Program) -> CompileResult<String> {
  compile_with(program, &CompilerConfig::default())
}

/// Check a program and, when analysis reports nothing, generate its assembly.
pub fn compile_with(program: &Program, config: &CompilerConfig) -> CompileResult<String> {
  config.validate()?;
  let symbols = analyze(program).into_result()?;
  generate(program, &symbols, config)
}

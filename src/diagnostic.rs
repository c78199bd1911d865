//! Semantic diagnostics.
//!
//! Each kind renders its own message; the position is attached by
//! [`Diagnostic`].

use std::fmt;

use snafu::Snafu;

use crate::ast::Span;
use crate::ty::Type;

#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum DiagnosticKind {
  #[snafu(display("function \"{name}\" is already defined"))]
  FunctionRedeclared { name: String },

  #[snafu(display("variable \"{name}\" is already defined in this scope"))]
  VariableRedeclared { name: String },

  #[snafu(display("\"{name}\" is not defined in this scope"))]
  SymbolNotFound { name: String },

  #[snafu(display(
    "incompatible type: expected {}, actual {actual}",
    describe_expected(expected, alternative.as_ref())
  ))]
  TypeMismatch {
    expected: Type,
    alternative: Option<Type>,
    actual: Type,
  },

  #[snafu(display("function \"{name}\" is missing a return statement"))]
  MissingReturn { name: String },

  #[snafu(display("unreachable statement after return"))]
  UnreachableCode,

  #[snafu(display(
    "wrong number of arguments for \"{name}\": expected {expected}, actual {actual}"
  ))]
  WrongArgumentCount {
    name: String,
    expected: usize,
    actual: usize,
  },

  #[snafu(display("\"{name}\" is a function and cannot be used as a value"))]
  AssignmentToFunction { name: String },

  #[snafu(display("operator {op} cannot be applied to a pair or array"))]
  InvalidOperator { op: String },

  #[snafu(display("array literal elements have incompatible types"))]
  IncompatibleArrayElements,

  #[snafu(display("integer literal {literal} does not fit in 32 bits"))]
  IntegerOverflow { literal: String },

  #[snafu(display("character literal {literal:?} is out of range"))]
  CharacterOverflow { literal: char },

  #[snafu(display("this statement is not allowed here"))]
  NonValidStatement,

  #[snafu(display("expression has no printable type"))]
  Unprintable,
}

fn describe_expected(expected: &Type, alternative: Option<&Type>) -> String {
  match alternative {
    Some(alternative) => format!("{expected} or {alternative}"),
    None => expected.to_string(),
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
  pub kind: DiagnosticKind,
  pub span: Span,
}

impl Diagnostic {
  pub fn new(kind: DiagnosticKind, span: Span) -> Self {
    Self { kind, span }
  }

  pub fn mismatch(expected: Type, actual: Type, span: Span) -> Self {
    Self::new(
      DiagnosticKind::TypeMismatch {
        expected,
        alternative: None,
        actual,
      },
      span,
    )
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "semantic error at {}:{}: {}",
      self.span.line, self.span.column, self.kind
    )
  }
}

//! Fatal errors of the compilation pipeline.
//!
//! Semantic problems are not fatal on their own: the analyzer collects them as
//! [`Diagnostic`]s and the pipeline only turns the whole list into a
//! [`CompileError::Semantic`] once analysis has finished.

use snafu::Snafu;

use crate::diagnostic::Diagnostic;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("semantic analysis failed with {} error(s)", diagnostics.len()))]
  Semantic { diagnostics: Vec<Diagnostic> },

  #[snafu(display("expression needs more than the {available} available registers"))]
  RegistersExhausted { available: usize },

  #[snafu(display("invalid compiler configuration: {message}"))]
  InvalidConfig { message: String },

  #[snafu(display("internal error: {message}"))]
  Contract { message: String },
}

impl CompileError {
  /// A construct reached the generator that the analyzer should have rejected.
  pub fn contract(message: impl Into<String>) -> Self {
    Self::Contract {
      message: message.into(),
    }
  }

  /// Render every diagnostic on its own line beneath the summary.
  pub fn report(&self) -> String {
    match self {
      Self::Semantic { diagnostics } => {
        let mut out = self.to_string();
        for diagnostic in diagnostics {
          out.push_str(&format!("\n  {diagnostic}"));
        }
        out
      }
      other => other.to_string(),
    }
  }
}

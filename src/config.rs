//! Knobs for the code generator.

use snafu::ensure;

use crate::codegen::instruction::Register;
use crate::error::{CompileResult, InvalidConfigSnafu};

/// Largest stack adjustment a single `ADD`/`SUB` immediate may carry.
const MAX_STACK_CHUNK: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
  /// How many of r4..r11 expression evaluation may use. Exhausting them is a
  /// hard error; there is no spilling.
  pub general_registers: usize,
  /// Largest immediate used in one stack-pointer adjustment. Bigger frames
  /// are allocated in several steps.
  pub stack_chunk: u32,
}

impl Default for CompilerConfig {
  fn default() -> Self {
    Self {
      general_registers: Register::GENERAL.len(),
      stack_chunk: MAX_STACK_CHUNK,
    }
  }
}

impl CompilerConfig {
  pub fn validate(&self) -> CompileResult<()> {
    let max = Register::GENERAL.len();
    ensure!(
      (1..=max).contains(&self.general_registers),
      InvalidConfigSnafu {
        message: format!(
          "general_registers must be between 1 and {max}, got {}",
          self.general_registers
        ),
      }
    );
    ensure!(
      self.stack_chunk >= 4 && self.stack_chunk <= MAX_STACK_CHUNK && self.stack_chunk % 4 == 0,
      InvalidConfigSnafu {
        message: format!(
          "stack_chunk must be a multiple of 4 between 4 and {MAX_STACK_CHUNK}, got {}",
          self.stack_chunk
        ),
      }
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::CompileError;

  #[test]
  fn default_is_valid() {
    let config = CompilerConfig::default();
    assert_eq!(config.general_registers, 8);
    assert_eq!(config.stack_chunk, 1024);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn register_count_is_bounded() {
    for general_registers in [0, 9] {
      let config = CompilerConfig {
        general_registers,
        ..CompilerConfig::default()
      };
      assert!(matches!(
        config.validate(),
        Err(CompileError::InvalidConfig { .. })
      ));
    }
  }

  #[test]
  fn stack_chunk_must_be_encodable() {
    for stack_chunk in [0, 6, 2048] {
      let config = CompilerConfig {
        stack_chunk,
        ..CompilerConfig::default()
      };
      assert!(config.validate().is_err(), "{stack_chunk} accepted");
    }
  }
}

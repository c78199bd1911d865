//! Register pool for expression evaluation.
//!
//! The pool hands out the lowest free general-purpose register. There is no
//! spilling: running out of registers is a fatal error, and the configured
//! register count is the limit.

use std::collections::BTreeSet;

use tracing::warn;

use super::instruction::Register;
use crate::error::{CompileError, CompileResult};

#[derive(Debug)]
pub struct RegisterPool {
  free: BTreeSet<Register>,
  capacity: usize,
  return_in_use: bool,
}

impl RegisterPool {
  /// Pool over the first `count` general-purpose registers.
  pub fn new(count: usize) -> Self {
    let count = count.min(Register::GENERAL.len());
    Self {
      free: Register::GENERAL[..count].iter().copied().collect(),
      capacity: count,
      return_in_use: false,
    }
  }

  pub fn acquire(&mut self) -> CompileResult<Register> {
    match self.free.pop_first() {
      Some(reg) => Ok(reg),
      None => {
        warn!(available = self.capacity, "register pool exhausted");
        Err(CompileError::RegistersExhausted {
          available: self.capacity,
        })
      }
    }
  }

  /// Give a register back. Reserved registers are ignored.
  pub fn release(&mut self, reg: Register) {
    if Register::GENERAL[..self.capacity].contains(&reg) {
      self.free.insert(reg);
    }
  }

  /// The return-value register. It is outside the pool, so taking it never
  /// uses up capacity.
  pub fn return_register(&mut self) -> Register {
    self.return_in_use = true;
    Register::RETURN
  }

  pub fn return_in_use(&self) -> bool {
    self.return_in_use
  }

  pub fn free_return_registers(&mut self) {
    self.return_in_use = false;
  }

  pub fn available(&self) -> usize {
    self.free.len()
  }

  pub fn all_free(&self) -> bool {
    self.free.len() == self.capacity
  }
}

//! Stack frame layout of the function being generated.
//!
//! Every variable gets a fixed position measured in bytes below the saved
//! link register. `depth` is how far `sp` currently sits below that point, so
//! a variable's `sp`-relative offset is `depth - position` and stays correct
//! while temporaries (call arguments) are pushed. Parameters live above the
//! saved link register and have negative positions.

use std::collections::HashMap;

use crate::error::{CompileError, CompileResult};
use crate::ty::Type;

/// Bytes per variable slot, whatever the variable's type.
pub const SLOT: i32 = 4;
const LINK_SLOT: i32 = 4;

#[derive(Debug)]
struct FrameScope {
  variables: HashMap<String, (i32, Type)>,
  base: i32,
  next: i32,
  limit: i32,
}

impl FrameScope {
  fn new(base: i32, limit: i32) -> Self {
    Self {
      variables: HashMap::new(),
      base,
      next: base,
      limit,
    }
  }
}

#[derive(Debug)]
pub struct Frame {
  scopes: Vec<FrameScope>,
  depth: i32,
}

impl Default for Frame {
  fn default() -> Self {
    Self::new()
  }
}

impl Frame {
  pub fn new() -> Self {
    Self::with_params(&[])
  }

  /// Frame of a function whose caller pushed `params` right to left.
  pub fn with_params(params: &[(String, Type)]) -> Self {
    let mut root = FrameScope::new(0, 0);
    let mut position = -LINK_SLOT;
    for (name, ty) in params {
      root.variables.insert(name.clone(), (position, *ty));
      position -= SLOT;
    }
    Self {
      scopes: vec![root],
      depth: 0,
    }
  }

  /// Reserve `slots` variable slots. Returns the bytes `sp` must move down.
  pub fn push_scope(&mut self, slots: usize) -> i32 {
    let bytes = SLOT * slots as i32;
    let base = self.depth;
    self.depth += bytes;
    self.scopes.push(FrameScope::new(base, self.depth));
    bytes
  }

  /// Drop the innermost scope. Returns the bytes `sp` must move back up.
  pub fn pop_scope(&mut self) -> i32 {
    if self.scopes.len() == 1 {
      return 0;
    }
    match self.scopes.pop() {
      Some(scope) => {
        let bytes = scope.limit - scope.base;
        self.depth -= bytes;
        bytes
      }
      None => 0,
    }
  }

  /// Give `name` the next free slot of the innermost scope and return its
  /// current `sp` offset.
  pub fn declare(&mut self, name: &str, ty: Type) -> CompileResult<i32> {
    let depth = self.depth;
    let scope = self
      .scopes
      .last_mut()
      .ok_or_else(|| CompileError::contract("frame has no scope"))?;
    if scope.next + SLOT > scope.limit {
      return Err(CompileError::contract(format!(
        "no stack slot left for {name}"
      )));
    }
    scope.next += SLOT;
    scope.variables.insert(name.to_string(), (scope.next, ty));
    Ok(depth - scope.next)
  }

  /// Current `sp` offset and type of the innermost visible `name`.
  pub fn lookup(&self, name: &str) -> Option<(i32, Type)> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.variables.get(name))
      .map(|&(position, ty)| (self.depth - position, ty))
  }

  /// Account for bytes pushed below the variables (call arguments).
  pub fn push_temp(&mut self, bytes: i32) {
    self.depth += bytes;
  }

  pub fn pop_temp(&mut self, bytes: i32) {
    self.depth -= bytes;
  }

  /// Bytes between `sp` and the saved link register.
  pub fn depth(&self) -> i32 {
    self.depth
  }
}

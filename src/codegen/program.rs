//! Program buffer: the generated instruction sequences plus interned messages.
//!
//! Functions are kept in the order they were opened. Opening a function while
//! another is open is allowed (runtime support is synthesised mid-body); each
//! function is still its own top-level sequence in the output.

use std::collections::HashMap;

use tracing::debug;

use super::instruction::{Directive, Instruction, Register};
use crate::error::{CompileError, CompileResult};
use crate::escape;

/// How a function's sequence is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionEnd {
  /// `POP {pc}`
  Return,
  /// `POP {pc}` followed by a literal pool flush.
  UserReturn,
  /// Nothing: control never falls off the end.
  NoReturn,
}

#[derive(Debug)]
pub struct ProgramBuffer {
  header: Vec<Instruction>,
  functions: Vec<(String, Vec<Instruction>)>,
  index: HashMap<String, usize>,
  open: Vec<usize>,
  messages: Vec<String>,
  message_ids: HashMap<String, usize>,
}

impl Default for ProgramBuffer {
  fn default() -> Self {
    Self::new()
  }
}

impl ProgramBuffer {
  pub fn new() -> Self {
    Self {
      header: vec![
        Instruction::Directive(Directive::Text),
        Instruction::Directive(Directive::Global("main".to_string())),
      ],
      functions: Vec::new(),
      index: HashMap::new(),
      open: Vec::new(),
      messages: Vec::new(),
      message_ids: HashMap::new(),
    }
  }

  /// Append to the innermost open function, or to the header when none is
  /// open.
  pub fn emit(&mut self, instruction: Instruction) {
    match self.open.last() {
      Some(&current) => self.functions[current].1.push(instruction),
      None => self.header.push(instruction),
    }
  }

  /// Open a new function sequence: its label and, when `save_link` is set,
  /// the link register push.
  pub fn start_function(&mut self, name: &str, save_link: bool) -> CompileResult<()> {
    if self.index.contains_key(name) {
      return Err(CompileError::contract(format!(
        "function {name} emitted twice"
      )));
    }
    debug!(%name, "starting function");
    let position = self.functions.len();
    self.functions.push((name.to_string(), Vec::new()));
    self.index.insert(name.to_string(), position);
    self.open.push(position);
    self.emit(Instruction::Label(name.to_string()));
    if save_link {
      self.emit(Instruction::Push(Register::Lr));
    }
    Ok(())
  }

  /// Close the innermost open function and resume the previous sequence.
  pub fn end_function(&mut self, end: FunctionEnd) -> CompileResult<()> {
    if self.open.is_empty() {
      return Err(CompileError::contract("no function is open"));
    }
    match end {
      FunctionEnd::Return => self.emit(Instruction::Pop(Register::Pc)),
      FunctionEnd::UserReturn => {
        self.emit(Instruction::Pop(Register::Pc));
        self.emit(Instruction::Directive(Directive::Ltorg));
      }
      FunctionEnd::NoReturn => {}
    }
    self.open.pop();
    Ok(())
  }

  pub fn has_function(&self, name: &str) -> bool {
    self.index.contains_key(name)
  }

  /// Number of currently open functions.
  pub fn depth(&self) -> usize {
    self.open.len()
  }

  pub fn function(&self, name: &str) -> Option<&[Instruction]> {
    self
      .index
      .get(name)
      .map(|&position| self.functions[position].1.as_slice())
  }

  pub fn function_names(&self) -> impl Iterator<Item = &str> {
    self.functions.iter().map(|(name, _)| name.as_str())
  }

  /// Label of an already decoded message, interning it on first use.
  pub fn intern(&mut self, message: &str) -> String {
    if let Some(&id) = self.message_ids.get(message) {
      return message_label(id);
    }
    let id = self.messages.len();
    debug!(id, "interning message");
    self.messages.push(message.to_string());
    self.message_ids.insert(message.to_string(), id);
    message_label(id)
  }

  pub fn message_count(&self) -> usize {
    self.messages.len()
  }

  /// Render the whole program: header, every function in insertion order,
  /// then the data section.
  pub fn serialize(&self) -> String {
    let mut out = String::new();
    let mut write = |instruction: &Instruction| {
      for _ in 0..instruction.indentation() {
        out.push('\t');
      }
      out.push_str(&instruction.to_string());
      out.push('\n');
    };

    for instruction in &self.header {
      write(instruction);
    }
    for (_, body) in &self.functions {
      for instruction in body {
        write(instruction);
      }
    }
    if !self.messages.is_empty() {
      write(&Instruction::Directive(Directive::Data));
      for (id, message) in self.messages.iter().enumerate() {
        write(&Instruction::Label(message_label(id)));
        write(&Instruction::Directive(Directive::Word(message.len() as u32)));
        write(&Instruction::Directive(Directive::Ascii(escape::encode(
          message,
        ))));
      }
    }
    out
  }
}

fn message_label(id: usize) -> String {
  format!("msg_{id}")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_is_idempotent() {
    let mut buffer = ProgramBuffer::new();
    assert_eq!(buffer.intern("hello"), "msg_0");
    assert_eq!(buffer.intern("world"), "msg_1");
    assert_eq!(buffer.intern("hello"), "msg_0");
    assert_eq!(buffer.message_count(), 2);

    let text = buffer.serialize();
    assert_eq!(text.matches("\"hello\"").count(), 1);
    assert!(text.contains(".data\nmsg_0:\n\t.word 5\n\t.ascii \"hello\"\n"));
  }

  #[test]
  fn message_length_counts_decoded_bytes() {
    let mut buffer = ProgramBuffer::new();
    buffer.intern("a\nb\0");
    let text = buffer.serialize();
    assert!(text.contains("\t.word 4\n\t.ascii \"a\\nb\\0\"\n"));
  }

  #[test]
  fn nested_functions_stay_separate() {
    let mut buffer = ProgramBuffer::new();
    buffer.start_function("main", true).unwrap();
    buffer.emit(Instruction::ldr_const(Register::R4, 1));
    buffer.start_function("helper", true).unwrap();
    buffer.emit(Instruction::ldr_const(Register::R0, 2));
    buffer.end_function(FunctionEnd::Return).unwrap();
    assert_eq!(buffer.depth(), 1);
    buffer.emit(Instruction::ldr_const(Register::R4, 3));
    buffer.end_function(FunctionEnd::UserReturn).unwrap();
    assert_eq!(buffer.depth(), 0);

    assert_eq!(
      buffer.serialize(),
      ".text\n.global main\nmain:\n\tPUSH {lr}\n\tLDR r4, =1\n\tLDR r4, =3\n\tPOP {pc}\n\t.ltorg\n\
       helper:\n\tPUSH {lr}\n\tLDR r0, =2\n\tPOP {pc}\n"
    );
  }

  #[test]
  fn unbalanced_or_duplicate_functions_are_rejected() {
    let mut buffer = ProgramBuffer::new();
    assert!(buffer.end_function(FunctionEnd::Return).is_err());
    buffer.start_function("f", false).unwrap();
    assert!(buffer.start_function("f", false).is_err());
    assert!(buffer.has_function("f"));
  }
}

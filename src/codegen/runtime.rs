//! Runtime support functions.
//!
//! Each helper is synthesised the first time a call site asks for it and
//! never again: [`require`] checks the program buffer by name before
//! emitting a body. Helpers that raise errors share the runtime-error
//! trampoline, which in turn needs the string printer; those dependencies are
//! pulled in the same way.

use super::instruction::{Address, ArithOp, Condition, Instruction, Operand, Register, Width};
use super::program::{FunctionEnd, ProgramBuffer};
use crate::error::CompileResult;
use tracing::debug;

use Register::{R0, R1, R2, Sp};

const OVERFLOW_MESSAGE: &str =
  "OverflowError: the result is too small/large to store in a 4-byte signed-integer.\n\0";
const DIVIDE_BY_ZERO_MESSAGE: &str = "DivideByZeroError: divide or modulo by zero\n\0";
const NEGATIVE_INDEX_MESSAGE: &str = "ArrayIndexOutOfBoundsError: negative index\n\0";
const LARGE_INDEX_MESSAGE: &str = "ArrayIndexOutOfBoundsError: index too large\n\0";
const NULL_REFERENCE_MESSAGE: &str = "NullReferenceError: dereference a null reference\n\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Support {
  PrintString,
  PrintBool,
  PrintInt,
  PrintReference,
  PrintChar,
  PrintLn,
  ReadInt,
  ReadChar,
  CheckArrayBounds,
  ThrowOverflow,
  CheckDivideByZero,
  ThrowRuntimeError,
  FreePair,
  CheckNullPointer,
}

impl Support {
  pub fn name(self) -> &'static str {
    match self {
      Support::PrintString => "p_print_string",
      Support::PrintBool => "p_print_bool",
      Support::PrintInt => "p_print_int",
      Support::PrintReference => "p_print_reference",
      Support::PrintChar => "p_print_char",
      Support::PrintLn => "p_print_ln",
      Support::ReadInt => "p_read_int",
      Support::ReadChar => "p_read_char",
      Support::CheckArrayBounds => "p_check_array_bounds",
      Support::ThrowOverflow => "p_throw_overflow_error",
      Support::CheckDivideByZero => "p_check_divide_by_zero",
      Support::ThrowRuntimeError => "p_throw_runtime_error",
      Support::FreePair => "p_free_pair",
      Support::CheckNullPointer => "p_check_null_pointer",
    }
  }
}

/// Make sure `support` is part of the program and return the label to call.
pub fn require(buffer: &mut ProgramBuffer, support: Support) -> CompileResult<&'static str> {
  let name = support.name();
  if buffer.has_function(name) {
    return Ok(name);
  }
  debug!(%name, "synthesising runtime support");
  match support {
    Support::PrintString => {
      let format = buffer.intern("%.*s\0");
      buffer.start_function(name, true)?;
      buffer.emit(Instruction::ldr(R1, Address::at(R0)));
      buffer.emit(Instruction::arith(
        ArithOp::Add,
        R2,
        R0,
        Operand::Imm(4),
      ));
      buffer.emit(Instruction::ldr_label(R0, format));
      finish_print(buffer, "printf")?;
    }
    Support::PrintBool => {
      let yes = buffer.intern("true\0");
      let no = buffer.intern("false\0");
      buffer.start_function(name, true)?;
      buffer.emit(Instruction::Cmp {
        lhs: R0,
        rhs: Operand::Imm(0),
      });
      buffer.emit(load_if(Condition::Ne, R0, yes));
      buffer.emit(load_if(Condition::Eq, R0, no));
      finish_print(buffer, "printf")?;
    }
    Support::PrintInt => print_formatted(buffer, name, "%d\0")?,
    Support::PrintReference => print_formatted(buffer, name, "%p\0")?,
    Support::PrintChar => print_formatted(buffer, name, "%c\0")?,
    Support::PrintLn => {
      let empty = buffer.intern("\0");
      buffer.start_function(name, true)?;
      buffer.emit(Instruction::ldr_label(R0, empty));
      finish_print(buffer, "puts")?;
    }
    Support::ReadInt => read_formatted(buffer, name, "%d\0")?,
    Support::ReadChar => read_formatted(buffer, name, " %c\0")?,
    Support::ThrowRuntimeError => {
      buffer.start_function(name, false)?;
      buffer.emit(Instruction::call(Support::PrintString.name()));
      buffer.emit(Instruction::mov_imm(R0, -1));
      buffer.emit(Instruction::call("exit"));
      buffer.end_function(FunctionEnd::NoReturn)?;
      require(buffer, Support::PrintString)?;
    }
    Support::ThrowOverflow => {
      let message = buffer.intern(OVERFLOW_MESSAGE);
      buffer.start_function(name, false)?;
      buffer.emit(Instruction::ldr_label(R0, message));
      buffer.emit(Instruction::call(Support::ThrowRuntimeError.name()));
      buffer.end_function(FunctionEnd::NoReturn)?;
      require(buffer, Support::ThrowRuntimeError)?;
    }
    Support::CheckDivideByZero => {
      let message = buffer.intern(DIVIDE_BY_ZERO_MESSAGE);
      buffer.start_function(name, true)?;
      buffer.emit(Instruction::Cmp {
        lhs: R1,
        rhs: Operand::Imm(0),
      });
      buffer.emit(load_if(Condition::Eq, R0, message));
      buffer.emit(Instruction::call_if(
        Condition::Eq,
        Support::ThrowRuntimeError.name(),
      ));
      buffer.end_function(FunctionEnd::Return)?;
      require(buffer, Support::ThrowRuntimeError)?;
    }
    Support::CheckArrayBounds => {
      let negative = buffer.intern(NEGATIVE_INDEX_MESSAGE);
      let too_large = buffer.intern(LARGE_INDEX_MESSAGE);
      buffer.start_function(name, true)?;
      buffer.emit(Instruction::Cmp {
        lhs: R0,
        rhs: Operand::Imm(0),
      });
      buffer.emit(load_if(Condition::Lt, R0, negative));
      buffer.emit(Instruction::call_if(
        Condition::Lt,
        Support::ThrowRuntimeError.name(),
      ));
      buffer.emit(Instruction::ldr(R1, Address::at(R1)));
      buffer.emit(Instruction::Cmp {
        lhs: R0,
        rhs: Operand::Reg(R1),
      });
      buffer.emit(load_if(Condition::Cs, R0, too_large));
      buffer.emit(Instruction::call_if(
        Condition::Cs,
        Support::ThrowRuntimeError.name(),
      ));
      buffer.end_function(FunctionEnd::Return)?;
      require(buffer, Support::ThrowRuntimeError)?;
    }
    Support::CheckNullPointer => {
      let message = buffer.intern(NULL_REFERENCE_MESSAGE);
      buffer.start_function(name, true)?;
      buffer.emit(Instruction::Cmp {
        lhs: R0,
        rhs: Operand::Imm(0),
      });
      buffer.emit(load_if(Condition::Eq, R0, message));
      buffer.emit(Instruction::call_if(
        Condition::Eq,
        Support::ThrowRuntimeError.name(),
      ));
      buffer.end_function(FunctionEnd::Return)?;
      require(buffer, Support::ThrowRuntimeError)?;
    }
    Support::FreePair => {
      let message = buffer.intern(NULL_REFERENCE_MESSAGE);
      buffer.start_function(name, true)?;
      buffer.emit(Instruction::Cmp {
        lhs: R0,
        rhs: Operand::Imm(0),
      });
      buffer.emit(load_if(Condition::Eq, R0, message));
      buffer.emit(Instruction::branch_if(
        Condition::Eq,
        Support::ThrowRuntimeError.name(),
      ));
      buffer.emit(Instruction::Push(R0));
      buffer.emit(Instruction::ldr(R0, Address::at(R0)));
      buffer.emit(Instruction::call("free"));
      buffer.emit(Instruction::ldr(R0, Address::at(Sp)));
      buffer.emit(Instruction::ldr(R0, Address::offset(R0, 4)));
      buffer.emit(Instruction::call("free"));
      buffer.emit(Instruction::Pop(R0));
      buffer.emit(Instruction::call("free"));
      buffer.end_function(FunctionEnd::Return)?;
      require(buffer, Support::ThrowRuntimeError)?;
    }
  }
  Ok(name)
}

fn load_if(cond: Condition, dst: Register, label: String) -> Instruction {
  Instruction::Ldr {
    cond: Some(cond),
    width: Width::Word,
    dst,
    src: Address::Label(label),
  }
}

/// Printer that passes `r0` as the single `printf` argument.
fn print_formatted(buffer: &mut ProgramBuffer, name: &str, format: &str) -> CompileResult<()> {
  let format = buffer.intern(format);
  buffer.start_function(name, true)?;
  buffer.emit(Instruction::mov(R1, R0));
  buffer.emit(Instruction::ldr_label(R0, format));
  finish_print(buffer, "printf")
}

/// Skip the length word of the format message, call `entry`, flush stdout.
fn finish_print(buffer: &mut ProgramBuffer, entry: &str) -> CompileResult<()> {
  skip_length_word(buffer);
  buffer.emit(Instruction::call(entry));
  buffer.emit(Instruction::mov_imm(R0, 0));
  buffer.emit(Instruction::call("fflush"));
  buffer.end_function(FunctionEnd::Return)
}

/// Reader that stores through the address in `r0`.
fn read_formatted(buffer: &mut ProgramBuffer, name: &str, format: &str) -> CompileResult<()> {
  let format = buffer.intern(format);
  buffer.start_function(name, true)?;
  buffer.emit(Instruction::mov(R1, R0));
  buffer.emit(Instruction::ldr_label(R0, format));
  skip_length_word(buffer);
  buffer.emit(Instruction::call("scanf"));
  buffer.end_function(FunctionEnd::Return)
}

fn skip_length_word(buffer: &mut ProgramBuffer) {
  buffer.emit(Instruction::arith(
    ArithOp::Add,
    R0,
    R0,
    Operand::Imm(4),
  ));
}

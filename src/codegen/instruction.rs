//! ARM11 instructions and directives.
//!
//! Instructions are plain data; the only behaviour they carry is rendering
//! their own assembly text and the indentation level of that text.

use std::fmt;

/// A 32-bit ARM core register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Register {
  R0,
  R1,
  R2,
  R3,
  R4,
  R5,
  R6,
  R7,
  R8,
  R9,
  R10,
  R11,
  R12,
  Sp,
  Lr,
  Pc,
}

impl Register {
  /// Holds function results and the first libc argument.
  pub const RETURN: Register = Register::R0;

  /// Registers the allocator may hand out, in allocation order.
  pub const GENERAL: [Register; 8] = [
    Register::R4,
    Register::R5,
    Register::R6,
    Register::R7,
    Register::R8,
    Register::R9,
    Register::R10,
    Register::R11,
  ];
}

impl fmt::Display for Register {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Register::Sp => f.write_str("sp"),
      Register::Lr => f.write_str("lr"),
      Register::Pc => f.write_str("pc"),
      other => write!(f, "r{}", *other as u8),
    }
  }
}

/// Condition codes used to predicate moves, loads and branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  /// Carry set: unsigned higher or same.
  Cs,
  /// Carry clear: unsigned lower.
  Cc,
  /// Overflow set.
  Vs,
  Vc,
}

impl Condition {
  pub fn inverse(self) -> Self {
    match self {
      Condition::Eq => Condition::Ne,
      Condition::Ne => Condition::Eq,
      Condition::Lt => Condition::Ge,
      Condition::Le => Condition::Gt,
      Condition::Gt => Condition::Le,
      Condition::Ge => Condition::Lt,
      Condition::Cs => Condition::Cc,
      Condition::Cc => Condition::Cs,
      Condition::Vs => Condition::Vc,
      Condition::Vc => Condition::Vs,
    }
  }
}

impl fmt::Display for Condition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let code = match self {
      Condition::Eq => "EQ",
      Condition::Ne => "NE",
      Condition::Lt => "LT",
      Condition::Le => "LE",
      Condition::Gt => "GT",
      Condition::Ge => "GE",
      Condition::Cs => "CS",
      Condition::Cc => "CC",
      Condition::Vs => "VS",
      Condition::Vc => "VC",
    };
    f.write_str(code)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
  Lsl(u8),
  Asr(u8),
}

/// Flexible second operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
  Imm(i32),
  Reg(Register),
  Shifted(Register, Shift),
}

impl fmt::Display for Operand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operand::Imm(value) => write!(f, "#{value}"),
      Operand::Reg(reg) => write!(f, "{reg}"),
      Operand::Shifted(reg, Shift::Lsl(amount)) => write!(f, "{reg}, LSL #{amount}"),
      Operand::Shifted(reg, Shift::Asr(amount)) => write!(f, "{reg}, ASR #{amount}"),
    }
  }
}

/// Memory operand of a load or store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
  /// `[base, #offset]`
  Offset { base: Register, offset: i32 },
  /// `[base, #offset]!`, writing the address back to `base`.
  PreIndexed { base: Register, offset: i32 },
  /// `=value`, loaded from the literal pool.
  Constant(i32),
  /// `=label`, the address of a label.
  Label(String),
}

impl Address {
  pub fn at(base: Register) -> Self {
    Self::Offset { base, offset: 0 }
  }

  pub fn offset(base: Register, offset: i32) -> Self {
    Self::Offset { base, offset }
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Address::Offset { base, offset: 0 } => write!(f, "[{base}]"),
      Address::Offset { base, offset } => write!(f, "[{base}, #{offset}]"),
      Address::PreIndexed { base, offset } => write!(f, "[{base}, #{offset}]!"),
      Address::Constant(value) => write!(f, "={value}"),
      Address::Label(label) => write!(f, "={label}"),
    }
  }
}

/// Access width of a load or store. Byte loads zero-extend, so characters
/// up to 255 read back as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
  Word,
  Byte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
  Add,
  Sub,
  Rsb,
  And,
  Orr,
  Eor,
}

impl ArithOp {
  fn mnemonic(self) -> &'static str {
    match self {
      ArithOp::Add => "ADD",
      ArithOp::Sub => "SUB",
      ArithOp::Rsb => "RSB",
      ArithOp::And => "AND",
      ArithOp::Orr => "ORR",
      ArithOp::Eor => "EOR",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
  Text,
  Data,
  Global(String),
  /// Flush the literal pool.
  Ltorg,
  Word(u32),
  /// Already escaped for the assembler.
  Ascii(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
  Label(String),
  Directive(Directive),
  Mov {
    cond: Option<Condition>,
    dst: Register,
    src: Operand,
  },
  Push(Register),
  Pop(Register),
  Ldr {
    cond: Option<Condition>,
    width: Width,
    dst: Register,
    src: Address,
  },
  Str {
    width: Width,
    src: Register,
    dst: Address,
  },
  Cmp {
    lhs: Register,
    rhs: Operand,
  },
  Branch {
    link: bool,
    cond: Option<Condition>,
    target: String,
  },
  Arith {
    op: ArithOp,
    set_flags: bool,
    dst: Register,
    lhs: Register,
    rhs: Operand,
  },
  /// Signed 32x32 -> 64 multiply.
  Smull {
    lo: Register,
    hi: Register,
    lhs: Register,
    rhs: Register,
  },
}

impl Instruction {
  pub fn mov(dst: Register, src: Register) -> Self {
    Self::Mov {
      cond: None,
      dst,
      src: Operand::Reg(src),
    }
  }

  pub fn mov_imm(dst: Register, value: i32) -> Self {
    Self::Mov {
      cond: None,
      dst,
      src: Operand::Imm(value),
    }
  }

  pub fn ldr(dst: Register, src: Address) -> Self {
    Self::Ldr {
      cond: None,
      width: Width::Word,
      dst,
      src,
    }
  }

  pub fn ldr_const(dst: Register, value: i32) -> Self {
    Self::ldr(dst, Address::Constant(value))
  }

  pub fn ldr_label(dst: Register, label: impl Into<String>) -> Self {
    Self::ldr(dst, Address::Label(label.into()))
  }

  pub fn branch(target: impl Into<String>) -> Self {
    Self::Branch {
      link: false,
      cond: None,
      target: target.into(),
    }
  }

  pub fn branch_if(cond: Condition, target: impl Into<String>) -> Self {
    Self::Branch {
      link: false,
      cond: Some(cond),
      target: target.into(),
    }
  }

  pub fn call(target: impl Into<String>) -> Self {
    Self::Branch {
      link: true,
      cond: None,
      target: target.into(),
    }
  }

  pub fn call_if(cond: Condition, target: impl Into<String>) -> Self {
    Self::Branch {
      link: true,
      cond: Some(cond),
      target: target.into(),
    }
  }

  pub fn arith(op: ArithOp, dst: Register, lhs: Register, rhs: Operand) -> Self {
    Self::Arith {
      op,
      set_flags: false,
      dst,
      lhs,
      rhs,
    }
  }

  /// Same as [`Instruction::arith`] but also updates the condition flags.
  pub fn arith_s(op: ArithOp, dst: Register, lhs: Register, rhs: Operand) -> Self {
    Self::Arith {
      op,
      set_flags: true,
      dst,
      lhs,
      rhs,
    }
  }

  /// Tab stops in front of this instruction's text.
  pub fn indentation(&self) -> usize {
    match self {
      Instruction::Label(_) => 0,
      Instruction::Directive(Directive::Text | Directive::Data | Directive::Global(_)) => 0,
      _ => 1,
    }
  }
}

fn cond_suffix(cond: Option<Condition>) -> String {
  cond.map(|cond| cond.to_string()).unwrap_or_default()
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Instruction::Label(name) => write!(f, "{name}:"),
      Instruction::Directive(directive) => match directive {
        Directive::Text => f.write_str(".text"),
        Directive::Data => f.write_str(".data"),
        Directive::Global(name) => write!(f, ".global {name}"),
        Directive::Ltorg => f.write_str(".ltorg"),
        Directive::Word(value) => write!(f, ".word {value}"),
        Directive::Ascii(text) => write!(f, ".ascii \"{text}\""),
      },
      Instruction::Mov { cond, dst, src } => write!(f, "MOV{} {dst}, {src}", cond_suffix(*cond)),
      Instruction::Push(reg) => write!(f, "PUSH {{{reg}}}"),
      Instruction::Pop(reg) => write!(f, "POP {{{reg}}}"),
      Instruction::Ldr {
        cond,
        width,
        dst,
        src,
      } => {
        let byte = if *width == Width::Byte { "B" } else { "" };
        write!(f, "LDR{}{byte} {dst}, {src}", cond_suffix(*cond))
      }
      Instruction::Str { width, src, dst } => {
        let byte = if *width == Width::Byte { "B" } else { "" };
        write!(f, "STR{byte} {src}, {dst}")
      }
      Instruction::Cmp { lhs, rhs } => write!(f, "CMP {lhs}, {rhs}"),
      Instruction::Branch { link, cond, target } => {
        let link = if *link { "L" } else { "" };
        write!(f, "B{link}{} {target}", cond_suffix(*cond))
      }
      Instruction::Arith {
        op,
        set_flags,
        dst,
        lhs,
        rhs,
      } => {
        let flags = if *set_flags { "S" } else { "" };
        write!(f, "{}{flags} {dst}, {lhs}, {rhs}", op.mnemonic())
      }
      Instruction::Smull { lo, hi, lhs, rhs } => write!(f, "SMULL {lo}, {hi}, {lhs}, {rhs}"),
    }
  }
}

//! Code generation: lower a checked program into ARM11 assembly.
//!
//! Expressions are evaluated into registers taken from the [`RegisterPool`];
//! every statement hands all of them back before the next one starts.
//! Variables live in 4-byte stack slots described by the [`Frame`], heap
//! values go through `malloc`, and every runtime check branches into a
//! support function synthesised on first use.

pub mod frame;
pub mod instruction;
pub mod order;
pub mod program;
pub mod registers;
pub mod runtime;

use tracing::{debug, trace};

use crate::ast::{
  ArrayElem, AssignLhs, AssignRhs, BinaryOp, Expr, ExprKind, Function, PairElem, PairSide, Program,
  Stmt, StmtKind, UnaryOp,
};
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::escape;
use crate::semantic::parse_int_literal;
use crate::symbols::SymbolTable;
use crate::ty::{BaseType, Type, TypeKind};

use frame::Frame;
use instruction::{Address, ArithOp, Condition, Instruction, Operand, Register, Shift, Width};
use order::evaluation_order;
use program::{FunctionEnd, ProgramBuffer};
use registers::RegisterPool;
use runtime::Support;

use Register::{R0, R1, Sp};

/// Generate assembly for a program that passed semantic analysis.
pub fn generate(
  program: &Program,
  symbols: &SymbolTable,
  config: &CompilerConfig,
) -> CompileResult<String> {
  config.validate()?;
  let mut generator = Generator::new(symbols, config);
  for function in &program.functions {
    generator.function(function)?;
  }
  generator.main(&program.body)?;
  debug!(
    functions = generator.buffer.function_names().count(),
    messages = generator.buffer.message_count(),
    "code generation finished"
  );
  Ok(generator.buffer.serialize())
}

/// Assembly label of a user function.
pub fn function_label(name: &str) -> String {
  format!("f_{name}")
}

struct Generator<'a> {
  symbols: &'a SymbolTable,
  config: &'a CompilerConfig,
  buffer: ProgramBuffer,
  registers: RegisterPool,
  frame: Frame,
  labels: usize,
}

impl<'a> Generator<'a> {
  fn new(symbols: &'a SymbolTable, config: &'a CompilerConfig) -> Self {
    Self {
      symbols,
      config,
      buffer: ProgramBuffer::new(),
      registers: RegisterPool::new(config.general_registers),
      frame: Frame::new(),
      labels: 0,
    }
  }

  fn emit(&mut self, instruction: Instruction) {
    self.buffer.emit(instruction);
  }

  fn fresh_label(&mut self) -> String {
    let label = format!("L{}", self.labels);
    self.labels += 1;
    label
  }

  fn acquire(&mut self) -> CompileResult<Register> {
    self.registers.acquire()
  }

  fn release(&mut self, reg: Register) {
    self.registers.release(reg);
  }

  /// Call a runtime support function, synthesising it if needed.
  fn support(&mut self, support: Support) -> CompileResult<()> {
    let name = runtime::require(&mut self.buffer, support)?;
    self.emit(Instruction::call(name));
    Ok(())
  }

  fn support_if(&mut self, cond: Condition, support: Support) -> CompileResult<()> {
    let name = runtime::require(&mut self.buffer, support)?;
    self.emit(Instruction::call_if(cond, name));
    Ok(())
  }

  /// Move `sp` by `bytes`, split into encodable immediates.
  fn adjust_sp(&mut self, op: ArithOp, bytes: i32) {
    let chunk = self.config.stack_chunk as i32;
    let mut remaining = bytes;
    while remaining > 0 {
      let step = remaining.min(chunk);
      self.emit(Instruction::arith(op, Sp, Sp, Operand::Imm(step)));
      remaining -= step;
    }
  }

  /// Generate `body` inside a new frame scope sized for its declarations.
  fn scoped(&mut self, body: &Stmt) -> CompileResult<()> {
    self.with_scope(declared_slots(body), |generator| generator.stmt(body))
  }

  fn with_scope(
    &mut self,
    slots: usize,
    f: impl FnOnce(&mut Self) -> CompileResult<()>,
  ) -> CompileResult<()> {
    let bytes = self.frame.push_scope(slots);
    self.adjust_sp(ArithOp::Sub, bytes);
    f(self)?;
    let bytes = self.frame.pop_scope();
    self.adjust_sp(ArithOp::Add, bytes);
    Ok(())
  }

  fn function(&mut self, function: &Function) -> CompileResult<()> {
    debug!(name = %function.name, "generating function");
    let params: Vec<(String, Type)> = function
      .params
      .iter()
      .map(|param| (param.name.clone(), param.ty))
      .collect();
    self.frame = Frame::with_params(&params);
    self.buffer.start_function(&function_label(&function.name), true)?;
    self.scoped(&function.body)?;
    self.buffer.end_function(FunctionEnd::UserReturn)
  }

  fn main(&mut self, body: &Stmt) -> CompileResult<()> {
    debug!("generating main");
    self.frame = Frame::new();
    self.buffer.start_function("main", true)?;
    self.scoped(body)?;
    self.emit(Instruction::ldr_const(R0, 0));
    self.buffer.end_function(FunctionEnd::UserReturn)
  }

  fn stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    let depth = self.buffer.depth();
    self.stmt_kind(&stmt.kind)?;
    debug_assert_eq!(self.buffer.depth(), depth);
    debug_assert!(self.registers.all_free());
    Ok(())
  }

  fn stmt_kind(&mut self, kind: &StmtKind) -> CompileResult<()> {
    match kind {
      StmtKind::Skip => {}
      StmtKind::Declare { ty, name, rhs } => {
        trace!(%name, "declaration");
        let value = self.rhs(rhs, *ty)?;
        let offset = self.frame.declare(name, *ty)?;
        self.store(width(*ty), value, Address::offset(Sp, offset));
        self.release(value);
      }
      StmtKind::Assign { lhs, rhs } => {
        let target = self.lhs_type(lhs)?;
        let value = self.rhs(rhs, target)?;
        let (address, base) = self.lhs_address(lhs)?;
        // Pair boxes are always word sized.
        let store_width = match lhs {
          AssignLhs::PairElem(_) => Width::Word,
          _ => width(target),
        };
        self.store(store_width, value, address);
        if let Some(base) = base {
          self.release(base);
        }
        self.release(value);
      }
      StmtKind::Increment(name) => {
        let (offset, _) = self.variable(name)?;
        let reg = self.acquire()?;
        self.emit(Instruction::ldr(reg, Address::offset(Sp, offset)));
        self.emit(Instruction::arith_s(ArithOp::Add, reg, reg, Operand::Imm(1)));
        self.support_if(Condition::Vs, Support::ThrowOverflow)?;
        self.store(Width::Word, reg, Address::offset(Sp, offset));
        self.release(reg);
      }
      StmtKind::Read(target) => {
        let ty = self.lhs_type(target)?;
        let reg = match self.lhs_address(target)? {
          (Address::Offset { base, offset }, None) => {
            let reg = self.acquire()?;
            self.emit(Instruction::arith(ArithOp::Add, reg, base, Operand::Imm(offset)));
            reg
          }
          (_, Some(base)) => base,
          (address, None) => {
            return Err(CompileError::contract(format!(
              "cannot read into {address}"
            )));
          }
        };
        self.emit(Instruction::mov(R0, reg));
        self.release(reg);
        let support = if ty == Type::char() {
          Support::ReadChar
        } else {
          Support::ReadInt
        };
        self.support(support)?;
      }
      StmtKind::Free(expr) => {
        let reg = self.expr(expr)?;
        self.emit(Instruction::mov(R0, reg));
        self.release(reg);
        self.support(Support::FreePair)?;
      }
      StmtKind::Return(expr) => {
        let reg = self.expr(expr)?;
        let ret = self.registers.return_register();
        self.emit(Instruction::mov(ret, reg));
        self.release(reg);
        let depth = self.frame.depth();
        self.adjust_sp(ArithOp::Add, depth);
        self.emit(Instruction::Pop(Register::Pc));
        self.registers.free_return_registers();
      }
      StmtKind::Exit(expr) => {
        let reg = self.expr(expr)?;
        let ret = self.registers.return_register();
        self.emit(Instruction::mov(ret, reg));
        self.emit(Instruction::call("exit"));
        self.registers.free_return_registers();
        self.release(reg);
        self.emit(Instruction::ldr_const(R0, 0));
      }
      StmtKind::Print(expr) => self.print(expr)?,
      StmtKind::Println(expr) => {
        self.print(expr)?;
        self.support(Support::PrintLn)?;
      }
      StmtKind::If {
        cond,
        then,
        otherwise,
      } => {
        let end = self.fresh_label();
        let reg = self.expr(cond)?;
        self.emit(Instruction::Cmp {
          lhs: reg,
          rhs: Operand::Imm(0),
        });
        self.release(reg);
        match otherwise {
          Some(otherwise) => {
            let otherwise_label = self.fresh_label();
            self.emit(Instruction::branch_if(Condition::Eq, otherwise_label.clone()));
            self.scoped(then)?;
            self.emit(Instruction::branch(end.clone()));
            self.emit(Instruction::Label(otherwise_label));
            self.scoped(otherwise)?;
          }
          None => {
            self.emit(Instruction::branch_if(Condition::Eq, end.clone()));
            self.scoped(then)?;
          }
        }
        self.emit(Instruction::Label(end));
      }
      StmtKind::While { cond, body } => {
        let check = self.fresh_label();
        let top = self.fresh_label();
        self.emit(Instruction::branch(check.clone()));
        self.emit(Instruction::Label(top.clone()));
        self.scoped(body)?;
        self.emit(Instruction::Label(check));
        self.loop_back(cond, top)?;
      }
      StmtKind::DoWhile { body, cond } => {
        let top = self.fresh_label();
        self.emit(Instruction::Label(top.clone()));
        self.scoped(body)?;
        self.loop_back(cond, top)?;
      }
      StmtKind::For {
        init,
        cond,
        step,
        body,
      } => {
        self.with_scope(declared_slots(init), |generator| {
          generator.stmt(init)?;
          let check = generator.fresh_label();
          let top = generator.fresh_label();
          generator.emit(Instruction::branch(check.clone()));
          generator.emit(Instruction::Label(top.clone()));
          generator.scoped(body)?;
          generator.stmt(step)?;
          generator.emit(Instruction::Label(check));
          generator.loop_back(cond, top)
        })?;
      }
      StmtKind::Block(body) => self.scoped(body)?,
      StmtKind::Seq(first, second) => {
        self.stmt(first)?;
        self.stmt(second)?;
      }
    }
    Ok(())
  }

  /// Branch back to `top` while `cond` holds.
  fn loop_back(&mut self, cond: &Expr, top: String) -> CompileResult<()> {
    let reg = self.expr(cond)?;
    self.emit(Instruction::Cmp {
      lhs: reg,
      rhs: Operand::Imm(1),
    });
    self.release(reg);
    self.emit(Instruction::branch_if(Condition::Eq, top));
    Ok(())
  }

  fn print(&mut self, expr: &Expr) -> CompileResult<()> {
    let ty = self.type_of(expr)?;
    let reg = self.expr(expr)?;
    self.emit(Instruction::mov(R0, reg));
    self.release(reg);
    self.support(printer(ty))
  }

  fn store(&mut self, width: Width, src: Register, dst: Address) {
    self.emit(Instruction::Str { width, src, dst });
  }

  fn load(&mut self, width: Width, dst: Register, src: Address) {
    self.emit(Instruction::Ldr {
      cond: None,
      width,
      dst,
      src,
    });
  }

  fn variable(&self, name: &str) -> CompileResult<(i32, Type)> {
    self
      .frame
      .lookup(name)
      .ok_or_else(|| CompileError::contract(format!("unknown variable {name}")))
  }

  fn lhs_type(&self, lhs: &AssignLhs) -> CompileResult<Type> {
    match lhs {
      AssignLhs::Ident(name) => Ok(self.variable(name)?.1),
      AssignLhs::ArrayElem(elem) => self.array_elem_type(elem),
      AssignLhs::PairElem(elem) => self.pair_elem_type(elem),
    }
  }

  /// Where an assignment target lives. The register, if any, holds the
  /// address and must be released by the caller.
  fn lhs_address(&mut self, lhs: &AssignLhs) -> CompileResult<(Address, Option<Register>)> {
    match lhs {
      AssignLhs::Ident(name) => {
        let (offset, _) = self.variable(name)?;
        Ok((Address::offset(Sp, offset), None))
      }
      AssignLhs::ArrayElem(elem) => {
        let (reg, _) = self.array_elem_address(elem)?;
        Ok((Address::at(reg), Some(reg)))
      }
      AssignLhs::PairElem(elem) => {
        let reg = self.pair_elem_address(elem)?;
        Ok((Address::at(reg), Some(reg)))
      }
    }
  }

  fn rhs(&mut self, rhs: &AssignRhs, target: Type) -> CompileResult<Register> {
    match rhs {
      AssignRhs::Expr(expr) => self.expr(expr),
      AssignRhs::ArrayLiteral(elems) => self.array_literal(elems, target),
      AssignRhs::NewPair(fst, snd) => self.new_pair(fst, snd),
      AssignRhs::PairElem(elem) => {
        let reg = self.pair_elem_address(elem)?;
        self.load(Width::Word, reg, Address::at(reg));
        Ok(reg)
      }
      AssignRhs::Call { name, args } => self.call(name, args),
    }
  }

  /// `malloc(size)`, with the block address moved into a fresh register.
  fn malloc(&mut self, size: i32) -> CompileResult<Register> {
    self.emit(Instruction::ldr_const(R0, size));
    self.emit(Instruction::call("malloc"));
    let reg = self.acquire()?;
    self.emit(Instruction::mov(reg, R0));
    Ok(reg)
  }

  fn array_literal(&mut self, elems: &[Expr], target: Type) -> CompileResult<Register> {
    let mut elem_ty = target.element();
    if !elem_ty.is_valid() || elem_ty.is_any() {
      elem_ty = match elems.first() {
        Some(first) => self.type_of(first)?,
        None => Type::int(),
      };
    }
    let size = elem_ty.size() as i32;
    let count = elems.len() as i32;
    let array = self.malloc(SLOT_BYTES + count * size)?;
    for (index, elem) in elems.iter().enumerate() {
      let value = self.expr(elem)?;
      let offset = SLOT_BYTES + index as i32 * size;
      self.store(width(elem_ty), value, Address::offset(array, offset));
      self.release(value);
    }
    let length = self.acquire()?;
    self.emit(Instruction::ldr_const(length, count));
    self.store(Width::Word, length, Address::at(array));
    self.release(length);
    Ok(array)
  }

  /// A pair block holds pointers to two word-sized boxes, one per side.
  fn new_pair(&mut self, fst: &Expr, snd: &Expr) -> CompileResult<Register> {
    let sides = [fst, snd];
    let mut values = [None, None];
    for index in evaluation_order(&sides) {
      values[index] = Some(self.expr(sides[index])?);
    }
    let pair = self.malloc(2 * SLOT_BYTES)?;
    for (index, value) in values.into_iter().enumerate() {
      let value = value.ok_or_else(|| CompileError::contract("pair side not evaluated"))?;
      self.emit(Instruction::ldr_const(R0, SLOT_BYTES));
      self.emit(Instruction::call("malloc"));
      self.store(Width::Word, value, Address::at(R0));
      self.store(
        Width::Word,
        R0,
        Address::offset(pair, index as i32 * SLOT_BYTES),
      );
      self.release(value);
    }
    Ok(pair)
  }

  fn call(&mut self, name: &str, args: &[Expr]) -> CompileResult<Register> {
    trace!(%name, "call");
    debug_assert!(
      !self.registers.return_in_use(),
      "return register live across a call"
    );
    let signature = self
      .symbols
      .function(name)
      .ok_or_else(|| CompileError::contract(format!("unknown function {name}")))?;
    let param_types: Vec<Type> = signature.params.iter().map(|(_, ty)| *ty).collect();

    let mut pushed = 0;
    for (index, arg) in args.iter().enumerate().rev() {
      let ty = match param_types.get(index) {
        Some(ty) => *ty,
        None => self.type_of(arg)?,
      };
      let reg = self.expr(arg)?;
      self.store(
        width(ty),
        reg,
        Address::PreIndexed {
          base: Sp,
          offset: -SLOT_BYTES,
        },
      );
      self.release(reg);
      self.frame.push_temp(SLOT_BYTES);
      pushed += SLOT_BYTES;
    }
    self.emit(Instruction::call(function_label(name)));
    self.adjust_sp(ArithOp::Add, pushed);
    self.frame.pop_temp(pushed);

    let ret = self.registers.return_register();
    let result = self.acquire()?;
    self.emit(Instruction::mov(result, ret));
    self.registers.free_return_registers();
    Ok(result)
  }

  fn expr(&mut self, expr: &Expr) -> CompileResult<Register> {
    match &expr.kind {
      ExprKind::Int(text) => {
        let value = parse_int_literal(text)
          .ok_or_else(|| CompileError::contract(format!("integer literal {text} out of range")))?;
        let reg = self.acquire()?;
        self.emit(Instruction::ldr_const(reg, value));
        Ok(reg)
      }
      ExprKind::Bool(value) => {
        let reg = self.acquire()?;
        self.emit(Instruction::mov_imm(reg, i32::from(*value)));
        Ok(reg)
      }
      ExprKind::Char(value) => {
        let reg = self.acquire()?;
        self.emit(Instruction::mov_imm(reg, u32::from(*value) as i32));
        Ok(reg)
      }
      ExprKind::Str(raw) => {
        let label = self.buffer.intern(&escape::decode(raw));
        let reg = self.acquire()?;
        self.emit(Instruction::ldr_label(reg, label));
        Ok(reg)
      }
      ExprKind::PairNull => {
        let reg = self.acquire()?;
        self.emit(Instruction::ldr_const(reg, 0));
        Ok(reg)
      }
      ExprKind::Ident(name) => {
        let (offset, ty) = self.variable(name)?;
        let reg = self.acquire()?;
        self.load(width(ty), reg, Address::offset(Sp, offset));
        Ok(reg)
      }
      ExprKind::ArrayElem(elem) => {
        let (reg, ty) = self.array_elem_address(elem)?;
        self.load(width(ty), reg, Address::at(reg));
        Ok(reg)
      }
      ExprKind::Unary { op, operand } => {
        let reg = self.expr(operand)?;
        match op {
          UnaryOp::Not => self.emit(Instruction::arith(ArithOp::Eor, reg, reg, Operand::Imm(1))),
          UnaryOp::Neg => {
            self.emit(Instruction::arith_s(ArithOp::Rsb, reg, reg, Operand::Imm(0)));
            self.support_if(Condition::Vs, Support::ThrowOverflow)?;
          }
          UnaryOp::Len => self.load(Width::Word, reg, Address::at(reg)),
          // Characters and integers share one register representation.
          UnaryOp::Ord | UnaryOp::Chr => {}
        }
        Ok(reg)
      }
      ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs),
    }
  }

  fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CompileResult<Register> {
    let (l, r) = if evaluation_order(&[lhs, rhs])[0] == 0 {
      let l = self.expr(lhs)?;
      (l, self.expr(rhs)?)
    } else {
      let r = self.expr(rhs)?;
      (self.expr(lhs)?, r)
    };

    match op {
      BinaryOp::Add | BinaryOp::Sub => {
        let arith = if op == BinaryOp::Add {
          ArithOp::Add
        } else {
          ArithOp::Sub
        };
        self.emit(Instruction::arith_s(arith, l, l, Operand::Reg(r)));
        self.support_if(Condition::Vs, Support::ThrowOverflow)?;
      }
      BinaryOp::Mul => {
        self.emit(Instruction::Smull {
          lo: l,
          hi: r,
          lhs: l,
          rhs: r,
        });
        // The product fits when the high word is the sign extension of the low.
        self.emit(Instruction::Cmp {
          lhs: r,
          rhs: Operand::Shifted(l, Shift::Asr(31)),
        });
        self.support_if(Condition::Ne, Support::ThrowOverflow)?;
      }
      BinaryOp::Div | BinaryOp::Mod => {
        self.emit(Instruction::mov(R0, l));
        self.emit(Instruction::mov(R1, r));
        self.support(Support::CheckDivideByZero)?;
        if op == BinaryOp::Div {
          self.emit(Instruction::call("__aeabi_idiv"));
          self.emit(Instruction::mov(l, R0));
        } else {
          self.emit(Instruction::call("__aeabi_idivmod"));
          self.emit(Instruction::mov(l, R1));
        }
      }
      BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Eq | BinaryOp::Ne => {
        let cond = match op {
          BinaryOp::Gt => Condition::Gt,
          BinaryOp::Ge => Condition::Ge,
          BinaryOp::Lt => Condition::Lt,
          BinaryOp::Le => Condition::Le,
          BinaryOp::Eq => Condition::Eq,
          _ => Condition::Ne,
        };
        self.emit(Instruction::Cmp {
          lhs: l,
          rhs: Operand::Reg(r),
        });
        self.emit(Instruction::Mov {
          cond: Some(cond),
          dst: l,
          src: Operand::Imm(1),
        });
        self.emit(Instruction::Mov {
          cond: Some(cond.inverse()),
          dst: l,
          src: Operand::Imm(0),
        });
      }
      BinaryOp::And => self.emit(Instruction::arith(ArithOp::And, l, l, Operand::Reg(r))),
      BinaryOp::Or => self.emit(Instruction::arith(ArithOp::Orr, l, l, Operand::Reg(r))),
    }
    self.release(r);
    Ok(l)
  }

  /// Address of an array element, bounds-checked per dimension.
  fn array_elem_address(&mut self, elem: &ArrayElem) -> CompileResult<(Register, Type)> {
    let (offset, mut ty) = self.variable(&elem.name)?;
    let array = self.acquire()?;
    self.emit(Instruction::ldr(array, Address::offset(Sp, offset)));
    for (position, index) in elem.indices.iter().enumerate() {
      if position > 0 {
        self.emit(Instruction::ldr(array, Address::at(array)));
      }
      let reg = self.expr(index)?;
      self.emit(Instruction::mov(R0, reg));
      self.emit(Instruction::mov(R1, array));
      self.support(Support::CheckArrayBounds)?;
      ty = ty.element();
      self.emit(Instruction::arith(
        ArithOp::Add,
        array,
        array,
        Operand::Imm(SLOT_BYTES),
      ));
      let scaled = if ty.size() == 1 {
        Operand::Reg(reg)
      } else {
        Operand::Shifted(reg, Shift::Lsl(2))
      };
      self.emit(Instruction::arith(ArithOp::Add, array, array, scaled));
      self.release(reg);
    }
    Ok((array, ty))
  }

  /// Address of the box holding one side of a pair, null-checked.
  fn pair_elem_address(&mut self, elem: &PairElem) -> CompileResult<Register> {
    let reg = self.expr(&elem.pair)?;
    self.emit(Instruction::mov(R0, reg));
    self.support(Support::CheckNullPointer)?;
    let offset = match elem.side {
      PairSide::Fst => 0,
      PairSide::Snd => SLOT_BYTES,
    };
    self.emit(Instruction::ldr(reg, Address::offset(reg, offset)));
    Ok(reg)
  }

  fn array_elem_type(&self, elem: &ArrayElem) -> CompileResult<Type> {
    let (_, mut ty) = self.variable(&elem.name)?;
    for _ in &elem.indices {
      ty = ty.element();
    }
    Ok(ty)
  }

  fn pair_elem_type(&self, elem: &PairElem) -> CompileResult<Type> {
    let pair = self.type_of(&elem.pair)?;
    let side = match elem.side {
      PairSide::Fst => pair.fst(),
      PairSide::Snd => pair.snd(),
    };
    side.ok_or_else(|| CompileError::contract(format!("{pair} is not a pair")))
  }

  /// Static type of an expression in the current frame.
  fn type_of(&self, expr: &Expr) -> CompileResult<Type> {
    let ty = match &expr.kind {
      ExprKind::Int(_) => Type::int(),
      ExprKind::Bool(_) => Type::bool(),
      ExprKind::Char(_) => Type::char(),
      ExprKind::Str(_) => Type::string(),
      ExprKind::PairNull => Type::erased_pair(),
      ExprKind::Ident(name) => self.variable(name)?.1,
      ExprKind::ArrayElem(elem) => self.array_elem_type(elem)?,
      ExprKind::Unary { op, .. } => match op {
        UnaryOp::Not => Type::bool(),
        UnaryOp::Neg | UnaryOp::Len | UnaryOp::Ord => Type::int(),
        UnaryOp::Chr => Type::char(),
      },
      ExprKind::Binary { op, .. } => match op {
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Add | BinaryOp::Sub => {
          Type::int()
        }
        _ => Type::bool(),
      },
    };
    Ok(ty)
  }
}

const SLOT_BYTES: i32 = frame::SLOT;

fn width(ty: Type) -> Width {
  if ty.size() == 1 { Width::Byte } else { Width::Word }
}

/// Stack slots a statement declares directly, nested scopes excluded.
fn declared_slots(stmt: &Stmt) -> usize {
  match &stmt.kind {
    StmtKind::Declare { .. } => 1,
    StmtKind::Seq(first, second) => declared_slots(first) + declared_slots(second),
    _ => 0,
  }
}

/// Support function that prints a value of type `ty`.
fn printer(ty: Type) -> Support {
  match (ty.kind, ty.dims) {
    (TypeKind::Base(BaseType::String), 0) | (TypeKind::Base(BaseType::Char), 1) => {
      Support::PrintString
    }
    (TypeKind::Base(BaseType::Int), 0) => Support::PrintInt,
    (TypeKind::Base(BaseType::Bool), 0) => Support::PrintBool,
    (TypeKind::Base(BaseType::Char), 0) => Support::PrintChar,
    _ => Support::PrintReference,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::semantic::analyze;

  fn compile(program: &Program) -> String {
    compile_with(program, &CompilerConfig::default()).unwrap()
  }

  fn compile_with(program: &Program, config: &CompilerConfig) -> CompileResult<String> {
    let analysis = analyze(program);
    assert!(analysis.is_ok(), "{:?}", analysis.diagnostics);
    generate(program, &analysis.symbols, config)
  }

  fn main_only(body: Vec<Stmt>) -> Program {
    Program::new(Vec::new(), Stmt::seq(body))
  }

  fn lines(asm: &str) -> Vec<&str> {
    asm.lines().map(str::trim).collect()
  }

  /// The instructions of one function, label included.
  fn body<'a>(asm: &'a str, label: &str) -> Vec<&'a str> {
    let lines = lines(asm);
    let start = lines
      .iter()
      .position(|line| *line == format!("{label}:"))
      .unwrap();
    let mut out = vec![lines[start]];
    for line in &lines[start + 1..] {
      if (line.ends_with(':') && !is_local_label(line)) || *line == ".data" {
        break;
      }
      out.push(line);
    }
    out
  }

  /// `L<n>:` labels belong to the function they appear in.
  fn is_local_label(line: &str) -> bool {
    line
      .strip_prefix('L')
      .and_then(|rest| rest.strip_suffix(':'))
      .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
  }

  fn expr(expr: Expr) -> AssignRhs {
    AssignRhs::Expr(expr)
  }

  #[test]
  fn empty_program() {
    let asm = compile(&main_only(vec![Stmt::skip()]));
    assert_eq!(
      asm,
      ".text\n.global main\nmain:\n\tPUSH {lr}\n\tLDR r0, =0\n\tPOP {pc}\n\t.ltorg\n"
    );
  }

  #[test]
  fn locals_are_stored_in_their_slots() {
    let asm = compile(&main_only(vec![
      Stmt::declare(Type::int(), "x", expr(Expr::int("5"))),
      Stmt::declare(Type::bool(), "b", expr(Expr::bool(true))),
      Stmt::assign(AssignLhs::Ident("x".into()), expr(Expr::int("6"))),
    ]));
    assert_eq!(
      body(&asm, "main"),
      vec![
        "main:",
        "PUSH {lr}",
        "SUB sp, sp, #8",
        "LDR r4, =5",
        "STR r4, [sp, #4]",
        "MOV r4, #1",
        "STRB r4, [sp]",
        "LDR r4, =6",
        "STR r4, [sp, #4]",
        "ADD sp, sp, #8",
        "LDR r0, =0",
        "POP {pc}",
        ".ltorg",
      ]
    );
  }

  #[test]
  fn large_frames_are_adjusted_in_chunks() {
    let decls = (0..3)
      .map(|index| Stmt::declare(Type::int(), format!("v{index}"), expr(Expr::int("0"))))
      .collect();
    let config = CompilerConfig {
      stack_chunk: 8,
      ..CompilerConfig::default()
    };
    let asm = compile_with(&main_only(decls), &config).unwrap();
    assert_eq!(asm.matches("SUB sp, sp, #8").count(), 1);
    assert_eq!(asm.matches("SUB sp, sp, #4").count(), 1);
    assert_eq!(asm.matches("ADD sp, sp, #8").count(), 1);
  }

  #[test]
  fn arithmetic_is_overflow_checked() {
    let asm = compile(&main_only(vec![Stmt::declare(
      Type::int(),
      "x",
      expr(Expr::binary(BinaryOp::Mul, Expr::int("3"), Expr::int("4"))),
    )]));
    let main = body(&asm, "main");
    assert!(main.contains(&"SMULL r4, r5, r4, r5"));
    assert!(main.contains(&"CMP r5, r4, ASR #31"));
    assert!(main.contains(&"BLNE p_throw_overflow_error"));
    assert_eq!(
      body(&asm, "p_throw_overflow_error"),
      vec![
        "p_throw_overflow_error:",
        "LDR r0, =msg_0",
        "BL p_throw_runtime_error"
      ]
    );
  }

  #[test]
  fn division_checks_for_zero() {
    let asm = compile(&main_only(vec![Stmt::exit(Expr::binary(
      BinaryOp::Mod,
      Expr::int("7"),
      Expr::int("2"),
    ))]));
    let main = body(&asm, "main");
    let start = main.iter().position(|line| *line == "MOV r0, r4").unwrap();
    assert_eq!(
      &main[start..start + 5],
      &[
        "MOV r0, r4",
        "MOV r1, r5",
        "BL p_check_divide_by_zero",
        "BL __aeabi_idivmod",
        "MOV r4, r1"
      ]
    );
  }

  #[test]
  fn comparisons_materialise_booleans() {
    let asm = compile(&main_only(vec![Stmt::declare(
      Type::bool(),
      "b",
      expr(Expr::binary(BinaryOp::Le, Expr::int("1"), Expr::int("2"))),
    )]));
    let main = body(&asm, "main");
    assert!(main.contains(&"CMP r4, r5"));
    assert!(main.contains(&"MOVLE r4, #1"));
    assert!(main.contains(&"MOVGT r4, #0"));
  }

  #[test]
  fn heavier_operand_is_generated_first() {
    let heavy = Expr::binary(
      BinaryOp::Add,
      Expr::binary(BinaryOp::Add, Expr::int("1"), Expr::int("2")),
      Expr::binary(BinaryOp::Add, Expr::int("3"), Expr::int("4")),
    );
    let asm = compile(&main_only(vec![Stmt::exit(Expr::binary(
      BinaryOp::Sub,
      Expr::int("9"),
      heavy,
    ))]));
    let main = body(&asm, "main");
    // The right operand needs three registers and runs first.
    assert_eq!(main[2], "LDR r4, =1");
    assert!(main.contains(&"LDR r5, =9"));
    assert!(main.contains(&"SUBS r5, r5, r4"));
  }

  #[test]
  fn register_exhaustion_is_reported() {
    let config = CompilerConfig {
      general_registers: 1,
      ..CompilerConfig::default()
    };
    let program = main_only(vec![Stmt::exit(Expr::binary(
      BinaryOp::Add,
      Expr::int("1"),
      Expr::int("2"),
    ))]);
    assert!(matches!(
      compile_with(&program, &config),
      Err(CompileError::RegistersExhausted { available: 1 })
    ));
  }

  #[test]
  fn print_dispatches_on_type() {
    let asm = compile(&main_only(vec![
      Stmt::declare(
        Type::char().to_array(),
        "cs",
        AssignRhs::ArrayLiteral(vec![Expr::char('a'), Expr::char('b')]),
      ),
      Stmt::print(Expr::ident("cs")),
      Stmt::print(Expr::str("hi")),
      Stmt::print(Expr::int("1")),
      Stmt::print(Expr::bool(false)),
      Stmt::print(Expr::char('c')),
      Stmt::println(Expr::null()),
    ]));
    let main = body(&asm, "main");
    assert_eq!(main.iter().filter(|line| **line == "BL p_print_string").count(), 2);
    for call in [
      "BL p_print_int",
      "BL p_print_bool",
      "BL p_print_char",
      "BL p_print_reference",
      "BL p_print_ln",
    ] {
      assert!(main.contains(&call), "missing {call}");
    }
    // Character arrays use byte elements.
    assert!(main.contains(&"LDR r0, =6"));
    assert!(main.contains(&"STRB r5, [r4, #5]"));
  }

  #[test]
  fn array_access_is_bounds_checked() {
    let asm = compile(&main_only(vec![
      Stmt::declare(
        Type::int().to_array(),
        "a",
        AssignRhs::ArrayLiteral(vec![Expr::int("1"), Expr::int("2")]),
      ),
      Stmt::assign(
        AssignLhs::ArrayElem(ArrayElem {
          name: "a".into(),
          indices: vec![Expr::int("1")],
        }),
        expr(Expr::int("3")),
      ),
    ]));
    let main = body(&asm, "main");
    let start = main.iter().position(|line| *line == "LDR r4, =3").unwrap();
    assert_eq!(
      &main[start..start + 9],
      &[
        "LDR r4, =3",
        "LDR r5, [sp]",
        "LDR r6, =1",
        "MOV r0, r6",
        "MOV r1, r5",
        "BL p_check_array_bounds",
        "ADD r5, r5, #4",
        "ADD r5, r5, r6, LSL #2",
        "STR r4, [r5]"
      ]
    );
  }

  #[test]
  fn pairs_are_boxed_and_null_checked() {
    let asm = compile(&main_only(vec![
      Stmt::declare(
        Type::pair_of(Type::int(), Type::char()),
        "p",
        AssignRhs::NewPair(Expr::int("1"), Expr::char('x')),
      ),
      Stmt::declare(
        Type::char(),
        "c",
        AssignRhs::PairElem(Box::new(PairElem::snd(Expr::ident("p")))),
      ),
      Stmt::free(Expr::ident("p")),
    ]));
    let main = body(&asm, "main");
    assert_eq!(main.iter().filter(|line| **line == "BL malloc").count(), 3);
    assert!(main.contains(&"STR r0, [r6, #4]"));
    assert!(main.contains(&"BL p_check_null_pointer"));
    assert!(main.contains(&"LDR r4, [r4, #4]"));
    assert!(main.contains(&"BL p_free_pair"));
    assert!(asm.contains("p_free_pair:"));
  }

  #[test]
  fn calls_push_arguments_right_to_left() {
    let callee = Function::new(
      "add",
      Type::int(),
      vec![("a", Type::int()), ("b", Type::char())],
      Stmt::ret(Expr::ident("a")),
    );
    let program = Program::new(
      vec![callee],
      Stmt::declare(
        Type::int(),
        "x",
        AssignRhs::Call {
          name: "add".into(),
          args: vec![Expr::int("1"), Expr::char('z')],
        },
      ),
    );
    let asm = compile(&program);
    assert_eq!(
      body(&asm, "f_add"),
      vec![
        "f_add:",
        "PUSH {lr}",
        "LDR r4, [sp, #4]",
        "MOV r0, r4",
        "POP {pc}",
        "POP {pc}",
        ".ltorg"
      ]
    );
    let main = body(&asm, "main");
    let start = main.iter().position(|line| *line == "MOV r4, #122").unwrap();
    assert_eq!(
      &main[start..start + 8],
      &[
        "MOV r4, #122",
        "STRB r4, [sp, #-4]!",
        "LDR r4, =1",
        "STR r4, [sp, #-4]!",
        "BL f_add",
        "ADD sp, sp, #8",
        "MOV r4, r0",
        "STR r4, [sp]"
      ]
    );
  }

  #[test]
  fn parameters_shift_with_locals() {
    let callee = Function::new(
      "id",
      Type::int(),
      vec![("n", Type::int())],
      Stmt::seq(vec![
        Stmt::declare(Type::int(), "m", expr(Expr::ident("n"))),
        Stmt::ret(Expr::ident("m")),
      ]),
    );
    let program = Program::new(vec![callee], Stmt::skip());
    let asm = compile(&program);
    assert_eq!(
      body(&asm, "f_id"),
      vec![
        "f_id:",
        "PUSH {lr}",
        "SUB sp, sp, #4",
        "LDR r4, [sp, #8]",
        "STR r4, [sp]",
        "LDR r4, [sp]",
        "MOV r0, r4",
        "ADD sp, sp, #4",
        "POP {pc}",
        "ADD sp, sp, #4",
        "POP {pc}",
        ".ltorg"
      ]
    );
  }

  #[test]
  fn control_flow_uses_numbered_labels() {
    let asm = compile(&main_only(vec![
      Stmt::declare(Type::int(), "i", expr(Expr::int("0"))),
      Stmt::while_loop(
        Expr::binary(BinaryOp::Lt, Expr::ident("i"), Expr::int("3")),
        Stmt::increment("i"),
      ),
      Stmt::if_else(Expr::bool(true), Stmt::skip(), Stmt::skip()),
    ]));
    let all = lines(&asm);
    let main_start = all.iter().position(|line| *line == "main:").unwrap();
    let main = &all[main_start..];
    let expected = [
      "B L0",
      "L1:",
      "LDR r4, [sp]",
      "ADDS r4, r4, #1",
      "BLVS p_throw_overflow_error",
      "STR r4, [sp]",
      "L0:",
    ];
    let start = main.iter().position(|line| *line == "B L0").unwrap();
    assert_eq!(&main[start..start + expected.len()], &expected);
    assert!(main.contains(&"BEQ L1"));
    assert!(main.contains(&"BEQ L3"));
    assert!(main.contains(&"B L2"));
    assert!(main.contains(&"L2:"));
  }

  #[test]
  fn for_loops_scope_their_counter() {
    let program = main_only(vec![Stmt::for_loop(
      Stmt::declare(Type::int(), "i", expr(Expr::int("0"))),
      Expr::binary(BinaryOp::Lt, Expr::ident("i"), Expr::int("2")),
      Stmt::increment("i"),
      Stmt::declare(Type::int(), "j", expr(Expr::ident("i"))),
    )]);
    let asm = compile(&program);
    let main = body(&asm, "main");
    assert_eq!(main.iter().filter(|line| **line == "SUB sp, sp, #4").count(), 2);
    // Inside the body the counter sits one slot further up.
    assert!(main.contains(&"LDR r4, [sp, #4]"));
  }

  #[test]
  fn read_passes_the_target_address() {
    let asm = compile(&main_only(vec![
      Stmt::declare(Type::char(), "c", expr(Expr::char('a'))),
      Stmt::read(AssignLhs::Ident("c".into())),
    ]));
    let main = body(&asm, "main");
    assert!(main.contains(&"ADD r4, sp, #0"));
    assert!(main.contains(&"MOV r0, r4"));
    assert!(main.contains(&"BL p_read_char"));
    assert!(asm.contains("\t.ascii \" %c\\0\""));
  }

  #[test]
  fn strings_are_decoded_once_and_interned() {
    let asm = compile(&main_only(vec![
      Stmt::println(Expr::str(r"a\nb")),
      Stmt::println(Expr::str(r"a\nb")),
    ]));
    assert_eq!(asm.matches(".ascii \"a\\nb\"").count(), 1);
    assert!(asm.contains("\t.word 3\n\t.ascii \"a\\nb\"\n"));
  }

  fn contains_run(haystack: &[&str], run: &[&str]) -> bool {
    haystack.windows(run.len()).any(|window| window == run)
  }

  #[test]
  fn high_characters_load_zero_extended() {
    let asm = compile(&main_only(vec![
      Stmt::declare(Type::char(), "c", expr(Expr::char('\u{c8}'))),
      Stmt::declare(
        Type::bool(),
        "b",
        expr(Expr::binary(BinaryOp::Eq, Expr::ident("c"), Expr::char('\u{c8}'))),
      ),
      Stmt::exit(Expr::unary(UnaryOp::Ord, Expr::ident("c"))),
    ]));
    let main = body(&asm, "main");
    assert!(contains_run(
      &main,
      &["MOV r4, #200", "STRB r4, [sp, #4]", "LDRB r4, [sp, #4]", "MOV r5, #200", "CMP r4, r5"]
    ));
    assert!(contains_run(&main, &["LDRB r4, [sp, #4]", "MOV r0, r4", "BL exit"]));
    assert!(!asm.contains("LDRSB"));
  }

  #[test]
  fn do_while_runs_the_body_first() {
    let asm = compile(&main_only(vec![
      Stmt::declare(Type::int(), "i", expr(Expr::int("0"))),
      Stmt::do_while(
        Stmt::increment("i"),
        Expr::binary(BinaryOp::Lt, Expr::ident("i"), Expr::int("3")),
      ),
    ]));
    let main = body(&asm, "main");
    assert!(contains_run(
      &main,
      &[
        "L0:",
        "LDR r4, [sp]",
        "ADDS r4, r4, #1",
        "BLVS p_throw_overflow_error",
        "STR r4, [sp]",
        "LDR r4, [sp]",
        "LDR r5, =3",
        "CMP r4, r5",
        "MOVLT r4, #1",
        "MOVGE r4, #0",
        "CMP r4, #1",
        "BEQ L0"
      ]
    ));
    assert!(!main.contains(&"B L0"));
  }

  #[test]
  fn unary_operators() {
    let asm = compile(&main_only(vec![
      Stmt::declare(Type::int(), "x", expr(Expr::unary(UnaryOp::Neg, Expr::int("5")))),
      Stmt::declare(Type::bool(), "b", expr(Expr::unary(UnaryOp::Not, Expr::bool(true)))),
      Stmt::declare(
        Type::int().to_array(),
        "a",
        AssignRhs::ArrayLiteral(vec![Expr::int("1"), Expr::int("2")]),
      ),
      Stmt::declare(Type::int(), "n", expr(Expr::unary(UnaryOp::Len, Expr::ident("a")))),
      Stmt::declare(Type::int(), "o", expr(Expr::unary(UnaryOp::Ord, Expr::char('a')))),
      Stmt::declare(Type::char(), "c", expr(Expr::unary(UnaryOp::Chr, Expr::int("65")))),
    ]));
    let main = body(&asm, "main");
    assert!(contains_run(
      &main,
      &["LDR r4, =5", "RSBS r4, r4, #0", "BLVS p_throw_overflow_error", "STR r4, [sp, #20]"]
    ));
    assert!(contains_run(&main, &["MOV r4, #1", "EOR r4, r4, #1", "STRB r4, [sp, #16]"]));
    assert!(contains_run(&main, &["LDR r4, [sp, #12]", "LDR r4, [r4]", "STR r4, [sp, #8]"]));
    // `ord` and `chr` only change the static type.
    assert!(contains_run(&main, &["MOV r4, #97", "STR r4, [sp, #4]"]));
    assert!(contains_run(&main, &["LDR r4, =65", "STRB r4, [sp]"]));
  }

  #[test]
  fn logical_operators_are_bitwise_on_booleans() {
    let asm = compile(&main_only(vec![
      Stmt::declare(
        Type::bool(),
        "p",
        expr(Expr::binary(BinaryOp::And, Expr::bool(true), Expr::bool(false))),
      ),
      Stmt::declare(
        Type::bool(),
        "q",
        expr(Expr::binary(BinaryOp::Or, Expr::bool(true), Expr::bool(false))),
      ),
    ]));
    let main = body(&asm, "main");
    assert!(contains_run(
      &main,
      &["MOV r4, #1", "MOV r5, #0", "AND r4, r4, r5", "STRB r4, [sp, #4]"]
    ));
    assert!(contains_run(
      &main,
      &["MOV r4, #1", "MOV r5, #0", "ORR r4, r4, r5", "STRB r4, [sp]"]
    ));
  }

  #[test]
  fn nested_indexing_follows_each_row() {
    let asm = compile(&main_only(vec![
      Stmt::declare(
        Type::int().to_array(),
        "row",
        AssignRhs::ArrayLiteral(vec![Expr::int("7")]),
      ),
      Stmt::declare(
        Type::int().to_array().to_array(),
        "m",
        AssignRhs::ArrayLiteral(vec![Expr::ident("row")]),
      ),
      Stmt::declare(
        Type::int(),
        "v",
        expr(Expr::array_elem("m", vec![Expr::int("0"), Expr::int("0")])),
      ),
    ]));
    let main = body(&asm, "main");
    assert!(contains_run(
      &main,
      &[
        "LDR r4, [sp, #4]",
        "LDR r5, =0",
        "MOV r0, r5",
        "MOV r1, r4",
        "BL p_check_array_bounds",
        "ADD r4, r4, #4",
        "ADD r4, r4, r5, LSL #2",
        "LDR r4, [r4]",
        "LDR r5, =0",
        "MOV r0, r5",
        "MOV r1, r4",
        "BL p_check_array_bounds",
        "ADD r4, r4, #4",
        "ADD r4, r4, r5, LSL #2",
        "LDR r4, [r4]",
        "STR r4, [sp]"
      ]
    ));
  }

  #[test]
  fn read_into_array_and_pair_elements() {
    let asm = compile(&main_only(vec![
      Stmt::declare(
        Type::int().to_array(),
        "a",
        AssignRhs::ArrayLiteral(vec![Expr::int("0")]),
      ),
      Stmt::read(AssignLhs::ArrayElem(ArrayElem {
        name: "a".into(),
        indices: vec![Expr::int("0")],
      })),
      Stmt::declare(
        Type::pair_of(Type::int(), Type::char()),
        "p",
        AssignRhs::NewPair(Expr::int("1"), Expr::char('x')),
      ),
      Stmt::read(AssignLhs::PairElem(Box::new(PairElem::snd(Expr::ident("p"))))),
    ]));
    let main = body(&asm, "main");
    assert!(contains_run(
      &main,
      &["ADD r4, r4, r5, LSL #2", "MOV r0, r4", "BL p_read_int"]
    ));
    assert!(contains_run(
      &main,
      &[
        "LDR r4, [sp]",
        "MOV r0, r4",
        "BL p_check_null_pointer",
        "LDR r4, [r4, #4]",
        "MOV r0, r4",
        "BL p_read_char"
      ]
    ));
  }

  #[test]
  fn return_unwinds_every_open_scope() {
    let callee = Function::new(
      "f",
      Type::int(),
      Vec::new(),
      Stmt::seq(vec![
        Stmt::declare(Type::int(), "x", expr(Expr::int("1"))),
        Stmt::if_else(
          Expr::bool(true),
          Stmt::seq(vec![
            Stmt::declare(Type::int(), "y", expr(Expr::int("2"))),
            Stmt::ret(Expr::ident("y")),
          ]),
          Stmt::ret(Expr::ident("x")),
        ),
      ]),
    );
    let asm = compile(&Program::new(vec![callee], Stmt::skip()));
    assert_eq!(
      body(&asm, "f_f"),
      vec![
        "f_f:",
        "PUSH {lr}",
        "SUB sp, sp, #4",
        "LDR r4, =1",
        "STR r4, [sp]",
        "MOV r4, #1",
        "CMP r4, #0",
        "BEQ L1",
        "SUB sp, sp, #4",
        "LDR r4, =2",
        "STR r4, [sp]",
        "LDR r4, [sp]",
        "MOV r0, r4",
        "ADD sp, sp, #8",
        "POP {pc}",
        "ADD sp, sp, #4",
        "B L0",
        "L1:",
        "LDR r4, [sp]",
        "MOV r0, r4",
        "ADD sp, sp, #4",
        "POP {pc}",
        "L0:",
        "ADD sp, sp, #4",
        "POP {pc}",
        ".ltorg"
      ]
    );
  }
}

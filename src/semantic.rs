//! Semantic analysis: type checking and scope resolution.
//!
//! The analyzer walks the whole tree once, even after errors. Every check that
//! fails appends a [`Diagnostic`] and the walk carries on with a best-effort
//! type (usually [`Type::invalid`]) so one run reports as many independent
//! defects as possible.

use tracing::{debug, trace};

use crate::ast::{
  ArrayElem, AssignLhs, AssignRhs, BinaryOp, Expr, ExprKind, Function, PairElem, PairSide, Program,
  Span, Stmt, StmtKind, UnaryOp,
};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::error::{CompileError, CompileResult};
use crate::symbols::SymbolTable;
use crate::ty::Type;

/// Largest code point accepted in a character literal.
pub const CHAR_MAX: u32 = 255;

/// Result of analysing a program: the populated table and every diagnostic,
/// in the order they were found.
#[derive(Debug)]
pub struct Analysis {
  pub symbols: SymbolTable,
  pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
  pub fn is_ok(&self) -> bool {
    self.diagnostics.is_empty()
  }

  pub fn into_result(self) -> CompileResult<SymbolTable> {
    if self.diagnostics.is_empty() {
      Ok(self.symbols)
    } else {
      Err(CompileError::Semantic {
        diagnostics: self.diagnostics,
      })
    }
  }
}

/// Type-check a whole program.
pub fn analyze(program: &Program) -> Analysis {
  let mut analyzer = Analyzer::default();
  analyzer.program(program);
  debug!(
    diagnostics = analyzer.diagnostics.len(),
    "semantic analysis finished"
  );
  Analysis {
    symbols: analyzer.symbols,
    diagnostics: analyzer.diagnostics,
  }
}

#[derive(Debug, Default)]
struct Analyzer {
  symbols: SymbolTable,
  diagnostics: Vec<Diagnostic>,
}

impl Analyzer {
  fn report(&mut self, kind: DiagnosticKind, span: Span) {
    trace!(%kind, line = span.line, column = span.column, "diagnostic");
    self.diagnostics.push(Diagnostic::new(kind, span));
  }

  /// Report a mismatch unless either side already carries an earlier error.
  fn expect(&mut self, expected: Type, actual: Type, span: Span) {
    if expected.is_valid() && actual.is_valid() && !expected.matches(&actual) {
      self.diagnostics.push(Diagnostic::mismatch(expected, actual, span));
    }
  }

  /// Run `f` inside a fresh scope. The scope is popped on every path out of
  /// `f`, so the stack depth is the same before and after.
  fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
    let depth = self.symbols.new_scope();
    let result = f(self);
    self.symbols.end_scope();
    debug_assert_eq!(self.symbols.depth(), depth);
    result
  }

  fn program(&mut self, program: &Program) {
    // Every signature is known before any body is checked.
    for function in &program.functions {
      debug!(name = %function.name, "declaring function");
      if !self.symbols.add_function(&function.name, function.return_type) {
        self.report(
          DiagnosticKind::FunctionRedeclared {
            name: function.name.clone(),
          },
          function.span,
        );
        continue;
      }
      for param in &function.params {
        self
          .symbols
          .add_param_to_function(&function.name, &param.name, param.ty);
      }
    }

    for function in &program.functions {
      self.function(function);
    }

    self.stmt(&program.body);
  }

  fn function(&mut self, function: &Function) {
    debug!(name = %function.name, "checking function body");
    let expected = function.return_type;

    let inferred = self.scoped(|analyzer| {
      for name in analyzer.symbols.enter_function(&function.name) {
        analyzer.report(DiagnosticKind::VariableRedeclared { name }, function.span);
      }
      analyzer.stmt(&function.body)
    });
    self.symbols.leave_function();

    if !inferred.is_some_and(|ty| ty.is_valid()) {
      self.report(
        DiagnosticKind::MissingReturn {
          name: function.name.clone(),
        },
        function.span,
      );
    }
    if let Some(actual) = inferred
      && !expected.matches(&actual)
    {
      self
        .diagnostics
        .push(Diagnostic::mismatch(expected, actual, function.span));
    }
  }

  /// Check a statement. The result is the type a `return` inside it
  /// produces, if control can leave through one.
  fn stmt(&mut self, stmt: &Stmt) -> Option<Type> {
    let span = stmt.span;
    match &stmt.kind {
      StmtKind::Skip => None,
      StmtKind::Declare { ty, name, rhs } => {
        trace!(%name, "declaration");
        let actual = self.rhs(rhs, span);
        self.expect(*ty, actual, span);
        if !self.symbols.add_variable(name, *ty) {
          self.report(
            DiagnosticKind::VariableRedeclared { name: name.clone() },
            span,
          );
        }
        None
      }
      StmtKind::Assign { lhs, rhs } => {
        let expected = self.lhs(lhs, span);
        let actual = self.rhs(rhs, span);
        self.expect(expected, actual, span);
        None
      }
      StmtKind::Increment(name) => {
        if self.symbols.is_declared(name) {
          let ty = self.symbols.lookup_type(name);
          self.expect(Type::int(), ty, span);
        } else {
          self.report(DiagnosticKind::SymbolNotFound { name: name.clone() }, span);
        }
        None
      }
      StmtKind::Read(target) => {
        let ty = self.lhs(target, span);
        if ty.is_valid() && !Type::char().matches(&ty) && !Type::int().matches(&ty) {
          self.report(
            DiagnosticKind::TypeMismatch {
              expected: Type::char(),
              alternative: Some(Type::int()),
              actual: ty,
            },
            span,
          );
        }
        None
      }
      StmtKind::Free(expr) => {
        let ty = self.expr(expr);
        if ty.is_valid() && !ty.is_pair() && !ty.is_any() {
          self
            .diagnostics
            .push(Diagnostic::mismatch(Type::erased_pair(), ty, expr.span));
        }
        None
      }
      StmtKind::Return(expr) => {
        trace!(function = ?self.symbols.current_function(), "return");
        Some(self.expr(expr))
      }
      StmtKind::Exit(expr) => {
        let ty = self.expr(expr);
        self.expect(Type::int(), ty, expr.span);
        Some(Type::any())
      }
      StmtKind::Print(expr) | StmtKind::Println(expr) => {
        if !self.expr(expr).is_valid() {
          self.report(DiagnosticKind::Unprintable, expr.span);
        }
        None
      }
      StmtKind::If {
        cond,
        then,
        otherwise,
      } => {
        self.condition(cond);
        let then_ty = self.scoped(|analyzer| analyzer.stmt(then));
        match otherwise {
          Some(otherwise) => {
            let else_ty = self.scoped(|analyzer| analyzer.stmt(otherwise));
            common_type(then_ty, else_ty)
          }
          None => then_ty,
        }
      }
      StmtKind::While { cond, body } => {
        self.condition(cond);
        self.scoped(|analyzer| analyzer.stmt(body))
      }
      StmtKind::DoWhile { body, cond } => {
        let ty = self.scoped(|analyzer| analyzer.stmt(body));
        self.condition(cond);
        ty
      }
      StmtKind::For {
        init,
        cond,
        step,
        body,
      } => self.scoped(|analyzer| {
        if matches!(init.kind, StmtKind::Declare { .. } | StmtKind::Assign { .. }) {
          analyzer.stmt(init);
        } else {
          analyzer.report(DiagnosticKind::NonValidStatement, init.span);
        }
        analyzer.condition(cond);
        if matches!(step.kind, StmtKind::Assign { .. } | StmtKind::Increment(_)) {
          analyzer.stmt(step);
        } else {
          analyzer.report(DiagnosticKind::NonValidStatement, step.span);
        }
        analyzer.scoped(|analyzer| analyzer.stmt(body))
      }),
      StmtKind::Block(body) => self.scoped(|analyzer| analyzer.stmt(body)),
      StmtKind::Seq(first, second) => {
        let first_ty = self.stmt(first);
        if first.is_return() {
          self.report(DiagnosticKind::UnreachableCode, second.span);
          return first_ty;
        }
        self.stmt(second)
      }
    }
  }

  fn condition(&mut self, cond: &Expr) {
    let ty = self.expr(cond);
    self.expect(Type::bool(), ty, cond.span);
  }

  fn lhs(&mut self, lhs: &AssignLhs, span: Span) -> Type {
    match lhs {
      AssignLhs::Ident(name) => self.ident(name, span),
      AssignLhs::ArrayElem(elem) => self.array_elem(elem, span),
      AssignLhs::PairElem(elem) => self.pair_elem(elem, span),
    }
  }

  fn rhs(&mut self, rhs: &AssignRhs, span: Span) -> Type {
    match rhs {
      AssignRhs::Expr(expr) => self.expr(expr),
      AssignRhs::ArrayLiteral(elems) => {
        let Some((first, rest)) = elems.split_first() else {
          return Type::any().to_array();
        };
        let elem_ty = self.expr(first);
        for elem in rest {
          let ty = self.expr(elem);
          if elem_ty.is_valid() && ty.is_valid() && !elem_ty.matches(&ty) {
            self.report(DiagnosticKind::IncompatibleArrayElements, elem.span);
          }
        }
        elem_ty.to_array()
      }
      AssignRhs::NewPair(fst, snd) => {
        let fst = self.expr(fst);
        let snd = self.expr(snd);
        Type::pair_of(fst, snd)
      }
      AssignRhs::PairElem(elem) => self.pair_elem(elem, span),
      AssignRhs::Call { name, args } => self.call(name, args, span),
    }
  }

  fn call(&mut self, name: &str, args: &[Expr], span: Span) -> Type {
    trace!(%name, "call");
    if !self.symbols.is_function(name) {
      self.report(
        DiagnosticKind::SymbolNotFound {
          name: name.to_string(),
        },
        span,
      );
      for arg in args {
        self.expr(arg);
      }
      return Type::invalid();
    }

    let expected = self.symbols.num_params(name);
    if args.len() != expected {
      self.report(
        DiagnosticKind::WrongArgumentCount {
          name: name.to_string(),
          expected,
          actual: args.len(),
        },
        span,
      );
    }
    for (index, arg) in args.iter().enumerate() {
      let ty = self.expr(arg);
      if index < expected {
        let param = self.symbols.function_param_type(name, index);
        self.expect(param, ty, arg.span);
      }
    }
    self.symbols.lookup_function_type(name)
  }

  fn expr(&mut self, expr: &Expr) -> Type {
    let span = expr.span;
    match &expr.kind {
      ExprKind::Int(text) => match parse_int_literal(text) {
        Some(_) => Type::int(),
        None => {
          self.report(
            DiagnosticKind::IntegerOverflow {
              literal: text.clone(),
            },
            span,
          );
          Type::invalid()
        }
      },
      ExprKind::Bool(_) => Type::bool(),
      ExprKind::Char(c) => {
        if u32::from(*c) > CHAR_MAX {
          self.report(DiagnosticKind::CharacterOverflow { literal: *c }, span);
        }
        Type::char()
      }
      ExprKind::Str(_) => Type::string(),
      ExprKind::PairNull => Type::erased_pair(),
      ExprKind::Ident(name) => self.ident(name, span),
      ExprKind::ArrayElem(elem) => self.array_elem(elem, span),
      ExprKind::Unary { op, operand } => {
        let ty = self.expr(operand);
        self.unary(*op, ty, span)
      }
      ExprKind::Binary { op, lhs, rhs } => {
        let lhs_ty = self.expr(lhs);
        let rhs_ty = self.expr(rhs);
        self.binary(*op, (lhs_ty, lhs.span), (rhs_ty, rhs.span), span)
      }
    }
  }

  fn unary(&mut self, op: UnaryOp, ty: Type, span: Span) -> Type {
    match op {
      UnaryOp::Not => {
        self.expect(Type::bool(), ty, span);
        Type::bool()
      }
      UnaryOp::Neg => {
        self.expect(Type::int(), ty, span);
        Type::int()
      }
      UnaryOp::Len => {
        if ty.is_valid() && !ty.is_array() && !ty.is_any() {
          self
            .diagnostics
            .push(Diagnostic::mismatch(Type::any().to_array(), ty, span));
        }
        Type::int()
      }
      UnaryOp::Ord => {
        self.expect(Type::char(), ty, span);
        Type::int()
      }
      UnaryOp::Chr => {
        self.expect(Type::int(), ty, span);
        Type::char()
      }
    }
  }

  fn binary(&mut self, op: BinaryOp, lhs: (Type, Span), rhs: (Type, Span), span: Span) -> Type {
    let (lhs_ty, lhs_span) = lhs;
    let (rhs_ty, rhs_span) = rhs;
    if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
      return Type::bool();
    }

    if lhs_ty.is_pair() || lhs_ty.is_array() {
      self.report(
        DiagnosticKind::InvalidOperator {
          op: op.symbol().to_string(),
        },
        span,
      );
    }

    match op {
      BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Add | BinaryOp::Sub => {
        self.expect(Type::int(), lhs_ty, lhs_span);
        self.expect(Type::int(), rhs_ty, rhs_span);
        Type::int()
      }
      BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
        self.expect(lhs_ty, rhs_ty, lhs_span);
        Type::bool()
      }
      BinaryOp::And | BinaryOp::Or => {
        self.expect(Type::bool(), lhs_ty, lhs_span);
        self.expect(Type::bool(), rhs_ty, rhs_span);
        Type::bool()
      }
      BinaryOp::Eq | BinaryOp::Ne => Type::bool(),
    }
  }

  fn ident(&mut self, name: &str, span: Span) -> Type {
    if let Some(ty) = self.symbols.lookup_variable(name) {
      return ty;
    }
    let kind = if self.symbols.is_function(name) {
      DiagnosticKind::AssignmentToFunction {
        name: name.to_string(),
      }
    } else {
      DiagnosticKind::SymbolNotFound {
        name: name.to_string(),
      }
    };
    self.report(kind, span);
    Type::invalid()
  }

  fn array_elem(&mut self, elem: &ArrayElem, span: Span) -> Type {
    let array = self.ident(&elem.name, span);
    for index in &elem.indices {
      let ty = self.expr(index);
      self.expect(Type::int(), ty, index.span);
    }
    if !array.is_valid() {
      return array;
    }

    let mut ty = array;
    for _ in &elem.indices {
      if ty.is_any() {
        break;
      }
      if !ty.is_array() {
        self
          .diagnostics
          .push(Diagnostic::mismatch(Type::any().to_array(), array, span));
        return Type::invalid();
      }
      ty = ty.element();
    }
    ty
  }

  fn pair_elem(&mut self, elem: &PairElem, span: Span) -> Type {
    let pair = self.expr(&elem.pair);
    if !pair.is_valid() {
      return pair;
    }
    let side = match elem.side {
      PairSide::Fst => pair.fst(),
      PairSide::Snd => pair.snd(),
    };
    side.unwrap_or_else(|| {
      self
        .diagnostics
        .push(Diagnostic::mismatch(Type::erased_pair(), pair, span));
      Type::invalid()
    })
  }
}

/// Result type of a two-armed `if`: the arms' common type, or invalid when
/// they disagree.
fn common_type(then_ty: Option<Type>, else_ty: Option<Type>) -> Option<Type> {
  match (then_ty, else_ty) {
    (None, None) => None,
    (Some(lhs), Some(rhs)) if lhs.matches(&rhs) => Some(if lhs.is_any() { rhs } else { lhs }),
    _ => Some(Type::invalid()),
  }
}

/// Parse an integer literal as written in the source. `None` when it does not
/// fit a signed 32-bit word.
pub fn parse_int_literal(text: &str) -> Option<i32> {
  text.parse::<i64>().ok().and_then(|value| i32::try_from(value).ok())
}

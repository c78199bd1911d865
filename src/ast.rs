//! Abstract syntax tree consumed by the semantic analyzer and the generator.
//!
//! The parser lives outside this crate, so the tree is plain data with a few
//! constructor helpers. Statements and expressions carry the source position
//! used when reporting diagnostics.

use crate::ty::Type;

/// Line and column (both 1-based) of a construct in the source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
  pub line: usize,
  pub column: usize,
}

impl Span {
  pub fn new(line: usize, column: usize) -> Self {
    Self { line, column }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Not,
  Neg,
  Len,
  Ord,
  Chr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Mul,
  Div,
  Mod,
  Add,
  Sub,
  Gt,
  Ge,
  Lt,
  Le,
  Eq,
  Ne,
  And,
  Or,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::Mod => "%",
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Gt => ">",
      BinaryOp::Ge => ">=",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
      BinaryOp::Eq => "==",
      BinaryOp::Ne => "!=",
      BinaryOp::And => "&&",
      BinaryOp::Or => "||",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
  pub kind: ExprKind,
  pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
  /// Literal digits as written, with an optional leading sign.
  Int(String),
  Bool(bool),
  Char(char),
  /// String literal body with escape sequences still encoded.
  Str(String),
  PairNull,
  Ident(String),
  ArrayElem(ArrayElem),
  Unary {
    op: UnaryOp,
    operand: Box<Expr>,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
}

impl Expr {
  pub fn new(kind: ExprKind, span: Span) -> Self {
    Self { kind, span }
  }

  pub fn int(text: impl Into<String>) -> Self {
    Self::new(ExprKind::Int(text.into()), Span::default())
  }

  pub fn bool(value: bool) -> Self {
    Self::new(ExprKind::Bool(value), Span::default())
  }

  pub fn char(value: char) -> Self {
    Self::new(ExprKind::Char(value), Span::default())
  }

  pub fn str(raw: impl Into<String>) -> Self {
    Self::new(ExprKind::Str(raw.into()), Span::default())
  }

  pub fn null() -> Self {
    Self::new(ExprKind::PairNull, Span::default())
  }

  pub fn ident(name: impl Into<String>) -> Self {
    Self::new(ExprKind::Ident(name.into()), Span::default())
  }

  pub fn array_elem(name: impl Into<String>, indices: Vec<Expr>) -> Self {
    Self::new(
      ExprKind::ArrayElem(ArrayElem {
        name: name.into(),
        indices,
      }),
      Span::default(),
    )
  }

  pub fn unary(op: UnaryOp, operand: Expr) -> Self {
    Self::new(
      ExprKind::Unary {
        op,
        operand: Box::new(operand),
      },
      Span::default(),
    )
  }

  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::new(
      ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
      Span::default(),
    )
  }

  pub fn at(mut self, span: Span) -> Self {
    self.span = span;
    self
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayElem {
  pub name: String,
  pub indices: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSide {
  Fst,
  Snd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairElem {
  pub side: PairSide,
  pub pair: Expr,
}

impl PairElem {
  pub fn fst(pair: Expr) -> Self {
    Self {
      side: PairSide::Fst,
      pair,
    }
  }

  pub fn snd(pair: Expr) -> Self {
    Self {
      side: PairSide::Snd,
      pair,
    }
  }
}

/// Target of an assignment or a `read`.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignLhs {
  Ident(String),
  ArrayElem(ArrayElem),
  PairElem(Box<PairElem>),
}

/// Right-hand side of a declaration or assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignRhs {
  Expr(Expr),
  ArrayLiteral(Vec<Expr>),
  NewPair(Expr, Expr),
  PairElem(Box<PairElem>),
  Call { name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
  pub kind: StmtKind,
  pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
  Skip,
  Declare {
    ty: Type,
    name: String,
    rhs: AssignRhs,
  },
  Assign {
    lhs: AssignLhs,
    rhs: AssignRhs,
  },
  /// `x++`
  Increment(String),
  Read(AssignLhs),
  Free(Expr),
  Return(Expr),
  Exit(Expr),
  Print(Expr),
  Println(Expr),
  If {
    cond: Expr,
    then: Box<Stmt>,
    otherwise: Option<Box<Stmt>>,
  },
  While {
    cond: Expr,
    body: Box<Stmt>,
  },
  DoWhile {
    body: Box<Stmt>,
    cond: Expr,
  },
  For {
    init: Box<Stmt>,
    cond: Expr,
    step: Box<Stmt>,
    body: Box<Stmt>,
  },
  Block(Box<Stmt>),
  Seq(Box<Stmt>, Box<Stmt>),
}

impl Stmt {
  pub fn new(kind: StmtKind, span: Span) -> Self {
    Self { kind, span }
  }

  pub fn skip() -> Self {
    Self::new(StmtKind::Skip, Span::default())
  }

  pub fn declare(ty: Type, name: impl Into<String>, rhs: AssignRhs) -> Self {
    Self::new(
      StmtKind::Declare {
        ty,
        name: name.into(),
        rhs,
      },
      Span::default(),
    )
  }

  pub fn assign(lhs: AssignLhs, rhs: AssignRhs) -> Self {
    Self::new(StmtKind::Assign { lhs, rhs }, Span::default())
  }

  pub fn increment(name: impl Into<String>) -> Self {
    Self::new(StmtKind::Increment(name.into()), Span::default())
  }

  pub fn read(target: AssignLhs) -> Self {
    Self::new(StmtKind::Read(target), Span::default())
  }

  pub fn free(expr: Expr) -> Self {
    Self::new(StmtKind::Free(expr), Span::default())
  }

  pub fn ret(expr: Expr) -> Self {
    Self::new(StmtKind::Return(expr), Span::default())
  }

  pub fn exit(expr: Expr) -> Self {
    Self::new(StmtKind::Exit(expr), Span::default())
  }

  pub fn print(expr: Expr) -> Self {
    Self::new(StmtKind::Print(expr), Span::default())
  }

  pub fn println(expr: Expr) -> Self {
    Self::new(StmtKind::Println(expr), Span::default())
  }

  pub fn if_else(cond: Expr, then: Stmt, otherwise: Stmt) -> Self {
    Self::new(
      StmtKind::If {
        cond,
        then: Box::new(then),
        otherwise: Some(Box::new(otherwise)),
      },
      Span::default(),
    )
  }

  pub fn if_then(cond: Expr, then: Stmt) -> Self {
    Self::new(
      StmtKind::If {
        cond,
        then: Box::new(then),
        otherwise: None,
      },
      Span::default(),
    )
  }

  pub fn while_loop(cond: Expr, body: Stmt) -> Self {
    Self::new(
      StmtKind::While {
        cond,
        body: Box::new(body),
      },
      Span::default(),
    )
  }

  pub fn do_while(body: Stmt, cond: Expr) -> Self {
    Self::new(
      StmtKind::DoWhile {
        body: Box::new(body),
        cond,
      },
      Span::default(),
    )
  }

  pub fn for_loop(init: Stmt, cond: Expr, step: Stmt, body: Stmt) -> Self {
    Self::new(
      StmtKind::For {
        init: Box::new(init),
        cond,
        step: Box::new(step),
        body: Box::new(body),
      },
      Span::default(),
    )
  }

  pub fn block(body: Stmt) -> Self {
    Self::new(StmtKind::Block(Box::new(body)), Span::default())
  }

  /// Fold a list of statements into right-nested sequences. An empty list is
  /// a `skip`.
  pub fn seq(stmts: Vec<Stmt>) -> Self {
    let mut iter = stmts.into_iter().rev();
    let Some(last) = iter.next() else {
      return Self::skip();
    };
    iter.fold(last, |rest, stmt| {
      let span = stmt.span;
      Self::new(StmtKind::Seq(Box::new(stmt), Box::new(rest)), span)
    })
  }

  pub fn at(mut self, span: Span) -> Self {
    self.span = span;
    self
  }

  pub fn is_return(&self) -> bool {
    matches!(self.kind, StmtKind::Return(_))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
  pub name: String,
  pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
  pub name: String,
  pub return_type: Type,
  pub params: Vec<Param>,
  pub body: Stmt,
  pub span: Span,
}

impl Function {
  pub fn new(
    name: impl Into<String>,
    return_type: Type,
    params: Vec<(&str, Type)>,
    body: Stmt,
  ) -> Self {
    Self {
      name: name.into(),
      return_type,
      params: params
        .into_iter()
        .map(|(name, ty)| Param {
          name: name.to_string(),
          ty,
        })
        .collect(),
      body,
      span: Span::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
  pub functions: Vec<Function>,
  pub body: Stmt,
}

impl Program {
  pub fn new(functions: Vec<Function>, body: Stmt) -> Self {
    Self { functions, body }
  }
}

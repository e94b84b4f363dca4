//! The surface syntax tree produced by the parser.
//!
//! Every node is a plain data struct/enum carrying a [`Span`] for
//! diagnostics, with statements and expressions kept as separate
//! hierarchies. There are no classes/modules here — sink's surface grammar
//! is flat statements plus a Pratt-parsed expression grammar.

use beef::lean::Cow;
use span::{Span, Spanned};

pub type Ident<'src> = Spanned<Cow<'src, str>>;

#[derive(Debug, Clone, Default)]
pub struct Module<'src> {
  pub body: Vec<Stmt<'src>>,
}

pub type Stmt<'src> = Spanned<StmtKind<'src>>;

#[derive(Debug, Clone)]
pub enum StmtKind<'src> {
  /// `var a = 1, b = {2, 3}`
  Var(Vec<(Lvalue<'src>, Option<Expr<'src>>)>),
  /// A bare expression statement, including assignments and command calls
  /// written without parens (`say 'hi'`).
  Expr(Expr<'src>),
  If {
    arms: Vec<(Expr<'src>, Vec<Stmt<'src>>)>,
    else_: Option<Vec<Stmt<'src>>>,
  },
  While {
    cond: Expr<'src>,
    body: Vec<Stmt<'src>>,
  },
  For {
    lvalue: Lvalue<'src>,
    declares: bool,
    iter: Expr<'src>,
    body: Vec<Stmt<'src>>,
  },
  Loop {
    body: Vec<Stmt<'src>>,
  },
  Break,
  Continue,
  Return(Option<Expr<'src>>),
  Def {
    name: Ident<'src>,
    params: Vec<Lvalue<'src>>,
    rest: Option<Ident<'src>>,
    body: Vec<Stmt<'src>>,
  },
  Namespace {
    name: Ident<'src>,
    body: Vec<Stmt<'src>>,
  },
  Using(Vec<Ident<'src>>),
  Enum {
    name: Option<Ident<'src>>,
    members: Vec<(Ident<'src>, Option<Expr<'src>>)>,
  },
  Label(Ident<'src>),
  Goto(Ident<'src>),
}

pub type Lvalue<'src> = Spanned<LvalueKind<'src>>;

#[derive(Debug, Clone)]
pub enum LvalueKind<'src> {
  Name(Cow<'src, str>),
  /// `{a, b, c}`, optionally ending in `...rest`.
  List {
    items: Vec<Lvalue<'src>>,
    rest: Option<Box<Lvalue<'src>>>,
  },
  Index(Box<Expr<'src>>, Box<Expr<'src>>),
  Slice(Box<Expr<'src>>, Box<Expr<'src>>, Box<Expr<'src>>),
}

pub type Expr<'src> = Spanned<ExprKind<'src>>;

#[derive(Debug, Clone)]
pub enum ExprKind<'src> {
  Nil,
  Number(f64),
  Str(Vec<StrPart<'src>>),
  List(Vec<Expr<'src>>),
  Name(Cow<'src, str>),
  /// `ns.sub.name`
  Path(Vec<Ident<'src>>),
  Prefix(PrefixOp, Box<Expr<'src>>),
  Binary(BinaryOp, Box<Expr<'src>>, Box<Expr<'src>>),
  Assign(AssignOp, Box<Lvalue<'src>>, Box<Expr<'src>>),
  Index(Box<Expr<'src>>, Box<Expr<'src>>),
  Slice(Box<Expr<'src>>, Option<Box<Expr<'src>>>, Option<Box<Expr<'src>>>),
  Call {
    callee: Box<Expr<'src>>,
    args: Vec<Expr<'src>>,
  },
  /// `...expr`, valid only in call-argument position: splats a list.
  Spread(Box<Expr<'src>>),
}

#[derive(Debug, Clone)]
pub enum StrPart<'src> {
  Literal(Cow<'src, str>),
  Embed(Expr<'src>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
  Pos,
  Neg,
  Ref,
  Not,
  Spread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Pow,
  Mul,
  Div,
  Mod,
  Add,
  Sub,
  Concat,
  Lt,
  Le,
  Gt,
  Ge,
  Eq,
  Ne,
  And,
  Or,
  Pipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
  Set,
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Concat,
  AndAnd,
  OrOr,
}

impl AssignOp {
  pub fn to_binary(self) -> Option<BinaryOp> {
    Some(match self {
      AssignOp::Set => return None,
      AssignOp::Add => BinaryOp::Add,
      AssignOp::Sub => BinaryOp::Sub,
      AssignOp::Mul => BinaryOp::Mul,
      AssignOp::Div => BinaryOp::Div,
      AssignOp::Mod => BinaryOp::Mod,
      AssignOp::Concat => BinaryOp::Concat,
      AssignOp::AndAnd | AssignOp::OrOr => return None,
    })
  }

  pub fn is_short_circuit(self) -> bool {
    matches!(self, AssignOp::AndAnd | AssignOp::OrOr)
  }
}

impl<'src> Expr<'src> {
  pub fn new(span: impl Into<Span>, kind: ExprKind<'src>) -> Self {
    Spanned::new(span, kind)
  }
}

#[allow(unused)]
fn _assert_span(s: Span) -> Span {
  s
}

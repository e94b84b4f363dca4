use super::*;
use crate::ast::{BinaryOp, ExprKind, LvalueKind, StmtKind};

fn module(src: &str) -> ast::Module<'_> {
  parse("<test>", src).unwrap_or_else(|e| panic!("parse failed: {e}"))
}

#[test]
fn var_decl_with_list_init() {
  let m = module("var a = 1, b = {2, 3}\n");
  assert_eq!(m.body.len(), 1);
  let StmtKind::Var(decls) = &*m.body[0] else {
    panic!("expected var")
  };
  assert_eq!(decls.len(), 2);
  assert!(matches!(&*decls[0].0, LvalueKind::Name(n) if n == "a"));
  assert!(matches!(&*decls[1].0, LvalueKind::Name(n) if n == "b"));
}

#[test]
fn arithmetic_precedence() {
  // `1 + 2 * 3` should parse as `1 + (2 * 3)`, both sides constants so the
  // parser's constant-folding collapses it to a literal 7.
  let m = module("say 1 + 2 * 3\n");
  let StmtKind::Expr(e) = &*m.body[0] else {
    panic!("expected expr stmt")
  };
  let ExprKind::Call { args, .. } = &**e else {
    panic!("expected call (bare command application)")
  };
  assert!(matches!(&*args[0], ExprKind::Number(n) if *n == 7.0));
}

#[test]
fn pow_is_right_associative() {
  // `2 ^ 3 ^ 2` == `2 ^ (3 ^ 2)` == `2 ^ 9` == 512, not `(2^3)^2` == 64.
  let m = module("var x = 2 ^ 3 ^ 2\n");
  let StmtKind::Var(decls) = &*m.body[0] else {
    panic!("expected var")
  };
  let init = decls[0].1.as_ref().unwrap();
  assert!(matches!(&**init, ExprKind::Number(n) if (*n - 512.0).abs() < 1e-9));
}

#[test]
fn pipe_is_application() {
  // `x | f(y)` parses as a binary Pipe node; lowering to `f(x, y)` is a
  // code-generator concern, not the parser's.
  let m = module("say x | f(y)\n");
  let StmtKind::Expr(e) = &*m.body[0] else {
    panic!("expected expr stmt")
  };
  let ExprKind::Call { args, .. } = &**e else {
    panic!("expected call")
  };
  assert!(matches!(&*args[0], ExprKind::Binary(BinaryOp::Pipe, ..)));
}

#[test]
fn pipe_requires_call_or_name_rhs() {
  let err = parse("<test>", "say x | 1\n");
  assert!(err.is_err());
}

#[test]
fn if_elseif_else() {
  let m = module("if a\n  say 1\nelseif b\n  say 2\nelse\n  say 3\nend\n");
  let StmtKind::If { arms, else_ } = &*m.body[0] else {
    panic!("expected if")
  };
  assert_eq!(arms.len(), 2);
  assert!(else_.is_some());
}

#[test]
fn for_loop_with_declared_lvalue() {
  let m = module("for var i: range 3\n  say i\nend\n");
  let StmtKind::For {
    lvalue, declares, ..
  } = &*m.body[0]
  else {
    panic!("expected for")
  };
  assert!(declares);
  assert!(matches!(&**lvalue, LvalueKind::Name(n) if n == "i"));
}

#[test]
fn lvalue_list_pattern_with_rest() {
  let m = module("var {a, b, ...c} = x\n");
  let StmtKind::Var(decls) = &*m.body[0] else {
    panic!("expected var")
  };
  let LvalueKind::List { items, rest } = &*decls[0].0 else {
    panic!("expected list lvalue")
  };
  assert_eq!(items.len(), 2);
  assert!(rest.is_some());
}

#[test]
fn def_with_variadic_rest_param() {
  let m = module("def f(a, b, ...rest)\n  return a\nend\n");
  let StmtKind::Def { params, rest, .. } = &*m.body[0] else {
    panic!("expected def")
  };
  assert_eq!(params.len(), 2);
  assert!(rest.is_some());
}

#[test]
fn label_followed_by_colon_is_a_label() {
  let m = module("top:\nsay 1\ngoto top\n");
  assert!(matches!(&*m.body[0], StmtKind::Label(name) if &**name == "top"));
  assert!(matches!(&*m.body[2], StmtKind::Goto(name) if &**name == "top"));
}

#[test]
fn interpolated_string_builds_parts() {
  let m = module(r#"say "a${1}b"
"#);
  let StmtKind::Expr(e) = &*m.body[0] else {
    panic!("expected expr stmt")
  };
  let ExprKind::Call { args, .. } = &**e else {
    panic!("expected call")
  };
  assert!(matches!(&*args[0], ExprKind::Str(parts) if parts.len() == 3));
}

#[test]
fn conditional_assign_parses_as_assign_op() {
  let m = module("x ||= {4, 5, 6}\n");
  let StmtKind::Expr(e) = &*m.body[0] else {
    panic!("expected expr stmt")
  };
  assert!(matches!(&**e, ExprKind::Assign(crate::ast::AssignOp::OrOr, ..)));
}

#[test]
fn enum_without_name_declares_bare_constants() {
  let m = module("enum\n  a\n  b = 10\nend\n");
  let StmtKind::Enum { name, members } = &*m.body[0] else {
    panic!("expected enum")
  };
  assert!(name.is_none());
  assert_eq!(members.len(), 2);
}

use super::*;

fn kinds(src: &str) -> Vec<TokenKind<'_>> {
  let mut lexer = Lexer::new(src);
  let mut out = vec![];
  loop {
    let tok = lexer.next().unwrap();
    let eof = matches!(tok.kind, TokenKind::Eof);
    out.push(tok.kind);
    if eof {
      break;
    }
  }
  out
}

#[test]
fn idents_and_keywords() {
  let kinds = kinds("var x if");
  assert!(matches!(kinds[0], TokenKind::Keyword(Keyword::Var)));
  assert!(matches!(kinds[1], TokenKind::Ident(ref s) if s == "x"));
  assert!(matches!(kinds[2], TokenKind::Keyword(Keyword::If)));
}

#[test]
fn decimal_number() {
  let kinds = kinds("1_000.25e1");
  assert!(matches!(kinds[0], TokenKind::Number(n) if (n - 10002.5).abs() < 1e-9));
}

#[test]
fn hex_number() {
  let kinds = kinds("0xFF");
  assert!(matches!(kinds[0], TokenKind::Number(n) if n == 255.0));
}

#[test]
fn binary_number_with_fraction_exponent() {
  // 0b1.1p1 == (1 + 1/2) * 2^1 == 3
  let kinds = kinds("0b1.1p1");
  assert!(matches!(kinds[0], TokenKind::Number(n) if n == 3.0));
}

#[test]
fn single_quoted_escape() {
  let kinds = kinds("'it''s'");
  assert!(matches!(kinds[0], TokenKind::Str(ref s) if s == "it's"));
}

#[test]
fn punct_compound_operators() {
  let kinds = kinds("+= &&= ... <=");
  assert!(matches!(kinds[0], TokenKind::Punct(Punct::PlusEq)));
  assert!(matches!(kinds[1], TokenKind::Punct(Punct::AndAndEq)));
  assert!(matches!(kinds[2], TokenKind::Punct(Punct::DotDotDot)));
  assert!(matches!(kinds[3], TokenKind::Punct(Punct::Le)));
}

#[test]
fn interp_string_parts() {
  let mut lexer = Lexer::new(r#""a${1}b""#);
  let start = lexer.next().unwrap();
  assert!(matches!(start.kind, TokenKind::InterpStart));
  let part = lexer.lex_interp_part().unwrap();
  assert!(matches!(part, InterpPart::LiteralThenEmbed(ref s, _) if s == "a"));
  // parser would now lex/parse `1` as an expression; we just check the
  // lexer resumes correctly after the embedded `}`.
  let num = lexer.next().unwrap();
  assert!(matches!(num.kind, TokenKind::Number(n) if n == 1.0));
  let rbrace = lexer.next().unwrap();
  assert!(matches!(rbrace.kind, TokenKind::Punct(Punct::RBrace)));
  let part = lexer.lex_interp_part().unwrap();
  assert!(matches!(part, InterpPart::Literal(ref s, _) if s == "b"));
}

#[test]
fn identifier_length_cap() {
  let long = "a".repeat(1025);
  let mut lexer = Lexer::new(&long);
  assert!(lexer.next().is_err());
}

#[test]
fn invalid_escape_is_error() {
  let mut lexer = Lexer::new(r#""\q""#);
  let _ = lexer.next().unwrap();
  assert!(lexer.lex_interp_part().is_err());
}

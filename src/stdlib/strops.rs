//! String operations (the `str.*` family). Strings are immutable byte
//! sequences; these operate byte-wise rather than on decoded codepoints,
//! matching `utf8.encode`/`utf8.decode` being the dedicated codec for
//! actual Unicode text.

use crate::op::BuiltinOp;
use crate::value::Value;
use crate::vm::Context;

use super::{alloc_list, alloc_str, arity_error, expect_number, expect_str_bytes, normalize_index};

pub(super) fn variadic(ctx: &mut Context, op: BuiltinOp, args: &[Value]) -> crate::Result<Value> {
  use BuiltinOp::*;
  match op {
    StrCat => cat(ctx, args),
    StrSplit => split(ctx, args),
    StrReplace => replace(ctx, args),
    StrBegins => begins_ends(ctx, args, true),
    StrEnds => begins_ends(ctx, args, false),
    StrPad => pad(ctx, args),
    StrFind => find(ctx, args, true),
    StrRFind => find(ctx, args, false),
    StrLower => case(ctx, args, false),
    StrUpper => case(ctx, args, true),
    StrTrim => trim(ctx, args),
    StrRev => rev(ctx, args),
    StrRep => rep(ctx, args),
    StrList => list(ctx, args),
    StrByte => byte(ctx, args),
    StrHash => hash(ctx, args),
    _ => unreachable!(),
  }
}

fn bytes_of(ctx: &Context, op: BuiltinOp, args: &[Value], i: usize) -> crate::Result<Vec<u8>> {
  let v = args.get(i).copied().ok_or_else(|| arity_error(ctx, op, i + 1, args.len()))?;
  expect_str_bytes(ctx, op, v)
}

fn cat(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let mut out = Vec::new();
  for &v in args {
    out.extend(expect_str_bytes(ctx, BuiltinOp::StrCat, v)?);
  }
  Ok(alloc_str(ctx, out))
}

fn split(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let s = bytes_of(ctx, BuiltinOp::StrSplit, args, 0)?;
  let sep = bytes_of(ctx, BuiltinOp::StrSplit, args, 1)?;
  let parts: Vec<Value> = if sep.is_empty() {
    s.iter().map(|&b| alloc_str(ctx, vec![b])).collect()
  } else {
    split_bytes(&s, &sep).into_iter().map(|p| alloc_str(ctx, p)).collect()
  };
  Ok(alloc_list(ctx, parts))
}

fn split_bytes(s: &[u8], sep: &[u8]) -> Vec<Vec<u8>> {
  let mut out = Vec::new();
  let mut start = 0;
  let mut i = 0;
  while i + sep.len() <= s.len() {
    if &s[i..i + sep.len()] == sep {
      out.push(s[start..i].to_vec());
      i += sep.len();
      start = i;
    } else {
      i += 1;
    }
  }
  out.push(s[start..].to_vec());
  out
}

fn replace(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let s = bytes_of(ctx, BuiltinOp::StrReplace, args, 0)?;
  let find = bytes_of(ctx, BuiltinOp::StrReplace, args, 1)?;
  let with = bytes_of(ctx, BuiltinOp::StrReplace, args, 2)?;
  if find.is_empty() {
    return Ok(alloc_str(ctx, s));
  }
  let mut out = Vec::new();
  let mut i = 0;
  while i < s.len() {
    if i + find.len() <= s.len() && s[i..i + find.len()] == find[..] {
      out.extend_from_slice(&with);
      i += find.len();
    } else {
      out.push(s[i]);
      i += 1;
    }
  }
  Ok(alloc_str(ctx, out))
}

fn begins_ends(ctx: &mut Context, args: &[Value], begins: bool) -> crate::Result<Value> {
  let s = bytes_of(ctx, BuiltinOp::StrBegins, args, 0)?;
  let needle = bytes_of(ctx, BuiltinOp::StrBegins, args, 1)?;
  let ok = if begins { s.starts_with(&needle[..]) } else { s.ends_with(&needle[..]) };
  Ok(Value::number(if ok { 1.0 } else { 0.0 }))
}

/// Pads `s` to `abs(len)` bytes with `fill` (default space): positive `len`
/// pads on the right (left-justify), negative pads on the left.
fn pad(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let s = bytes_of(ctx, BuiltinOp::StrPad, args, 0)?;
  let target = expect_number(ctx, BuiltinOp::StrPad, args.get(1).copied().unwrap_or(Value::number(0.0)))?;
  let fill = match args.get(2) {
    Some(&v) => expect_str_bytes(ctx, BuiltinOp::StrPad, v)?.first().copied().unwrap_or(b' '),
    None => b' ',
  };
  let n = target.abs() as usize;
  if s.len() >= n {
    return Ok(alloc_str(ctx, s));
  }
  let padding = vec![fill; n - s.len()];
  let out = if target >= 0.0 {
    let mut out = s;
    out.extend(padding);
    out
  } else {
    let mut out = padding;
    out.extend(s);
    out
  };
  Ok(alloc_str(ctx, out))
}

fn find(ctx: &mut Context, args: &[Value], forward: bool) -> crate::Result<Value> {
  let s = bytes_of(ctx, BuiltinOp::StrFind, args, 0)?;
  let needle = bytes_of(ctx, BuiltinOp::StrFind, args, 1)?;
  let start = match args.get(2) {
    Some(&v) => normalize_index(expect_number(ctx, BuiltinOp::StrFind, v)?, s.len() + 1).unwrap_or(0),
    None => 0,
  };
  let found = if needle.is_empty() {
    None
  } else if forward {
    (start..=s.len().saturating_sub(needle.len())).find(|&i| s[i..].starts_with(&needle[..]))
  } else {
    (0..=s.len().saturating_sub(needle.len()))
      .rev()
      .find(|&i| i >= start && s[i..].starts_with(&needle[..]))
  };
  Ok(found.map(|i| Value::number(i as f64)).unwrap_or(Value::nil()))
}

fn case(ctx: &mut Context, args: &[Value], upper: bool) -> crate::Result<Value> {
  let mut s = bytes_of(ctx, BuiltinOp::StrLower, args, 0)?;
  for b in &mut s {
    *b = if upper { b.to_ascii_uppercase() } else { b.to_ascii_lowercase() };
  }
  Ok(alloc_str(ctx, s))
}

fn trim(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let s = bytes_of(ctx, BuiltinOp::StrTrim, args, 0)?;
  let trimmed = {
    let start = s.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(s.len());
    let end = s.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(start);
    s[start..end].to_vec()
  };
  Ok(alloc_str(ctx, trimmed))
}

fn rev(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let mut s = bytes_of(ctx, BuiltinOp::StrRev, args, 0)?;
  s.reverse();
  Ok(alloc_str(ctx, s))
}

fn rep(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let s = bytes_of(ctx, BuiltinOp::StrRep, args, 0)?;
  let n = expect_number(ctx, BuiltinOp::StrRep, args.get(1).copied().unwrap_or(Value::number(0.0)))?;
  let n = n.max(0.0) as usize;
  Ok(alloc_str(ctx, s.repeat(n)))
}

fn list(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let s = bytes_of(ctx, BuiltinOp::StrList, args, 0)?;
  let items: Vec<Value> = s.iter().map(|&b| alloc_str(ctx, vec![b])).collect();
  Ok(alloc_list(ctx, items))
}

fn byte(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let s = bytes_of(ctx, BuiltinOp::StrByte, args, 0)?;
  match args.get(1) {
    Some(&v) => {
      let i = expect_number(ctx, BuiltinOp::StrByte, v)?;
      Ok(match normalize_index(i, s.len()) {
        Some(i) => Value::number(s[i] as f64),
        None => Value::nil(),
      })
    }
    None => Ok(alloc_list(ctx, s.iter().map(|&b| Value::number(b as f64)).collect())),
  }
}

fn hash(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let s = bytes_of(ctx, BuiltinOp::StrHash, args, 0)?;
  let seed = match args.get(1) {
    Some(&v) => expect_number(ctx, BuiltinOp::StrHash, v)? as i64 as u32,
    None => 0,
  };
  let words = crate::hash::hash_seeded4(&s, seed);
  Ok(alloc_list(ctx, words.iter().map(|&w| Value::number(w as f64)).collect()))
}

#[cfg(test)]
mod tests {
  use std::rc::Rc;

  use super::*;
  use crate::gc::GcLevel;
  use crate::host::StdIo;
  use crate::program::Program;

  fn test_ctx() -> Context {
    Context::new(Rc::new(Program::new()), Box::new(StdIo), GcLevel::Default)
  }

  fn sbytes(ctx: &Context, v: Value) -> Vec<u8> {
    ctx.heap().strings.get(v.as_str_index().unwrap()).unwrap().as_bytes().to_vec()
  }

  #[test]
  fn split_on_separator_and_byte_by_byte() {
    let mut ctx = test_ctx();
    let s = alloc_str(&mut ctx, b"a,bb,c".to_vec());
    let sep = alloc_str(&mut ctx, b",".to_vec());
    let out = split(&mut ctx, &[s, sep]).unwrap();
    let idx = out.as_list_index().unwrap();
    let parts: Vec<Vec<u8>> = ctx.heap().lists.get(idx).unwrap().as_slice().iter().map(|&v| sbytes(&ctx, v)).collect();
    assert_eq!(parts, vec![b"a".to_vec(), b"bb".to_vec(), b"c".to_vec()]);
  }

  #[test]
  fn replace_all_occurrences() {
    let mut ctx = test_ctx();
    let s = alloc_str(&mut ctx, b"foo bar foo".to_vec());
    let find = alloc_str(&mut ctx, b"foo".to_vec());
    let with = alloc_str(&mut ctx, b"baz".to_vec());
    let out = replace(&mut ctx, &[s, find, with]).unwrap();
    assert_eq!(sbytes(&ctx, out), b"baz bar baz");
  }

  #[test]
  fn pad_left_and_right() {
    let mut ctx = test_ctx();
    let s = alloc_str(&mut ctx, b"ab".to_vec());
    let right = pad(&mut ctx, &[s, Value::number(4.0)]).unwrap();
    assert_eq!(sbytes(&ctx, right), b"ab  ");
    let left = pad(&mut ctx, &[s, Value::number(-4.0)]).unwrap();
    assert_eq!(sbytes(&ctx, left), b"  ab");
  }

  #[test]
  fn find_and_rfind_locate_occurrences() {
    let mut ctx = test_ctx();
    let s = alloc_str(&mut ctx, b"abcabc".to_vec());
    let needle = alloc_str(&mut ctx, b"bc".to_vec());
    let fwd = find(&mut ctx, &[s, needle], true).unwrap();
    assert_eq!(fwd.as_number(), Some(1.0));
    let bwd = find(&mut ctx, &[s, needle], false).unwrap();
    assert_eq!(bwd.as_number(), Some(4.0));
  }

  #[test]
  fn trim_strips_ascii_whitespace_from_both_ends() {
    let mut ctx = test_ctx();
    let s = alloc_str(&mut ctx, b"  hi there  \t".to_vec());
    let out = trim(&mut ctx, &[s]).unwrap();
    assert_eq!(sbytes(&ctx, out), b"hi there");
  }

  #[test]
  fn case_conversion_is_ascii_only() {
    let mut ctx = test_ctx();
    let s = alloc_str(&mut ctx, b"MixEd".to_vec());
    let lower = case(&mut ctx, &[s], false).unwrap();
    assert_eq!(sbytes(&ctx, lower), b"mixed");
    let upper = case(&mut ctx, &[s], true).unwrap();
    assert_eq!(sbytes(&ctx, upper), b"MIXED");
  }

  #[test]
  fn hash_is_a_four_number_list_and_seed_sensitive() {
    let mut ctx = test_ctx();
    let s = alloc_str(&mut ctx, b"hello".to_vec());
    let h1 = hash(&mut ctx, &[s]).unwrap();
    let idx1 = h1.as_list_index().unwrap();
    let words1: Vec<f64> = ctx.heap().lists.get(idx1).unwrap().as_slice().iter().map(|v| v.as_number().unwrap()).collect();
    assert_eq!(words1.len(), 4);

    let h2 = hash(&mut ctx, &[s, Value::number(1.0)]).unwrap();
    let idx2 = h2.as_list_index().unwrap();
    let words2: Vec<f64> = ctx.heap().lists.get(idx2).unwrap().as_slice().iter().map(|v| v.as_number().unwrap()).collect();
    assert_ne!(words1, words2);
  }
}

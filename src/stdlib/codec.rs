//! UTF-8 codepoint codec and binary struct packing (the `utf8.*`/`struct.*`
//! family).
//!
//! A struct template is a sink list of one-letter-plus-width type tags as
//! strings (`"u1"`, `"u2"`, `"u4"`, `"i1"`, `"i2"`, `"i4"`, `"f4"`, `"f8"`):
//! unsigned/signed integers of 1/2/4 bytes, or 4/8-byte floats.

use crate::op::BuiltinOp;
use crate::value::Value;
use crate::vm::Context;

use super::{alloc_list, alloc_str, arity_error, expect_list_items, expect_number, expect_str_bytes, rt};

pub(super) fn variadic(ctx: &mut Context, op: BuiltinOp, args: &[Value]) -> crate::Result<Value> {
  use BuiltinOp::*;
  match op {
    Utf8Encode => encode(ctx, args),
    Utf8Decode => decode(ctx, args),
    StructSize => size(ctx, args),
    StructStr => pack(ctx, args),
    StructList => unpack(ctx, args),
    _ => unreachable!(),
  }
}

fn encode(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let codepoints = expect_list_items(ctx, BuiltinOp::Utf8Encode, args.first().copied().unwrap_or(Value::nil()))?;
  let mut out = String::new();
  for v in codepoints {
    let n = expect_number(ctx, BuiltinOp::Utf8Encode, v)? as u32;
    let c = char::from_u32(n).ok_or_else(|| rt(ctx, "utf8.encode: invalid codepoint"))?;
    out.push(c);
  }
  Ok(alloc_str(ctx, out.into_bytes()))
}

fn decode(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let bytes = expect_str_bytes(ctx, BuiltinOp::Utf8Decode, args.first().copied().unwrap_or(Value::nil()))?;
  let s = std::str::from_utf8(&bytes).map_err(|_| rt(ctx, "utf8.decode: invalid UTF-8"))?;
  let items: Vec<Value> = s.chars().map(|c| Value::number(c as u32 as f64)).collect();
  Ok(alloc_list(ctx, items))
}

enum Field {
  U(u8),
  I(u8),
  F(u8),
}

fn parse_template(ctx: &Context, items: &[Value]) -> crate::Result<Vec<Field>> {
  let mut out = Vec::with_capacity(items.len());
  for &v in items {
    let tag = expect_str_bytes(ctx, BuiltinOp::StructSize, v)?;
    let tag = std::str::from_utf8(&tag).map_err(|_| rt(ctx, "struct: invalid type tag"))?;
    let (kind, width) = tag.split_at(1);
    let width: u8 = width.parse().map_err(|_| rt(ctx, format!("struct: invalid type tag `{tag}`")))?;
    out.push(match kind {
      "u" if matches!(width, 1 | 2 | 4) => Field::U(width),
      "i" if matches!(width, 1 | 2 | 4) => Field::I(width),
      "f" if matches!(width, 4 | 8) => Field::F(width),
      _ => return Err(rt(ctx, format!("struct: invalid type tag `{tag}`"))),
    });
  }
  Ok(out)
}

fn field_width(f: &Field) -> usize {
  match f {
    Field::U(w) | Field::I(w) | Field::F(w) => *w as usize,
  }
}

fn size(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  let items = expect_list_items(ctx, BuiltinOp::StructSize, args.first().copied().unwrap_or(Value::nil()))?;
  let fields = parse_template(ctx, &items)?;
  Ok(Value::number(fields.iter().map(field_width).sum::<usize>() as f64))
}

fn little_endian(ctx: &Context, args: &[Value], i: usize) -> bool {
  args.get(i).map(|v| v.truthy()).unwrap_or_else(|| {
    let _ = ctx;
    true
  })
}

fn pack(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  if args.len() < 2 {
    return Err(arity_error(ctx, BuiltinOp::StructStr, 2, args.len()));
  }
  let values = expect_list_items(ctx, BuiltinOp::StructStr, args[0])?;
  let template = expect_list_items(ctx, BuiltinOp::StructStr, args[1])?;
  let fields = parse_template(ctx, &template)?;
  let le = little_endian(ctx, args, 2);
  if values.len() != fields.len() {
    return Err(rt(ctx, "struct.str: value count does not match template"));
  }
  let mut out = Vec::new();
  for (v, f) in values.into_iter().zip(fields.iter()) {
    let n = expect_number(ctx, BuiltinOp::StructStr, v)?;
    let mut bytes: Vec<u8> = match f {
      Field::U(1) => vec![n as i64 as u8],
      Field::U(2) => (n as i64 as u16).to_le_bytes().to_vec(),
      Field::U(4) => (n as i64 as u32).to_le_bytes().to_vec(),
      Field::I(1) => vec![n as i64 as i8 as u8],
      Field::I(2) => (n as i64 as i16).to_le_bytes().to_vec(),
      Field::I(4) => (n as i64 as i32).to_le_bytes().to_vec(),
      Field::F(4) => (n as f32).to_le_bytes().to_vec(),
      Field::F(8) => n.to_le_bytes().to_vec(),
      _ => unreachable!(),
    };
    if !le {
      bytes.reverse();
    }
    out.extend(bytes);
  }
  Ok(alloc_str(ctx, out))
}

fn unpack(ctx: &mut Context, args: &[Value]) -> crate::Result<Value> {
  if args.len() < 2 {
    return Err(arity_error(ctx, BuiltinOp::StructList, 2, args.len()));
  }
  let bytes = expect_str_bytes(ctx, BuiltinOp::StructList, args[0])?;
  let template = expect_list_items(ctx, BuiltinOp::StructList, args[1])?;
  let fields = parse_template(ctx, &template)?;
  let le = little_endian(ctx, args, 2);
  let mut out = Vec::with_capacity(fields.len());
  let mut pos = 0;
  for f in &fields {
    let w = field_width(f);
    if pos + w > bytes.len() {
      return Err(rt(ctx, "struct.list: buffer too short for template"));
    }
    let mut chunk = bytes[pos..pos + w].to_vec();
    if !le {
      chunk.reverse();
    }
    let n = match f {
      Field::U(1) => chunk[0] as f64,
      Field::U(2) => u16::from_le_bytes(chunk.try_into().unwrap()) as f64,
      Field::U(4) => u32::from_le_bytes(chunk.try_into().unwrap()) as f64,
      Field::I(1) => chunk[0] as i8 as f64,
      Field::I(2) => i16::from_le_bytes(chunk.try_into().unwrap()) as f64,
      Field::I(4) => i32::from_le_bytes(chunk.try_into().unwrap()) as f64,
      Field::F(4) => f32::from_le_bytes(chunk.try_into().unwrap()) as f64,
      Field::F(8) => f64::from_le_bytes(chunk.try_into().unwrap()),
      _ => unreachable!(),
    };
    out.push(Value::number(n));
    pos += w;
  }
  Ok(alloc_list(ctx, out))
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

  fn template(ctx: &mut Context, tags: &[&str]) -> Value {
    let items = tags.iter().map(|&t| alloc_str(ctx, t.as_bytes().to_vec())).collect();
    alloc_list(ctx, items)
  }

  #[test]
  fn utf8_encode_decode_round_trip() {
    let mut ctx = test_ctx();
    let codepoints = alloc_list(&mut ctx, vec![Value::number('h' as u32 as f64), Value::number('i' as u32 as f64), Value::number(0x1F600 as f64)]);
    let encoded = encode(&mut ctx, &[codepoints]).unwrap();
    let decoded = decode(&mut ctx, &[encoded]).unwrap();
    let idx = decoded.as_list_index().unwrap();
    let back: Vec<f64> = ctx.heap().lists.get(idx).unwrap().as_slice().iter().map(|v| v.as_number().unwrap()).collect();
    assert_eq!(back, vec!['h' as u32 as f64, 'i' as u32 as f64, 0x1F600 as f64]);
  }

  #[test]
  fn struct_pack_unpack_round_trip_mixed_fields() {
    let mut ctx = test_ctx();
    let tmpl = template(&mut ctx, &["u1", "i2", "f8"]);
    let values = alloc_list(&mut ctx, vec![Value::number(200.0), Value::number(-1234.0), Value::number(3.5)]);

    let size_v = size(&mut ctx, &[tmpl]).unwrap();
    assert_eq!(size_v.as_number(), Some(11.0));

    let packed = pack(&mut ctx, &[values, tmpl]).unwrap();
    let bytes = expect_str_bytes(&ctx, BuiltinOp::StructStr, packed).unwrap();
    assert_eq!(bytes.len(), 11);

    let unpacked = unpack(&mut ctx, &[packed, tmpl]).unwrap();
    let idx = unpacked.as_list_index().unwrap();
    let out: Vec<f64> = ctx.heap().lists.get(idx).unwrap().as_slice().iter().map(|v| v.as_number().unwrap()).collect();
    assert_eq!(out, vec![200.0, -1234.0, 3.5]);
  }

  #[test]
  fn struct_pack_rejects_value_count_mismatch() {
    let mut ctx = test_ctx();
    let tmpl = template(&mut ctx, &["u1", "u1"]);
    let values = alloc_list(&mut ctx, vec![Value::number(1.0)]);
    assert!(pack(&mut ctx, &[values, tmpl]).is_err());
  }

  #[test]
  fn struct_unpack_big_endian() {
    let mut ctx = test_ctx();
    let tmpl = template(&mut ctx, &["u2"]);
    let values = alloc_list(&mut ctx, vec![Value::number(0x0102.0)]);
    let packed_be = pack(&mut ctx, &[values, tmpl, Value::number(0.0)]).unwrap();
    let bytes = expect_str_bytes(&ctx, BuiltinOp::StructStr, packed_be).unwrap();
    assert_eq!(bytes, vec![0x01, 0x02]);
  }
}

//! Value serialization (the `pickle.*` family): JSON text, a compact binary
//! form, and structural queries (`valid`/`sibling`/`circular`/`copy`).
//!
//! The binary format is a one-byte tag per value (`nil`/`number`/`str`/
//! `list`/`backref`), little-endian lengths, and a backref tag so cyclic
//! lists round-trip without looping forever. Every binary blob starts with
//! a `0x00` marker byte so `pickle.valid` can tell it apart from JSON text,
//! which never starts with a NUL byte.

use std::collections::HashSet;

use crate::object::SinkList;
use crate::op::BuiltinOp;
use crate::value::Value;
use crate::vm::Context;

use super::{alloc_list, alloc_str, expect_str_bytes, rt};

pub(super) fn variadic(ctx: &mut Context, op: BuiltinOp, args: &[Value]) -> crate::Result<Value> {
  use BuiltinOp::*;
  let v = args.first().copied().unwrap_or(Value::nil());
  match op {
    PickleJson => json_encode(ctx, v).map(|s| alloc_str(ctx, s.into_bytes())),
    PickleBin => Ok(bin_encode(ctx, v)),
    PickleVal => decode_auto(ctx, v),
    PickleValid => Ok(Value::number(valid(ctx, v) as f64)),
    PickleSibling => {
      let b = args.get(1).copied().unwrap_or(Value::nil());
      Ok(Value::number(if super::arith::values_equal(ctx, v, b) { 1.0 } else { 0.0 }))
    }
    PickleCircular => Ok(Value::number(if is_circular(ctx, v) { 1.0 } else { 0.0 })),
    PickleCopy => Ok(deep_copy(ctx, v)),
    _ => unreachable!(),
  }
}

fn json_encode(ctx: &Context, v: Value) -> crate::Result<String> {
  let mut seen = Vec::new();
  let j = to_json(ctx, v, &mut seen)?;
  Ok(j.to_string())
}

fn to_json(ctx: &Context, v: Value, seen: &mut Vec<u32>) -> crate::Result<serde_json::Value> {
  if let Some(n) = v.as_number() {
    return Ok(serde_json::Number::from_f64(n).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null));
  }
  if v.is_nil() {
    return Ok(serde_json::Value::Null);
  }
  if let Some(idx) = v.as_str_index() {
    let s = ctx.heap().strings.get(idx).map(|s| s.as_str_lossy().into_owned()).unwrap_or_default();
    return Ok(serde_json::Value::String(s));
  }
  if let Some(idx) = v.as_list_index() {
    if seen.contains(&idx) {
      return Err(rt(ctx, "pickle.json: cannot encode a circular list"));
    }
    seen.push(idx);
    let items = ctx.heap().lists.get(idx).map(|l| l.as_slice().to_vec()).unwrap_or_default();
    let out: crate::Result<Vec<_>> = items.into_iter().map(|v| to_json(ctx, v, seen)).collect();
    seen.pop();
    return Ok(serde_json::Value::Array(out?));
  }
  unreachable!("value is neither number, nil, string, nor list")
}

fn from_json(ctx: &mut Context, j: &serde_json::Value) -> Value {
  match j {
    serde_json::Value::Null => Value::nil(),
    serde_json::Value::Bool(b) => Value::number(if *b { 1.0 } else { 0.0 }),
    serde_json::Value::Number(n) => Value::number(n.as_f64().unwrap_or(f64::NAN)),
    serde_json::Value::String(s) => alloc_str(ctx, s.clone().into_bytes()),
    serde_json::Value::Array(items) => {
      let values: Vec<Value> = items.iter().map(|j| from_json(ctx, j)).collect();
      alloc_list(ctx, values)
    }
    serde_json::Value::Object(map) => {
      let values: Vec<Value> = map.values().map(|j| from_json(ctx, j)).collect();
      alloc_list(ctx, values)
    }
  }
}

const TAG_NIL: u8 = 0x01;
const TAG_NUM: u8 = 0x02;
const TAG_STR: u8 = 0x03;
const TAG_LIST: u8 = 0x04;
const TAG_BACKREF: u8 = 0xFA;
const BIN_MAGIC: u8 = 0x00;

fn bin_encode(ctx: &mut Context, v: Value) -> Value {
  let mut out = vec![BIN_MAGIC];
  let mut seen = std::collections::HashMap::new();
  encode_value(ctx, v, &mut seen, &mut out);
  alloc_str(ctx, out)
}

fn encode_value(ctx: &Context, v: Value, seen: &mut std::collections::HashMap<u32, u32>, out: &mut Vec<u8>) {
  if let Some(n) = v.as_number() {
    out.push(TAG_NUM);
    out.extend(n.to_le_bytes());
  } else if let Some(idx) = v.as_str_index() {
    let bytes = ctx.heap().strings.get(idx).map(|s| s.as_bytes().to_vec()).unwrap_or_default();
    out.push(TAG_STR);
    out.extend((bytes.len() as u32).to_le_bytes());
    out.extend(bytes);
  } else if let Some(idx) = v.as_list_index() {
    if let Some(&seq) = seen.get(&idx) {
      out.push(TAG_BACKREF);
      out.extend(seq.to_le_bytes());
      return;
    }
    let seq = seen.len() as u32;
    seen.insert(idx, seq);
    let items = ctx.heap().lists.get(idx).map(|l| l.as_slice().to_vec()).unwrap_or_default();
    out.push(TAG_LIST);
    out.extend((items.len() as u32).to_le_bytes());
    for item in items {
      encode_value(ctx, item, seen, out);
    }
  } else {
    out.push(TAG_NIL);
  }
}

struct Reader<'a> {
  bytes: &'a [u8],
  pos: usize,
}

impl<'a> Reader<'a> {
  fn u8(&mut self) -> Result<u8, ()> {
    let b = *self.bytes.get(self.pos).ok_or(())?;
    self.pos += 1;
    Ok(b)
  }
  fn u32(&mut self) -> Result<u32, ()> {
    let end = self.pos + 4;
    let s = self.bytes.get(self.pos..end).ok_or(())?;
    self.pos = end;
    Ok(u32::from_le_bytes(s.try_into().unwrap()))
  }
  fn f64(&mut self) -> Result<f64, ()> {
    let end = self.pos + 8;
    let s = self.bytes.get(self.pos..end).ok_or(())?;
    self.pos = end;
    Ok(f64::from_le_bytes(s.try_into().unwrap()))
  }
  fn bytes(&mut self, n: usize) -> Result<&'a [u8], ()> {
    let end = self.pos + n;
    let s = self.bytes.get(self.pos..end).ok_or(())?;
    self.pos = end;
    Ok(s)
  }
}

fn decode_value(ctx: &mut Context, r: &mut Reader<'_>, backrefs: &mut Vec<u32>) -> Result<Value, ()> {
  match r.u8()? {
    TAG_NIL => Ok(Value::nil()),
    TAG_NUM => Ok(Value::number(r.f64()?)),
    TAG_STR => {
      let len = r.u32()? as usize;
      let bytes = r.bytes(len)?.to_vec();
      Ok(alloc_str(ctx, bytes))
    }
    TAG_LIST => {
      let len = r.u32()? as usize;
      let idx = ctx.heap_mut().lists.alloc(SinkList::new());
      backrefs.push(idx);
      let mut items = Vec::with_capacity(len);
      for _ in 0..len {
        items.push(decode_value(ctx, r, backrefs)?);
      }
      if let Some(list) = ctx.heap_mut().lists.get_mut(idx) {
        *list = SinkList::from_vec(items);
      }
      Ok(Value::list(idx))
    }
    TAG_BACKREF => {
      let seq = r.u32()? as usize;
      let idx = *backrefs.get(seq).ok_or(())?;
      Ok(Value::list(idx))
    }
    _ => Err(()),
  }
}

fn bin_decode(ctx: &mut Context, bytes: &[u8]) -> crate::Result<Value> {
  if bytes.first() != Some(&BIN_MAGIC) {
    return Err(rt(ctx, "pickle.val: not a binary pickle"));
  }
  let mut r = Reader { bytes, pos: 1 };
  let mut backrefs = Vec::new();
  decode_value(ctx, &mut r, &mut backrefs).map_err(|()| rt(ctx, "pickle.val: corrupt binary pickle"))
}

/// `0` invalid, `1` JSON, `2` binary.
fn valid(ctx: &Context, v: Value) -> u8 {
  let Some(idx) = v.as_str_index() else { return 0 };
  let Some(s) = ctx.heap().strings.get(idx) else { return 0 };
  let bytes = s.as_bytes();
  if bytes.first() == Some(&BIN_MAGIC) {
    let mut r = Reader { bytes, pos: 1 };
    let mut backrefs = Vec::new();
    return if decode_probe(&mut r, &mut backrefs).is_ok() { 2 } else { 0 };
  }
  if let Ok(text) = std::str::from_utf8(bytes) {
    if serde_json::from_str::<serde_json::Value>(text).is_ok() {
      return 1;
    }
  }
  0
}

/// Like [`decode_value`] but discards the values, for validation only.
fn decode_probe(r: &mut Reader<'_>, backrefs: &mut Vec<u32>) -> Result<(), ()> {
  match r.u8()? {
    TAG_NIL => Ok(()),
    TAG_NUM => {
      r.f64()?;
      Ok(())
    }
    TAG_STR => {
      let len = r.u32()? as usize;
      r.bytes(len)?;
      Ok(())
    }
    TAG_LIST => {
      let len = r.u32()? as usize;
      let seq = backrefs.len() as u32;
      backrefs.push(seq);
      for _ in 0..len {
        decode_probe(r, backrefs)?;
      }
      Ok(())
    }
    TAG_BACKREF => {
      let seq = r.u32()? as usize;
      if seq >= backrefs.len() {
        return Err(());
      }
      Ok(())
    }
    _ => Err(()),
  }
}

fn decode_auto(ctx: &mut Context, v: Value) -> crate::Result<Value> {
  let bytes = expect_str_bytes(ctx, BuiltinOp::PickleVal, v)?;
  if bytes.first() == Some(&BIN_MAGIC) {
    return bin_decode(ctx, &bytes);
  }
  let text = std::str::from_utf8(&bytes).map_err(|_| rt(ctx, "pickle.val: invalid UTF-8"))?;
  let j: serde_json::Value = serde_json::from_str(text).map_err(|e| rt(ctx, format!("pickle.val: {e}")))?;
  Ok(from_json(ctx, &j))
}

fn is_circular(ctx: &Context, v: Value) -> bool {
  let mut on_stack = HashSet::new();
  walk_circular(ctx, v, &mut on_stack)
}

fn walk_circular(ctx: &Context, v: Value, on_stack: &mut HashSet<u32>) -> bool {
  let Some(idx) = v.as_list_index() else { return false };
  if !on_stack.insert(idx) {
    return true;
  }
  let items = ctx.heap().lists.get(idx).map(|l| l.as_slice().to_vec()).unwrap_or_default();
  let found = items.iter().any(|&item| walk_circular(ctx, item, on_stack));
  on_stack.remove(&idx);
  found
}

fn deep_copy(ctx: &mut Context, v: Value) -> Value {
  let mut seen = std::collections::HashMap::new();
  copy_value(ctx, v, &mut seen)
}

fn copy_value(ctx: &mut Context, v: Value, seen: &mut std::collections::HashMap<u32, u32>) -> Value {
  if v.as_number().is_some() || v.is_nil() {
    return v;
  }
  if let Some(idx) = v.as_str_index() {
    let bytes = ctx.heap().strings.get(idx).map(|s| s.as_bytes().to_vec()).unwrap_or_default();
    return alloc_str(ctx, bytes);
  }
  if let Some(idx) = v.as_list_index() {
    if let Some(&new_idx) = seen.get(&idx) {
      return Value::list(new_idx);
    }
    let new_idx = ctx.heap_mut().lists.alloc(SinkList::new());
    seen.insert(idx, new_idx);
    let items = ctx.heap().lists.get(idx).map(|l| l.as_slice().to_vec()).unwrap_or_default();
    let copied: Vec<Value> = items.into_iter().map(|item| copy_value(ctx, item, seen)).collect();
    if let Some(list) = ctx.heap_mut().lists.get_mut(new_idx) {
      *list = SinkList::from_vec(copied);
    }
    return Value::list(new_idx);
  }
  v
}

#[cfg(test)]
mod tests {
  use std::rc::Rc;

  use super::*;
  use crate::gc::GcLevel;
  use crate::host::StdIo;
  use crate::program::Program;
  use crate::vm::Context;

  fn test_ctx() -> Context {
    Context::new(Rc::new(Program::new()), Box::new(StdIo), GcLevel::Default)
  }

  fn alloc_cyclic_list(ctx: &mut Context) -> Value {
    let idx = ctx.heap_mut().lists.alloc(SinkList::new());
    let inner = alloc_str(ctx, b"loop".to_vec());
    if let Some(l) = ctx.heap_mut().lists.get_mut(idx) {
      l.push(inner);
      l.push(Value::list(idx));
    }
    Value::list(idx)
  }

  #[test]
  fn bin_round_trip_scalars_and_nested_list() {
    let mut ctx = test_ctx();
    let s = alloc_str(&mut ctx, b"hello".to_vec());
    let inner = alloc_list(&mut ctx, vec![Value::number(1.0), Value::nil()]);
    let outer = alloc_list(&mut ctx, vec![s, inner, Value::number(-2.5)]);

    let packed = bin_encode(&mut ctx, outer);
    let decoded = bin_decode(&mut ctx, &expect_str_bytes(&ctx, BuiltinOp::PickleVal, packed).unwrap()).unwrap();

    let idx = decoded.as_list_index().expect("expected list");
    let items = ctx.heap().lists.get(idx).unwrap().as_slice().to_vec();
    assert_eq!(items.len(), 3);
    assert_eq!(ctx.heap().strings.get(items[0].as_str_index().unwrap()).unwrap().as_bytes(), b"hello");
    assert_eq!(items[2].as_number(), Some(-2.5));
  }

  #[test]
  fn bin_round_trip_preserves_cycle_via_backref() {
    let mut ctx = test_ctx();
    let cyclic = alloc_cyclic_list(&mut ctx);
    assert!(is_circular(&ctx, cyclic));

    let packed = bin_encode(&mut ctx, cyclic);
    let bytes = expect_str_bytes(&ctx, BuiltinOp::PickleVal, packed).unwrap();
    // magic byte, one list tag, one backref tag somewhere in the stream.
    assert_eq!(bytes[0], BIN_MAGIC);
    assert!(bytes.contains(&TAG_BACKREF));

    let decoded = bin_decode(&mut ctx, &bytes).unwrap();
    assert!(is_circular(&ctx, decoded));
    let idx = decoded.as_list_index().unwrap();
    let items = ctx.heap().lists.get(idx).unwrap().as_slice().to_vec();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].as_list_index(), Some(idx));
  }

  #[test]
  fn json_encode_rejects_circular_list() {
    let mut ctx = test_ctx();
    let cyclic = alloc_cyclic_list(&mut ctx);
    assert!(json_encode(&ctx, cyclic).is_err());
  }

  #[test]
  fn json_round_trip_acyclic_list() {
    let mut ctx = test_ctx();
    let list = alloc_list(&mut ctx, vec![Value::number(1.0), Value::number(2.0)]);
    let text = json_encode(&ctx, list).unwrap();
    let j: serde_json::Value = serde_json::from_str(&text).unwrap();
    let back = from_json(&mut ctx, &j);
    let idx = back.as_list_index().unwrap();
    let items = ctx.heap().lists.get(idx).unwrap().as_slice().to_vec();
    assert_eq!(items.iter().map(|v| v.as_number().unwrap()).collect::<Vec<_>>(), vec![1.0, 2.0]);
  }

  #[test]
  fn deep_copy_breaks_aliasing_but_preserves_shape() {
    let mut ctx = test_ctx();
    let shared = alloc_list(&mut ctx, vec![Value::number(1.0)]);
    let outer = alloc_list(&mut ctx, vec![shared, shared]);

    let copy = deep_copy(&mut ctx, outer);
    let copy_idx = copy.as_list_index().unwrap();
    let copy_items = ctx.heap().lists.get(copy_idx).unwrap().as_slice().to_vec();
    assert_eq!(copy_items[0].as_list_index(), copy_items[1].as_list_index());
    assert_ne!(copy_items[0].as_list_index(), shared.as_list_index());
  }

  #[test]
  fn valid_distinguishes_binary_and_json_and_garbage() {
    let mut ctx = test_ctx();
    let n = alloc_list(&mut ctx, vec![Value::number(1.0)]);
    let bin = bin_encode(&mut ctx, n);
    let json = alloc_str(&mut ctx, b"[1,2,3]".to_vec());
    let garbage = alloc_str(&mut ctx, b"not json and no magic byte".to_vec());
    assert_eq!(valid(&ctx, bin), 2);
    assert_eq!(valid(&ctx, json), 1);
    assert_eq!(valid(&ctx, garbage), 0);
  }
}

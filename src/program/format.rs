//! Encode/decode for the compiled-module file format.
//!
//! Pure encode/decode over byte buffers — no file I/O here; hosts that want
//! to load/save modules from disk do their own reading and hand the bytes
//! to [`encode`]/[`decode`].

use super::{CmdRow, PosRow, Program};

pub const MAGIC: [u8; 4] = [0xFC, 0x53, 0x6B, 0x01];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
  #[error("not a sink module: bad magic")]
  BadMagic,
  #[error("truncated module at byte {0}")]
  Truncated(usize),
  #[error("missing 0xFD terminator")]
  MissingTerminator,
}

struct Reader<'a> {
  bytes: &'a [u8],
  pos: usize,
}

impl<'a> Reader<'a> {
  fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
    let end = self.pos + n;
    let s = self.bytes.get(self.pos..end).ok_or(FormatError::Truncated(self.pos))?;
    self.pos = end;
    Ok(s)
  }
  fn u32(&mut self) -> Result<u32, FormatError> {
    Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
  }
  fn u64(&mut self) -> Result<u64, FormatError> {
    Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
  }
  fn u8(&mut self) -> Result<u8, FormatError> {
    Ok(self.take(1)?[0])
  }
  fn len_prefixed(&mut self) -> Result<Vec<u8>, FormatError> {
    let len = self.u32()? as usize;
    Ok(self.take(len)?.to_vec())
  }
}

/// Serializes a [`Program`] to the on-disk module format.
pub fn encode(program: &Program) -> Vec<u8> {
  let mut out = Vec::new();
  out.extend_from_slice(&MAGIC);
  out.extend_from_slice(&(program.strings.len() as u32).to_le_bytes());
  out.extend_from_slice(&(program.natives.len() as u32).to_le_bytes());
  out.extend_from_slice(&(program.debug_hints.len() as u32).to_le_bytes());
  out.extend_from_slice(&(program.pos_table.len() as u32).to_le_bytes());
  out.extend_from_slice(&(program.cmd_table.len() as u32).to_le_bytes());
  out.extend_from_slice(&(program.code.len() as u32).to_le_bytes());

  for s in &program.strings {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s);
  }
  for &h in &program.natives {
    out.extend_from_slice(&h.to_le_bytes());
  }
  for hint in &program.debug_hints {
    let bytes = hint.as_bytes();
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
  }
  for row in &program.pos_table {
    out.extend_from_slice(&row.pc.to_le_bytes());
    out.extend_from_slice(&row.line.to_le_bytes());
    out.extend_from_slice(&row.char.to_le_bytes());
    out.extend_from_slice(&row.debug_file.to_le_bytes());
  }
  for row in &program.cmd_table {
    out.extend_from_slice(&row.pc.to_le_bytes());
    out.extend_from_slice(&row.debug_hint.to_le_bytes());
  }
  out.extend_from_slice(&program.code);
  out.push(0xFD);
  out
}

/// Parses a module file produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<Program, FormatError> {
  let mut r = Reader { bytes, pos: 0 };
  let magic = r.take(4)?;
  if magic != MAGIC {
    return Err(FormatError::BadMagic);
  }
  let string_count = r.u32()? as usize;
  let native_count = r.u32()? as usize;
  let debug_string_count = r.u32()? as usize;
  let pos_count = r.u32()? as usize;
  let cmd_count = r.u32()? as usize;
  let code_len = r.u32()? as usize;

  let mut strings = Vec::with_capacity(string_count);
  for _ in 0..string_count {
    strings.push(r.len_prefixed()?);
  }
  let mut natives = Vec::with_capacity(native_count);
  for _ in 0..native_count {
    natives.push(r.u64()?);
  }
  let mut debug_hints = Vec::with_capacity(debug_string_count);
  for _ in 0..debug_string_count {
    let bytes = r.len_prefixed()?;
    debug_hints.push(String::from_utf8_lossy(&bytes).into_owned());
  }
  let mut pos_table = Vec::with_capacity(pos_count);
  for _ in 0..pos_count {
    pos_table.push(PosRow {
      pc: r.u32()?,
      line: r.u32()?,
      char: r.u32()?,
      debug_file: r.u32()?,
    });
  }
  let mut cmd_table = Vec::with_capacity(cmd_count);
  for _ in 0..cmd_count {
    cmd_table.push(CmdRow {
      pc: r.u32()?,
      debug_hint: r.u32()?,
    });
  }
  let code = r.take(code_len)?.to_vec();
  let terminator = r.u8()?;
  if terminator != 0xFD {
    return Err(FormatError::MissingTerminator);
  }

  Ok(Program {
    code,
    strings,
    natives,
    debug_files: Vec::new(),
    debug_hints,
    pos_table,
    cmd_table,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn roundtrips_empty_program() {
    let program = Program::new();
    let bytes = encode(&program);
    assert_eq!(&bytes[0..4], &MAGIC);
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.code, program.code);
  }

  #[test]
  fn roundtrips_populated_program() {
    let mut program = Program::new();
    program.intern_string(b"hello");
    program.intern_native(0xDEAD_BEEF_CAFE_F00D);
    program.record_pos(0, 1, 0, 0);
    program.record_cmd(0, "main");
    program.code = vec![0x01, 0x02, 0x03];

    let bytes = encode(&program);
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.strings, program.strings);
    assert_eq!(decoded.natives, program.natives);
    assert_eq!(decoded.pos_table, program.pos_table);
    assert_eq!(decoded.cmd_table[0].pc, 0);
    assert_eq!(decoded.debug_hints, vec!["main".to_string()]);
    assert_eq!(decoded.code, program.code);
  }

  #[test]
  fn rejects_bad_magic() {
    let err = decode(&[0, 0, 0, 0]).unwrap_err();
    assert_eq!(err, FormatError::BadMagic);
  }

  #[test]
  fn rejects_missing_terminator() {
    let mut program = Program::new();
    program.code = vec![1, 2, 3];
    let mut bytes = encode(&program);
    bytes.pop();
    bytes.push(0x00);
    let err = decode(&bytes).unwrap_err();
    assert_eq!(err, FormatError::MissingTerminator);
  }
}
